//! Storage backends, version resolution and retention for tinyrepo.

pub mod backend;
pub mod tidy;
pub mod versions;

#[cfg(test)]
mod testing;

pub use backend::{from_config, BackendConfig};
pub use tidy::{delete_artifact, spawn_tidy, tidy, TidyReport};
pub use versions::{resolve, resolve_latest, sorted_versions};
