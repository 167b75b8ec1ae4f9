use std::sync::Arc;

use tinyrepo_common::StorageAdapter;

/// Shared application state
pub struct AppState {
    pub storage: Arc<dyn StorageAdapter>,
    pub jwt_secret: Vec<u8>,
}

impl AppState {
    pub fn new(storage: Arc<dyn StorageAdapter>, jwt_secret: Vec<u8>) -> Self {
        Self { storage, jwt_secret }
    }
}
