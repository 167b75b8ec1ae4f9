use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail};
use tinyrepo_storage::backend::s3::{S3Config, DEFAULT_PRESIGN_EXPIRY};
use tinyrepo_storage::BackendConfig;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REGION: &str = "us-east-1";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub backend: BackendConfig,
    pub jwt_secret: Vec<u8>,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any variable source; `lookup` returns `None`
    /// for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = jwt_secret_from(&lookup)?;

        let port = match non_empty(&lookup, "TINYREPO_PORT") {
            Some(p) => p
                .parse()
                .map_err(|_| anyhow!("TINYREPO_PORT must be a port number, got '{}'", p))?,
            None => DEFAULT_PORT,
        };

        let storage_type = required(&lookup, "STORAGE_TYPE")?;
        let backend = match storage_type.to_ascii_lowercase().as_str() {
            "local" => BackendConfig::Directory {
                path: PathBuf::from(required(&lookup, "STORAGE_DIRECTORY")?),
            },
            "s3" => {
                let presign_expiry = match non_empty(&lookup, "TINYREPO_PRESIGN_EXPIRY_SECS") {
                    Some(s) => Duration::from_secs(s.parse().map_err(|_| {
                        anyhow!("TINYREPO_PRESIGN_EXPIRY_SECS must be a number of seconds, got '{}'", s)
                    })?),
                    None => DEFAULT_PRESIGN_EXPIRY,
                };
                BackendConfig::S3(S3Config {
                    endpoint: required(&lookup, "S3_ENDPOINT")?,
                    use_ssl: parse_bool("S3_USESSL", &required(&lookup, "S3_USESSL")?)?,
                    bucket: required(&lookup, "S3_BUCKETNAME")?,
                    region: non_empty(&lookup, "S3_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
                    access_key_id: required(&lookup, "S3_ACCESSKEY")?,
                    secret_access_key: required(&lookup, "S3_SECRETKEY")?,
                    presign_expiry,
                })
            }
            other => bail!("Invalid STORAGE_TYPE '{}'. Only Local or S3 are supported.", other),
        };

        Ok(Self {
            backend,
            jwt_secret,
            port,
        })
    }
}

/// The token signing secret on its own, for commands that need nothing else.
pub fn jwt_secret_from_env() -> anyhow::Result<Vec<u8>> {
    jwt_secret_from(&|key: &str| std::env::var(key).ok())
}

fn jwt_secret_from(lookup: &impl Fn(&str) -> Option<String>) -> anyhow::Result<Vec<u8>> {
    Ok(required(lookup, "JWT_SECRET")?.into_bytes())
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.is_empty())
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    non_empty(lookup, key)
        .ok_or_else(|| anyhow!("Missing value for required environment variable {}", key))
}

fn parse_bool(key: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Ok(true),
        "0" | "f" | "false" | "no" => Ok(false),
        _ => bail!("Invalid value for boolean environment variable {}: '{}'", key, value),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_local_config() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STORAGE_TYPE", "Local"),
            ("STORAGE_DIRECTORY", "/srv/tinyrepo"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.jwt_secret, b"s3cret");
        assert!(matches!(
            config.backend,
            BackendConfig::Directory { ref path } if path == &PathBuf::from("/srv/tinyrepo")
        ));
    }

    #[test]
    fn test_s3_config() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("STORAGE_TYPE", "S3"),
            ("S3_ENDPOINT", "minio:9000"),
            ("S3_ACCESSKEY", "key"),
            ("S3_SECRETKEY", "secret"),
            ("S3_USESSL", "false"),
            ("S3_BUCKETNAME", "artifacts"),
            ("JWT_SECRET", "s3cret"),
            ("TINYREPO_PORT", "9090"),
            ("TINYREPO_PRESIGN_EXPIRY_SECS", "60"),
        ]))
        .unwrap();
        assert_eq!(config.port, 9090);
        match config.backend {
            BackendConfig::S3(s3) => {
                assert_eq!(s3.endpoint, "minio:9000");
                assert!(!s3.use_ssl);
                assert_eq!(s3.region, "us-east-1");
                assert_eq!(s3.presign_expiry, Duration::from_secs(60));
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_missing_and_invalid_values() {
        assert!(ServerConfig::from_lookup(lookup(&[("STORAGE_TYPE", "Local")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORAGE_TYPE", "Local"),
            ("JWT_SECRET", "x"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORAGE_TYPE", "Azure"),
            ("JWT_SECRET", "x"),
        ]))
        .is_err());
        assert!(ServerConfig::from_lookup(lookup(&[
            ("STORAGE_TYPE", "S3"),
            ("S3_ENDPOINT", "minio:9000"),
            ("S3_ACCESSKEY", "key"),
            ("S3_SECRETKEY", "secret"),
            ("S3_USESSL", "maybe"),
            ("S3_BUCKETNAME", "artifacts"),
            ("JWT_SECRET", "x"),
        ]))
        .is_err());
    }
}
