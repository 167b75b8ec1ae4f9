pub mod directory;
pub mod s3;
mod sigv4;

use std::path::PathBuf;

use anyhow::bail;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tinyrepo_common::StorageAdapter;

use self::directory::DirectoryAdapter;
use self::s3::{S3Adapter, S3Config};

const COPY_BUF_SIZE: usize = 64 * 1024;

/// Which backend to run and how to reach it.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    Directory { path: PathBuf },
    S3(S3Config),
}

/// Construct the storage adapter selected by configuration.
pub fn from_config(config: &BackendConfig) -> anyhow::Result<Box<dyn StorageAdapter>> {
    match config {
        BackendConfig::Directory { path } => {
            if path.as_os_str().is_empty() {
                bail!("storage directory must not be empty");
            }
            Ok(Box::new(DirectoryAdapter::new(path)))
        }
        BackendConfig::S3(s3) => {
            if s3.endpoint.is_empty() {
                bail!("S3 endpoint must not be empty");
            }
            if s3.bucket.is_empty() {
                bail!("S3 bucket name must not be empty");
            }
            if s3.access_key_id.is_empty() || s3.secret_access_key.is_empty() {
                bail!("S3 credentials not found");
            }
            Ok(Box::new(S3Adapter::new(s3.clone())?))
        }
    }
}

/// Copy `source` into `dest` until EOF, hashing the bytes on the way.
/// Returns the SHA-256 digest and the number of bytes written.
pub(crate) async fn copy_hashing<R, W>(source: &mut R, dest: &mut W) -> std::io::Result<(Vec<u8>, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut size = 0u64;

    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        dest.write_all(&buf[..n]).await?;
        size += n as u64;
    }
    dest.flush().await?;

    Ok((hasher.finalize().to_vec(), size))
}
