//! S3-compatible object storage adapter.
//!
//! Objects live at `{namespace}/{name}{version}/blob` in a single bucket,
//! addressed path-style. Requests are signed with AWS Signature V4 over
//! reqwest. Downloads are not proxied:
//! the caller redirects the client to a short-lived presigned URL.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use tokio::io::AsyncSeekExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use tinyrepo_common::meta::format_sha256;
use tinyrepo_common::{
    ArtifactSpec, ArtifactVersionSpec, BlobLocator, BlobSource, StorageAdapter, StorageError,
    UploadMeta, UploadReceipt,
};

use super::copy_hashing;
use super::sigv4::{self, Signer};

pub const DEFAULT_PRESIGN_EXPIRY: Duration = Duration::from_secs(300);
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const BLOB_SUFFIX: &str = "/blob";
/// User metadata naming the artifact an object was uploaded for.
const OWNER_HEADER: &str = "x-amz-meta-tinyrepo-artifact";

#[derive(Debug, Clone)]
pub struct S3Config {
    /// `host[:port]` of the store, without scheme.
    pub endpoint: String,
    pub use_ssl: bool,
    pub bucket: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub presign_expiry: Duration,
}

pub struct S3Adapter {
    config: S3Config,
    signer: Signer,
    client: Client,
}

/// Object key for one version. Name and version are joined without a
/// separator, matching existing buckets.
pub fn object_key(artifact: &ArtifactSpec, version: &semver::Version) -> String {
    format!("{}/{}{}{}", artifact.namespace, artifact.name, version, BLOB_SUFFIX)
}

fn artifact_prefix(artifact: &ArtifactSpec) -> String {
    format!("{}/{}", artifact.namespace, artifact.name)
}

fn owner_tag(artifact: &ArtifactSpec) -> String {
    urlencoding::encode(&artifact.to_string()).into_owned()
}

/// Whether a key's `{name}{version}` segment splits into a non-empty name
/// and a valid version in more than one way, e.g. `app11.0.0` is both
/// `app@11.0.0` and `app1@1.0.0`.
fn is_ambiguous_key(key: &str) -> bool {
    let Some(segment) = key
        .split_once('/')
        .and_then(|(_, rest)| rest.strip_suffix(BLOB_SUFFIX))
    else {
        return false;
    };
    (1..segment.len())
        .filter(|&i| segment.is_char_boundary(i))
        .filter(|&i| semver::Version::parse(&segment[i..]).is_ok())
        .nth(1)
        .is_some()
}

/// Result of checking a stored object against the artifact asking for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    Ours,
    Foreign,
    Missing,
}

impl S3Adapter {
    pub fn new(config: S3Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;
        let signer = Signer {
            access_key_id: config.access_key_id.clone(),
            secret_access_key: config.secret_access_key.clone(),
            region: config.region.clone(),
        };
        Ok(Self { config, signer, client })
    }

    fn base_url(&self) -> String {
        let scheme = if self.config.use_ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.config.endpoint.trim_end_matches('/'))
    }

    /// Path-style canonical URI for a key in the bucket.
    fn object_path(&self, key: &str) -> String {
        format!("/{}", sigv4::encode_path(&format!("{}/{}", self.config.bucket, key)))
    }

    fn bucket_path(&self) -> String {
        format!("/{}", urlencoding::encode(&self.config.bucket))
    }

    /// Build a request signed in the `Authorization` header.
    fn signed(
        &self,
        method: Method,
        path: &str,
        query: &BTreeMap<String, String>,
        payload_hash: &str,
        extra_headers: &[(&str, String)],
    ) -> Result<RequestBuilder, StorageError> {
        let now = Utc::now();
        let date_time = now.format("%Y%m%dT%H%M%SZ").to_string();
        let canonical_query = sigv4::canonical_query(query);

        let mut headers = BTreeMap::new();
        headers.insert("host".to_string(), self.config.endpoint.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
        headers.insert("x-amz-date".to_string(), date_time.clone());
        for (name, value) in extra_headers {
            headers.insert(name.to_string(), value.clone());
        }

        let auth = self
            .signer
            .authorization(method.as_str(), path, &canonical_query, &headers, payload_hash, now)?;

        let mut url = format!("{}{}", self.base_url(), path);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        let mut req = self
            .client
            .request(method, &url)
            .header("x-amz-date", &date_time)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", &auth);
        for (name, value) in extra_headers {
            req = req.header(*name, value);
        }
        Ok(req)
    }

    /// HEAD an object. `None` when it does not exist.
    async fn head_object(&self, key: &str) -> Result<Option<reqwest::header::HeaderMap>, StorageError> {
        let empty_hash = sigv4::payload_hash(b"");
        let resp = self
            .signed(Method::HEAD, &self.object_path(key), &BTreeMap::new(), &empty_hash, &[])?
            .send()
            .await
            .context("S3 HEAD request failed")?;

        match resp.status() {
            s if s.is_success() => Ok(Some(resp.headers().clone())),
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(anyhow::anyhow!("S3 HEAD failed: HTTP {}", s).into()),
        }
    }

    /// Decide whether `key` belongs to `artifact`. Unambiguous keys need no
    /// request. Ambiguous ones are settled by the owner metadata written at
    /// upload; an ambiguous object without it cannot be attributed safely.
    async fn ownership(&self, artifact: &ArtifactSpec, key: &str) -> Result<Ownership, StorageError> {
        if !is_ambiguous_key(key) {
            return Ok(Ownership::Ours);
        }
        let Some(headers) = self.head_object(key).await? else {
            return Ok(Ownership::Missing);
        };
        owner_from_headers(artifact, key, &headers)
    }

    /// One ListObjectsV2 page under `prefix`.
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let mut query = BTreeMap::new();
        query.insert("list-type".to_string(), "2".to_string());
        query.insert("prefix".to_string(), prefix.to_string());
        if let Some(token) = continuation {
            query.insert("continuation-token".to_string(), token.to_string());
        }

        let empty_hash = sigv4::payload_hash(b"");
        let resp = self
            .signed(Method::GET, &self.bucket_path(), &query, &empty_hash, &[])?
            .send()
            .await
            .context("S3 LIST request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("S3 LIST failed: HTTP {} - {}", status, body).into());
        }

        let body = resp.text().await.context("Failed to read S3 list response")?;
        Ok(parse_list_page(&body))
    }
}

#[async_trait]
impl StorageAdapter for S3Adapter {
    async fn upload(
        &self,
        spec: &ArtifactVersionSpec,
        meta: &UploadMeta,
        source: BlobSource<'_>,
    ) -> Result<UploadReceipt, StorageError> {
        let version = spec.require_version("upload")?;
        let key = object_key(&spec.artifact, version);

        // Spool to disk first: the signed request needs the payload hash and length.
        let spool = tempfile::tempfile().context("Failed to create spool file")?;
        let mut spool = tokio::fs::File::from_std(spool);
        let (digest, size) = copy_hashing(source, &mut spool)
            .await
            .context("Failed to spool upload")?;
        spool
            .seek(SeekFrom::Start(0))
            .await
            .context("Failed to rewind spool file")?;

        let content_type = meta
            .content_type
            .clone()
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let payload_hash = hex::encode(&digest);

        let resp = self
            .signed(
                Method::PUT,
                &self.object_path(&key),
                &BTreeMap::new(),
                &payload_hash,
                &[
                    ("content-length", size.to_string()),
                    ("content-type", content_type),
                    (OWNER_HEADER, owner_tag(&spec.artifact)),
                ],
            )?
            .body(reqwest::Body::wrap_stream(ReaderStream::new(spool)))
            .send()
            .await
            .context("S3 PUT request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("S3 PUT failed: HTTP {} - {}", status, body).into());
        }

        debug!(key = %key, size, "S3 upload complete");
        Ok(UploadReceipt {
            hash: format_sha256(&digest),
            size,
        })
    }

    async fn download(
        &self,
        spec: &ArtifactVersionSpec,
        _requested_filename: Option<&str>,
    ) -> Result<BlobLocator, StorageError> {
        let version = spec.require_version("download")?;
        let key = object_key(&spec.artifact, version);
        let path = self.object_path(&key);

        let Some(headers) = self.head_object(&key).await? else {
            return Err(StorageError::NotFound(spec.to_string()));
        };
        if owner_from_headers(&spec.artifact, &key, &headers)? == Ownership::Foreign {
            return Err(StorageError::NotFound(spec.to_string()));
        }

        // Signing failures surface as storage errors, not as "not found".
        let query = self
            .signer
            .presign_query(
                "GET",
                &self.config.endpoint,
                &path,
                self.config.presign_expiry,
                Utc::now(),
            )
            .context("Failed to presign download URL")?;

        Ok(BlobLocator::Redirect {
            url: format!("{}{}?{}", self.base_url(), path, query),
            expires_in: self.config.presign_expiry,
        })
    }

    async fn list_versions(&self, spec: &ArtifactSpec) -> Result<Vec<String>, StorageError> {
        let prefix = artifact_prefix(spec);
        let mut versions = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self.list_page(&prefix, continuation.as_deref()).await?;
            for key in &page.keys {
                let Some(version) = version_from_key(&prefix, key) else {
                    continue;
                };
                if semver::Version::parse(&version).is_err() {
                    continue;
                }
                match self.ownership(spec, key).await? {
                    Ownership::Ours => versions.push(version),
                    Ownership::Foreign => {
                        debug!(key = %key, artifact = %spec, "Skipping object of another artifact");
                    }
                    Ownership::Missing => {}
                }
            }

            match page.next_continuation {
                Some(token) if page.truncated => continuation = Some(token),
                _ => break,
            }
        }

        Ok(versions)
    }

    async fn delete_version(&self, spec: &ArtifactVersionSpec) -> Result<(), StorageError> {
        let version = spec.require_version("delete")?;
        let key = object_key(&spec.artifact, version);

        match self.ownership(&spec.artifact, &key).await? {
            Ownership::Ours => {}
            Ownership::Missing => return Ok(()),
            Ownership::Foreign => {
                debug!(key = %key, artifact = %spec, "Object belongs to another artifact, not deleting");
                return Ok(());
            }
        }

        let empty_hash = sigv4::payload_hash(b"");
        let resp = self
            .signed(Method::DELETE, &self.object_path(&key), &BTreeMap::new(), &empty_hash, &[])?
            .send()
            .await
            .context("S3 DELETE request failed")?;

        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("S3 DELETE failed: HTTP {} - {}", status, body).into());
        }

        debug!(key = %key, "S3 delete complete");
        Ok(())
    }
}

fn owner_from_headers(
    artifact: &ArtifactSpec,
    key: &str,
    headers: &reqwest::header::HeaderMap,
) -> Result<Ownership, StorageError> {
    match headers.get(OWNER_HEADER).and_then(|v| v.to_str().ok()) {
        Some(owner) if owner == owner_tag(artifact) => Ok(Ownership::Ours),
        Some(_) => Ok(Ownership::Foreign),
        None if is_ambiguous_key(key) => {
            warn!(key = %key, artifact = %artifact, "Ambiguous object key has no owner metadata");
            Err(StorageError::Unsupported(
                "object key is ambiguous between artifacts and carries no owner metadata",
            ))
        }
        None => Ok(Ownership::Ours),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ListPage {
    keys: Vec<String>,
    truncated: bool,
    next_continuation: Option<String>,
}

/// Pull the fields we need out of a ListObjectsV2 XML response.
fn parse_list_page(xml: &str) -> ListPage {
    ListPage {
        keys: xml_values(xml, "Key"),
        truncated: xml_values(xml, "IsTruncated").first().map(String::as_str) == Some("true"),
        next_continuation: xml_values(xml, "NextContinuationToken").into_iter().next(),
    }
}

fn xml_values(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut remaining = xml;
    while let Some(start) = remaining.find(&open) {
        remaining = &remaining[start + open.len()..];
        match remaining.find(&close) {
            Some(end) => {
                values.push(xml_unescape(&remaining[..end]));
                remaining = &remaining[end + close.len()..];
            }
            None => break,
        }
    }
    values
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// `{prefix}{version}/blob` → `{version}`. Keys of other shapes are ignored.
fn version_from_key(prefix: &str, key: &str) -> Option<String> {
    let version = key.strip_prefix(prefix)?.strip_suffix(BLOB_SUFFIX)?;
    if version.is_empty() || version.contains('/') {
        return None;
    }
    Some(version.to_string())
}
