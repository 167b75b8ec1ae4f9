use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::io::{ReaderStream, StreamReader};
use tracing::info;

use tinyrepo_common::{ArtifactSpec, ArtifactVersionSpec, BlobLocator, UploadMeta};
use tinyrepo_storage::{delete_artifact as prune_artifact, resolve, sorted_versions, spawn_tidy};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Serialize, Deserialize)]
pub struct VersionsResponse {
    pub count: usize,
    pub latest: String,
    pub versions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub hash: String,
    pub size: u64,
}

#[derive(Deserialize, Default)]
pub struct UploadQuery {
    pub keep: Option<String>,
}

/// GET /{namespace}/{name}: every stored version, highest first
pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<VersionsResponse>, ApiError> {
    let spec = ArtifactSpec::new(namespace, name)?;
    let versions = sorted_versions(state.storage.as_ref(), &spec).await?;

    let Some(latest) = versions.first() else {
        return Err(ApiError::NotFound(format!("no versions of {}", spec)));
    };

    Ok(Json(VersionsResponse {
        count: versions.len(),
        latest: latest.to_string(),
        versions: versions.iter().map(|v| v.to_string()).collect(),
    }))
}

/// GET /{namespace}/{name}/{version}
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    download_blob(&state, &namespace, &name, &version, None).await
}

/// GET /{namespace}/{name}/{version}/{filename}
pub async fn download_as(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version, filename)): Path<(String, String, String, String)>,
) -> Result<Response, ApiError> {
    download_blob(&state, &namespace, &name, &version, Some(&filename)).await
}

async fn download_blob(
    state: &AppState,
    namespace: &str,
    name: &str,
    version: &str,
    filename: Option<&str>,
) -> Result<Response, ApiError> {
    let spec = ArtifactVersionSpec::from_segments(namespace, name, version)?;
    let spec = resolve(state.storage.as_ref(), &spec).await?;

    match state.storage.download(&spec, filename).await? {
        BlobLocator::File {
            file,
            size,
            filename,
            content_type,
            hash,
        } => {
            let mut headers = HeaderMap::new();
            let content_type = content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE);
            insert_header(&mut headers, header::CONTENT_TYPE, content_type);
            insert_header(&mut headers, header::CONTENT_LENGTH, &size.to_string());
            insert_header(
                &mut headers,
                header::CONTENT_DISPOSITION,
                &format!("attachment; filename=\"{}\"", filename.replace('"', "\\\"")),
            );
            if let Some(hash) = hash {
                insert_header(&mut headers, header::ETAG, &format!("\"{}\"", hash));
            }

            Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
        }
        BlobLocator::Redirect { url, .. } => Ok(Redirect::temporary(&url).into_response()),
    }
}

fn insert_header(headers: &mut HeaderMap, name: header::HeaderName, value: &str) {
    if let Ok(v) = HeaderValue::from_str(value) {
        headers.insert(name, v);
    }
}

/// PUT /{namespace}/{name}/{version}
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version)): Path<(String, String, String)>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    upload_blob(state, &namespace, &name, &version, None, query, &headers, body).await
}

/// PUT /{namespace}/{name}/{version}/{filename}
pub async fn upload_as(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version, filename)): Path<(String, String, String, String)>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    upload_blob(state, &namespace, &name, &version, Some(filename), query, &headers, body).await
}

#[allow(clippy::too_many_arguments)]
async fn upload_blob(
    state: Arc<AppState>,
    namespace: &str,
    name: &str,
    version: &str,
    filename: Option<String>,
    query: UploadQuery,
    headers: &HeaderMap,
    body: Body,
) -> Result<Json<UploadResponse>, ApiError> {
    let spec = ArtifactVersionSpec::from_segments(namespace, name, version)?;
    let Some(version) = spec.version().cloned() else {
        return Err(ApiError::BadRequest(
            "uploading to latest version is not allowed".into(),
        ));
    };
    let keep = parse_keep(query.keep.as_deref())?;

    let meta = UploadMeta {
        original_filename: filename,
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };

    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut reader = StreamReader::new(stream);
    let receipt = state.storage.upload(&spec, &meta, &mut reader).await?;

    info!(artifact = %spec, size = receipt.size, hash = %receipt.hash, "Uploaded artifact");

    if keep > 0 {
        spawn_tidy(Arc::clone(&state.storage), spec.artifact.clone(), keep, version.clone());
    }

    Ok(Json(UploadResponse {
        namespace: spec.artifact.namespace,
        name: spec.artifact.name,
        version: version.to_string(),
        hash: receipt.hash,
        size: receipt.size,
    }))
}

/// `keep` absent or empty means no retention pass.
fn parse_keep(raw: Option<&str>) -> Result<usize, ApiError> {
    match raw {
        None | Some("") => Ok(0),
        Some(s) => s
            .parse::<usize>()
            .map_err(|_| ApiError::BadRequest(format!("invalid keep parameter '{}'", s))),
    }
}

/// DELETE /{namespace}/{name}/{version}
pub async fn delete_version(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version)): Path<(String, String, String)>,
) -> Result<StatusCode, ApiError> {
    remove_version(&state, &namespace, &name, &version).await
}

/// DELETE /{namespace}/{name}/{version}/{filename}. The filename is ignored.
pub async fn delete_version_as(
    State(state): State<Arc<AppState>>,
    Path((namespace, name, version, _filename)): Path<(String, String, String, String)>,
) -> Result<StatusCode, ApiError> {
    remove_version(&state, &namespace, &name, &version).await
}

async fn remove_version(
    state: &AppState,
    namespace: &str,
    name: &str,
    version: &str,
) -> Result<StatusCode, ApiError> {
    let spec = ArtifactVersionSpec::from_segments(namespace, name, version)?;
    let spec = resolve(state.storage.as_ref(), &spec).await?;
    state.storage.delete_version(&spec).await?;

    info!(artifact = %spec, "Deleted version");
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /{namespace}/{name}: prune every version before responding
pub async fn delete_artifact(
    State(state): State<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let spec = ArtifactSpec::new(namespace, name)?;
    let report = prune_artifact(state.storage.as_ref(), &spec).await?;

    if !report.failed.is_empty() {
        return Err(ApiError::Storage(
            anyhow::anyhow!(
                "failed to delete {} of {} versions of {}",
                report.failed.len(),
                report.failed.len() + report.deleted.len(),
                spec
            )
            .into(),
        ));
    }

    info!(artifact = %spec, deleted = report.deleted.len(), "Deleted artifact");
    Ok(StatusCode::NO_CONTENT)
}
