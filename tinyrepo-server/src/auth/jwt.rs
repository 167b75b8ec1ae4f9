use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Claims carried by an access token. `prefix` restricts which request
/// paths the bearer may touch; `exp` is optional and enforced when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub prefix: String,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Claims {
    /// Whether `path` lies under this token's prefix.
    pub fn allows(&self, path: &str) -> bool {
        path.starts_with(&normalize_prefix(&self.prefix))
    }
}

/// Prefixes are stored and compared with a leading `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.starts_with('/') {
        prefix.to_string()
    } else {
        format!("/{}", prefix)
    }
}

/// Issue a new HS256 token.
pub fn issue_token(
    secret: &[u8],
    name: &str,
    namespace: &str,
    prefix: &str,
    ttl: Option<Duration>,
) -> anyhow::Result<String> {
    let now = Utc::now();
    let claims = Claims {
        name: name.to_string(),
        namespace: namespace.to_string(),
        prefix: normalize_prefix(prefix),
        iat: now.timestamp(),
        exp: ttl.map(|ttl| (now + ttl).timestamp()),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret),
    )?;
    Ok(token)
}

/// Validate a token's signature (and expiry, if it has one) and return claims
pub fn validate_token(secret: &[u8], token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims.clear();

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

/// Axum middleware that validates JWT Bearer tokens and the path prefix
pub async fn jwt_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Response {
    let auth_header = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(t) => t,
        None => {
            return ApiError::Unauthorized("missing or invalid Authorization header".into())
                .into_response();
        }
    };

    let claims = match validate_token(&state.jwt_secret, token) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Rejected token");
            return ApiError::Unauthorized("invalid or expired token".into()).into_response();
        }
    };

    let path = req.uri().path().to_string();
    if !claims.allows(&path) {
        debug!(name = %claims.name, prefix = %claims.prefix, path = %path, "Path outside token prefix");
        return ApiError::Unauthorized(format!("unauthorized to access path {}", path)).into_response();
    }

    // Store claims in request extensions for handlers
    req.extensions_mut().insert(claims);
    next.run(req).await
}
