//! AWS Signature Version 4 for S3-compatible stores, both the
//! `Authorization` header form and the presigned query-string form.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

#[derive(Clone)]
pub struct Signer {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Signer {
    /// Compute the `Authorization` header value for a request. `headers`
    /// must hold every header to be signed, with lowercase names.
    pub fn authorization(
        &self,
        method: &str,
        canonical_uri: &str,
        canonical_query: &str,
        headers: &BTreeMap<String, String>,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let (date_time, date) = timestamps(now);
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
            .collect();
        let signed_headers: String = headers.keys().cloned().collect::<Vec<_>>().join(";");

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
        );
        let scope = self.scope(&date);
        let signature = self.signature(&canonical_request, &date_time, &date, &scope)?;

        Ok(format!(
            "{} Credential={}/{},SignedHeaders={},Signature={}",
            ALGORITHM, self.access_key_id, scope, signed_headers, signature
        ))
    }

    /// Produce the query string (signature included) of a presigned URL for
    /// `method` on `canonical_uri`, valid for `expires`.
    pub fn presign_query(
        &self,
        method: &str,
        host: &str,
        canonical_uri: &str,
        expires: Duration,
        now: DateTime<Utc>,
    ) -> anyhow::Result<String> {
        let (date_time, date) = timestamps(now);
        let scope = self.scope(&date);

        let mut params = BTreeMap::new();
        params.insert("X-Amz-Algorithm".to_string(), ALGORITHM.to_string());
        params.insert(
            "X-Amz-Credential".to_string(),
            format!("{}/{}", self.access_key_id, scope),
        );
        params.insert("X-Amz-Date".to_string(), date_time.clone());
        params.insert("X-Amz-Expires".to_string(), expires.as_secs().to_string());
        params.insert("X-Amz-SignedHeaders".to_string(), "host".to_string());
        let query = canonical_query(&params);

        let canonical_request = format!(
            "{}\n{}\n{}\nhost:{}\n\nhost\n{}",
            method, canonical_uri, query, host, UNSIGNED_PAYLOAD
        );
        let signature = self.signature(&canonical_request, &date_time, &date, &scope)?;

        Ok(format!("{}&X-Amz-Signature={}", query, signature))
    }

    fn scope(&self, date: &str) -> String {
        format!("{}/{}/s3/aws4_request", date, self.region)
    }

    fn signature(
        &self,
        canonical_request: &str,
        date_time: &str,
        date: &str,
        scope: &str,
    ) -> anyhow::Result<String> {
        let cr_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
        let string_to_sign = format!("{}\n{}\n{}\n{}", ALGORITHM, date_time, scope, cr_hash);

        let key = format!("AWS4{}", self.secret_access_key);
        let k_date = hmac_sha256(key.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, b"s3")?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;

        Ok(hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn timestamps(now: DateTime<Utc>) -> (String, String) {
    (
        now.format("%Y%m%dT%H%M%SZ").to_string(),
        now.format("%Y%m%d").to_string(),
    )
}

pub fn payload_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Sorted, URI-encoded `key=value` pairs joined with `&`.
pub fn canonical_query(params: &BTreeMap<String, String>) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// URI-encode each segment of an object path, keeping the separators.
pub fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
