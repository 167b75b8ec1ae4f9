use serde::{Deserialize, Serialize};

/// Filename used for the stored blob and as the fallback download name.
pub const DEFAULT_BLOB_NAME: &str = "blob";

/// Sidecar record persisted next to a blob by backends that support it.
///
/// Written once per upload and never mutated; a re-upload replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMeta {
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub content_type: String,
    /// `sha256:<hex>` of the persisted bytes.
    #[serde(default)]
    pub hash: String,
}

impl BlobMeta {
    /// Name to offer the client: the explicitly requested one, else the
    /// stored original, else [`DEFAULT_BLOB_NAME`].
    pub fn suggested_filename(&self, requested: Option<&str>) -> String {
        requested
            .filter(|f| !f.is_empty())
            .or(Some(self.original_filename.as_str()).filter(|f| !f.is_empty()))
            .unwrap_or(DEFAULT_BLOB_NAME)
            .to_string()
    }

    pub fn content_type(&self) -> Option<&str> {
        Some(self.content_type.as_str()).filter(|c| !c.is_empty())
    }
}

/// Caller-supplied metadata accompanying an upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadMeta {
    pub original_filename: Option<String>,
    pub content_type: Option<String>,
}

/// Render a SHA-256 digest in the `sha256:<hex>` form stored in metadata.
pub fn format_sha256(digest: &[u8]) -> String {
    format!("sha256:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_json_field_names() {
        let meta = BlobMeta {
            original_filename: "app.tar.gz".into(),
            content_type: "application/gzip".into(),
            hash: "sha256:abc".into(),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["originalFilename"], "app.tar.gz");
        assert_eq!(json["contentType"], "application/gzip");
        assert_eq!(json["hash"], "sha256:abc");
    }

    #[test]
    fn test_meta_tolerates_missing_fields() {
        let meta: BlobMeta = serde_json::from_str(r#"{"hash":"sha256:00"}"#).unwrap();
        assert_eq!(meta.original_filename, "");
        assert_eq!(meta.content_type(), None);
    }

    #[test]
    fn test_suggested_filename_precedence() {
        let meta = BlobMeta {
            original_filename: "stored.bin".into(),
            ..Default::default()
        };
        assert_eq!(meta.suggested_filename(Some("asked.bin")), "asked.bin");
        assert_eq!(meta.suggested_filename(None), "stored.bin");
        assert_eq!(meta.suggested_filename(Some("")), "stored.bin");
        assert_eq!(BlobMeta::default().suggested_filename(None), "blob");
    }

    #[test]
    fn test_format_sha256() {
        assert_eq!(format_sha256(&[0x00, 0xab, 0x10]), "sha256:00ab10");
    }
}
