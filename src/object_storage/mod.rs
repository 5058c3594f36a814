//! Object-store gateway (component A): a uniform interface over an
//! S3-compatible store, with two credential contexts ("ims" and "sts")
//! because multi-part copies must be performed by the original uploader
//! principal.

pub mod errors;
pub mod s3;

use url::Url;

use errors::ObjectStorageError;

/// Which credential context a call should be signed with. Most operations
/// use `Ims`; `Sts` is required for copies that must be performed by the
/// original uploader principal (soft-delete/undelete key rewrites).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialContext {
    Ims,
    Sts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub etag: String,
    pub content_length: u64,
}

/// Parses `s3://bucket/key[?query]` into its components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Url {
    pub bucket: String,
    pub key: String,
}

impl S3Url {
    pub fn parse(path: &str) -> Result<S3Url, ObjectStorageError> {
        let url = Url::parse(path).map_err(|e| ObjectStorageError::InvalidLinkPath {
            path: path.to_string(),
            raw_error_message: e.to_string(),
        })?;

        if url.scheme() != "s3" {
            return Err(ObjectStorageError::InvalidLinkPath {
                path: path.to_string(),
                raw_error_message: format!("unsupported scheme `{}`, expected `s3`", url.scheme()),
            });
        }

        let bucket = url
            .host_str()
            .ok_or_else(|| ObjectStorageError::InvalidLinkPath {
                path: path.to_string(),
                raw_error_message: "missing bucket name".to_string(),
            })?
            .to_string();

        let mut key = url.path().trim_start_matches('/').to_string();
        if let Some(query) = url.query() {
            key = format!("{key}?{query}");
        }

        Ok(S3Url { bucket, key })
    }

    pub fn path(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}

/// Strips surrounding quote characters S3 wraps etags in, before comparison.
pub fn normalize_etag(etag: &str) -> String {
    etag.trim_matches('"').to_string()
}

pub trait ObjectStorageGateway: Send + Sync {
    fn head(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<ObjectMetadata, ObjectStorageError>;
    fn get(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStorageError>;
    fn put(&self, ctx: CredentialContext, bucket: &str, key: &str, body: Vec<u8>) -> Result<(), ObjectStorageError>;
    fn delete(&self, ctx: CredentialContext, bucket: &str, key: &str) -> Result<(), ObjectStorageError>;
    fn copy(
        &self,
        ctx: CredentialContext,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> Result<ObjectMetadata, ObjectStorageError>;
    fn presign_get(
        &self,
        ctx: CredentialContext,
        bucket: &str,
        key: &str,
        ttl: std::time::Duration,
    ) -> Result<String, ObjectStorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3url_parse_plain() {
        let url = S3Url::parse("s3://boot-images/abc/manifest.json").expect("parse");
        assert_eq!(url.bucket, "boot-images");
        assert_eq!(url.key, "abc/manifest.json");
        assert_eq!(url.path(), "s3://boot-images/abc/manifest.json");
    }

    #[test]
    fn test_s3url_parse_with_query() {
        let url = S3Url::parse("s3://ims/abc/recipe.tgz?versionId=123").expect("parse");
        assert_eq!(url.bucket, "ims");
        assert_eq!(url.key, "abc/recipe.tgz?versionId=123");
    }

    #[test]
    fn test_s3url_parse_rejects_non_s3_scheme() {
        assert!(S3Url::parse("https://example.com/x").is_err());
    }

    #[test]
    fn test_normalize_etag_strips_quotes() {
        assert_eq!(normalize_etag("\"abc123\""), "abc123");
        assert_eq!(normalize_etag("abc123"), "abc123");
    }
}
