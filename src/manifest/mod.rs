//! Manifest validator (component C).
//!
//! An image manifest is `{version, created, artifacts: [{type, md5?, link}]}`.
//! Validation follows the 7-step sequence; each failure maps to a specific
//! `ImsError` kind with a stable detail.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ImsError;
use crate::models::ArtifactLink;
use crate::object_storage::{CredentialContext, ObjectStorageGateway, S3Url};

pub const IMAGE_MANIFEST_VERSION_1_0: &str = "1.0";
pub const IMAGE_MANIFEST_ARTIFACT_TYPE_ROOTFS_SQUASHFS_PREFIX: &str = "application/vnd.cray.image.rootfs.squashfs";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManifestArtifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    pub link: ArtifactLink,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageManifest {
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    pub artifacts: Vec<ManifestArtifact>,
}

impl ImageManifest {
    pub fn rootfs_artifact(&self) -> Option<&ManifestArtifact> {
        self.artifacts
            .iter()
            .find(|a| a.artifact_type.starts_with(IMAGE_MANIFEST_ARTIFACT_TYPE_ROOTFS_SQUASHFS_PREFIX))
    }
}

/// Fetches and validates the manifest pointed to by `link` against the
/// 7-step sequence in order, returning the parsed manifest on success.
pub fn fetch_and_validate(
    gateway: &dyn ObjectStorageGateway,
    link: &ArtifactLink,
    max_size_bytes: u64,
) -> Result<ImageManifest, ImsError> {
    let url = S3Url::parse(&link.path).map_err(|_| ImsError::bad_request(format!("invalid link path `{}`", link.path)))?;

    // 1. Artifact exists.
    let head = gateway
        .head(CredentialContext::Ims, &url.bucket, &url.key)
        .map_err(|_| ImsError::validation_failure(vec![format!("artifact `{}` not found in object store", link.path)]))?;

    // 2. Object size under the configured ceiling.
    if head.content_length >= max_size_bytes {
        return Err(ImsError::bad_request(format!(
            "manifest `{}` is {} bytes, exceeding the {} byte limit",
            link.path, head.content_length, max_size_bytes
        )));
    }

    // 3. Body decodes as UTF-8 JSON.
    let body = gateway
        .get(CredentialContext::Ims, &url.bucket, &url.key)
        .map_err(|e| ImsError::internal(e.to_string()))?;
    let text = String::from_utf8(body).map_err(|_| ImsError::bad_request("manifest body is not valid UTF-8"))?;
    let raw: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|_| ImsError::bad_request("manifest body is not valid JSON"))?;

    // 4. version ∈ {"1.0"}.
    let version = raw
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ImsError::bad_request("manifest missing `version`"))?;
    if version != IMAGE_MANIFEST_VERSION_1_0 {
        return Err(ImsError::bad_request(format!("unknown manifest version `{version}`")));
    }

    // 5. artifacts is a list of {link: {type, path}, type}.
    let manifest: ImageManifest =
        serde_json::from_str(&text).map_err(|_| ImsError::bad_request("manifest has a malformed `artifacts` list"))?;

    for artifact in &manifest.artifacts {
        if artifact.link.path.is_empty() {
            return Err(ImsError::bad_request("manifest artifact has an empty link path"));
        }
    }

    // 6. Each artifact's link resolves in the object store.
    for artifact in &manifest.artifacts {
        let artifact_url = S3Url::parse(&artifact.link.path)
            .map_err(|_| ImsError::bad_request(format!("invalid artifact link path `{}`", artifact.link.path)))?;
        gateway
            .head(CredentialContext::Ims, &artifact_url.bucket, &artifact_url.key)
            .map_err(|_| {
                ImsError::validation_failure(vec![format!("artifact `{}` not found in object store", artifact.link.path)])
            })?;
    }

    // 7. Exactly one artifact is the rootfs squashfs.
    let rootfs_count = manifest
        .artifacts
        .iter()
        .filter(|a| a.artifact_type.starts_with(IMAGE_MANIFEST_ARTIFACT_TYPE_ROOTFS_SQUASHFS_PREFIX))
        .count();
    if rootfs_count == 0 {
        return Err(ImsError::bad_request("manifest has no rootfs squashfs artifact"));
    }
    if rootfs_count > 1 {
        return Err(ImsError::bad_request("manifest has more than one rootfs squashfs artifact"));
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_storage::errors::ObjectStorageError;
    use crate::object_storage::ObjectMetadata;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeGateway {
        objects: Mutex<HashMap<(String, String), Vec<u8>>>,
    }

    impl FakeGateway {
        fn new() -> Self {
            FakeGateway {
                objects: Mutex::new(HashMap::new()),
            }
        }

        fn with_object(self, bucket: &str, key: &str, body: &str) -> Self {
            self.objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), body.as_bytes().to_vec());
            self
        }
    }

    impl ObjectStorageGateway for FakeGateway {
        fn head(&self, _ctx: CredentialContext, bucket: &str, key: &str) -> Result<ObjectMetadata, ObjectStorageError> {
            let objects = self.objects.lock().unwrap();
            match objects.get(&(bucket.to_string(), key.to_string())) {
                Some(body) => Ok(ObjectMetadata {
                    etag: "e1".to_string(),
                    content_length: body.len() as u64,
                }),
                None => Err(ObjectStorageError::ObjectNotFound {
                    bucket_name: bucket.to_string(),
                    key: key.to_string(),
                }),
            }
        }

        fn get(&self, _ctx: CredentialContext, bucket: &str, key: &str) -> Result<Vec<u8>, ObjectStorageError> {
            self.objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned()
                .ok_or_else(|| ObjectStorageError::ObjectNotFound {
                    bucket_name: bucket.to_string(),
                    key: key.to_string(),
                })
        }

        fn put(&self, _ctx: CredentialContext, _b: &str, _k: &str, _body: Vec<u8>) -> Result<(), ObjectStorageError> {
            unimplemented!()
        }

        fn delete(&self, _ctx: CredentialContext, _b: &str, _k: &str) -> Result<(), ObjectStorageError> {
            unimplemented!()
        }

        fn copy(
            &self,
            _ctx: CredentialContext,
            _sb: &str,
            _sk: &str,
            _db: &str,
            _dk: &str,
        ) -> Result<ObjectMetadata, ObjectStorageError> {
            unimplemented!()
        }

        fn presign_get(
            &self,
            _ctx: CredentialContext,
            _b: &str,
            _k: &str,
            _ttl: std::time::Duration,
        ) -> Result<String, ObjectStorageError> {
            unimplemented!()
        }
    }

    fn valid_manifest_json() -> String {
        r#"{
            "version": "1.0",
            "created": "2026-01-01T00:00:00Z",
            "artifacts": [
                {"type": "application/vnd.cray.image.rootfs.squashfs", "md5": "abc", "link": {"path": "s3://boot-images/A/rootfs", "etag": "e", "type": "s3"}},
                {"type": "application/vnd.cray.image.kernel", "link": {"path": "s3://boot-images/A/kernel", "etag": "e", "type": "s3"}}
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_s1_valid_manifest_with_single_rootfs_passes() {
        let gateway = FakeGateway::new()
            .with_object("boot-images", "A/manifest.json", &valid_manifest_json())
            .with_object("boot-images", "A/rootfs", "rootfs-bytes")
            .with_object("boot-images", "A/kernel", "kernel-bytes");

        let link = ArtifactLink::new("s3://boot-images/A/manifest.json", "E1");
        let manifest = fetch_and_validate(&gateway, &link, 1024 * 1024).expect("validation should pass");

        assert!(manifest.rootfs_artifact().is_some());
    }

    #[test]
    fn test_s3_manifest_missing_rootfs_is_bad_request() {
        let manifest_json = r#"{
            "version": "1.0",
            "artifacts": [
                {"type": "application/vnd.cray.image.kernel", "link": {"path": "s3://boot-images/A/kernel", "etag": "e", "type": "s3"}}
            ]
        }"#;
        let gateway = FakeGateway::new()
            .with_object("boot-images", "A/manifest.json", manifest_json)
            .with_object("boot-images", "A/kernel", "kernel-bytes");

        let link = ArtifactLink::new("s3://boot-images/A/manifest.json", "E1");
        let result = fetch_and_validate(&gateway, &link, 1024 * 1024);

        assert!(matches!(result, Err(ImsError::BadRequest { .. })));
    }

    #[test]
    fn test_unknown_manifest_version_is_bad_request() {
        let manifest_json = r#"{"version": "2.0", "artifacts": []}"#;
        let gateway = FakeGateway::new().with_object("boot-images", "A/manifest.json", manifest_json);

        let link = ArtifactLink::new("s3://boot-images/A/manifest.json", "E1");
        let result = fetch_and_validate(&gateway, &link, 1024 * 1024);

        assert!(matches!(result, Err(ImsError::BadRequest { .. })));
    }

    #[test]
    fn test_oversized_manifest_is_bad_request() {
        let gateway = FakeGateway::new().with_object("boot-images", "A/manifest.json", &valid_manifest_json());
        let link = ArtifactLink::new("s3://boot-images/A/manifest.json", "E1");

        let result = fetch_and_validate(&gateway, &link, 4);

        assert!(matches!(result, Err(ImsError::BadRequest { .. })));
    }

    #[test]
    fn test_artifact_not_in_store_is_validation_failure() {
        let gateway = FakeGateway::new().with_object("boot-images", "A/manifest.json", &valid_manifest_json());
        // rootfs/kernel objects deliberately absent.
        let link = ArtifactLink::new("s3://boot-images/A/manifest.json", "E1");

        let result = fetch_and_validate(&gateway, &link, 1024 * 1024);

        assert!(matches!(result, Err(ImsError::ValidationFailure { .. })));
    }
}
