use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactLinkType {
    S3,
}

/// Object-store pointer shared by Recipe, Image, and manifest artifact
/// entries: `{path: "s3://bucket/key", etag, type}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct ArtifactLink {
    pub path: String,
    pub etag: String,
    #[serde(rename = "type")]
    pub link_type: ArtifactLinkType,
}

impl ArtifactLink {
    pub fn new(path: impl Into<String>, etag: impl Into<String>) -> Self {
        ArtifactLink {
            path: path.into(),
            etag: etag.into(),
            link_type: ArtifactLinkType::S3,
        }
    }
}
