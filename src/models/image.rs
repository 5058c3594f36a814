use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recipe::Arch;
use super::{ArtifactLink, HasId};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct Image {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<ArtifactLink>,
    pub arch: Arch,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct DeletedImage {
    #[serde(flatten)]
    pub image: Image,
    pub deleted: DateTime<Utc>,
}

impl HasId for Image {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for DeletedImage {
    fn id(&self) -> &str {
        &self.image.id
    }
}

impl Image {
    pub fn into_deleted(self) -> DeletedImage {
        DeletedImage {
            image: self,
            deleted: super::now(),
        }
    }
}

/// v3 image metadata PATCH op: a plain dictionary upsert/remove keyed by
/// `key`. `remove` on an absent key is a no-op (idempotency rule, §7).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum MetadataOperation {
    Set { key: String, value: String },
    Remove { key: String },
}

pub fn apply_metadata_operations(metadata: &mut BTreeMap<String, String>, ops: &[MetadataOperation]) {
    for op in ops {
        match op {
            MetadataOperation::Set { key, value } => {
                metadata.insert(key.clone(), value.clone());
            }
            MetadataOperation::Remove { key } => {
                metadata.remove(key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_metadata_operations_set_and_remove() {
        let mut metadata = BTreeMap::new();
        let ops = vec![
            MetadataOperation::Set {
                key: "os".to_string(),
                value: "sles15".to_string(),
            },
            MetadataOperation::Set {
                key: "os".to_string(),
                value: "sles12".to_string(),
            },
            MetadataOperation::Remove {
                key: "nonexistent".to_string(),
            },
        ];

        apply_metadata_operations(&mut metadata, &ops);

        assert_eq!(metadata.get("os"), Some(&"sles12".to_string()));
        assert_eq!(metadata.len(), 1);
    }
}
