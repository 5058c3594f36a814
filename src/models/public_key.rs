use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::HasId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct PublicKey {
    pub id: String,
    pub name: String,
    pub public_key: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct DeletedPublicKey {
    #[serde(flatten)]
    pub public_key: PublicKey,
    pub deleted: DateTime<Utc>,
}

impl HasId for PublicKey {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for DeletedPublicKey {
    fn id(&self) -> &str {
        &self.public_key.id
    }
}

impl PublicKey {
    pub fn new(name: String, public_key: String) -> Self {
        PublicKey {
            id: super::new_id(),
            name,
            public_key,
            created: super::now(),
        }
    }

    pub fn into_deleted(self) -> DeletedPublicKey {
        DeletedPublicKey {
            public_key: self,
            deleted: super::now(),
        }
    }
}
