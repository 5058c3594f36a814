use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactLink, HasId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum RecipeType {
    KiwiNg,
    Packer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LinuxDistribution {
    Sles12,
    Sles15,
    Centos7,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    X86_64,
    Aarch64,
}

/// Entry of `Recipe.template_dictionary`: an ordered list (not a map) because
/// duplicate keys may appear and order is significant to the rendered
/// template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct TemplateDictEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct Recipe {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<ArtifactLink>,
    pub recipe_type: RecipeType,
    pub linux_distribution: LinuxDistribution,
    pub arch: Arch,
    pub require_dkms: bool,
    #[serde(default)]
    pub template_dictionary: Vec<TemplateDictEntry>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct DeletedRecipe {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub deleted: DateTime<Utc>,
}

impl HasId for Recipe {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for DeletedRecipe {
    fn id(&self) -> &str {
        &self.recipe.id
    }
}

impl Recipe {
    pub fn into_deleted(self) -> DeletedRecipe {
        DeletedRecipe {
            recipe: self,
            deleted: super::now(),
        }
    }
}
