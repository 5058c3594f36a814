pub mod artifact_link;
pub mod image;
pub mod job;
pub mod public_key;
pub mod recipe;
pub mod remote_build_node;

pub use artifact_link::{ArtifactLink, ArtifactLinkType};
pub use image::{apply_metadata_operations, DeletedImage, Image, MetadataOperation};
pub use job::{
    DeletedJob, Job, JobKubernetesResources, JobStatus, JobType, SshContainer, SshConnectionInfo, SshContainerStatus,
};
pub use public_key::{DeletedPublicKey, PublicKey};
pub use recipe::{Arch, DeletedRecipe, LinuxDistribution, Recipe, RecipeType, TemplateDictEntry};
pub use remote_build_node::{RemoteBuildNode, RemoteNodeStatus, UNKNOWN_NUM_JOBS};

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Records persisted through the record store all expose their id this way.
pub trait HasId {
    fn id(&self) -> &str;
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}
