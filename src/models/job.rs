use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::recipe::Arch;
use super::HasId;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Create,
    Customize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Creating,
    FetchingImage,
    FetchingRecipe,
    WaitingForRepos,
    BuildingImage,
    PackagingArtifacts,
    WaitingOnUser,
    Error,
    Success,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Error | JobStatus::Success)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SshContainerStatus {
    Pending,
    Ready,
    Terminated,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct SshConnectionInfo {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default = "default_ssh_username")]
    pub username: String,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_username() -> String {
    "root".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct SshContainer {
    pub name: String,
    pub jail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SshContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_info: Option<SshConnectionInfo>,
}

/// Names of cluster resources synthesized for this job, persisted so
/// deletion can be reconstructed without storing raw YAML (§9 design note).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct JobKubernetesResources {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configmap: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pvc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct Job {
    pub id: String,
    pub job_type: JobType,
    /// Recipe id if `job_type=create`, Image id if `job_type=customize`.
    pub artifact_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_id: Option<String>,
    #[serde(default)]
    pub enable_debug: bool,
    pub image_root_archive_name: String,
    pub kernel_file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initrd_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_parameters_file_name: Option<String>,
    #[serde(default)]
    pub ssh_containers: Vec<SshContainer>,
    pub require_dkms: bool,
    pub arch: Arch,
    pub build_env_size_gib: u32,
    pub job_mem_size_gib: u32,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resultant_image_id: Option<String>,
    #[serde(default)]
    pub kubernetes: JobKubernetesResources,
    /// xname of the remote build node, or `None` when running in-cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_build_node: Option<String>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, schemars::JsonSchema)]
pub struct DeletedJob {
    #[serde(flatten)]
    pub job: Job,
    pub deleted: DateTime<Utc>,
}

impl HasId for Job {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for DeletedJob {
    fn id(&self) -> &str {
        &self.job.id
    }
}

impl Job {
    /// `kernel_file_name` defaulted from arch when absent.
    pub fn default_kernel_file_name(arch: Arch) -> &'static str {
        match arch {
            Arch::X86_64 => "vmlinuz",
            Arch::Aarch64 => "Image",
        }
    }
}
