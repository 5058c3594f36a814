use serde::{Deserialize, Serialize};

use super::recipe::Arch;
use super::HasId;

pub const UNKNOWN_NUM_JOBS: u32 = 10_000;

/// `{xname}` — identified by cluster hardware name. Status is computed on
/// demand, never stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct RemoteBuildNode {
    pub xname: String,
}

impl HasId for RemoteBuildNode {
    fn id(&self) -> &str {
        &self.xname
    }
}

/// Transient value object returned by a probe; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteNodeStatus {
    pub xname: String,
    pub node_arch: Option<Arch>,
    pub podman_present: bool,
    pub num_current_jobs: u32,
    pub able_to_run_jobs: bool,
}

impl RemoteNodeStatus {
    pub fn matches(&self, arch: Arch) -> bool {
        self.able_to_run_jobs && self.node_arch == Some(arch)
    }
}
