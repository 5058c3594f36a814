//! Remote-node prober and scheduler (component E).
//!
//! Probes a candidate node over SSH for reachability, architecture, toolchain
//! presence, and current job count, then selects the least-loaded node
//! matching the job's architecture. There is no background cache: every
//! placement decision re-probes every registered node.

use std::path::Path;
use std::time::Duration;

use async_ssh2_tokio::client::{AuthMethod, Client as SshClient, ServerCheckMethod};
use thiserror::Error;

use crate::models::{Arch, RemoteBuildNode, RemoteNodeStatus, UNKNOWN_NUM_JOBS};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SshProbeError {
    #[error("unable to open SSH connection to `{xname}`: {raw_error_message}")]
    ConnectionFailed { xname: String, raw_error_message: String },
    #[error("signing key at `{path}` is missing or malformed")]
    MissingSigningKey { path: String },
}

const SSH_USERNAME: &str = "root";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const ARCH_COMMAND: &str = "uname -i";
const TOOLCHAIN_COMMAND: &str = "which podman";
const LOAD_COMMAND: &str = "ls -d1 /tmp/* | grep /tmp/ims_ | wc -l";

/// Probes one node by opening an SSH connection keyed off the provisioned
/// CA private key, then issuing the arch/toolchain/load commands in turn.
pub async fn probe(xname: &str, host: &str, private_key_path: &Path) -> Result<RemoteNodeStatus, SshProbeError> {
    let private_key = std::fs::read_to_string(private_key_path).map_err(|_| SshProbeError::MissingSigningKey {
        path: private_key_path.display().to_string(),
    })?;

    let auth = AuthMethod::with_key(&private_key, None);
    let client = tokio::time::timeout(
        PROBE_TIMEOUT,
        SshClient::connect((host, 22), SSH_USERNAME, auth, ServerCheckMethod::NoCheck),
    )
    .await
    .map_err(|_| SshProbeError::ConnectionFailed {
        xname: xname.to_string(),
        raw_error_message: "timed out opening connection".to_string(),
    })?
    .map_err(|e| SshProbeError::ConnectionFailed {
        xname: xname.to_string(),
        raw_error_message: e.to_string(),
    })?;

    let arch_output = run_command(&client, ARCH_COMMAND).await;
    let node_arch = arch_output.as_deref().and_then(parse_arch);

    let toolchain_output = run_command(&client, TOOLCHAIN_COMMAND).await;
    let podman_present = toolchain_output
        .as_deref()
        .map(|out| out.contains("/usr/bin/podman"))
        .unwrap_or(false);

    let load_output = run_command(&client, LOAD_COMMAND).await;
    let num_current_jobs = load_output
        .as_deref()
        .and_then(|out| out.trim().parse::<u32>().ok())
        .unwrap_or(UNKNOWN_NUM_JOBS);

    let able_to_run_jobs = node_arch.is_some() && podman_present;

    Ok(RemoteNodeStatus {
        xname: xname.to_string(),
        node_arch,
        podman_present,
        num_current_jobs,
        able_to_run_jobs,
    })
}

async fn run_command(client: &SshClient, command: &str) -> Option<String> {
    match client.execute(command).await {
        Ok(result) if result.exit_status == 0 => Some(result.stdout),
        _ => None,
    }
}

/// `aarch64` is checked before `x86` since `x86_64` output also contains
/// `x86` as a substring.
fn parse_arch(output: &str) -> Option<Arch> {
    if output.contains("aarch64") {
        Some(Arch::Aarch64)
    } else if output.contains("x86") {
        Some(Arch::X86_64)
    } else {
        None
    }
}

/// `pick(arch)`: iterates registered nodes in stable order, considering only
/// those whose status matches the job's arch and can run jobs, and returns
/// the one with the smallest `num_current_jobs`. Ties are broken by
/// iteration order. Returns `None` if no node matches — the job runs
/// in-cluster.
pub fn pick<'a>(arch: Arch, statuses: impl Iterator<Item = &'a RemoteNodeStatus>) -> Option<&'a RemoteNodeStatus> {
    let mut best: Option<&RemoteNodeStatus> = None;

    for status in statuses {
        if !status.matches(arch) {
            continue;
        }
        best = match best {
            None => Some(status),
            Some(current) if status.num_current_jobs < current.num_current_jobs => Some(status),
            Some(current) => Some(current),
        };
    }

    best
}

/// Probes every registered node in iteration order, preserving the
/// ordering-stable tiebreak even though individual probes may be
/// parallelized by the caller.
pub async fn probe_all(nodes: &[RemoteBuildNode], host_for_xname: impl Fn(&str) -> String, private_key_path: &Path) -> Vec<RemoteNodeStatus> {
    let mut statuses = Vec::with_capacity(nodes.len());
    for node in nodes {
        let host = host_for_xname(&node.xname);
        match probe(&node.xname, &host, private_key_path).await {
            Ok(status) => statuses.push(status),
            Err(e) => {
                warn!(xname = %node.xname, error = %e, "probe failed, node excluded from placement");
                statuses.push(RemoteNodeStatus {
                    xname: node.xname.clone(),
                    node_arch: None,
                    podman_present: false,
                    num_current_jobs: UNKNOWN_NUM_JOBS,
                    able_to_run_jobs: false,
                });
            }
        }
    }
    statuses
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(xname: &str, arch: Arch, jobs: u32, able: bool) -> RemoteNodeStatus {
        RemoteNodeStatus {
            xname: xname.to_string(),
            node_arch: Some(arch),
            podman_present: able,
            num_current_jobs: jobs,
            able_to_run_jobs: able,
        }
    }

    #[test]
    fn test_parse_arch_prefers_aarch64_over_x86_substring() {
        assert_eq!(parse_arch("aarch64"), Some(Arch::Aarch64));
        assert_eq!(parse_arch("x86_64"), Some(Arch::X86_64));
        assert_eq!(parse_arch("unknown"), None);
    }

    #[test]
    fn test_s7_scheduler_tie_break_picks_first_in_iteration_order() {
        let nodes = vec![
            status("node-a", Arch::Aarch64, 2, true),
            status("node-b", Arch::Aarch64, 2, true),
        ];

        let picked = pick(Arch::Aarch64, nodes.iter()).expect("a node should be picked");
        assert_eq!(picked.xname, "node-a");
    }

    #[test]
    fn test_scheduler_picks_least_loaded_matching_arch() {
        let nodes = vec![
            status("node-a", Arch::X86_64, 5, true),
            status("node-b", Arch::Aarch64, 0, true),
            status("node-c", Arch::X86_64, 1, true),
        ];

        let picked = pick(Arch::X86_64, nodes.iter()).expect("a node should be picked");
        assert_eq!(picked.xname, "node-c");
    }

    #[test]
    fn test_scheduler_returns_none_when_no_node_matches() {
        let nodes = vec![status("node-a", Arch::X86_64, 0, true)];

        assert!(pick(Arch::Aarch64, nodes.iter()).is_none());
    }

    #[test]
    fn test_scheduler_excludes_unable_to_run_jobs_nodes() {
        let nodes = vec![status("node-a", Arch::Aarch64, 0, false)];

        assert!(pick(Arch::Aarch64, nodes.iter()).is_none());
    }
}
