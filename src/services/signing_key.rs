//! Signing-key provisioner (component I).
//!
//! One-time bootstrap of a cluster-wide SSH CA keypair and certificate via a
//! secret-manager transit engine, published as a ConfigMap
//! (`cray-ims-remote-keys`) to two namespaces. Failure is logged; the
//! process continues without remote-node capability — this is an
//! at-most-once side effect on startup, idempotent given existing state.

use std::path::Path;

use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;

use crate::collaborators::{ClusterClient, SecretManagerClient};
use crate::services::workload::ClusterError;

pub const CONFIGMAP_NAME: &str = "cray-ims-remote-keys";
const TRANSIT_MOUNT: &str = "transit";
const CA_KEY_NAME: &str = "ims-remote-build-ca";
const CERT_SIGNING_ROLE: &str = "ims-remote-build-signer";

pub struct SigningKeyMaterial {
    pub private_key: String,
    pub public_key: String,
    pub certificate: String,
}

/// At process start: fetch an exportable signing key; if present and a
/// corresponding ConfigMap exists in both namespaces, write the private key
/// to `private_key_path` and return. Otherwise create the key, export it,
/// sign it as a long-lived certificate, and publish the ConfigMap to both
/// namespaces.
pub async fn bootstrap(
    secret_manager: &dyn SecretManagerClient,
    cluster: &dyn ClusterClient,
    job_namespace: &str,
    system_namespace: &str,
    private_key_path: &Path,
) -> Result<(), ClusterError> {
    let existing_key = secret_manager.get_exportable_key(TRANSIT_MOUNT, CA_KEY_NAME)?;
    let existing_configmap = cluster.get_configmap(system_namespace, CONFIGMAP_NAME).await.ok();

    if existing_key.is_some() && existing_configmap.is_some() {
        let (private_key, _public_key) = secret_manager.export_key_material(TRANSIT_MOUNT, CA_KEY_NAME)?;
        write_private_key(private_key_path, &private_key)?;
        info!("signing key already provisioned, reusing existing CA");
        return Ok(());
    }

    secret_manager.create_exportable_key(TRANSIT_MOUNT, CA_KEY_NAME)?;
    let (private_key, public_key) = secret_manager.export_key_material(TRANSIT_MOUNT, CA_KEY_NAME)?;
    let certificate = secret_manager.sign_public_key(TRANSIT_MOUNT, CERT_SIGNING_ROLE, &public_key)?;

    write_private_key(private_key_path, &private_key)?;

    let material = SigningKeyMaterial {
        private_key,
        public_key,
        certificate,
    };

    for namespace in [job_namespace, system_namespace] {
        let configmap = build_configmap(namespace, &material);
        if let Err(e) = cluster.create_configmap(namespace, configmap).await {
            warn!(namespace, error = %e, "failed to publish signing-key ConfigMap, continuing without it");
        }
    }

    info!("provisioned new remote-build-node signing key");
    Ok(())
}

fn write_private_key(path: &Path, private_key: &str) -> Result<(), ClusterError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ClusterError::Api {
            action: "writing".to_string(),
            kind: "signing key file".to_string(),
            name: path.display().to_string(),
            raw_error_message: e.to_string(),
        })?;
    }
    std::fs::write(path, private_key).map_err(|e| ClusterError::Api {
        action: "writing".to_string(),
        kind: "signing key file".to_string(),
        name: path.display().to_string(),
        raw_error_message: e.to_string(),
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600));
    }

    Ok(())
}

fn build_configmap(namespace: &str, material: &SigningKeyMaterial) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert("public_key".to_string(), material.public_key.clone());
    data.insert("certificate".to_string(), material.certificate.clone());

    let mut binary_data = BTreeMap::new();
    binary_data.insert(
        "private_key".to_string(),
        ByteString(material.private_key.clone().into_bytes()),
    );

    ConfigMap {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            name: Some(CONFIGMAP_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(data),
        binary_data: Some(binary_data),
        ..Default::default()
    }
}
