//! Secret-manager client (component I collaborator): a transit-engine key
//! create/export and a certificate-signing role, authenticated via a
//! Kubernetes service-account JWT.

use std::fs;

use serde_json::Value;
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;
use vaultrs::ssh::ca as ssh_ca;
use vaultrs::transit::key as transit_key;
use vaultrs_login::engines::kubernetes::KubernetesLogin;
use vaultrs_login::LoginClient;

use crate::collaborators::SecretManagerClient;
use crate::services::workload::ClusterError;

pub struct VaultSecretManagerClient {
    connection: VaultClient,
}

impl VaultSecretManagerClient {
    /// Authenticates against Vault's `kubernetes` auth method using the pod's
    /// projected service-account JWT.
    pub fn new(vault_addr: &str, kubernetes_role: &str, jwt_path: &str) -> Result<Self, ClusterError> {
        let jwt = fs::read_to_string(jwt_path).map_err(|e| ClusterError::Api {
            action: "reading".to_string(),
            kind: "service account JWT".to_string(),
            name: jwt_path.to_string(),
            raw_error_message: e.to_string(),
        })?;

        let mut client = VaultClient::new(
            VaultClientSettingsBuilder::default()
                .address(vault_addr)
                .build()
                .map_err(|e| to_cluster_error("building vault client", "client", e))?,
        )
        .map_err(|e| to_cluster_error("connecting to vault", "client", e))?;

        let login = KubernetesLogin {
            role: kubernetes_role.to_string(),
            jwt,
        };
        block_on(client.login("kubernetes", &login))
            .map_err(|e| to_cluster_error("authenticating to vault", "kubernetes auth", e))?;

        Ok(VaultSecretManagerClient { connection: client })
    }
}

fn block_on<F: std::future::Future>(f: F) -> F::Output {
    futures::executor::block_on(f)
}

fn to_cluster_error(action: &str, name: &str, e: ClientError) -> ClusterError {
    ClusterError::Api {
        action: action.to_string(),
        kind: "vault".to_string(),
        name: name.to_string(),
        raw_error_message: e.to_string(),
    }
}

impl SecretManagerClient for VaultSecretManagerClient {
    fn get_exportable_key(&self, mount: &str, key_name: &str) -> Result<Option<Value>, ClusterError> {
        match block_on(transit_key::read(&self.connection, mount, key_name)) {
            Ok(key) => Ok(Some(serde_json::to_value(key).map_err(|e| ClusterError::Api {
                action: "decoding".to_string(),
                kind: "vault transit key".to_string(),
                name: key_name.to_string(),
                raw_error_message: e.to_string(),
            })?)),
            Err(ClientError::APIError { code: 404, .. }) => Ok(None),
            Err(e) => Err(to_cluster_error("reading transit key", key_name, e)),
        }
    }

    fn create_exportable_key(&self, mount: &str, key_name: &str) -> Result<Value, ClusterError> {
        block_on(transit_key::create(
            &self.connection,
            mount,
            key_name,
            Some(transit_key::CreateKeyRequest::builder().exportable(true).key_type("ed25519")),
        ))
        .map_err(|e| to_cluster_error("creating transit key", key_name, e))?;

        self.get_exportable_key(mount, key_name)?.ok_or_else(|| ClusterError::Api {
            action: "verifying".to_string(),
            kind: "vault transit key".to_string(),
            name: key_name.to_string(),
            raw_error_message: "key not found immediately after creation".to_string(),
        })
    }

    fn export_key_material(&self, mount: &str, key_name: &str) -> Result<(String, String), ClusterError> {
        let exported = block_on(transit_key::export(&self.connection, mount, "signing-key", key_name, None))
            .map_err(|e| to_cluster_error("exporting transit key", key_name, e))?;

        let private_key = exported.keys.values().next().cloned().ok_or_else(|| ClusterError::Api {
            action: "exporting".to_string(),
            kind: "vault transit key".to_string(),
            name: key_name.to_string(),
            raw_error_message: "export response had no key versions".to_string(),
        })?;

        let read = block_on(transit_key::read(&self.connection, mount, key_name))
            .map_err(|e| to_cluster_error("reading transit key", key_name, e))?;
        let public_key = read
            .keys
            .values()
            .next()
            .and_then(|v| v.get("public_key").and_then(|p| p.as_str()))
            .unwrap_or_default()
            .to_string();

        Ok((private_key, public_key))
    }

    fn sign_public_key(&self, mount: &str, role: &str, public_key: &str) -> Result<String, ClusterError> {
        let signed = block_on(ssh_ca::sign(&self.connection, mount, role, public_key, None))
            .map_err(|e| to_cluster_error("signing public key", role, e))?;

        Ok(signed.signed_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_cluster_error_carries_action_and_name() {
        let err = to_cluster_error(
            "creating transit key",
            "job-signing-key",
            ClientError::APIError {
                code: 500,
                errors: vec!["boom".to_string()],
            },
        );
        match err {
            ClusterError::Api { action, name, .. } => {
                assert_eq!(action, "creating transit key");
                assert_eq!(name, "job-signing-key");
            }
            other => panic!("expected Api variant, got {other:?}"),
        }
    }
}
