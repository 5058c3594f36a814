//! Collaborator interfaces (§6): traits at the seams consumed from
//! out-of-scope parts of the system (HTTP routing, auth, the CLI). The core
//! depends on these, never on their concrete out-of-scope implementations.

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use kube::core::DynamicObject;
use serde_json::Value;

use crate::services::workload::ClusterError;

/// Returns an access token suitable for HTTPS `Authorization: Bearer`.
/// Out of scope: implemented by the routing layer.
pub trait AuthTokenProvider: Send + Sync {
    fn get_token(&self) -> Result<String, ClusterError>;
}

/// CRUD on namespaced workloads, services, configmaps, PVCs, secrets, and
/// the `networking.istio.io/v1beta1 DestinationRule` CustomObject.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_configmap(&self, namespace: &str, configmap: ConfigMap) -> Result<String, ClusterError>;
    async fn create_service(&self, namespace: &str, service: Service) -> Result<String, ClusterError>;
    async fn create_job(&self, namespace: &str, job: K8sJob) -> Result<String, ClusterError>;
    async fn create_pvc(&self, namespace: &str, pvc: PersistentVolumeClaim) -> Result<String, ClusterError>;
    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<String, ClusterError>;
    async fn create_destination_rule(&self, namespace: &str, resource: DynamicObject) -> Result<String, ClusterError>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError>;
    async fn get_configmap(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError>;

    async fn delete_configmap(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn delete_destination_rule(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
}

/// Kubernetes-JWT auth, a transit-engine key create/export, and a
/// certificate-signing role.
pub trait SecretManagerClient: Send + Sync {
    fn get_exportable_key(&self, mount: &str, key_name: &str) -> Result<Option<Value>, ClusterError>;
    fn create_exportable_key(&self, mount: &str, key_name: &str) -> Result<Value, ClusterError>;
    fn export_key_material(&self, mount: &str, key_name: &str) -> Result<(String, String), ClusterError>;
    fn sign_public_key(&self, mount: &str, role: &str, public_key: &str) -> Result<String, ClusterError>;
}

/// Resolves `(job_type, recipe_type, resource)` to a template file path
/// under `IMS_JOB_TEMPLATE_PATH`, per the file naming convention in §6:
/// `create/<recipe_type>/image_<resource>_create.yaml.template` and
/// `customize/image_<resource>_customize.yaml.template`.
pub trait TemplateRoot: Send + Sync {
    fn template_path(&self, job_type: crate::models::JobType, recipe_type: Option<&str>, resource: &str) -> std::path::PathBuf;
}

pub struct FilesystemTemplateRoot {
    pub root: std::path::PathBuf,
}

impl TemplateRoot for FilesystemTemplateRoot {
    fn template_path(&self, job_type: crate::models::JobType, recipe_type: Option<&str>, resource: &str) -> std::path::PathBuf {
        match job_type {
            crate::models::JobType::Create => {
                let recipe_type = recipe_type.unwrap_or("kiwi-ng");
                self.root
                    .join("create")
                    .join(recipe_type)
                    .join(format!("image_{resource}_create.yaml.template"))
            }
            crate::models::JobType::Customize => self
                .root
                .join("customize")
                .join(format!("image_{resource}_customize.yaml.template")),
        }
    }
}
