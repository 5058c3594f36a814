//! Concrete `ClusterClient` over `kube::Client`.
//!
//! Thin generic wrappers around `kube::Api<K>` classify apiserver failures
//! into `ClusterError` once, so every CRUD method on `KubeClusterClient` is a
//! one-liner.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use kube::api::{Api, ApiResource, DeleteParams, PostParams};
use kube::core::DynamicObject;
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::collaborators::ClusterClient;
use crate::services::workload::{destination_rule_gvk, ClusterError};

pub struct KubeClusterClient {
    pub client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        KubeClusterClient { client }
    }
}

fn to_cluster_error(e: kube::Error, action: &str, kind: &str, name: &str, namespace: &str) -> ClusterError {
    match &e {
        kube::Error::Api(resp) if resp.code == 404 => ClusterError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.to_string(),
        },
        kube::Error::Api(resp) if resp.reason.to_lowercase().contains("timeout") => ClusterError::Timeout {
            action: action.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        },
        _ => ClusterError::Api {
            action: action.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            raw_error_message: e.to_string(),
        },
    }
}

async fn create_resource<K>(client: &Client, namespace: &str, resource: K) -> Result<String, ClusterError>
where
    K: Clone + DeserializeOwned + Debug + Resource + Serialize,
    <K as Resource>::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let name = resource.meta().name.clone().unwrap_or_default();

    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.create(&PostParams::default(), &resource)
        .await
        .map_err(|e| to_cluster_error(e, "creating", &kind, &name, namespace))?;

    Ok(name)
}

async fn get_resource<K>(client: &Client, namespace: &str, name: &str) -> Result<K, ClusterError>
where
    K: Clone + DeserializeOwned + Debug + Resource,
    <K as Resource>::DynamicType: Default,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.get(name).await.map_err(|e| to_cluster_error(e, "getting", &kind, name, namespace))
}

async fn delete_resource<K>(client: &Client, namespace: &str, name: &str) -> Result<(), ClusterError>
where
    K: Clone + DeserializeOwned + Debug + Resource,
    <K as Resource>::DynamicType: Default,
{
    if name.is_empty() {
        return Ok(());
    }
    let kind = K::kind(&K::DynamicType::default()).to_string();
    let api: Api<K> = Api::namespaced(client.clone(), namespace);
    api.delete(name, &DeleteParams::default())
        .await
        .map_err(|e| to_cluster_error(e, "deleting", &kind, name, namespace))?;
    Ok(())
}

fn destination_rule_api(client: &Client, namespace: &str) -> Api<DynamicObject> {
    let api_resource = ApiResource::from_gvk(&destination_rule_gvk());
    Api::namespaced_with(client.clone(), namespace, &api_resource)
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn create_configmap(&self, namespace: &str, configmap: ConfigMap) -> Result<String, ClusterError> {
        create_resource(&self.client, namespace, configmap).await
    }

    async fn create_service(&self, namespace: &str, service: Service) -> Result<String, ClusterError> {
        create_resource(&self.client, namespace, service).await
    }

    async fn create_job(&self, namespace: &str, job: K8sJob) -> Result<String, ClusterError> {
        create_resource(&self.client, namespace, job).await
    }

    async fn create_pvc(&self, namespace: &str, pvc: PersistentVolumeClaim) -> Result<String, ClusterError> {
        create_resource(&self.client, namespace, pvc).await
    }

    async fn create_secret(&self, namespace: &str, secret: Secret) -> Result<String, ClusterError> {
        create_resource(&self.client, namespace, secret).await
    }

    async fn create_destination_rule(&self, namespace: &str, resource: DynamicObject) -> Result<String, ClusterError> {
        let name = resource.metadata.name.clone().unwrap_or_default();
        destination_rule_api(&self.client, namespace)
            .create(&PostParams::default(), &resource)
            .await
            .map_err(|e| to_cluster_error(e, "creating", "DestinationRule", &name, namespace))?;
        Ok(name)
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, ClusterError> {
        get_resource(&self.client, namespace, name).await
    }

    async fn get_configmap(&self, namespace: &str, name: &str) -> Result<ConfigMap, ClusterError> {
        get_resource(&self.client, namespace, name).await
    }

    async fn delete_configmap(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_resource::<ConfigMap>(&self.client, namespace, name).await
    }

    async fn delete_service(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_resource::<Service>(&self.client, namespace, name).await
    }

    async fn delete_job(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_resource::<K8sJob>(&self.client, namespace, name).await
    }

    async fn delete_pvc(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_resource::<PersistentVolumeClaim>(&self.client, namespace, name).await
    }

    async fn delete_secret(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        delete_resource::<Secret>(&self.client, namespace, name).await
    }

    async fn delete_destination_rule(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        if name.is_empty() {
            return Ok(());
        }
        destination_rule_api(&self.client, namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| to_cluster_error(e, "deleting", "DestinationRule", name, namespace))?;
        Ok(())
    }
}
