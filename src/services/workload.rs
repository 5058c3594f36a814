//! Cluster workload synthesizer (component F).
//!
//! Renders per-resource templates with job parameters, applies them to the
//! cluster in a fixed order, and creates/tears down the Istio DestinationRule
//! and signing-key secret copy around them.

use std::collections::BTreeMap;
use std::thread::sleep;
use std::time::Duration;

use k8s_openapi::api::batch::v1::Job as K8sJob;
use k8s_openapi::api::core::v1::{ConfigMap, PersistentVolumeClaim, Secret, Service};
use kube::core::{DynamicObject, GroupVersionKind};
use thiserror::Error;

use crate::collaborators::{ClusterClient, TemplateRoot};
use crate::models::{Job, JobType};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClusterError {
    #[error("cluster resource `{kind}` named `{name}` not found in namespace `{namespace}`")]
    NotFound {
        kind: String,
        name: String,
        namespace: String,
    },
    #[error("apiserver timeout while {action} `{kind}` named `{name}`")]
    Timeout { action: String, kind: String, name: String },
    #[error("cluster API error while {action} `{kind}` named `{name}`: {raw_error_message}")]
    Api {
        action: String,
        kind: String,
        name: String,
        raw_error_message: String,
    },
    #[error("template error: {0}")]
    Template(String),
}

impl ClusterError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ClusterError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Destination-rule CRD coordinates (`networking.istio.io/v1beta1
/// DestinationRule`).
pub fn destination_rule_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("networking.istio.io", "v1beta1", "DestinationRule")
}

/// `${name}`-style substitution over a template body, matching the wire
/// format of the `.yaml.template` files (not Tera's `{{ name }}` delimiter).
pub fn render_template(template: &str, params: &BTreeMap<String, String>) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after_start = &rest[start + 2..];
        match after_start.find('}') {
            Some(end) => {
                let name = &after_start[..end];
                match params.get(name) {
                    Some(value) => output.push_str(value),
                    None => output.push_str(&format!("${{{name}}}")),
                }
                rest = &after_start[end + 1..];
            }
            None => {
                output.push_str("${");
                rest = after_start;
                break;
            }
        }
    }
    output.push_str(rest);
    output
}

/// Parses the rendered YAML to extract `metadata.name` rather than trusting
/// regex, preserving the invariant that the recorded name matches what was
/// applied to the cluster.
pub fn extract_resource_name(rendered_yaml: &str) -> Result<String, ClusterError> {
    let value: serde_yaml::Value =
        serde_yaml::from_str(rendered_yaml).map_err(|e| ClusterError::Template(e.to_string()))?;

    value
        .get("metadata")
        .and_then(|m| m.get("name"))
        .and_then(|n| n.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ClusterError::Template("rendered resource has no metadata.name".to_string()))
}

const RETRY_ATTEMPTS: u32 = 3;

fn with_retry<T>(action: &str, kind: &str, name: &str, mut f: impl FnMut() -> Result<T, ClusterError>) -> Result<T, ClusterError> {
    let mut attempt = 0;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) if e.is_timeout() && attempt < RETRY_ATTEMPTS => {
                attempt += 1;
                warn!(attempt, action, kind, name, "apiserver timeout, retrying with linear backoff");
                sleep(Duration::from_secs(attempt as u64));
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct ResourceTemplates {
    pub configmap: String,
    pub service: String,
    pub workload: String,
    pub pvc: String,
}

pub fn render_all(
    template_root: &dyn TemplateRoot,
    job_type: JobType,
    recipe_type: Option<&str>,
    params: &BTreeMap<String, String>,
) -> Result<ResourceTemplates, ClusterError> {
    let read_and_render = |resource: &str| -> Result<String, ClusterError> {
        let path = template_root.template_path(job_type, recipe_type, resource);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ClusterError::Template(format!("reading template `{}`: {}", path.display(), e)))?;
        Ok(render_template(&raw, params))
    };

    Ok(ResourceTemplates {
        configmap: read_and_render("configmap")?,
        service: read_and_render("service")?,
        workload: read_and_render("workload")?,
        pvc: read_and_render("pvc")?,
    })
}

/// Applies all job resources in the fixed creation order:
/// configmap → service → workload → pvc → DestinationRule → secret,
/// recording each created resource's name on the job. Any non-timeout
/// failure aborts with only what's named on the job so far; the caller
/// must re-invoke `delete`.
pub async fn create(
    cluster: &dyn ClusterClient,
    namespace: &str,
    job: &mut Job,
    templates: &ResourceTemplates,
    signing_key_secret_source_namespace: &str,
    signing_key_secret_name: &str,
) -> Result<(), ClusterError> {
    job.kubernetes.namespace = Some(namespace.to_string());

    let configmap_name = extract_resource_name(&templates.configmap)?;
    let configmap: ConfigMap =
        serde_yaml::from_str(&templates.configmap).map_err(|e| ClusterError::Template(e.to_string()))?;
    with_retry("creating", "ConfigMap", &configmap_name, || {
        futures::executor::block_on(cluster.create_configmap(namespace, configmap.clone()))
    })?;
    job.kubernetes.configmap = Some(configmap_name);

    let service_name = extract_resource_name(&templates.service)?;
    let service: Service = serde_yaml::from_str(&templates.service).map_err(|e| ClusterError::Template(e.to_string()))?;
    with_retry("creating", "Service", &service_name, || {
        futures::executor::block_on(cluster.create_service(namespace, service.clone()))
    })?;
    job.kubernetes.service = Some(service_name.clone());

    let workload_name = extract_resource_name(&templates.workload)?;
    let workload: K8sJob = serde_yaml::from_str(&templates.workload).map_err(|e| ClusterError::Template(e.to_string()))?;
    with_retry("creating", "Job", &workload_name, || {
        futures::executor::block_on(cluster.create_job(namespace, workload.clone()))
    })?;
    job.kubernetes.job = Some(workload_name);

    let pvc_name = extract_resource_name(&templates.pvc)?;
    let pvc: PersistentVolumeClaim =
        serde_yaml::from_str(&templates.pvc).map_err(|e| ClusterError::Template(e.to_string()))?;
    with_retry("creating", "PersistentVolumeClaim", &pvc_name, || {
        futures::executor::block_on(cluster.create_pvc(namespace, pvc.clone()))
    })?;
    job.kubernetes.pvc = Some(pvc_name);

    let destination_rule = destination_rule_for_service(namespace, &service_name);
    with_retry("creating", "DestinationRule", &service_name, || {
        futures::executor::block_on(cluster.create_destination_rule(namespace, destination_rule.clone()))
    })?;

    // Copy the signing-key secret into the job namespace; failure is
    // logged, not fatal (§4.F).
    match copy_signing_key_secret(cluster, signing_key_secret_source_namespace, namespace, signing_key_secret_name).await {
        Ok(copied_name) => job.kubernetes.secret = Some(copied_name),
        Err(e) => warn!(error = %e, "failed to copy signing-key secret into job namespace, continuing"),
    }

    Ok(())
}

fn destination_rule_for_service(namespace: &str, service_name: &str) -> DynamicObject {
    let gvk = destination_rule_gvk();
    let mut object = DynamicObject::new(&format!("{service_name}-disable-mtls"), &kube::api::ApiResource::from_gvk(&gvk));
    object.metadata.namespace = Some(namespace.to_string());
    object.data = serde_json::json!({
        "spec": {
            "host": service_name,
            "trafficPolicy": {
                "tls": { "mode": "DISABLE" }
            }
        }
    });
    object
}

async fn copy_signing_key_secret(
    cluster: &dyn ClusterClient,
    source_namespace: &str,
    dest_namespace: &str,
    secret_name: &str,
) -> Result<String, ClusterError> {
    let mut secret = cluster.get_secret(source_namespace, secret_name).await?;
    secret.metadata.namespace = Some(dest_namespace.to_string());
    secret.metadata.resource_version = None;
    secret.metadata.uid = None;
    let copied_name = format!("{secret_name}-copy");
    secret.metadata.name = Some(copied_name.clone());
    cluster.create_secret(dest_namespace, secret).await?;
    Ok(copied_name)
}

/// Deletion order: service → workload → configmap → pvc → secret, plus the
/// DestinationRule removed last. Missing-resource responses are tolerated;
/// other failures accumulate into the returned error list.
pub async fn delete_full(cluster: &dyn ClusterClient, namespace: &str, job: &Job) -> Vec<ClusterError> {
    let mut errors = Vec::new();

    delete_tolerating_not_found(cluster.delete_service(namespace, job.kubernetes.service.as_deref().unwrap_or("")).await, &mut errors);
    delete_tolerating_not_found(cluster.delete_job(namespace, job.kubernetes.job.as_deref().unwrap_or("")).await, &mut errors);
    delete_tolerating_not_found(
        cluster.delete_configmap(namespace, job.kubernetes.configmap.as_deref().unwrap_or("")).await,
        &mut errors,
    );
    delete_tolerating_not_found(cluster.delete_pvc(namespace, job.kubernetes.pvc.as_deref().unwrap_or("")).await, &mut errors);
    delete_tolerating_not_found(cluster.delete_secret(namespace, job.kubernetes.secret.as_deref().unwrap_or("")).await, &mut errors);

    if let Some(service_name) = &job.kubernetes.service {
        delete_tolerating_not_found(
            cluster.delete_destination_rule(namespace, &format!("{service_name}-disable-mtls")).await,
            &mut errors,
        );
    }

    errors
}

/// Partial delete: releases only the network-facing resources (service and
/// DestinationRule) on a terminal-status transition, preserving the
/// workload/configmap/PVC/secret for log retrieval.
pub async fn delete_partial(cluster: &dyn ClusterClient, namespace: &str, job: &Job) -> Vec<ClusterError> {
    let mut errors = Vec::new();

    delete_tolerating_not_found(cluster.delete_service(namespace, job.kubernetes.service.as_deref().unwrap_or("")).await, &mut errors);

    if let Some(service_name) = &job.kubernetes.service {
        delete_tolerating_not_found(
            cluster.delete_destination_rule(namespace, &format!("{service_name}-disable-mtls")).await,
            &mut errors,
        );
    }

    errors
}

fn delete_tolerating_not_found(result: Result<(), ClusterError>, errors: &mut Vec<ClusterError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => errors.push(e),
    }
}
