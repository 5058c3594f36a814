//! Job lifecycle controller (component G).
//!
//! Validates a job request, resolves its source artifact (recipe or image
//! manifest), applies defaults and isolation/placement decisions, composes
//! the cluster workload parameters, and drives creation/deletion/patch
//! through the cluster workload synthesizer (F).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;

use crate::collaborators::{ClusterClient, TemplateRoot};
use crate::config::Config;
use crate::errors::ImsError;
use crate::manifest;
use crate::models::{
    Arch, Image, Job, JobKubernetesResources, JobStatus, JobType, PublicKey, Recipe, RecipeType, RemoteNodeStatus,
    SshConnectionInfo, SshContainer, SshContainerStatus,
};
use crate::object_storage::{CredentialContext, ObjectStorageGateway, S3Url};
use crate::record_store::RecordStore;
use crate::services::remote_node;
use crate::services::workload::{self, ResourceTemplates};

/// Request shape for `create`; computed fields (`id`, `status`, `kubernetes`,
/// `remote_build_node`, `created`) are not caller-supplied.
#[derive(Debug, Clone)]
pub struct JobCreateRequest {
    pub job_type: JobType,
    pub artifact_id: String,
    pub public_key_id: Option<String>,
    pub enable_debug: bool,
    pub image_root_archive_name: String,
    pub kernel_file_name: Option<String>,
    pub initrd_file_name: Option<String>,
    pub kernel_parameters_file_name: Option<String>,
    pub ssh_containers: Vec<SshContainer>,
    pub require_dkms: Option<bool>,
    pub arch: Arch,
    pub build_env_size_gib: Option<u32>,
    pub job_mem_size_gib: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    /// Duration-suffix grammar `[Nw][Nd][Nh][Nm]`; matches jobs created at
    /// least this long ago.
    pub age: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub resultant_image_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct DeleteCollectionOutcome {
    pub deleted_ids: Vec<String>,
    pub errors: Vec<(String, ImsError)>,
}

/// Bundles the collaborators `create` needs so the function signature stays
/// readable; callers construct this once per request.
pub struct JobCreateContext<'a> {
    pub recipes: &'a RecordStore<Recipe>,
    pub images: &'a RecordStore<Image>,
    pub public_keys: &'a RecordStore<PublicKey>,
    pub jobs: &'a RecordStore<Job>,
    pub gateway: &'a dyn ObjectStorageGateway,
    pub cluster: &'a dyn ClusterClient,
    pub template_root: &'a dyn TemplateRoot,
    pub config: &'a Config,
    pub remote_statuses: &'a [RemoteNodeStatus],
    pub signing_key_namespace: &'a str,
    pub signing_key_secret_name: &'a str,
}

/// `create(request)`: validates, resolves the artifact, applies defaults,
/// decides isolation/placement, composes template parameters, and invokes
/// F. The job record is persisted even on a partial-creation failure so the
/// caller can re-invoke `delete` to clean up (§4.G failure semantics).
pub async fn create(ctx: &JobCreateContext<'_>, request: JobCreateRequest) -> Result<Job, ImsError> {
    if request.image_root_archive_name.trim().is_empty() {
        return Err(ImsError::bad_request("image_root_archive_name must not be empty"));
    }

    let ssh_containers = validate_ssh_containers(request.job_type, request.ssh_containers, request.enable_debug)?;

    let public_key_text = match &request.public_key_id {
        Some(id) => Some(
            ctx.public_keys
                .get(id)
                .ok_or_else(|| ImsError::not_found("public key", id.clone()))?
                .public_key,
        ),
        None => None,
    };

    let resolved = resolve_artifact(ctx, request.job_type, &request.artifact_id).await?;

    let kernel_file_name = request
        .kernel_file_name
        .unwrap_or_else(|| Job::default_kernel_file_name(request.arch).to_string());

    let require_dkms = resolve_require_dkms(
        request.job_type,
        request.arch,
        request.require_dkms,
        resolved.recipe.as_ref(),
        ctx.config.job_enable_dkms,
    );

    let build_env_size_gib = request.build_env_size_gib.unwrap_or(ctx.config.default_ims_image_size_gib);
    let job_mem_size_gib = request.job_mem_size_gib.unwrap_or(ctx.config.default_ims_job_mem_size_gib);

    let id = crate::models::new_id();
    let namespace = ctx.config.default_ims_job_namespace.clone();

    let placement = place(require_dkms, request.arch, ctx.config, ctx.remote_statuses, &id);

    let mut job = Job {
        id: id.clone(),
        job_type: request.job_type,
        artifact_id: request.artifact_id.clone(),
        public_key_id: request.public_key_id.clone(),
        enable_debug: request.enable_debug,
        image_root_archive_name: request.image_root_archive_name,
        kernel_file_name,
        initrd_file_name: request.initrd_file_name,
        kernel_parameters_file_name: request.kernel_parameters_file_name,
        ssh_containers: stamp_ssh_containers(ssh_containers, &id, ctx.config),
        require_dkms,
        arch: request.arch,
        build_env_size_gib,
        job_mem_size_gib,
        status: JobStatus::Creating,
        resultant_image_id: None,
        kubernetes: JobKubernetesResources::default(),
        remote_build_node: placement.remote_xname.clone(),
        created: Utc::now(),
    };

    let params = compose_params(
        &job,
        ctx.config,
        &namespace,
        &resolved,
        public_key_text.as_deref(),
        &placement,
    );

    let recipe_type_str = resolved.recipe.as_ref().map(|r| recipe_type_str(r.recipe_type));
    let templates = render_templates(ctx.template_root, request.job_type, recipe_type_str, &params)?;

    let create_result = workload::create(
        ctx.cluster,
        &namespace,
        &mut job,
        &templates,
        ctx.signing_key_namespace,
        ctx.signing_key_secret_name,
    )
    .await;

    // Persist regardless of outcome: a partial failure still names whatever
    // cluster resources were created so `delete` can clean them up.
    ctx.jobs.put(job.clone())?;

    create_result.map_err(ImsError::from)?;
    Ok(job)
}

struct ResolvedArtifact {
    recipe: Option<Recipe>,
    download_url: String,
    integrity: String,
}

async fn resolve_artifact(ctx: &JobCreateContext<'_>, job_type: JobType, artifact_id: &str) -> Result<ResolvedArtifact, ImsError> {
    match job_type {
        JobType::Create => {
            let recipe = ctx
                .recipes
                .get(artifact_id)
                .ok_or_else(|| ImsError::not_found("recipe", artifact_id.to_string()))?;
            let link = recipe
                .link
                .clone()
                .ok_or_else(|| ImsError::bad_request(format!("recipe `{artifact_id}` has no link")))?;
            let url = S3Url::parse(&link.path)?;
            let download_url = ctx
                .gateway
                .presign_get(CredentialContext::Ims, &url.bucket, &url.key, ctx.config.s3_url_expiration)?;
            Ok(ResolvedArtifact {
                integrity: link.etag.clone(),
                recipe: Some(recipe),
                download_url,
            })
        }
        JobType::Customize => {
            let image = ctx
                .images
                .get(artifact_id)
                .ok_or_else(|| ImsError::not_found("image", artifact_id.to_string()))?;
            let link = image
                .link
                .clone()
                .ok_or_else(|| ImsError::bad_request(format!("image `{artifact_id}` has no link")))?;

            let manifest = manifest::fetch_and_validate(ctx.gateway, &link, ctx.config.max_image_manifest_size_bytes)?;
            let rootfs = manifest
                .rootfs_artifact()
                .ok_or_else(|| ImsError::internal("validated manifest unexpectedly has no rootfs artifact"))?;

            let rootfs_url = S3Url::parse(&rootfs.link.path)?;
            let download_url = ctx.gateway.presign_get(
                CredentialContext::Ims,
                &rootfs_url.bucket,
                &rootfs_url.key,
                ctx.config.s3_url_expiration,
            )?;

            Ok(ResolvedArtifact {
                integrity: rootfs.md5.clone().unwrap_or_else(|| rootfs.link.etag.clone()),
                recipe: None,
                download_url,
            })
        }
    }
}

/// For `create`, user-supplied `ssh_containers` is rejected; `enable_debug`
/// appends `{name:"debug", jail:false}`. For `customize`, an empty list gets
/// `{name:"customize", jail:false}` inserted. At most one container survives
/// either way — today's limit.
fn validate_ssh_containers(job_type: JobType, containers: Vec<SshContainer>, enable_debug: bool) -> Result<Vec<SshContainer>, ImsError> {
    let mut containers = match job_type {
        JobType::Create => {
            if !containers.is_empty() {
                return Err(ImsError::bad_request("ssh_containers may not be supplied for a create job"));
            }
            if enable_debug {
                vec![SshContainer {
                    name: "debug".to_string(),
                    jail: false,
                    status: None,
                    connection_info: None,
                }]
            } else {
                Vec::new()
            }
        }
        JobType::Customize => {
            if containers.is_empty() {
                vec![SshContainer {
                    name: "customize".to_string(),
                    jail: false,
                    status: None,
                    connection_info: None,
                }]
            } else {
                containers
            }
        }
    };

    if containers.len() > 1 {
        return Err(ImsError::bad_request("at most one ssh_container is supported per job"));
    }

    containers.truncate(1);
    Ok(containers)
}

fn stamp_ssh_containers(containers: Vec<SshContainer>, job_id: &str, config: &Config) -> Vec<SshContainer> {
    containers
        .into_iter()
        .map(|mut container| {
            container.status = Some(SshContainerStatus::Pending);
            container.connection_info = Some(SshConnectionInfo {
                host: format!(
                    "{job_id}.ims.{}.{}",
                    config.job_customer_access_subnet_name, config.job_customer_access_network_domain
                ),
                port: 22,
                username: "root".to_string(),
            });
            container
        })
        .collect()
}

/// `require_dkms` is forced true on aarch64 regardless of input; on a
/// `create` job with no explicit value it inherits the recipe's setting;
/// otherwise it falls back to the deployment default.
fn resolve_require_dkms(job_type: JobType, arch: Arch, requested: Option<bool>, recipe: Option<&Recipe>, default: bool) -> bool {
    if arch == Arch::Aarch64 {
        return true;
    }
    if let Some(value) = requested {
        return value;
    }
    if job_type == JobType::Create {
        if let Some(recipe) = recipe {
            return recipe.require_dkms;
        }
    }
    default
}

struct Placement {
    remote_xname: Option<String>,
    runtime_class: Option<String>,
    security_privilege: bool,
}

/// When `require_dkms`, the job needs a virtualized sandbox runtime class
/// under a privileged service account; aarch64 substitutes its own runtime
/// class. A remote node, if the scheduler finds one matching the job's
/// arch, supplies its own isolation — the sandbox runtime class is cleared.
fn place(require_dkms: bool, arch: Arch, config: &Config, remote_statuses: &[RemoteNodeStatus], job_id: &str) -> Placement {
    let sandbox_runtime_class = if require_dkms {
        Some(match arch {
            Arch::Aarch64 => config.job_aarch64_runtime.clone(),
            Arch::X86_64 => config.job_kata_runtime.clone(),
        })
    } else {
        None
    };

    let remote = remote_node::pick(arch, remote_statuses.iter());

    match remote {
        Some(status) => {
            info!(job_id, xname = %status.xname, "placed job on remote build node");
            Placement {
                remote_xname: Some(status.xname.clone()),
                runtime_class: None,
                security_privilege: false,
            }
        }
        None => Placement {
            remote_xname: None,
            runtime_class: sandbox_runtime_class,
            security_privilege: require_dkms,
        },
    }
}

fn arch_str(arch: Arch) -> &'static str {
    match arch {
        Arch::X86_64 => "x86_64",
        Arch::Aarch64 => "aarch64",
    }
}

fn recipe_type_str(recipe_type: RecipeType) -> &'static str {
    match recipe_type {
        RecipeType::KiwiNg => "kiwi-ng",
        RecipeType::Packer => "packer",
    }
}

fn compose_params(
    job: &Job,
    config: &Config,
    namespace: &str,
    resolved: &ResolvedArtifact,
    public_key_text: Option<&str>,
    placement: &Placement,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("job_id".to_string(), job.id.clone());
    params.insert("namespace".to_string(), namespace.to_string());
    params.insert("arch".to_string(), arch_str(job.arch).to_string());
    params.insert("download_url".to_string(), resolved.download_url.clone());
    params.insert("integrity".to_string(), resolved.integrity.clone());
    params.insert("image_root_archive_name".to_string(), job.image_root_archive_name.clone());
    params.insert("kernel_file_name".to_string(), job.kernel_file_name.clone());
    params.insert("build_env_size".to_string(), format!("{}Gi", job.build_env_size_gib));
    params.insert("job_mem_size".to_string(), format!("{}Gi", job.job_mem_size_gib));
    params.insert("enable_debug".to_string(), job.enable_debug.to_string());
    params.insert("require_dkms".to_string(), job.require_dkms.to_string());
    params.insert("security_privilege".to_string(), placement.security_privilege.to_string());
    params.insert(
        "s3_bucket".to_string(),
        match job.job_type {
            JobType::Create => config.s3_ims_bucket.clone(),
            JobType::Customize => config.s3_boot_images_bucket.clone(),
        },
    );

    if let Some(runtime_class) = &placement.runtime_class {
        params.insert("runtime_class".to_string(), runtime_class.clone());
    }
    if let Some(xname) = &placement.remote_xname {
        params.insert("remote_build_node".to_string(), xname.clone());
    }
    if let Some(name) = &job.initrd_file_name {
        params.insert("initrd_file_name".to_string(), name.clone());
    }
    if let Some(name) = &job.kernel_parameters_file_name {
        params.insert("kernel_parameters_file_name".to_string(), name.clone());
    }
    if let Some(key_text) = public_key_text {
        params.insert("public_key".to_string(), key_text.to_string());
    }
    if let Some(recipe) = &resolved.recipe {
        params.insert("recipe_type".to_string(), recipe_type_str(recipe.recipe_type).to_string());
        let dict = serde_json::to_string(&recipe.template_dictionary).unwrap_or_else(|_| "[]".to_string());
        params.insert("template_dictionary".to_string(), dict);
    }
    if let Some(container) = job.ssh_containers.first() {
        params.insert("ssh_container_name".to_string(), container.name.clone());
        params.insert("ssh_container_jail".to_string(), container.jail.to_string());
        if let Some(info) = &container.connection_info {
            params.insert("ssh_external_host".to_string(), info.host.clone());
        }
    }

    params
}

fn render_templates(
    template_root: &dyn TemplateRoot,
    job_type: JobType,
    recipe_type: Option<&str>,
    params: &BTreeMap<String, String>,
) -> Result<ResourceTemplates, ImsError> {
    workload::render_all(template_root, job_type, recipe_type, params).map_err(ImsError::from)
}

/// `delete(id)`: invoke F's full delete; on success, remove the job record.
/// Partial failures leave the record so the caller can retry.
pub async fn delete(cluster: &dyn ClusterClient, jobs: &RecordStore<Job>, id: &str) -> Result<(), ImsError> {
    let job = jobs.get(id).ok_or_else(|| ImsError::not_found("job", id.to_string()))?;
    let namespace = job.kubernetes.namespace.clone().unwrap_or_default();

    let errors = workload::delete_full(cluster, &namespace, &job).await;
    if !errors.is_empty() {
        let detail = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
        return Err(ImsError::internal(format!("job `{id}` delete left resources behind: {detail}")));
    }

    jobs.delete(id)?;
    Ok(())
}

/// `delete_collection(filter)`: deletes every job matching `status`,
/// `job_type`, and/or a minimum age, collecting errors rather than
/// stopping at the first one.
pub async fn delete_collection(cluster: &dyn ClusterClient, jobs: &RecordStore<Job>, filter: JobFilter) -> Result<DeleteCollectionOutcome, ImsError> {
    let min_age = match &filter.age {
        Some(age) => Some(parse_age(age)?),
        None => None,
    };

    let now = Utc::now();
    let mut outcome = DeleteCollectionOutcome::default();

    for job in jobs.iter() {
        if let Some(status) = filter.status {
            if job.status != status {
                continue;
            }
        }
        if let Some(job_type) = filter.job_type {
            if job.job_type != job_type {
                continue;
            }
        }
        if let Some(min_age) = min_age {
            let age = now.signed_duration_since(job.created).to_std().unwrap_or(Duration::ZERO);
            if age < min_age {
                continue;
            }
        }

        match delete(cluster, jobs, &job.id).await {
            Ok(()) => outcome.deleted_ids.push(job.id.clone()),
            Err(e) => outcome.errors.push((job.id.clone(), e)),
        }
    }

    Ok(outcome)
}

fn parse_age(age: &str) -> Result<Duration, ImsError> {
    duration_str::parse(age).map_err(|e| ImsError::bad_request(format!("invalid age filter `{age}`: {e}")))
}

/// `patch(id, fields)`: only `status` and `resultant_image_id` are mutable.
/// Transitioning into a terminal status releases the service/DestinationRule
/// (F's partial delete); repeated patches to the same terminal status are
/// idempotent since that delete tolerates already-absent resources.
pub async fn patch(cluster: &dyn ClusterClient, jobs: &RecordStore<Job>, id: &str, fields: JobPatch) -> Result<Job, ImsError> {
    let mut job = jobs.get(id).ok_or_else(|| ImsError::not_found("job", id.to_string()))?;

    if let Some(new_status) = fields.status {
        if job.status.is_terminal() && !new_status.is_terminal() {
            return Err(ImsError::PatchConflict {
                id: id.to_string(),
                field: "status".to_string(),
            });
        }

        let entering_terminal = new_status.is_terminal();
        job.status = new_status;

        if entering_terminal {
            let namespace = job.kubernetes.namespace.clone().unwrap_or_default();
            let errors = workload::delete_partial(cluster, &namespace, &job).await;
            if !errors.is_empty() {
                warn!(job_id = %id, error_count = errors.len(), "partial delete on terminal transition left resources behind");
            }
        }
    }

    if let Some(image_id) = fields.resultant_image_id {
        job.resultant_image_id = Some(image_id);
    }

    jobs.put(job.clone())?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecipeType;

    #[test]
    fn test_create_job_rejects_user_supplied_ssh_containers() {
        let containers = vec![SshContainer {
            name: "x".to_string(),
            jail: false,
            status: None,
            connection_info: None,
        }];
        let result = validate_ssh_containers(JobType::Create, containers, false);
        assert!(result.is_err());
    }

    #[test]
    fn test_create_job_with_enable_debug_appends_debug_container() {
        let containers = validate_ssh_containers(JobType::Create, vec![], true).expect("ok");
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "debug");
        assert!(!containers[0].jail);
    }

    #[test]
    fn test_customize_job_defaults_empty_containers_to_customize() {
        let containers = validate_ssh_containers(JobType::Customize, vec![], false).expect("ok");
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, "customize");
    }

    #[test]
    fn test_customize_job_rejects_more_than_one_container() {
        let containers = vec![
            SshContainer {
                name: "a".to_string(),
                jail: false,
                status: None,
                connection_info: None,
            },
            SshContainer {
                name: "b".to_string(),
                jail: false,
                status: None,
                connection_info: None,
            },
        ];
        assert!(validate_ssh_containers(JobType::Customize, containers, false).is_err());
    }

    #[test]
    fn test_require_dkms_forced_true_on_aarch64() {
        assert!(resolve_require_dkms(JobType::Create, Arch::Aarch64, Some(false), None, false));
    }

    #[test]
    fn test_require_dkms_inherits_from_recipe_on_create_when_omitted() {
        let recipe = Recipe {
            id: "r1".to_string(),
            name: "recipe".to_string(),
            link: None,
            recipe_type: RecipeType::KiwiNg,
            linux_distribution: crate::models::LinuxDistribution::Sles15,
            arch: Arch::X86_64,
            require_dkms: true,
            template_dictionary: vec![],
            created: crate::models::now(),
        };
        assert!(resolve_require_dkms(JobType::Create, Arch::X86_64, None, Some(&recipe), false));
    }

    #[test]
    fn test_require_dkms_falls_back_to_config_default_for_customize() {
        assert!(!resolve_require_dkms(JobType::Customize, Arch::X86_64, None, None, false));
        assert!(resolve_require_dkms(JobType::Customize, Arch::X86_64, None, None, true));
    }

    #[test]
    fn test_parse_age_accepts_duration_grammar() {
        assert_eq!(parse_age("7d").expect("parse"), Duration::from_secs(7 * 24 * 3600));
    }

    #[test]
    fn test_parse_age_rejects_garbage() {
        assert!(parse_age("not-a-duration").is_err());
    }
}
