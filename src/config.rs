//! Environment-variable driven configuration, loaded once at process start.
//!
//! Mirrors the env var table in the external interface contract: every
//! variable is read eagerly so a misconfigured deployment fails at startup
//! rather than mid-request.

use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable `{0}`")]
    MissingVar(String),
    #[error("environment variable `{name}` has an invalid value `{value}`: {reason}")]
    InvalidVar {
        name: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_store_root: String,
    pub log_level: String,

    pub s3_endpoint: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub s3_ssl_validate: bool,
    pub s3_sts_endpoint: Option<String>,
    pub s3_sts_access_key: Option<String>,
    pub s3_sts_secret_key: Option<String>,
    pub s3_ims_bucket: String,
    pub s3_boot_images_bucket: String,
    pub s3_url_expiration: Duration,
    pub s3_connect_timeout: Duration,
    pub s3_read_timeout: Duration,

    pub max_image_manifest_size_bytes: u64,

    pub ims_job_template_path: String,
    pub default_ims_job_namespace: String,
    pub default_ims_image_size_gib: u32,
    pub default_ims_job_mem_size_gib: u32,
    pub job_enable_dkms: bool,
    pub job_kata_runtime: String,
    pub job_aarch64_runtime: String,
    pub job_customer_access_network_access_pool: String,
    pub job_customer_access_subnet_name: String,
    pub job_customer_access_network_domain: String,
}

fn required(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v.parse::<bool>().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            value: v,
            reason: e.to_string(),
        }),
    }
}

fn optional_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v.parse::<u64>().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            value: v,
            reason: e.to_string(),
        }),
    }
}

fn optional_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(name) {
        Err(_) => Ok(default),
        Ok(v) => v.parse::<u32>().map_err(|e| ConfigError::InvalidVar {
            name: name.to_string(),
            value: v,
            reason: e.to_string(),
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        let config = Config {
            data_store_root: required("HACK_DATA_STORE")?,
            log_level: optional("LOG_LEVEL", "info"),

            s3_endpoint: required("S3_ENDPOINT")?,
            s3_access_key: required("S3_ACCESS_KEY")?,
            s3_secret_key: required("S3_SECRET_KEY")?,
            s3_ssl_validate: optional_bool("S3_SSL_VALIDATE", true)?,
            s3_sts_endpoint: env::var("S3_STS_ENDPOINT").ok(),
            s3_sts_access_key: env::var("S3_STS_ACCESS_KEY").ok(),
            s3_sts_secret_key: env::var("S3_STS_SECRET_KEY").ok(),
            s3_ims_bucket: required("S3_IMS_BUCKET")?,
            s3_boot_images_bucket: required("S3_BOOT_IMAGES_BUCKET")?,
            s3_url_expiration: Duration::from_secs(optional_u64("S3_URL_EXPIRATION", 5 * 24 * 3600)?),
            s3_connect_timeout: Duration::from_secs(optional_u64("S3_CONNECT_TIMEOUT", 30)?),
            s3_read_timeout: Duration::from_secs(optional_u64("S3_READ_TIMEOUT", 30)?),

            max_image_manifest_size_bytes: optional_u64("MAX_IMAGE_MANIFEST_SIZE_BYTES", 1024 * 1024)?,

            ims_job_template_path: required("IMS_JOB_TEMPLATE_PATH")?,
            default_ims_job_namespace: required("DEFAULT_IMS_JOB_NAMESPACE")?,
            default_ims_image_size_gib: optional_u32("DEFAULT_IMS_IMAGE_SIZE", 10)?,
            default_ims_job_mem_size_gib: optional_u32("DEFAULT_IMS_JOB_MEM_SIZE", 4)?,
            job_enable_dkms: optional_bool("JOB_ENABLE_DKMS", false)?,
            job_kata_runtime: optional("JOB_KATA_RUNTIME", "kata-qemu"),
            job_aarch64_runtime: optional("JOB_AARCH64_RUNTIME", "kata-qemu-aarch64"),
            job_customer_access_network_access_pool: optional("JOB_CUSTOMER_ACCESS_NETWORK_ACCESS_POOL", ""),
            job_customer_access_subnet_name: optional("JOB_CUSTOMER_ACCESS_SUBNET_NAME", "ims"),
            job_customer_access_network_domain: required("JOB_CUSTOMER_ACCESS_NETWORK_DOMAIN")?,
        };

        info!(data_store_root = %config.data_store_root, log_level = %config.log_level, "loaded configuration");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_missing_required_var_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        for (k, _) in env::vars() {
            if k.starts_with("S3_") || k == "HACK_DATA_STORE" {
                env::remove_var(k);
            }
        }

        let result = Config::from_env();
        assert!(matches!(result, Err(ConfigError::MissingVar(_))));
    }
}
