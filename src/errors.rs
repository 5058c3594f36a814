//! Top-level error kind, mirroring the HTTP-mapped error table every
//! component boundary converts into. Component-scoped errors (object store,
//! cluster, secret manager, SSH) stay as their own `thiserror` enums and
//! `From`-convert here; nothing lower-level ever crosses a component
//! boundary unconverted.

use thiserror::Error;

use crate::object_storage::errors::ObjectStorageError;
use crate::services::remote_node::SshProbeError;
use crate::services::workload::ClusterError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImsError {
    #[error("missing input: {detail}")]
    MissingInput { detail: String },

    #[error("bad request: {detail}")]
    BadRequest { detail: String },

    #[error("resource not found: {kind} `{id}`")]
    ResourceNotFound { kind: String, id: String },

    #[error("patch conflict on `{field}` for `{id}`")]
    PatchConflict { id: String, field: String },

    #[error("validation failure: {detail:?}")]
    ValidationFailure {
        detail: Option<String>,
        field_errors: Vec<String>,
    },

    #[error("internal error: {detail}")]
    Internal { detail: String },
}

impl ImsError {
    pub fn http_status(&self) -> u16 {
        match self {
            ImsError::MissingInput { .. } => 400,
            ImsError::BadRequest { .. } => 400,
            ImsError::ResourceNotFound { .. } => 404,
            ImsError::PatchConflict { .. } => 409,
            ImsError::ValidationFailure { .. } => 422,
            ImsError::Internal { .. } => 500,
        }
    }

    pub fn bad_request<S: Into<String>>(detail: S) -> Self {
        ImsError::BadRequest { detail: detail.into() }
    }

    pub fn not_found<S: Into<String>>(kind: S, id: S) -> Self {
        ImsError::ResourceNotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn internal<S: Into<String>>(detail: S) -> Self {
        ImsError::Internal { detail: detail.into() }
    }

    /// `generate_data_validation_failure()` called with no field errors —
    /// reject without detail.
    pub fn validation_failure_without_detail() -> Self {
        ImsError::ValidationFailure {
            detail: None,
            field_errors: vec![],
        }
    }

    pub fn validation_failure(field_errors: Vec<String>) -> Self {
        ImsError::ValidationFailure {
            detail: Some("schema validation failed".to_string()),
            field_errors,
        }
    }
}

impl From<ObjectStorageError> for ImsError {
    fn from(e: ObjectStorageError) -> Self {
        ImsError::Internal { detail: e.to_string() }
    }
}

impl From<ClusterError> for ImsError {
    fn from(e: ClusterError) -> Self {
        ImsError::Internal { detail: e.to_string() }
    }
}

impl From<SshProbeError> for ImsError {
    fn from(e: SshProbeError) -> Self {
        ImsError::Internal { detail: e.to_string() }
    }
}

impl From<crate::record_store::RecordStoreError> for ImsError {
    fn from(e: crate::record_store::RecordStoreError) -> Self {
        ImsError::Internal { detail: e.to_string() }
    }
}
