pub mod artifact_lifecycle;
pub mod job_controller;
pub mod remote_node;
pub mod signing_key;
pub mod soft_delete;
pub mod workload;
