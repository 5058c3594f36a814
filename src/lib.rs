#[macro_use]
extern crate tracing;

pub mod collaborators;
pub mod config;
pub mod errors;
pub mod kubers_utils;
pub mod manifest;
pub mod models;
pub mod object_storage;
pub mod record_store;
pub mod secret_manager;
pub mod services;
