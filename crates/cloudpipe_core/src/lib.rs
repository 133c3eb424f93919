//! Event-to-filesystem mapping primitives for serverless steps.
//!
//! This crate owns path-template resolution, wildcard expansion, the
//! download/upload orchestration around a unit of step logic, and response
//! body assembly. It intentionally excludes AWS SDK and Lambda runtime
//! concerns; object storage is reached through the [`storage::ObjectStorage`]
//! trait.

pub mod bindings;
pub mod config;
pub mod error;
pub mod event;
pub mod fsmap;
pub mod response;
pub mod step;
pub mod storage;
pub mod template;
pub mod wildcard;
