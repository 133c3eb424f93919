//! AWS-oriented adapters and handlers for cloudpipe steps.
//!
//! This crate owns runtime integration details (Lambda environment detection,
//! the S3 storage backend and the bundled step handlers). Path mapping itself
//! lives in `cloudpipe_core`.

pub mod adapters;
pub mod handlers;
pub mod runtime;
