//! Lambda environment detection, storage lookup and process setup.

use cloudpipe_core::config::StepConfig;
use cloudpipe_core::step::Step;
use cloudpipe_core::storage::ObjectStorage;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::adapters::s3_storage::S3Storage;

/// Set by the Lambda runtime for every function instance.
pub const LAMBDA_VERSION_ENV: &str = "AWS_LAMBDA_FUNCTION_VERSION";

pub fn is_current() -> bool {
    is_current_with(|name| std::env::var(name).ok())
}

pub fn is_current_with(lookup: impl Fn(&str) -> Option<String>) -> bool {
    lookup(LAMBDA_VERSION_ENV).is_some_and(|value| !value.is_empty())
}

/// Where a step's objects live, per storage provider.
///
/// Each value names an environment variable holding the bucket, or is the
/// bucket name itself when no such variable is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub s3: String,
}

impl StorageLocation {
    pub fn s3(location: impl Into<String>) -> Self {
        Self { s3: location.into() }
    }

    pub fn resolve_bucket(&self, lookup: impl Fn(&str) -> Option<String>) -> String {
        lookup(&self.s3)
            .filter(|bucket| !bucket.trim().is_empty())
            .unwrap_or_else(|| self.s3.clone())
    }
}

/// Step settings for this process: env-driven defaults plus Lambda detection.
pub fn step_config() -> StepConfig {
    StepConfig::from_env().with_in_cloud(is_current())
}

/// S3 backend when running in Lambda or when cloud storage is assumed;
/// `None` otherwise.
pub async fn new_storage(location: &StorageLocation, assume_cloud: bool) -> Option<S3Storage> {
    let in_lambda = is_current();
    if !assume_cloud && !in_lambda {
        return None;
    }

    let bucket = location.resolve_bucket(|name| std::env::var(name).ok());
    tracing::info!(
        component = "runtime",
        in_lambda,
        bucket = %bucket,
        "using S3 object storage"
    );

    let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    Some(S3Storage::new(bucket, aws_sdk_s3::Client::new(&aws_config)))
}

/// Builds the process-wide [`Step`] from the environment.
pub async fn build_step(location: &StorageLocation) -> Step {
    let config = step_config();
    let storage = new_storage(location, config.assume_cloud).await;
    Step::new(
        config,
        storage.map(|storage| Box::new(storage) as Box<dyn ObjectStorage + Send + Sync>),
    )
}

/// JSON log lines to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}
