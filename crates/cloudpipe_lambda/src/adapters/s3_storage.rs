use std::fs;
use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use cloudpipe_core::error::StorageError;
use cloudpipe_core::storage::{ensure_local_file, ObjectStorage};

/// S3 bucket backend. Calls block the current worker thread, so it must be
/// used from a multi-threaded tokio runtime.
#[derive(Debug, Clone)]
pub struct S3Storage {
    bucket: String,
    s3_client: aws_sdk_s3::Client,
}

impl S3Storage {
    pub fn new(bucket: impl Into<String>, s3_client: aws_sdk_s3::Client) -> Self {
        Self {
            bucket: bucket.into(),
            s3_client,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

impl ObjectStorage for S3Storage {
    fn fetch(&self, key: &str, local_path: &Path) -> Result<(), StorageError> {
        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let target = local_path.to_path_buf();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let output = client
                    .get_object()
                    .bucket(bucket)
                    .key(object_key.clone())
                    .send()
                    .await
                    .map_err(|error| {
                        let service_error = error.into_service_error();
                        if service_error.is_no_such_key() {
                            StorageError::ObjectNotFound {
                                key: object_key.clone(),
                            }
                        } else {
                            StorageError::Backend(format!(
                                "failed to read object from s3: {service_error}"
                            ))
                        }
                    })?;

                let body = output.body.collect().await.map_err(|error| {
                    StorageError::Backend(format!("failed to stream object from s3: {error}"))
                })?;

                fs::write(&target, body.into_bytes()).map_err(|source| StorageError::Io {
                    path: target.clone(),
                    source,
                })
            })
        })
    }

    fn store(&self, local_path: &Path, key: &str) -> Result<(), StorageError> {
        ensure_local_file(local_path)?;

        let bucket = self.bucket.clone();
        let object_key = key.to_string();
        let source_path = local_path.to_path_buf();
        let client = self.s3_client.clone();

        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(async move {
                let body = ByteStream::from_path(&source_path).await.map_err(|error| {
                    StorageError::Backend(format!(
                        "failed to open '{}' for upload: {error}",
                        source_path.display()
                    ))
                })?;

                client
                    .put_object()
                    .bucket(bucket)
                    .key(object_key)
                    .body(body)
                    .send()
                    .await
                    .map(|_| ())
                    .map_err(|error| {
                        StorageError::Backend(format!("failed to write object to s3: {error}"))
                    })
            })
        })
    }
}
