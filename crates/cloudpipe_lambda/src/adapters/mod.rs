pub mod s3_storage;
