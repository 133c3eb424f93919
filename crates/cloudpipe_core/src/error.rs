use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Boxed error returned by step logic. Matches `lambda_runtime::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("no value bound for placeholder '{{{name}}}' in template '{template}'")]
    MissingName { name: String, template: String },

    #[error("unclosed '{{' at byte {position} in template '{template}'")]
    Unclosed { position: usize, template: String },

    #[error("single '}}' encountered at byte {position} in template '{template}'")]
    StrayClose { position: usize, template: String },

    #[error("unsupported placeholder '{{{field}}}' in template '{template}'")]
    UnsupportedField { field: String, template: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event must be a JSON object")]
    NotAnObject,

    #[error("event body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("event field '{field}' is missing or has the wrong type")]
    InvalidField { field: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object '{key}' was not found")]
    ObjectNotFound { key: String },

    #[error("local file '{}' was not found", path.display())]
    LocalFileNotFound { path: PathBuf },

    #[error("i/o error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error)]
pub enum FsMapError {
    #[error("event has no entry for declared key '{name}'")]
    MissingEventEntry { name: String },

    #[error("event entry '{name}' has no string 'key' field")]
    MissingObjectKey { name: String },

    #[error(transparent)]
    Event(#[from] EventError),

    #[error("failed to resolve path for '{name}': {source}")]
    Template {
        name: String,
        #[source]
        source: TemplateError,
    },

    #[error(
        "error downloading source key {name}: {template}, from Key={key}, Filename={}: {source}",
        filename.display()
    )]
    Download {
        name: String,
        template: String,
        key: String,
        filename: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("error uploading '{}' to {key} for destination {name}: {source}", filename.display())]
    Upload {
        name: String,
        key: String,
        filename: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("path '{path}' resolved for '{name}' leaves the local root")]
    EscapesRoot { name: String, path: String },

    #[error("failed to create directory '{}': {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid wildcard pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("failed to read wildcard match for '{pattern}': {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::GlobError,
    },

    #[error("list copy key '{0}' is missing from the response body")]
    MissingListCopyKey(String),
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    FsMap(#[from] FsMapError),

    #[error("failed to allocate scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error("step logic failed: {0}")]
    Logic(#[source] BoxError),
}
