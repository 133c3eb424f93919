//! Wraps a unit of step logic with download, upload and response assembly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tempfile::TempDir;

use crate::bindings::NameBindings;
use crate::config::StepConfig;
use crate::error::{BoxError, StepError};
use crate::event::{normalize_event, Event};
use crate::fsmap::{EventFsMap, FsMapSpec, RunError, SourceLocations};
use crate::response::{ExtraReturn, InfoFromPath, ResponseBody};
use crate::storage::{NoopStorage, ObjectStorage};

pub const SUCCESS_STATUS: &str = "200";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResponse {
    #[serde(rename = "statusCode")]
    pub status_code: String,
    pub body: Event,
}

/// Declared slots of a step plus the optional list-entry enrichment.
pub struct StepDefinition {
    spec: FsMapSpec,
    more_info: Option<Box<InfoFromPath>>,
}

impl StepDefinition {
    pub fn new(spec: FsMapSpec) -> Self {
        Self {
            spec,
            more_info: None,
        }
    }

    pub fn with_more_info(
        mut self,
        more_info: impl Fn(&Path) -> Map<String, Value> + Send + Sync + 'static,
    ) -> Self {
        self.more_info = Some(Box::new(more_info));
        self
    }

    pub fn spec(&self) -> &FsMapSpec {
        &self.spec
    }
}

/// What step logic sees for one invocation.
#[derive(Debug, Clone, Default)]
pub struct HandlerArgs {
    root: PathBuf,
    sources: BTreeMap<String, PathBuf>,
    params: BTreeMap<String, Value>,
    saves: BTreeMap<String, PathBuf>,
    extras: ExtraReturn,
    bindings: NameBindings,
}

impl HandlerArgs {
    fn new(
        event: &Event,
        spec: &FsMapSpec,
        locations: &SourceLocations,
        bindings: &NameBindings,
    ) -> Self {
        let mut params = BTreeMap::new();
        for name in spec.source.keys() {
            let Some(Value::Object(fields)) = event.get(name) else {
                continue;
            };
            for (field, value) in fields {
                if field != "Key" {
                    params.insert(format!("{name}_{field}"), value.clone());
                }
            }
        }

        Self {
            root: locations.root.clone(),
            sources: locations.sources.clone(),
            params,
            saves: locations.saves.clone(),
            extras: spec
                .destn
                .keys()
                .map(|name| (name.to_string(), Map::new()))
                .collect(),
            bindings: bindings.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local copy of a downloaded source.
    pub fn source(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(PathBuf::as_path)
    }

    /// Event field of a source entry, flattened as `<source>_<field>`.
    pub fn param(&self, flattened: &str) -> Option<&Value> {
        self.params.get(flattened)
    }

    pub fn event_param(&self, source: &str, field: &str) -> Option<&Value> {
        self.params.get(&format!("{source}_{field}"))
    }

    /// Where the logic should write a destination. Wildcard destinations get
    /// their pre-created directory.
    pub fn save(&self, name: &str) -> Option<&Path> {
        self.saves.get(name).map(PathBuf::as_path)
    }

    /// Fields merged into the response entry of destination `name`.
    pub fn extra_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        self.extras.entry(name.to_string()).or_default()
    }

    pub fn bindings(&self) -> &NameBindings {
        &self.bindings
    }
}

pub struct Step {
    config: StepConfig,
    storage: Box<dyn ObjectStorage + Send + Sync>,
}

impl Step {
    /// `storage` of `None` falls back to [`NoopStorage`], for running the
    /// logic against files already on disk.
    pub fn new(config: StepConfig, storage: Option<Box<dyn ObjectStorage + Send + Sync>>) -> Self {
        let storage = storage.unwrap_or_else(|| {
            if config.uses_cloud_storage() {
                tracing::warn!(
                    component = "step",
                    "cloud execution requested but no storage backend is available"
                );
            }
            Box::new(NoopStorage)
        });
        Self { config, storage }
    }

    pub fn config(&self) -> &StepConfig {
        &self.config
    }

    /// Maps `event` onto a fresh scratch directory, runs `logic`, and uploads
    /// its outputs when it succeeds.
    pub fn handle<F>(
        &self,
        definition: &StepDefinition,
        event: Value,
        logic: F,
    ) -> Result<StepResponse, StepError>
    where
        F: FnOnce(&mut HandlerArgs) -> Result<(), BoxError>,
    {
        let started_at = Instant::now();
        let event = normalize_event(event)?;
        let scratch = self.scratch_dir().map_err(StepError::Scratch)?;
        let spec = &definition.spec;

        let fsmap = EventFsMap::open(self.storage.as_ref(), spec, &event, scratch.path())?;
        let mut args = HandlerArgs::new(&event, spec, fsmap.locations(), fsmap.bindings());

        let completed = match fsmap.run(|_, _| logic(&mut args)) {
            Ok(completed) => completed,
            Err(RunError::Logic(error)) => {
                tracing::warn!(
                    component = "step",
                    duration_ms = started_at.elapsed().as_millis() as u64,
                    error = %error,
                    "step logic failed; outputs were not uploaded"
                );
                return Err(StepError::Logic(error));
            }
            Err(RunError::Upload(error)) => return Err(error.into()),
        };

        let list_keys = spec.destn.wild_keys();
        let body = ResponseBody {
            event: &event,
            uploads: &completed.uploads,
            list_keys: &list_keys,
            extra_return: &args.extras,
            additional_info: definition.more_info.as_deref(),
            key_copy: &spec.list_copy_keys,
        }
        .build()?;

        tracing::info!(
            component = "step",
            uploads = completed.uploads.len(),
            duration_ms = started_at.elapsed().as_millis() as u64,
            "step completed"
        );

        Ok(StepResponse {
            status_code: SUCCESS_STATUS.to_string(),
            body,
        })
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("cloudpipe-");
        match &self.config.scratch_parent {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::fsmap::PathMap;

    #[test]
    fn handler_args_flatten_source_fields_except_capital_key() {
        let event = json!({
            "upload": {"key": "a", "Key": "ignored", "bucket": "b"},
        })
        .as_object()
        .cloned()
        .expect("object");
        let spec = FsMapSpec::new(PathMap::new().with("upload", "{file}"))
            .with_destn(PathMap::new().with("result", "out"));
        let locations = SourceLocations::default();

        let mut args = HandlerArgs::new(&event, &spec, &locations, &NameBindings::new());

        assert_eq!(args.param("upload_key"), Some(&json!("a")));
        assert_eq!(args.event_param("upload", "bucket"), Some(&json!("b")));
        assert!(args.param("upload_Key").is_none());
        assert!(args.extra_mut("result").is_empty());
    }

    #[test]
    fn scratch_dirs_are_fresh_per_invocation() {
        let parent = tempfile::tempdir().expect("tempdir should be created");
        let step = Step::new(
            StepConfig::default().with_scratch_parent(parent.path()),
            None,
        );

        let first = step.scratch_dir().expect("scratch dir");
        let second = step.scratch_dir().expect("scratch dir");

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(parent.path()));
    }
}
