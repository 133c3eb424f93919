use std::fs;

use cloudpipe_core::error::StepError;
use cloudpipe_core::fsmap::{FsMapSpec, PathMap};
use cloudpipe_core::step::{Step, StepDefinition, StepResponse};
use serde_json::{json, Value};

pub const INPUT_KEY: &str = "input";
pub const OUTPUT_KEY: &str = "output";

pub const SOURCE_TEMPLATE_ENV: &str = "CLOUDPIPE_SOURCE_TEMPLATE";
pub const DESTN_TEMPLATE_ENV: &str = "CLOUDPIPE_DESTN_TEMPLATE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyHandlerConfig {
    pub source_template: String,
    pub destn_template: String,
}

impl Default for CopyHandlerConfig {
    fn default() -> Self {
        Self {
            source_template: "{file}".to_string(),
            destn_template: "{file}".to_string(),
        }
    }
}

impl CopyHandlerConfig {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            source_template: lookup(SOURCE_TEMPLATE_ENV).unwrap_or(defaults.source_template),
            destn_template: lookup(DESTN_TEMPLATE_ENV).unwrap_or(defaults.destn_template),
        }
    }

    pub fn definition(&self) -> StepDefinition {
        StepDefinition::new(
            FsMapSpec::new(PathMap::new().with(INPUT_KEY, &self.source_template))
                .with_destn(PathMap::new().with(OUTPUT_KEY, &self.destn_template)),
        )
    }
}

/// Copies the `input` object to the `output` destination unchanged.
pub fn handle_copy_event(
    step: &Step,
    definition: &StepDefinition,
    event: Value,
) -> Result<StepResponse, StepError> {
    step.handle(definition, event, |args| {
        let input = args
            .source(INPUT_KEY)
            .ok_or("copy step requires an 'input' source")?
            .to_path_buf();
        let output = args
            .save(OUTPUT_KEY)
            .ok_or("copy step requires an 'output' destination")?
            .to_path_buf();

        let bytes = if input == output {
            fs::metadata(&input)?.len()
        } else {
            fs::copy(&input, &output)?
        };
        args.extra_mut(OUTPUT_KEY)
            .insert("bytes".to_string(), json!(bytes));
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use cloudpipe_core::config::StepConfig;
    use cloudpipe_core::storage::MemoryStorage;

    use super::*;

    fn memory_step(storage: MemoryStorage, scratch: &std::path::Path) -> Step {
        Step::new(
            StepConfig::default()
                .with_in_cloud(true)
                .with_scratch_parent(scratch),
            Some(Box::new(storage)),
        )
    }

    #[test]
    fn copies_input_to_templated_output() {
        let scratch = tempfile::tempdir().expect("tempdir should be created");
        let step = memory_step(
            MemoryStorage::new().with_object("input/scans/page.png", b"png-bytes".to_vec()),
            scratch.path(),
        );
        let config = CopyHandlerConfig {
            source_template: "{file}".to_string(),
            destn_template: "{doc}/{file}".to_string(),
        };

        let response = handle_copy_event(
            &step,
            &config.definition(),
            json!({
                "document": {"name": "scan-1"},
                "input": {"key": "input/scans/page.png"},
            }),
        )
        .expect("copy should succeed");

        assert_eq!(response.status_code, "200");
        assert_eq!(
            response.body["output"],
            json!({"key": "output/scan-1/page.png", "bytes": 9})
        );
    }

    #[test]
    fn missing_input_object_is_a_download_error() {
        let scratch = tempfile::tempdir().expect("tempdir should be created");
        let step = memory_step(MemoryStorage::new(), scratch.path());

        let error = handle_copy_event(
            &step,
            &CopyHandlerConfig::default().definition(),
            json!({"input": {"key": "absent.bin"}}),
        )
        .expect_err("copy should fail");

        assert!(matches!(
            error,
            StepError::FsMap(cloudpipe_core::error::FsMapError::Download { .. })
        ));
    }

    #[test]
    fn templates_are_read_from_lookup() {
        let vars = HashMap::from([(DESTN_TEMPLATE_ENV, "archive/{file}")]);
        let config = CopyHandlerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.source_template, "{file}");
        assert_eq!(config.destn_template, "archive/{file}");
    }
}
