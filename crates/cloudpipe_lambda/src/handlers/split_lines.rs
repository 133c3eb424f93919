use std::fs;
use std::path::Path;

use cloudpipe_core::error::StepError;
use cloudpipe_core::fsmap::{FsMapSpec, PathMap};
use cloudpipe_core::step::{Step, StepDefinition, StepResponse};
use serde_json::{json, Map, Value};

pub const TEXT_KEY: &str = "text";
pub const LINES_KEY: &str = "lines";

const SOURCE_TEMPLATE: &str = "{doc}/source.txt";
const LINES_TEMPLATE: &str = "{doc}/lines/*.txt";

/// Splits the `text` source into one `lines` object per non-blank line. Each
/// list entry carries its line number and a copy of the `text` entry.
pub fn split_lines_definition() -> StepDefinition {
    StepDefinition::new(
        FsMapSpec::new(PathMap::new().with(TEXT_KEY, SOURCE_TEMPLATE))
            .with_destn(PathMap::new().with(LINES_KEY, LINES_TEMPLATE))
            .with_list_copy_keys([TEXT_KEY]),
    )
    .with_more_info(line_info)
}

pub fn handle_split_lines_event(
    step: &Step,
    definition: &StepDefinition,
    event: Value,
) -> Result<StepResponse, StepError> {
    step.handle(definition, event, |args| {
        let text_path = args
            .source(TEXT_KEY)
            .ok_or("split step requires a 'text' source")?;
        let text = fs::read_to_string(text_path)?;
        let lines_dir = args
            .save(LINES_KEY)
            .ok_or("split step requires a 'lines' destination")?
            .to_path_buf();

        let mut total = 0usize;
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            fs::write(lines_dir.join(format!("{total:05}.txt")), line)?;
            total += 1;
        }

        tracing::debug!(component = "split_lines", total, "wrote line objects");
        args.extra_mut(LINES_KEY)
            .insert("total".to_string(), json!(total));
        Ok(())
    })
}

fn line_info(path: &Path) -> Map<String, Value> {
    let mut info = Map::new();
    let line = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse::<u64>().ok());
    if let Some(line) = line {
        info.insert("line".to_string(), json!(line));
    }
    info
}

#[cfg(test)]
mod tests {
    use cloudpipe_core::config::StepConfig;
    use cloudpipe_core::storage::MemoryStorage;

    use super::*;

    #[test]
    fn writes_one_object_per_line() {
        let scratch = tempfile::tempdir().expect("tempdir should be created");
        let step = Step::new(
            StepConfig::default()
                .with_in_cloud(true)
                .with_scratch_parent(scratch.path()),
            Some(Box::new(
                MemoryStorage::new().with_object("text/notes.txt", b"alpha\n\nbeta\n".to_vec()),
            )),
        );

        let response = handle_split_lines_event(
            &step,
            &split_lines_definition(),
            json!({
                "document": {"name": "notes"},
                "text": {"key": "text/notes.txt"},
            }),
        )
        .expect("split should succeed");

        assert_eq!(
            response.body[LINES_KEY],
            json!([
                {
                    "lines": {"key": "lines/notes/lines/00000.txt", "line": 0, "total": 2},
                    "text": {"key": "text/notes.txt"},
                },
                {
                    "lines": {"key": "lines/notes/lines/00001.txt", "line": 1, "total": 2},
                    "text": {"key": "text/notes.txt"},
                },
            ])
        );
    }

    #[test]
    fn requires_document_name() {
        let scratch = tempfile::tempdir().expect("tempdir should be created");
        let step = Step::new(
            StepConfig::default()
                .with_in_cloud(true)
                .with_scratch_parent(scratch.path()),
            Some(Box::new(
                MemoryStorage::new().with_object("notes.txt", b"alpha".to_vec()),
            )),
        );

        let error = handle_split_lines_event(
            &step,
            &split_lines_definition(),
            json!({"text": {"key": "notes.txt"}}),
        )
        .expect_err("split should fail without a document name");

        assert!(error.to_string().contains("doc"));
    }
}
