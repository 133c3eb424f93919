use std::fs;
use std::path::Path;
use std::sync::Arc;

use cloudpipe_core::config::StepConfig;
use cloudpipe_core::error::StepError;
use cloudpipe_core::fsmap::{FsMapSpec, PathMap};
use cloudpipe_core::step::{Step, StepDefinition};
use cloudpipe_core::storage::{MemoryStorage, ObjectStorage};
use serde_json::{json, Map, Value};

/// Shares one recording store between the step and the assertions.
struct SharedStorage(Arc<MemoryStorage>);

impl ObjectStorage for SharedStorage {
    fn fetch(
        &self,
        key: &str,
        local_path: &Path,
    ) -> Result<(), cloudpipe_core::error::StorageError> {
        self.0.fetch(key, local_path)
    }

    fn store(
        &self,
        local_path: &Path,
        key: &str,
    ) -> Result<(), cloudpipe_core::error::StorageError> {
        self.0.store(local_path, key)
    }
}

fn cloud_step(storage: &Arc<MemoryStorage>, scratch: &Path) -> Step {
    Step::new(
        StepConfig::default()
            .with_in_cloud(true)
            .with_scratch_parent(scratch),
        Some(Box::new(SharedStorage(Arc::clone(storage)))),
    )
}

#[test]
fn downloads_source_named_after_document() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemoryStorage::new().with_object("a", b"payload".to_vec()));
    let step = cloud_step(&storage, scratch.path());
    let definition = StepDefinition::new(FsMapSpec::new(PathMap::new().with("upload", "{doc}")));

    let mut seen_root = None;
    step.handle(
        &definition,
        json!({"document": {"name": "dummy_doc"}, "upload": {"key": "a"}}),
        |args| {
            let upload = args.source("upload").expect("upload should be mapped");
            assert_eq!(upload, args.root().join("dummy_doc"));
            assert_eq!(fs::read(upload)?, b"payload");
            seen_root = Some(args.root().to_path_buf());
            Ok(())
        },
    )
    .expect("step should succeed");

    let root = seen_root.expect("logic should run");
    assert_eq!(
        storage.fetches(),
        vec![("a".to_string(), root.join("dummy_doc"))]
    );
    assert!(!root.exists(), "scratch root is removed after the invocation");
}

#[test]
fn uploads_declared_destination() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemoryStorage::new().with_object("a", b"in".to_vec()));
    let step = cloud_step(&storage, scratch.path());
    let definition = StepDefinition::new(
        FsMapSpec::new(PathMap::new().with("source", "{doc}"))
            .with_destn(PathMap::new().with("result", "{doc}")),
    );

    let response = step
        .handle(
            &definition,
            json!({"document": {"name": "dummy_doc"}, "source": {"key": "a"}}),
            |args| {
                let result = args.save("result").expect("result should be mapped");
                assert!(result.exists(), "source and result share a path here");
                fs::write(result, b"out")?;
                Ok(())
            },
        )
        .expect("step should succeed");

    assert_eq!(storage.stored_keys(), vec!["result/dummy_doc".to_string()]);
    assert_eq!(response.status_code, "200");
    assert_eq!(response.body["result"]["key"], json!("result/dummy_doc"));
    assert_eq!(response.body["source"], json!({"key": "a"}));
}

#[test]
fn wildcard_destination_becomes_list_with_copied_keys() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemoryStorage::new().with_object("image.jpeg", b"jpeg".to_vec()));
    let step = cloud_step(&storage, scratch.path());
    let definition = StepDefinition::new(
        FsMapSpec::new(PathMap::new().with("original", "{doc}/input.jpeg"))
            .with_destn(PathMap::new().with("objects", "{doc}/output/*.jpeg"))
            .with_list_copy_keys(["original"]),
    )
    .with_more_info(|path| {
        let mut fields = Map::new();
        if let Some(stem) = path.file_stem() {
            fields.insert("index".to_string(), json!(stem.to_string_lossy()));
        }
        fields
    });

    let response = step
        .handle(
            &definition,
            json!({"document": {"name": "dummy_doc"}, "original": {"key": "image.jpeg"}}),
            |args| {
                let objects = args.save("objects").expect("objects should be mapped");
                assert_eq!(objects, args.root().join("dummy_doc").join("output"));
                fs::write(objects.join("1.jpeg"), b"1")?;
                fs::write(objects.join("0.jpeg"), b"0")?;
                args.extra_mut("objects")
                    .insert("total".to_string(), json!("2"));
                Ok(())
            },
        )
        .expect("step should succeed");

    let objects = response.body["objects"]
        .as_array()
        .expect("objects should be a list");
    let keys: Vec<&Value> = objects.iter().map(|item| &item["objects"]["key"]).collect();
    assert_eq!(
        keys,
        vec![
            &json!("objects/dummy_doc/output/0.jpeg"),
            &json!("objects/dummy_doc/output/1.jpeg"),
        ]
    );
    for (index, item) in objects.iter().enumerate() {
        assert_eq!(item["original"], json!({"key": "image.jpeg"}));
        assert_eq!(item["objects"]["total"], json!("2"));
        assert_eq!(item["objects"]["index"], json!(index.to_string()));
    }
}

#[test]
fn failing_logic_uploads_nothing() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemoryStorage::new().with_object("a", b"in".to_vec()));
    let step = cloud_step(&storage, scratch.path());
    let definition = StepDefinition::new(
        FsMapSpec::new(PathMap::new().with("source", "{file}"))
            .with_destn(PathMap::new().with("result", "out/{file}")),
    );

    let error = step
        .handle(&definition, json!({"source": {"key": "a"}}), |args| {
            fs::write(args.save("result").expect("result should be mapped"), b"partial")?;
            Err("model crashed".into())
        })
        .expect_err("step should fail");

    assert!(matches!(error, StepError::Logic(_)));
    assert!(storage.stores().is_empty());
}

#[test]
fn api_gateway_envelope_is_unwrapped() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let storage = Arc::new(MemoryStorage::new().with_object("docs/a.txt", b"text".to_vec()));
    let step = cloud_step(&storage, scratch.path());
    let definition =
        StepDefinition::new(FsMapSpec::new(PathMap::new().with("upload", "{file}")));

    let response = step
        .handle(
            &definition,
            json!({"body": "{\"upload\": {\"key\": \"docs/a.txt\"}}"}),
            |args| {
                assert_eq!(
                    args.source("upload"),
                    Some(args.root().join("a.txt").as_path())
                );
                Ok(())
            },
        )
        .expect("step should succeed");

    assert_eq!(response.body["upload"]["key"], json!("docs/a.txt"));
}

#[test]
fn local_mode_runs_without_storage() {
    let scratch = tempfile::tempdir().expect("tempdir should be created");
    let step = Step::new(
        StepConfig::default().with_scratch_parent(scratch.path()),
        None,
    );
    let definition = StepDefinition::new(
        FsMapSpec::default().with_destn(PathMap::new().with("result", "report.txt")),
    );

    let response = step
        .handle(&definition, json!({}), |args| {
            fs::write(args.save("result").expect("result should be mapped"), b"ok")?;
            Ok(())
        })
        .expect("step should succeed");

    assert_eq!(response.body["result"]["key"], json!("result/report.txt"));
}
