//! Response body assembly.
//!
//! The body echoes the incoming event with the upload ledger laid over it.
//! Wildcard destinations become a list with one object per uploaded file.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{json, Map, Value};

use crate::error::FsMapError;
use crate::event::Event;
use crate::fsmap::{UploadLedger, UploadRecord};

/// Extra fields for a list entry, derived from the uploaded key.
pub type InfoFromPath = dyn Fn(&Path) -> Map<String, Value> + Send + Sync;

/// Per-destination fields written back by step logic.
pub type ExtraReturn = BTreeMap<String, Map<String, Value>>;

pub struct ResponseBody<'a> {
    pub event: &'a Event,
    pub uploads: &'a UploadLedger,
    pub list_keys: &'a [String],
    pub extra_return: &'a ExtraReturn,
    pub additional_info: Option<&'a InfoFromPath>,
    pub key_copy: &'a [String],
}

impl ResponseBody<'_> {
    pub fn build(&self) -> Result<Event, FsMapError> {
        let mut body = self.event.clone();

        if !self.uploads.is_empty() {
            for (name, record) in self.uploads {
                body.insert(name.clone(), record_value(record));
            }
            for (name, extra) in self.extra_return {
                if self.list_keys.contains(name) {
                    continue;
                }
                if let Some(Value::Object(current)) = body.get_mut(name) {
                    merge(current, extra);
                }
            }
        }

        for listed in self.list_keys {
            let mut items = list_items(self.uploads, listed, self.additional_info);

            if let Some(extra) = self.extra_return.get(listed) {
                for item in &mut items {
                    if let Some(Value::Object(inner)) = item.get_mut(listed) {
                        merge(inner, extra);
                    }
                }
            }

            for copy_key in self.key_copy {
                let value = body
                    .get(copy_key)
                    .cloned()
                    .ok_or_else(|| FsMapError::MissingListCopyKey(copy_key.clone()))?;
                for item in &mut items {
                    item.insert(copy_key.clone(), value.clone());
                }
            }

            body.insert(
                listed.clone(),
                Value::Array(items.into_iter().map(Value::Object).collect()),
            );
        }

        Ok(body)
    }
}

/// Event copy whose `root_list_key` holds one entry per key uploaded for
/// `multiples_key`.
///
/// With `top_level_list` every entry also carries the other ledger entries;
/// otherwise those entries are set once on the returned body.
pub fn build_list_body(
    event: &Event,
    uploads: &UploadLedger,
    multiples_key: &str,
    root_list_key: &str,
    additional_info: Option<&InfoFromPath>,
    top_level_list: bool,
) -> Event {
    let mut body = event.clone();
    let mut items = list_items(uploads, multiples_key, additional_info);

    for (constant_key, record) in uploads {
        if constant_key == multiples_key {
            continue;
        }
        if top_level_list {
            for item in &mut items {
                item.insert(constant_key.clone(), record_value(record));
            }
        } else {
            body.insert(constant_key.clone(), record_value(record));
        }
    }

    body.insert(
        root_list_key.to_string(),
        Value::Array(items.into_iter().map(Value::Object).collect()),
    );
    body
}

fn list_items(
    uploads: &UploadLedger,
    multiples_key: &str,
    additional_info: Option<&InfoFromPath>,
) -> Vec<Map<String, Value>> {
    let keys: Vec<&str> = match uploads.get(multiples_key) {
        Some(UploadRecord::Multiple(keys)) => keys.iter().map(String::as_str).collect(),
        Some(UploadRecord::Single { key }) => vec![key.as_str()],
        None => Vec::new(),
    };

    keys.into_iter()
        .map(|key| {
            let mut entry = Map::new();
            entry.insert("key".to_string(), Value::from(key));
            if let Some(info) = additional_info {
                entry.extend(info(Path::new(key)));
            }

            let mut item = Map::new();
            item.insert(multiples_key.to_string(), Value::Object(entry));
            item
        })
        .collect()
}

fn record_value(record: &UploadRecord) -> Value {
    match record {
        UploadRecord::Single { key } => json!({ "key": key }),
        UploadRecord::Multiple(keys) => json!(keys),
    }
}

fn merge(target: &mut Map<String, Value>, extra: &Map<String, Value>) {
    for (name, value) in extra {
        target.insert(name.clone(), value.clone());
    }
}
