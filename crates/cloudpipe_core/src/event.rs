use serde_json::{Map, Value};

use crate::bindings::NameBindings;
use crate::error::{EventError, FsMapError};

pub type Event = Map<String, Value>;

/// Accepts a bare event object or an API-gateway style envelope whose `body`
/// holds the event as an object or a JSON string.
pub fn normalize_event(event: Value) -> Result<Event, EventError> {
    let Value::Object(mut object) = event else {
        return Err(EventError::NotAnObject);
    };

    let Some(body) = object.remove("body") else {
        return Ok(object);
    };

    match body {
        Value::Null => Ok(Map::new()),
        Value::Object(inner) => Ok(inner),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(inner)) => Ok(inner),
            Ok(_) => Err(EventError::NotAnObject),
            Err(error) => Err(EventError::MalformedBody(error.to_string())),
        },
        other => {
            // Not an envelope after all; keep `body` as ordinary event data.
            object.insert("body".to_string(), other);
            Ok(object)
        }
    }
}

/// Document-level names carried by the event itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMetadata {
    pub doc: Option<String>,
    pub page_index: Option<String>,
    pub header_index: Option<String>,
}

impl EventMetadata {
    pub fn from_event(event: &Event) -> Result<Self, EventError> {
        let doc = present(event, "document")
            .map(|document| required_text(document, "document", "name"))
            .transpose()?;
        let page_index = present(event, "SourcePage")
            .map(|page| required_text(page, "SourcePage", "index"))
            .transpose()?;
        let header_index = present(event, "Header")
            .map(|header| required_text(header, "Header", "index"))
            .transpose()?;

        Ok(Self {
            doc,
            page_index,
            header_index,
        })
    }

    pub fn bind_into(&self, bindings: &mut NameBindings) {
        if let Some(doc) = &self.doc {
            bindings.bind("doc", doc.clone());
        }
        if let Some(index) = &self.page_index {
            bindings.bind("page", format!("{index}.jpg"));
            bindings.bind("pagenum", index.clone());
        }
        if let Some(index) = &self.header_index {
            bindings.bind("header_index", index.clone());
        }
    }
}

/// Object-store key held by the event entry for `name`, or `None` when the
/// event has no such entry.
pub fn object_key<'a>(event: &'a Event, name: &str) -> Result<Option<&'a str>, FsMapError> {
    let Some(entry) = event.get(name) else {
        return Ok(None);
    };

    entry
        .get("key")
        .and_then(Value::as_str)
        .map(Some)
        .ok_or_else(|| FsMapError::MissingObjectKey {
            name: name.to_string(),
        })
}

/// Key with a leading `<prefix>/` removed, then reduced to its basename.
pub fn key_basename<'a>(key: &'a str, prefix: &str) -> &'a str {
    let stripped = if prefix.is_empty() {
        key
    } else {
        key.strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(key)
    };

    stripped
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// `null` and `{}` count as absent.
fn present<'a>(event: &'a Event, name: &str) -> Option<&'a Value> {
    event.get(name).filter(|value| match value {
        Value::Null => false,
        Value::Object(fields) => !fields.is_empty(),
        _ => true,
    })
}

fn required_text(parent: &Value, parent_name: &str, field: &str) -> Result<String, EventError> {
    match parent.get(field) {
        Some(Value::String(text)) => Ok(text.clone()),
        Some(Value::Number(number)) => Ok(number.to_string()),
        Some(Value::Bool(flag)) => Ok(flag.to_string()),
        _ => Err(EventError::InvalidField {
            field: format!("{parent_name}.{field}"),
        }),
    }
}
