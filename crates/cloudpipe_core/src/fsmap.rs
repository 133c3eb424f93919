//! Binds an event's declared sources and destinations to a local root.
//!
//! Opening an [`EventFsMap`] downloads every source, resolves every
//! destination and creates the directories the step logic writes into. The
//! upload pass runs only when the logic succeeds, see [`EventFsMap::run`].

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

use crate::bindings::NameBindings;
use crate::error::{FsMapError, StorageError};
use crate::event::{key_basename, object_key, Event, EventMetadata};
use crate::storage::ObjectStorage;
use crate::template::{placeholders, render};
use crate::wildcard::{expand, literal_bindings, path_is_wild, upload_key, wild_path_parent};

/// Ordered logical key → path template map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMap {
    entries: Vec<(String, String)>,
}

impl PathMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the template for `name`, keeping first-insert order.
    pub fn with(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.insert(name, template);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, template: impl Into<String>) {
        let name = name.into();
        let template = template.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = template,
            None => self.entries.push((name, template)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(name, template)| (name.as_str(), template.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    /// Destination keys whose template contains a wildcard.
    pub fn wild_keys(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, template)| path_is_wild(template))
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (name, template) in iter {
            map.insert(name, template);
        }
        map
    }
}

/// Declared slots of one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsMapSpec {
    pub source: PathMap,
    pub destn: PathMap,
    pub ignore_missing_source: BTreeSet<String>,
    pub ignore_missing_destn: BTreeSet<String>,
    pub list_copy_keys: Vec<String>,
}

impl FsMapSpec {
    pub fn new(source: PathMap) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_destn(mut self, destn: PathMap) -> Self {
        self.destn = destn;
        self
    }

    pub fn ignore_missing_source<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_missing_source
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn ignore_missing_destn<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_missing_destn
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_list_copy_keys<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.list_copy_keys = names.into_iter().map(Into::into).collect();
        self
    }

    /// Checks template syntax up front. Unbound names are only detectable
    /// against a concrete event.
    pub fn validate(&self) -> Result<(), FsMapError> {
        for (name, template) in self.source.iter().chain(self.destn.iter()) {
            placeholders(template).map_err(|source| FsMapError::Template {
                name: name.to_string(),
                source,
            })?;
        }
        Ok(())
    }
}

/// Local paths resolved for one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocations {
    pub root: PathBuf,
    pub sources: BTreeMap<String, PathBuf>,
    /// Dry-run destination paths. Wildcard destinations map to the directory
    /// the logic is expected to fill.
    pub saves: BTreeMap<String, PathBuf>,
}

impl SourceLocations {
    pub fn source(&self, name: &str) -> Option<&Path> {
        self.sources.get(name).map(PathBuf::as_path)
    }

    pub fn save(&self, name: &str) -> Option<&Path> {
        self.saves.get(name).map(PathBuf::as_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum UploadRecord {
    Single { key: String },
    Multiple(Vec<String>),
}

pub type UploadLedger = BTreeMap<String, UploadRecord>;

/// Result of a scoped run whose logic succeeded and whose outputs were
/// uploaded.
#[derive(Debug)]
pub struct Completed<T> {
    pub output: T,
    pub uploads: UploadLedger,
    pub bindings: NameBindings,
}

/// Failure of a scoped run. `Logic` means nothing was uploaded.
#[derive(Debug)]
pub enum RunError<E> {
    Logic(E),
    Upload(FsMapError),
}

pub struct EventFsMap<'a> {
    storage: &'a dyn ObjectStorage,
    spec: &'a FsMapSpec,
    locations: SourceLocations,
    bindings: NameBindings,
}

impl<'a> EventFsMap<'a> {
    /// Downloads sources and prepares destination paths under `root`.
    pub fn open(
        storage: &'a dyn ObjectStorage,
        spec: &'a FsMapSpec,
        event: &Event,
        root: impl Into<PathBuf>,
    ) -> Result<Self, FsMapError> {
        let root = root.into();
        let metadata = EventMetadata::from_event(event)?;

        let mut bindings = NameBindings::new();
        if let Some(doc) = &metadata.doc {
            bindings.bind("doc", doc.clone());
        }

        let mut fsmap = Self {
            storage,
            spec,
            locations: SourceLocations {
                root,
                ..SourceLocations::default()
            },
            bindings,
        };

        fsmap.download_sources(event, &metadata)?;
        fsmap.locations.saves = fsmap.prepare_destinations()?;

        tracing::debug!(
            component = "fsmap",
            root = %fsmap.locations.root.display(),
            sources = fsmap.locations.sources.len(),
            destinations = fsmap.locations.saves.len(),
            "event mapped to local paths"
        );

        Ok(fsmap)
    }

    pub fn locations(&self) -> &SourceLocations {
        &self.locations
    }

    pub fn bindings(&self) -> &NameBindings {
        &self.bindings
    }

    /// Runs `logic` against the resolved paths and uploads outputs only if it
    /// returns `Ok`.
    pub fn run<T, E, F>(self, logic: F) -> Result<Completed<T>, RunError<E>>
    where
        F: FnOnce(&SourceLocations, &NameBindings) -> Result<T, E>,
    {
        let output = logic(&self.locations, &self.bindings).map_err(RunError::Logic)?;
        let (uploads, bindings) = self.close().map_err(RunError::Upload)?;
        Ok(Completed {
            output,
            uploads,
            bindings,
        })
    }

    /// Upload pass. Consumes the map so it can only happen once.
    pub fn close(self) -> Result<(UploadLedger, NameBindings), FsMapError> {
        let mut uploads = UploadLedger::new();
        let mut wild = Vec::new();

        for (name, template) in self.spec.destn.iter() {
            let relative = match self.resolve_destination(name, template)? {
                Destination::File(relative) => relative,
                Destination::Wild { pattern, .. } => {
                    wild.push((name, pattern));
                    continue;
                }
            };

            let filename = self.locations.root.join(&relative);
            let key = upload_key(name, &relative);
            match self.storage.store(&filename, &key) {
                Ok(()) => {
                    tracing::info!(component = "fsmap", destination = name, key = %key, "uploaded output");
                    uploads.insert(name.to_string(), UploadRecord::Single { key });
                }
                Err(StorageError::LocalFileNotFound { path })
                    if self.spec.ignore_missing_destn.contains(name) =>
                {
                    tracing::warn!(
                        component = "fsmap",
                        destination = name,
                        path = %path.display(),
                        "skipping missing optional output"
                    );
                }
                Err(source) => {
                    return Err(FsMapError::Upload {
                        name: name.to_string(),
                        key,
                        filename,
                        source,
                    });
                }
            }
        }

        for (name, pattern) in wild {
            let keys = self.upload_wildcard(name, &pattern)?;
            uploads.insert(name.to_string(), UploadRecord::Multiple(keys));
        }

        Ok((uploads, self.bindings))
    }

    fn upload_wildcard(&self, name: &str, pattern: &str) -> Result<Vec<String>, FsMapError> {
        let root = &self.locations.root;
        let mut keys = Vec::new();
        for filename in expand(root, pattern)? {
            let relative = filename.strip_prefix(root).unwrap_or(&filename);
            let key = upload_key(name, relative);
            self.storage
                .store(&filename, &key)
                .map_err(|source| FsMapError::Upload {
                    name: name.to_string(),
                    key: key.clone(),
                    filename: filename.clone(),
                    source,
                })?;
            keys.push(key);
        }

        tracing::info!(
            component = "fsmap",
            destination = name,
            pattern,
            uploaded = keys.len(),
            "uploaded wildcard outputs"
        );
        Ok(keys)
    }

    fn download_sources(
        &mut self,
        event: &Event,
        metadata: &EventMetadata,
    ) -> Result<(), FsMapError> {
        for (name, template) in self.spec.source.iter() {
            let Some(key) = object_key(event, name)? else {
                if self.spec.ignore_missing_source.contains(name) {
                    tracing::debug!(component = "fsmap", source = name, "optional source absent");
                    continue;
                }
                return Err(FsMapError::MissingEventEntry {
                    name: name.to_string(),
                });
            };

            self.bindings.bind("file", key_basename(key, name));
            metadata.bind_into(&mut self.bindings);

            let filename = self
                .locations
                .root
                .join(self.render_relative(name, template)?);
            create_parent(&filename)?;

            self.storage
                .fetch(key, &filename)
                .map_err(|source| FsMapError::Download {
                    name: name.to_string(),
                    template: template.to_string(),
                    key: key.to_string(),
                    filename: filename.clone(),
                    source,
                })?;

            tracing::info!(component = "fsmap", source = name, key, "downloaded input");
            self.locations.sources.insert(name.to_string(), filename);
        }
        Ok(())
    }

    /// Dry run of the upload pass: resolves each destination and creates the
    /// directories it needs without touching storage.
    fn prepare_destinations(&self) -> Result<BTreeMap<String, PathBuf>, FsMapError> {
        let mut saves = BTreeMap::new();
        for (name, template) in self.spec.destn.iter() {
            let path = match self.resolve_destination(name, template)? {
                Destination::File(relative) => {
                    let path = self.locations.root.join(relative);
                    create_parent(&path)?;
                    path
                }
                Destination::Wild { directory, .. } => {
                    let directory = self.locations.root.join(directory);
                    create_dir(&directory)?;
                    directory
                }
            };
            saves.insert(name.to_string(), path);
        }
        Ok(saves)
    }

    /// Wildness is decided by the template alone; bound values never act as
    /// wildcards.
    fn resolve_destination(&self, name: &str, template: &str) -> Result<Destination, FsMapError> {
        if !path_is_wild(template) {
            return self.render_relative(name, template).map(Destination::File);
        }

        self.render_relative(name, template)?;
        let parent = wild_path_parent(Path::new(template));
        let directory = self.render_relative(name, &parent.to_string_lossy())?;
        let pattern = render_named(name, template, &literal_bindings(&self.bindings))?;
        Ok(Destination::Wild { directory, pattern })
    }

    /// Renders `template` to a path that stays under the local root.
    fn render_relative(&self, name: &str, template: &str) -> Result<PathBuf, FsMapError> {
        let rendered = render_named(name, template, &self.bindings)?;
        let relative = PathBuf::from(&rendered);
        let escapes = relative.components().any(|component| {
            matches!(
                component,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(FsMapError::EscapesRoot {
                name: name.to_string(),
                path: rendered,
            });
        }
        Ok(relative)
    }
}

enum Destination {
    File(PathBuf),
    /// `directory` is what the logic fills; `pattern` collects its files.
    Wild { directory: PathBuf, pattern: String },
}

fn render_named(name: &str, template: &str, bindings: &NameBindings) -> Result<String, FsMapError> {
    render(template, bindings).map_err(|source| FsMapError::Template {
        name: name.to_string(),
        source,
    })
}

fn create_parent(path: &Path) -> Result<(), FsMapError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => create_dir(parent),
        _ => Ok(()),
    }
}

fn create_dir(path: &Path) -> Result<(), FsMapError> {
    fs::create_dir_all(path).map_err(|source| FsMapError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
