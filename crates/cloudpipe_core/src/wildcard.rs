use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::bindings::NameBindings;
use crate::error::FsMapError;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

pub fn path_is_wild(path: &str) -> bool {
    path.contains('*') || path.contains('?')
}

/// Nearest ancestor of `path` that contains no wildcard characters.
///
/// `a/*/b/*.txt` resolves to `a`; a bare `*.txt` resolves to the empty path.
pub fn wild_path_parent(path: &Path) -> PathBuf {
    path.ancestors()
        .skip(1)
        .find(|ancestor| !path_is_wild(&ancestor.to_string_lossy()))
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

/// Copy of `bindings` whose values only match themselves inside a glob
/// pattern.
pub fn literal_bindings(bindings: &NameBindings) -> NameBindings {
    bindings
        .iter()
        .map(|(name, value)| (name, Pattern::escape(value)))
        .collect()
}

/// Files under `root` matching the relative `pattern`, sorted.
pub fn expand(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, FsMapError> {
    let escaped_root = Pattern::escape(&root.to_string_lossy());
    let full_pattern = format!(
        "{}/{}",
        escaped_root.trim_end_matches('/'),
        pattern.trim_start_matches('/')
    );

    let entries = glob::glob_with(&full_pattern, MATCH_OPTIONS).map_err(|source| {
        FsMapError::Pattern {
            pattern: pattern.to_string(),
            source,
        }
    })?;

    let mut matches = Vec::new();
    for entry in entries {
        let path = entry.map_err(|source| FsMapError::Glob {
            pattern: pattern.to_string(),
            source,
        })?;
        if path.is_file() {
            matches.push(path);
        }
    }
    matches.sort();
    Ok(matches)
}

/// Object key for a file uploaded from `relative` under the logical `name`.
pub fn upload_key(name: &str, relative: &Path) -> String {
    let mut key = name.trim_end_matches('/').to_string();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            key.push('/');
            key.push_str(&part.to_string_lossy());
        }
    }
    key
}
