//! Plugin candidate discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::manifest::MANIFEST_EXTENSION;

/// A manifest file found in the plugin directory, not yet loaded.
#[derive(Debug, Clone)]
pub struct PluginCandidate {
    /// Plugin name: the manifest file stem.
    pub name: String,
    pub path: PathBuf,
}

/// Scan `dir` for manifest files, ordered lexicographically by file name so
/// registration order and collision resolution are reproducible. A missing
/// or unreadable directory yields no candidates.
pub fn discover(dir: &Path) -> Vec<PluginCandidate> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "no plugin directory to scan");
            return Vec::new();
        }
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        let path = entry.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(MANIFEST_EXTENSION)
        {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            warn!(path = %path.display(), "skipping manifest with non-UTF-8 name");
            continue;
        };
        if name.is_empty() {
            continue;
        }
        candidates.push(PluginCandidate {
            name: name.to_string(),
            path,
        });
    }

    candidates.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    candidates
}
