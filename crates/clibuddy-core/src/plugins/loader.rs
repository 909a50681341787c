//! Candidate loading behind a recoverable failure boundary.
//!
//! A broken manifest must never take the host down: every failure mode —
//! I/O error, parse error, oversized file, panic, hang — becomes a rejection
//! reason recorded on the candidate's descriptor while the scan moves on.

use std::panic;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use super::manifest::{is_valid_command_name, PluginManifest, MAX_MANIFEST_BYTES};

/// Upper bound on a single candidate's load. A stuck loader thread is
/// abandoned; the process exits after dispatch anyway.
const LOAD_TIMEOUT: Duration = Duration::from_secs(5);

/// Read and parse one manifest on a worker thread.
pub fn load_manifest(path: &Path) -> Result<PluginManifest, String> {
    let path = path.to_path_buf();
    let (sender, receiver) = mpsc::channel();

    let worker = thread::Builder::new()
        .name("plugin-load".into())
        .spawn(move || {
            let result = panic::catch_unwind(move || read_and_parse(&path))
                .unwrap_or_else(|_| Err("manifest loader panicked".to_string()));
            let _ = sender.send(result);
        });
    if let Err(e) = worker {
        return Err(format!("could not spawn loader thread: {e}"));
    }

    match receiver.recv_timeout(LOAD_TIMEOUT) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(format!(
            "load timed out after {}s",
            LOAD_TIMEOUT.as_secs()
        )),
        Err(RecvTimeoutError::Disconnected) => Err("manifest loader died".to_string()),
    }
}

fn read_and_parse(path: &Path) -> Result<PluginManifest, String> {
    let meta = std::fs::metadata(path).map_err(|e| format!("cannot read manifest: {e}"))?;
    if meta.len() > MAX_MANIFEST_BYTES {
        return Err(format!(
            "manifest is {} bytes, limit is {}",
            meta.len(),
            MAX_MANIFEST_BYTES
        ));
    }
    let text = std::fs::read_to_string(path).map_err(|e| format!("cannot read manifest: {e}"))?;
    PluginManifest::parse(&text).map_err(|e| format!("invalid manifest: {e}"))
}

/// Schema checks beyond what deserialization enforces.
pub fn validate_manifest(manifest: &PluginManifest, plugin_dir: &Path) -> Result<(), String> {
    if manifest.commands.is_empty() {
        return Err("manifest declares no commands".to_string());
    }
    for (name, command) in &manifest.commands {
        if !is_valid_command_name(name) {
            return Err(format!(
                "invalid command name '{name}' (lowercase letters, digits, dashes)"
            ));
        }
        let exec = resolve_exec(plugin_dir, &command.exec);
        if !exec.is_file() {
            return Err(format!(
                "handler for '{name}' not found: {}",
                exec.display()
            ));
        }
    }
    Ok(())
}

/// Handler paths in a manifest are relative to the plugin directory.
pub fn resolve_exec(plugin_dir: &Path, exec: &Path) -> PathBuf {
    if exec.is_absolute() {
        exec.to_path_buf()
    } else {
        plugin_dir.join(exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(format!("{name}.toml"));
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn well_formed_manifest_loads() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("handler"), "").unwrap();
        let path = write_manifest(
            tmp.path(),
            "good",
            "[commands.greet]\nexec = \"handler\"\n",
        );

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.commands.len(), 1);
        validate_manifest(&manifest, tmp.path()).unwrap();
    }

    #[test]
    fn broken_toml_is_rejected_with_a_reason() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path(), "broken", "[commands.greet\nexec=");

        let reason = load_manifest(&path).unwrap_err();
        assert!(reason.contains("invalid manifest"));
    }

    #[test]
    fn oversized_manifest_is_rejected_without_parsing() {
        let tmp = TempDir::new().unwrap();
        let body = format!(
            "# {}\n[commands.greet]\nexec = \"handler\"\n",
            "x".repeat(MAX_MANIFEST_BYTES as usize)
        );
        let path = write_manifest(tmp.path(), "huge", &body);

        let reason = load_manifest(&path).unwrap_err();
        assert!(reason.contains("limit"));
    }

    #[test]
    fn missing_handler_is_a_schema_violation() {
        let tmp = TempDir::new().unwrap();
        let manifest =
            PluginManifest::parse("[commands.greet]\nexec = \"no/such/handler\"\n").unwrap();

        let reason = validate_manifest(&manifest, tmp.path()).unwrap_err();
        assert!(reason.contains("not found"));
    }

    #[test]
    fn bad_command_name_is_a_schema_violation() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("handler"), "").unwrap();
        let manifest =
            PluginManifest::parse("[commands.\"Not Valid\"]\nexec = \"handler\"\n").unwrap();

        let reason = validate_manifest(&manifest, tmp.path()).unwrap_err();
        assert!(reason.contains("invalid command name"));
    }

    #[test]
    fn absolute_exec_paths_are_left_alone() {
        let abs = if cfg!(windows) { "C:\\tools\\x" } else { "/usr/bin/x" };
        let resolved = resolve_exec(Path::new("/plugins"), Path::new(abs));
        assert_eq!(resolved, PathBuf::from(abs));
    }
}
