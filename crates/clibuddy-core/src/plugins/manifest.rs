//! Plugin manifest schema.
//!
//! A plugin is a `<name>.toml` descriptor in the plugin directory declaring
//! one `[commands.<cmd>]` table per exposed command:
//!
//! ```toml
//! [plugin]
//! description = "Ping helpers"
//!
//! [commands.ping-host]
//! exec = "bin/ping-host"
//! args = ["--count", "3"]
//! description = "Ping a host a few times"
//! ```
//!
//! `exec` is resolved relative to the plugin directory. A command may set
//! `exempt = true` to request exemption from the authentication gate; the
//! request is honored only for command names on the host's allow-list.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;

/// Manifest files are `<plugin-name>.<EXT>` inside the plugin directory.
pub const MANIFEST_EXTENSION: &str = "toml";

/// Manifests larger than this are rejected without parsing.
pub const MAX_MANIFEST_BYTES: u64 = 64 * 1024;

const MAX_COMMAND_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugin: PluginMeta,
    pub commands: BTreeMap<String, CommandManifest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginMeta {
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandManifest {
    /// Handler program, resolved relative to the plugin directory.
    pub exec: PathBuf,

    /// Arguments prepended before the user's own.
    #[serde(default)]
    pub args: Vec<String>,

    pub description: Option<String>,

    /// Request exemption from the authentication gate.
    #[serde(default)]
    pub exempt: bool,
}

impl PluginManifest {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Command names are lowercase ASCII words: letters, digits, dashes.
pub fn is_valid_command_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_COMMAND_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_manifest() {
        let manifest = PluginManifest::parse(
            r#"
            [plugin]
            description = "Ping helpers"
            version = "1.2.0"

            [commands.ping-host]
            exec = "bin/ping-host"
            args = ["--count", "3"]
            description = "Ping a host a few times"

            [commands.traceroute]
            exec = "bin/traceroute"
            exempt = true
            "#,
        )
        .unwrap();

        assert_eq!(manifest.plugin.description.as_deref(), Some("Ping helpers"));
        assert_eq!(manifest.commands.len(), 2);
        let ping = &manifest.commands["ping-host"];
        assert_eq!(ping.args, vec!["--count", "3"]);
        assert!(!ping.exempt);
        assert!(manifest.commands["traceroute"].exempt);
    }

    #[test]
    fn unknown_fields_are_schema_violations() {
        let err = PluginManifest::parse(
            r#"
            [commands.ping]
            exec = "bin/ping"
            shell = true
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("shell"));
    }

    #[test]
    fn missing_commands_table_is_a_schema_violation() {
        assert!(PluginManifest::parse("[plugin]\nversion = \"1.0\"\n").is_err());
    }

    #[test]
    fn command_name_rules() {
        assert!(is_valid_command_name("ping"));
        assert!(is_valid_command_name("ping-host2"));
        assert!(!is_valid_command_name(""));
        assert!(!is_valid_command_name("Ping"));
        assert!(!is_valid_command_name("ping host"));
        assert!(!is_valid_command_name("ping_host"));
        assert!(!is_valid_command_name(&"x".repeat(65)));
    }
}
