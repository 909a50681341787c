//! Descriptor tracking and the merge into the process-wide command table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use super::discovery;
use super::loader;

/// Where a candidate ended up during the startup scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Discovered,
    Validated,
    Rejected,
    Registered,
}

/// One plugin candidate's fate, kept for the diagnostic listing. Created at
/// every startup scan, never persisted.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub path: PathBuf,
    /// Command names the manifest exposes, in registration order.
    pub commands: Vec<String>,
    pub status: LoadStatus,
    /// Why the plugin was rejected, when it was.
    pub reason: Option<String>,
    /// Per-command notes: collisions, denied exemptions.
    pub diagnostics: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum CommandKind {
    Builtin,
    Plugin {
        plugin: String,
        exec: PathBuf,
        args: Vec<String>,
    },
}

#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub name: String,
    pub kind: CommandKind,
    /// Exempt commands skip the authentication gate.
    pub exempt: bool,
    pub description: Option<String>,
}

impl CommandEntry {
    pub fn builtin(name: &str, exempt: bool, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: CommandKind::Builtin,
            exempt,
            description: Some(description.to_string()),
        }
    }

    fn source_label(&self) -> String {
        match &self.kind {
            CommandKind::Builtin => "a built-in".to_string(),
            CommandKind::Plugin { plugin, .. } => format!("plugin '{plugin}'"),
        }
    }
}

/// The dispatch table the gatekeeper guards: built-ins plus every registered
/// plugin command.
#[derive(Debug, Default)]
pub struct CommandTable {
    entries: BTreeMap<String, CommandEntry>,
}

impl CommandTable {
    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn insert(&mut self, entry: CommandEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }
}

pub struct PluginRegistry {
    plugin_dir: PathBuf,
    /// Command names the host permits to skip the authentication gate.
    exempt_allowlist: Vec<String>,
}

impl PluginRegistry {
    pub fn new(plugin_dir: PathBuf, exempt_allowlist: Vec<String>) -> Self {
        Self {
            plugin_dir,
            exempt_allowlist,
        }
    }

    /// Build the process command table: built-ins first, then every
    /// discovered candidate in scan order. Candidate failures are recorded,
    /// never propagated — one hostile manifest cannot take the others or the
    /// host down.
    pub fn build(&self, builtins: Vec<CommandEntry>) -> (CommandTable, Vec<PluginDescriptor>) {
        let mut table = CommandTable::default();
        for entry in builtins {
            table.insert(entry);
        }

        let mut descriptors = Vec::new();
        for candidate in discovery::discover(&self.plugin_dir) {
            let mut descriptor = PluginDescriptor {
                name: candidate.name.clone(),
                path: candidate.path.clone(),
                commands: Vec::new(),
                status: LoadStatus::Discovered,
                reason: None,
                diagnostics: Vec::new(),
            };

            let manifest = match loader::load_manifest(&candidate.path) {
                Ok(manifest) => manifest,
                Err(reason) => {
                    warn!(plugin = %descriptor.name, %reason, "plugin rejected");
                    descriptor.status = LoadStatus::Rejected;
                    descriptor.reason = Some(reason);
                    descriptors.push(descriptor);
                    continue;
                }
            };

            if let Err(reason) = loader::validate_manifest(&manifest, &self.plugin_dir) {
                warn!(plugin = %descriptor.name, %reason, "plugin rejected");
                descriptor.status = LoadStatus::Rejected;
                descriptor.reason = Some(reason);
                descriptors.push(descriptor);
                continue;
            }

            descriptor.status = LoadStatus::Validated;
            descriptor.commands = manifest.commands.keys().cloned().collect();

            let mut registered = 0usize;
            for (name, command) in &manifest.commands {
                if let Some(existing) = table.get(name) {
                    // Built-ins always win; between plugins, scan order wins.
                    let note = format!(
                        "command '{name}' collides with {}, skipped",
                        existing.source_label()
                    );
                    warn!(plugin = %descriptor.name, %note);
                    descriptor.diagnostics.push(note);
                    continue;
                }

                let exempt = command.exempt
                    && if self.exempt_allowlist.iter().any(|n| n == name) {
                        true
                    } else {
                        let note = format!(
                            "command '{name}' requested gate exemption but is not allow-listed; \
                             registered as authenticated"
                        );
                        warn!(plugin = %descriptor.name, %note);
                        descriptor.diagnostics.push(note);
                        false
                    };

                table.insert(CommandEntry {
                    name: name.clone(),
                    kind: CommandKind::Plugin {
                        plugin: descriptor.name.clone(),
                        exec: loader::resolve_exec(&self.plugin_dir, &command.exec),
                        args: command.args.clone(),
                    },
                    exempt,
                    description: command.description.clone(),
                });
                registered += 1;
            }

            if registered > 0 {
                descriptor.status = LoadStatus::Registered;
                debug!(plugin = %descriptor.name, commands = registered, "plugin registered");
            } else {
                descriptor.status = LoadStatus::Rejected;
                descriptor.reason = Some("no commands registered (all names collided)".to_string());
            }
            descriptors.push(descriptor);
        }

        (table, descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn builtins() -> Vec<CommandEntry> {
        vec![
            CommandEntry::builtin("login", true, "Login and start a session"),
            CommandEntry::builtin("whoami", false, "Print the authenticated username"),
        ]
    }

    fn write_plugin(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(format!("{name}.toml")), body).unwrap();
    }

    fn touch_handler(dir: &Path) {
        std::fs::write(dir.join("handler"), "").unwrap();
    }

    #[test]
    fn good_plugin_survives_a_broken_neighbor() {
        let tmp = TempDir::new().unwrap();
        touch_handler(tmp.path());
        write_plugin(tmp.path(), "good", "[commands.greet]\nexec = \"handler\"\n");
        write_plugin(tmp.path(), "broken", "[commands.greet\nexec=");

        let registry = PluginRegistry::new(tmp.path().to_path_buf(), Vec::new());
        let (table, descriptors) = registry.build(builtins());

        assert!(table.contains("greet"));
        assert_eq!(descriptors.len(), 2);

        let broken = descriptors.iter().find(|d| d.name == "broken").unwrap();
        assert_eq!(broken.status, LoadStatus::Rejected);
        assert!(broken.reason.as_deref().unwrap().contains("invalid manifest"));

        let good = descriptors.iter().find(|d| d.name == "good").unwrap();
        assert_eq!(good.status, LoadStatus::Registered);
        assert_eq!(good.commands, vec!["greet"]);
    }

    #[test]
    fn builtin_names_always_win() {
        let tmp = TempDir::new().unwrap();
        touch_handler(tmp.path());
        write_plugin(
            tmp.path(),
            "shadow",
            "[commands.whoami]\nexec = \"handler\"\n",
        );

        let registry = PluginRegistry::new(tmp.path().to_path_buf(), Vec::new());
        let (table, descriptors) = registry.build(builtins());

        let entry = table.get("whoami").unwrap();
        assert!(matches!(entry.kind, CommandKind::Builtin));

        let shadow = &descriptors[0];
        assert_eq!(shadow.status, LoadStatus::Rejected);
        assert!(shadow.diagnostics[0].contains("collides with a built-in"));
    }

    #[test]
    fn earlier_plugin_wins_between_plugins() {
        let tmp = TempDir::new().unwrap();
        touch_handler(tmp.path());
        write_plugin(tmp.path(), "alpha", "[commands.greet]\nexec = \"handler\"\n");
        write_plugin(tmp.path(), "beta", "[commands.greet]\nexec = \"handler\"\n");

        let registry = PluginRegistry::new(tmp.path().to_path_buf(), Vec::new());
        let (table, descriptors) = registry.build(builtins());

        match &table.get("greet").unwrap().kind {
            CommandKind::Plugin { plugin, .. } => assert_eq!(plugin, "alpha"),
            other => panic!("expected plugin entry, got {other:?}"),
        }
        let beta = descriptors.iter().find(|d| d.name == "beta").unwrap();
        assert_eq!(beta.status, LoadStatus::Rejected);
        assert!(beta.diagnostics[0].contains("plugin 'alpha'"));
    }

    #[test]
    fn exemption_is_validated_against_the_host_allowlist() {
        let tmp = TempDir::new().unwrap();
        touch_handler(tmp.path());
        write_plugin(
            tmp.path(),
            "tools",
            "[commands.status]\nexec = \"handler\"\nexempt = true\n\n\
             [commands.wipe]\nexec = \"handler\"\nexempt = true\n",
        );

        let registry =
            PluginRegistry::new(tmp.path().to_path_buf(), vec!["status".to_string()]);
        let (table, descriptors) = registry.build(builtins());

        assert!(table.get("status").unwrap().exempt);
        assert!(!table.get("wipe").unwrap().exempt);

        let tools = &descriptors[0];
        assert_eq!(tools.status, LoadStatus::Registered);
        assert!(tools.diagnostics[0].contains("wipe"));
    }

    #[test]
    fn partially_colliding_plugin_still_registers_the_rest() {
        let tmp = TempDir::new().unwrap();
        touch_handler(tmp.path());
        write_plugin(
            tmp.path(),
            "mixed",
            "[commands.whoami]\nexec = \"handler\"\n\n[commands.extra]\nexec = \"handler\"\n",
        );

        let registry = PluginRegistry::new(tmp.path().to_path_buf(), Vec::new());
        let (table, descriptors) = registry.build(builtins());

        assert!(table.contains("extra"));
        assert_eq!(descriptors[0].status, LoadStatus::Registered);
        assert_eq!(descriptors[0].diagnostics.len(), 1);
    }

    #[test]
    fn missing_plugin_directory_is_not_an_error() {
        let registry = PluginRegistry::new(PathBuf::from("/no/such/dir"), Vec::new());
        let (table, descriptors) = registry.build(builtins());

        assert_eq!(table.len(), 2);
        assert!(descriptors.is_empty());
    }
}
