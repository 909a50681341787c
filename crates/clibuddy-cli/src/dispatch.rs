//! Command table assembly, the authentication gate, and plugin execution.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use clibuddy_core::plugins::{CommandEntry, CommandKind, CommandTable, LoadStatus, PluginDescriptor};
use clibuddy_core::{
    AuthError, AuthGatekeeper, Config, HandleStore, KeyringVault, PluginRegistry, SessionStore,
    ValidatedIdentity,
};

use crate::cli::{Cli, Command};
use crate::commands;

/// Process exit codes. Clap owns 2 for usage errors.
pub mod exit {
    pub const OK: u8 = 0;
    /// Command-specific failure.
    pub const FAILURE: u8 = 1;
    /// Authentication required or failed.
    pub const AUTH: u8 = 3;
    /// The named command belongs to a plugin that failed to load.
    pub const PLUGIN: u8 = 4;
}

pub struct App {
    pub config: Config,
    pub gatekeeper: AuthGatekeeper<KeyringVault>,
    pub handles: HandleStore,
    pub table: CommandTable,
    pub descriptors: Vec<PluginDescriptor>,
}

/// The built-in command surface. `login`, `logout`, and `plugins` run
/// without a session: `login` is how you get one, `logout` must work for a
/// session that can no longer validate, and `plugins` is the diagnostic
/// listing for startup problems.
fn builtin_entries() -> Vec<CommandEntry> {
    vec![
        CommandEntry::builtin("login", true, "Login and start a session"),
        CommandEntry::builtin("logout", true, "End the current session"),
        CommandEntry::builtin("whoami", false, "Print the authenticated username"),
        CommandEntry::builtin("info", false, "Show tool and environment information"),
        CommandEntry::builtin("plugins", true, "List discovered plugins and their load status"),
        CommandEntry::builtin("user", false, "Manage user accounts"),
    ]
}

pub fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load().context("failed to load configuration")?;

    // Plugin failures were already reported by the registry as warnings;
    // they never decide the exit code.
    let registry = PluginRegistry::new(config.plugin_dir()?, config.exempt_allowlist.clone());
    let (table, descriptors) = registry.build(builtin_entries());

    let store = SessionStore::open(&config.store_path()?)?;
    let handles = HandleStore::new(config.data_dir()?);
    let gatekeeper = AuthGatekeeper::new(store, KeyringVault::new(), config.session_ttl())
        .with_auto_register(config.auto_register);

    let mut app = App {
        config,
        gatekeeper,
        handles,
        table,
        descriptors,
    };

    match cli.command {
        Command::Login { username } => commands::auth::login(&mut app, username),
        Command::Logout => commands::auth::logout(&mut app),
        Command::Whoami => commands::auth::whoami(&mut app),
        Command::Info => commands::info::run(&mut app),
        Command::Plugins => commands::plugins::run(&app),
        Command::User(cmd) => commands::user::run(&mut app, cmd),
        Command::External(argv) => run_external(&mut app, argv),
    }
}

pub enum Gate {
    Allowed(ValidatedIdentity),
    Denied { message: String },
}

/// Resolve the session handle and validate it. A handle that can no longer
/// validate is cleared so the next invocation starts clean. Infrastructure
/// failures propagate; they are not authentication denials.
pub fn check_gate(app: &mut App) -> Result<Gate> {
    let Some(handle) = app.handles.load()? else {
        return Ok(Gate::Denied {
            message: "not authenticated".to_string(),
        });
    };

    match app.gatekeeper.validate(handle.session_id) {
        Ok(identity) => Ok(Gate::Allowed(identity)),
        Err(e) if e.is_auth_failure() => {
            if matches!(
                e,
                AuthError::SessionExpired | AuthError::SessionRevoked | AuthError::SecretMissing
            ) {
                if let Err(clear_err) = app.handles.clear() {
                    warn!(error = %clear_err, "could not clear stale session handle");
                }
            }
            Ok(Gate::Denied {
                message: e.to_string(),
            })
        }
        Err(e) => Err(e).context("could not validate session"),
    }
}

/// Dispatch a name clap did not recognize: a plugin command, or a typo.
fn run_external(app: &mut App, argv: Vec<String>) -> Result<ExitCode> {
    let Some((name, rest)) = argv.split_first() else {
        eprintln!("no command given");
        return Ok(ExitCode::from(exit::FAILURE));
    };

    let Some(entry) = app.table.get(name) else {
        // A rejected plugin may have declared it; say so instead of "unknown".
        if let Some(descriptor) = app.descriptors.iter().find(|d| {
            d.status == LoadStatus::Rejected && d.commands.iter().any(|c| c == name)
        }) {
            eprintln!(
                "command '{name}' comes from plugin '{}', which failed to load: {}",
                descriptor.name,
                descriptor.reason.as_deref().unwrap_or("unknown reason")
            );
            return Ok(ExitCode::from(exit::PLUGIN));
        }
        eprintln!("unknown command '{name}'; see 'clibuddy --help' or 'clibuddy plugins'");
        return Ok(ExitCode::from(exit::FAILURE));
    };

    let (exempt, kind) = (entry.exempt, entry.kind.clone());

    let identity = if exempt {
        None
    } else {
        match check_gate(app)? {
            Gate::Allowed(identity) => Some(identity),
            Gate::Denied { message } => {
                eprintln!("{message}");
                return Ok(ExitCode::from(exit::AUTH));
            }
        }
    };

    match kind {
        CommandKind::Plugin { plugin, exec, args } => {
            let mut command = std::process::Command::new(&exec);
            command.args(&args).args(rest);
            if let Some(identity) = &identity {
                command
                    .env("CLIBUDDY_USERNAME", &identity.username)
                    .env("CLIBUDDY_USER_ID", identity.user_id.to_string())
                    .env("CLIBUDDY_SESSION_ID", identity.session_id.to_string());
            }
            let status = command.status().with_context(|| {
                format!("failed to run handler for '{name}' from plugin '{plugin}'")
            })?;
            let code = status
                .code()
                .and_then(|c| u8::try_from(c).ok())
                .unwrap_or(exit::FAILURE);
            Ok(ExitCode::from(code))
        }
        // Built-in names are parsed by clap and never reach the external path.
        CommandKind::Builtin => {
            eprintln!("unknown command '{name}'");
            Ok(ExitCode::from(exit::FAILURE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn builtin_names_are_unique() {
        let entries = builtin_entries();
        let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names.len(), entries.len());
    }

    #[test]
    fn only_the_allow_list_is_exempt() {
        let exempt: HashSet<String> = builtin_entries()
            .into_iter()
            .filter(|e| e.exempt)
            .map(|e| e.name)
            .collect();
        let expected: HashSet<String> = ["login", "logout", "plugins"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(exempt, expected);
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [exit::OK, exit::FAILURE, exit::AUTH, exit::PLUGIN];
        let unique: HashSet<u8> = codes.into_iter().collect();
        assert_eq!(unique.len(), codes.len());
        // 2 is reserved for clap usage errors.
        assert!(!codes.contains(&2));
    }
}
