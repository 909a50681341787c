//! Argument parsing. Plugin-registered commands arrive as external
//! subcommands and are resolved against the command table at dispatch time.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "clibuddy",
    version,
    about = "A buddy for your terminal - authenticated commands with plugins"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Login and start a session
    Login {
        /// Username to login as (prompted if omitted)
        username: Option<String>,
    },

    /// End the current session
    Logout,

    /// Print the authenticated username
    Whoami,

    /// Show tool and environment information
    Info,

    /// List discovered plugins and their load status
    Plugins,

    /// Manage user accounts
    #[command(subcommand)]
    User(UserCommand),

    /// A plugin-registered command
    #[command(external_subcommand)]
    External(Vec<String>),
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Create a user account (password is prompted)
    Add {
        username: String,
        #[arg(long)]
        email: Option<String>,
    },

    /// Disable an account without deleting it
    Disable { username: String },

    /// Re-enable a disabled account
    Enable { username: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn unknown_names_parse_as_external_subcommands() {
        let cli = Cli::parse_from(["clibuddy", "ping-host", "example.org"]);
        match cli.command {
            Command::External(argv) => assert_eq!(argv, vec!["ping-host", "example.org"]),
            other => panic!("expected external subcommand, got {other:?}"),
        }
    }
}
