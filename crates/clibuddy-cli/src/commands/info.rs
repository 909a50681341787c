//! `info`: tool and environment overview for the authenticated user.

use std::process::ExitCode;

use anyhow::Result;

use crate::dispatch::{check_gate, exit, App, Gate};

pub fn run(app: &mut App) -> Result<ExitCode> {
    let identity = match check_gate(app)? {
        Gate::Allowed(identity) => identity,
        Gate::Denied { message } => {
            eprintln!("{message}");
            return Ok(ExitCode::from(exit::AUTH));
        }
    };

    println!("clibuddy {}", env!("CARGO_PKG_VERSION"));
    println!("user:       {} (id {})", identity.username, identity.user_id);
    println!("data dir:   {}", app.config.data_dir()?.display());
    println!("store:      {}", app.config.store_path()?.display());
    println!("plugin dir: {}", app.config.plugin_dir()?.display());
    println!("commands:   {}", app.table.len());

    Ok(ExitCode::from(exit::OK))
}
