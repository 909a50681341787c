//! `login`, `logout`, and `whoami`.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::warn;

use clibuddy_core::util::format_remaining;
use clibuddy_core::SessionHandle;

use crate::dispatch::{check_gate, exit, App, Gate};

pub fn login(app: &mut App, username: Option<String>) -> Result<ExitCode> {
    let username = match username {
        Some(username) => username,
        None => prompt_username(app.config.last_username.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("failed to read password")?;

    match app.gatekeeper.login(&username, &password) {
        Ok(session) => {
            app.handles.save(&SessionHandle {
                session_id: session.id,
                username: username.clone(),
                saved_at: Utc::now(),
            })?;

            // Remember the username for the next prompt; purely convenience.
            app.config.last_username = Some(username.clone());
            if let Err(e) = app.config.save() {
                warn!(error = %e, "could not persist configuration");
            }

            println!(
                "Logged in as {} (session expires in {})",
                username,
                format_remaining(session.expires_at, Utc::now())
            );
            Ok(ExitCode::from(exit::OK))
        }
        Err(e) if e.is_auth_failure() => {
            eprintln!("{e}");
            Ok(ExitCode::from(exit::AUTH))
        }
        Err(e) => Err(e).context("login failed"),
    }
}

fn prompt_username(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Username [{last}]: "),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read username")?;
    let line = line.trim();

    if !line.is_empty() {
        Ok(line.to_string())
    } else if let Some(last) = last {
        Ok(last.to_string())
    } else {
        anyhow::bail!("a username is required")
    }
}

pub fn logout(app: &mut App) -> Result<ExitCode> {
    match app.handles.load()? {
        Some(handle) => {
            app.gatekeeper
                .logout(handle.session_id)
                .context("logout failed")?;
            app.handles.clear()?;
            println!("Logged out");
        }
        None => println!("Not logged in"),
    }
    Ok(ExitCode::from(exit::OK))
}

pub fn whoami(app: &mut App) -> Result<ExitCode> {
    match check_gate(app)? {
        Gate::Allowed(identity) => {
            println!("{}", identity.username);
            Ok(ExitCode::from(exit::OK))
        }
        Gate::Denied { message } => {
            println!("not authenticated");
            if message != "not authenticated" {
                eprintln!("{message}");
            }
            Ok(ExitCode::from(exit::AUTH))
        }
    }
}
