//! `user add|disable|enable`: account management.

use std::process::ExitCode;

use anyhow::{Context, Result};

use clibuddy_core::{AuthError, StoreError};

use crate::cli::UserCommand;
use crate::dispatch::{check_gate, exit, App, Gate};

pub fn run(app: &mut App, cmd: UserCommand) -> Result<ExitCode> {
    // First-run bootstrap: the very first account can be created without a
    // session, since nobody exists yet who could authenticate.
    let bootstrap =
        matches!(cmd, UserCommand::Add { .. }) && app.gatekeeper.user_count()? == 0;
    if !bootstrap {
        match check_gate(app)? {
            Gate::Allowed(_) => {}
            Gate::Denied { message } => {
                eprintln!("{message}");
                return Ok(ExitCode::from(exit::AUTH));
            }
        }
    }

    match cmd {
        UserCommand::Add { username, email } => add(app, &username, email.as_deref()),
        UserCommand::Disable { username } => set_active(app, &username, false),
        UserCommand::Enable { username } => set_active(app, &username, true),
    }
}

fn add(app: &mut App, username: &str, email: Option<&str>) -> Result<ExitCode> {
    let username = username.trim();
    if username.is_empty() {
        eprintln!("username cannot be empty");
        return Ok(ExitCode::from(exit::FAILURE));
    }
    if username.len() > 64 {
        eprintln!("username too long (max 64 characters)");
        return Ok(ExitCode::from(exit::FAILURE));
    }

    let password = rpassword::prompt_password("Password: ").context("failed to read password")?;
    if password.len() < 8 {
        eprintln!("password must be at least 8 characters");
        return Ok(ExitCode::from(exit::FAILURE));
    }
    let confirm =
        rpassword::prompt_password("Confirm password: ").context("failed to read password")?;
    if password != confirm {
        eprintln!("passwords do not match");
        return Ok(ExitCode::from(exit::FAILURE));
    }

    match app.gatekeeper.register(username, email, &password) {
        Ok(_) => {
            println!("User '{username}' created");
            Ok(ExitCode::from(exit::OK))
        }
        Err(AuthError::Store(StoreError::Conflict)) => {
            eprintln!("username '{username}' is already taken");
            Ok(ExitCode::from(exit::FAILURE))
        }
        Err(e) => Err(e).context("could not create user"),
    }
}

fn set_active(app: &mut App, username: &str, active: bool) -> Result<ExitCode> {
    if app.gatekeeper.set_user_active(username, active)? {
        println!(
            "User '{username}' {}",
            if active { "enabled" } else { "disabled" }
        );
        Ok(ExitCode::from(exit::OK))
    } else {
        eprintln!("no such user '{username}'");
        Ok(ExitCode::from(exit::FAILURE))
    }
}
