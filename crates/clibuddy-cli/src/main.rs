//! CLI Buddy - a local command-line tool whose commands run only for an
//! authenticated, non-expired session.
//!
//! Startup builds the command table (built-ins plus whatever the plugin
//! registry accepted), then dispatches the requested command through the
//! authentication gate.

mod cli;
mod commands;
mod dispatch;

use std::io;
use std::process::ExitCode;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dispatch::exit;

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    match dispatch::run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit::FAILURE)
        }
    }
}
