//! `plugins`: the diagnostic listing of the startup scan.

use std::process::ExitCode;

use anyhow::Result;

use clibuddy_core::plugins::LoadStatus;

use crate::dispatch::{exit, App};

pub fn run(app: &App) -> Result<ExitCode> {
    if app.descriptors.is_empty() {
        println!(
            "No plugins found in {}",
            app.config.plugin_dir()?.display()
        );
        return Ok(ExitCode::from(exit::OK));
    }

    for descriptor in &app.descriptors {
        let status = match descriptor.status {
            LoadStatus::Registered => "registered",
            LoadStatus::Rejected => "rejected",
            LoadStatus::Validated => "validated",
            LoadStatus::Discovered => "discovered",
        };
        println!(
            "{:<20} {:<10} {}",
            descriptor.name,
            status,
            descriptor.commands.join(", ")
        );
        if let Some(reason) = &descriptor.reason {
            println!("{:<20} {:<10} reason: {reason}", "", "");
        }
        for note in &descriptor.diagnostics {
            println!("{:<20} {:<10} note: {note}", "", "");
        }
    }

    Ok(ExitCode::from(exit::OK))
}
