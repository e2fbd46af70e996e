// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Offline aggregate snapshot tools
//!
//! Commands: init, validate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use keystone_core::application::{ConsistencyChecker, StateValidator};
use keystone_core::domain::{AppState, StateValidationResult, StoreConfigManifest};

#[derive(Subcommand)]
pub enum StateCommand {
    /// Write a fresh aggregate snapshot
    Init {
        /// Output path (default: ./keystone-state.json)
        #[arg(short, long, default_value = "./keystone-state.json")]
        output: PathBuf,
    },

    /// Run structural validation and the consistency audit on a snapshot
    Validate {
        /// Snapshot file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: StateCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        StateCommand::Init { output } => init(&output),
        StateCommand::Validate { file, json } => {
            let manifest = StoreConfigManifest::load_or_default(config_path)
                .context("Failed to load configuration")?;
            let validator = StateValidator::new(manifest.spec.sync.max_state_size);
            let report = audit_snapshot(&validator, &file)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&file, &report);
            }

            if !report.is_valid {
                anyhow::bail!("Snapshot {:?} failed validation", file);
            }
            Ok(())
        }
    }
}

fn init(output: &Path) -> Result<()> {
    let state = AppState::new();
    let json = serde_json::to_string_pretty(&state)?;
    std::fs::write(output, json).with_context(|| format!("Failed to write {:?}", output))?;

    println!(
        "{}",
        format!("✓ Snapshot written: {}", output.display()).green()
    );
    Ok(())
}

/// Structural validation, then the consistency audit if the document parses.
///
/// No component manager exists offline, so the audit's health view is taken
/// from the snapshot's own mirror; only internal disagreements are reported.
fn audit_snapshot(validator: &StateValidator, file: &Path) -> Result<StateValidationResult> {
    let content =
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {:?}", file))?;
    let document: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", file))?;

    let mut report = validator.validate_document(&document);
    if !report.is_valid {
        return Ok(report);
    }

    let state: AppState = serde_json::from_value(document)?;
    let health: BTreeMap<String, bool> = state
        .system
        .components
        .iter()
        .map(|(name, component)| (name.clone(), component.status.is_live()))
        .collect();
    report.merge(ConsistencyChecker::check(&state, &health));

    Ok(report)
}

fn print_report(file: &Path, report: &StateValidationResult) {
    println!("{} {}", "Snapshot:".bold(), file.display());

    for error in &report.errors {
        println!("  {} {}", "error:".red().bold(), error);
    }
    for inconsistency in &report.inconsistencies {
        println!("  {} {}", "inconsistent:".red(), inconsistency);
    }
    for warning in &report.warnings {
        println!("  {} {}", "warning:".yellow(), warning);
    }
    for recommendation in &report.recommendations {
        println!("  {} {}", "hint:".cyan(), recommendation);
    }

    if report.is_valid {
        println!("{}", "✓ Snapshot is valid".green());
    } else {
        println!("{}", "✗ Snapshot is invalid".red());
    }
}
