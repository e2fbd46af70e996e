// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use keystone_core::domain::StoreConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./keystone-config.yaml)
        #[arg(short, long, default_value = "./keystone-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = StoreConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. KEYSTONE_CONFIG_PATH: {}",
            std::env::var("KEYSTONE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./keystone-config.yaml");
        println!("  4. ~/.keystone/config.yaml");
        println!("  5. /etc/keystone/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Store:".bold());
    println!("  Name: {}", config.metadata.name);
    if let Some(version) = &config.metadata.version {
        println!("  Version: {}", version);
    }
    println!();

    let sync = &config.spec.sync;
    println!("{}", "Sync:".bold());
    println!("  Real-time updates: {}", on_off(sync.enable_real_time_updates));
    println!("  Consistency interval: {:?}", sync.consistency_check_interval);
    println!("  Recovery: {}", on_off(sync.recovery_enabled));
    println!("  Validation: {}", on_off(sync.validation_enabled));
    println!("  Optimization: {}", on_off(sync.optimization_enabled));
    println!("  Max state size: {} bytes", sync.max_state_size);
    println!("  Sync timeout: {:?}", sync.sync_timeout);
    println!();

    let maintenance = &config.spec.maintenance;
    println!("{}", "Maintenance:".bold());
    println!("  Backup interval: {:?}", maintenance.backup_interval);
    println!("  Optimization interval: {:?}", maintenance.optimization_interval);
    println!(
        "  Degraded after: {} failed audits",
        maintenance.degraded_after_failures
    );
    println!();

    println!("{}", "Components:".bold());
    if config.spec.components.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for name in &config.spec.components {
        println!("  - {}", name);
    }
    println!();

    Ok(())
}

fn on_off(flag: bool) -> colored::ColoredString {
    if flag {
        "enabled".green()
    } else {
        "disabled".yellow()
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = StoreConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
