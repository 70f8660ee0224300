//! CLI module for Switchyard
//!
//! Provides operator commands:
//! - `resolve`: Show the candidate chain for a task
//! - `call`: Route a single prompt
//! - `cache`: Inspect or purge the response cache
//! - `doctor`: Check documents, credentials and paths

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use switchyard_llm::RouterSettings;

pub mod cache;
pub mod call;
pub mod doctor;
pub mod resolve;

/// Switchyard LLM router CLI
#[derive(Parser, Debug)]
#[command(name = "switchyard")]
#[command(about = "Task-based LLM routing with failover and response caching")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to config/router.* when present)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Directory holding the routing documents
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the candidate chain a task resolves to
    Resolve {
        /// Task name
        task: String,
    },
    /// Route one prompt through a task
    Call(call::CallArgs),
    /// Inspect or purge the response cache
    Cache {
        #[command(subcommand)]
        action: cache::CacheAction,
    },
    /// Check documents, credentials and paths
    Doctor,
}

impl Cli {
    /// Settings from file and environment, with command-line overrides applied
    pub fn load_settings(&self) -> anyhow::Result<RouterSettings> {
        let mut settings =
            RouterSettings::load(self.settings.as_deref()).context("Failed to load settings")?;
        if let Some(dir) = &self.config_dir {
            settings.config_dir = dir.clone();
        }
        Ok(settings)
    }
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let Some(command) = &cli.command else {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        cmd.print_help()?;
        println!();
        return Ok(());
    };

    let settings = cli.load_settings()?;
    match command {
        Commands::Resolve { task } => resolve::run(settings, task),
        Commands::Call(args) => call::run(settings, args).await,
        Commands::Cache { action } => cache::run(settings, action),
        Commands::Doctor => doctor::run(settings),
    }
}
