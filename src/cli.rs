use clap::{Parser, Subcommand};
use std::path::PathBuf;
use anyhow::Result;

use crate::core::Engine;

#[derive(Parser)]
#[command(name = "codegraft")]
#[command(about = "Idempotent, declarative patching of C# source files")]
#[command(version)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default codegraft.toml
    Init {
        /// Target directory (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Apply a change-set to a project
    Apply {
        /// Change-set JSON file
        #[arg(long)]
        changes: PathBuf,

        /// Project root (defaults to the configured root)
        #[arg(short, long)]
        root: Option<PathBuf>,

        /// Enable a feature option; repeat for several
        #[arg(short = 'o', long = "option")]
        options: Vec<String>,

        /// Dry run - show what would be changed
        #[arg(long)]
        dry_run: bool,

        /// Fail if changes would be made (useful for CI)
        #[arg(long)]
        fail_on_changes: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check a change-set for structural errors
    Validate {
        /// Change-set JSON file
        #[arg(long)]
        changes: PathBuf,
    },

    /// Query the structure of a single C# file
    Probe {
        /// File to inspect
        #[arg(short, long)]
        file: PathBuf,

        /// Does a type with this name exist
        #[arg(long = "type")]
        type_name: Option<String>,

        /// Is Type.Method invoked anywhere
        #[arg(long)]
        invocation: Option<String>,

        /// Does the text contain this string
        #[arg(long)]
        contains: Option<String>,
    },
}

impl Cli {
    pub async fn execute(self, engine: Engine) -> Result<()> {
        match self.command {
            Commands::Init { path, force } => {
                engine.init(path, force).await
            }
            Commands::Apply { changes, root, options, dry_run, fail_on_changes, json } => {
                engine.apply(&changes, root, options, dry_run, fail_on_changes, json).await
            }
            Commands::Validate { changes } => {
                engine.validate(&changes).await
            }
            Commands::Probe { file, type_name, invocation, contains } => {
                engine.probe(&file, type_name, invocation, contains).await
            }
        }
    }
}
