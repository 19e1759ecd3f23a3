//! Command-line interface for edgestudy.
//!
//! This module provides the CLI structure for the `edgestudy` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

pub use commands::{
    AnalysisCommand, AnalyzeCommand, CatalogCommand, ConfigCommand, DatasetCommand, MineCommand,
    ScaleArg, TreatCommand,
};

/// edgestudy - Mine, screen and analyze Edge AI repositories
///
/// Collects GitHub repositories matching Edge AI search terms, screens them
/// through a series of treatment steps, checks the coded study dataset and
/// computes the descriptive analyses of the study.
#[derive(Debug, Parser)]
#[command(name = "edgestudy")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search GitHub and write raw repository tables
    Mine(MineCommand),

    /// Screen raw repository tables
    #[command(subcommand)]
    Treat(TreatCommand),

    /// Compute study analyses
    Analyze(AnalyzeCommand),

    /// Check and fingerprint the coded study dataset
    #[command(subcommand)]
    Dataset(DatasetCommand),

    /// Inspect the local repository catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Log level requested by `-q` / `-v`, if any.
    #[must_use]
    pub fn log_level(&self) -> Option<LevelFilter> {
        crate::logging::level_from_flags(self.quiet, self.verbose)
    }
}
