//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::analysis::Scale;

/// Mining command arguments.
#[derive(Debug, Args)]
pub struct MineCommand {
    /// Search term; repeat for several terms (defaults to the configured terms)
    #[arg(short, long = "term", value_name = "TERM")]
    pub terms: Vec<String>,

    /// Maximum unique repositories per term
    #[arg(long)]
    pub max_results: Option<usize>,

    /// Search only; do not count activity or write tables
    #[arg(long)]
    pub dry_run: bool,

    /// Do not record results in the local catalog
    #[arg(long)]
    pub no_catalog: bool,
}

/// Treatment steps over raw tables.
#[derive(Debug, Subcommand)]
pub enum TreatCommand {
    /// Concatenate every CSV file of a directory
    Concat {
        /// Directory holding raw tables
        dir: PathBuf,
    },

    /// Remove repositories listed more than once
    Dedup {
        /// Input CSV file
        file: PathBuf,
    },

    /// Keep repositories with an English description
    English {
        /// Input CSV file
        file: PathBuf,
    },

    /// Drop repositories whose name or description mentions an exclusion term
    Exclude {
        /// Input CSV file
        file: PathBuf,

        /// Search term recorded in the output name (defaults to the file name)
        #[arg(short, long)]
        term: Option<String>,
    },

    /// Keep repositories with enough stars and commits
    Activity {
        /// Input CSV file
        file: PathBuf,
    },
}

/// Analysis command arguments.
#[derive(Debug, Args)]
pub struct AnalyzeCommand {
    /// Directory receiving result tables (defaults to the configured one)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// The analysis to run
    #[command(subcommand)]
    pub analysis: AnalysisCommand,
}

/// Available analyses.
#[derive(Debug, Subcommand)]
pub enum AnalysisCommand {
    /// Cohen's kappa between raters of the capability mappings
    Kappa {
        /// Input CSV file
        input: PathBuf,

        /// Rater name; repeat for each rater (defaults to the configured raters)
        #[arg(short, long = "rater", value_name = "NAME")]
        raters: Vec<String>,

        /// Number of capability slots
        #[arg(long)]
        slots: Option<u32>,

        /// Rater column template with {slot} and {rater} placeholders
        #[arg(long)]
        template: Option<String>,
    },

    /// Multi-label kappa over ISO/IEC 25010 quality characteristics
    Multilabel {
        /// Input CSV file
        input: PathBuf,

        /// Column of the first rater
        #[arg(long, default_value = "QR_R1")]
        col1: String,

        /// Column of the second rater
        #[arg(long, default_value = "QR_R2")]
        col2: String,

        /// Also write the input with normalized label columns here
        #[arg(long, value_name = "FILE")]
        cleaned: Option<PathBuf>,
    },

    /// Share of repositories documenting each architecture artifact
    Coverage {
        /// Input CSV file
        input: PathBuf,

        /// Column to count; repeat for several (defaults to the configured columns)
        #[arg(long = "column", value_name = "NAME")]
        columns: Vec<String>,

        /// Count only affirmative values instead of any value
        #[arg(long)]
        true_like: bool,
    },

    /// Normalized application domains
    Domains {
        /// Input CSV file
        input: PathBuf,

        /// Column holding the domains
        #[arg(long, default_value = "domain")]
        col: String,

        /// Column identifying repositories (rows are numbered otherwise)
        #[arg(long)]
        idcol: Option<String>,
    },

    /// Capabilities by ISO/IEC/IEEE 30141 class and layer
    Capabilities {
        /// Input CSV file
        input: PathBuf,

        /// Number of capability slots
        #[arg(long)]
        slots: Option<u32>,
    },

    /// Architectural layers derived from application types
    ArchLayers {
        /// Input CSV file
        input: PathBuf,
    },

    /// Likert answer distributions of a survey export
    Likert {
        /// Input CSV file
        input: PathBuf,

        /// Base name of the output files
        #[arg(long, default_value = "likert_overview")]
        basename: String,

        /// Scales to detect
        #[arg(long, value_enum, num_args = 1.., default_values_t = [ScaleArg::Useful, ScaleArg::Agree])]
        scale: Vec<ScaleArg>,

        /// Write a map from questions to their guideline ids
        #[arg(long)]
        shorten_labels: bool,

        /// Keep only questions carrying a guideline id
        #[arg(long)]
        only_guidelines: bool,
    },
}

/// Study dataset commands.
#[derive(Debug, Subcommand)]
pub enum DatasetCommand {
    /// Check referential integrity of the study tables
    Check {
        /// Dataset directory (defaults to the configured one)
        dir: Option<PathBuf>,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Write a checksum manifest of the dataset files
    Manifest {
        /// Dataset directory (defaults to the configured one)
        dir: Option<PathBuf>,
    },

    /// Compare the dataset files against their manifest
    Verify {
        /// Dataset directory (defaults to the configured one)
        dir: Option<PathBuf>,
    },
}

/// Local catalog commands.
#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Show catalog statistics
    Stats {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// List repositories, most starred first
    List {
        /// Maximum number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Export the catalog as a raw table
    Export {
        /// Output CSV file
        file: PathBuf,

        /// Year of the windowed commit column (defaults to the configured year)
        #[arg(long)]
        year: Option<i32>,
    },
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Likert scale argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScaleArg {
    /// Very not useful .. Very useful
    Useful,
    /// Strongly disagree .. Strongly agree, and numeric scores
    Agree,
}

impl From<ScaleArg> for Scale {
    fn from(arg: ScaleArg) -> Self {
        match arg {
            ScaleArg::Useful => Self::Useful,
            ScaleArg::Agree => Self::Agree,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_arg_conversion() {
        assert_eq!(Scale::from(ScaleArg::Useful), Scale::Useful);
        assert_eq!(Scale::from(ScaleArg::Agree), Scale::Agree);
    }

    #[test]
    fn test_treat_command_debug() {
        let cmd = TreatCommand::Exclude {
            file: PathBuf::from("raw.csv"),
            term: Some("edge ai".to_string()),
        };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Exclude"));
        assert!(debug_str.contains("edge ai"));
    }

    #[test]
    fn test_config_command_debug() {
        let cmd = ConfigCommand::Show { json: false };
        let debug_str = format!("{cmd:?}");
        assert!(debug_str.contains("Show"));
    }
}
