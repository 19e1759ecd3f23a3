//! Descriptive analyses over the study tables.
//!
//! Each analysis takes a [`Table`] and returns one or more result tables.
//! Writing them is left to [`write_outputs`] so the computations stay pure.

pub mod arch_layers;
pub mod capabilities;
pub mod coverage;
pub mod domains;
pub mod kappa;
pub mod likert;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::table::{ensure_dir, Table};

pub use arch_layers::{arch_layer_distribution, classify_layer, ArchLayer};
pub use capabilities::{capability_distribution, normalize_iso, split_layers, CapabilityTables};
pub use coverage::{column_coverage, Criterion};
pub use domains::{domain_distribution, normalize_domain_token, DomainTables};
pub use kappa::{capability_agreement, cohen_kappa, multilabel_agreement, MultilabelAgreement};
pub use likert::{likert_summary, LikertOptions, LikertTables, Scale};

/// A named result table ready to be written.
#[derive(Debug, Clone)]
pub struct Output {
    /// File name inside the tables directory.
    pub file_name: String,
    /// Table content.
    pub table: Table,
}

impl Output {
    /// Create an output.
    #[must_use]
    pub fn new(file_name: impl Into<String>, table: Table) -> Self {
        Self {
            file_name: file_name.into(),
            table,
        }
    }
}

/// Write outputs into `dir`, returning the written paths in order.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be written.
pub fn write_outputs(dir: &Path, outputs: &[Output]) -> Result<Vec<PathBuf>> {
    ensure_dir(dir)?;
    let mut paths = Vec::with_capacity(outputs.len());
    for output in outputs {
        let path = dir.join(&output.file_name);
        output.table.write(&path)?;
        info!(path = %path.display(), rows = output.table.len(), "Analysis table written");
        paths.push(path);
    }
    Ok(paths)
}

/// Share of `part` in `total` as a percentage, zero when `total` is zero.
#[must_use]
pub fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        part / total * 100.0
    } else {
        0.0
    }
}

/// Format a number with a fixed count of decimals.
#[must_use]
pub fn fixed(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}
