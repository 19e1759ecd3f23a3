//! Column coverage: how many repositories document a given architectural
//! view or artifact.

use std::fmt;

use tracing::warn;

use crate::table::{is_missing, Table};

use super::{fixed, percent};

/// Output file of [`column_coverage`].
pub const COVERAGE_FILE: &str = "column_coverage.csv";

/// Values counted as affirmative under [`Criterion::TrueLike`].
const TRUE_LIKE: &[&str] = &["true", "1", "yes", "y", "sim"];

/// When a cell counts as covered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Criterion {
    /// Any non-missing, non-blank cell.
    #[default]
    Present,
    /// Affirmative text or a non-zero number.
    TrueLike,
}

impl Criterion {
    /// Check whether a cell is covered.
    #[must_use]
    pub fn matches(self, cell: &str) -> bool {
        if is_missing(cell) {
            return false;
        }
        match self {
            Self::Present => true,
            Self::TrueLike => {
                let value = cell.trim().to_lowercase();
                TRUE_LIKE.contains(&value.as_str())
                    || value.parse::<f64>().is_ok_and(|n| n != 0.0 && !n.is_nan())
            }
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "non_null_non_empty"),
            Self::TrueLike => write!(f, "true_like"),
        }
    }
}

/// Count covered cells per column.
///
/// Columns absent from the table count zero and are logged. The result has
/// `column, count, percentage, total_rows, criterion` with the percentage
/// over all rows rounded to two decimals.
#[must_use]
pub fn column_coverage(table: &Table, columns: &[String], criterion: Criterion) -> Table {
    let total = table.len();
    let mut result = Table::new(["column", "count", "percentage", "total_rows", "criterion"]);

    for column in columns {
        let count = match table.column_index(column) {
            Some(index) => table
                .column_values(index)
                .filter(|cell| criterion.matches(cell))
                .count(),
            None => {
                warn!(column = %column, "Coverage column not found, counting zero");
                0
            }
        };

        #[allow(clippy::cast_precision_loss)]
        let share = percent(count as f64, total as f64);
        result.push_row([
            column.clone(),
            count.to_string(),
            fixed(share, 2),
            total.to_string(),
            criterion.to_string(),
        ]);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn views_table() -> Table {
        let mut table = Table::new(["logical_view", "deployment_view"]);
        table.push_row(["yes", "diagram.png"]);
        table.push_row(["0", ""]);
        table.push_row(["Sim", "NaN"]);
        table
    }

    #[test]
    fn test_criterion_true_like() {
        assert!(Criterion::TrueLike.matches("TRUE"));
        assert!(Criterion::TrueLike.matches(" y "));
        assert!(Criterion::TrueLike.matches("2"));
        assert!(!Criterion::TrueLike.matches("0"));
        assert!(!Criterion::TrueLike.matches("no"));
        assert!(!Criterion::TrueLike.matches(""));
    }

    #[test]
    fn test_column_coverage_present() {
        let columns = vec!["logical_view".to_string(), "deployment_view".to_string()];
        let result = column_coverage(&views_table(), &columns, Criterion::Present);

        assert_eq!(result.rows()[0], vec!["logical_view", "3", "100.00", "3", "non_null_non_empty"]);
        assert_eq!(result.rows()[1], vec!["deployment_view", "1", "33.33", "3", "non_null_non_empty"]);
    }

    #[test]
    fn test_column_coverage_true_like_and_missing_column() {
        let columns = vec!["logical_view".to_string(), "process_view".to_string()];
        let result = column_coverage(&views_table(), &columns, Criterion::TrueLike);

        assert_eq!(result.value(0, 1), "2");
        assert_eq!(result.value(0, 2), "66.67");
        assert_eq!(result.rows()[1], vec!["process_view", "0", "0.00", "3", "true_like"]);
    }

    #[test]
    fn test_column_coverage_empty_table() {
        let table = Table::new(["logical_view"]);
        let result = column_coverage(&table, &["logical_view".to_string()], Criterion::Present);
        assert_eq!(result.value(0, 2), "0.00");
    }
}
