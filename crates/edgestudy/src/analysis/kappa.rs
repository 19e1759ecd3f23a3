//! Inter-rater agreement.
//!
//! Cohen's kappa for the single-label ISO/IEC 30141 capability mappings and a
//! per-characteristic binary kappa for multi-label ISO/IEC 25010 codings.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::table::{is_missing, Table};

use super::fixed;

/// Category given to cells a rater left empty.
pub const MISSING_CATEGORY: &str = "NONE";

/// Output file of [`capability_agreement`].
pub const KAPPA_RESULTS_FILE: &str = "kappa_results.csv";

/// Output file of the per-label results of [`multilabel_agreement`].
pub const MULTILABEL_RESULTS_FILE: &str = "multilabel_kappa.csv";

/// Quality characteristics of ISO/IEC 25010:2023.
pub const ISO_25010: [&str; 9] = [
    "Functional Suitability",
    "Performance Efficiency",
    "Compatibility",
    "Interaction Capability",
    "Reliability",
    "Security",
    "Maintainability",
    "Flexibility",
    "Safety",
];

/// Cohen's kappa between two nominal ratings of the same items.
///
/// Returns `Ok(None)` when kappa is undefined, i.e. the expected agreement
/// is 1 because both raters used one and the same category throughout.
///
/// # Errors
///
/// Returns an error if the inputs are empty or differ in length.
pub fn cohen_kappa<A, B>(first: &[A], second: &[B]) -> Result<Option<f64>>
where
    A: AsRef<str>,
    B: AsRef<str>,
{
    if first.len() != second.len() {
        return Err(Error::analysis(format!(
            "rating lengths differ: {} vs {}",
            first.len(),
            second.len()
        )));
    }
    if first.is_empty() {
        return Err(Error::analysis("cannot compute kappa of empty ratings"));
    }

    #[allow(clippy::cast_precision_loss)]
    let n = first.len() as f64;
    let mut first_counts: BTreeMap<&str, f64> = BTreeMap::new();
    let mut second_counts: BTreeMap<&str, f64> = BTreeMap::new();
    let mut agreed = 0.0;

    for (a, b) in first.iter().zip(second) {
        let (a, b) = (a.as_ref(), b.as_ref());
        *first_counts.entry(a).or_default() += 1.0;
        *second_counts.entry(b).or_default() += 1.0;
        if a == b {
            agreed += 1.0;
        }
    }

    let observed = agreed / n;
    let expected: f64 = first_counts
        .iter()
        .map(|(category, count)| {
            let other = second_counts.get(category).copied().unwrap_or_default();
            (count / n) * (other / n)
        })
        .sum();

    if (1.0 - expected).abs() < f64::EPSILON {
        return Ok(None);
    }
    Ok(Some((observed - expected) / (1.0 - expected)))
}

/// Render a kappa value for a CSV cell; undefined values stay empty.
#[must_use]
pub fn format_kappa(kappa: Option<f64>) -> String {
    kappa.map(|k| fixed(k, 4)).unwrap_or_default()
}

fn ratings(table: &Table, column: usize) -> Vec<String> {
    table
        .column_values(column)
        .map(|cell| {
            if is_missing(cell) {
                MISSING_CATEGORY.to_string()
            } else {
                cell.trim().to_string()
            }
        })
        .collect()
}

/// Pairwise kappa for every rater pair on every capability slot.
///
/// Rater columns are named by `template`, whose `{slot}` and `{rater}`
/// placeholders are substituted, e.g. `iso_mapping_cap_1 - [Ana]`. The
/// result has one row per slot: `capability, A_vs_B, A_vs_C, ...`.
///
/// # Errors
///
/// Returns an error if fewer than two raters are given, a rater column is
/// missing, or the table is empty.
pub fn capability_agreement(
    table: &Table,
    raters: &[String],
    slots: u32,
    template: &str,
) -> Result<Table> {
    if raters.len() < 2 {
        return Err(Error::analysis("at least two raters are required"));
    }

    let pairs: Vec<(&String, &String)> = raters
        .iter()
        .enumerate()
        .flat_map(|(i, a)| raters[i + 1..].iter().map(move |b| (a, b)))
        .collect();

    let mut headers = vec!["capability".to_string()];
    headers.extend(pairs.iter().map(|(a, b)| format!("{a}_vs_{b}")));
    let mut results = Table::new(headers);

    for slot in 1..=slots {
        let column_for = |rater: &str| {
            template
                .replace("{slot}", &slot.to_string())
                .replace("{rater}", rater)
        };

        let mut row = vec![format!("capability_{slot}")];
        for (a, b) in &pairs {
            let first = ratings(table, table.require_column(&column_for(a))?);
            let second = ratings(table, table.require_column(&column_for(b))?);
            let kappa = cohen_kappa(&first, &second)?;
            debug!(slot, first = %a, second = %b, ?kappa, "Pairwise kappa");
            row.push(format_kappa(kappa));
        }
        results.push_row(row);
    }

    info!(slots, pairs = pairs.len(), "Capability agreement computed");
    Ok(results)
}

/// Split a multi-label cell on `,` and `;`, trimming and dropping blanks.
#[must_use]
pub fn parse_labels(cell: &str) -> Vec<String> {
    if is_missing(cell) {
        return Vec::new();
    }
    cell.split([',', ';'])
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Map labels onto the ISO/IEC 25010 names case-insensitively.
///
/// Unknown labels are kept as written; duplicates are removed preserving the
/// first occurrence.
#[must_use]
pub fn normalize_labels(labels: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        let canonical = ISO_25010
            .iter()
            .find(|name| name.eq_ignore_ascii_case(label))
            .map_or_else(|| label.clone(), ToString::to_string);
        if !normalized.contains(&canonical) {
            normalized.push(canonical);
        }
    }
    normalized
}

/// Result of a multi-label agreement analysis.
#[derive(Debug, Clone)]
pub struct MultilabelAgreement {
    /// Kappa per label, labels sorted.
    pub per_label: Vec<(String, Option<f64>)>,
    /// Mean of the defined per-label kappas.
    pub macro_kappa: Option<f64>,
    /// Input table with `R1_normalized` and `R2_normalized` appended.
    pub cleaned: Table,
}

impl MultilabelAgreement {
    /// Per-label results with a trailing `macro` row.
    #[must_use]
    pub fn results_table(&self) -> Table {
        let mut table = Table::new(["label", "kappa"]);
        for (label, kappa) in &self.per_label {
            table.push_row([label.clone(), format_kappa(*kappa)]);
        }
        table.push_row(["macro".to_string(), format_kappa(self.macro_kappa)]);
        table
    }
}

/// Multi-label agreement between two rater columns.
///
/// Each label in the union of both raters' labels becomes a binary rating
/// (present or absent per row) and gets its own kappa.
///
/// # Errors
///
/// Returns an error if a column is missing or the table is empty.
pub fn multilabel_agreement(table: &Table, first: &str, second: &str) -> Result<MultilabelAgreement> {
    let first_col = table.require_column(first)?;
    let second_col = table.require_column(second)?;
    if table.is_empty() {
        return Err(Error::analysis("cannot compute agreement on an empty table"));
    }

    let first_labels: Vec<Vec<String>> = table
        .column_values(first_col)
        .map(|cell| normalize_labels(&parse_labels(cell)))
        .collect();
    let second_labels: Vec<Vec<String>> = table
        .column_values(second_col)
        .map(|cell| normalize_labels(&parse_labels(cell)))
        .collect();

    let union: BTreeSet<&String> = first_labels.iter().chain(&second_labels).flatten().collect();

    let mut per_label = Vec::with_capacity(union.len());
    for label in union {
        let presence = |rows: &[Vec<String>]| -> Vec<&'static str> {
            rows.iter()
                .map(|labels| if labels.contains(label) { "1" } else { "0" })
                .collect()
        };
        let kappa = cohen_kappa(&presence(&first_labels), &presence(&second_labels))?;
        debug!(label = %label, ?kappa, "Label kappa");
        per_label.push((label.clone(), kappa));
    }

    let defined: Vec<f64> = per_label.iter().filter_map(|(_, k)| *k).collect();
    #[allow(clippy::cast_precision_loss)]
    let macro_kappa = (!defined.is_empty()).then(|| defined.iter().sum::<f64>() / defined.len() as f64);

    let mut cleaned = table.clone();
    cleaned.push_column("R1_normalized", first_labels.iter().map(|l| l.join(", ")).collect())?;
    cleaned.push_column("R2_normalized", second_labels.iter().map(|l| l.join(", ")).collect())?;

    info!(labels = per_label.len(), ?macro_kappa, "Multi-label agreement computed");
    Ok(MultilabelAgreement {
        per_label,
        macro_kappa,
        cleaned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn approx(value: Option<f64>, expected: f64) {
        let value = value.unwrap();
        assert!((value - expected).abs() < 1e-9, "{value} != {expected}");
    }

    #[test]
    fn test_cohen_kappa_perfect_agreement() {
        let a = ["x", "y", "x", "z"];
        approx(cohen_kappa(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn test_cohen_kappa_known_value() {
        // po = 0.75, pe = 0.75 * 0.5 + 0.25 * 0.5 = 0.5
        let a = ["y", "y", "y", "n"];
        let b = ["y", "y", "n", "n"];
        approx(cohen_kappa(&a, &b).unwrap(), 0.5);
    }

    #[test]
    fn test_cohen_kappa_worse_than_chance() {
        let a = ["y", "n"];
        let b = ["n", "y"];
        approx(cohen_kappa(&a, &b).unwrap(), -1.0);
    }

    #[test]
    fn test_cohen_kappa_undefined() {
        let a = ["NONE", "NONE", "NONE"];
        assert_eq!(cohen_kappa(&a, &a).unwrap(), None);
    }

    #[test]
    fn test_cohen_kappa_rejects_bad_input() {
        let empty: [&str; 0] = [];
        assert!(cohen_kappa(&empty, &empty).is_err());
        assert!(cohen_kappa(&["a"], &["a", "b"]).is_err());
    }

    #[test]
    fn test_capability_agreement() {
        let mut table = Table::new([
            "iso_mapping_cap_1 - [Ana]",
            "iso_mapping_cap_1 - [Bia]",
            "iso_mapping_cap_1 - [Caio]",
        ]);
        table.push_row(["Data Capabilities", "Data Capabilities", "Data Capabilities"]);
        table.push_row(["Interface Capability", "Interface Capability", ""]);
        table.push_row(["", "", "Supporting Capabilities"]);

        let raters = vec!["Ana".to_string(), "Bia".to_string(), "Caio".to_string()];
        let results =
            capability_agreement(&table, &raters, 1, "iso_mapping_cap_{slot} - [{rater}]").unwrap();

        assert_eq!(
            results.headers(),
            &["capability", "Ana_vs_Bia", "Ana_vs_Caio", "Bia_vs_Caio"]
        );
        assert_eq!(results.value(0, 0), "capability_1");
        assert_eq!(results.value(0, 1), "1.0000");
        assert_ne!(results.value(0, 2), "1.0000");
    }

    #[test]
    fn test_capability_agreement_missing_rater_column() {
        let table = Table::new(["iso_mapping_cap_1 - [Ana]"]);
        let raters = vec!["Ana".to_string(), "Bia".to_string()];
        let err = capability_agreement(&table, &raters, 1, "iso_mapping_cap_{slot} - [{rater}]")
            .unwrap_err();
        assert!(err.to_string().contains("Bia"));
    }

    #[test]
    fn test_capability_agreement_needs_two_raters() {
        let table = Table::new(["x"]);
        assert!(capability_agreement(&table, &["Ana".to_string()], 1, "{rater}").is_err());
    }

    #[test]
    fn test_parse_and_normalize_labels() {
        let labels = parse_labels(" security; reliability ,, Security,Portability ");
        assert_eq!(labels, vec!["security", "reliability", "Security", "Portability"]);
        assert_eq!(
            normalize_labels(&labels),
            vec!["Security", "Reliability", "Portability"]
        );
        assert!(parse_labels("NaN").is_empty());
    }

    #[test]
    fn test_multilabel_agreement() {
        let mut table = Table::new(["QR_R1", "QR_R2"]);
        table.push_row(["Security, Reliability", "security"]);
        table.push_row(["Safety", "Safety"]);
        table.push_row(["", "reliability"]);

        let result = multilabel_agreement(&table, "QR_R1", "QR_R2").unwrap();
        let labels: Vec<&str> = result.per_label.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["Reliability", "Safety", "Security"]);

        // Safety and Security agree everywhere.
        approx(result.per_label[1].1, 1.0);
        approx(result.per_label[2].1, 1.0);
        // Reliability: [1,0,0] vs [0,0,1] gives po = 1/3, pe = 5/9.
        approx(result.per_label[0].1, (1.0 / 3.0 - 5.0 / 9.0) / (1.0 - 5.0 / 9.0));

        assert_eq!(result.cleaned.value(0, 2), "Security, Reliability");
        assert_eq!(result.cleaned.value(0, 3), "Security");

        let results = result.results_table();
        assert_eq!(results.len(), 4);
        assert_eq!(results.value(3, 0), "macro");
    }

    #[test]
    fn test_multilabel_agreement_empty_table() {
        let table = Table::new(["QR_R1", "QR_R2"]);
        assert!(multilabel_agreement(&table, "QR_R1", "QR_R2").is_err());
    }
}
