//! Application domains of the studied repositories.
//!
//! The `domain` column holds free-text, comma-separated values written by
//! several people. Tokens are cleaned and folded onto a canonical vocabulary
//! before counting.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::Result;
use crate::table::{is_missing, Table};

use super::{fixed, Output};

/// Long-format output file.
pub const DOMAINS_LONG_FILE: &str = "domains_normalized_long.csv";
/// Counts output file.
pub const DOMAINS_COUNTS_FILE: &str = "domains_counts.csv";

const STREAMING: &str = "Data Streaming & Real-Time";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

static STREAMING_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [r"(?i)\b(real[-\s]?time|rt)\b", r"(?i)\bstream(ing)?\b"]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("Invalid regex pattern"))
        .collect()
});

/// Synonyms and typos, keyed by cleaned token.
const CANONICAL: &[(&str, &str)] = &[
    ("iiot", "IIoT"),
    ("industrial iot", "IIoT"),
    ("industrial edge computing", "IIoT"),
    ("smart manufacturing", "IIoT"),
    ("industrial", "IIoT"),
    ("industrial edge", "IIoT"),
    ("industrial internet of things", "IIoT"),
    ("industry 4.0", "Industry 4.0"),
    ("smart environment", "Smart Environment"),
    ("smart environments", "Smart Environment"),
    ("computer vision", "Computer Vision"),
    ("vision", "Computer Vision"),
    ("speech", "Speech"),
    ("audio analisys", "Audio Analysis"),
    ("audio analysis", "Audio Analysis"),
    ("chatbot", "Chatbot"),
    ("orchestration", "Orchestration"),
    ("federated learning", "Federated Learning"),
    ("efficient ai", "Efficient AI"),
    ("efficiente ai", "Efficient AI"),
    ("aiot", "IoT"),
    ("iot", "IoT"),
    ("autonomous", "Autonomous Systems"),
    ("autonomous systems", "Autonomous Systems"),
    ("autonomous system", "Autonomous Systems"),
    ("robotic", "Robotics"),
    ("robotics", "Robotics"),
    ("healthcare", "Healthcare"),
    ("medical iot", "Healthcare"),
    ("mobile iot", "Mobile IoT"),
    ("data streaming processing", STREAMING),
    ("data streaming", STREAMING),
    ("model-driven engineering (mde)", "MDE"),
    ("others", "Others"),
];

/// Trim, strip accents, collapse whitespace and lowercase a token.
#[must_use]
pub fn clean_token(token: &str) -> String {
    let stripped: String = token.trim().nfkd().filter(|c| !is_combining_mark(*c)).collect();
    WHITESPACE.replace_all(&stripped, " ").to_lowercase()
}

/// Title-case words: a letter is uppercased when it follows a non-letter.
fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_alpha = false;
    for c in text.chars() {
        if c.is_alphabetic() {
            if previous_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            previous_alpha = true;
        } else {
            out.push(c);
            previous_alpha = false;
        }
    }
    out
}

/// Normalize one domain token to its canonical label.
///
/// Streaming and real-time mentions win over everything else; then the
/// synonym table applies; unknown tokens fall back to the Title Case of the
/// raw text. Blank tokens yield `None`.
///
/// ```
/// use edgestudy::analysis::normalize_domain_token;
///
/// assert_eq!(normalize_domain_token("Industrial IoT").as_deref(), Some("IIoT"));
/// assert_eq!(normalize_domain_token("real-time video").as_deref(), Some("Data Streaming & Real-Time"));
/// assert_eq!(normalize_domain_token("smart  farming").as_deref(), Some("Smart Farming"));
/// ```
#[must_use]
pub fn normalize_domain_token(raw: &str) -> Option<String> {
    let base = clean_token(raw);
    if base.is_empty() {
        return None;
    }

    if STREAMING_RULES.iter().any(|rule| rule.is_match(&base)) {
        return Some(STREAMING.to_string());
    }

    if let Some((_, label)) = CANONICAL.iter().find(|(key, _)| *key == base) {
        return Some((*label).to_string());
    }

    Some(title_case(&WHITESPACE.replace_all(raw.trim(), " ")))
}

/// Split a domain cell on commas into canonical labels, de-duplicated and
/// sorted.
#[must_use]
pub fn split_domains(cell: &str) -> BTreeSet<String> {
    if is_missing(cell) {
        return BTreeSet::new();
    }
    cell.split(',').filter_map(normalize_domain_token).collect()
}

/// Result tables of [`domain_distribution`].
#[derive(Debug, Clone)]
pub struct DomainTables {
    /// One row per repository and domain.
    pub long: Table,
    /// `domain, count, proportion, percentage`, most frequent first. The
    /// proportion keeps full precision; the percentage has two decimals.
    pub counts: Table,
}

impl DomainTables {
    /// Named outputs for writing. The counts are left out when no domain
    /// was found.
    #[must_use]
    pub fn into_outputs(self) -> Vec<Output> {
        let mut outputs = Vec::with_capacity(2);
        let found = !self.long.is_empty();
        outputs.push(Output::new(DOMAINS_LONG_FILE, self.long));
        if found {
            outputs.push(Output::new(DOMAINS_COUNTS_FILE, self.counts));
        }
        outputs
    }
}

/// Normalize and count the domains of every repository.
///
/// Repositories are identified by `id_column` when given and present,
/// otherwise by their 1-based row number under `repo_id`. Proportions are
/// over distinct repositories, including those with no domain.
///
/// # Errors
///
/// Returns an error if the domain column is missing.
pub fn domain_distribution(table: &Table, column: &str, id_column: Option<&str>) -> Result<DomainTables> {
    let domain_col = table.require_column(column)?;

    let id_index = id_column.and_then(|name| {
        let index = table.column_index(name);
        if index.is_none() {
            warn!(column = %name, "Id column not found, numbering rows");
        }
        index
    });
    let (id_name, ids): (String, Vec<String>) = match (id_column, id_index) {
        (Some(name), Some(index)) => (
            name.to_string(),
            table.column_values(index).map(ToString::to_string).collect(),
        ),
        _ => (
            "repo_id".to_string(),
            (1..=table.len()).map(|i| i.to_string()).collect(),
        ),
    };
    let total = ids.iter().collect::<HashSet<_>>().len();

    let mut long = Table::new([id_name.as_str(), "domain"]);
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for (id, cell) in ids.iter().zip(table.column_values(domain_col)) {
        for domain in split_domains(cell) {
            *counts.entry(domain.clone()).or_default() += 1;
            long.push_row([id.clone(), domain]);
        }
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut count_table = Table::new(["domain", "count", "proportion", "percentage"]);
    for (domain, count) in ranked {
        #[allow(clippy::cast_precision_loss)]
        let proportion = count as f64 / total as f64;
        count_table.push_row([
            domain,
            count.to_string(),
            proportion.to_string(),
            fixed(proportion * 100.0, 2),
        ]);
    }

    if long.is_empty() {
        warn!("No domains found after normalization");
    }
    info!(
        repositories = total,
        domains = count_table.len(),
        "Domain distribution computed"
    );
    Ok(DomainTables {
        long,
        counts: count_table,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_clean_token() {
        assert_eq!(clean_token("  Visão   Computacional "), "visao computacional");
        assert_eq!(clean_token("IIoT"), "iiot");
    }

    #[test]
    fn test_normalize_domain_token() {
        let cases = [
            ("IIoT", "IIoT"),
            ("smart manufacturing", "IIoT"),
            ("Industrial edge", "IIoT"),
            ("Real time data processing", STREAMING),
            ("video streaming", STREAMING),
            ("RT analytics", STREAMING),
            ("Efficiente AI", "Efficient AI"),
            ("AIoT", "IoT"),
            ("Autonomous", "Autonomous Systems"),
            ("Model-Driven Engineering (MDE)", "MDE"),
            ("edge ai", "Edge Ai"),
            ("5g  networks", "5G Networks"),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize_domain_token(raw).as_deref(), Some(expected), "{raw}");
        }
        assert_eq!(normalize_domain_token("   "), None);
    }

    #[test]
    fn test_streams_word_is_not_streaming() {
        // only "stream" and "streaming" are whole-word matches
        assert_eq!(normalize_domain_token("upstream").as_deref(), Some("Upstream"));
    }

    #[test]
    fn test_split_domains_dedups_and_sorts() {
        let domains: Vec<String> = split_domains("Robotics, IIoT, robotic, ,").into_iter().collect();
        assert_eq!(domains, vec!["IIoT", "Robotics"]);
        assert!(split_domains("").is_empty());
    }

    #[test]
    fn test_domain_distribution_with_id_column() {
        let mut table = Table::new(["repo_id", "domain"]);
        table.push_row(["r1", "IIoT, Smart Environment"]);
        table.push_row(["r2", "industrial iot"]);
        table.push_row(["r3", ""]);
        table.push_row(["r4", "Smart environments, Healthcare"]);

        let result = domain_distribution(&table, "domain", Some("repo_id")).unwrap();
        assert_eq!(result.long.headers(), &["repo_id", "domain"]);
        assert_eq!(result.long.len(), 5);
        assert_eq!(result.long.rows()[0], vec!["r1", "IIoT"]);

        assert_eq!(
            result.counts.rows(),
            &[
                vec!["IIoT", "2", "0.5", "50.00"],
                vec!["Smart Environment", "2", "0.5", "50.00"],
                vec!["Healthcare", "1", "0.25", "25.00"],
            ]
        );
    }

    #[test]
    fn test_domain_distribution_numbers_rows() {
        let mut table = Table::new(["domain"]);
        table.push_row(["Robotics"]);
        table.push_row(["Robotics"]);

        let result = domain_distribution(&table, "domain", Some("missing")).unwrap();
        assert_eq!(result.long.headers(), &["repo_id", "domain"]);
        assert_eq!(result.long.value(1, 0), "2");
        assert_eq!(result.counts.value(0, 3), "100.00");
    }

    #[test]
    fn test_domain_proportion_keeps_precision() {
        let mut table = Table::new(["domain"]);
        table.push_row(["Robotics"]);
        table.push_row(["Healthcare"]);
        table.push_row(["Agriculture"]);

        let result = domain_distribution(&table, "domain", None).unwrap();
        assert_eq!(result.counts.value(0, 2), (1.0_f64 / 3.0).to_string());
        assert_eq!(result.counts.value(0, 3), "33.33");
    }

    #[test]
    fn test_no_domains_writes_only_long_table() {
        let mut table = Table::new(["domain"]);
        table.push_row([""]);
        table.push_row(["NA"]);

        let result = domain_distribution(&table, "domain", None).unwrap();
        assert!(result.long.is_empty());
        let outputs = result.into_outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].file_name, DOMAINS_LONG_FILE);
    }

    #[test]
    fn test_domain_distribution_missing_column() {
        let table = Table::new(["name"]);
        assert!(domain_distribution(&table, "domain", None).is_err());
    }
}
