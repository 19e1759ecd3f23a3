//! Study dataset integrity.
//!
//! The coded study is exported as five flat tables joined by identifier
//! columns. This module loads them, checks referential integrity across the
//! fragment → code → theme hierarchy, and maintains a checksum manifest so
//! a published dataset can be verified later.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DatasetConfig;
use crate::error::{Error, Result};
use crate::model::{Code, Fragment, FragmentCode, StudyRepository, Theme};
use crate::table::Table;

/// Name of the checksum manifest.
pub const MANIFEST_FILE: &str = "MANIFEST.csv";

/// How serious a violation is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Breaks the dataset's referential integrity.
    Error,
    /// Suspicious but not inconsistent.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// One integrity finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Severity of the finding.
    pub severity: Severity,
    /// Table the finding is about.
    pub table: String,
    /// Line in the CSV file (header is line 1), when tied to a row.
    pub row: Option<usize>,
    /// Description.
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.row {
            Some(row) => write!(f, "[{}] {}:{}: {}", self.severity, self.table, row, self.message),
            None => write!(f, "[{}] {}: {}", self.severity, self.table, self.message),
        }
    }
}

/// Result of an integrity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    /// Row counts per table.
    pub row_counts: BTreeMap<String, usize>,
    /// All findings, errors first.
    pub violations: Vec<Violation>,
}

impl IntegrityReport {
    /// Check if no error was found.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Findings of severity [`Severity::Error`].
    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity == Severity::Error)
    }

    /// Findings of severity [`Severity::Warning`].
    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }

    fn push(&mut self, severity: Severity, table: &str, row: Option<usize>, message: String) {
        self.violations.push(Violation {
            severity,
            table: table.to_string(),
            row,
            message,
        });
    }
}

/// CSV line of a zero-based data row.
fn line(index: usize) -> Option<usize> {
    Some(index + 2)
}

/// The coded study tables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudyDataset {
    /// Included repositories, if exported.
    pub repositories: Option<Vec<StudyRepository>>,
    /// Extracted fragments.
    pub fragments: Vec<Fragment>,
    /// Fragment to code assignments.
    pub fragment_codes: Vec<FragmentCode>,
    /// Codes.
    pub codes: Vec<Code>,
    /// Themes.
    pub themes: Vec<Theme>,
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()?;
    debug!(path = %path.display(), rows = records.len(), "Loaded study table");
    Ok(records)
}

impl StudyDataset {
    /// Load the tables from `dir` using the configured file names.
    ///
    /// The repositories table is optional; the other four are required.
    ///
    /// # Errors
    ///
    /// Returns an error if a required table is missing or malformed.
    pub fn load(dir: &Path, files: &DatasetConfig) -> Result<Self> {
        let repositories_path = dir.join(&files.repositories_file);
        let repositories = if repositories_path.exists() {
            Some(read_records(&repositories_path)?)
        } else {
            warn!(path = %repositories_path.display(), "Repositories table not found");
            None
        };

        Ok(Self {
            repositories,
            fragments: read_records(&dir.join(&files.fragments_file))?,
            fragment_codes: read_records(&dir.join(&files.fragment_codes_file))?,
            codes: read_records(&dir.join(&files.codes_file))?,
            themes: read_records(&dir.join(&files.themes_file))?,
        })
    }

    /// Check identifier uniqueness and every cross-table reference.
    #[must_use]
    pub fn check(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        if let Some(repositories) = &self.repositories {
            report
                .row_counts
                .insert("repositories".to_string(), repositories.len());
        }
        report
            .row_counts
            .insert("fragments".to_string(), self.fragments.len());
        report
            .row_counts
            .insert("fragment_codes".to_string(), self.fragment_codes.len());
        report.row_counts.insert("codes".to_string(), self.codes.len());
        report.row_counts.insert("themes".to_string(), self.themes.len());

        let repo_ids = self.repositories.as_ref().map(|repos| {
            unique_ids(&mut report, "repositories", "repo_id", repos.iter().map(|r| r.repo_id.as_str()))
        });
        let fragment_ids = unique_ids(
            &mut report,
            "fragments",
            "fragment_id",
            self.fragments.iter().map(|f| f.fragment_id.as_str()),
        );
        let code_ids = unique_ids(
            &mut report,
            "codes",
            "code_id",
            self.codes.iter().map(|c| c.code_id.as_str()),
        );
        let theme_ids = unique_ids(
            &mut report,
            "themes",
            "theme_id",
            self.themes.iter().map(|t| t.theme_id.as_str()),
        );

        if let Some(repo_ids) = &repo_ids {
            for (i, fragment) in self.fragments.iter().enumerate() {
                if !repo_ids.contains(fragment.repo_id.as_str()) {
                    report.push(
                        Severity::Error,
                        "fragments",
                        line(i),
                        format!(
                            "fragment '{}' references unknown repo_id '{}'",
                            fragment.fragment_id, fragment.repo_id
                        ),
                    );
                }
            }
        }

        let mut seen_pairs = HashSet::new();
        let mut fragments_per_code: HashMap<&str, HashSet<&str>> = HashMap::new();
        let mut coded_fragments = HashSet::new();
        for (i, mapping) in self.fragment_codes.iter().enumerate() {
            if !fragment_ids.contains(mapping.fragment_id.as_str()) {
                report.push(
                    Severity::Error,
                    "fragment_codes",
                    line(i),
                    format!("unknown fragment_id '{}'", mapping.fragment_id),
                );
            }
            if !code_ids.contains(mapping.code_id.as_str()) {
                report.push(
                    Severity::Error,
                    "fragment_codes",
                    line(i),
                    format!("unknown code_id '{}'", mapping.code_id),
                );
            }
            if !seen_pairs.insert(mapping) {
                report.push(
                    Severity::Warning,
                    "fragment_codes",
                    line(i),
                    format!(
                        "duplicate assignment of code '{}' to fragment '{}'",
                        mapping.code_id, mapping.fragment_id
                    ),
                );
            }
            fragments_per_code
                .entry(mapping.code_id.as_str())
                .or_default()
                .insert(mapping.fragment_id.as_str());
            coded_fragments.insert(mapping.fragment_id.as_str());
        }

        let mut themes_with_codes = HashSet::new();
        for (i, code) in self.codes.iter().enumerate() {
            if code.label.trim().is_empty() {
                report.push(
                    Severity::Error,
                    "codes",
                    line(i),
                    format!("code '{}' has an empty label", code.code_id),
                );
            }
            if theme_ids.contains(code.theme_id.as_str()) {
                themes_with_codes.insert(code.theme_id.as_str());
            } else {
                report.push(
                    Severity::Error,
                    "codes",
                    line(i),
                    format!(
                        "code '{}' references unknown theme_id '{}'",
                        code.code_id, code.theme_id
                    ),
                );
            }

            let mapped = fragments_per_code
                .get(code.code_id.as_str())
                .map_or(0, HashSet::len);
            if mapped == 0 {
                report.push(
                    Severity::Warning,
                    "codes",
                    line(i),
                    format!("code '{}' is not applied to any fragment", code.code_id),
                );
            }
            if let Some(occurrences) = code.occurrences {
                if occurrences as usize != mapped {
                    report.push(
                        Severity::Warning,
                        "codes",
                        line(i),
                        format!(
                            "code '{}' reports {occurrences} occurrences but is mapped to {mapped} fragments",
                            code.code_id
                        ),
                    );
                }
            }
        }

        for (i, theme) in self.themes.iter().enumerate() {
            if theme.high_order_theme.trim().is_empty() {
                report.push(
                    Severity::Error,
                    "themes",
                    line(i),
                    format!("theme '{}' has no high-order theme", theme.theme_id),
                );
            }
            if !themes_with_codes.contains(theme.theme_id.as_str()) {
                report.push(
                    Severity::Warning,
                    "themes",
                    line(i),
                    format!("theme '{}' groups no code", theme.theme_id),
                );
            }
        }

        for (i, fragment) in self.fragments.iter().enumerate() {
            if !coded_fragments.contains(fragment.fragment_id.as_str()) {
                report.push(
                    Severity::Warning,
                    "fragments",
                    line(i),
                    format!("fragment '{}' has no code", fragment.fragment_id),
                );
            }
        }

        report.violations.sort_by_key(|v| v.severity);
        report
    }
}

/// Collect ids, reporting blank and duplicate ones.
fn unique_ids<'a>(
    report: &mut IntegrityReport,
    table: &str,
    column: &str,
    ids: impl Iterator<Item = &'a str>,
) -> HashSet<&'a str> {
    let mut seen = HashSet::new();
    for (i, id) in ids.enumerate() {
        if id.is_empty() {
            report.push(Severity::Error, table, line(i), format!("empty {column}"));
        } else if !seen.insert(id) {
            report.push(
                Severity::Error,
                table,
                line(i),
                format!("duplicate {column} '{id}'"),
            );
        }
    }
    seen
}

/// Checksum record of one dataset file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    /// File name relative to the dataset directory.
    pub file: String,
    /// Size in bytes.
    pub size: u64,
    /// Data rows, header excluded.
    pub rows: usize,
    /// Hex blake3 digest.
    pub blake3: String,
}

/// Verification outcome for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    /// Matches the manifest.
    Unchanged,
    /// Content differs from the manifest.
    Changed,
    /// Listed in the manifest but absent.
    Missing,
    /// Present but not listed in the manifest.
    Untracked,
}

impl fmt::Display for ManifestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Missing => "missing",
            Self::Untracked => "untracked",
        };
        f.write_str(s)
    }
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(Error::FileNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension().is_some_and(|e| e.eq_ignore_ascii_case("csv"))
                && p.file_name().is_some_and(|n| n != MANIFEST_FILE)
        })
        .collect();
    files.sort();
    Ok(files)
}

fn describe(path: &Path) -> Result<ManifestEntry> {
    let bytes = std::fs::read(path)?;
    let rows = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes.as_slice())
        .records()
        .count();
    Ok(ManifestEntry {
        file: path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        size: bytes.len() as u64,
        rows,
        blake3: blake3::hash(&bytes).to_hex().to_string(),
    })
}

/// Describe every CSV file of `dir`, the manifest itself excluded.
///
/// # Errors
///
/// Returns an error if the directory or a file cannot be read.
pub fn manifest(dir: &Path) -> Result<Vec<ManifestEntry>> {
    csv_files(dir)?
        .iter()
        .map(PathBuf::as_path)
        .map(describe)
        .collect()
}

/// Write `MANIFEST.csv` into `dir`.
///
/// # Errors
///
/// Returns an error if a file cannot be read or the manifest written.
pub fn write_manifest(dir: &Path) -> Result<PathBuf> {
    let entries = manifest(dir)?;
    let mut table = Table::new(["file", "size", "rows", "blake3"]);
    for entry in &entries {
        table.push_row([
            entry.file.clone(),
            entry.size.to_string(),
            entry.rows.to_string(),
            entry.blake3.clone(),
        ]);
    }

    let path = dir.join(MANIFEST_FILE);
    table.write(&path)?;
    info!(files = entries.len(), path = %path.display(), "Manifest written");
    Ok(path)
}

/// Compare the files of `dir` against its `MANIFEST.csv`.
///
/// # Errors
///
/// Returns an error if the manifest is missing or malformed.
pub fn verify_manifest(dir: &Path) -> Result<Vec<(String, ManifestStatus)>> {
    let table = Table::read(dir.join(MANIFEST_FILE))?;
    let file_col = table.require_column("file")?;
    let hash_col = table.require_column("blake3")?;

    let current: HashMap<String, ManifestEntry> = manifest(dir)?
        .into_iter()
        .map(|e| (e.file.clone(), e))
        .collect();

    let mut results = Vec::new();
    let mut listed = HashSet::new();
    for row in table.rows() {
        let file = row[file_col].clone();
        let status = match current.get(&file) {
            None => ManifestStatus::Missing,
            Some(entry) if entry.blake3 == row[hash_col] => ManifestStatus::Unchanged,
            Some(_) => ManifestStatus::Changed,
        };
        listed.insert(file.clone());
        results.push((file, status));
    }

    let mut untracked: Vec<&String> = current.keys().filter(|f| !listed.contains(*f)).collect();
    untracked.sort();
    results.extend(
        untracked
            .into_iter()
            .map(|f| (f.clone(), ManifestStatus::Untracked)),
    );
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join(name), content).unwrap();
    }

    fn consistent_dataset(dir: &Path) {
        write(dir, "repositories.csv", "repo_id,name,URL,domain,architectural_layer\nR1,edge-runtime,https://github.com/acme/edge-runtime,Healthcare,System\n");
        write(dir, "fragments_used.csv", "fragment_id,repo_id,source_path,text,quality_attribute\nF1,R1,README.md,Runs offline,Reliability\nF2,R1,docs/arch.md,Uses MQTT,Compatibility\n");
        write(dir, "fragment_codes.csv", "fragment_id,code_id\nF1,C1\nF2,C1\nF2,C2\n");
        write(dir, "codes.csv", "code_id,label,occurrences,theme_id\nC1,Offline operation,2,T1\nC2,Lightweight messaging,1,T1\n");
        write(dir, "themes.csv", "theme_id,name,high_order_theme,iso_capability\nT1,Resilient edge nodes,Deployment,Supporting Capabilities\n");
    }

    #[test]
    fn test_consistent_dataset() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());

        let dataset = StudyDataset::load(dir.path(), &DatasetConfig::default()).unwrap();
        let report = dataset.check();
        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.warnings().count(), 0);
        assert_eq!(report.row_counts["fragment_codes"], 3);
    }

    #[test]
    fn test_dangling_references_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        write(dir.path(), "fragment_codes.csv", "fragment_id,code_id\nF1,C1\nF9,C1\nF2,C2\n");
        write(dir.path(), "codes.csv", "code_id,label,occurrences,theme_id\nC1,Offline operation,,T1\nC2,Lightweight messaging,,T7\n");

        let report = StudyDataset::load(dir.path(), &DatasetConfig::default())
            .unwrap()
            .check();
        assert!(!report.is_consistent());

        let messages: Vec<String> = report.errors().map(ToString::to_string).collect();
        assert_eq!(
            messages,
            vec![
                "[error] fragment_codes:3: unknown fragment_id 'F9'".to_string(),
                "[error] codes:3: code 'C2' references unknown theme_id 'T7'".to_string(),
            ]
        );
    }

    #[test]
    fn test_duplicate_ids_and_missing_hierarchy() {
        let dataset = StudyDataset {
            repositories: None,
            fragments: vec![
                Fragment {
                    fragment_id: "F1".to_string(),
                    ..Fragment::default()
                },
                Fragment {
                    fragment_id: "F1".to_string(),
                    ..Fragment::default()
                },
            ],
            fragment_codes: vec![FragmentCode {
                fragment_id: "F1".to_string(),
                code_id: "C1".to_string(),
            }],
            codes: vec![Code {
                code_id: "C1".to_string(),
                label: " ".to_string(),
                occurrences: Some(3),
                theme_id: "T1".to_string(),
            }],
            themes: vec![Theme {
                theme_id: "T1".to_string(),
                ..Theme::default()
            }],
        };

        let report = dataset.check();
        let errors: Vec<&str> = report.errors().map(|v| v.message.as_str()).collect();
        assert!(errors.contains(&"duplicate fragment_id 'F1'"));
        assert!(errors.contains(&"code 'C1' has an empty label"));
        assert!(errors.contains(&"theme 'T1' has no high-order theme"));
        assert!(report
            .warnings()
            .any(|v| v.message.contains("reports 3 occurrences but is mapped to 1")));
    }

    #[test]
    fn test_unused_entities_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        write(dir.path(), "themes.csv", "theme_ID,name,high_order_theme,iso_capability\nT1,Resilient,Deployment,\nT2,Unused,Deployment,\n");
        write(dir.path(), "fragments_used.csv", "fragment_id,repo_id,source_path,text,quality_attribute\nF1,R1,a,b,c\nF2,R1,a,b,c\nF3,R1,a,b,c\n");

        let report = StudyDataset::load(dir.path(), &DatasetConfig::default())
            .unwrap()
            .check();
        assert!(report.is_consistent());
        let warnings: Vec<String> = report.warnings().map(|v| v.message.clone()).collect();
        assert_eq!(
            warnings,
            vec!["theme 'T2' groups no code", "fragment 'F3' has no code"]
        );
    }

    #[test]
    fn test_unknown_repo_reference() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        write(dir.path(), "fragments_used.csv", "fragment_id,repo_id,source_path,text,quality_attribute\nF1,R1,a,b,c\nF2,R2,a,b,c\n");

        let report = StudyDataset::load(dir.path(), &DatasetConfig::default())
            .unwrap()
            .check();
        assert_eq!(report.errors().count(), 1);
        assert!(report.errors().next().unwrap().message.contains("unknown repo_id 'R2'"));
    }

    #[test]
    fn test_missing_required_table() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        std::fs::remove_file(dir.path().join("themes.csv")).unwrap();

        let err = StudyDataset::load(dir.path(), &DatasetConfig::default()).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }

    #[test]
    fn test_spreadsheet_occurrence_counts_load() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        write(dir.path(), "codes.csv", "code_id,label,occurrences,theme_id\nC1,Offline operation,2.0,T1\nC2,Lightweight messaging,1.0,T1\n");

        let dataset = StudyDataset::load(dir.path(), &DatasetConfig::default()).unwrap();
        assert_eq!(dataset.codes[0].occurrences, Some(2));
        let report = dataset.check();
        assert!(report.is_consistent(), "{:?}", report.violations);
        assert_eq!(report.warnings().count(), 0);
    }

    #[test]
    fn test_repositories_table_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        std::fs::remove_file(dir.path().join("repositories.csv")).unwrap();

        let dataset = StudyDataset::load(dir.path(), &DatasetConfig::default()).unwrap();
        assert!(dataset.repositories.is_none());
        assert!(dataset.check().is_consistent());
    }

    #[test]
    fn test_manifest_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());

        let entries = manifest(dir.path()).unwrap();
        assert_eq!(entries.len(), 5);
        let codes = entries.iter().find(|e| e.file == "codes.csv").unwrap();
        assert_eq!(codes.rows, 2);
        assert_eq!(codes.blake3.len(), 64);

        write_manifest(dir.path()).unwrap();
        let status = verify_manifest(dir.path()).unwrap();
        assert!(status.iter().all(|(_, s)| *s == ManifestStatus::Unchanged));
        assert_eq!(status.len(), 5);
    }

    #[test]
    fn test_verify_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        consistent_dataset(dir.path());
        write_manifest(dir.path()).unwrap();

        write(dir.path(), "codes.csv", "code_id,label,occurrences,theme_id\nC1,Changed,2,T1\n");
        std::fs::remove_file(dir.path().join("themes.csv")).unwrap();
        write(dir.path(), "extra.csv", "a\n1\n");

        let status: HashMap<String, ManifestStatus> =
            verify_manifest(dir.path()).unwrap().into_iter().collect();
        assert_eq!(status["codes.csv"], ManifestStatus::Changed);
        assert_eq!(status["themes.csv"], ManifestStatus::Missing);
        assert_eq!(status["extra.csv"], ManifestStatus::Untracked);
        assert_eq!(status["fragments_used.csv"], ManifestStatus::Unchanged);
    }

    #[test]
    fn test_verify_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            verify_manifest(dir.path()),
            Err(Error::FileNotFound(_))
        ));
    }
}
