//! Treatment of raw mining tables.
//!
//! Each step reads one CSV, writes a new timestamped CSV into the processed
//! directory and leaves its input untouched, so every intermediate stage of
//! the screening funnel stays on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use whatlang::Lang;

use crate::config::TreatmentConfig;
use crate::error::{Error, Result};
use crate::table::{file_timestamp, parse_count, Table};

/// Column holding the repository name.
const NAME_COLUMN: &str = "name";
/// Column holding the search terms that found a repository.
const TERMS_COLUMN: &str = "search_term";
/// Column holding the star count.
const STARS_COLUMN: &str = "stars";
/// Column holding the total commit count.
const COMMITS_COLUMN: &str = "total_commits";

/// Summary of one treatment step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreatmentReport {
    /// Rows read.
    pub input_rows: usize,
    /// Rows written.
    pub output_rows: usize,
    /// File written.
    pub output_path: PathBuf,
}

impl TreatmentReport {
    /// Rows removed by the step.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.input_rows.saturating_sub(self.output_rows)
    }
}

/// Fingerprint of a set of cells.
fn fingerprint<'a>(cells: impl IntoIterator<Item = &'a str>) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for cell in cells {
        hasher.update(&(cell.len() as u64).to_le_bytes());
        hasher.update(cell.as_bytes());
    }
    hasher.finalize()
}

/// Check whether a description reads as English.
#[must_use]
pub fn is_english(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty() && whatlang::detect(text).is_some_and(|info| info.lang() == Lang::Eng)
}

/// Search term encoded in a file name: the second `_`-separated token of the
/// stem, or the whole stem when there is no `_`.
#[must_use]
pub fn term_from_file_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut tokens = stem.split('_');
    let first = tokens.next().unwrap_or_default();
    tokens.next().unwrap_or(first).to_string()
}

/// Runs treatment steps with one configuration.
#[derive(Debug, Clone)]
pub struct Treatment {
    config: TreatmentConfig,
}

impl Treatment {
    /// Create a treatment runner.
    #[must_use]
    pub fn new(config: TreatmentConfig) -> Self {
        Self { config }
    }

    fn output_path(&self, file_name: String) -> PathBuf {
        self.config.processed_dir.join(file_name)
    }

    fn finish(&self, input_rows: usize, table: &Table, file_name: String) -> Result<TreatmentReport> {
        let output_path = self.output_path(file_name);
        table.write(&output_path)?;
        let report = TreatmentReport {
            input_rows,
            output_rows: table.len(),
            output_path,
        };
        info!(
            input = report.input_rows,
            output = report.output_rows,
            path = %report.output_path.display(),
            "Treatment step written"
        );
        Ok(report)
    }

    /// Concatenate every CSV file in `dir`, in file name order.
    ///
    /// Files that cannot be read are logged and skipped. Returns `None` when
    /// no file could be read.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed or the output
    /// cannot be written.
    pub fn concat_dir(&self, dir: &Path) -> Result<Option<TreatmentReport>> {
        if !dir.is_dir() {
            return Err(Error::FileNotFound(dir.to_path_buf()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
            })
            .collect();
        files.sort();

        let mut tables = Vec::with_capacity(files.len());
        for file in &files {
            match Table::read(file) {
                Ok(table) => {
                    debug!(file = %file.display(), rows = table.len(), "Read table");
                    tables.push(table);
                }
                Err(err) => warn!(file = %file.display(), error = %err, "Skipping unreadable file"),
            }
        }

        if tables.is_empty() {
            warn!(dir = %dir.display(), "No CSV file processed");
            return Ok(None);
        }

        let input_rows = tables.iter().map(Table::len).sum();
        let merged = Table::concat(&tables);
        let dir_name = dir
            .file_name()
            .map_or_else(|| "dataset".to_string(), |n| n.to_string_lossy().to_string());

        self.finish(
            input_rows,
            &merged,
            format!("[CONCATENATED]-{dir_name}-{}.csv", file_timestamp()),
        )
        .map(Some)
    }

    /// Remove duplicate repositories, keeping the first occurrence.
    ///
    /// Duplicates are judged on the configured columns present in the file;
    /// when none is present, on whole rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or the output written.
    pub fn remove_duplicates(&self, file: &Path) -> Result<TreatmentReport> {
        let mut table = Table::read(file)?;
        let input_rows = table.len();

        let subset: Vec<usize> = self
            .config
            .dedup_columns
            .iter()
            .filter_map(|c| table.column_index(c))
            .collect();
        if subset.is_empty() {
            warn!(
                columns = ?self.config.dedup_columns,
                "No dedup column found, falling back to whole-row duplicates"
            );
        }

        let mut seen = HashSet::new();
        table.retain_rows(|row| {
            let key = if subset.is_empty() {
                fingerprint(row.iter().map(String::as_str))
            } else {
                fingerprint(subset.iter().map(|&i| row[i].as_str()))
            };
            seen.insert(key)
        });

        self.finish(
            input_rows,
            &table,
            format!("[NO-DUPLICATED]_repo-files_{}.csv", file_timestamp()),
        )
    }

    /// Keep rows whose description is detected as English.
    ///
    /// Blank and undetectable descriptions are dropped. A file without the
    /// description column yields an empty table with the same header.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or the output written.
    pub fn filter_english(&self, file: &Path) -> Result<TreatmentReport> {
        let mut table = Table::read(file)?;
        let input_rows = table.len();

        match table.column_index(&self.config.description_column) {
            Some(desc) => table.retain_rows(|row| is_english(&row[desc])),
            None => {
                warn!(
                    column = %self.config.description_column,
                    "Description column not found, writing empty table"
                );
                table.retain_rows(|_| false);
            }
        }

        self.finish(
            input_rows,
            &table,
            format!("[ENGLISH-DESC]_repo-files_{}.csv", file_timestamp()),
        )
    }

    /// Drop rows mentioning an exclusion term.
    ///
    /// The name, description and search terms of each row are searched,
    /// case-insensitively. `term` labels the output file and defaults to the
    /// term encoded in the input file name. Returns `None` when no row is
    /// left.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be read or the output written.
    pub fn filter_exclusion_terms(
        &self,
        file: &Path,
        term: Option<&str>,
    ) -> Result<Option<TreatmentReport>> {
        let mut table = Table::read(file)?;
        let input_rows = table.len();
        let term = term.map_or_else(|| term_from_file_name(file), ToString::to_string);

        let name = table.column_index(NAME_COLUMN);
        let desc = table.column_index(&self.config.description_column);
        let terms = table.column_index(TERMS_COLUMN);
        let exclusions: Vec<String> = self
            .config
            .exclusion_terms
            .iter()
            .map(|t| t.to_lowercase())
            .collect();

        table.retain_rows(|row| {
            let cell = |i: Option<usize>| i.map_or("", |i| row[i].as_str());
            let search_terms: Vec<&str> = cell(terms).split(',').map(str::trim).collect();
            let haystack = format!("{} {} {}", cell(name), cell(desc), search_terms.join(" "))
                .to_lowercase();
            !exclusions.iter().any(|ex| haystack.contains(ex.as_str()))
        });

        if table.is_empty() {
            warn!(input = input_rows, "No repositories left after exclusion filter");
            return Ok(None);
        }

        let mut columns = table.headers().to_vec();
        columns.sort();
        let sorted = table.with_columns(&columns);

        self.finish(
            input_rows,
            &sorted,
            format!("[EXCLUSION-TERM]_{term}_{}.csv", file_timestamp()),
        )
        .map(Some)
    }

    /// Keep active repositories: more stars than `min_stars` and more
    /// commits than `min_commits`. Rows with unparsable counts are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a count column is missing, the input cannot be
    /// read or the output written.
    pub fn filter_activity(&self, file: &Path) -> Result<TreatmentReport> {
        let mut table = Table::read(file)?;
        let input_rows = table.len();
        let stars = table.require_column(STARS_COLUMN)?;
        let commits = table.require_column(COMMITS_COLUMN)?;

        let (min_stars, min_commits) = (self.config.min_stars, self.config.min_commits);
        table.retain_rows(|row| {
            matches!(
                (parse_count(&row[stars]), parse_count(&row[commits])),
                (Some(s), Some(c)) if s > min_stars && c > min_commits
            )
        });

        self.finish(
            input_rows,
            &table,
            format!("[ACTIVE]_repo-files_{}.csv", file_timestamp()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ENGLISH: &str =
        "A lightweight inference engine that runs neural networks on microcontrollers and other small devices";
    const PORTUGUESE: &str =
        "Este projeto implementa um sistema de visão computacional para dispositivos embarcados com baixo consumo de energia";

    fn treatment(dir: &Path) -> Treatment {
        Treatment::new(TreatmentConfig {
            processed_dir: dir.join("processed"),
            ..TreatmentConfig::default()
        })
    }

    fn write_csv(dir: &Path, name: &str, table: &Table) -> PathBuf {
        let path = dir.join(name);
        table.write(&path).unwrap();
        path
    }

    #[test]
    fn test_is_english() {
        assert!(is_english(ENGLISH));
        assert!(!is_english(PORTUGUESE));
        assert!(!is_english("   "));
    }

    #[test]
    fn test_term_from_file_name() {
        assert_eq!(
            term_from_file_name(Path::new("RAW_edge ai_repos_2025-11-12_120501.csv")),
            "edge ai"
        );
        assert_eq!(term_from_file_name(Path::new("/x/plain.csv")), "plain");
    }

    #[test]
    fn test_concat_dir_sorted_union() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw_data");
        let mut b = Table::new(["name", "stars"]);
        b.push_row(["second", "5"]);
        let mut a = Table::new(["name", "lang"]);
        a.push_row(["first", "Rust"]);
        write_csv(&raw, "b.csv", &b);
        write_csv(&raw, "a.csv", &a);
        std::fs::write(raw.join("notes.txt"), "ignored").unwrap();

        let report = treatment(dir.path()).concat_dir(&raw).unwrap().unwrap();
        assert_eq!(report.input_rows, 2);
        let name = report.output_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("[CONCATENATED]-raw_data-"));

        let merged = Table::read(&report.output_path).unwrap();
        assert_eq!(merged.headers(), &["name", "lang", "stars"]);
        assert_eq!(merged.rows()[0], vec!["first", "Rust", ""]);
        assert_eq!(merged.rows()[1], vec!["second", "", "5"]);
    }

    #[test]
    fn test_concat_dir_without_csv() {
        let dir = tempfile::tempdir().unwrap();
        assert!(treatment(dir.path()).concat_dir(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_remove_duplicates_on_subset() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["name", "full_name", "URL", "stars"]);
        table.push_row(["a", "o/a", "u/a", "10"]);
        table.push_row(["a", "o/a", "u/a", "99"]);
        table.push_row(["b", "o/b", "u/b", "10"]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let report = treatment(dir.path()).remove_duplicates(&input).unwrap();
        assert_eq!(report.removed(), 1);
        let out = Table::read(&report.output_path).unwrap();
        assert_eq!(out.value(0, 3), "10");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_remove_duplicates_whole_row_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["repo", "x"]);
        table.push_row(["a", "1"]);
        table.push_row(["a", "1"]);
        table.push_row(["a", "2"]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let report = treatment(dir.path()).remove_duplicates(&input).unwrap();
        assert_eq!(report.output_rows, 2);
    }

    #[test]
    fn test_fingerprint_separates_cells() {
        assert_ne!(fingerprint(["ab", "c"]), fingerprint(["a", "bc"]));
    }

    #[test]
    fn test_filter_english() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["name", "desc."]);
        table.push_row(["en", ENGLISH]);
        table.push_row(["pt", PORTUGUESE]);
        table.push_row(["blank", ""]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let report = treatment(dir.path()).filter_english(&input).unwrap();
        let out = Table::read(&report.output_path).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, 0), "en");
    }

    #[test]
    fn test_filter_english_missing_column_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["name"]);
        table.push_row(["x"]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let report = treatment(dir.path()).filter_english(&input).unwrap();
        let out = Table::read(&report.output_path).unwrap();
        assert_eq!(out.headers(), &["name"]);
        assert!(out.is_empty());
    }

    #[test]
    fn test_filter_exclusion_terms() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["search_term", "name", "desc."]);
        table.push_row(["edge ai", "edge-runtime", "Inference at the edge"]);
        table.push_row(["edge ai", "awesome-edge", "A TUTORIAL on edge AI"]);
        table.push_row(["edge ai, cutting edge", "fast-edge", "Fast inference"]);
        table.push_row(["edge ai", "edge-toys", "Playground"]);
        let input = write_csv(dir.path(), "RAW_edge ai_repos_2025.csv", &table);

        let report = treatment(dir.path())
            .filter_exclusion_terms(&input, None)
            .unwrap()
            .unwrap();
        assert_eq!(report.output_rows, 1);
        let name = report.output_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("[EXCLUSION-TERM]_edge ai_"));

        let out = Table::read(&report.output_path).unwrap();
        assert_eq!(out.headers(), &["desc.", "name", "search_term"]);
        assert_eq!(out.value(0, 1), "edge-runtime");
    }

    #[test]
    fn test_filter_exclusion_terms_nothing_left() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["name", "desc."]);
        table.push_row(["demo-app", ""]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let result = treatment(dir.path())
            .filter_exclusion_terms(&input, Some("edge"))
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_filter_activity() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = Table::new(["name", "stars", "total_commits"]);
        table.push_row(["active", "11", "51"]);
        table.push_row(["few-stars", "10", "500"]);
        table.push_row(["few-commits", "500", "50"]);
        table.push_row(["garbage", "n/a", "100"]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let report = treatment(dir.path()).filter_activity(&input).unwrap();
        let out = Table::read(&report.output_path).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out.value(0, 0), "active");
    }

    #[test]
    fn test_filter_activity_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let table = Table::new(["name", "stars"]);
        let input = write_csv(dir.path(), "in.csv", &table);

        let err = treatment(dir.path()).filter_activity(&input).unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }
}
