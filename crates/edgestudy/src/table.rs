//! Generic CSV tables.
//!
//! Every research stage exchanges flat CSV files whose columns vary between
//! exports. `Table` keeps cells as strings and looks columns up by header
//! name, which is all the treatment and analysis steps need.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Error, Result};

/// Cell values treated as missing, besides blank cells.
const MISSING_MARKERS: &[&str] = &["NA", "NaN", "nan", "null", "None"];

/// Check whether a cell holds no value.
#[must_use]
pub fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || MISSING_MARKERS.contains(&trimmed)
}

/// Parse a count cell, accepting float renderings such as `12.0`.
#[must_use]
pub fn parse_count(cell: &str) -> Option<u64> {
    let cell = cell.trim();
    cell.parse::<u64>().ok().or_else(|| {
        cell.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .and_then(|v| format!("{v:.0}").parse().ok())
    })
}

/// An in-memory CSV table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    source: Option<PathBuf>,
}

impl Table {
    /// Create an empty table with the given header.
    #[must_use]
    pub fn new<I, S>(headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            source: None,
        }
    }

    /// Read a table from a CSV file.
    ///
    /// Header names are trimmed and a leading byte order mark is dropped.
    /// Short rows are padded and long rows truncated to the header width.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or is not valid CSV.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }

        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        let width = headers.len();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(ToString::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        debug!(path = %path.display(), rows = rows.len(), columns = width, "Loaded table");
        Ok(Self {
            headers,
            rows,
            source: Some(path.to_path_buf()),
        })
    }

    /// Write the table to a CSV file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        ensure_parent_dir(path)?;

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = self.rows.len(), "Wrote table");
        Ok(())
    }

    /// File the table was read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Column names.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut row: Vec<String> = row.into_iter().map(Into::into).collect();
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Index of a column by exact name.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column, failing with [`Error::MissingColumn`] if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the column does not exist.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            Error::missing_column(
                name,
                self.source.clone().unwrap_or_else(|| PathBuf::from("<memory>")),
            )
        })
    }

    /// First column among `candidates` present in the table.
    #[must_use]
    pub fn first_column(&self, candidates: &[&str]) -> Option<usize> {
        candidates.iter().find_map(|c| self.column_index(c))
    }

    /// Cell value of a row by column index; empty when out of range.
    #[must_use]
    pub fn value(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map_or("", String::as_str)
    }

    /// Iterate over the cells of one column.
    pub fn column_values(&self, column: usize) -> impl Iterator<Item = &str> + '_ {
        self.rows
            .iter()
            .map(move |r| r.get(column).map_or("", String::as_str))
    }

    /// Keep only rows for which `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Append a column with one value per row.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of values differs from the row count.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        if values.len() != self.rows.len() {
            return Err(Error::dataset(format!(
                "column has {} values but table has {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.headers.push(name.into());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Return a copy with columns in the given order; unknown names become
    /// empty columns.
    #[must_use]
    pub fn with_columns(&self, names: &[String]) -> Self {
        let indices: Vec<Option<usize>> = names.iter().map(|n| self.column_index(n)).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|i| i.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                    .collect()
            })
            .collect();
        Self {
            headers: names.to_vec(),
            rows,
            source: self.source.clone(),
        }
    }

    /// Concatenate tables vertically.
    ///
    /// The header is the union of all headers in first-seen order; cells of
    /// columns a table lacks are left empty.
    #[must_use]
    pub fn concat(tables: &[Self]) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for table in tables {
            for h in &table.headers {
                if !headers.contains(h) {
                    headers.push(h.clone());
                }
            }
        }

        let mut result = Self::new(headers.clone());
        for table in tables {
            result.rows.extend(table.with_columns(&headers).rows);
        }
        result
    }
}

/// Local timestamp used in output file names, e.g. `2025-11-12_120501`.
#[must_use]
pub fn file_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%d_%H%M%S").to_string()
}

/// Create the parent directory of `path` if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Create a directory and its parents if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|source| Error::DirectoryCreate {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
