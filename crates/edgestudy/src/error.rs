//! Error types for edgestudy.
//!
//! This module defines all error types used throughout the edgestudy crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for edgestudy operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the catalog database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === GitHub Errors ===
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The GitHub API answered with a non-success status.
    #[error("GitHub API error ({status}) for {url}: {message}")]
    GithubApi {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
        /// Truncated response body.
        message: String,
    },

    /// The retry budget was exhausted while the API kept rate limiting.
    #[error("rate limited by GitHub after {attempts} attempts")]
    RateLimited {
        /// Number of attempts made.
        attempts: u32,
    },

    /// A GitHub response did not have the expected shape.
    #[error("unexpected GitHub response: {0}")]
    GithubResponse(String),

    // === Dataset Errors ===
    /// Reading or writing a CSV table failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required input file does not exist.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// A required column is missing from a table.
    #[error("column '{column}' not found in {}", path.display())]
    MissingColumn {
        /// Name of the missing column.
        column: String,
        /// Table the column was looked up in.
        path: PathBuf,
    },

    /// A dataset table is malformed.
    #[error("dataset error: {0}")]
    Dataset(String),

    // === Analysis Errors ===
    /// An analysis could not be computed from its input.
    #[error("analysis error: {0}")]
    Analysis(String),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for edgestudy operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new dataset error.
    #[must_use]
    pub fn dataset(message: impl Into<String>) -> Self {
        Self::Dataset(message.into())
    }

    /// Create a new analysis error.
    #[must_use]
    pub fn analysis(message: impl Into<String>) -> Self {
        Self::Analysis(message.into())
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a missing column error.
    #[must_use]
    pub fn missing_column(column: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            path: path.into(),
        }
    }

    /// Check if this error means GitHub refused the request for rate reasons.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        match self {
            Self::RateLimited { .. } => true,
            Self::GithubApi {
                status, message, ..
            } => *status == 429 || (*status == 403 && message.to_lowercase().contains("rate limit")),
            _ => false,
        }
    }

    /// Check if retrying the same request could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::GithubApi { status, .. } => *status >= 500 || matches!(*status, 403 | 429),
            Self::Http(err) => err.is_timeout() || err.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::dataset("duplicate header");
        assert_eq!(err.to_string(), "dataset error: duplicate header");

        let err = Error::analysis("empty input");
        assert_eq!(err.to_string(), "analysis error: empty input");
    }

    #[test]
    fn test_github_api_error_display() {
        let err = Error::GithubApi {
            status: 422,
            url: "https://api.github.com/search/repositories".to_string(),
            message: "Validation Failed".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("search/repositories"));
        assert!(msg.contains("Validation Failed"));
    }

    #[test]
    fn test_is_rate_limited() {
        assert!(Error::RateLimited { attempts: 6 }.is_rate_limited());
        let forbidden = Error::GithubApi {
            status: 403,
            url: String::new(),
            message: "API rate limit exceeded for user".to_string(),
        };
        assert!(forbidden.is_rate_limited());
        let plain_forbidden = Error::GithubApi {
            status: 403,
            url: String::new(),
            message: "Resource not accessible".to_string(),
        };
        assert!(!plain_forbidden.is_rate_limited());
        assert!(!Error::internal("x").is_rate_limited());
    }

    #[test]
    fn test_is_retryable() {
        let server = Error::GithubApi {
            status: 502,
            url: String::new(),
            message: String::new(),
        };
        assert!(server.is_retryable());
        let not_found = Error::GithubApi {
            status: 404,
            url: String::new(),
            message: String::new(),
        };
        assert!(!not_found.is_retryable());
        assert!(!Error::dataset("x").is_retryable());
    }

    #[test]
    fn test_missing_column_display() {
        let err = Error::missing_column("desc.", "/tmp/repos.csv");
        let msg = err.to_string();
        assert!(msg.contains("desc."));
        assert!(msg.contains("/tmp/repos.csv"));
    }

    #[test]
    fn test_file_not_found_display() {
        let err = Error::FileNotFound(PathBuf::from("/data/missing.csv"));
        assert_eq!(err.to_string(), "file not found: /data/missing.csv");
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_database_migration_error_display() {
        let err = Error::DatabaseMigration {
            message: "version mismatch".to_string(),
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "per_page must be between 1 and 100".to_string(),
        };
        assert!(err.to_string().contains("per_page"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
