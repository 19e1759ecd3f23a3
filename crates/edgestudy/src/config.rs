//! Configuration management for edgestudy.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

use crate::error::{Error, Result};
use crate::github::CommitWindow;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "edgestudy";

/// Default catalog database file name.
const DATABASE_FILE_NAME: &str = "catalog.db";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. `API_TOKEN` / `GITHUB_TOKEN` for the GitHub token
/// 2. Environment variables prefixed with `EDGESTUDY_` (`__` separates sections)
/// 3. TOML config file at `~/.config/edgestudy/config.toml`
/// 4. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Catalog storage configuration.
    pub storage: StorageConfig,
    /// GitHub API client configuration.
    pub github: GithubConfig,
    /// Repository mining configuration.
    pub mining: MiningConfig,
    /// Table treatment configuration.
    pub treatment: TreatmentConfig,
    /// Study dataset layout.
    pub dataset: DatasetConfig,
    /// Analysis configuration.
    pub analysis: AnalysisConfig,
    /// Log levels and the optional log file.
    pub logging: LoggingConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the catalog database.
    /// Defaults to `~/.local/share/edgestudy/catalog.db`
    pub database_path: Option<PathBuf>,
}

/// GitHub API client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    /// Personal access token. Unauthenticated requests work but are heavily
    /// rate limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Base URL of the REST API.
    pub api_url: String,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Results requested per search page (1..=100).
    pub per_page: u32,
    /// Maximum number of unique repositories kept per search term.
    pub max_results: usize,
    /// Maximum number of retries for a single request.
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Pause between search pages in milliseconds.
    pub page_delay_ms: u64,
    /// Pause between search terms in milliseconds.
    pub term_delay_ms: u64,
}

/// Repository mining configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Search terms, each producing one raw table.
    pub search_terms: Vec<String>,
    /// Only repositories with more stars than this are searched.
    pub min_stars: u32,
    /// Only repositories pushed within this many days are searched.
    pub pushed_within_days: u32,
    /// Calendar year used for the windowed commit count.
    pub activity_year: i32,
    /// Directory receiving the raw tables.
    pub output_dir: PathBuf,
    /// Prefix of raw table file names.
    pub file_prefix: String,
}

/// Table treatment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreatmentConfig {
    /// Directory receiving treated tables.
    pub processed_dir: PathBuf,
    /// Columns identifying a duplicate repository row.
    pub dedup_columns: Vec<String>,
    /// Column holding the repository description.
    pub description_column: String,
    /// Rows mentioning any of these terms are excluded.
    pub exclusion_terms: Vec<String>,
    /// Activity filter: stars must be greater than this.
    pub min_stars: u64,
    /// Activity filter: total commits must be greater than this.
    pub min_commits: u64,
}

/// File layout of the coded study dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory holding the study tables.
    pub dir: PathBuf,
    /// Repository table.
    pub repositories_file: String,
    /// Extracted fragments table.
    pub fragments_file: String,
    /// Fragment to code mapping table.
    pub fragment_codes_file: String,
    /// Codes table.
    pub codes_file: String,
    /// Themes table.
    pub themes_file: String,
}

/// Logging configuration.
///
/// `-q` / `-v` override `level`, and `RUST_LOG` overrides both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level of edgestudy's own events.
    pub level: String,
    /// Cap for HTTP and TLS crates, which are chatty at debug.
    pub dependency_level: String,
    /// Plain-text copy of every event, appended across runs.
    pub file: Option<PathBuf>,
}

/// Analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory receiving result tables.
    pub tables_dir: PathBuf,
    /// Documentation columns counted by the coverage analysis.
    pub coverage_columns: Vec<String>,
    /// Raters whose capability mappings are compared.
    pub raters: Vec<String>,
    /// Number of capability slots per repository.
    pub capability_slots: u32,
    /// Column name template for capability mappings.
    pub rater_column_template: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            user_agent: format!("edgestudy/{}", env!("CARGO_PKG_VERSION")),
            per_page: 50,
            max_results: 400,
            max_retries: 5,
            backoff_base: 2.0,
            timeout_secs: 30,
            page_delay_ms: 3_000,
            term_delay_ms: 2_000,
        }
    }
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            search_terms: vec!["edge ai".to_string()],
            min_stars: 10,
            pushed_within_days: 365,
            activity_year: 2024,
            output_dir: PathBuf::from("dataset/raw_data"),
            file_prefix: "RAW_".to_string(),
        }
    }
}

impl Default for TreatmentConfig {
    fn default() -> Self {
        Self {
            processed_dir: PathBuf::from("dataset/processed_data"),
            dedup_columns: vec!["name".to_string(), "full_name".to_string(), "URL".to_string()],
            description_column: "desc.".to_string(),
            exclusion_terms: default_exclusion_terms(),
            min_stars: 10,
            min_commits: 50,
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("dataset/study"),
            repositories_file: "repositories.csv".to_string(),
            fragments_file: "fragments_used.csv".to_string(),
            fragment_codes_file: "fragment_codes.csv".to_string(),
            codes_file: "codes.csv".to_string(),
            themes_file: "themes.csv".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dependency_level: "warn".to_string(),
            file: None,
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            tables_dir: PathBuf::from("results/tables"),
            coverage_columns: default_coverage_columns(),
            raters: Vec::new(),
            capability_slots: 3,
            rater_column_template: "iso_mapping_cap_{slot} - [{rater}]".to_string(),
        }
    }
}

/// Terms marking educational, demo or library repositories.
fn default_exclusion_terms() -> Vec<String> {
    [
        "courses",
        "toy",
        "tutorial",
        "classes",
        "books",
        "book",
        "guidelines",
        "tools",
        "tool",
        "demos",
        "demo",
        "simulator",
        "simulators",
        "class",
        "course",
        "toys",
        "cutting-edge",
        "library",
        "cuttingedge",
        "cutting_edge",
        "cutting edge",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Architecture documentation columns of the study work file.
fn default_coverage_columns() -> Vec<String> {
    [
        "arch_overview",
        "diagrams",
        "adrs",
        "context",
        "deployment",
        "quality_attrs",
        "interface",
        "evaluation",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("EDGESTUDY_").split("__"))
            .merge(
                Env::raw()
                    .only(&["GITHUB_TOKEN"])
                    .map(|_| "github.token".into()),
            )
            .merge(Env::raw().only(&["API_TOKEN"]).map(|_| "github.token".into()));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::ConfigValidation { message });

        if !(1..=100).contains(&self.github.per_page) {
            return invalid(format!(
                "github.per_page must be between 1 and 100 (got {})",
                self.github.per_page
            ));
        }

        if self.github.max_results == 0 {
            return invalid("github.max_results must be greater than 0".to_string());
        }

        if self.github.backoff_base < 1.0 {
            return invalid(format!(
                "github.backoff_base must be at least 1.0 (got {})",
                self.github.backoff_base
            ));
        }

        if self.mining.search_terms.iter().all(|t| t.trim().is_empty()) {
            return invalid("mining.search_terms must contain at least one term".to_string());
        }

        if self.mining.pushed_within_days == 0 {
            return invalid("mining.pushed_within_days must be greater than 0".to_string());
        }

        if self.treatment.exclusion_terms.iter().any(|t| t.trim().is_empty()) {
            return invalid("treatment.exclusion_terms must not contain empty terms".to_string());
        }

        if self.treatment.dedup_columns.is_empty() {
            return invalid("treatment.dedup_columns must name at least one column".to_string());
        }

        if self.analysis.capability_slots == 0 {
            return invalid("analysis.capability_slots must be greater than 0".to_string());
        }

        for (key, value) in [
            ("logging.level", &self.logging.level),
            ("logging.dependency_level", &self.logging.dependency_level),
        ] {
            if value.parse::<LevelFilter>().is_err() {
                return invalid(format!("{key} is not a log level (got '{value}')"));
            }
        }

        Ok(())
    }

    /// Get the catalog database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Earliest push date accepted by the repository search.
    #[must_use]
    pub fn pushed_since(&self, today: NaiveDate) -> NaiveDate {
        today
            .checked_sub_days(Days::new(u64::from(self.mining.pushed_within_days)))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Window of the per-year commit count.
    #[must_use]
    pub fn commit_window(&self) -> CommitWindow {
        CommitWindow::calendar_year(self.mining.activity_year)
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.github.timeout_secs)
    }

    /// Get the pause between search pages as a Duration.
    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.github.page_delay_ms)
    }

    /// Get the pause between search terms as a Duration.
    #[must_use]
    pub fn term_delay(&self) -> Duration {
        Duration::from_millis(self.github.term_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_default_github_config() {
        let github = GithubConfig::default();

        assert!(github.token.is_none());
        assert_eq!(github.api_url, "https://api.github.com");
        assert_eq!(github.per_page, 50);
        assert_eq!(github.max_results, 400);
        assert_eq!(github.max_retries, 5);
        assert!((github.backoff_base - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_mining_config() {
        let mining = MiningConfig::default();

        assert_eq!(mining.search_terms, vec!["edge ai".to_string()]);
        assert_eq!(mining.min_stars, 10);
        assert_eq!(mining.pushed_within_days, 365);
        assert_eq!(mining.activity_year, 2024);
        assert_eq!(mining.file_prefix, "RAW_");
    }

    #[test]
    fn test_default_treatment_config() {
        let treatment = TreatmentConfig::default();

        assert_eq!(treatment.dedup_columns, vec!["name", "full_name", "URL"]);
        assert_eq!(treatment.description_column, "desc.");
        assert!(treatment.exclusion_terms.contains(&"tutorial".to_string()));
        assert!(treatment.exclusion_terms.contains(&"cutting edge".to_string()));
        assert_eq!(treatment.min_stars, 10);
        assert_eq!(treatment.min_commits, 50);
    }

    #[test]
    fn test_default_dataset_config() {
        let dataset = DatasetConfig::default();
        assert_eq!(dataset.fragments_file, "fragments_used.csv");
        assert_eq!(dataset.themes_file, "themes.csv");
    }

    #[test]
    fn test_validate_rejects_unknown_log_level() {
        let mut config = Config::default();
        config.logging.dependency_level = "loud".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.dependency_level"));
    }

    #[test]
    fn test_load_logging_section_from_env() {
        Jail::expect_with(|jail| {
            jail.set_env("EDGESTUDY_LOGGING__LEVEL", "debug");
            jail.set_env("EDGESTUDY_LOGGING__FILE", "mining.log");

            let config = Config::load_from(Some(PathBuf::from("missing.toml")))
                .expect("config should load");
            assert_eq!(config.logging.level, "debug");
            assert_eq!(config.logging.file, Some(PathBuf::from("mining.log")));
            Ok(())
        });
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_per_page_out_of_range() {
        let mut config = Config::default();
        config.github.per_page = 101;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("per_page"));

        config.github.per_page = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_max_results() {
        let mut config = Config::default();
        config.github.max_results = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("max_results"));
    }

    #[test]
    fn test_validate_backoff_below_one() {
        let mut config = Config::default();
        config.github.backoff_base = 0.5;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("backoff_base"));
    }

    #[test]
    fn test_validate_blank_search_terms() {
        let mut config = Config::default();
        config.mining.search_terms = vec!["  ".to_string()];

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("search_terms"));
    }

    #[test]
    fn test_validate_empty_exclusion_term() {
        let mut config = Config::default();
        config.treatment.exclusion_terms.push(String::new());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("exclusion_terms"));
    }

    #[test]
    fn test_validate_empty_dedup_columns() {
        let mut config = Config::default();
        config.treatment.dedup_columns.clear();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("catalog.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/custom/catalog.sqlite"));

        assert_eq!(config.database_path(), PathBuf::from("/custom/catalog.sqlite"));
    }

    #[test]
    fn test_pushed_since() {
        let config = Config::default();
        let today = NaiveDate::from_ymd_opt(2025, 11, 12).unwrap();

        assert_eq!(
            config.pushed_since(today),
            NaiveDate::from_ymd_opt(2024, 11, 12).unwrap()
        );
    }

    #[test]
    fn test_commit_window_uses_activity_year() {
        let mut config = Config::default();
        config.mining.activity_year = 2023;

        let window = config.commit_window();
        assert_eq!(window.since_param().as_deref(), Some("2023-01-01T00:00:00Z"));
        assert_eq!(window.until_param().as_deref(), Some("2023-12-31T23:59:59Z"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.page_delay(), Duration::from_secs(3));
        assert_eq!(config.term_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("edgestudy"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        Jail::expect_with(|_jail| {
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .expect("defaults should load");
            assert_eq!(config.github.per_page, 50);
            Ok(())
        });
    }

    #[test]
    fn test_load_from_toml_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [github]
                per_page = 100

                [mining]
                search_terms = ["tinyml", "edge tpu"]
                "#,
            )?;
            jail.set_env("EDGESTUDY_MINING__MIN_STARS", "25");
            jail.set_env("API_TOKEN", "ghp_test");

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .expect("config should load");
            assert_eq!(config.github.per_page, 100);
            assert_eq!(config.mining.search_terms, vec!["tinyml", "edge tpu"]);
            assert_eq!(config.mining.min_stars, 25);
            assert_eq!(config.github.token.as_deref(), Some("ghp_test"));
            Ok(())
        });
    }

    #[test]
    fn test_api_token_wins_over_github_token() {
        Jail::expect_with(|jail| {
            jail.set_env("GITHUB_TOKEN", "from_github");
            jail.set_env("API_TOKEN", "from_api");

            let config = Config::load_from(Some(PathBuf::from("missing.toml")))
                .expect("config should load");
            assert_eq!(config.github.token.as_deref(), Some("from_api"));
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[github]\nper_page = 500\n")?;
            let result = Config::load_from(Some(PathBuf::from("config.toml")));
            assert!(matches!(result, Err(Error::ConfigValidation { .. })));
            Ok(())
        });
    }

    #[test]
    fn test_token_not_serialized_when_absent() {
        let json = serde_json::to_string(&GithubConfig::default()).unwrap();
        assert!(!json.contains("token"));
    }
}
