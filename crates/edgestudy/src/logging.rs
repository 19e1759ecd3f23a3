//! Logging for edgestudy.
//!
//! Events go to stderr so that tables printed on stdout stay pipeable. A
//! mining run spends hours waiting on the GitHub API, so it can also append
//! a plain-text copy of its events to the file named in `logging.file`.
//! Every term of a run is logged inside a `term` span.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::level_filters::LevelFilter;
use tracing::{info_span, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};
use crate::table::ensure_parent_dir;

/// HTTP and TLS crates capped at `logging.dependency_level`.
const DEPENDENCY_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls"];

/// Level requested by `-q` (errors only) or `-v` / `-vv`, if any.
#[must_use]
pub fn level_from_flags(quiet: bool, verbose: u8) -> Option<LevelFilter> {
    match (quiet, verbose) {
        (true, _) => Some(LevelFilter::ERROR),
        (false, 0) => None,
        (false, 1) => Some(LevelFilter::DEBUG),
        (false, _) => Some(LevelFilter::TRACE),
    }
}

fn parse_level(key: &str, value: &str) -> Result<LevelFilter> {
    value.parse().map_err(|_| Error::ConfigValidation {
        message: format!("{key} is not a log level (got '{value}')"),
    })
}

/// Filter directives used when `RUST_LOG` is unset.
///
/// The command-line level wins over `logging.level`. Dependencies never log
/// more than `logging.dependency_level`, and never more than edgestudy does.
///
/// # Errors
///
/// Returns an error if a configured level does not parse.
pub fn filter_directives(config: &LoggingConfig, cli_level: Option<LevelFilter>) -> Result<String> {
    let own = match cli_level {
        Some(level) => level,
        None => parse_level("logging.level", &config.level)?,
    };
    let dependencies = parse_level("logging.dependency_level", &config.dependency_level)?.min(own);

    let mut directives = vec![format!("edgestudy={own}")];
    directives.extend(
        DEPENDENCY_TARGETS
            .iter()
            .map(|target| format!("{target}={dependencies}")),
    );
    Ok(directives.join(","))
}

/// Install the global subscriber.
///
/// A second call leaves the first subscriber in place.
///
/// # Errors
///
/// Returns an error if a configured level does not parse or the log file
/// cannot be opened.
///
/// # Examples
///
/// ```no_run
/// use edgestudy::config::LoggingConfig;
/// use edgestudy::logging::{init_logging, level_from_flags};
///
/// init_logging(&LoggingConfig::default(), level_from_flags(false, 1)).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig, cli_level: Option<LevelFilter>) -> Result<()> {
    let directives = filter_directives(config, cli_level)?;
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let file_layer = match &config.file {
        Some(path) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(open_log_file(path)?)),
        ),
        None => None,
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();
    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    ensure_parent_dir(path)?;
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Span wrapping everything logged while mining one search term.
///
/// `position` is one-based, so file logs read `term{term="tinyml" n=2 of=5}`.
#[must_use]
pub fn term_span(term: &str, position: usize, of: usize) -> Span {
    info_span!("term", term, n = position, of)
}
