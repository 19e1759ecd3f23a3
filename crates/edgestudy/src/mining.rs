//! Repository mining.
//!
//! For every search term the miner pages through the GitHub search API,
//! gathers activity counts for each hit and writes one raw table. Requests
//! are sent one at a time with pauses between pages and terms.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, warn, Instrument};

use crate::config::Config;
use crate::error::Result;
use crate::github::{CommitWindow, RepositorySource};
use crate::logging::term_span;
use crate::model::{raw_table_header, raw_table_row, Activity, RepositoryRecord};
use crate::storage::Storage;
use crate::table::{file_timestamp, Table};

/// Build the repository search query for a term.
///
/// ```
/// use chrono::NaiveDate;
/// use edgestudy::mining::build_query;
///
/// let since = NaiveDate::from_ymd_opt(2024, 11, 12).unwrap();
/// assert_eq!(
///     build_query("edge ai", since, 10),
///     "edge ai in:name,description,topics pushed:>2024-11-12 stars:>10"
/// );
/// ```
#[must_use]
pub fn build_query(term: &str, pushed_since: NaiveDate, min_stars: u32) -> String {
    format!(
        "{} in:name,description,topics pushed:>{} stars:>{min_stars}",
        term.trim(),
        pushed_since.format("%Y-%m-%d")
    )
}

/// Settings of a mining run.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningOptions {
    /// Results requested per search page.
    pub per_page: u32,
    /// Unique repositories kept per term.
    pub max_results: usize,
    /// Minimum star count (exclusive).
    pub min_stars: u32,
    /// Earliest accepted push date (exclusive).
    pub pushed_since: NaiveDate,
    /// Window of the per-year commit count.
    pub window: CommitWindow,
    /// Year named in the windowed commit column.
    pub activity_year: i32,
    /// Directory receiving raw tables.
    pub output_dir: PathBuf,
    /// Prefix of raw table file names.
    pub file_prefix: String,
    /// Pause between search pages.
    pub page_delay: Duration,
    /// Pause between terms.
    pub term_delay: Duration,
    /// Search only; skip enrichment and output.
    pub dry_run: bool,
}

impl MiningOptions {
    /// Derive options from configuration, relative to `today`.
    #[must_use]
    pub fn from_config(config: &Config, today: NaiveDate) -> Self {
        Self {
            per_page: config.github.per_page,
            max_results: config.github.max_results,
            min_stars: config.mining.min_stars,
            pushed_since: config.pushed_since(today),
            window: config.commit_window(),
            activity_year: config.mining.activity_year,
            output_dir: config.mining.output_dir.clone(),
            file_prefix: config.mining.file_prefix.clone(),
            page_delay: config.page_delay(),
            term_delay: config.term_delay(),
            dry_run: false,
        }
    }
}

/// Outcome of mining one term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermReport {
    /// The search term.
    pub term: String,
    /// Unique repositories found.
    pub found: usize,
    /// Repositories not previously in the catalog.
    pub new_in_catalog: usize,
    /// Raw table written, if any.
    pub output_path: Option<PathBuf>,
}

/// Drives searches and enrichment against a [`RepositorySource`].
#[derive(Debug)]
pub struct Miner<'a, S> {
    source: &'a S,
    catalog: Option<&'a Storage>,
    options: MiningOptions,
}

impl<'a, S: RepositorySource> Miner<'a, S> {
    /// Create a miner without a catalog.
    #[must_use]
    pub fn new(source: &'a S, options: MiningOptions) -> Self {
        Self {
            source,
            catalog: None,
            options,
        }
    }

    /// Record results in `catalog` and reuse its cached activity.
    #[must_use]
    pub fn with_catalog(mut self, catalog: &'a Storage) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Options of this miner.
    #[must_use]
    pub fn options(&self) -> &MiningOptions {
        &self.options
    }

    /// Search one term, most starred first, de-duplicated by GitHub id.
    ///
    /// Paging stops at `max_results` unique repositories, on an empty page,
    /// or on a page shorter than `per_page`.
    ///
    /// # Errors
    ///
    /// Returns an error if a search request fails.
    pub async fn search(&self, term: &str) -> Result<Vec<RepositoryRecord>> {
        let query = build_query(term, self.options.pushed_since, self.options.min_stars);
        let per_page = self.options.per_page;
        let mut seen = HashSet::new();
        let mut repositories = Vec::new();
        let mut page = 1u32;

        info!(term, %query, "Searching repositories");

        while repositories.len() < self.options.max_results {
            let result = self.source.search_page(&query, page, per_page).await?;
            if result.incomplete_results {
                warn!(term, page, "GitHub reported incomplete search results");
            }

            let items = result.items;
            if items.is_empty() {
                info!(term, page, "No more results");
                break;
            }

            let page_len = items.len();
            let mut added = 0;
            for mut repo in items {
                if seen.insert(repo.id) {
                    repo.add_search_term(term);
                    repositories.push(repo);
                    added += 1;
                    if repositories.len() >= self.options.max_results {
                        break;
                    }
                }
            }

            info!(
                term,
                page,
                items = page_len,
                added,
                total = repositories.len(),
                "Fetched search page"
            );

            if page_len < per_page as usize {
                debug!(term, page, "Reached last page");
                break;
            }

            page += 1;
            tokio::time::sleep(self.options.page_delay).await;
        }

        repositories.truncate(self.options.max_results);
        Ok(repositories)
    }

    /// Fill in activity counts for a repository.
    ///
    /// Counts cached in the catalog for the same `pushed_at` are reused. A
    /// failing count is logged and recorded as 0; only complete counts are
    /// cached. With a catalog, the record must already have been upserted.
    ///
    /// # Errors
    ///
    /// Returns an error only if the catalog cannot be read or written.
    pub async fn enrich(&self, record: &mut RepositoryRecord) -> Result<()> {
        let window = &self.options.window;
        if let Some(catalog) = self.catalog {
            if let Some(cached) =
                catalog.cached_activity(record.id, record.pushed_at.as_deref(), window)?
            {
                debug!(full_name = %record.full_name, "Using cached activity");
                record.activity = Some(cached);
                return Ok(());
            }
        }

        let owner = record.owner_login().to_string();
        let name = record.name.clone();
        let mut complete = true;
        let mut count = |result: Result<u64>, what: &str| match result {
            Ok(n) => n,
            Err(err) => {
                warn!(repo = %format!("{owner}/{name}"), error = %err, "Failed to count {what}");
                complete = false;
                0
            }
        };

        let total = self
            .source
            .count_commits(record.owner_login(), &record.name, &CommitWindow::all())
            .await;
        let total_commits = count(total, "commits");
        let windowed = self
            .source
            .count_commits(record.owner_login(), &record.name, window)
            .await;
        let window_commits = count(windowed, "windowed commits");
        let contributors = self
            .source
            .count_contributors(record.owner_login(), &record.name)
            .await;
        let contributors = count(contributors, "contributors");

        let activity = Activity {
            total_commits,
            window_commits,
            contributors,
        };
        record.activity = Some(activity);

        if complete {
            if let Some(catalog) = self.catalog {
                catalog.record_activity(record.id, record.pushed_at.as_deref(), window, &activity)?;
            }
        }
        Ok(())
    }

    /// Mine one term and write its raw table.
    ///
    /// Nothing is written when the search finds no repositories or in a dry
    /// run.
    ///
    /// # Errors
    ///
    /// Returns an error if the search, the catalog or the file write fails.
    pub async fn run_term(&self, term: &str) -> Result<TermReport> {
        let mut repositories = self.search(term).await?;
        let mut report = TermReport {
            term: term.to_string(),
            found: repositories.len(),
            new_in_catalog: 0,
            output_path: None,
        };

        if repositories.is_empty() {
            warn!(term, "No repositories found");
            return Ok(report);
        }
        if self.options.dry_run {
            info!(term, found = report.found, "Dry run, skipping enrichment");
            return Ok(report);
        }

        let total = repositories.len();
        for (index, repo) in repositories.iter_mut().enumerate() {
            if let Some(catalog) = self.catalog {
                if catalog.upsert_repository(repo)? {
                    report.new_in_catalog += 1;
                }
            }
            debug!(term, progress = %format!("{}/{total}", index + 1), full_name = %repo.full_name, "Enriching");
            self.enrich(repo).await?;
        }

        let mut table = Table::new(raw_table_header(self.options.activity_year));
        for repo in &repositories {
            table.push_row(raw_table_row(repo));
        }

        let path = self.options.output_dir.join(format!(
            "{}{}_repos_{}.csv",
            self.options.file_prefix,
            file_name_safe(term),
            file_timestamp()
        ));
        table.write(&path)?;
        info!(term, rows = table.len(), path = %path.display(), "Raw table written");

        report.output_path = Some(path);
        Ok(report)
    }

    /// Mine every term in order, pausing between terms.
    ///
    /// # Errors
    ///
    /// Returns the first error of any term.
    pub async fn run(&self, terms: &[String]) -> Result<Vec<TermReport>> {
        let terms: Vec<&str> = terms
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();

        let mut reports = Vec::with_capacity(terms.len());
        for (index, term) in terms.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.options.term_delay).await;
            }
            let span = term_span(term, index + 1, terms.len());
            reports.push(self.run_term(term).instrument(span).await?);
        }
        Ok(reports)
    }
}

/// Replace path separators so a term can be part of a file name.
fn file_name_safe(term: &str) -> String {
    term.trim().replace(['/', '\\'], "-")
}
