//! Repository catalog.
//!
//! A `SQLite` database that accumulates every repository the miner has seen,
//! the search terms that found it, and its cached activity counts.

pub mod migrations;
pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::github::CommitWindow;
use crate::model::{raw_table_header, raw_table_row, Activity, RepositoryOwner, RepositoryRecord};
use crate::table::{ensure_parent_dir, Table};

/// Separator used when aggregating terms in SQL.
const TERM_SEPARATOR: char = '\u{1f}';

/// Columns selected for a [`RepositoryRecord`], in `row_to_record` order.
const RECORD_COLUMNS: &str = r"
    r.github_id, r.name, r.full_name, r.owner, r.html_url, r.description, r.pushed_at,
    r.stars, r.fork, r.forks, r.language, r.size, r.score, r.is_template, r.archived,
    r.disabled, r.contributors_url, r.collaborators_url,
    r.total_commits, r.window_commits, r.contributors,
    (SELECT group_concat(t.term, char(31)) FROM repository_terms t WHERE t.github_id = r.github_id)
";

/// Catalog of mined repositories.
#[derive(Debug)]
pub struct Storage {
    /// Path to the database file.
    path: PathBuf,
    /// Database connection.
    conn: Connection,
}

impl Storage {
    /// Open or create the catalog at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        ensure_parent_dir(&path)?;

        debug!("Opening catalog at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        migrations::initialize_schema(&conn)?;

        info!("Catalog opened at {}", path.display());
        Ok(Self { path, conn })
    }

    /// Open a throwaway in-memory catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        migrations::initialize_schema(&conn)?;

        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn,
        })
    }

    /// Get the path to the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or refresh a repository and merge its search terms.
    ///
    /// Cached activity and the first-seen date survive the update. Returns
    /// `true` if the repository was not in the catalog before.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn upsert_repository(&self, record: &RepositoryRecord) -> Result<bool> {
        let id = to_sql_int(record.id);
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;

        let existed = tx
            .query_row(
                "SELECT 1 FROM repositories WHERE github_id = ?1",
                [id],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            r"
            INSERT INTO repositories (
                github_id, name, full_name, owner, html_url, description, pushed_at,
                stars, fork, forks, language, size, score, is_template, archived, disabled,
                contributors_url, collaborators_url, first_seen, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
            ON CONFLICT(github_id) DO UPDATE SET
                name = excluded.name,
                full_name = excluded.full_name,
                owner = excluded.owner,
                html_url = excluded.html_url,
                description = excluded.description,
                pushed_at = excluded.pushed_at,
                stars = excluded.stars,
                fork = excluded.fork,
                forks = excluded.forks,
                language = excluded.language,
                size = excluded.size,
                score = excluded.score,
                is_template = excluded.is_template,
                archived = excluded.archived,
                disabled = excluded.disabled,
                contributors_url = excluded.contributors_url,
                collaborators_url = excluded.collaborators_url,
                updated_at = excluded.updated_at
            ",
            params![
                id,
                record.name,
                record.full_name,
                record.owner_login(),
                record.html_url,
                record.description,
                record.pushed_at,
                to_sql_int(record.stargazers_count),
                record.fork,
                to_sql_int(record.forks),
                record.language,
                to_sql_int(record.size),
                record.score,
                record.is_template,
                record.archived,
                record.disabled,
                record.contributors_url,
                record.collaborators_url,
                now,
            ],
        )?;

        for term in &record.search_terms {
            tx.execute(
                "INSERT OR IGNORE INTO repository_terms (github_id, term) VALUES (?1, ?2)",
                params![id, term],
            )?;
        }
        tx.commit()?;

        debug!(full_name = %record.full_name, new = !existed, "Upserted repository");
        Ok(!existed)
    }

    /// Get a repository by GitHub id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn get(&self, id: u64) -> Result<Option<RepositoryRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM repositories r WHERE r.github_id = ?1");
        let record = self
            .conn
            .query_row(&sql, [to_sql_int(id)], Self::row_to_record)
            .optional()?;
        Ok(record)
    }

    /// List repositories by stars, most starred first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<RepositoryRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM repositories r ORDER BY r.stars DESC, r.full_name ASC LIMIT ?1"
        );
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map([limit], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Count repositories in the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn count(&self) -> Result<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM repositories", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Activity counted earlier for the same push and window.
    ///
    /// Returns `None` when nothing is cached, when the repository was pushed
    /// since, or when the counts were taken for another window.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn cached_activity(
        &self,
        id: u64,
        pushed_at: Option<&str>,
        window: &CommitWindow,
    ) -> Result<Option<Activity>> {
        let Some(pushed_at) = pushed_at else {
            return Ok(None);
        };

        let row: Option<(i64, i64, i64)> = self
            .conn
            .query_row(
                r"
                SELECT total_commits, window_commits, contributors FROM repositories
                WHERE github_id = ?1 AND activity_pushed_at = ?2 AND activity_window = ?3
                  AND total_commits IS NOT NULL
                ",
                params![to_sql_int(id), pushed_at, window_key(window)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map(|(total, windowed, contributors)| Activity {
            total_commits: from_sql_int(total),
            window_commits: from_sql_int(windowed),
            contributors: from_sql_int(contributors),
        }))
    }

    /// Store activity counts taken at `pushed_at` for `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository is unknown or the update fails.
    pub fn record_activity(
        &self,
        id: u64,
        pushed_at: Option<&str>,
        window: &CommitWindow,
        activity: &Activity,
    ) -> Result<()> {
        let affected = self.conn.execute(
            r"
            UPDATE repositories SET
                total_commits = ?2, window_commits = ?3, contributors = ?4,
                activity_pushed_at = ?5, activity_window = ?6
            WHERE github_id = ?1
            ",
            params![
                to_sql_int(id),
                to_sql_int(activity.total_commits),
                to_sql_int(activity.window_commits),
                to_sql_int(activity.contributors),
                pushed_at,
                window_key(window),
            ],
        )?;

        if affected == 0 {
            return Err(Error::internal(format!(
                "cannot record activity for unknown repository {id}"
            )));
        }
        Ok(())
    }

    /// Get catalog statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    pub fn stats(&self) -> Result<CatalogStats> {
        let total_repositories = self.count()?;
        let distinct_terms: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT term) FROM repository_terms",
            [],
            |row| row.get(0),
        )?;
        let with_activity: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM repositories WHERE total_commits IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let (oldest, newest): (Option<String>, Option<String>) = self.conn.query_row(
            "SELECT MIN(first_seen), MAX(first_seen) FROM repositories",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let parse = |s: Option<String>| {
            s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        let db_size_bytes = if self.path.to_string_lossy() == ":memory:" {
            0
        } else {
            std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
        };

        Ok(CatalogStats {
            total_repositories,
            distinct_terms,
            with_activity,
            oldest_first_seen: parse(oldest),
            newest_first_seen: parse(newest),
            db_size_bytes,
        })
    }

    /// Export the whole catalog as a raw mining table.
    ///
    /// Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or the file write fails.
    pub fn export_csv(&self, path: impl AsRef<Path>, activity_year: i32) -> Result<usize> {
        let mut table = Table::new(raw_table_header(activity_year));
        for record in self.list(None)? {
            table.push_row(raw_table_row(&record));
        }
        table.write(path.as_ref())?;

        info!(rows = table.len(), path = %path.as_ref().display(), "Exported catalog");
        Ok(table.len())
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<RepositoryRecord> {
        let total_commits: Option<i64> = row.get(18)?;
        let window_commits: Option<i64> = row.get(19)?;
        let contributors: Option<i64> = row.get(20)?;
        let terms: Option<String> = row.get(21)?;

        let mut search_terms: Vec<String> = terms
            .unwrap_or_default()
            .split(TERM_SEPARATOR)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect();
        search_terms.sort();

        Ok(RepositoryRecord {
            id: from_sql_int(row.get(0)?),
            name: row.get(1)?,
            full_name: row.get(2)?,
            owner: RepositoryOwner { login: row.get(3)? },
            html_url: row.get(4)?,
            description: row.get(5)?,
            pushed_at: row.get(6)?,
            stargazers_count: from_sql_int(row.get(7)?),
            fork: row.get(8)?,
            forks: from_sql_int(row.get(9)?),
            language: row.get(10)?,
            size: from_sql_int(row.get(11)?),
            score: row.get(12)?,
            is_template: row.get(13)?,
            archived: row.get(14)?,
            disabled: row.get(15)?,
            contributors_url: row.get(16)?,
            collaborators_url: row.get(17)?,
            activity: total_commits.map(|total| Activity {
                total_commits: from_sql_int(total),
                window_commits: window_commits.map_or(0, from_sql_int),
                contributors: contributors.map_or(0, from_sql_int),
            }),
            search_terms,
        })
    }
}

/// Statistics about the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    /// Number of repositories.
    pub total_repositories: i64,
    /// Number of distinct search terms.
    pub distinct_terms: i64,
    /// Repositories with cached activity counts.
    pub with_activity: i64,
    /// First-seen date of the earliest repository.
    pub oldest_first_seen: Option<DateTime<Utc>>,
    /// First-seen date of the latest repository.
    pub newest_first_seen: Option<DateTime<Utc>>,
    /// Size of the database file in bytes.
    pub db_size_bytes: u64,
}

fn window_key(window: &CommitWindow) -> String {
    format!(
        "{}..{}",
        window.since_param().unwrap_or_default(),
        window.until_param().unwrap_or_default()
    )
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
