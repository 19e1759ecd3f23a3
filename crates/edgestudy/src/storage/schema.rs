//! `SQLite` schema of the repository catalog.
//!
//! The catalog remembers every repository seen by any search term, so a
//! repository found again later keeps its first-seen date and the activity
//! counts already paid for in API calls.

/// Repositories, keyed by GitHub id.
pub const CREATE_REPOSITORIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS repositories (
    github_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    full_name TEXT NOT NULL,
    owner TEXT NOT NULL,
    html_url TEXT NOT NULL,
    description TEXT,
    pushed_at TEXT,
    stars INTEGER NOT NULL DEFAULT 0,
    fork INTEGER NOT NULL DEFAULT 0,
    forks INTEGER NOT NULL DEFAULT 0,
    language TEXT,
    size INTEGER NOT NULL DEFAULT 0,
    score REAL NOT NULL DEFAULT 0,
    is_template INTEGER NOT NULL DEFAULT 0,
    archived INTEGER NOT NULL DEFAULT 0,
    disabled INTEGER NOT NULL DEFAULT 0,
    contributors_url TEXT NOT NULL DEFAULT '',
    collaborators_url TEXT NOT NULL DEFAULT '',
    total_commits INTEGER,
    window_commits INTEGER,
    contributors INTEGER,
    activity_pushed_at TEXT,
    activity_window TEXT,
    first_seen TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
";

/// Stars ordering for listings.
pub const CREATE_STARS_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_repositories_stars ON repositories(stars DESC)
";

/// Search terms that found each repository.
pub const CREATE_TERMS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS repository_terms (
    github_id INTEGER NOT NULL REFERENCES repositories(github_id) ON DELETE CASCADE,
    term TEXT NOT NULL,
    PRIMARY KEY (github_id, term)
)
";

/// Lookup of repositories by term.
pub const CREATE_TERM_INDEX: &str = r"
CREATE INDEX IF NOT EXISTS idx_repository_terms_term ON repository_terms(term)
";

/// Key-value pairs such as the schema version.
pub const CREATE_METADATA_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
";

/// All schema creation statements in order.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    CREATE_REPOSITORIES_TABLE,
    CREATE_STARS_INDEX,
    CREATE_TERMS_TABLE,
    CREATE_TERM_INDEX,
    CREATE_METADATA_TABLE,
];
