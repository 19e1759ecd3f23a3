//! Core record types for edgestudy.
//!
//! Repository records come from the GitHub search API during mining. The
//! study entities (fragments, codes, themes) are exported from the
//! qualitative coding tool and only ever read.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::table::{is_missing, parse_count};

/// Owner of a GitHub repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOwner {
    /// Login of the owning user or organization.
    pub login: String,
}

/// Activity metrics gathered for a repository after the search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    /// Commits on the default branch.
    pub total_commits: u64,
    /// Commits inside the configured commit window.
    pub window_commits: u64,
    /// Number of contributors reported by the API.
    pub contributors: u64,
}

/// A candidate repository as returned by the GitHub search API.
///
/// Field names follow the API so search items deserialize directly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryRecord {
    /// GitHub numeric id.
    pub id: u64,
    /// Repository name.
    pub name: String,
    /// `owner/name`.
    pub full_name: String,
    /// Owner of the repository.
    pub owner: RepositoryOwner,
    /// Browser URL.
    pub html_url: String,
    /// Free-text description.
    pub description: Option<String>,
    /// Timestamp of the last push (RFC 3339).
    pub pushed_at: Option<String>,
    /// Star count.
    pub stargazers_count: u64,
    /// Whether the repository is a fork.
    pub fork: bool,
    /// Fork count.
    pub forks: u64,
    /// Primary language.
    pub language: Option<String>,
    /// Size in kilobytes.
    pub size: u64,
    /// Search relevance score.
    pub score: f64,
    /// Whether the repository is a template.
    pub is_template: bool,
    /// Whether the repository is archived.
    pub archived: bool,
    /// Whether the repository is disabled.
    pub disabled: bool,
    /// API URL of the contributors listing.
    pub contributors_url: String,
    /// API URL template of the collaborators listing.
    pub collaborators_url: String,
    /// Activity metrics, once gathered.
    #[serde(skip)]
    pub activity: Option<Activity>,
    /// Search terms that found this repository.
    #[serde(skip)]
    pub search_terms: Vec<String>,
}

impl RepositoryRecord {
    /// Login of the owner, falling back to the `full_name` prefix.
    #[must_use]
    pub fn owner_login(&self) -> &str {
        if self.owner.login.is_empty() {
            self.full_name.split('/').next().unwrap_or_default()
        } else {
            &self.owner.login
        }
    }

    /// Add a search term unless it is already recorded.
    pub fn add_search_term(&mut self, term: &str) {
        if !self.search_terms.iter().any(|t| t == term) {
            self.search_terms.push(term.to_string());
        }
    }
}

/// Header of a raw mining table.
///
/// The windowed commit column is named after the configured year.
#[must_use]
pub fn raw_table_header(activity_year: i32) -> Vec<String> {
    let window_column = format!("commits_{activity_year}");
    [
        "name",
        "full_name",
        "URL",
        "desc.",
        "total_commits",
        "last_commit",
        window_column.as_str(),
        "stars",
        "fork",
        "forks",
        "lang",
        "size",
        "score",
        "template",
        "archived",
        "disabled",
        "contributors_url",
        "collaborators_url",
        "contributors",
        "search_term",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

/// Render a record as a raw mining table row matching [`raw_table_header`].
#[must_use]
pub fn raw_table_row(record: &RepositoryRecord) -> Vec<String> {
    let activity = record.activity.unwrap_or_default();
    vec![
        record.name.clone(),
        record.full_name.clone(),
        record.html_url.clone(),
        record.description.clone().unwrap_or_default(),
        activity.total_commits.to_string(),
        record.pushed_at.clone().unwrap_or_default(),
        activity.window_commits.to_string(),
        record.stargazers_count.to_string(),
        bool_cell(record.fork),
        record.forks.to_string(),
        record.language.clone().unwrap_or_default(),
        record.size.to_string(),
        record.score.to_string(),
        bool_cell(record.is_template),
        bool_cell(record.archived),
        bool_cell(record.disabled),
        record.contributors_url.clone(),
        record.collaborators_url.clone(),
        activity.contributors.to_string(),
        record.search_terms.join(", "),
    ]
}

fn bool_cell(value: bool) -> String {
    if value { "True" } else { "False" }.to_string()
}

/// A repository included in the coded study.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRepository {
    /// Study identifier.
    pub repo_id: String,
    /// Repository name.
    #[serde(default)]
    pub name: String,
    /// Repository URL.
    #[serde(default, rename = "URL", alias = "url")]
    pub url: String,
    /// Application domain(s), comma separated.
    #[serde(default)]
    pub domain: String,
    /// Architectural layer classification.
    #[serde(default)]
    pub architectural_layer: String,
}

/// A documentation excerpt identified as architecturally relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Fragment identifier.
    pub fragment_id: String,
    /// Repository the fragment was extracted from.
    #[serde(default)]
    pub repo_id: String,
    /// Path of the source document inside the repository.
    #[serde(default)]
    pub source_path: String,
    /// The excerpt itself.
    #[serde(default)]
    pub text: String,
    /// ISO/IEC 25010 quality attribute(s) the fragment maps to.
    #[serde(default)]
    pub quality_attribute: String,
}

/// Assignment of a code to a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentCode {
    /// Coded fragment.
    pub fragment_id: String,
    /// Applied code.
    pub code_id: String,
}

/// A conceptual label applied during open coding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Code {
    /// Code identifier.
    pub code_id: String,
    /// Short label.
    #[serde(default)]
    pub label: String,
    /// Occurrence count reported by the coding tool. Spreadsheet renderings
    /// such as `2.0` are accepted.
    #[serde(default, deserialize_with = "lenient_count")]
    pub occurrences: Option<u32>,
    /// Theme the code belongs to.
    #[serde(default, alias = "theme_ID")]
    pub theme_id: String,
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(cell) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if is_missing(&cell) {
        return Ok(None);
    }
    parse_count(&cell)
        .and_then(|count| u32::try_from(count).ok())
        .map(Some)
        .ok_or_else(|| D::Error::custom(format!("invalid occurrence count '{}'", cell.trim())))
}

/// A group of codes representing an architectural guideline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Theme {
    /// Theme identifier.
    #[serde(alias = "theme_ID")]
    pub theme_id: String,
    /// Theme name.
    #[serde(default)]
    pub name: String,
    /// High-order theme the theme collapses into.
    #[serde(default)]
    pub high_order_theme: String,
    /// ISO/IEC 30141 capability mapping.
    #[serde(default)]
    pub iso_capability: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_ITEM: &str = r#"{
        "id": 123456,
        "name": "edge-runtime",
        "full_name": "acme/edge-runtime",
        "owner": { "login": "acme" },
        "html_url": "https://github.com/acme/edge-runtime",
        "description": "Inference runtime for edge devices",
        "pushed_at": "2025-10-01T12:00:00Z",
        "stargazers_count": 420,
        "fork": false,
        "forks": 37,
        "language": "C++",
        "size": 2048,
        "score": 1.0,
        "is_template": false,
        "archived": false,
        "disabled": false,
        "contributors_url": "https://api.github.com/repos/acme/edge-runtime/contributors",
        "collaborators_url": "https://api.github.com/repos/acme/edge-runtime/collaborators{/collaborator}",
        "topics": ["edge-ai"]
    }"#;

    #[test]
    fn test_deserialize_search_item() {
        let record: RepositoryRecord = serde_json::from_str(SEARCH_ITEM).unwrap();

        assert_eq!(record.id, 123_456);
        assert_eq!(record.owner_login(), "acme");
        assert_eq!(record.stargazers_count, 420);
        assert_eq!(record.language.as_deref(), Some("C++"));
        assert!(record.activity.is_none());
        assert!(record.search_terms.is_empty());
    }

    #[test]
    fn test_owner_login_falls_back_to_full_name() {
        let record = RepositoryRecord {
            full_name: "octo/thing".to_string(),
            ..RepositoryRecord::default()
        };
        assert_eq!(record.owner_login(), "octo");
    }

    #[test]
    fn test_add_search_term_deduplicates() {
        let mut record = RepositoryRecord::default();
        record.add_search_term("edge ai");
        record.add_search_term("tinyml");
        record.add_search_term("edge ai");

        assert_eq!(record.search_terms, vec!["edge ai", "tinyml"]);
    }

    #[test]
    fn test_raw_table_header_names_commit_year() {
        let header = raw_table_header(2024);
        assert_eq!(header.len(), 20);
        assert_eq!(header[3], "desc.");
        assert_eq!(header[6], "commits_2024");
        assert_eq!(header[19], "search_term");
    }

    #[test]
    fn test_raw_table_row_matches_header() {
        let mut record: RepositoryRecord = serde_json::from_str(SEARCH_ITEM).unwrap();
        record.activity = Some(Activity {
            total_commits: 812,
            window_commits: 140,
            contributors: 12,
        });
        record.add_search_term("edge ai");
        record.add_search_term("edge tpu");

        let row = raw_table_row(&record);
        assert_eq!(row.len(), raw_table_header(2024).len());
        assert_eq!(row[2], "https://github.com/acme/edge-runtime");
        assert_eq!(row[4], "812");
        assert_eq!(row[6], "140");
        assert_eq!(row[8], "False");
        assert_eq!(row[18], "12");
        assert_eq!(row[19], "edge ai, edge tpu");
    }

    #[test]
    fn test_code_accepts_theme_id_alias() {
        let mut reader = csv::Reader::from_reader("code_id,label,occurrences,theme_ID\nC1,Offline first,,T1\n".as_bytes());
        let code: Code = reader.deserialize().next().unwrap().unwrap();
        assert_eq!(code.theme_id, "T1");
        assert!(code.occurrences.is_none());
    }

    fn read_code(csv_text: &str) -> std::result::Result<Code, csv::Error> {
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        reader.deserialize().next().unwrap()
    }

    #[test]
    fn test_code_occurrences_accept_spreadsheet_numbers() {
        let header = "code_id,label,occurrences,theme_id\n";
        assert_eq!(read_code(&format!("{header}C1,a,2.0,T1\n")).unwrap().occurrences, Some(2));
        assert_eq!(read_code(&format!("{header}C1,a, 3 ,T1\n")).unwrap().occurrences, Some(3));
        assert_eq!(read_code(&format!("{header}C1,a,NA,T1\n")).unwrap().occurrences, None);
    }

    #[test]
    fn test_code_occurrences_reject_fractions() {
        let err = read_code("code_id,label,occurrences,theme_id\nC1,a,2.5,T1\n").unwrap_err();
        assert!(err.to_string().contains("invalid occurrence count '2.5'"));
    }
}
