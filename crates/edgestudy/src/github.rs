//! GitHub REST API access.
//!
//! The miner talks to GitHub through the [`RepositorySource`] trait so the
//! search and enrichment logic can run against a fake source in tests.
//! [`GithubClient`] is the real implementation: one request at a time, with
//! the retry rules of [`RetryPolicy`] applied to every call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::GithubConfig;
use crate::error::{Error, Result};
use crate::model::RepositoryRecord;

/// Page size used when counting commits and contributors.
const COUNT_PAGE_SIZE: usize = 100;

/// Extra seconds waited past a rate limit reset.
const RESET_GRACE_SECS: i64 = 2;

/// Characters of an error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Time range of a commit count. Unbounded ends are omitted from the query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitWindow {
    since: Option<NaiveDateTime>,
    until: Option<NaiveDateTime>,
}

impl CommitWindow {
    /// The whole history of the default branch.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// January 1st 00:00:00 to December 31st 23:59:59 of `year`, UTC.
    #[must_use]
    pub fn calendar_year(year: i32) -> Self {
        Self {
            since: NaiveDate::from_ymd_opt(year, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0)),
            until: NaiveDate::from_ymd_opt(year, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59)),
        }
    }

    /// Check if neither end is bounded.
    #[must_use]
    pub fn is_unbounded(&self) -> bool {
        self.since.is_none() && self.until.is_none()
    }

    /// `since` query value, e.g. `2024-01-01T00:00:00Z`.
    #[must_use]
    pub fn since_param(&self) -> Option<String> {
        self.since.map(format_api_time)
    }

    /// `until` query value, e.g. `2024-12-31T23:59:59Z`.
    #[must_use]
    pub fn until_param(&self) -> Option<String> {
        self.until.map(format_api_time)
    }
}

fn format_api_time(time: NaiveDateTime) -> String {
    time.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// One page of `/search/repositories`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchPage {
    /// Total number of matches reported by GitHub.
    pub total_count: u64,
    /// Whether the search timed out before finding every match.
    pub incomplete_results: bool,
    /// Repositories on this page.
    pub items: Vec<RepositoryRecord>,
}

/// Source of repository search results and activity counts.
#[async_trait]
pub trait RepositorySource: Send + Sync {
    /// Fetch one page of search results sorted by stars, descending.
    async fn search_page(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage>;

    /// Count commits of `owner/repo` inside `window`.
    async fn count_commits(&self, owner: &str, repo: &str, window: &CommitWindow) -> Result<u64>;

    /// Count contributors of `owner/repo`.
    async fn count_contributors(&self, owner: &str, repo: &str) -> Result<u64>;
}

/// What to do with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Hand the response to the caller.
    Return,
    /// Wait, then send the request again.
    Retry(Duration),
    /// Give up with an error.
    Fail,
}

/// The parts of a response the retry rules look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSignals {
    /// HTTP status code.
    pub status: u16,
    /// `X-RateLimit-Reset` as epoch seconds.
    pub rate_limit_reset: Option<i64>,
    /// `Retry-After` in seconds.
    pub retry_after: Option<u64>,
    /// Whether the body says a rate limit was exceeded.
    pub mentions_rate_limit: bool,
}

impl ResponseSignals {
    /// Extract the signals from response headers and body.
    #[must_use]
    pub fn from_parts(status: u16, headers: &HeaderMap, body: &str) -> Self {
        Self {
            status,
            rate_limit_reset: headers
                .get(RATE_LIMIT_RESET)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok()),
            mentions_rate_limit: body.to_lowercase().contains("rate limit"),
        }
    }
}

/// Retry rules for GitHub requests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    pub backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            backoff_base: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Decide how to handle a response.
    ///
    /// `attempt` counts the retries already made and `now` is the current
    /// epoch time in seconds.
    ///
    /// - 2xx is returned.
    /// - 403 with a rate limit message and a reset time waits for the reset.
    /// - 429 with `Retry-After` waits that long.
    /// - Any other 403, 429 or 5xx backs off exponentially.
    /// - Everything else fails immediately.
    #[must_use]
    pub fn decide(&self, signals: &ResponseSignals, attempt: u32, now: i64) -> RetryDecision {
        let status = signals.status;
        if (200..300).contains(&status) {
            return RetryDecision::Return;
        }

        let transient = status >= 500 || matches!(status, 403 | 429);
        if !transient || attempt >= self.max_retries {
            return RetryDecision::Fail;
        }

        if status == 403 && signals.mentions_rate_limit {
            if let Some(reset) = signals.rate_limit_reset {
                let wait = (reset - now + RESET_GRACE_SECS).max(0);
                return RetryDecision::Retry(Duration::from_secs(wait.unsigned_abs()));
            }
        }

        if status == 429 {
            if let Some(secs) = signals.retry_after {
                return RetryDecision::Retry(Duration::from_secs(secs));
            }
        }

        RetryDecision::Retry(self.backoff(attempt))
    }

    /// Exponential backoff delay for a retry.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exponent)).unwrap_or(Duration::MAX)
    }
}

/// GitHub REST client.
#[derive(Debug, Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_url: String,
    policy: RetryPolicy,
}

impl GithubClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github.v3+json"),
        );

        if let Some(token) = config.token.as_deref().filter(|t| !t.trim().is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(
                |_| Error::ConfigValidation {
                    message: "github.token contains invalid characters".to_string(),
                },
            )?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        } else {
            warn!("No GitHub token configured; requests are heavily rate limited");
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            policy: RetryPolicy {
                max_retries: config.max_retries,
                backoff_base: config.backoff_base,
            },
        })
    }

    /// Retry policy applied to every request.
    #[must_use]
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url` and return the body of a successful response.
    async fn get_text(&self, url: &str) -> Result<String> {
        let mut attempt = 0;
        loop {
            let response = match self.http.get(url).send().await {
                Ok(response) => response,
                Err(err) if (err.is_timeout() || err.is_connect()) && attempt < self.policy.max_retries => {
                    let wait = self.policy.backoff(attempt);
                    warn!(url, error = %err, wait_secs = wait.as_secs_f64(), "Request failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                    continue;
                }
                Err(err) => return Err(err.into()),
            };

            let status = response.status().as_u16();
            if response.status().is_success() {
                if let Some(remaining) = response.headers().get(RATE_LIMIT_REMAINING) {
                    debug!(remaining = ?remaining, "Rate limit remaining");
                }
                return Ok(response.text().await?);
            }

            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            let signals = ResponseSignals::from_parts(status, &headers, &body);

            match self.policy.decide(&signals, attempt, Utc::now().timestamp()) {
                RetryDecision::Return => return Ok(body),
                RetryDecision::Retry(wait) => {
                    warn!(
                        url,
                        status,
                        attempt = attempt + 1,
                        wait_secs = wait.as_secs_f64(),
                        "Transient GitHub error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                RetryDecision::Fail => {
                    let message: String = body.chars().take(ERROR_BODY_LIMIT).collect();
                    if signals.mentions_rate_limit || status == 429 {
                        warn!(url, status, "Retries exhausted while rate limited");
                        return Err(Error::RateLimited {
                            attempts: attempt + 1,
                        });
                    }
                    return Err(Error::GithubApi {
                        status,
                        url: url.to_string(),
                        message,
                    });
                }
            }
        }
    }

    /// GET `url` and deserialize the JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails after retries or the body is not
    /// the expected JSON.
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let body = self.get_text(url).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Count items of a paged list endpoint.
    ///
    /// Pages are requested until one holds fewer than a full page of items.
    async fn count_paged(&self, base_url: &str) -> Result<u64> {
        let mut total = 0u64;
        let mut page = 1u32;
        loop {
            let separator = if base_url.contains('?') { '&' } else { '?' };
            let url = format!("{base_url}{separator}per_page={COUNT_PAGE_SIZE}&page={page}");
            let body = self.get_text(&url).await?;

            // 204 No Content for empty repositories
            let batch = if body.trim().is_empty() {
                0
            } else {
                serde_json::from_str::<Vec<serde_json::Value>>(&body)
                    .map_err(|e| Error::GithubResponse(format!("{url}: {e}")))?
                    .len()
            };

            total += batch as u64;
            if batch < COUNT_PAGE_SIZE {
                return Ok(total);
            }
            page += 1;
        }
    }

    fn repo_url(&self, owner: &str, repo: &str, endpoint: &str) -> String {
        format!(
            "{}/repos/{}/{}/{endpoint}",
            self.api_url,
            urlencoding::encode(owner),
            urlencoding::encode(repo)
        )
    }
}

#[async_trait]
impl RepositorySource for GithubClient {
    async fn search_page(&self, query: &str, page: u32, per_page: u32) -> Result<SearchPage> {
        let url = format!(
            "{}/search/repositories?q={}&sort=stars&order=desc&per_page={per_page}&page={page}",
            self.api_url,
            urlencoding::encode(query)
        );
        debug!(%url, "Searching repositories");
        self.get_json(&url).await
    }

    async fn count_commits(&self, owner: &str, repo: &str, window: &CommitWindow) -> Result<u64> {
        let mut url = self.repo_url(owner, repo, "commits");
        let mut params = Vec::new();
        if let Some(since) = window.since_param() {
            params.push(format!("since={}", urlencoding::encode(&since)));
        }
        if let Some(until) = window.until_param() {
            params.push(format!("until={}", urlencoding::encode(&until)));
        }
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        self.count_paged(&url).await
    }

    async fn count_contributors(&self, owner: &str, repo: &str) -> Result<u64> {
        self.count_paged(&self.repo_url(owner, repo, "contributors")).await
    }
}
