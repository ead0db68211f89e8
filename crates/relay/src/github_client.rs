//! GitHub REST client for the repository queries behind the chat commands.

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RepoName;
use crate::models::{
    format_age, latest_review_states, BranchSummary, CommitSummary, PullRequestDetail,
    PullRequestSummary, RepositoryStatus, ReviewerState,
};

const PAGE_SIZE: &str = "100";

/// Errors from GitHub REST calls.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

impl GitHubError {
    fn is_status(&self, codes: &[u16]) -> bool {
        matches!(self, Self::Api { status, .. } if codes.contains(status))
    }
}

/// Read-only repository queries used by the command responder.
#[async_trait]
pub trait RepoQuery: Send + Sync {
    /// Open pull requests, newest first, with each reviewer's latest state.
    async fn open_pull_requests(&self) -> Result<Vec<PullRequestSummary>, GitHubError>;

    /// One pull request, or `None` when it does not exist.
    async fn pull_request(&self, number: u64) -> Result<Option<PullRequestDetail>, GitHubError>;

    /// Most recent commits on `branch`. Unknown branches yield an empty list.
    async fn commits(&self, branch: &str, limit: usize) -> Result<Vec<CommitSummary>, GitHubError>;

    async fn branches(&self) -> Result<Vec<BranchSummary>, GitHubError>;

    async fn repository_status(&self) -> Result<RepositoryStatus, GitHubError>;
}

// GitHub response shapes. Only the fields the relay reads.

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    #[serde(rename = "ref")]
    git_ref: String,
}

#[derive(Debug, Deserialize)]
struct ApiPullRequest {
    number: u64,
    title: String,
    user: Option<ApiUser>,
    head: ApiRef,
    base: ApiRef,
    html_url: String,
    state: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    mergeable: Option<bool>,
    #[serde(default)]
    changed_files: Option<u64>,
    #[serde(default)]
    additions: Option<u64>,
    #[serde(default)]
    deletions: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ApiReview {
    user: Option<ApiUser>,
    state: String,
}

#[derive(Debug, Deserialize)]
struct ApiCommit {
    sha: String,
    html_url: String,
    commit: ApiCommitDetail,
}

#[derive(Debug, Deserialize)]
struct ApiCommitDetail {
    message: String,
    author: Option<ApiGitAuthor>,
}

#[derive(Debug, Deserialize)]
struct ApiGitAuthor {
    name: String,
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiBranch {
    name: String,
    #[serde(default)]
    protected: bool,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    full_name: String,
    default_branch: String,
}

/// Login GitHub shows for deleted accounts.
const GHOST: &str = "ghost";

fn login(user: Option<ApiUser>) -> String {
    user.map_or_else(|| GHOST.to_string(), |u| u.login)
}

/// GitHub REST client bound to one repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    base_url: String,
    repo: RepoName,
}

impl GitHubClient {
    /// Create a client against `api.github.com`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(token: &str, repo: RepoName) -> Result<Self, GitHubError> {
        Self::with_base_url(token, repo, crate::config::DEFAULT_GITHUB_API_URL)
    }

    /// Create a client against a custom API root.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be created.
    pub fn with_base_url(token: &str, repo: RepoName, base_url: &str) -> Result<Self, GitHubError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("repo-relay/1.0"));

        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        info!(repository = %repo, "GitHub client initialized");

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            repo,
        })
    }

    fn repo_path(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{suffix}",
            self.base_url, self.repo.owner, self.repo.name
        )
    }

    async fn get(&self, suffix: &str, query: &[(&str, String)]) -> Result<reqwest::Response, GitHubError> {
        self.send(&self.repo_path(suffix), query).await
    }

    async fn send(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response, GitHubError> {
        debug!(%url, "GitHub request");

        let response = self.client.get(url).query(query).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GitHubError::Api { status, body });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        suffix: &str,
        query: &[(&str, String)],
    ) -> Result<T, GitHubError> {
        Ok(self.get(suffix, query).await?.json().await?)
    }

    /// Every item of a list endpoint, following `rel="next"` links.
    async fn get_all<T: DeserializeOwned>(
        &self,
        suffix: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, GitHubError> {
        let mut query = query.to_vec();
        query.push(("per_page", PAGE_SIZE.to_string()));

        let mut response = self.get(suffix, &query).await?;
        let mut items = Vec::new();
        loop {
            let next = next_link(response.headers());
            let page: Vec<T> = response.json().await?;
            items.extend(page);

            match next {
                // The next link already carries the query
                Some(url) => response = self.send(&url, &[]).await?,
                None => break,
            }
        }
        Ok(items)
    }

    /// Total items behind a list endpoint, read from the `rel="last"` link of
    /// a one-item page.
    async fn count(&self, suffix: &str, query: &[(&str, String)]) -> Result<u64, GitHubError> {
        let mut query = query.to_vec();
        query.push(("per_page", "1".to_string()));

        let response = self.get(suffix, &query).await?;
        let last = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(|link| link_target(link, "last"))
            .and_then(page_number);

        match last {
            Some(total) => Ok(total),
            None => {
                let items: Vec<serde_json::Value> = response.json().await?;
                Ok(items.len() as u64)
            }
        }
    }

    async fn reviewers(&self, number: u64) -> Result<Vec<ReviewerState>, GitHubError> {
        let reviews: Vec<ApiReview> = self
            .get_all(&format!("/pulls/{number}/reviews"), &[])
            .await?;

        Ok(latest_review_states(
            reviews.into_iter().map(|r| (login(r.user), r.state)),
        ))
    }

    async fn summarize(&self, pr: &ApiPullRequest) -> Result<PullRequestSummary, GitHubError> {
        Ok(PullRequestSummary {
            number: pr.number,
            title: pr.title.clone(),
            author: pr.user.as_ref().map_or_else(|| GHOST.to_string(), |u| u.login.clone()),
            branch: format!("{} -> {}", pr.head.git_ref, pr.base.git_ref),
            url: pr.html_url.clone(),
            created_at: pr.created_at,
            age: format_age(Utc::now() - pr.created_at),
            reviewers: self.reviewers(pr.number).await?,
            state: pr.state.clone(),
        })
    }
}

#[async_trait]
impl RepoQuery for GitHubClient {
    async fn open_pull_requests(&self) -> Result<Vec<PullRequestSummary>, GitHubError> {
        let pulls: Vec<ApiPullRequest> = self
            .get_all(
                "/pulls",
                &[
                    ("state", "open".to_string()),
                    ("sort", "created".to_string()),
                    ("direction", "desc".to_string()),
                ],
            )
            .await?;

        let mut summaries = Vec::with_capacity(pulls.len());
        for pr in &pulls {
            summaries.push(self.summarize(pr).await?);
        }

        info!(count = summaries.len(), "Retrieved open pull requests");
        Ok(summaries)
    }

    async fn pull_request(&self, number: u64) -> Result<Option<PullRequestDetail>, GitHubError> {
        let pr: ApiPullRequest = match self.get_json(&format!("/pulls/{number}"), &[]).await {
            Ok(pr) => pr,
            Err(e) if e.is_status(&[404]) => {
                debug!(number, "Pull request not found");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let summary = self.summarize(&pr).await?;
        let body = pr
            .body
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| "No description provided.".to_string());

        info!(number, "Retrieved pull request");
        Ok(Some(PullRequestDetail {
            summary,
            files_changed: pr.changed_files.unwrap_or_default(),
            additions: pr.additions.unwrap_or_default(),
            deletions: pr.deletions.unwrap_or_default(),
            body,
            mergeable: pr.mergeable,
            merged: pr.merged.unwrap_or(false),
        }))
    }

    async fn commits(&self, branch: &str, limit: usize) -> Result<Vec<CommitSummary>, GitHubError> {
        let result: Result<Vec<ApiCommit>, _> = self
            .get_json(
                "/commits",
                &[("sha", branch.to_string()), ("per_page", limit.to_string())],
            )
            .await;

        let commits = match result {
            Ok(commits) => commits,
            // Unknown branch (404/422) or empty repository (409)
            Err(e) if e.is_status(&[404, 409, 422]) => {
                warn!(branch, error = %e, "No commits for branch");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let summaries: Vec<CommitSummary> = commits
            .into_iter()
            .take(limit)
            .map(|c| {
                let (author, date) = c
                    .commit
                    .author
                    .map_or_else(|| ("unknown".to_string(), None), |a| (a.name, a.date));
                CommitSummary {
                    sha: c.sha.chars().take(7).collect(),
                    message: c.commit.message.lines().next().unwrap_or_default().to_string(),
                    author,
                    date,
                    url: c.html_url,
                }
            })
            .collect();

        info!(branch, count = summaries.len(), "Retrieved commits");
        Ok(summaries)
    }

    async fn branches(&self) -> Result<Vec<BranchSummary>, GitHubError> {
        let branches: Vec<ApiBranch> = self.get_all("/branches", &[]).await?;

        info!(count = branches.len(), "Retrieved branches");
        Ok(branches
            .into_iter()
            .map(|b| BranchSummary {
                name: b.name,
                protected: b.protected,
            })
            .collect())
    }

    async fn repository_status(&self) -> Result<RepositoryStatus, GitHubError> {
        let repository: ApiRepository = self.get_json("", &[]).await?;

        let midnight = Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc();
        let commits_today = match self
            .count("/commits", &[("since", midnight.to_rfc3339())])
            .await
        {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Could not count today's commits");
                0
            }
        };

        let open_prs = self.count("/pulls", &[("state", "open".to_string())]).await?;
        // The issues endpoint lists pull requests too
        let open_items = self.count("/issues", &[("state", "open".to_string())]).await?;
        let branches = self.count("/branches", &[]).await?;

        info!("Retrieved repository status");
        Ok(RepositoryStatus {
            repo_name: repository.full_name,
            commits_today,
            open_prs,
            open_issues: open_items.saturating_sub(open_prs),
            branches,
            default_branch: repository.default_branch,
        })
    }
}

/// URL of the `rel` entry of a `Link` header.
fn link_target<'a>(link: &'a str, rel: &str) -> Option<&'a str> {
    let marker = format!(r#"rel="{rel}""#);
    let target = link.split(',').find(|part| part.contains(&marker))?;
    Some(
        target
            .split(';')
            .next()?
            .trim()
            .trim_start_matches('<')
            .trim_end_matches('>'),
    )
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(|link| link_target(link, "next"))
        .map(String::from)
}

/// The `page` query parameter of a paginated URL.
fn page_number(url: &str) -> Option<u64> {
    let (_, query) = url.split_once('?')?;

    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "page")
        .and_then(|(_, value)| value.parse().ok())
}
