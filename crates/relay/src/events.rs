//! GitHub webhook payloads and event classification.
//!
//! Classification is a two step affair: the discriminator of each event type
//! (`commits`, `action` or `ref_type`) is read first, and only deliveries that
//! will produce a notification are decoded into their full typed schema. A
//! handled delivery that lacks a required field is an error, never a silent
//! default.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Failure to decode a payload for an event the relay handles.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("invalid {event} payload: {source}")]
    Invalid {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// `X-GitHub-Event` header values the relay knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Push,
    PullRequest,
    PullRequestReview,
    PullRequestReviewComment,
    Issues,
    Create,
    Delete,
    Other(String),
}

impl EventKind {
    #[must_use]
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "push" => Self::Push,
            "pull_request" => Self::PullRequest,
            "pull_request_review" => Self::PullRequestReview,
            "pull_request_review_comment" => Self::PullRequestReviewComment,
            "issues" => Self::Issues,
            "create" => Self::Create,
            "delete" => Self::Delete,
            other => Self::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Push => "push",
            Self::PullRequest => "pull_request",
            Self::PullRequestReview => "pull_request_review",
            Self::PullRequestReviewComment => "pull_request_review_comment",
            Self::Issues => "issues",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Other(other) => other,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payload schemas
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GitRef {
    #[serde(rename = "ref")]
    pub git_ref: String,
}

/// `push` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub commits: Vec<PushCommit>,
    pub pusher: Pusher,
    pub repository: Repository,
    pub compare: String,
}

impl PushEvent {
    /// Branch name, i.e. the last segment of `refs/heads/...`.
    #[must_use]
    pub fn branch(&self) -> &str {
        self.git_ref.rsplit('/').next().unwrap_or(&self.git_ref)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PushCommit {
    pub message: String,
    pub author: CommitAuthor,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommitAuthor {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pusher {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub name: String,
}

/// `pull_request` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub user: User,
    pub head: GitRef,
    pub base: GitRef,
    pub html_url: String,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub merged_by: Option<User>,
}

impl PullRequest {
    #[must_use]
    pub fn is_merged(&self) -> bool {
        self.merged.unwrap_or(false)
    }

    /// `head -> base`
    #[must_use]
    pub fn branch(&self) -> String {
        format!("{} -> {}", self.head.git_ref, self.base.git_ref)
    }
}

/// `pull_request_review` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewEvent {
    pub action: String,
    pub review: Review,
    pub pull_request: ReviewedPullRequest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Review {
    pub user: User,
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewedPullRequest {
    pub number: u64,
    pub title: String,
}

/// `issues` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueEvent {
    pub action: String,
    pub issue: Issue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub user: User,
    pub html_url: String,
}

/// `create` / `delete` delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct RefEvent {
    pub ref_type: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub sender: User,
}

// Discriminators, read before the full schema.

#[derive(Deserialize)]
struct CommitsField {
    #[serde(default)]
    commits: Option<Vec<Value>>,
}

#[derive(Deserialize)]
struct ActionField {
    action: String,
}

#[derive(Deserialize)]
struct RefTypeField {
    ref_type: String,
}

// =============================================================================
// Classification
// =============================================================================

/// An event that produces a notification.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    Review(ReviewEvent),
    Issue(IssueEvent),
    BranchCreated(RefEvent),
    BranchDeleted(RefEvent),
}

/// Why a delivery produced no notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Push without commits, e.g. a bare branch creation
    NoCommits,
    /// Action outside the notified set
    Action(String),
    /// Review comments are suppressed to keep volume down
    ReviewComment,
    /// `create`/`delete` for a tag or other ref kind
    RefType(String),
    /// Event type the relay does not handle
    Unhandled(String),
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCommits => f.write_str("push without commits"),
            Self::Action(action) => write!(f, "action '{action}' not notified"),
            Self::ReviewComment => f.write_str("review comments are not notified"),
            Self::RefType(kind) => write!(f, "ref type '{kind}' not notified"),
            Self::Unhandled(event) => write!(f, "unhandled event type '{event}'"),
        }
    }
}

/// Outcome of classifying one delivery.
#[derive(Debug, Clone)]
pub enum Classification {
    Notify(WebhookEvent),
    Ignore(IgnoreReason),
}

const NOTIFIED_ACTIONS: [&str; 3] = ["opened", "closed", "reopened"];

/// Classify a delivery by event type and payload discriminator.
///
/// Total over event types: anything unknown is [`IgnoreReason::Unhandled`].
///
/// # Errors
///
/// Returns [`PayloadError`] when a handled event lacks its discriminator or a
/// required field of its schema.
pub fn classify(event_type: &str, payload: &Value) -> Result<Classification, PayloadError> {
    let kind = EventKind::parse(event_type);

    let classification = match kind {
        EventKind::Push => {
            let CommitsField { commits } = decode("push", payload)?;
            if commits.unwrap_or_default().is_empty() {
                Classification::Ignore(IgnoreReason::NoCommits)
            } else {
                Classification::Notify(WebhookEvent::Push(decode("push", payload)?))
            }
        }
        EventKind::PullRequest => {
            let ActionField { action } = decode("pull_request", payload)?;
            if NOTIFIED_ACTIONS.contains(&action.as_str()) {
                Classification::Notify(WebhookEvent::PullRequest(decode("pull_request", payload)?))
            } else {
                Classification::Ignore(IgnoreReason::Action(action))
            }
        }
        EventKind::PullRequestReview => {
            let ActionField { action } = decode("pull_request_review", payload)?;
            if action == "submitted" {
                Classification::Notify(WebhookEvent::Review(decode(
                    "pull_request_review",
                    payload,
                )?))
            } else {
                Classification::Ignore(IgnoreReason::Action(action))
            }
        }
        EventKind::PullRequestReviewComment => Classification::Ignore(IgnoreReason::ReviewComment),
        EventKind::Issues => {
            let ActionField { action } = decode("issues", payload)?;
            if NOTIFIED_ACTIONS.contains(&action.as_str()) {
                Classification::Notify(WebhookEvent::Issue(decode("issues", payload)?))
            } else {
                Classification::Ignore(IgnoreReason::Action(action))
            }
        }
        EventKind::Create | EventKind::Delete => {
            let event = if kind == EventKind::Create { "create" } else { "delete" };
            let RefTypeField { ref_type } = decode(event, payload)?;
            if ref_type != "branch" {
                Classification::Ignore(IgnoreReason::RefType(ref_type))
            } else if kind == EventKind::Create {
                Classification::Notify(WebhookEvent::BranchCreated(decode(event, payload)?))
            } else {
                Classification::Notify(WebhookEvent::BranchDeleted(decode(event, payload)?))
            }
        }
        EventKind::Other(other) => Classification::Ignore(IgnoreReason::Unhandled(other)),
    };

    Ok(classification)
}

fn decode<T: DeserializeOwned>(event: &'static str, payload: &Value) -> Result<T, PayloadError> {
    T::deserialize(payload).map_err(|source| PayloadError::Invalid { event, source })
}
