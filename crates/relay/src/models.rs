//! Repository query results rendered by the chat commands.

use chrono::{DateTime, TimeDelta, Utc};

/// Latest review state left by one reviewer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewerState {
    pub login: String,
    /// GitHub review state, e.g. `APPROVED` or `CHANGES_REQUESTED`
    pub state: String,
}

impl ReviewerState {
    /// Marker shown next to the reviewer name.
    #[must_use]
    pub fn marker(&self) -> &'static str {
        match self.state.as_str() {
            "APPROVED" => "✅",
            "CHANGES_REQUESTED" => "❌",
            _ => "💬",
        }
    }
}

/// Fold reviews (oldest first) into one entry per reviewer.
///
/// A reviewer keeps the position of their first review and the state of their
/// latest one.
pub fn latest_review_states<I>(reviews: I) -> Vec<ReviewerState>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut reviewers: Vec<ReviewerState> = Vec::new();
    for (login, state) in reviews {
        match reviewers.iter_mut().find(|r| r.login == login) {
            Some(existing) => existing.state = state,
            None => reviewers.push(ReviewerState { login, state }),
        }
    }
    reviewers
}

/// One open pull request in a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    /// `head -> base`
    pub branch: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub age: String,
    pub reviewers: Vec<ReviewerState>,
    pub state: String,
}

/// Full view of one pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDetail {
    pub summary: PullRequestSummary,
    pub files_changed: u64,
    pub additions: u64,
    pub deletions: u64,
    /// PR body, or "No description provided." when empty
    pub body: String,
    pub mergeable: Option<bool>,
    pub merged: bool,
}

impl PullRequestDetail {
    /// `+a -d (f files)`
    #[must_use]
    pub fn changes(&self) -> String {
        format!(
            "+{} -{} ({} files)",
            self.additions, self.deletions, self.files_changed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    /// Abbreviated (7 character) sha
    pub sha: String,
    /// First line of the commit message
    pub message: String,
    pub author: String,
    pub date: Option<DateTime<Utc>>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchSummary {
    pub name: String,
    pub protected: bool,
}

/// Activity summary for `/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryStatus {
    pub repo_name: String,
    pub commits_today: u64,
    pub open_prs: u64,
    /// Open issues, pull requests excluded
    pub open_issues: u64,
    pub branches: u64,
    pub default_branch: String,
}

/// Render an elapsed duration the way listings show ages.
#[must_use]
pub fn format_age(elapsed: TimeDelta) -> String {
    let plural = |n: i64, unit: &str| format!("{n} {unit}{}", if n == 1 { "" } else { "s" });

    let days = elapsed.num_days();
    let hours = elapsed.num_hours() % 24;
    let minutes = elapsed.num_minutes() % 60;

    if days > 0 {
        plural(days, "day")
    } else if hours > 0 {
        plural(hours, "hour")
    } else if minutes > 0 {
        plural(minutes, "minute")
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(TimeDelta::days(1)), "1 day");
        assert_eq!(format_age(TimeDelta::days(3) + TimeDelta::hours(5)), "3 days");
        assert_eq!(format_age(TimeDelta::hours(1)), "1 hour");
        assert_eq!(format_age(TimeDelta::hours(23) + TimeDelta::minutes(59)), "23 hours");
        assert_eq!(format_age(TimeDelta::minutes(1)), "1 minute");
        assert_eq!(format_age(TimeDelta::minutes(45)), "45 minutes");
        assert_eq!(format_age(TimeDelta::seconds(59)), "just now");
        assert_eq!(format_age(TimeDelta::zero()), "just now");
        assert_eq!(format_age(TimeDelta::minutes(-5)), "just now");
    }

    #[test]
    fn test_latest_review_state_wins() {
        let reviews = vec![
            ("bob".to_string(), "COMMENTED".to_string()),
            ("carol".to_string(), "APPROVED".to_string()),
            ("bob".to_string(), "CHANGES_REQUESTED".to_string()),
        ];

        let states = latest_review_states(reviews);
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].login, "bob");
        assert_eq!(states[0].state, "CHANGES_REQUESTED");
        assert_eq!(states[1].login, "carol");
    }

    #[test]
    fn test_markers() {
        let state = |s: &str| ReviewerState {
            login: "x".to_string(),
            state: s.to_string(),
        };
        assert_eq!(state("APPROVED").marker(), "✅");
        assert_eq!(state("CHANGES_REQUESTED").marker(), "❌");
        assert_eq!(state("COMMENTED").marker(), "💬");
        assert_eq!(state("DISMISSED").marker(), "💬");
    }
}
