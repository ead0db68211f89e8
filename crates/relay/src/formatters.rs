//! Embed builders for webhook notifications and command replies.
//!
//! Every builder takes the current time explicitly so the output is
//! deterministic under test.

use chrono::{DateTime, Utc};
use notify::{Embed, EmbedColor, BLANK};

use crate::events::{IssueEvent, PullRequestEvent, PushEvent, RefEvent, ReviewEvent, WebhookEvent};
use crate::models::{BranchSummary, CommitSummary, PullRequestDetail, PullRequestSummary, RepositoryStatus};

const MAX_LISTED_PRS: usize = 10;
const MAX_LISTED_BRANCHES: usize = 25;
const BRANCHES_PER_FIELD: usize = 10;

/// Build the notification for a handled webhook event.
#[must_use]
pub fn format_event(event: &WebhookEvent, now: DateTime<Utc>) -> Embed {
    match event {
        WebhookEvent::Push(push) => commit_notification(push, now),
        WebhookEvent::PullRequest(pr) => pull_request_notification(pr, now),
        WebhookEvent::Review(review) => review_notification(review, now),
        WebhookEvent::Issue(issue) => issue_notification(issue, now),
        WebhookEvent::BranchCreated(created) => branch_notification(created, false, now),
        WebhookEvent::BranchDeleted(deleted) => branch_notification(deleted, true, now),
    }
}

// =============================================================================
// Webhook notifications
// =============================================================================

#[must_use]
pub fn commit_notification(push: &PushEvent, now: DateTime<Utc>) -> Embed {
    let branch = push.branch();
    let count = push.commits.len();

    let (message, author) = match push.commits.first() {
        Some(commit) => (
            truncate(first_line(&commit.message), 100),
            commit.author.name.clone(),
        ),
        None => ("No commit message".to_string(), push.pusher.name.clone()),
    };

    let plural = if count > 1 { "s" } else { "" };
    Embed::new(format!("New Commit{plural} to `{branch}`"), EmbedColor::Blue)
        .description(format!("**{message}**"))
        .url(&push.compare)
        .timestamp(now)
        .inline_field("Author", author)
        .inline_field("Branch", format!("`{branch}`"))
        .inline_field("Commits", count.to_string())
        .footer(&push.repository.name)
}

#[must_use]
pub fn pull_request_notification(event: &PullRequestEvent, now: DateTime<Utc>) -> Embed {
    let pr = &event.pull_request;
    let merged = pr.is_merged();

    let (status, color) = match event.action.as_str() {
        "opened" => ("Awaiting Review".to_string(), EmbedColor::Blue),
        "closed" if merged => ("Merged".to_string(), EmbedColor::Purple),
        "closed" => ("Closed".to_string(), EmbedColor::Red),
        "reopened" => ("Reopened".to_string(), EmbedColor::Orange),
        other => (capitalize(other), EmbedColor::Blue),
    };

    let mut embed = Embed::new(
        format!("Pull Request #{} {}", pr.number, capitalize(&event.action)),
        color,
    )
    .description(format!("**{}**", pr.title))
    .url(&pr.html_url)
    .timestamp(now)
    .inline_field("Author", &pr.user.login)
    .inline_field("Status", status)
    .block_field("Branch", format!("`{}`", pr.branch()));

    if merged {
        if let Some(merged_by) = &pr.merged_by {
            embed = embed.inline_field("Merged by", &merged_by.login);
        }
    }

    embed
}

#[must_use]
pub fn review_notification(event: &ReviewEvent, now: DateTime<Utc>) -> Embed {
    let review = &event.review;

    let (status, color) = match review.state.to_ascii_lowercase().as_str() {
        "approved" => ("Approved", EmbedColor::Green),
        "changes_requested" => ("Changes Requested", EmbedColor::Red),
        _ => ("Commented", EmbedColor::Blue),
    };

    let comment = review
        .body
        .as_deref()
        .filter(|body| !body.is_empty())
        .unwrap_or("No comment provided");
    let comment = if comment.chars().count() > 200 {
        format!("{}...", truncate(comment, 197))
    } else {
        comment.to_string()
    };

    Embed::new(
        format!("Review on PR #{}", event.pull_request.number),
        color,
    )
    .description(format!("**{}**", event.pull_request.title))
    .url(&review.html_url)
    .timestamp(now)
    .inline_field("Reviewer", &review.user.login)
    .inline_field("Status", status)
    .block_field("Comment", comment)
}

#[must_use]
pub fn issue_notification(event: &IssueEvent, now: DateTime<Utc>) -> Embed {
    let issue = &event.issue;
    let color = match event.action.as_str() {
        "opened" => EmbedColor::Green,
        "closed" => EmbedColor::Red,
        _ => EmbedColor::Blue,
    };

    Embed::new(
        format!("Issue #{} {}", issue.number, capitalize(&event.action)),
        color,
    )
    .description(format!("**{}**", issue.title))
    .url(&issue.html_url)
    .timestamp(now)
    .inline_field("Author", &issue.user.login)
}

#[must_use]
pub fn branch_notification(event: &RefEvent, deleted: bool, now: DateTime<Utc>) -> Embed {
    let (action, color) = if deleted {
        ("Deleted", EmbedColor::Red)
    } else {
        ("Created", EmbedColor::Green)
    };

    Embed::new(format!("{} {action}", capitalize(&event.ref_type)), color)
        .description(format!("**`{}`**", event.git_ref))
        .timestamp(now)
        .inline_field("By", &event.sender.login)
}

// =============================================================================
// Command replies
// =============================================================================

#[must_use]
pub fn pr_list(prs: &[PullRequestSummary], now: DateTime<Utc>) -> Embed {
    if prs.is_empty() {
        return Embed::new("Open Pull Requests", EmbedColor::Blue)
            .description("No open pull requests found.");
    }

    let mut embed =
        Embed::new(format!("Open Pull Requests ({})", prs.len()), EmbedColor::Blue).timestamp(now);

    for pr in prs.iter().take(MAX_LISTED_PRS) {
        let mut value = format!(
            "Author: {} | Age: {}\nBranch: `{}`",
            pr.author, pr.age, pr.branch
        );
        if !pr.reviewers.is_empty() {
            let states: Vec<String> = pr
                .reviewers
                .iter()
                .map(|r| format!("{} {}", r.login, r.marker()))
                .collect();
            value.push_str(&format!("\nReviewers: {}", states.join(", ")));
        }

        embed = embed.block_field(format!("PR #{}: {}", pr.number, truncate(&pr.title, 50)), value);
    }

    if prs.len() > MAX_LISTED_PRS {
        embed = embed.footer(format!(
            "Showing {MAX_LISTED_PRS} of {} pull requests",
            prs.len()
        ));
    }

    embed
}

#[must_use]
pub fn pr_detail(pr: &PullRequestDetail, now: DateTime<Utc>) -> Embed {
    let summary = &pr.summary;

    let (status, color) = if pr.merged {
        ("Merged", EmbedColor::Purple)
    } else if summary.state == "closed" {
        ("Closed", EmbedColor::Red)
    } else {
        ("Open - Awaiting Review", EmbedColor::Blue)
    };

    let description = if pr.body.chars().count() > 200 {
        format!("{}...", truncate(&pr.body, 200))
    } else {
        pr.body.clone()
    };

    let mut embed = Embed::new(format!("PR #{}: {}", summary.number, summary.title), color)
        .description(description)
        .url(&summary.url)
        .timestamp(now)
        .inline_field("Author", &summary.author)
        .inline_field("Status", status)
        .inline_field("Age", &summary.age)
        .block_field("Branch", format!("`{}`", summary.branch))
        .inline_field("Changes", pr.changes());

    if !summary.reviewers.is_empty() {
        let lines: Vec<String> = summary
            .reviewers
            .iter()
            .map(|r| format!("{} {}", r.marker(), r.login))
            .collect();
        embed = embed.inline_field("Reviewers", lines.join("\n"));
    }

    embed
}

#[must_use]
pub fn commit_list(commits: &[CommitSummary], branch: &str, now: DateTime<Utc>) -> Embed {
    let title = format!("Recent Commits on `{branch}`");
    if commits.is_empty() {
        return Embed::new(title, EmbedColor::Blue).description("No commits found.");
    }

    commits.iter().fold(
        Embed::new(title, EmbedColor::Blue).timestamp(now),
        |embed, commit| {
            embed.block_field(
                format!("`{}` - {}", commit.sha, commit.author),
                truncate(&commit.message, 100),
            )
        },
    )
}

#[must_use]
pub fn repository_status(status: &RepositoryStatus, now: DateTime<Utc>) -> Embed {
    Embed::new(
        format!("Repository Status - {}", status.repo_name),
        EmbedColor::Green,
    )
    .timestamp(now)
    .inline_field("Today's Activity", format!("{} commits", status.commits_today))
    .inline_field("Open PRs", status.open_prs.to_string())
    .inline_field("Open Issues", status.open_issues.to_string())
    .inline_field("Active Branches", status.branches.to_string())
    .inline_field("Default Branch", format!("`{}`", status.default_branch))
}

#[must_use]
pub fn branch_list(branches: &[BranchSummary], now: DateTime<Utc>) -> Embed {
    if branches.is_empty() {
        return Embed::new("Active Branches", EmbedColor::Blue).description("No branches found.");
    }

    let lines: Vec<String> = branches
        .iter()
        .take(MAX_LISTED_BRANCHES)
        .map(|b| {
            let lock = if b.protected { " 🔒" } else { "" };
            format!("`{}`{lock}", b.name)
        })
        .collect();

    let mut embed = lines.chunks(BRANCHES_PER_FIELD).fold(
        Embed::new(format!("Active Branches ({})", branches.len()), EmbedColor::Green)
            .timestamp(now),
        |embed, chunk| embed.inline_field(BLANK, chunk.join("\n")),
    );

    if branches.len() > MAX_LISTED_BRANCHES {
        embed = embed.footer(format!(
            "Showing {MAX_LISTED_BRANCHES} of {} branches",
            branches.len()
        ));
    }

    embed
}

/// Reply to `/assign`: asks `reviewer_id` to review the pull request.
#[must_use]
pub fn review_request(pr: &PullRequestDetail, reviewer_id: &str, requested_by: &str) -> Embed {
    let summary = &pr.summary;
    Embed::new(
        format!("Review Request for PR #{}", summary.number),
        EmbedColor::Orange,
    )
    .description(format!(
        "**{}**\n\n<@{reviewer_id}>, you've been requested to review this pull request.",
        summary.title
    ))
    .url(&summary.url)
    .inline_field("Author", &summary.author)
    .inline_field("Branch", format!("`{}`", summary.branch))
    .inline_field("Changes", pr.changes())
    .footer(format!("Requested by {requested_by}"))
}

// =============================================================================
// Helpers
// =============================================================================

/// Upper-case the first character and lower-case the rest.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

fn first_line(s: &str) -> &str {
    s.lines().next().unwrap_or_default()
}

/// At most `max` characters of `s`.
fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
