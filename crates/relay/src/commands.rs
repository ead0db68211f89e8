//! Slash commands: definitions, option parsing and the responder that runs
//! them against the repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use notify::{
    ChannelError, CommandDefinition, CommandOptionType, DiscordClient, InteractionResponse,
    MessagePayload,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::formatters;
use crate::gateway::{CommandData, Interaction};
use crate::github_client::{GitHubError, RepoQuery};

/// Branch `/commits` uses when none is given.
pub const DEFAULT_BRANCH: &str = "main";

/// Commits shown by `/commits`.
pub const COMMIT_LIMIT: usize = 10;

/// Commands registered in the guild.
#[must_use]
pub fn definitions() -> Vec<CommandDefinition> {
    vec![
        CommandDefinition::new("prs", "List all open pull requests"),
        CommandDefinition::new("pr", "Get detailed information about a specific pull request")
            .option("number", "Pull request number", CommandOptionType::Integer, true),
        CommandDefinition::new("commits", "Show recent commits on a branch").option(
            "branch",
            "Branch name (default: main)",
            CommandOptionType::String,
            false,
        ),
        CommandDefinition::new("branches", "List all branches in the repository"),
        CommandDefinition::new("status", "Get repository activity summary"),
        CommandDefinition::new("assign", "Request a PR review from a team member")
            .option(
                "user",
                "Discord user to request review from",
                CommandOptionType::User,
                true,
            )
            .option("pr_number", "Pull request number", CommandOptionType::Integer, true),
    ]
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("missing option '{0}'")]
    MissingOption(&'static str),

    #[error("invalid value for option '{0}'")]
    InvalidOption(&'static str),
}

/// A parsed slash command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Prs,
    Pr { number: u64 },
    Commits { branch: String },
    Branches,
    Status,
    Assign { user_id: String, pr_number: u64 },
    Unknown(String),
}

impl Command {
    /// Parse a command and its options.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError`] when a required option is missing or has the
    /// wrong type.
    pub fn parse(data: &CommandData) -> Result<Self, CommandError> {
        let option = |name: &str| {
            data.options
                .iter()
                .find(|o| o.name == name)
                .map(|o| &o.value)
        };

        let integer = |name: &'static str| -> Result<u64, CommandError> {
            let value = option(name).ok_or(CommandError::MissingOption(name))?;
            value.as_u64().ok_or(CommandError::InvalidOption(name))
        };

        let command = match data.name.as_str() {
            "prs" => Self::Prs,
            "pr" => Self::Pr {
                number: integer("number")?,
            },
            "commits" => Self::Commits {
                branch: match option("branch") {
                    None | Some(Value::Null) => DEFAULT_BRANCH.to_string(),
                    Some(Value::String(branch)) if !branch.trim().is_empty() => {
                        branch.trim().to_string()
                    }
                    Some(_) => return Err(CommandError::InvalidOption("branch")),
                },
            },
            "branches" => Self::Branches,
            "status" => Self::Status,
            "assign" => Self::Assign {
                user_id: match option("user") {
                    Some(Value::String(id)) => id.clone(),
                    Some(_) => return Err(CommandError::InvalidOption("user")),
                    None => return Err(CommandError::MissingOption("user")),
                },
                pr_number: integer("pr_number")?,
            },
            other => Self::Unknown(other.to_string()),
        };

        Ok(command)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Prs => "prs",
            Self::Pr { .. } => "pr",
            Self::Commits { .. } => "commits",
            Self::Branches => "branches",
            Self::Status => "status",
            Self::Assign { .. } => "assign",
            Self::Unknown(name) => name,
        }
    }

    /// Ephemeral text shown when the command fails upstream.
    #[must_use]
    pub fn apology(&self) -> String {
        match self {
            Self::Prs => {
                "An error occurred while fetching pull requests. Please try again later.".to_string()
            }
            Self::Pr { .. } => {
                "An error occurred while fetching the pull request. Please try again later."
                    .to_string()
            }
            Self::Commits { branch } => format!(
                "An error occurred while fetching commits for branch `{branch}`. Please check the branch name and try again."
            ),
            Self::Branches => {
                "An error occurred while fetching branches. Please try again later.".to_string()
            }
            Self::Status => {
                "An error occurred while fetching repository status. Please try again later."
                    .to_string()
            }
            Self::Assign { .. } | Self::Unknown(_) => {
                "An error occurred while processing your request. Please try again later."
                    .to_string()
            }
        }
    }
}

/// How the responder answers an interaction.
#[async_trait]
pub trait InteractionReply: Send + Sync {
    /// Acknowledge now and answer later with [`follow_up`](Self::follow_up).
    async fn defer(&self, interaction: &Interaction) -> Result<(), ChannelError>;

    /// Answer immediately.
    async fn respond(
        &self,
        interaction: &Interaction,
        message: &MessagePayload,
    ) -> Result<(), ChannelError>;

    /// Answer a deferred interaction.
    async fn follow_up(
        &self,
        interaction: &Interaction,
        message: &MessagePayload,
    ) -> Result<(), ChannelError>;
}

#[async_trait]
impl InteractionReply for DiscordClient {
    async fn defer(&self, interaction: &Interaction) -> Result<(), ChannelError> {
        self.create_interaction_response(
            &interaction.id,
            &interaction.token,
            &InteractionResponse::deferred(),
        )
        .await
    }

    async fn respond(
        &self,
        interaction: &Interaction,
        message: &MessagePayload,
    ) -> Result<(), ChannelError> {
        self.create_interaction_response(
            &interaction.id,
            &interaction.token,
            &InteractionResponse::message(message.clone()),
        )
        .await
    }

    async fn follow_up(
        &self,
        interaction: &Interaction,
        message: &MessagePayload,
    ) -> Result<(), ChannelError> {
        self.create_followup(&interaction.application_id, &interaction.token, message)
            .await
    }
}

/// Runs slash commands against the repository and answers them.
#[derive(Clone)]
pub struct CommandResponder {
    github: Arc<dyn RepoQuery>,
    reply: Arc<dyn InteractionReply>,
}

impl CommandResponder {
    #[must_use]
    pub fn new(github: Arc<dyn RepoQuery>, reply: Arc<dyn InteractionReply>) -> Self {
        Self { github, reply }
    }

    /// Handle one interaction. Failures are logged and, where possible,
    /// reported to the invoking user; they never propagate.
    pub async fn handle(&self, interaction: &Interaction) {
        let Some(data) = interaction.data.as_ref() else {
            warn!(interaction_id = %interaction.id, "Interaction without command data");
            return;
        };

        let command = match Command::parse(data) {
            Ok(command) => command,
            Err(e) => {
                warn!(command = %data.name, error = %e, "Invalid command options");
                let message = MessagePayload::ephemeral(format!("Invalid options for /{}: {e}", data.name));
                self.send_immediate(interaction, &message).await;
                return;
            }
        };

        info!(
            command = command.name(),
            user = interaction.invoker_name(),
            "Command received"
        );

        match &command {
            Command::Unknown(name) => {
                warn!(command = %name, "Unknown command");
                self.send_immediate(interaction, &MessagePayload::ephemeral("Unknown command"))
                    .await;
            }
            Command::Assign { user_id, pr_number } => {
                let message = match self.review_request(interaction, user_id, *pr_number).await {
                    Ok(message) => message,
                    Err(e) => {
                        error!(command = "assign", error = %e, "Command failed");
                        MessagePayload::ephemeral(command.apology())
                    }
                };
                self.send_immediate(interaction, &message).await;
            }
            _ => self.deferred(interaction, &command).await,
        }
    }

    async fn send_immediate(&self, interaction: &Interaction, message: &MessagePayload) {
        if let Err(e) = self.reply.respond(interaction, message).await {
            error!(interaction_id = %interaction.id, error = %e, "Failed to answer interaction");
        }
    }

    async fn deferred(&self, interaction: &Interaction, command: &Command) {
        if let Err(e) = self.reply.defer(interaction).await {
            error!(command = command.name(), error = %e, "Failed to defer interaction");
            return;
        }

        let message = match self.query(command).await {
            Ok(message) => message,
            Err(e) => {
                error!(command = command.name(), error = %e, "Command failed");
                MessagePayload::ephemeral(command.apology())
            }
        };

        if let Err(e) = self.reply.follow_up(interaction, &message).await {
            error!(command = command.name(), error = %e, "Failed to send follow-up");
        }
    }

    async fn query(&self, command: &Command) -> Result<MessagePayload, GitHubError> {
        let now = Utc::now();

        let message = match command {
            Command::Prs => {
                let prs = self.github.open_pull_requests().await?;
                MessagePayload::embed(formatters::pr_list(&prs, now))
            }
            Command::Pr { number } => match self.github.pull_request(*number).await? {
                Some(pr) => MessagePayload::embed(formatters::pr_detail(&pr, now)),
                None => MessagePayload::ephemeral(format!("Pull request #{number} not found.")),
            },
            Command::Commits { branch } => {
                let commits = self.github.commits(branch, COMMIT_LIMIT).await?;
                if commits.is_empty() {
                    MessagePayload::ephemeral(format!(
                        "No commits found for branch `{branch}` or branch does not exist."
                    ))
                } else {
                    MessagePayload::embed(formatters::commit_list(&commits, branch, now))
                }
            }
            Command::Branches => {
                let branches = self.github.branches().await?;
                MessagePayload::embed(formatters::branch_list(&branches, now))
            }
            Command::Status => {
                let status = self.github.repository_status().await?;
                MessagePayload::embed(formatters::repository_status(&status, now))
            }
            Command::Assign { .. } | Command::Unknown(_) => {
                MessagePayload::ephemeral(command.apology())
            }
        };

        Ok(message)
    }

    async fn review_request(
        &self,
        interaction: &Interaction,
        user_id: &str,
        pr_number: u64,
    ) -> Result<MessagePayload, GitHubError> {
        let Some(pr) = self.github.pull_request(pr_number).await? else {
            return Ok(MessagePayload::ephemeral(format!(
                "Pull request #{pr_number} not found."
            )));
        };

        info!(
            reviewer = user_id,
            pr_number,
            requested_by = interaction.invoker_name(),
            "Review requested"
        );
        Ok(MessagePayload::embed(formatters::review_request(
            &pr,
            user_id,
            &interaction.invoker_display_name(),
        )))
    }
}
