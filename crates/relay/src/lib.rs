//! GitHub to Discord repository relay.
//!
//! This crate provides:
//! - Webhook signature verification and event classification
//! - Embed formatting for repository activity and command replies
//! - The HTTP server receiving GitHub deliveries
//! - A GitHub REST client for on-demand repository queries
//! - The Discord gateway session, slash command responder and chat loop
//! - [`NotificationRelay`], the hand-off between the HTTP runtime and the chat loop

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod chat;
pub mod commands;
pub mod config;
pub mod events;
pub mod formatters;
pub mod gateway;
pub mod github_client;
pub mod logging;
pub mod models;
pub mod relay;
pub mod server;
pub mod webhooks;

pub use chat::ChatClient;
pub use config::{Config, ConfigError, RepoName};
pub use events::{classify, Classification, PayloadError, WebhookEvent};
pub use github_client::{GitHubClient, GitHubError, RepoQuery};
pub use relay::{NotificationRelay, Submission};
pub use server::AppState;
pub use webhooks::{sign_payload, verify_webhook_signature};
