//! Discord delivery primitives for the repository relay.
//!
//! This crate provides:
//! - [`Embed`], the structured message every notification and command reply is built from
//! - [`DiscordClient`], a thin REST client for messages, channels, interactions and commands
//! - [`NotifyChannel`], the seam the relay delivers notifications through
//!
//! # Usage
//!
//! ```no_run
//! use notify::{DiscordChannel, DiscordClient, Embed, EmbedColor, NotifyChannel};
//!
//! # async fn run() -> Result<(), notify::ChannelError> {
//! let client = DiscordClient::new("bot-token")?;
//! let channel = DiscordChannel::new(client, 123_456_789);
//!
//! let embed = Embed::new("Branch Created", EmbedColor::Green).description("**`feature/x`**");
//! channel.send(&embed).await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod channels;
pub mod client;
pub mod embed;
pub mod error;
pub mod interactions;

pub use channels::discord::DiscordChannel;
pub use channels::NotifyChannel;
pub use client::{ChannelInfo, DiscordClient, DEFAULT_API_URL};
pub use embed::{Embed, EmbedColor, EmbedField, EmbedFooter, BLANK};
pub use error::ChannelError;
pub use interactions::{
    CommandDefinition, CommandOption, CommandOptionType, InteractionResponse, MessagePayload,
};
