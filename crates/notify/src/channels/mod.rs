//! Notification channel implementations.

pub mod discord;

use async_trait::async_trait;

use crate::embed::Embed;
use crate::error::ChannelError;

/// Destination a formatted notification is delivered to.
#[async_trait]
pub trait NotifyChannel: Send + Sync {
    /// Get the name of this channel.
    fn name(&self) -> &'static str;

    /// Send a notification to this channel.
    async fn send(&self, embed: &Embed) -> Result<(), ChannelError>;
}
