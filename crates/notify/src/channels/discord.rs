//! Discord text-channel notification channel.

use async_trait::async_trait;
use tracing::debug;

use super::NotifyChannel;
use crate::client::DiscordClient;
use crate::embed::Embed;
use crate::error::ChannelError;
use crate::interactions::MessagePayload;

/// Posts notifications into one Discord text channel as the bot user.
#[derive(Debug, Clone)]
pub struct DiscordChannel {
    client: DiscordClient,
    channel_id: u64,
}

impl DiscordChannel {
    #[must_use]
    pub const fn new(client: DiscordClient, channel_id: u64) -> Self {
        Self { client, channel_id }
    }

    #[must_use]
    pub const fn channel_id(&self) -> u64 {
        self.channel_id
    }
}

#[async_trait]
impl NotifyChannel for DiscordChannel {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn send(&self, embed: &Embed) -> Result<(), ChannelError> {
        debug!(channel = "discord", title = %embed.title, "Sending notification");

        self.client
            .create_message(self.channel_id, &MessagePayload::embed(embed.clone()))
            .await
    }
}
