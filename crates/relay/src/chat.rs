//! The chat loop: a dedicated thread running its own single-threaded runtime
//! that owns the gateway session, command handling and notification delivery.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{DiscordChannel, DiscordClient, NotifyChannel};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::commands::{self, CommandResponder};
use crate::gateway::{self, GatewayEvent, Identify, Ready};
use crate::github_client::RepoQuery;
use crate::relay::{deliver_notifications, NotificationRelay};

/// Pause before a new gateway session after one ends.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Everything the chat loop needs.
#[derive(Clone)]
pub struct ChatClient {
    pub discord: DiscordClient,
    pub github: Arc<dyn RepoQuery>,
    pub relay: NotificationRelay,
    pub gateway_url: String,
    pub identify: Identify,
    pub guild_id: u64,
    pub channel_id: u64,
}

impl ChatClient {
    /// Start the chat loop on its own OS thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("discord-chat".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "Failed to build chat runtime");
                        return;
                    }
                };
                runtime.block_on(self.run());
            })
    }

    /// Keep a gateway session alive, reconnecting after each one ends.
    pub async fn run(self) {
        loop {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let dispatcher = tokio::spawn(self.clone().dispatch(events_rx));

            match gateway::run_session(&self.gateway_url, &self.identify, &events_tx).await {
                Ok(end) => info!(?end, "Gateway session ended"),
                Err(e) => error!(error = %e, "Gateway session failed"),
            }

            drop(events_tx);
            self.relay.detach();
            if let Err(e) = dispatcher.await {
                error!(error = %e, "Dispatcher task failed");
            }

            info!(delay_secs = RECONNECT_DELAY.as_secs(), "Reconnecting to gateway");
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn dispatch(self, mut events: mpsc::UnboundedReceiver<GatewayEvent>) {
        let responder = CommandResponder::new(self.github.clone(), Arc::new(self.discord.clone()));

        while let Some(event) = events.recv().await {
            match event {
                GatewayEvent::Ready(ready) => self.on_ready(&ready).await,
                GatewayEvent::InteractionCreate(interaction) => {
                    let responder = responder.clone();
                    tokio::spawn(async move { responder.handle(&interaction).await });
                }
            }
        }
    }

    async fn on_ready(&self, ready: &Ready) {
        info!(
            user = %ready.user.username,
            user_id = %ready.user.id,
            application_id = %ready.application.id,
            "Bot logged in"
        );

        match self
            .discord
            .register_guild_commands(&ready.application.id, self.guild_id, &commands::definitions())
            .await
        {
            Ok(count) => info!(count, guild_id = self.guild_id, "Synced commands"),
            Err(e) => error!(error = %e, "Failed to sync commands"),
        }

        match self.discord.get_channel(self.channel_id).await {
            Ok(channel) => {
                info!(
                    channel = channel.name.as_deref().unwrap_or(&channel.id),
                    "Notification channel set"
                );
                let rx = self.relay.attach();
                let channel: Arc<dyn NotifyChannel> =
                    Arc::new(DiscordChannel::new(self.discord.clone(), self.channel_id));
                tokio::spawn(deliver_notifications(rx, channel));
            }
            Err(e) => {
                warn!(
                    channel_id = self.channel_id,
                    error = %e,
                    "Could not find notification channel"
                );
                self.relay.detach();
            }
        }
    }
}
