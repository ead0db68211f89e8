//! Hand-off of notifications from the HTTP runtime to the chat loop.
//!
//! The webhook handlers run on the multi-thread runtime, while Discord
//! sends happen on the chat thread's own runtime. [`NotificationRelay`] is the
//! only thing the two share: a swappable sender that the chat loop attaches
//! once it can deliver and detaches when its session ends.

use std::sync::{Arc, PoisonError, RwLock};

use notify::{Embed, NotifyChannel};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Result of handing a notification to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Queued for the chat loop
    Submitted,
    /// No chat loop attached; the notification is gone
    Dropped,
}

/// Process-wide handle to the chat loop's notification queue.
#[derive(Debug, Clone, Default)]
pub struct NotificationRelay {
    sender: Arc<RwLock<Option<mpsc::UnboundedSender<Embed>>>>,
}

impl NotificationRelay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a fresh queue and route submissions into it. Any previously
    /// attached queue is replaced.
    pub fn attach(&self) -> mpsc::UnboundedReceiver<Embed> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.sender.write().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        info!("Notification relay attached");
        rx
    }

    /// Stop routing submissions. Later submissions are dropped.
    pub fn detach(&self) {
        let previous = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if previous.is_some() {
            info!("Notification relay detached");
        }
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Queue a notification for delivery. Never blocks and never waits for
    /// the send itself.
    pub fn submit(&self, embed: Embed) -> Submission {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);

        let Some(tx) = guard.as_ref() else {
            warn!(title = %embed.title, "Chat client not connected, dropping notification");
            return Submission::Dropped;
        };

        match tx.send(embed) {
            Ok(()) => Submission::Submitted,
            Err(mpsc::error::SendError(embed)) => {
                warn!(title = %embed.title, "Notification queue closed, dropping notification");
                Submission::Dropped
            }
        }
    }
}

/// Drain `rx`, sending each notification through `channel`.
///
/// Failures are logged and the loop moves on. Returns once the relay has
/// been detached and the queue is empty.
pub async fn deliver_notifications(
    mut rx: mpsc::UnboundedReceiver<Embed>,
    channel: Arc<dyn NotifyChannel>,
) {
    while let Some(embed) = rx.recv().await {
        match channel.send(&embed).await {
            Ok(()) => info!(channel = channel.name(), title = %embed.title, "Notification sent"),
            Err(e) => error!(
                channel = channel.name(),
                title = %embed.title,
                error = %e,
                "Failed to send notification"
            ),
        }
    }
}
