//! Discord message, interaction-response and command-definition payloads.

use serde::{Deserialize, Serialize};

use crate::embed::Embed;

/// Message flag that makes a reply visible only to the invoking user.
pub const EPHEMERAL: u64 = 1 << 6;

/// Body of a channel message, interaction reply or follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flags: Option<u64>,
}

impl MessagePayload {
    /// A message carrying a single embed.
    #[must_use]
    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
            flags: None,
        }
    }

    /// A plain text message only the invoking user can see.
    #[must_use]
    pub fn ephemeral(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
            flags: Some(EPHEMERAL),
        }
    }

    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.flags.is_some_and(|f| f & EPHEMERAL != 0)
    }
}

/// Interaction callback body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MessagePayload>,
}

impl InteractionResponse {
    /// `DEFERRED_CHANNEL_MESSAGE_WITH_SOURCE`: acknowledge now, follow up later.
    pub const DEFERRED: u8 = 5;
    /// `CHANNEL_MESSAGE_WITH_SOURCE`: reply immediately.
    pub const MESSAGE: u8 = 4;

    #[must_use]
    pub const fn deferred() -> Self {
        Self {
            kind: Self::DEFERRED,
            data: None,
        }
    }

    #[must_use]
    pub const fn message(payload: MessagePayload) -> Self {
        Self {
            kind: Self::MESSAGE,
            data: Some(payload),
        }
    }
}

/// Slash command option types used by the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOptionType {
    String,
    Integer,
    User,
}

impl CommandOptionType {
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::String => 3,
            Self::Integer => 4,
            Self::User => 6,
        }
    }
}

impl Serialize for CommandOptionType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

/// A slash command option.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOption {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: CommandOptionType,
    pub required: bool,
}

/// A chat-input slash command registration.
#[derive(Debug, Clone, Serialize)]
pub struct CommandDefinition {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOption>,
}

impl CommandDefinition {
    #[must_use]
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            options: Vec::new(),
        }
    }

    #[must_use]
    pub fn option(
        mut self,
        name: &str,
        description: &str,
        kind: CommandOptionType,
        required: bool,
    ) -> Self {
        self.options.push(CommandOption {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        });
        self
    }
}
