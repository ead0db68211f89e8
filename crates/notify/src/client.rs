//! Discord REST client.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::interactions::{CommandDefinition, InteractionResponse, MessagePayload};

/// Discord REST API base URL.
pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";

/// Minimal view of a Discord channel.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Discord REST client authenticated as a bot.
#[derive(Debug, Clone)]
pub struct DiscordClient {
    client: reqwest::Client,
    base_url: String,
}

impl DiscordClient {
    /// Create a client against the public Discord API.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be created.
    pub fn new(token: &str) -> Result<Self, ChannelError> {
        Self::with_base_url(token, DEFAULT_API_URL)
    }

    /// Create a client against a custom API base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be created.
    pub fn with_base_url(token: &str, base_url: &str) -> Result<Self, ChannelError> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| ChannelError::NotConfigured("DISCORD_BOT_TOKEN".to_string()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("DiscordBot (https://github.com/5dlabs/repo-relay, 0.1)"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Post a message to a channel.
    pub async fn create_message(
        &self,
        channel_id: u64,
        message: &MessagePayload,
    ) -> Result<(), ChannelError> {
        let url = format!("{}/channels/{channel_id}/messages", self.base_url);
        debug!(channel_id, "Posting channel message");

        let response = self.client.post(&url).json(message).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Fetch a channel by id.
    pub async fn get_channel(&self, channel_id: u64) -> Result<ChannelInfo, ChannelError> {
        let url = format!("{}/channels/{channel_id}", self.base_url);

        let response = self.client.get(&url).send().await?;
        let response = check(response).await?;
        Ok(response.json().await?)
    }

    /// Answer an interaction (defer or immediate reply).
    pub async fn create_interaction_response(
        &self,
        interaction_id: &str,
        interaction_token: &str,
        response: &InteractionResponse,
    ) -> Result<(), ChannelError> {
        let url = format!(
            "{}/interactions/{interaction_id}/{interaction_token}/callback",
            self.base_url
        );

        let resp = self.client.post(&url).json(response).send().await?;
        check(resp).await?;
        Ok(())
    }

    /// Send a follow-up message for a previously answered interaction.
    pub async fn create_followup(
        &self,
        application_id: &str,
        interaction_token: &str,
        message: &MessagePayload,
    ) -> Result<(), ChannelError> {
        let url = format!(
            "{}/webhooks/{application_id}/{interaction_token}",
            self.base_url
        );

        let response = self.client.post(&url).json(message).send().await?;
        check(response).await?;
        Ok(())
    }

    /// Replace the guild's slash commands with `commands`.
    ///
    /// Returns the number of commands Discord reports as registered.
    pub async fn register_guild_commands(
        &self,
        application_id: &str,
        guild_id: u64,
        commands: &[CommandDefinition],
    ) -> Result<usize, ChannelError> {
        let url = format!(
            "{}/applications/{application_id}/guilds/{guild_id}/commands",
            self.base_url
        );

        let response = self.client.put(&url).json(commands).send().await?;
        let response = check(response).await?;
        let registered: Vec<serde_json::Value> = response.json().await?;
        Ok(registered.len())
    }
}

/// Map non-success statuses to [`ChannelError`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status.as_u16() == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<f64>().ok())
            .map_or(5, |secs| secs.ceil() as u64);

        warn!(retry_after_secs = retry_after, "Rate limited by Discord");

        return Err(ChannelError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    warn!(status = %status, body = %body, "Discord request failed");

    Err(ChannelError::Api {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{Embed, EmbedColor};
    use crate::interactions::CommandOptionType;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> DiscordClient {
        DiscordClient::with_base_url("test-token", &server.uri()).unwrap()
    }

    #[tokio::test]
    async fn test_create_message_posts_embed_with_bot_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .and(header("authorization", "Bot test-token"))
            .and(body_partial_json(serde_json::json!({
                "embeds": [{ "title": "Branch Created" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let embed = Embed::new("Branch Created", EmbedColor::Green);
        client(&server)
            .await
            .create_message(42, &MessagePayload::embed(embed))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/42/messages"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1.5"))
            .mount(&server)
            .await;

        let err = client(&server)
            .await
            .create_message(42, &MessagePayload::ephemeral("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::RateLimited { retry_after_secs: 2 }));
    }

    #[tokio::test]
    async fn test_api_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Unknown Channel"))
            .mount(&server)
            .await;

        let err = client(&server).await.get_channel(7).await.unwrap_err();
        match err {
            ChannelError::Api { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Unknown Channel");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_get_channel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/channels/7"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "id": "7", "name": "dev-feed" })),
            )
            .mount(&server)
            .await;

        let channel = client(&server).await.get_channel(7).await.unwrap();
        assert_eq!(channel.name.as_deref(), Some("dev-feed"));
    }

    #[tokio::test]
    async fn test_interaction_callback_and_followup_paths() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/interactions/111/tok/callback"))
            .and(body_partial_json(serde_json::json!({ "type": 5 })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/webhooks/999/tok"))
            .and(body_partial_json(serde_json::json!({ "flags": 64 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let discord = client(&server).await;
        discord
            .create_interaction_response("111", "tok", &InteractionResponse::deferred())
            .await
            .unwrap();
        discord
            .create_followup("999", "tok", &MessagePayload::ephemeral("sorry"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_register_guild_commands_counts_result() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/applications/999/guilds/5/commands"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "1", "name": "prs" },
                { "id": "2", "name": "pr" }
            ])))
            .mount(&server)
            .await;

        let commands = vec![
            CommandDefinition::new("prs", "List all open pull requests"),
            CommandDefinition::new("pr", "Get a pull request").option(
                "number",
                "Pull request number",
                CommandOptionType::Integer,
                true,
            ),
        ];

        let count = client(&server)
            .await
            .register_guild_commands("999", 5, &commands)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }
}
