//! Discord Channel Implementation
//!
//! Talks to the Discord REST API (v10) directly with reqwest. Gateway
//! sessions are not managed here; commands arrive through the interactions
//! endpoint (see `server`).
//!
//! # Configuration
//!
//! Environment variables:
//! - `DISCORD_TOKEN`: Discord bot token
//! - `DISCORD_APPLICATION_ID`: Discord application ID

use super::traits::*;
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::types::{ChannelId, GuildId, MessageId, UserId};

/// Discord REST base URL
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Interaction callback: deferred channel message ("Bot is thinking…")
const CALLBACK_DEFERRED: u8 = 5;

/// Interaction callback: immediate channel message
const CALLBACK_MESSAGE: u8 = 4;

/// Discord channel configuration
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    /// Bot token
    pub bot_token: String,
    /// Application ID
    pub application_id: String,
    /// REST base URL (overridable for tests)
    pub api_base: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl DiscordConfig {
    pub fn new(bot_token: &str, application_id: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            application_id: application_id.to_string(),
            api_base: DISCORD_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Build from the bot configuration
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            timeout: config.http_timeout,
            ..Self::new(&config.discord_token, &config.discord_application_id)
        }
    }
}

/// Discord channel implementation
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
    ready: ReadyGate,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Result<Self, PlatformError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| PlatformError::Internal(e.to_string()))?;

        Ok(Self {
            config,
            client,
            ready: ReadyGate::new(),
        })
    }

    /// Verify the bot token and open the readiness gate
    pub async fn connect(&self) -> Result<PlatformUser, PlatformError> {
        let response = self
            .client
            .get(self.url("/users/@me"))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(PlatformError::Forbidden("Invalid Discord bot token".to_string()));
        }

        let me: DiscordUser = parse(check(response, "current user").await?).await?;
        let user = me.into_platform()?;
        self.ready.open();

        info!("Discord channel connected as {} ({})", user.username, user.id);
        Ok(user)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.config.bot_token)
    }

    /// POST a JSON payload with bot auth, returning the created message id
    async fn post_message(&self, path: &str, payload: serde_json::Value, what: &str) -> Result<MessageId, PlatformError> {
        let response = self
            .client
            .post(self.url(path))
            .header("Authorization", self.auth())
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        let message: DiscordMessage = parse(check(response, what).await?).await?;
        message.id.parse().map(MessageId).map_err(|_| {
            PlatformError::Internal(format!("invalid message id from Discord: {}", message.id))
        })
    }

    async fn interaction_callback(&self, interaction: &InteractionRef, payload: serde_json::Value) -> Result<(), PlatformError> {
        // Interaction callbacks are authenticated by the token in the path
        let response = self
            .client
            .post(self.url(&format!(
                "/interactions/{}/{}/callback",
                interaction.id, interaction.token
            )))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        check(response, "interaction callback").await?;
        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T, PlatformError> {
        let response = self
            .client
            .get(self.url(path))
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| PlatformError::Request(e.to_string()))?;

        parse(check(response, what).await?).await
    }
}

#[async_trait]
impl Platform for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    fn is_ready(&self) -> bool {
        self.ready.is_open()
    }

    async fn wait_until_ready(&self) {
        self.ready.wait().await
    }

    async fn acknowledge(&self, interaction: &InteractionRef, ephemeral: bool) -> Result<(), PlatformError> {
        let mut payload = serde_json::json!({ "type": CALLBACK_DEFERRED });
        if ephemeral {
            payload["data"] = serde_json::json!({ "flags": EPHEMERAL_FLAG });
        }
        self.interaction_callback(interaction, payload).await?;
        debug!("Deferred interaction {}", interaction.id);
        Ok(())
    }

    async fn respond(&self, interaction: &InteractionRef, message: &OutgoingMessage) -> Result<(), PlatformError> {
        let payload = serde_json::json!({
            "type": CALLBACK_MESSAGE,
            "data": message.to_json(),
        });
        self.interaction_callback(interaction, payload).await
    }

    async fn followup(&self, interaction: &InteractionRef, message: &OutgoingMessage) -> Result<MessageId, PlatformError> {
        let path = format!(
            "/webhooks/{}/{}",
            self.config.application_id, interaction.token
        );
        self.post_message(&path, message.to_json(), "follow-up").await
    }

    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> Result<MessageId, PlatformError> {
        if !self.is_ready() {
            return Err(PlatformError::NotReady);
        }
        let path = format!("/channels/{}/messages", channel_id);
        self.post_message(&path, message.to_json(), "channel message").await
    }

    async fn reply_to(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        if !self.is_ready() {
            return Err(PlatformError::NotReady);
        }
        let mut payload = message.to_json();
        payload["message_reference"] = serde_json::json!({
            "message_id": message_id.to_string(),
        });
        let path = format!("/channels/{}/messages", channel_id);
        self.post_message(&path, payload, "reply").await
    }

    async fn fetch_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<MessageId, PlatformError> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        let message: DiscordMessage = self.get(&path, "message").await?;
        message
            .id
            .parse()
            .map(MessageId)
            .map_err(|_| PlatformError::Internal(format!("invalid message id: {}", message.id)))
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<PlatformUser, PlatformError> {
        let user: DiscordUser = self.get(&format!("/users/{}", user_id), "user").await?;
        user.into_platform()
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<PlatformChannel, PlatformError> {
        let channel: DiscordChannelObject =
            self.get(&format!("/channels/{}", channel_id), "channel").await?;

        Ok(PlatformChannel {
            id: channel_id,
            guild_id: channel.guild_id.and_then(|g| g.parse().ok()),
            name: channel.name,
        })
    }
}

/// Map a Discord HTTP status onto the platform error taxonomy
async fn check(response: Response, what: &str) -> Result<Response, PlatformError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(PlatformError::NotFound(format!("{} ({})", what, body))),
        StatusCode::FORBIDDEN => Err(PlatformError::Forbidden(format!("{} ({})", what, body))),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = serde_json::from_str::<RateLimitBody>(&body)
                .map(|b| b.retry_after.ceil() as u64)
                .unwrap_or(5);
            warn!("Discord rate limited {} request, retry after {}s", what, retry_after);
            Err(PlatformError::RateLimited(retry_after))
        }
        _ => Err(PlatformError::Request(format!(
            "Discord error {} on {}: {}",
            status, what, body
        ))),
    }
}

async fn parse<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, PlatformError> {
    response
        .json()
        .await
        .map_err(|e| PlatformError::Internal(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct RateLimitBody {
    retry_after: f64,
}

#[derive(Debug, Deserialize)]
struct DiscordMessage {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DiscordChannelObject {
    guild_id: Option<String>,
    name: Option<String>,
}

/// Discord user object
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordUser {
    pub id: String,
    pub username: String,
}

impl DiscordUser {
    fn into_platform(self) -> Result<PlatformUser, PlatformError> {
        let id = self
            .id
            .parse()
            .map_err(|_| PlatformError::Internal(format!("invalid user id: {}", self.id)))?;
        Ok(PlatformUser {
            id,
            username: self.username,
        })
    }
}

/// Interaction payload delivered to the interactions endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordInteraction {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    pub token: String,
    pub channel_id: Option<String>,
    pub guild_id: Option<String>,
    /// Present in guilds
    pub member: Option<DiscordMember>,
    /// Present in direct messages
    pub user: Option<DiscordUser>,
    pub data: Option<DiscordCommandData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMember {
    pub user: DiscordUser,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordCommandData {
    pub name: String,
    #[serde(default)]
    pub options: Vec<DiscordCommandOption>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscordCommandOption {
    pub name: String,
    pub value: Option<serde_json::Value>,
}

/// Interaction types we act on
pub const INTERACTION_PING: u8 = 1;
pub const INTERACTION_APPLICATION_COMMAND: u8 = 2;

impl DiscordInteraction {
    /// Who invoked the interaction, in guilds or DMs
    pub fn invoker(&self) -> Option<&DiscordUser> {
        self.member.as_ref().map(|m| &m.user).or(self.user.as_ref())
    }

    /// Reference used for callbacks, or None if ids are missing or malformed
    pub fn to_ref(&self) -> Option<InteractionRef> {
        let user_id = self.invoker()?.id.parse().ok()?;
        let channel_id = self.channel_id.as_deref()?.parse().ok()?;
        let guild_id = match self.guild_id.as_deref() {
            Some(g) => Some(g.parse::<GuildId>().ok()?),
            None => None,
        };

        Some(InteractionRef {
            id: self.id.clone(),
            token: self.token.clone(),
            user_id,
            channel_id,
            guild_id,
        })
    }
}
