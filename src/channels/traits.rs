//! Platform Trait Definitions
//!
//! The outbound half of the chat platform as the bot core sees it: interaction
//! acknowledgement, sending, threaded replies and id lookups.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::json;
use tokio::sync::watch;

use crate::clock;
use crate::types::{ChannelId, GuildId, MessageId, UserId};

/// Discord's embed description limit
pub const MAX_EMBED_DESCRIPTION: usize = 4096;

/// Discord's message content limit
pub const MAX_CONTENT_LENGTH: usize = 2000;

/// Embed accent color (Discord "blue")
pub const EMBED_BLUE: u32 = 0x3498db;

/// Error types for platform operations
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Forbidden(String),

    #[error("Rate limited: retry after {0} seconds")]
    RateLimited(u64),

    #[error("Platform not ready")]
    NotReady,

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// The interaction a command arrived on
#[derive(Debug, Clone)]
pub struct InteractionRef {
    /// Interaction id
    pub id: String,
    /// Continuation token for callbacks and follow-ups
    pub token: String,
    pub user_id: UserId,
    pub channel_id: ChannelId,
    /// None in direct messages
    pub guild_id: Option<GuildId>,
}

/// Rich embed
#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub description: String,
    pub color: u32,
    pub footer: Option<String>,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl Embed {
    /// Blue embed stamped with the current bot time
    pub fn new(description: &str) -> Self {
        Self {
            description: truncate_chars(description, MAX_EMBED_DESCRIPTION),
            color: EMBED_BLUE,
            footer: None,
            timestamp: Some(clock::now()),
        }
    }

    pub fn with_footer(mut self, footer: &str) -> Self {
        self.footer = Some(footer.to_string());
        self
    }
}

/// Message to post
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    /// Only visible to the invoking user (interaction responses only)
    pub ephemeral: bool,
}

impl OutgoingMessage {
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(truncate_chars(content, MAX_CONTENT_LENGTH)),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Visible text, for logs and tests
    pub fn body(&self) -> &str {
        self.content
            .as_deref()
            .or_else(|| self.embed.as_ref().map(|e| e.description.as_str()))
            .unwrap_or_default()
    }

    /// Discord message JSON
    pub fn to_json(&self) -> serde_json::Value {
        let mut payload = json!({});

        if let Some(content) = &self.content {
            payload["content"] = json!(content);
        }

        if let Some(embed) = &self.embed {
            let mut e = json!({
                "description": embed.description,
                "color": embed.color,
            });
            if let Some(footer) = &embed.footer {
                e["footer"] = json!({ "text": footer });
            }
            if let Some(ts) = &embed.timestamp {
                e["timestamp"] = json!(ts.to_rfc3339());
            }
            payload["embeds"] = json!([e]);
        }

        if self.ephemeral {
            payload["flags"] = json!(EPHEMERAL_FLAG);
        }

        payload
    }
}

/// Message flag hiding a response from everyone but the invoker
pub const EPHEMERAL_FLAG: u64 = 1 << 6;

/// A resolved user
#[derive(Debug, Clone)]
pub struct PlatformUser {
    pub id: UserId,
    pub username: String,
}

impl PlatformUser {
    pub fn mention(&self) -> String {
        self.id.mention()
    }
}

/// A resolved channel
#[derive(Debug, Clone)]
pub struct PlatformChannel {
    pub id: ChannelId,
    pub guild_id: Option<GuildId>,
    pub name: Option<String>,
}

/// Platform trait - implement for each chat service
#[async_trait]
pub trait Platform: Send + Sync {
    /// Platform name identifier
    fn name(&self) -> &str;

    /// Is the platform connection established?
    fn is_ready(&self) -> bool;

    /// Resolve once the connection is established
    async fn wait_until_ready(&self);

    /// Defer an interaction so a slow answer can follow
    async fn acknowledge(&self, interaction: &InteractionRef, ephemeral: bool) -> Result<(), PlatformError>;

    /// Answer an interaction immediately (no deferral)
    async fn respond(&self, interaction: &InteractionRef, message: &OutgoingMessage) -> Result<(), PlatformError>;

    /// Follow up on a deferred interaction
    async fn followup(&self, interaction: &InteractionRef, message: &OutgoingMessage) -> Result<MessageId, PlatformError>;

    /// Post a new message in a channel
    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> Result<MessageId, PlatformError>;

    /// Post a message threaded under an existing one
    async fn reply_to(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    /// Check that a message still exists
    async fn fetch_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<MessageId, PlatformError>;

    /// Look up a user
    async fn fetch_user(&self, user_id: UserId) -> Result<PlatformUser, PlatformError>;

    /// Look up a channel
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<PlatformChannel, PlatformError>;
}

/// One-way readiness latch shared by a platform and its waiters
#[derive(Debug)]
pub struct ReadyGate {
    tx: watch::Sender<bool>,
}

impl ReadyGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Mark ready and release every waiter
    pub fn open(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_open(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Cut a string to at most `max` chars, marking the cut with an ellipsis
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
