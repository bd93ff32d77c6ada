//! Reply-Chain Tracker
//!
//! Remembers, per (user, channel), the id of the last assistant reply so the
//! next answer can thread under it. Last write wins; entries never expire.

use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{ChannelId, MessageId, UserId};

#[derive(Default)]
pub struct ReplyChain {
    pointers: RwLock<HashMap<(UserId, ChannelId), MessageId>>,
}

impl ReplyChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, user_id: UserId, channel_id: ChannelId) -> Option<MessageId> {
        self.pointers.read().await.get(&(user_id, channel_id)).copied()
    }

    pub async fn set(&self, user_id: UserId, channel_id: ChannelId, message_id: MessageId) {
        self.pointers
            .write()
            .await
            .insert((user_id, channel_id), message_id);
        debug!(
            "Reply chain for user {} in channel {} -> {}",
            user_id, channel_id, message_id
        );
    }

    /// Tracked (user, channel) pairs
    pub async fn len(&self) -> usize {
        self.pointers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pointers.read().await.is_empty()
    }
}
