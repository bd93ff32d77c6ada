//! Shared test doubles: an in-process platform and a scripted completion API.

#![allow(dead_code)]

use async_trait::async_trait;
use neroniel_bot::channels::{
    InteractionRef, OutgoingMessage, Platform, PlatformChannel, PlatformError, PlatformUser,
    ReadyGate,
};
use neroniel_bot::completion::{CompletionBackend, CompletionError, CompletionRequest};
use neroniel_bot::{
    Assistant, ChannelId, ConversationStore, Database, GuildId, MessageId, RateLimitConfig,
    RateLimiter, ReplyChain, UserId,
};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Everything the fake platform was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Ack { ephemeral: bool },
    Respond(OutgoingMessage),
    Followup(MessageId, OutgoingMessage),
    Message(ChannelId, MessageId, OutgoingMessage),
    Reply {
        channel: ChannelId,
        target: MessageId,
        id: MessageId,
        message: OutgoingMessage,
    },
}

impl Sent {
    pub fn body(&self) -> Option<&str> {
        match self {
            Sent::Ack { .. } => None,
            Sent::Respond(m) | Sent::Followup(_, m) | Sent::Message(_, _, m) => Some(m.body()),
            Sent::Reply { message, .. } => Some(message.body()),
        }
    }
}

/// In-process platform recording every outbound call
pub struct FakePlatform {
    pub sent: Mutex<Vec<Sent>>,
    next_id: AtomicU64,
    live_messages: Mutex<HashSet<MessageId>>,
    unknown_users: Mutex<HashSet<UserId>>,
    unknown_channels: Mutex<HashSet<ChannelId>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    ready: ReadyGate,
}

impl FakePlatform {
    /// Platform that is already ready
    pub fn new() -> Arc<Self> {
        let platform = Self::not_ready();
        platform.ready.open();
        platform
    }

    pub fn not_ready() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1000),
            live_messages: Mutex::new(HashSet::new()),
            unknown_users: Mutex::new(HashSet::new()),
            unknown_channels: Mutex::new(HashSet::new()),
            failing_channels: Mutex::new(HashSet::new()),
            ready: ReadyGate::new(),
        })
    }

    pub fn open(&self) {
        self.ready.open();
    }

    /// Simulate a message being deleted in the channel
    pub fn delete_message(&self, id: MessageId) {
        self.live_messages.lock().remove(&id);
    }

    pub fn forget_user(&self, id: UserId) {
        self.unknown_users.lock().insert(id);
    }

    pub fn forget_channel(&self, id: ChannelId) {
        self.unknown_channels.lock().insert(id);
    }

    pub fn restore_channel(&self, id: ChannelId) {
        self.unknown_channels.lock().remove(&id);
    }

    pub fn fail_sends_to(&self, id: ChannelId) {
        self.failing_channels.lock().insert(id);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Visible bodies of every message sent, in order
    pub fn bodies(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|s| s.body().map(str::to_string))
            .collect()
    }

    pub fn last(&self) -> Option<Sent> {
        self.sent.lock().last().cloned()
    }

    fn mint(&self) -> MessageId {
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live_messages.lock().insert(id);
        id
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn name(&self) -> &str {
        "fake"
    }

    fn is_ready(&self) -> bool {
        self.ready.is_open()
    }

    async fn wait_until_ready(&self) {
        self.ready.wait().await
    }

    async fn acknowledge(&self, _interaction: &InteractionRef, ephemeral: bool) -> Result<(), PlatformError> {
        self.sent.lock().push(Sent::Ack { ephemeral });
        Ok(())
    }

    async fn respond(&self, _interaction: &InteractionRef, message: &OutgoingMessage) -> Result<(), PlatformError> {
        self.sent.lock().push(Sent::Respond(message.clone()));
        Ok(())
    }

    async fn followup(&self, _interaction: &InteractionRef, message: &OutgoingMessage) -> Result<MessageId, PlatformError> {
        let id = self.mint();
        self.sent.lock().push(Sent::Followup(id, message.clone()));
        Ok(id)
    }

    async fn send_message(&self, channel_id: ChannelId, message: &OutgoingMessage) -> Result<MessageId, PlatformError> {
        if self.failing_channels.lock().contains(&channel_id) {
            return Err(PlatformError::Forbidden(format!("channel {}", channel_id)));
        }
        let id = self.mint();
        self.sent
            .lock()
            .push(Sent::Message(channel_id, id, message.clone()));
        Ok(id)
    }

    async fn reply_to(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        message: &OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let id = self.mint();
        self.sent.lock().push(Sent::Reply {
            channel: channel_id,
            target: message_id,
            id,
            message: message.clone(),
        });
        Ok(id)
    }

    async fn fetch_message(&self, _channel_id: ChannelId, message_id: MessageId) -> Result<MessageId, PlatformError> {
        if self.live_messages.lock().contains(&message_id) {
            Ok(message_id)
        } else {
            Err(PlatformError::NotFound(format!("message {}", message_id)))
        }
    }

    async fn fetch_user(&self, user_id: UserId) -> Result<PlatformUser, PlatformError> {
        if self.unknown_users.lock().contains(&user_id) {
            return Err(PlatformError::NotFound(format!("user {}", user_id)));
        }
        Ok(PlatformUser {
            id: user_id,
            username: format!("user{}", user_id),
        })
    }

    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<PlatformChannel, PlatformError> {
        if self.unknown_channels.lock().contains(&channel_id) {
            return Err(PlatformError::NotFound(format!("channel {}", channel_id)));
        }
        Ok(PlatformChannel {
            id: channel_id,
            guild_id: Some(GuildId(1)),
            name: Some("general".to_string()),
        })
    }
}

/// Completion API returning scripted results, then "ok"
#[derive(Default)]
pub struct FakeCompletion {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: Result<String, CompletionError>) {
        self.script.lock().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.requests.lock().last().map(|r| r.prompt.clone())
    }
}

#[async_trait]
impl CompletionBackend for FakeCompletion {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok("ok".to_string()))
    }
}

/// Interaction from `user` in `channel` of guild 1
pub fn interaction(user: u64, channel: u64) -> InteractionRef {
    InteractionRef {
        id: format!("interaction-{}-{}", user, channel),
        token: "token".to_string(),
        user_id: UserId(user),
        channel_id: ChannelId(channel),
        guild_id: Some(GuildId(1)),
    }
}

/// Assistant wired to fakes and an in-memory database
pub struct Harness {
    pub platform: Arc<FakePlatform>,
    pub completion: Arc<FakeCompletion>,
    pub database: Arc<Database>,
    pub conversations: Arc<ConversationStore>,
    pub reply_chain: Arc<ReplyChain>,
    pub assistant: Arc<Assistant>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_rate_limit(RateLimitConfig::default())
    }

    pub fn with_rate_limit(rate_limit: RateLimitConfig) -> Self {
        let platform = FakePlatform::new();
        let completion = FakeCompletion::new();
        let database = Arc::new(Database::open_in_memory().unwrap());
        let conversations = Arc::new(ConversationStore::new(database.clone()));
        let reply_chain = Arc::new(ReplyChain::new());

        let assistant = Arc::new(Assistant::new(
            platform.clone(),
            completion.clone(),
            conversations.clone(),
            reply_chain.clone(),
            Arc::new(RateLimiter::new(rate_limit)),
        ));

        Self {
            platform,
            completion,
            database,
            conversations,
            reply_chain,
            assistant,
        }
    }
}
