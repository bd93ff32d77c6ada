//! Conversation Store
//!
//! Two-tier `/ask` history per user:
//! - in-memory list of the 5 most recent turns (FIFO eviction)
//! - durable turn log with a 7-day TTL
//!
//! The in-memory list is hydrated from the durable log the first time a user
//! is seen in the process lifetime and kept in sync incrementally after that.
//! Presence of a user key in the cache *is* the hydration guard: an empty list
//! for a known user never triggers another durable query.

use chrono::{DateTime, FixedOffset};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock;
use crate::storage::TurnLog;
use crate::types::UserId;

/// Turns kept per user in memory, and fetched on hydration
pub const HISTORY_LIMIT: usize = 5;

/// One prompt/response exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user_id: UserId,
    pub prompt: String,
    pub response: String,
    pub created_at: DateTime<FixedOffset>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current bot time
    pub fn new(user_id: UserId, prompt: &str, response: &str) -> Self {
        Self {
            user_id,
            prompt: prompt.to_string(),
            response: response.to_string(),
            created_at: clock::now(),
        }
    }
}

/// Hybrid in-memory / durable conversation history
pub struct ConversationStore {
    /// None when the durable store was unreachable at startup
    durable: Option<Arc<dyn TurnLog>>,
    cache: RwLock<HashMap<UserId, VecDeque<ConversationTurn>>>,
    limit: usize,
}

impl ConversationStore {
    /// Store backed by a durable turn log
    pub fn new(durable: Arc<dyn TurnLog>) -> Self {
        Self::with_backend(Some(durable))
    }

    /// Degraded store: no hydration, no persistence
    pub fn in_memory() -> Self {
        Self::with_backend(None)
    }

    /// Durable log if one is available, in-memory otherwise
    pub fn with_backend(durable: Option<Arc<dyn TurnLog>>) -> Self {
        if durable.is_none() {
            warn!("Conversation store running in-memory only (no durable history)");
        }
        Self {
            durable,
            cache: RwLock::new(HashMap::new()),
            limit: HISTORY_LIMIT,
        }
    }

    /// Whether turns are persisted
    pub fn is_durable(&self) -> bool {
        self.durable.is_some()
    }

    /// Up to 5 turns for a user, oldest first
    pub async fn get_history(&self, user_id: UserId) -> Vec<ConversationTurn> {
        if let Some(turns) = self.cache.read().await.get(&user_id) {
            return turns.iter().cloned().collect();
        }

        let hydrated = self.hydrate(user_id);
        let mut cache = self.cache.write().await;
        // A concurrent call may have hydrated while we were querying; keep its list
        let turns = cache.entry(user_id).or_insert(hydrated);
        turns.iter().cloned().collect()
    }

    /// Record a completed turn in both tiers
    pub async fn append(&self, user_id: UserId, turn: ConversationTurn) {
        // Hydrate first so the durable insert below is not read back as history
        let needs_hydration = !self.cache.read().await.contains_key(&user_id);
        let hydrated = if needs_hydration {
            Some(self.hydrate(user_id))
        } else {
            None
        };

        {
            let mut cache = self.cache.write().await;
            let turns = cache
                .entry(user_id)
                .or_insert_with(|| hydrated.unwrap_or_default());
            turns.push_back(turn.clone());
            while turns.len() > self.limit {
                turns.pop_front();
            }
        }

        if let Some(log) = &self.durable {
            if let Err(e) = log.insert_turn(&turn) {
                warn!("Failed to persist turn for user {}: {}", user_id, e);
            }
        }

        debug!("Appended turn for user {}", user_id);
    }

    /// Forget a user's history in both tiers
    pub async fn clear(&self, user_id: UserId) {
        // Keep the key so a failed durable delete is never rehydrated
        self.cache.write().await.insert(user_id, VecDeque::new());

        if let Some(log) = &self.durable {
            match log.delete_turns(user_id) {
                Ok(rows) => info!("Cleared history for user {} ({} stored turns)", user_id, rows),
                Err(e) => warn!("Failed to delete stored history for user {}: {}", user_id, e),
            }
        }
    }

    /// Cache occupancy
    pub async fn stats(&self) -> ConversationStats {
        let cache = self.cache.read().await;
        ConversationStats {
            cached_users: cache.len(),
            cached_turns: cache.values().map(VecDeque::len).sum(),
            durable: self.is_durable(),
        }
    }

    /// Most recent turns from the durable log, chronological
    fn hydrate(&self, user_id: UserId) -> VecDeque<ConversationTurn> {
        let Some(log) = &self.durable else {
            return VecDeque::new();
        };

        match log.recent_turns(user_id, self.limit, clock::now()) {
            Ok(mut turns) => {
                turns.reverse();
                debug!("Hydrated {} turns for user {}", turns.len(), user_id);
                turns.into()
            }
            Err(e) => {
                warn!("History hydration failed for user {}: {}", user_id, e);
                VecDeque::new()
            }
        }
    }
}

/// Conversation cache statistics
#[derive(Debug, Clone, Copy)]
pub struct ConversationStats {
    pub cached_users: usize,
    pub cached_turns: usize,
    pub durable: bool,
}

/// Persona instruction that opens every prompt
pub fn system_instruction(bot_name: &str) -> String {
    format!("You are a helpful and friendly AI assistant named {}.", bot_name)
}

/// Assemble the completion prompt
///
/// Layout: system instruction (plus language directive when present), one
/// `User:` / `Assistant:` line pair per history turn oldest first, then the
/// new prompt and an open `Assistant:` line for the model to continue.
pub fn build_prompt(
    system_instruction: &str,
    language_directive: Option<&str>,
    history: &[ConversationTurn],
    prompt: &str,
) -> String {
    let mut full = String::from(system_instruction);
    if let Some(directive) = language_directive.filter(|d| !d.is_empty()) {
        full.push(' ');
        full.push_str(directive);
    }
    full.push('\n');

    for turn in history {
        full.push_str(&format!("User: {}\nAssistant: {}\n", turn.prompt, turn.response));
    }
    full.push_str(&format!("User: {}\nAssistant:", prompt));

    full
}
