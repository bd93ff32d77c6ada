//! Neroniel Bot
//!
//! Session, history and reminder core for a Discord assistant bot.
//!
//! # Features
//!
//! - **`/ask`**: completion-backed answers with per-user history and threaded replies
//! - **Rate Limiting**: sliding window per user
//! - **Hybrid History**: in-memory cache hydrated from a 7-day SQLite log
//! - **Reminders**: durable one-shot reminders with a periodic dispatcher
//! - **Language Matching**: replies in the language of the prompt
//!
//! # Architecture
//!
//! ```text
//! Discord ──► /interactions ──► CommandRouter ──► Assistant ──► Completion API
//!             (axum, Ed25519)        │               │
//!                                    │               ├── RateLimiter
//!                                    │               ├── ConversationStore ──► SQLite
//!                                    │               └── ReplyChain
//!                                    └── ReminderScheduler ──► SQLite
//!                                              │
//!                                              └──► Discord REST (reqwest)
//! ```

pub mod assistant;
pub mod channels;
pub mod clock;
pub mod commands;
pub mod completion;
pub mod config;
pub mod conversation;
pub mod language;
pub mod rate_limit;
pub mod reminders;
pub mod reply_chain;
pub mod server;
pub mod storage;
pub mod types;

pub use assistant::{AskOutcome, Assistant, Persona};
pub use channels::{DiscordChannel, DiscordConfig, Platform, PlatformError};
pub use commands::{Command, CommandRouter};
pub use completion::{CompletionBackend, CompletionError, CompletionRequest, TogetherClient};
pub use config::Config;
pub use conversation::{ConversationStore, ConversationTurn};
pub use rate_limit::{RateLimitConfig, RateLimiter};
pub use reminders::{DispatchOutcome, ReminderScheduler, TickReport};
pub use reply_chain::ReplyChain;
pub use storage::{Database, ReminderLog, StorageError, TurnLog};
pub use types::{ChannelId, GuildId, MessageId, UserId};
