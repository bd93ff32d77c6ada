//! Chat Platform Layer
//!
//! The `Platform` trait is everything the bot core needs from a chat
//! service. Discord is the only implementation; tests supply in-process fakes.

pub mod discord;
pub mod traits;

pub use discord::{DiscordChannel, DiscordConfig, DiscordInteraction};
pub use traits::{
    Embed, InteractionRef, OutgoingMessage, Platform, PlatformChannel, PlatformError,
    PlatformUser, ReadyGate,
};
