//! Slash command routing
//!
//! Parses interaction payloads into `Command`s and runs them against the
//! assistant, the conversation store and the reminder scheduler.

use std::sync::Arc;
use tracing::{info, warn};

use crate::assistant::Assistant;
use crate::channels::discord::{DiscordCommandData, DiscordCommandOption};
use crate::channels::{InteractionRef, OutgoingMessage, Platform};
use crate::clock;
use crate::reminders::{self, ReminderScheduler, ScheduleError};

pub const CLEARED_NOTICE: &str = "✅ Your AI conversation history has been cleared!";
pub const INVALID_MINUTES_NOTICE: &str = "❗ Please enter a positive number of minutes.";
pub const REMINDERS_UNAVAILABLE_NOTICE: &str =
    "❌ Reminders are unavailable right now. Please try again later.";
pub const GUILD_ONLY_NOTICE: &str = "❗ Reminders can only be set inside a server.";

/// Errors turning an interaction into a command
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: /{0}")]
    Unknown(String),

    #[error("missing option: {0}")]
    MissingOption(&'static str),

    #[error("invalid option: {0}")]
    InvalidOption(&'static str),
}

/// A parsed slash command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask { prompt: String },
    ClearHistory,
    RemindMe { minutes: i64, note: String },
}

impl Command {
    pub fn parse(data: &DiscordCommandData) -> Result<Self, CommandError> {
        match data.name.as_str() {
            "ask" => Ok(Self::Ask {
                prompt: string_option(&data.options, "prompt")?,
            }),
            "clearhistory" => Ok(Self::ClearHistory),
            "remindme" => {
                let minutes = option(&data.options, "minutes")?
                    .as_i64()
                    .ok_or(CommandError::InvalidOption("minutes"))?;
                Ok(Self::RemindMe {
                    minutes,
                    note: string_option(&data.options, "note")?,
                })
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ask { .. } => "ask",
            Self::ClearHistory => "clearhistory",
            Self::RemindMe { .. } => "remindme",
        }
    }
}

fn option<'a>(options: &'a [DiscordCommandOption], name: &'static str) -> Result<&'a serde_json::Value, CommandError> {
    options
        .iter()
        .find(|o| o.name == name)
        .and_then(|o| o.value.as_ref())
        .ok_or(CommandError::MissingOption(name))
}

fn string_option(options: &[DiscordCommandOption], name: &'static str) -> Result<String, CommandError> {
    option(options, name)?
        .as_str()
        .map(str::to_string)
        .ok_or(CommandError::InvalidOption(name))
}

/// Routes parsed commands to their handlers
pub struct CommandRouter {
    platform: Arc<dyn Platform>,
    assistant: Arc<Assistant>,
    /// None when durable storage is unavailable
    scheduler: Option<Arc<ReminderScheduler>>,
}

impl CommandRouter {
    pub fn new(
        platform: Arc<dyn Platform>,
        assistant: Arc<Assistant>,
        scheduler: Option<Arc<ReminderScheduler>>,
    ) -> Self {
        Self {
            platform,
            assistant,
            scheduler,
        }
    }

    /// Run one command to completion
    pub async fn dispatch(&self, interaction: InteractionRef, command: Command) {
        info!("/{} from user {}", command.name(), interaction.user_id);

        match command {
            Command::Ask { prompt } => {
                self.assistant.handle_ask(&interaction, &prompt).await;
            }
            Command::ClearHistory => {
                self.assistant
                    .conversations()
                    .clear(interaction.user_id)
                    .await;
                self.reply_ephemeral(&interaction, CLEARED_NOTICE).await;
            }
            Command::RemindMe { minutes, note } => {
                let text = self.remind_me(&interaction, minutes, &note);
                self.reply_ephemeral(&interaction, &text).await;
            }
        }
    }

    fn remind_me(&self, interaction: &InteractionRef, minutes: i64, note: &str) -> String {
        let due_at = match reminders::due_in(minutes, clock::now()) {
            Ok(due_at) => due_at,
            Err(_) => return INVALID_MINUTES_NOTICE.to_string(),
        };

        let Some(scheduler) = &self.scheduler else {
            return REMINDERS_UNAVAILABLE_NOTICE.to_string();
        };

        let Some(guild_id) = interaction.guild_id else {
            return GUILD_ONLY_NOTICE.to_string();
        };

        match scheduler.schedule(
            interaction.user_id,
            guild_id,
            interaction.channel_id,
            note,
            due_at,
        ) {
            Ok(_) => format!("⏰ I'll remind you in `{}` minutes: `{}`", minutes, note.trim()),
            Err(ScheduleError::EmptyNote) => "❗ Please include a reminder note.".to_string(),
            Err(e) => {
                warn!("Failed to schedule reminder for user {}: {}", interaction.user_id, e);
                format!("❌ Error: {}", e)
            }
        }
    }

    async fn reply_ephemeral(&self, interaction: &InteractionRef, text: &str) {
        let message = OutgoingMessage::text(text).ephemeral();
        if let Err(e) = self.platform.respond(interaction, &message).await {
            warn!("Failed to answer interaction {}: {}", interaction.id, e);
        }
    }
}
