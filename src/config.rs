//! Configuration management

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::rate_limit::RateLimitConfig;

/// Together AI completions endpoint
pub const DEFAULT_COMPLETION_URL: &str = "https://api.together.xyz/v1/completions";

/// Default completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "meta-llama/Llama-3-70b-chat-hf";

/// Bot configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,

    /// Discord application ID (used for interaction follow-ups)
    pub discord_application_id: String,

    /// Hex-encoded Ed25519 public key for interaction signatures
    pub discord_public_key: String,

    /// Completion API settings
    pub completion: CompletionConfig,

    /// SQLite database path for history and reminders
    pub db_path: PathBuf,

    /// Address of the interactions / keep-alive HTTP server
    pub bind_addr: SocketAddr,

    /// Persona name shown in replies and the system instruction
    pub bot_name: String,

    /// Name given in answers to "who made you"
    pub bot_creator: String,

    /// `/ask` admission limits
    pub ask_rate_limit: RateLimitConfig,

    /// Reminder dispatch cadence
    pub reminder_poll_interval: Duration,

    /// Network timeout for outbound HTTP calls
    pub http_timeout: Duration,

    /// Emit JSON logs
    pub log_json: bool,
}

/// Completion API configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// API key (completion calls fail without it)
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: DEFAULT_COMPLETION_URL.to_string(),
            model: DEFAULT_COMPLETION_MODEL.to_string(),
            max_tokens: 2048,
            temperature: 0.7,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let discord_token = required("DISCORD_TOKEN")?;
        let discord_application_id = required("DISCORD_APPLICATION_ID")?;
        let discord_public_key = required("DISCORD_PUBLIC_KEY")?;

        let defaults = CompletionConfig::default();
        let completion = CompletionConfig {
            api_key: std::env::var("TOGETHER_API_KEY").ok().filter(|k| !k.is_empty()),
            api_url: std::env::var("COMPLETION_API_URL").unwrap_or(defaults.api_url),
            model: std::env::var("COMPLETION_MODEL").unwrap_or(defaults.model),
            max_tokens: parsed("COMPLETION_MAX_TOKENS").unwrap_or(defaults.max_tokens),
            temperature: parsed("COMPLETION_TEMPERATURE").unwrap_or(defaults.temperature),
        };

        let db_path = std::env::var("BOT_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_local_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join("neroniel-bot")
                    .join("bot.db")
            });

        let bind_addr = std::env::var("BOT_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()
            .context("BOT_BIND_ADDR is not a valid socket address")?;

        let bot_name = std::env::var("BOT_NAME").unwrap_or_else(|_| "Neroniel AI".to_string());
        let bot_creator = std::env::var("BOT_CREATOR").unwrap_or_else(|_| "Neroniel".to_string());

        let rate_defaults = RateLimitConfig::default();
        let ask_rate_limit = RateLimitConfig {
            max_requests: parsed("ASK_RATE_LIMIT").unwrap_or(rate_defaults.max_requests),
            window: positive_secs("ASK_RATE_WINDOW_SECS").unwrap_or(rate_defaults.window),
        };

        let reminder_poll_interval =
            positive_secs("REMINDER_POLL_SECS").unwrap_or(Duration::from_secs(60));

        let http_timeout = positive_secs("HTTP_TIMEOUT_SECS").unwrap_or(Duration::from_secs(30));

        let log_json = std::env::var("BOT_LOG_JSON")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(Self {
            discord_token,
            discord_application_id,
            discord_public_key,
            completion,
            db_path,
            bind_addr,
            bot_name,
            bot_creator,
            ask_rate_limit,
            reminder_poll_interval,
            http_timeout,
            log_json,
        })
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} not set"))
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Whole seconds; zero is treated as unset
fn positive_secs(name: &str) -> Option<Duration> {
    parsed::<u64>(name)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
