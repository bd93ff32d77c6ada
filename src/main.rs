//! Neroniel Bot - Entry Point
//!
//! Connects to Discord, opens the durable store (degrading to in-memory
//! history if it is unreachable), starts the reminder dispatcher and serves
//! the interactions endpoint until shutdown.

use neroniel_bot::{
    server::{self, AppState, SignatureVerifier},
    Assistant, CommandRouter, Config, ConversationStore, Database, DiscordChannel, DiscordConfig,
    Persona, Platform, RateLimiter, ReminderScheduler, ReplyChain, TogetherClient,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// How often expired rows are swept from the store
const TTL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Neroniel Bot v{}", env!("CARGO_PKG_VERSION"));

    let database = match Database::open(&config.db_path) {
        Ok(db) => Some(Arc::new(db)),
        Err(e) => {
            warn!(
                "Durable store unavailable ({}): history is in-memory only, reminders disabled",
                e
            );
            None
        }
    };

    let discord = Arc::new(DiscordChannel::new(DiscordConfig::from_config(&config))?);
    let platform: Arc<dyn Platform> = discord.clone();

    let completion = Arc::new(TogetherClient::from_config(&config)?);
    if !completion.is_available() {
        warn!("TOGETHER_API_KEY not set - /ask will report an error");
    }

    let conversations = Arc::new(ConversationStore::with_backend(
        database.clone().map(|db| db as Arc<dyn neroniel_bot::TurnLog>),
    ));

    let assistant = Arc::new(
        Assistant::new(
            platform.clone(),
            completion,
            conversations,
            Arc::new(ReplyChain::new()),
            Arc::new(RateLimiter::new(config.ask_rate_limit.clone())),
        )
        .with_persona(Persona {
            name: config.bot_name.clone(),
            creator: config.bot_creator.clone(),
        })
        .with_completion_config(config.completion.clone()),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut background = Vec::new();

    let scheduler = database.clone().map(|db| {
        Arc::new(
            ReminderScheduler::new(db, platform.clone())
                .with_interval(config.reminder_poll_interval),
        )
    });

    if let Some(db) = &database {
        background.push(db.clone().spawn_ttl_monitor(TTL_SWEEP_INTERVAL, shutdown_rx.clone()));
    }
    if let Some(scheduler) = &scheduler {
        background.push(scheduler.clone().spawn(shutdown_rx.clone()));
    }

    // Readiness is retried in the background so the keep-alive endpoint comes up regardless
    {
        let discord = discord.clone();
        tokio::spawn(async move {
            let mut delay = Duration::from_secs(5);
            loop {
                match discord.connect().await {
                    Ok(_) => break,
                    Err(e) => {
                        warn!("Discord connect failed: {} (retrying in {}s)", e, delay.as_secs());
                        tokio::time::sleep(delay).await;
                        delay = (delay * 2).min(Duration::from_secs(300));
                    }
                }
            }
        });
    }

    let state = Arc::new(AppState {
        verifier: SignatureVerifier::from_hex(&config.discord_public_key)?,
        commands: Arc::new(CommandRouter::new(platform.clone(), assistant, scheduler)),
        platform,
    });

    let result = server::serve(config.bind_addr, state).await;

    shutdown_tx.send_replace(true);
    for handle in background {
        let _ = handle.await;
    }

    info!("Neroniel Bot stopped");
    result
}
