//! Assistant Orchestrator
//!
//! Runs one `/ask` end to end: acknowledge, admit, short-circuit creator
//! questions, build the prompt, call the completion API, then thread the
//! answer under the previous reply and record the turn.
//!
//! Every failure ends in a message to the caller. Upstream failures are
//! reported in their own format and leave history untouched; anything else
//! becomes a generic error.

use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channels::traits::{truncate_chars, MAX_CONTENT_LENGTH};
use crate::channels::{Embed, InteractionRef, OutgoingMessage, Platform};
use crate::completion::{CompletionBackend, CompletionError, CompletionRequest};
use crate::config::CompletionConfig;
use crate::conversation::{build_prompt, system_instruction, ConversationStore, ConversationTurn};
use crate::language;
use crate::rate_limit::RateLimiter;
use crate::reply_chain::ReplyChain;
use crate::types::MessageId;

/// Prompts answered with the creator attribution instead of a completion
const CREATOR_PHRASES: [&str; 4] = [
    "who made you",
    "who created you",
    "who created this bot",
    "who made this bot",
];

/// Sent when a caller exceeds the `/ask` rate limit
pub const THROTTLE_NOTICE: &str = "⏳ You're being rate-limited. Please wait.";

/// Persona settings
#[derive(Debug, Clone)]
pub struct Persona {
    /// Bot name (system instruction and embed footer)
    pub name: String,
    /// Name given for creator questions
    pub creator: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Neroniel AI".to_string(),
            creator: "Neroniel".to_string(),
        }
    }
}

/// How an `/ask` ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AskOutcome {
    /// Rejected by the rate limiter
    Throttled,
    /// Answered with the canned creator attribution
    CreatorReply(MessageId),
    /// Completion delivered and recorded
    Answered(MessageId),
    /// Completion API rejected the call; nothing recorded
    UpstreamError,
    /// Unexpected failure, reported generically
    Failed,
}

/// Exact-match creator question check (trimmed, case-insensitive)
pub fn is_creator_question(prompt: &str) -> bool {
    let normalized = prompt.trim().to_lowercase();
    CREATOR_PHRASES.contains(&normalized.as_str())
}

/// Room left for the upstream text once the message prefix is in place
const UPSTREAM_DETAIL_LIMIT: usize = MAX_CONTENT_LENGTH - 100;

/// User-facing text for a completion failure the caller should see verbatim
fn upstream_message(error: &CompletionError) -> Option<String> {
    match error {
        CompletionError::Status { status, body } => Some(format!(
            "❌ API returned error code {}: `{}`",
            status,
            truncate_chars(body, UPSTREAM_DETAIL_LIMIT)
        )),
        CompletionError::Api(message) => Some(format!(
            "❌ Error from AI API: {}",
            truncate_chars(message, UPSTREAM_DETAIL_LIMIT)
        )),
        _ => None,
    }
}

/// `/ask` orchestrator
pub struct Assistant {
    platform: Arc<dyn Platform>,
    completion: Arc<dyn CompletionBackend>,
    completion_config: CompletionConfig,
    conversations: Arc<ConversationStore>,
    reply_chain: Arc<ReplyChain>,
    rate_limiter: Arc<RateLimiter>,
    persona: Persona,
}

impl Assistant {
    pub fn new(
        platform: Arc<dyn Platform>,
        completion: Arc<dyn CompletionBackend>,
        conversations: Arc<ConversationStore>,
        reply_chain: Arc<ReplyChain>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            platform,
            completion,
            completion_config: CompletionConfig::default(),
            conversations,
            reply_chain,
            rate_limiter,
            persona: Persona::default(),
        }
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_completion_config(mut self, config: CompletionConfig) -> Self {
        self.completion_config = config;
        self
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Handle one `/ask`; never returns without answering the caller
    pub async fn handle_ask(&self, interaction: &InteractionRef, prompt: &str) -> AskOutcome {
        match self.ask(interaction, prompt).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("/ask failed for user {}: {:#}", interaction.user_id, e);
                let notice = OutgoingMessage::text(&format!("❌ Error: {}", e));
                if let Err(e) = self.platform.followup(interaction, &notice).await {
                    warn!("Could not report /ask failure: {}", e);
                }
                AskOutcome::Failed
            }
        }
    }

    async fn ask(&self, interaction: &InteractionRef, prompt: &str) -> Result<AskOutcome> {
        let user_id = interaction.user_id;
        let channel_id = interaction.channel_id;

        self.platform.acknowledge(interaction, false).await?;

        if !self.rate_limiter.admit(user_id, Instant::now()).await {
            info!("Rate limited /ask from user {}", user_id);
            self.platform
                .followup(interaction, &OutgoingMessage::text(THROTTLE_NOTICE))
                .await?;
            return Ok(AskOutcome::Throttled);
        }

        if is_creator_question(prompt) {
            let text = format!("I was created by **{}**.", self.persona.creator);
            let sent = self.platform.followup(interaction, &self.reply(&text)).await?;
            self.reply_chain.set(user_id, channel_id, sent).await;
            return Ok(AskOutcome::CreatorReply(sent));
        }

        let directive = language::directive_for(prompt);
        let history = self.conversations.get_history(user_id).await;
        let full_prompt = build_prompt(
            &system_instruction(&self.persona.name),
            directive,
            &history,
            prompt,
        );
        debug!(
            "Built prompt for user {} ({} history turns, directive: {:?})",
            user_id,
            history.len(),
            directive
        );

        let request = CompletionRequest::from_config(full_prompt, &self.completion_config);
        let answer = match self.completion.complete(&request).await {
            Ok(answer) => answer,
            Err(e) => match upstream_message(&e) {
                Some(message) => {
                    warn!("Completion API error for user {}: {}", user_id, e);
                    self.platform
                        .followup(interaction, &OutgoingMessage::text(&message))
                        .await?;
                    return Ok(AskOutcome::UpstreamError);
                }
                None => return Err(e.into()),
            },
        };

        let message = self.reply(&answer);
        let sent = match self.reply_chain.get(user_id, channel_id).await {
            Some(target) => match self.platform.fetch_message(channel_id, target).await {
                Ok(_) => self.platform.reply_to(channel_id, target, &message).await?,
                Err(e) if e.is_not_found() => {
                    debug!("Reply target {} is gone, sending fresh message", target);
                    self.platform.followup(interaction, &message).await?
                }
                Err(e) => return Err(e.into()),
            },
            None => self.platform.followup(interaction, &message).await?,
        };

        self.reply_chain.set(user_id, channel_id, sent).await;
        self.conversations
            .append(user_id, ConversationTurn::new(user_id, prompt, &answer))
            .await;

        info!("Answered /ask for user {} (message {})", user_id, sent);
        Ok(AskOutcome::Answered(sent))
    }

    /// Blue persona embed
    fn reply(&self, text: &str) -> OutgoingMessage {
        OutgoingMessage::embed(Embed::new(text).with_footer(&self.persona.name))
    }
}
