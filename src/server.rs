//! Interactions HTTP Server
//!
//! Axum server that receives Discord interactions and answers the keep-alive
//! probe. Requests to `/interactions` must carry a valid Ed25519 signature
//! over `timestamp || body`; command work is spawned so the webhook returns
//! immediately.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::channels::discord::{DiscordInteraction, INTERACTION_APPLICATION_COMMAND, INTERACTION_PING};
use crate::channels::traits::EPHEMERAL_FLAG;
use crate::channels::Platform;
use crate::commands::{Command, CommandRouter};

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

/// Interaction signature failures
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("invalid public key")]
    InvalidKey,

    #[error("missing header: {0}")]
    MissingHeader(&'static str),

    #[error("malformed signature")]
    Malformed,

    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies Discord's interaction request signatures
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    /// Build from the application's hex-encoded public key
    pub fn from_hex(public_key: &str) -> Result<Self, SignatureError> {
        let bytes: [u8; 32] = hex::decode(public_key.trim())
            .map_err(|_| SignatureError::InvalidKey)?
            .try_into()
            .map_err(|_| SignatureError::InvalidKey)?;
        let key = VerifyingKey::from_bytes(&bytes).map_err(|_| SignatureError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn verify(&self, timestamp: &str, body: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
        let signature_bytes = hex::decode(signature_hex).map_err(|_| SignatureError::Malformed)?;
        let signature =
            Signature::try_from(&signature_bytes[..]).map_err(|_| SignatureError::Malformed)?;

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key
            .verify(&message, &signature)
            .map_err(|_| SignatureError::Mismatch)
    }

    fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), SignatureError> {
        let signature = header(headers, SIGNATURE_HEADER)?;
        let timestamp = header(headers, TIMESTAMP_HEADER)?;
        self.verify(timestamp, body, signature)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<&'a str, SignatureError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

/// Shared server state
pub struct AppState {
    pub verifier: SignatureVerifier,
    pub commands: Arc<CommandRouter>,
    pub platform: Arc<dyn Platform>,
}

/// Build the router with all routes and middleware
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(keep_alive))
        .route("/healthz", get(healthz))
        .route("/interactions", post(interactions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c / SIGTERM
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Interactions server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Interactions server stopped");
    Ok(())
}

async fn keep_alive() -> &'static str {
    "Bot is alive!"
}

async fn healthz(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "platform": state.platform.name(),
        "ready": state.platform.is_ready(),
    }))
}

async fn interactions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.verifier.verify_headers(&headers, &body) {
        debug!("Rejected interaction: {}", e);
        return (StatusCode::UNAUTHORIZED, "invalid request signature").into_response();
    }

    let interaction: DiscordInteraction = match serde_json::from_slice(&body) {
        Ok(interaction) => interaction,
        Err(e) => {
            warn!("Malformed interaction payload: {}", e);
            return (StatusCode::BAD_REQUEST, "malformed interaction").into_response();
        }
    };

    match interaction.kind {
        INTERACTION_PING => Json(json!({ "type": 1 })).into_response(),
        INTERACTION_APPLICATION_COMMAND => handle_command(state, interaction),
        other => {
            debug!("Ignoring interaction type {}", other);
            (StatusCode::BAD_REQUEST, "unsupported interaction type").into_response()
        }
    }
}

fn handle_command(state: Arc<AppState>, interaction: DiscordInteraction) -> Response {
    let Some(reference) = interaction.to_ref() else {
        return (StatusCode::BAD_REQUEST, "interaction missing user or channel").into_response();
    };

    let command = match interaction.data.as_ref().map(Command::parse) {
        Some(Ok(command)) => command,
        Some(Err(e)) => {
            warn!("Unusable command from user {}: {}", reference.user_id, e);
            return Json(json!({
                "type": 4,
                "data": { "content": format!("❌ Error: {}", e), "flags": EPHEMERAL_FLAG },
            }))
            .into_response();
        }
        None => return (StatusCode::BAD_REQUEST, "command data missing").into_response(),
    };

    // Responses go through the callback endpoint from the spawned task
    let commands = state.commands.clone();
    tokio::spawn(async move {
        commands.dispatch(reference, command).await;
    });

    StatusCode::ACCEPTED.into_response()
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
