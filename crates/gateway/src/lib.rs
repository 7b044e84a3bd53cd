//! HTTP gateway for parley.
//!
//! Exposes the inbound chat call as `POST /chat` plus a few liveness
//! endpoints. The session id travels in an HMAC-signed cookie; a new one
//! is issued when the client has none or its signature does not verify.
//!
//! Built on Axum.

pub mod cookie;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info, warn};

use parley_agent::{ChatError, ChatService};
use parley_config::AppConfig;
use parley_core::event::EventBus;

use crate::cookie::SessionCookie;

pub const INTERNAL_ERROR: &str = "An internal server error occurred.";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub chat: Arc<ChatService>,
    pub cookie: SessionCookie,
    limiter: RateLimiter,
}

impl GatewayState {
    pub fn new(chat: Arc<ChatService>, config: &parley_config::GatewayConfig) -> Self {
        let secret = match config.session_secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => {
                info!("No session_secret configured, signing cookies with a per-process key");
                SessionCookie::random_secret()
            }
        };
        Self {
            chat,
            cookie: SessionCookie::new(config.cookie_name.clone(), config.cookie_max_age_secs, secret),
            limiter: RateLimiter::new(
                config.rate_limit_per_window,
                Duration::from_secs(config.rate_limit_window_secs),
            ),
        }
    }
}

type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/status", get(status_handler))
        .route("/version", get(version_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway HTTP server and the idle-session sweeper.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let router = parley_providers::build_from_config(&config);
    let provider = router
        .default()
        .ok_or_else(|| format!("No provider registered for '{}'", config.provider))?;
    let event_bus = Arc::new(EventBus::default());
    let chat = Arc::new(ChatService::from_config(&config, provider, event_bus));

    let sweeper = spawn_idle_sweeper(
        Arc::clone(&chat),
        config.session.idle_ttl_secs,
        config.session.sweep_interval_secs,
    );

    let app = build_router(Arc::new(GatewayState::new(chat, &config.gateway)));

    info!(addr = %addr, model = %config.model, provider = %config.provider, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = sweeper {
        task.abort();
    }
    info!("Gateway stopped");
    Ok(())
}

/// Periodically evict sessions idle for longer than `idle_ttl_secs`.
/// Returns `None` when eviction is disabled.
pub fn spawn_idle_sweeper(
    chat: Arc<ChatService>,
    idle_ttl_secs: u64,
    sweep_interval_secs: u64,
) -> Option<tokio::task::JoinHandle<()>> {
    if idle_ttl_secs == 0 {
        info!("Idle session eviction disabled");
        return None;
    }
    let max_idle = Duration::from_secs(idle_ttl_secs);
    let period = Duration::from_secs(sweep_interval_secs.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = chat.evict_idle(max_idle).await;
            if evicted > 0 {
                info!(evicted, remaining = chat.store().len(), "Evicted idle sessions");
            }
        }
    }))
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (Ok(mut sigint), Ok(mut sigterm)) =
            (signal(SignalKind::interrupt()), signal(SignalKind::terminate()))
        else {
            warn!("Could not install signal handlers; falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}

// --- Rate Limiter ---

/// In-memory sliding-window rate limiter.
///
/// Tracks request timestamps per session id.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<std::time::Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if the client is within its limit.
    fn check(&self, client_key: &str) -> bool {
        let now = std::time::Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < self.window);

        if timestamps.len() >= self.max_requests {
            return false;
        }

        timestamps.push(now);
        true
    }
}

// --- Handlers ---

#[derive(Debug, Default, Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    force_json: bool,
}

#[derive(Serialize)]
struct ChatResponse {
    response: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn chat_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let existing = state.cookie.read(&headers);
    let session_id = existing
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

    // Clients without a valid signed cookie share one bucket until they
    // keep the one issued to them.
    let limiter_key = existing.as_deref().unwrap_or("anonymous");
    let mut response = if !state.limiter.check(limiter_key) {
        warn!(session_id = %limiter_key, "Rate limit exceeded");
        error_response(StatusCode::TOO_MANY_REQUESTS, "Too many requests, please try again later.")
    } else {
        let request = match body {
            Ok(Json(request)) => request,
            Err(rejection) => {
                debug!(error = %rejection, "Unreadable chat body");
                ChatRequest::default()
            }
        };
        answer(&state, session_id.clone(), request).await
    };

    if existing.is_none() {
        match state.cookie.issue(&session_id).map(HeaderValue::try_from) {
            Some(Ok(value)) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Some(Err(e)) => error!(error = %e, "Could not encode session cookie"),
            None => error!("Could not sign session cookie"),
        }
    }
    response
}

/// Run the chat call on its own task so a panic surfaces as a 500
/// instead of tearing down the connection.
async fn answer(state: &SharedState, session_id: String, request: ChatRequest) -> Response {
    let message = request.message.unwrap_or_default();
    let chat = Arc::clone(&state.chat);
    let force_json = request.force_json;

    let outcome = tokio::spawn(async move { chat.handle(&session_id, &message, force_json).await })
        .await
        .unwrap_or_else(|e| Err(ChatError::Internal(e.to_string())));

    match outcome {
        Ok(response) => Json(ChatResponse { response }).into_response(),
        Err(ChatError::EmptyMessage) => {
            error_response(StatusCode::BAD_REQUEST, &ChatError::EmptyMessage.to_string())
        }
        Err(ChatError::Internal(reason)) => {
            error!(reason = %reason, "Chat handler failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR)
        }
    }
}

async fn status_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "live" }))
}

async fn version_handler() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
