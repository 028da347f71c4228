mod chat_client;
mod config;
mod errors;
mod extract;
mod routes;
mod session;
mod state;
mod tools;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat_client::{ChatClient, ChatProvider};
use crate::config::Config;
use crate::routes::build_router;
use crate::session::SessionStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars —
    // an absent API key halts startup, it is never a per-request error)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_env_filter(&config.rust_log)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Genie API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize the chat client
    let chat: Arc<dyn ChatProvider> = Arc::new(ChatClient::new(config.xai_api_key.clone()));
    info!("Chat client initialized (model: {})", chat_client::MODEL);

    // Initialize the session registry and its idle-expiry sweep
    let sessions = SessionStore::new();
    sessions.spawn_expiry_sweep(config.session_idle_secs);
    info!(
        "Session registry initialized (idle timeout: {}s)",
        config.session_idle_secs
    );

    // Build app state
    let state = AppState { chat, sessions };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Filter used when RUST_LOG is unset. Tracing targets carry the crate name
/// with underscores, not the hyphenated package name.
fn default_env_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_matches_crate_target_name() {
        assert_eq!(default_env_filter("info").to_string(), "genie_api=info");
    }
}
