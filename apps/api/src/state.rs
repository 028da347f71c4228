use std::sync::Arc;

use crate::chat_client::ChatProvider;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
/// Configuration is consumed at startup; nothing here reads ambient process state.
#[derive(Clone)]
pub struct AppState {
    /// Pluggable chat provider. The wire client in production; tests stub it.
    pub chat: Arc<dyn ChatProvider>,
    pub sessions: SessionStore,
}
