use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// The provider API key is the one required secret: missing it is a
/// fatal startup condition, never a per-request error.
#[derive(Debug, Clone)]
pub struct Config {
    pub xai_api_key: String,
    pub port: u16,
    pub rust_log: String,
    /// Sessions idle longer than this are expired by the registry sweep.
    pub session_idle_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Ok(Config {
            xai_api_key: require_env("XAI_API_KEY")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            session_idle_secs: std::env::var("SESSION_IDLE_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse::<u64>()
                .context("SESSION_IDLE_SECS must be a number of seconds")?,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
