/// Chat Client — the single point of entry for all Grok API calls in Genie.
///
/// ARCHITECTURAL RULE: No other module may call the xAI API directly.
/// All model interactions MUST go through this module.
///
/// Model: grok-4 (hardcoded — do not make configurable to prevent drift)
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

const XAI_API_URL: &str = "https://api.x.ai/v1/chat/completions";
/// The model used for all LLM calls in Genie.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "grok-4";
/// Upper bound on any single provider call, streaming included.
const REQUEST_TIMEOUT_SECS: u64 = 120;
/// Channel depth for streamed fragments.
const STREAM_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("provider call timed out")]
    Timeout,

    #[error("model returned empty content")]
    EmptyContent,
}

impl ChatError {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ChatError::Timeout
        } else {
            ChatError::Http(e.to_string())
        }
    }
}

/// One message on the wire: role + text, tagged explicitly.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Sampling parameters for one call. Each tool owns a fixed config.
#[derive(Debug, Clone, Copy)]
pub struct ModelConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// A finite, single-pass sequence of text fragments from one streaming call.
/// Dropping the receiver abandons the stream; the remote model is not told to stop.
pub type FragmentStream = mpsc::Receiver<Result<String, ChatError>>;

/// Seam between tool controllers and the wire client. Lets tests substitute
/// a canned provider without touching the network.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// One-shot call returning the complete response text.
    /// No automatic retry: failures surface immediately to the caller.
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        config: ModelConfig,
    ) -> Result<String, ChatError>;

    /// Incremental call. Fragments arrive in order; their concatenation is the
    /// full response text. A failure before the first fragment is returned as
    /// `Err` here; a mid-stream failure arrives as an `Err` item on the channel.
    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: ModelConfig,
    ) -> Result<FragmentStream, ChatError>;
}

/// The single chat client used by all tools in Genie.
/// Wraps the xAI chat-completions API (OpenAI-compatible wire format).
#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    api_key: String,
}

impl ChatClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key,
        }
    }

    async fn send(
        &self,
        messages: &[ChatMessage],
        config: ModelConfig,
        stream: bool,
    ) -> Result<reqwest::Response, ChatError> {
        let request_body = CompletionRequest {
            model: MODEL,
            messages,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stream,
        };

        let response = self
            .client
            .post(XAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(ChatError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Chat API returned {}: {}", status, body);
            // Auth, rate-limit, and malformed-request failures all arrive here,
            // distinguishable by status code.
            let message = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ChatError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatProvider for ChatClient {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        config: ModelConfig,
    ) -> Result<String, ChatError> {
        let response = self.send(messages, config, false).await?;

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Parse(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ChatError::EmptyContent);
        }

        debug!("Chat invoke succeeded: {} chars", text.len());
        Ok(text)
    }

    async fn stream(
        &self,
        messages: &[ChatMessage],
        config: ModelConfig,
    ) -> Result<FragmentStream, ChatError> {
        let response = self.send(messages, config, true).await?;

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut lines = SseLineBuffer::default();

            'outer: while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(ChatError::from_reqwest(e))).await;
                        return;
                    }
                };

                for line in lines.push(&chunk) {
                    match parse_sse_line(&line) {
                        SseEvent::Fragment(text) => {
                            // A closed receiver means the consumer went away;
                            // stop reading, nothing else to do.
                            if tx.send(Ok(text)).await.is_err() {
                                break 'outer;
                            }
                        }
                        SseEvent::Done => break 'outer,
                        SseEvent::Skip => {}
                    }
                }
            }
            // Channel closes when tx drops; the consumer sees end-of-stream.
        });

        Ok(rx)
    }
}

/// Accumulates raw bytes and yields complete SSE lines.
/// Frames can split anywhere across transport chunks, so a partial trailing
/// line is held back until its newline arrives.
#[derive(Default)]
struct SseLineBuffer {
    pending: String,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(idx) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=idx).collect();
            lines.push(line.trim_end_matches(['\n', '\r']).to_string());
        }
        lines
    }
}

enum SseEvent {
    Fragment(String),
    Done,
    Skip,
}

/// Interprets one SSE line from the completions stream.
/// Empty deltas (role announcements, finish frames) are skipped.
fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();

    if data == "[DONE]" {
        return SseEvent::Done;
    }

    match serde_json::from_str::<StreamFrame>(data) {
        Ok(frame) => {
            let text = frame
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if text.is_empty() {
                SseEvent::Skip
            } else {
                SseEvent::Fragment(text)
            }
        }
        Err(e) => {
            warn!("Unparseable stream frame: {e}");
            SseEvent::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line_fragment() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#;
        match parse_sse_line(line) {
            SseEvent::Fragment(text) => assert_eq!(text, "Hello"),
            _ => panic!("expected a fragment"),
        }
    }

    #[test]
    fn test_parse_sse_line_done() {
        assert!(matches!(parse_sse_line("data: [DONE]"), SseEvent::Done));
    }

    #[test]
    fn test_parse_sse_line_empty_delta_skipped() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert!(matches!(parse_sse_line(line), SseEvent::Skip));
    }

    #[test]
    fn test_parse_sse_line_non_data_skipped() {
        assert!(matches!(parse_sse_line(": keep-alive"), SseEvent::Skip));
        assert!(matches!(parse_sse_line(""), SseEvent::Skip));
    }

    #[test]
    fn test_line_buffer_reassembles_split_frames() {
        let mut buf = SseLineBuffer::default();
        assert!(buf.push(b"data: {\"choices\":[{\"del").is_empty());
        let lines = buf.push(b"ta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n");
        assert_eq!(lines.len(), 3);
        match parse_sse_line(&lines[0]) {
            SseEvent::Fragment(text) => assert_eq!(text, "Hi"),
            _ => panic!("expected a fragment"),
        }
        assert!(matches!(parse_sse_line(&lines[2]), SseEvent::Done));
    }

    #[test]
    fn test_line_buffer_strips_crlf() {
        let mut buf = SseLineBuffer::default();
        let lines = buf.push(b"data: [DONE]\r\n");
        assert_eq!(lines, vec!["data: [DONE]".to_string()]);
    }
}
