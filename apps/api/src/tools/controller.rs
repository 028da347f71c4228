//! Tool flows: drive templating, the chat client, and session state for each
//! of the four tools. Handlers stay thin wrappers; everything here is
//! exercisable in tests against a stubbed provider.
//!
//! Per request the flow is Idle -> Building -> AwaitingModel -> {Streaming ->
//! Complete, or Failed}. A failed request renders an error event and leaves
//! the conversation history untouched.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::chat_client::{ChatError, ChatMessage, ChatProvider, FragmentStream};
use crate::errors::AppError;
use crate::extract::extract_resume_text;
use crate::session::{Role, Session};
use crate::tools::prompts::{
    CHECKER_CONFIG, CHECKER_TEMPLATE, COACH_CONFIG, COVER_LETTER_CONFIG, COVER_LETTER_TEMPLATE,
    MATCHER_CONFIG, MATCHER_TEMPLATE,
};
use crate::tools::template::render;

/// One item of a tool's live output. The UI layer decides how to render these;
/// nothing below it knows about SSE or any other transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolEvent {
    /// One incremental fragment of model output.
    Delta(String),
    /// Generation finished; carries the complete text.
    Done(String),
    /// Generation failed; carries the raw cause message.
    Error(String),
}

pub type ToolEventStream = mpsc::Receiver<ToolEvent>;

/// Result of applying an uploaded résumé PDF to a session.
#[derive(Debug)]
pub struct UploadOutcome {
    /// False when the session already had a résumé (upload ignored;
    /// reset the session to start over).
    pub applied: bool,
    pub resume_chars: usize,
}

/// Extracts an uploaded PDF and applies the text to the session.
/// Extraction runs before the session is touched, so a failed extraction
/// leaves existing résumé text and history exactly as they were.
pub async fn upload_resume(
    handle: Arc<Mutex<Session>>,
    bytes: Vec<u8>,
) -> Result<UploadOutcome, AppError> {
    let text = extract_resume_text(bytes).await?;

    let mut session = handle.lock().await;
    session.touch();
    let applied = session.set_resume(text);
    if applied {
        info!(session = %session.id, "resume set ({} chars)", session.resume_text().map_or(0, str::len));
    }

    Ok(UploadOutcome {
        applied,
        resume_chars: session.resume_text().map_or(0, str::len),
    })
}

/// Generates a cover letter as a live event stream. On completion the full
/// letter is stored on the session as the downloadable artifact.
pub async fn start_cover_letter(
    handle: Arc<Mutex<Session>>,
    provider: Arc<dyn ChatProvider>,
    job_description: &str,
) -> Result<ToolEventStream, AppError> {
    let resume = begin_generation(&handle).await?;

    let fragments = async {
        let prompt = render(
            COVER_LETTER_TEMPLATE,
            &[
                ("job_description", job_description),
                ("resume_text", resume.as_str()),
            ],
        )?;
        let messages = [ChatMessage::user(prompt)];
        provider
            .stream(&messages, COVER_LETTER_CONFIG)
            .await
            .map_err(AppError::from)
    }
    .await;

    let fragments = match fragments {
        Ok(fragments) => fragments,
        Err(e) => {
            handle.lock().await.end_generation();
            return Err(e);
        }
    };

    Ok(relay(handle, fragments, |session, letter| {
        session.set_cover_letter(letter);
    }))
}

/// Submits one coach chat turn as a live event stream. The user and assistant
/// turns are appended together only after the reply completes; a failed call
/// appends neither.
pub async fn start_chat_turn(
    handle: Arc<Mutex<Session>>,
    provider: Arc<dyn ChatProvider>,
    message: &str,
) -> Result<ToolEventStream, AppError> {
    if message.trim().is_empty() {
        return Err(AppError::Validation("message cannot be empty".to_string()));
    }

    let messages = {
        let mut session = handle.lock().await;
        session.touch();
        session.try_begin_generation()?;
        match session.build_model_request() {
            Ok(mut messages) => {
                messages.push(ChatMessage::user(message));
                messages
            }
            Err(e) => {
                session.end_generation();
                return Err(e);
            }
        }
    };

    let fragments = match provider.stream(&messages, COACH_CONFIG).await {
        Ok(fragments) => fragments,
        Err(e) => {
            handle.lock().await.end_generation();
            return Err(e.into());
        }
    };

    let user_text = message.to_string();
    Ok(relay(handle, fragments, move |session, reply| {
        session.append_turn(Role::User, user_text);
        session.append_turn(Role::Assistant, reply);
    }))
}

/// Runs the standalone résumé checker. Blocking full response.
pub async fn run_check(
    handle: Arc<Mutex<Session>>,
    provider: Arc<dyn ChatProvider>,
) -> Result<String, AppError> {
    let resume = begin_generation(&handle).await?;

    let result = async {
        let prompt = render(CHECKER_TEMPLATE, &[("resume_text", resume.as_str())])?;
        provider
            .invoke(&[ChatMessage::user(prompt)], CHECKER_CONFIG)
            .await
            .map_err(AppError::from)
    }
    .await;

    handle.lock().await.end_generation();
    result
}

/// Runs the résumé-vs-JD matcher. Blocking full response.
pub async fn run_match(
    handle: Arc<Mutex<Session>>,
    provider: Arc<dyn ChatProvider>,
    job_description: &str,
) -> Result<String, AppError> {
    let resume = begin_generation(&handle).await?;

    let result = async {
        let prompt = render(
            MATCHER_TEMPLATE,
            &[
                ("job_description", job_description),
                ("resume_text", resume.as_str()),
            ],
        )?;
        provider
            .invoke(&[ChatMessage::user(prompt)], MATCHER_CONFIG)
            .await
            .map_err(AppError::from)
    }
    .await;

    handle.lock().await.end_generation();
    result
}

/// Touches the session, requires a résumé, and claims the busy flag.
async fn begin_generation(handle: &Arc<Mutex<Session>>) -> Result<String, AppError> {
    let mut session = handle.lock().await;
    session.touch();
    let resume = session.require_resume()?.to_string();
    session.try_begin_generation()?;
    Ok(resume)
}

/// Forwards provider fragments as `ToolEvent`s, accumulating the full text.
/// When the stream completes cleanly and non-empty, `on_complete` runs against
/// the locked session before `Done` is emitted; on any failure the session is
/// left untouched. The busy flag clears on every outcome, including a
/// disconnected consumer.
fn relay(
    handle: Arc<Mutex<Session>>,
    mut fragments: FragmentStream,
    on_complete: impl FnOnce(&mut Session, String) + Send + 'static,
) -> ToolEventStream {
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        let mut full = String::new();
        let mut failure: Option<ChatError> = None;

        while let Some(item) = fragments.recv().await {
            match item {
                Ok(fragment) => {
                    full.push_str(&fragment);
                    // A closed consumer is not an error: keep draining so the
                    // outcome is decided and the busy flag settles.
                    let _ = tx.send(ToolEvent::Delta(fragment)).await;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() && full.trim().is_empty() {
            failure = Some(ChatError::EmptyContent);
        }

        // Settle the session first and release its lock before the terminal
        // send: a stalled consumer with a full channel must not hold up other
        // requests against this session.
        {
            let mut session = handle.lock().await;
            if failure.is_none() {
                debug!(session = %session.id, "generation complete ({} chars)", full.len());
                on_complete(&mut session, full.clone());
            }
            session.end_generation();
        }

        let terminal = match failure {
            None => ToolEvent::Done(full),
            Some(e) => ToolEvent::Error(e.to_string()),
        };
        let _ = tx.send(terminal).await;
    });

    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat_client::ModelConfig;
    use crate::session::SessionStore;
    use async_trait::async_trait;

    /// Canned provider: either a fixed fragment sequence, a mid-stream
    /// failure, or an up-front refusal.
    enum StubBehavior {
        Fragments(Vec<&'static str>),
        FailMidStream {
            fragments: Vec<&'static str>,
        },
        Refuse,
    }

    struct StubChat {
        behavior: StubBehavior,
    }

    impl StubChat {
        fn replying(fragments: Vec<&'static str>) -> Arc<dyn ChatProvider> {
            Arc::new(Self {
                behavior: StubBehavior::Fragments(fragments),
            })
        }

        fn failing_mid_stream(fragments: Vec<&'static str>) -> Arc<dyn ChatProvider> {
            Arc::new(Self {
                behavior: StubBehavior::FailMidStream { fragments },
            })
        }

        fn refusing() -> Arc<dyn ChatProvider> {
            Arc::new(Self {
                behavior: StubBehavior::Refuse,
            })
        }
    }

    #[async_trait]
    impl ChatProvider for StubChat {
        async fn invoke(
            &self,
            _messages: &[ChatMessage],
            _config: ModelConfig,
        ) -> Result<String, ChatError> {
            match &self.behavior {
                StubBehavior::Fragments(fragments) => Ok(fragments.concat()),
                _ => Err(ChatError::Api {
                    status: 500,
                    message: "stub refused".to_string(),
                }),
            }
        }

        async fn stream(
            &self,
            _messages: &[ChatMessage],
            _config: ModelConfig,
        ) -> Result<FragmentStream, ChatError> {
            // Roomy enough to pre-fill every canned sequence without a reader.
            let (tx, rx) = mpsc::channel(128);
            match &self.behavior {
                StubBehavior::Fragments(fragments) => {
                    for f in fragments {
                        tx.send(Ok(f.to_string())).await.unwrap();
                    }
                }
                StubBehavior::FailMidStream { fragments } => {
                    for f in fragments {
                        tx.send(Ok(f.to_string())).await.unwrap();
                    }
                    tx.send(Err(ChatError::Timeout)).await.unwrap();
                }
                StubBehavior::Refuse => {
                    return Err(ChatError::Api {
                        status: 401,
                        message: "bad key".to_string(),
                    });
                }
            }
            Ok(rx)
        }
    }

    async fn ready_session(store: &SessionStore, resume: &str) -> Arc<Mutex<Session>> {
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        handle.lock().await.set_resume(resume.to_string());
        handle
    }

    async fn collect(mut rx: ToolEventStream) -> Vec<ToolEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        events
    }

    #[tokio::test]
    async fn test_cover_letter_streams_and_stores_artifact() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "Jane Doe\nSoftware Engineer...").await;
        let provider = StubChat::replying(vec!["Dear ", "Hiring ", "Manager"]);

        let rx = start_cover_letter(
            handle.clone(),
            provider,
            "Looking for a backend engineer with 5 years Go experience",
        )
        .await
        .unwrap();
        let events = collect(rx).await;

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], ToolEvent::Delta("Dear ".to_string()));
        assert_eq!(
            events[3],
            ToolEvent::Done("Dear Hiring Manager".to_string())
        );

        let session = handle.lock().await;
        assert_eq!(session.cover_letter(), Some("Dear Hiring Manager"));
        // Cover letter generation never touches the chat transcript.
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_cover_letter_requires_job_description() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;
        let provider = StubChat::replying(vec!["unused"]);

        let result = start_cover_letter(handle.clone(), provider, "   ").await;
        assert!(matches!(
            result,
            Err(AppError::MissingPlaceholder("job_description"))
        ));
        // Busy flag released on the failure path.
        assert!(handle.lock().await.try_begin_generation().is_ok());
    }

    #[tokio::test]
    async fn test_cover_letter_requires_resume() {
        let store = SessionStore::new();
        let id = store.create().await;
        let handle = store.get(id).await.unwrap();
        let provider = StubChat::replying(vec!["unused"]);

        let result = start_cover_letter(handle, provider, "some jd").await;
        assert!(matches!(result, Err(AppError::SessionNotReady)));
    }

    #[tokio::test]
    async fn test_chat_round_trip_appends_both_turns() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "...Python, Django, 3 years...").await;

        let rx = start_chat_turn(
            handle.clone(),
            StubChat::replying(vec!["Work on ", "async skills."]),
            "What skills should I improve?",
        )
        .await
        .unwrap();
        let events = collect(rx).await;
        assert_eq!(
            events.last(),
            Some(&ToolEvent::Done("Work on async skills.".to_string()))
        );

        let rx = start_chat_turn(
            handle.clone(),
            StubChat::replying(vec!["Lead with projects."]),
            "How do I highlight my Django experience?",
        )
        .await
        .unwrap();
        collect(rx).await;

        // Two round trips: system + user/assistant/user/assistant = 5 messages.
        let session = handle.lock().await;
        assert_eq!(session.turn_count(), 4);
        let messages = session.build_model_request().unwrap();
        assert_eq!(messages.len(), 5);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user", "assistant"]);
    }

    #[tokio::test]
    async fn test_failed_chat_appends_nothing() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;

        let rx = start_chat_turn(
            handle.clone(),
            StubChat::failing_mid_stream(vec!["partial "]),
            "hello?",
        )
        .await
        .unwrap();
        let events = collect(rx).await;

        assert!(matches!(events.last(), Some(ToolEvent::Error(_))));
        let session = handle.lock().await;
        assert_eq!(session.turn_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_refusal_surfaces_before_any_fragment() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;

        let result = start_chat_turn(handle.clone(), StubChat::refusing(), "hello?").await;
        assert!(matches!(result, Err(AppError::Provider(_))));

        let session = handle.lock().await;
        assert_eq!(session.turn_count(), 0);
        assert!(session.cover_letter().is_none());
    }

    #[tokio::test]
    async fn test_second_generation_rejected_while_busy() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;
        handle.lock().await.try_begin_generation().unwrap();

        let result = start_chat_turn(handle, StubChat::replying(vec!["hi"]), "hello").await;
        assert!(matches!(result, Err(AppError::SessionBusy)));
    }

    #[tokio::test]
    async fn test_check_returns_full_analysis() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume text").await;

        let analysis = run_check(handle.clone(), StubChat::replying(vec!["1. **Score**: 82/100"]))
            .await
            .unwrap();
        assert_eq!(analysis, "1. **Score**: 82/100");
        // Busy flag released after a blocking call too.
        assert!(handle.lock().await.try_begin_generation().is_ok());
    }

    #[tokio::test]
    async fn test_match_requires_job_description() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume text").await;

        let result = run_match(handle.clone(), StubChat::replying(vec!["x"]), "").await;
        assert!(matches!(
            result,
            Err(AppError::MissingPlaceholder("job_description"))
        ));
        assert!(handle.lock().await.try_begin_generation().is_ok());
    }

    #[tokio::test]
    async fn test_failed_extraction_leaves_session_untouched() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "original resume").await;
        handle
            .lock()
            .await
            .append_turn(Role::User, "hello".to_string());

        let result = upload_resume(handle.clone(), b"definitely not a pdf".to_vec()).await;
        assert!(matches!(result, Err(AppError::UnreadablePdf(_))));

        let session = handle.lock().await;
        assert_eq!(session.resume_text(), Some("original resume"));
        assert_eq!(session.turn_count(), 1);
    }

    #[tokio::test]
    async fn test_session_settles_while_consumer_stalls() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;

        // Exactly fill the event channel so the terminal send must wait on
        // the stalled consumer.
        let rx = start_chat_turn(handle.clone(), StubChat::replying(vec!["x"; 64]), "hello")
            .await
            .unwrap();

        // Give the relay time to drain the provider and settle the session.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let session = tokio::time::timeout(std::time::Duration::from_millis(200), handle.lock())
            .await
            .expect("session lock must stay free while the consumer stalls");

        // History committed and busy flag released even though `done` is
        // still unsent.
        assert_eq!(session.turn_count(), 2);
        drop(session);

        let events = collect(rx).await;
        assert_eq!(events.len(), 65);
        assert!(matches!(events.last(), Some(ToolEvent::Done(_))));
    }

    #[tokio::test]
    async fn test_empty_stream_is_a_failure() {
        let store = SessionStore::new();
        let handle = ready_session(&store, "resume").await;

        let rx = start_chat_turn(handle.clone(), StubChat::replying(vec![]), "hello")
            .await
            .unwrap();
        let events = collect(rx).await;
        assert!(matches!(events.last(), Some(ToolEvent::Error(_))));
        assert_eq!(handle.lock().await.turn_count(), 0);
    }
}
