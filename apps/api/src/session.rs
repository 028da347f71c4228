//! Session & conversation management.
//!
//! One session per visit, shared across all four tools. Each session holds the
//! extracted résumé text and the append-only chat transcript, and guarantees
//! the model always sees `[system instruction] ++ history` in exact append
//! order. Sessions live in a process-wide registry keyed by id, expired by an
//! idle-timeout sweep; mutations to one session are serialized by its own lock.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::chat_client::ChatMessage;
use crate::errors::AppError;
use crate::tools::prompts::coach_system;

/// Rolling transcript budget in characters, system instruction excluded.
/// Oldest turns are evicted whole once the total exceeds this; the turn being
/// appended is never evicted.
const MAX_TRANSCRIPT_CHARS: usize = 24_000;

/// Who produced a turn. Exhaustively matched everywhere; no type introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation. Immutable once created.
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

impl ConversationTurn {
    fn to_wire(&self) -> ChatMessage {
        match self.role {
            Role::User => ChatMessage::user(self.text.clone()),
            Role::Assistant => ChatMessage::assistant(self.text.clone()),
        }
    }
}

/// Per-visit mutable state: résumé text, transcript, last generated artifact.
#[derive(Debug)]
pub struct Session {
    pub id: Uuid,
    resume_text: Option<String>,
    history: Vec<ConversationTurn>,
    /// Last generated cover letter, kept for the download endpoint.
    cover_letter: Option<String>,
    busy: bool,
    last_active: DateTime<Utc>,
}

impl Session {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            resume_text: None,
            history: Vec::new(),
            cover_letter: None,
            busy: false,
            last_active: Utc::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Sets the résumé text. Set once: a second upload is a no-op while résumé
    /// text exists — starting over requires an explicit `reset`. Returns
    /// whether the text was applied.
    pub fn set_resume(&mut self, text: String) -> bool {
        if self.resume_text.is_some() {
            debug!(session = %self.id, "resume already set; ignoring upload");
            return false;
        }
        self.resume_text = Some(text);
        true
    }

    pub fn resume_text(&self) -> Option<&str> {
        self.resume_text.as_deref()
    }

    /// The résumé text, or `SessionNotReady` when none has been uploaded.
    pub fn require_resume(&self) -> Result<&str, AppError> {
        self.resume_text.as_deref().ok_or(AppError::SessionNotReady)
    }

    /// Appends one turn, then evicts the oldest turns while the transcript
    /// exceeds the rolling character budget.
    pub fn append_turn(&mut self, role: Role, text: String) {
        self.history.push(ConversationTurn { role, text });

        let mut total: usize = self.history.iter().map(|t| t.text.len()).sum();
        while total > MAX_TRANSCRIPT_CHARS && self.history.len() > 1 {
            let evicted = self.history.remove(0);
            total -= evicted.text.len();
            debug!(session = %self.id, "evicted oldest turn ({} chars)", evicted.text.len());
        }
    }

    pub fn turn_count(&self) -> usize {
        self.history.len()
    }

    /// The exact message list sent to the model for the next coach reply:
    /// one system instruction embedding the résumé, then every prior turn in
    /// append order. Fails with `SessionNotReady` when no résumé is set.
    pub fn build_model_request(&self) -> Result<Vec<ChatMessage>, AppError> {
        let resume = self.require_resume()?;

        let mut messages = Vec::with_capacity(self.history.len() + 1);
        messages.push(ChatMessage::system(coach_system(resume)));
        messages.extend(self.history.iter().map(ConversationTurn::to_wire));
        Ok(messages)
    }

    pub fn set_cover_letter(&mut self, text: String) {
        self.cover_letter = Some(text);
    }

    pub fn cover_letter(&self) -> Option<&str> {
        self.cover_letter.as_deref()
    }

    /// Marks a generation in flight, rejecting a concurrent second trigger.
    pub fn try_begin_generation(&mut self) -> Result<(), AppError> {
        if self.busy {
            return Err(AppError::SessionBusy);
        }
        self.busy = true;
        Ok(())
    }

    pub fn end_generation(&mut self) {
        self.busy = false;
    }

    /// Clears résumé text, transcript, and artifact: the explicit start-over.
    pub fn reset(&mut self) {
        self.resume_text = None;
        self.history.clear();
        self.cover_letter = None;
    }
}

/// Process-wide session registry with explicit creation and idle expiry.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<Session>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let mut sessions = self.inner.lock().await;
        sessions.insert(id, Arc::new(Mutex::new(Session::new(id))));
        info!(session = %id, "session created");
        id
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Mutex<Session>>, AppError> {
        let sessions = self.inner.lock().await;
        sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Session {id} not found")))
    }

    /// Drops every session idle for longer than `max_idle`. Returns how many
    /// were expired.
    pub async fn expire_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;

        // Snapshot handles first so per-session locks are taken outside the
        // registry lock.
        let handles: Vec<(Uuid, Arc<Mutex<Session>>)> = {
            let sessions = self.inner.lock().await;
            sessions.iter().map(|(k, v)| (*k, v.clone())).collect()
        };

        let mut expired = Vec::new();
        for (id, handle) in handles {
            let session = handle.lock().await;
            if session.last_active < cutoff && !session.busy {
                expired.push(id);
            }
        }

        let mut sessions = self.inner.lock().await;
        for id in &expired {
            sessions.remove(id);
            info!(session = %id, "session expired after idle timeout");
        }
        expired.len()
    }

    /// Spawns the background sweep that expires idle sessions.
    pub fn spawn_expiry_sweep(&self, max_idle_secs: u64) {
        let store = self.clone();
        tokio::spawn(async move {
            let period = std::time::Duration::from_secs(max_idle_secs.max(60) / 4);
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                let n = store.expire_idle(Duration::seconds(max_idle_secs as i64)).await;
                if n > 0 {
                    debug!("expiry sweep removed {n} sessions");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_resume(resume: &str) -> Session {
        let mut s = Session::new(Uuid::new_v4());
        assert!(s.set_resume(resume.to_string()));
        s
    }

    #[test]
    fn test_model_request_requires_resume() {
        let s = Session::new(Uuid::new_v4());
        assert!(matches!(
            s.build_model_request(),
            Err(AppError::SessionNotReady)
        ));
    }

    #[test]
    fn test_model_request_order_is_system_then_history() {
        let mut s = session_with_resume("...Python, Django, 3 years...");
        s.append_turn(Role::User, "What skills should I improve?".to_string());
        s.append_turn(Role::Assistant, "Focus on async frameworks.".to_string());
        s.append_turn(
            Role::User,
            "How do I highlight my Django experience?".to_string(),
        );

        let messages = s.build_model_request().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains("Python, Django, 3 years"));
        assert_eq!(messages[1].role, "user");
        assert_eq!(messages[1].content, "What skills should I improve?");
        assert_eq!(messages[2].role, "assistant");
        assert_eq!(messages[3].role, "user");
    }

    #[test]
    fn test_two_round_trips_yield_five_messages() {
        let mut s = session_with_resume("resume");
        s.append_turn(Role::User, "q1".to_string());
        s.append_turn(Role::Assistant, "a1".to_string());
        s.append_turn(Role::User, "q2".to_string());
        s.append_turn(Role::Assistant, "a2".to_string());

        let messages = s.build_model_request().unwrap();
        assert_eq!(messages.len(), 5);
        let roles: Vec<&str> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, ["system", "user", "assistant", "user", "assistant"]);
    }

    #[test]
    fn test_set_resume_is_noop_once_set() {
        let mut s = session_with_resume("first");
        assert!(!s.set_resume("second".to_string()));
        assert_eq!(s.resume_text(), Some("first"));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut s = session_with_resume("resume");
        s.append_turn(Role::User, "hello".to_string());
        s.set_cover_letter("Dear hiring manager".to_string());

        s.reset();
        assert!(s.resume_text().is_none());
        assert_eq!(s.turn_count(), 0);
        assert!(s.cover_letter().is_none());
        // A fresh upload is accepted again after reset.
        assert!(s.set_resume("new resume".to_string()));
    }

    #[test]
    fn test_rolling_window_evicts_oldest_whole_turns() {
        let mut s = session_with_resume("resume");
        let big = "x".repeat(10_000);
        s.append_turn(Role::User, big.clone());
        s.append_turn(Role::Assistant, big.clone());
        s.append_turn(Role::User, big.clone());
        // 30k chars > 24k budget: exactly the first turn goes.
        assert_eq!(s.turn_count(), 2);

        let messages = s.build_model_request().unwrap();
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[2].role, "user");
    }

    #[test]
    fn test_newest_turn_survives_even_when_oversized() {
        let mut s = session_with_resume("resume");
        s.append_turn(Role::User, "y".repeat(MAX_TRANSCRIPT_CHARS + 1));
        assert_eq!(s.turn_count(), 1);
    }

    #[test]
    fn test_busy_flag_rejects_second_generation() {
        let mut s = session_with_resume("resume");
        s.try_begin_generation().unwrap();
        assert!(matches!(
            s.try_begin_generation(),
            Err(AppError::SessionBusy)
        ));
        s.end_generation();
        assert!(s.try_begin_generation().is_ok());
    }

    #[tokio::test]
    async fn test_store_create_and_lookup() {
        let store = SessionStore::new();
        let id = store.create().await;
        assert!(store.get(id).await.is_ok());
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_idle_sessions_expire_and_busy_ones_survive() {
        let store = SessionStore::new();
        let idle_id = store.create().await;
        let busy_id = store.create().await;

        {
            let handle = store.get(idle_id).await.unwrap();
            let mut s = handle.lock().await;
            s.last_active = Utc::now() - Duration::hours(2);
        }
        {
            let handle = store.get(busy_id).await.unwrap();
            let mut s = handle.lock().await;
            s.last_active = Utc::now() - Duration::hours(2);
            s.try_begin_generation().unwrap();
        }

        let expired = store.expire_idle(Duration::minutes(30)).await;
        assert_eq!(expired, 1);
        assert!(store.get(idle_id).await.is_err());
        assert!(store.get(busy_id).await.is_ok());
    }
}
