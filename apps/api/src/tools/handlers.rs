//! Axum route handlers for the tool API. Thin wrappers over the controller
//! flows; every error is recovered here and rendered as a JSON error body,
//! never propagated past the triggering request.

use std::convert::Infallible;

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    Json,
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::tools::controller::{
    run_check, run_match, start_chat_turn, start_cover_letter, upload_resume, ToolEvent,
    ToolEventStream,
};

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub resume_loaded: bool,
    pub resume_chars: usize,
    pub turn_count: usize,
    pub cover_letter_ready: bool,
}

#[derive(Debug, Serialize)]
pub struct UploadResumeResponse {
    /// False when the session already had a résumé (upload ignored;
    /// reset the session to start over).
    pub applied: bool,
    pub resume_chars: usize,
}

#[derive(Debug, Deserialize)]
pub struct JobDescriptionRequest {
    pub job_description: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisResponse {
    pub analysis: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Session lifecycle
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
) -> Json<CreateSessionResponse> {
    let session_id = state.sessions.create().await;
    Json(CreateSessionResponse { session_id })
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let handle = state.sessions.get(id).await?;
    let session = handle.lock().await;

    Ok(Json(SessionSummary {
        session_id: session.id,
        resume_loaded: session.resume_text().is_some(),
        resume_chars: session.resume_text().map_or(0, str::len),
        turn_count: session.turn_count(),
        cover_letter_ready: session.cover_letter().is_some(),
    }))
}

/// POST /api/v1/sessions/:id/resume
///
/// Multipart PDF upload. Extraction runs before the session is touched, so an
/// unreadable PDF leaves existing session state exactly as it was.
pub async fn handle_upload_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<UploadResumeResponse>, AppError> {
    let handle = state.sessions.get(id).await?;

    let mut bytes: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
    {
        let is_resume_field = field.name() == Some("resume");
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("could not read upload: {e}")))?;
        if is_resume_field {
            bytes = Some(data.to_vec());
            break;
        }
        if bytes.is_none() {
            bytes = Some(data.to_vec());
        }
    }

    let bytes =
        bytes.ok_or_else(|| AppError::Validation("no resume file in upload".to_string()))?;

    let outcome = upload_resume(handle, bytes).await?;

    Ok(Json(UploadResumeResponse {
        applied: outcome.applied,
        resume_chars: outcome.resume_chars,
    }))
}

/// POST /api/v1/sessions/:id/reset
pub async fn handle_reset(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let handle = state.sessions.get(id).await?;
    let mut session = handle.lock().await;
    session.touch();
    session.reset();
    info!(session = %id, "session reset");
    Ok(StatusCode::NO_CONTENT)
}

// ────────────────────────────────────────────────────────────────────────────
// Tools
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions/:id/cover-letter
///
/// Streams the generated letter as SSE `delta` events, then `done` with the
/// full text. The completed letter is also stored for the download endpoint.
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<JobDescriptionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(id).await?;
    let events = start_cover_letter(handle, state.chat.clone(), &request.job_description).await?;
    Ok(sse_response(events))
}

/// GET /api/v1/sessions/:id/cover-letter/download
///
/// The last generated letter as a `Cover_Letter.md` attachment.
pub async fn handle_download_cover_letter(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(id).await?;
    let session = handle.lock().await;
    let letter = session
        .cover_letter()
        .ok_or_else(|| AppError::NotFound("No cover letter has been generated yet".to_string()))?
        .to_string();

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"Cover_Letter.md\"",
            ),
        ],
        letter,
    ))
}

/// POST /api/v1/sessions/:id/check
///
/// Standalone résumé critique, full response (the original tool is blocking).
pub async fn handle_check(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    let analysis = run_check(handle, state.chat.clone()).await?;
    Ok(Json(AnalysisResponse { analysis }))
}

/// POST /api/v1/sessions/:id/match
///
/// Résumé-vs-JD match report, full response.
pub async fn handle_match(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<JobDescriptionRequest>,
) -> Result<Json<AnalysisResponse>, AppError> {
    let handle = state.sessions.get(id).await?;
    let analysis = run_match(handle, state.chat.clone(), &request.job_description).await?;
    Ok(Json(AnalysisResponse { analysis }))
}

/// POST /api/v1/sessions/:id/chat
///
/// One coach turn, streamed as SSE. History gains the user and assistant turns
/// only when the reply completes.
pub async fn handle_chat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    let handle = state.sessions.get(id).await?;
    let events = start_chat_turn(handle, state.chat.clone(), &request.message).await?;
    Ok(sse_response(events))
}

// ────────────────────────────────────────────────────────────────────────────
// SSE plumbing
// ────────────────────────────────────────────────────────────────────────────

fn to_sse_event(ev: ToolEvent) -> Event {
    match ev {
        ToolEvent::Delta(text) => Event::default().event("delta").data(text),
        ToolEvent::Done(text) => Event::default().event("done").data(text),
        ToolEvent::Error(message) => Event::default().event("error").data(message),
    }
}

fn sse_response(
    events: ToolEventStream,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = futures::stream::unfold(events, |mut events| async move {
        events.recv().await.map(|ev| (Ok(to_sse_event(ev)), events))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
