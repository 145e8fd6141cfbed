//! services/api/src/web/tutor.rs
//!
//! The tutor endpoints: study-session lifecycle, chat turns, illustrations,
//! and spoken audio. All conversation semantics live in the core engine;
//! these handlers translate between HTTP and the engine.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::web::state::{AppState, SessionHandle};
use tutor_core::domain::{ChatMessage, GradeLevel, AVAILABLE_SUBJECTS};
use tutor_core::engine::EngineError;
use tutor_core::page::PageEvent;
use tutor_core::ports::PortError;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MessageDto {
    pub role: String,
    pub content: String,
}

impl MessageDto {
    fn from_domain(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        }
    }
}

fn transcript_dto(transcript: &[ChatMessage]) -> Vec<MessageDto> {
    transcript.iter().map(MessageDto::from_domain).collect()
}

#[derive(Serialize, ToSchema)]
pub struct TutorStateResponse {
    pub page: String,
    pub subject: Option<String>,
    pub tokens: i64,
    pub transcript: Vec<MessageDto>,
}

#[derive(Deserialize, ToSchema)]
pub struct StartSessionRequest {
    pub subject: String,
    /// One of "Elementary", "Middle School", "High School", "College".
    /// Defaults to "High School".
    pub grade: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct SendMessageResponse {
    pub reply: String,
    pub tokens: i64,
}

#[derive(Serialize, ToSchema)]
pub struct IllustrationResponse {
    pub image_url: String,
    pub tokens: i64,
}

#[derive(Deserialize, ToSchema)]
pub struct SpeechRequest {
    /// Text to speak. Defaults to the latest tutor reply.
    pub text: Option<String>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

/// Maps engine failures onto HTTP responses. Every failure is terminal for
/// the current action; nothing is retried here.
fn engine_error_response(e: EngineError) -> (StatusCode, String) {
    let status = match &e {
        EngineError::NoActiveSubject | EngineError::NothingToIllustrate => StatusCode::CONFLICT,
        EngineError::OutOfTokens | EngineError::InsufficientTokens { .. } => {
            StatusCode::PAYMENT_REQUIRED
        }
        EngineError::UnknownUser(_) => StatusCode::NOT_FOUND,
        EngineError::Port(PortError::NotFound(_)) => StatusCode::NOT_FOUND,
        EngineError::Port(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Engine failure: {:?}", e);
    }
    (status, e.to_string())
}

async fn remaining_tokens(state: &AppState, username: &str) -> i64 {
    match state.store().ok() {
        Some(store) => match store.get(username).await {
            Ok(Some(profile)) => profile.tokens,
            _ => 0,
        },
        None => 0,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// GET /tutor - Current study state and transcript mirror
#[utoipa::path(
    get,
    path = "/tutor",
    responses(
        (status = 200, description = "The current tutoring state", body = TutorStateResponse),
        (status = 401, description = "Not logged in")
    )
)]
pub async fn get_tutor_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let mut session = session.lock().await;
    session.page = session.page.transition(true, PageEvent::GoTutor);

    let tokens = remaining_tokens(&state, &session.username).await;
    Ok(Json(TutorStateResponse {
        page: session.page.as_str().to_string(),
        subject: session.study.active_subject().map(str::to_string),
        tokens,
        transcript: transcript_dto(&session.study.transcript),
    }))
}

/// POST /tutor/session - Start a study session for one subject
#[utoipa::path(
    post,
    path = "/tutor/session",
    request_body = StartSessionRequest,
    responses(
        (status = 200, description = "Session started; transcript reseeded", body = TutorStateResponse),
        (status = 404, description = "Syllabus or notes file missing; no state change"),
        (status = 422, description = "Unknown subject or grade"),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "AI tutor not configured")
    )
)]
pub async fn start_session_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<StartSessionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = state.engine()?;

    if !AVAILABLE_SUBJECTS.contains(&req.subject.as_str()) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Please select a valid subject to start your study session.".to_string(),
        ));
    }
    let grade = match &req.grade {
        Some(name) => GradeLevel::from_name(name).ok_or((
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Unknown grade level: {}", name),
        ))?,
        None => GradeLevel::default(),
    };

    let mut session = session.lock().await;
    engine
        .start_session(&mut session.study, &req.subject, grade)
        .await
        .map_err(engine_error_response)?;

    let tokens = remaining_tokens(&state, &session.username).await;
    Ok(Json(TutorStateResponse {
        page: session.page.as_str().to_string(),
        subject: session.study.active_subject().map(str::to_string),
        tokens,
        transcript: transcript_dto(&session.study.transcript),
    }))
}

/// POST /tutor/message - One chat exchange with the tutor
#[utoipa::path(
    post,
    path = "/tutor/message",
    request_body = SendMessageRequest,
    responses(
        (status = 200, description = "The tutor's reply", body = SendMessageResponse),
        (status = 400, description = "Empty message"),
        (status = 402, description = "No tokens left"),
        (status = 409, description = "No active study subject"),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "AI tutor not configured")
    )
)]
pub async fn send_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = state.engine()?;
    if req.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Type a question first.".to_string()));
    }

    let mut session = session.lock().await;
    let reply = engine
        .send(&mut session.study, &req.text)
        .await
        .map_err(engine_error_response)?;

    let tokens = remaining_tokens(&state, &session.username).await;
    Ok(Json(SendMessageResponse { reply, tokens }))
}

/// POST /tutor/subject/change - Leave the current subject
#[utoipa::path(
    post,
    path = "/tutor/subject/change",
    responses(
        (status = 200, description = "Transcript cleared, no subject active", body = TutorStateResponse),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "AI tutor not configured")
    )
)]
pub async fn change_subject_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = state.engine()?;

    let mut session = session.lock().await;
    engine
        .change_subject(&mut session.study)
        .await
        .map_err(engine_error_response)?;

    let tokens = remaining_tokens(&state, &session.username).await;
    Ok(Json(TutorStateResponse {
        page: session.page.as_str().to_string(),
        subject: None,
        tokens,
        transcript: Vec::new(),
    }))
}

/// POST /tutor/illustration - Generate a visual for the latest reply
#[utoipa::path(
    post,
    path = "/tutor/illustration",
    responses(
        (status = 200, description = "Image generated", body = IllustrationResponse),
        (status = 402, description = "Fewer than 50 tokens available"),
        (status = 409, description = "No subject active or nothing to illustrate"),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "AI tutor not configured")
    )
)]
pub async fn illustration_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let engine = state.engine()?;

    let mut session = session.lock().await;
    let image_url = engine
        .illustrate(&mut session.study)
        .await
        .map_err(engine_error_response)?;

    let tokens = remaining_tokens(&state, &session.username).await;
    Ok(Json(IllustrationResponse { image_url, tokens }))
}

/// POST /tutor/speech - Speak text aloud (best-effort)
///
/// Failure is non-fatal for the conversation: the transcript and token
/// balance are never touched here.
#[utoipa::path(
    post,
    path = "/tutor/speech",
    request_body = SpeechRequest,
    responses(
        (status = 200, description = "Encoded audio", content_type = "audio/mpeg"),
        (status = 409, description = "Nothing to speak"),
        (status = 401, description = "Not logged in"),
        (status = 503, description = "Text-to-speech not configured"),
        (status = 500, description = "Speech synthesis failed")
    )
)]
pub async fn speech_handler(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(req): Json<SpeechRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tts = state.tts()?;

    let text = match req.text {
        Some(text) if !text.trim().is_empty() => text,
        _ => {
            let session = session.lock().await;
            session
                .study
                .transcript
                .iter()
                .rev()
                .find(|m| m.role == tutor_core::domain::MessageRole::Assistant)
                .map(|m| m.content.clone())
                .ok_or((StatusCode::CONFLICT, "Nothing to speak yet.".to_string()))?
        }
    };

    let audio = tts.synthesize(&text).await.map_err(|e| {
        error!("Text-to-speech failed: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Error converting text to speech.".to_string(),
        )
    })?;

    Ok(([(header::CONTENT_TYPE, "audio/mpeg")], audio))
}
