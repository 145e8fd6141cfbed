//! services/api/src/web/state.rs
//!
//! Defines the application's shared and session-specific states.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::StatusCode;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::config::Config;
use tutor_core::domain::ChatMessage;
use tutor_core::engine::{ConversationEngine, StudySession};
use tutor_core::page::Page;
use tutor_core::ports::{TextToSpeechService, UserStore};

/// A handle to one browser session's mutable state. The per-session mutex
/// serializes its requests, so external calls stay sequential within a
/// session.
pub type SessionHandle = Arc<Mutex<SessionState>>;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all
/// handlers. The adapter slots are `None` when the corresponding credential
/// was absent at startup; handlers answer 503 instead of crashing.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Option<Arc<dyn UserStore>>,
    pub engine: Option<Arc<ConversationEngine>>,
    pub tts: Option<Arc<dyn TextToSpeechService>>,
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Option<Arc<dyn UserStore>>,
        engine: Option<Arc<ConversationEngine>>,
        tts: Option<Arc<dyn TextToSpeechService>>,
    ) -> Self {
        Self {
            config,
            store,
            engine,
            tts,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Result<Arc<dyn UserStore>, (StatusCode, String)> {
        self.store.clone().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "The user database is not configured. Set FIREBASE_SERVICE_ACCOUNT_KEY_B64."
                .to_string(),
        ))
    }

    pub fn engine(&self) -> Result<Arc<ConversationEngine>, (StatusCode, String)> {
        self.engine.clone().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "The AI tutor is not configured. Set OPENAI_API_KEY and \
             FIREBASE_SERVICE_ACCOUNT_KEY_B64."
                .to_string(),
        ))
    }

    pub fn tts(&self) -> Result<Arc<dyn TextToSpeechService>, (StatusCode, String)> {
        self.tts.clone().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "Text-to-speech is not configured. Set OPENAI_API_KEY.".to_string(),
        ))
    }

    // --- Session Store ---
    //
    // Sessions are process-local and keyed by a random id carried in a
    // cookie without Max-Age, so their lifetime is bounded by the browser
    // session on one side and the process on the other.

    pub async fn create_session(&self, state: SessionState) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(session_id.clone(), Arc::new(Mutex::new(state)));
        session_id
    }

    pub async fn session(&self, session_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }
}

//=========================================================================================
// SessionState (Specific to One Browser Session)
//=========================================================================================

/// The state for a single logged-in browser session: the page the client
/// should be rendering plus the study-session state machine with its
/// transcript mirror.
pub struct SessionState {
    pub username: String,
    pub page: Page,
    pub study: StudySession,
}

impl SessionState {
    /// Creates the state for a freshly logged-in user. The stored transcript
    /// is mirrored; no subject is active until one is selected.
    pub fn new(username: String, stored_transcript: Vec<ChatMessage>) -> Self {
        Self {
            username: username.clone(),
            page: Page::Tutor,
            study: StudySession::new(username, stored_transcript),
        }
    }
}
