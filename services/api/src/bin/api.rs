//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{
        chat_llm::OpenAiChatAdapter, context::FsContextAdapter, firestore::FirestoreAdapter,
        image_llm::DallEAdapter, prompt_llm::OpenAiPromptAdapter, tts::OpenAiTtsAdapter,
    },
    config::Config,
    error::ApiError,
    web::{
        auth::{login_handler, logout_handler, register_handler},
        middleware::require_auth,
        profile::{get_profile_handler, update_preferences_handler, update_subjects_handler},
        state::AppState,
        tutor::{
            change_subject_handler, get_tutor_handler, illustration_handler,
            send_message_handler, speech_handler, start_session_handler,
        },
        ApiDoc,
    },
};
use async_openai::{config::OpenAIConfig, Client};
use axum::{
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tutor_core::engine::ConversationEngine;
use tutor_core::ports::{TextToSpeechService, UserStore};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use tower_http::cors::CorsLayer;

/// Writes `contents` to `path` readable by the owner only. The temp dir is
/// shared, so the file must not get the default world-readable mode.
fn write_owner_only(path: &std::path::Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

/// Decodes the base64 service-account credential and builds the Firestore
/// adapter. The credential JSON is written to an owner-only file because the
/// GCP authenticator reads credentials from disk.
async fn build_store(key_b64: &str) -> Result<FirestoreAdapter, ApiError> {
    let credentials_json = String::from_utf8(BASE64.decode(key_b64)?)
        .map_err(|e| ApiError::Internal(format!("Credential is not valid UTF-8: {}", e)))?;
    let parsed: serde_json::Value = serde_json::from_str(&credentials_json)?;
    let project_id = parsed
        .get("project_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| {
            ApiError::Internal("Service-account JSON has no project_id field".to_string())
        })?
        .to_string();

    let credentials_path = std::env::temp_dir().join(format!(
        "tutor-api-service-account-{}.json",
        std::process::id()
    ));
    write_owner_only(&credentials_path, &credentials_json)?;

    let adapter = FirestoreAdapter::new(
        credentials_path.to_string_lossy().into_owned(),
        project_id,
    )
    .await?;
    Ok(adapter)
}

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to the Document Store (degrades when unconfigured) ---
    let store: Option<Arc<dyn UserStore>> = match config.firebase_key_b64.as_deref() {
        Some(key_b64) => match build_store(key_b64).await {
            Ok(adapter) => {
                info!("Connected to the user document store.");
                Some(Arc::new(adapter))
            }
            Err(e) => {
                warn!("Failed to initialize the document store: {}. User accounts are disabled.", e);
                None
            }
        },
        None => {
            warn!(
                "FIREBASE_SERVICE_ACCOUNT_KEY_B64 is not set. \
                 User accounts and tutoring are disabled."
            );
            None
        }
    };

    // --- 3. Initialize the OpenAI-backed Adapters (degrade when unconfigured) ---
    let openai_client = match config.openai_api_key.as_ref() {
        Some(api_key) => Some(Client::with_config(
            OpenAIConfig::new().with_api_key(api_key),
        )),
        None => {
            warn!("OPENAI_API_KEY is not set. Chat, images, and speech are disabled.");
            None
        }
    };

    let tts: Option<Arc<dyn TextToSpeechService>> = match &openai_client {
        Some(client) => {
            let adapter = OpenAiTtsAdapter::from_voice_name(client.clone(), &config.tts_voice)
                .ok_or_else(|| {
                    ApiError::Internal(format!(
                        "Invalid TTS voice specified in config: '{}'",
                        config.tts_voice
                    ))
                })?;
            Some(Arc::new(adapter))
        }
        None => None,
    };

    // --- 4. Build the Conversation Engine (needs both the store and OpenAI) ---
    let context = Arc::new(FsContextAdapter::new(config.subject_dir.clone()));
    let engine = match (&store, &openai_client) {
        (Some(store), Some(client)) => Some(Arc::new(ConversationEngine::new(
            store.clone(),
            Arc::new(OpenAiChatAdapter::new(client.clone(), config.chat_model.clone())),
            Arc::new(OpenAiPromptAdapter::new(
                client.clone(),
                config.image_prompt_model.clone(),
            )),
            Arc::new(DallEAdapter::new(client.clone())),
            context,
        ))),
        _ => None,
    };

    // --- 5. Build the Shared AppState ---
    let app_state = Arc::new(AppState::new(config.clone(), store, engine, tts));

    let cors = CorsLayer::new()
        .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 6. Create the Web Router ---
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/profile", get(get_profile_handler))
        .route("/profile/preferences", put(update_preferences_handler))
        .route("/profile/subjects", put(update_subjects_handler))
        .route("/tutor", get(get_tutor_handler))
        .route("/tutor/session", post(start_session_handler))
        .route("/tutor/message", post(send_message_handler))
        .route("/tutor/subject/change", post(change_subject_handler))
        .route("/tutor/illustration", post(illustration_handler))
        .route("/tutor/speech", post(speech_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 7. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        write_owner_only(&path, "{\"project_id\":\"demo\"}").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"project_id\":\"demo\"}"
        );
    }
}
