//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. The two credentials
//! (`FIREBASE_SERVICE_ACCOUNT_KEY_B64` and `OPENAI_API_KEY`) are optional:
//! when either is absent the dependent features are disabled with a startup
//! warning instead of refusing to boot.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    /// Base64-encoded service-account JSON for the document store.
    pub firebase_key_b64: Option<String>,
    pub openai_api_key: Option<String>,
    /// Directory holding the per-subject syllabus and notes files.
    pub subject_dir: PathBuf,
    pub chat_model: String,
    pub image_prompt_model: String,
    pub tts_voice: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Credentials (as optional) ---
        let firebase_key_b64 = std::env::var("FIREBASE_SERVICE_ACCOUNT_KEY_B64").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let subject_dir = std::env::var("SUBJECT_CONTEXT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./subject_context"));
        let chat_model =
            std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4.1-nano".to_string());
        let image_prompt_model = std::env::var("IMAGE_PROMPT_MODEL")
            .unwrap_or_else(|_| "gpt-4.1-nano".to_string());
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "alloy".to_string());

        Ok(Self {
            bind_address,
            log_level,
            firebase_key_b64,
            openai_api_key,
            subject_dir,
            chat_model,
            image_prompt_model,
            tts_voice,
        })
    }
}
