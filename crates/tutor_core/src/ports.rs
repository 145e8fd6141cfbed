//! crates/tutor_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like the
//! document store or the OpenAI APIs.

use async_trait::async_trait;

use crate::domain::{ChatMessage, SubjectContext, UserPatch, UserProfile};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services
/// (e.g., document store, network, LLM API).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Item already exists: {0}")]
    AlreadyExists(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// CRUD over the per-username user document.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetches a profile; `None` when the username is unknown.
    async fn get(&self, username: &str) -> PortResult<Option<UserProfile>>;

    /// Creates a new profile. Fails with `AlreadyExists` (and must not
    /// touch the stored record) when the username is taken.
    async fn create(&self, profile: &UserProfile) -> PortResult<()>;

    /// Merge-updates a profile: only the fields present in the patch are
    /// written, all other stored fields are preserved.
    async fn update(&self, username: &str, patch: &UserPatch) -> PortResult<()>;
}

/// The main tutoring LLM: takes the full transcript, returns one reply.
#[async_trait]
pub trait TutorChatService: Send + Sync {
    async fn reply(&self, transcript: &[ChatMessage]) -> PortResult<String>;
}

/// Condenses an assistant reply into a short image-generation prompt.
#[async_trait]
pub trait ImagePromptService: Send + Sync {
    async fn condense(&self, source_text: &str) -> PortResult<String>;
}

/// Turns a text prompt into one hosted image, returned by URL.
#[async_trait]
pub trait ImageGenerationService: Send + Sync {
    async fn generate(&self, prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait TextToSpeechService: Send + Sync {
    /// Generates encoded audio data from a string of text.
    async fn synthesize(&self, text: &str) -> PortResult<Vec<u8>>;
}

/// Loads the syllabus and supplementary notes for one subject.
/// All-or-nothing: a missing file fails the whole load.
#[async_trait]
pub trait SubjectContextService: Send + Sync {
    async fn load(&self, subject: &str) -> PortResult<SubjectContext>;
}
