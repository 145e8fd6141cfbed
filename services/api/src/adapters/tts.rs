//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `TextToSpeechService` port from the `core` crate and owns
//! the mapping from a configured voice name to the API's voice type.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use tutor_core::ports::{PortError, PortResult, TextToSpeechService};

/// Parses a configured voice name, case-insensitively. `None` for names the
/// speech API does not offer.
pub fn voice_from_name(name: &str) -> Option<Voice> {
    let voice = match name.to_lowercase().as_str() {
        "alloy" => Voice::Alloy,
        "ash" => Voice::Ash,
        "ballad" => Voice::Ballad,
        "coral" => Voice::Coral,
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "sage" => Voice::Sage,
        "shimmer" => Voice::Shimmer,
        "verse" => Voice::Verse,
        _ => return None,
    };
    Some(voice)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `TextToSpeechService` port using the OpenAI TTS API.
#[derive(Clone)]
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    voice: Voice,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: SpeechModel, voice: Voice) -> Self {
        Self {
            client,
            model,
            voice,
        }
    }

    /// Builds the adapter from a configured voice name, with the standard
    /// `tts-1` model. `None` when the name is not a known voice.
    pub fn from_voice_name(client: Client<OpenAIConfig>, name: &str) -> Option<Self> {
        voice_from_name(name).map(|voice| Self::new(client, SpeechModel::Tts1, voice))
    }
}

//=========================================================================================
// `TextToSpeechService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TextToSpeechService for OpenAiTtsAdapter {
    /// Generates a vector of encoded audio data (`Vec<u8>`) from the given text.
    async fn synthesize(&self, text: &str) -> PortResult<Vec<u8>> {
        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            ..Default::default()
        };

        // Call the API and manually map the error, which respects the orphan rule.
        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // The response contains a `bytes` field. We call `.to_vec()` on that field.
        Ok(response.bytes.to_vec())
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_voice_names_parse_case_insensitively() {
        assert_eq!(voice_from_name("alloy"), Some(Voice::Alloy));
        assert_eq!(voice_from_name("Shimmer"), Some(Voice::Shimmer));
        assert_eq!(voice_from_name("ONYX"), Some(Voice::Onyx));
    }

    #[test]
    fn unknown_voice_names_are_rejected() {
        assert_eq!(voice_from_name("baritone"), None);
        assert_eq!(voice_from_name(""), None);
    }

    #[test]
    fn adapter_builds_only_for_a_known_voice() {
        let client = Client::with_config(OpenAIConfig::new().with_api_key("test"));
        assert!(OpenAiTtsAdapter::from_voice_name(client.clone(), "nova").is_some());
        assert!(OpenAiTtsAdapter::from_voice_name(client, "baritone").is_none());
    }
}
