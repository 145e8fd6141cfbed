//! services/api/src/adapters/chat_llm.rs
//!
//! This module contains the adapter for the main tutoring LLM.
//! It implements the `TutorChatService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tutor_core::domain::{ChatMessage, MessageRole};
use tutor_core::ports::{PortError, PortResult, TutorChatService};

/// Response length ceiling for one tutoring turn.
const MAX_REPLY_TOKENS: u32 = 500;
const TEMPERATURE: f32 = 0.7;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `TutorChatService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiChatAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiChatAdapter {
    /// Creates a new `OpenAiChatAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

/// Maps a transcript entry onto the chat API's message types. `Image`
/// entries have no equivalent and are skipped.
fn to_request_message(message: &ChatMessage) -> PortResult<Option<ChatCompletionRequestMessage>> {
    let request_message = match message.role {
        MessageRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        MessageRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        MessageRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?
            .into(),
        MessageRole::Image => return Ok(None),
    };
    Ok(Some(request_message))
}

//=========================================================================================
// `TutorChatService` Trait Implementation
//=========================================================================================

#[async_trait]
impl TutorChatService for OpenAiChatAdapter {
    /// Forwards the full transcript and returns the single assistant reply.
    async fn reply(&self, transcript: &[ChatMessage]) -> PortResult<String> {
        let mut messages = Vec::with_capacity(transcript.len());
        for message in transcript {
            if let Some(request_message) = to_request_message(message)? {
                messages.push(request_message);
            }
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(MAX_REPLY_TOKENS)
            .temperature(TEMPERATURE)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        // Extract the text content from the first choice in the response.
        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(PortError::Unexpected(
                    "Chat completion response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Chat completion returned no choices in its response.".to_string(),
            ))
        }
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_roles_map_to_chat_message_variants() {
        let mapped = to_request_message(&ChatMessage::system("prompt")).unwrap();
        assert!(matches!(mapped, Some(ChatCompletionRequestMessage::System(_))));

        let mapped = to_request_message(&ChatMessage::user("hi")).unwrap();
        assert!(matches!(mapped, Some(ChatCompletionRequestMessage::User(_))));

        let mapped = to_request_message(&ChatMessage::assistant("hello")).unwrap();
        assert!(matches!(mapped, Some(ChatCompletionRequestMessage::Assistant(_))));
    }

    #[test]
    fn image_entries_are_skipped() {
        let mapped = to_request_message(&ChatMessage::image("https://img.example/1.png")).unwrap();
        assert!(mapped.is_none());
    }

    #[test]
    fn request_builds_with_the_configured_limits() {
        let messages = vec![to_request_message(&ChatMessage::user("hi")).unwrap().unwrap()];
        let request = CreateChatCompletionRequestArgs::default()
            .model("gpt-4.1-nano")
            .messages(messages)
            .max_completion_tokens(MAX_REPLY_TOKENS)
            .temperature(TEMPERATURE)
            .n(1)
            .build()
            .unwrap();
        assert_eq!(request.max_completion_tokens, Some(MAX_REPLY_TOKENS));
        assert_eq!(request.n, Some(1));
    }
}
