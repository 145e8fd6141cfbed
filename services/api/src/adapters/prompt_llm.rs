//! services/api/src/adapters/prompt_llm.rs
//!
//! This module contains the adapter for the image-prompt condensation LLM.
//! It implements the `ImagePromptService` port from the `core` crate.

const SYSTEM_INSTRUCTIONS: &str = "You are an assistant that generates concise, \
descriptive image prompts based on provided text, suitable for a visual learner. \
Focus on key concepts. Max 50 words.";

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tutor_core::ports::{ImagePromptService, PortError, PortResult};

/// The condensed prompt is capped hard; 50 words fit comfortably.
const MAX_PROMPT_TOKENS: u32 = 50;
const TEMPERATURE: f32 = 0.7;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `ImagePromptService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiPromptAdapter {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiPromptAdapter {
    /// Creates a new `OpenAiPromptAdapter`.
    pub fn new(client: Client<OpenAIConfig>, model: String) -> Self {
        Self { client, model }
    }
}

//=========================================================================================
// `ImagePromptService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImagePromptService for OpenAiPromptAdapter {
    /// Condenses the latest tutor reply into a short image-generation prompt.
    async fn condense(&self, source_text: &str) -> PortResult<String> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_INSTRUCTIONS)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("Generate an image prompt based on this: {}", source_text))
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_completion_tokens(MAX_PROMPT_TOKENS)
            .temperature(TEMPERATURE)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        if let Some(choice) = response.choices.into_iter().next() {
            if let Some(content) = choice.message.content {
                Ok(content)
            } else {
                Err(PortError::Unexpected(
                    "Image prompt LLM response contained no text content.".to_string(),
                ))
            }
        } else {
            Err(PortError::Unexpected(
                "Image prompt LLM returned no choices in its response.".to_string(),
            ))
        }
    }
}
