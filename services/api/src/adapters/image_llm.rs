//! services/api/src/adapters/image_llm.rs
//!
//! This module contains the adapter for the DALL·E image-generation API.
//! It implements the `ImageGenerationService` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::images::{
        CreateImageRequestArgs, Image, ImageModel, ImageQuality, ImageResponseFormat,
        ImageSize, ImagesResponse,
    },
    Client,
};
use async_trait::async_trait;
use tutor_core::ports::{ImageGenerationService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `ImageGenerationService` port using DALL·E 3.
/// Size, quality, and count are fixed: one 1024x1024 standard-quality image
/// per request, returned by URL.
#[derive(Clone)]
pub struct DallEAdapter {
    client: Client<OpenAIConfig>,
}

impl DallEAdapter {
    /// Creates a new `DallEAdapter`.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

/// Pulls the single requested URL out of the response.
fn url_from_response(response: ImagesResponse) -> PortResult<String> {
    match response.data.into_iter().next() {
        Some(image) => match image.as_ref() {
            Image::Url { url, .. } => Ok(url.clone()),
            _ => Err(PortError::Unexpected(
                "Image generation returned no URL in its response.".to_string(),
            )),
        },
        None => Err(PortError::Unexpected(
            "Image generation returned no image data.".to_string(),
        )),
    }
}

//=========================================================================================
// `ImageGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl ImageGenerationService for DallEAdapter {
    async fn generate(&self, prompt: &str) -> PortResult<String> {
        let request = CreateImageRequestArgs::default()
            .model(ImageModel::DallE3)
            .prompt(prompt)
            .n(1)
            .size(ImageSize::S1024x1024)
            .quality(ImageQuality::Standard)
            .response_format(ImageResponseFormat::Url)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        let response = self
            .client
            .images()
            .generate(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unexpected(e.to_string()))?;

        url_from_response(response)
    }
}

//=========================================================================================
// Tests
//=========================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn response_with(data: Vec<Arc<Image>>) -> ImagesResponse {
        ImagesResponse {
            created: 0,
            data,
            background: None,
            output_format: None,
            size: None,
            quality: None,
            usage: None,
        }
    }

    #[test]
    fn url_is_extracted_from_the_first_image() {
        let response = response_with(vec![Arc::new(Image::Url {
            url: "https://img.example/1.png".to_string(),
            revised_prompt: None,
        })]);
        assert_eq!(url_from_response(response).unwrap(), "https://img.example/1.png");
    }

    #[test]
    fn empty_response_is_an_error() {
        let result = url_from_response(response_with(Vec::new()));
        assert!(matches!(result, Err(PortError::Unexpected(_))));
    }
}
