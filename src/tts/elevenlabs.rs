//! Клиент ElevenLabs text-to-dialogue API
//!
//! Один запрос синтезирует весь диалог сразу: каждый элемент `inputs`
//! озвучивается своим голосом.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Response};
use serde_json::json;

use super::{DialogueInput, SpeechBackend, TimestampedSpeech};
use crate::config::SynthesisConfig;
use crate::error::{Result, StudioError};

/// Клиент для работы с ElevenLabs
pub struct ElevenLabsClient {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: String,
    output_format: String,
}

impl ElevenLabsClient {
    /// Создает новый клиент
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            log::error!("ElevenLabs API key is empty");
            return Err(StudioError::Configuration(
                "ElevenLabs API key is required for speech synthesis".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            output_format: config.output_format.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_dialogue(&self, path: &str, inputs: &[DialogueInput]) -> Result<Response> {
        log::debug!(
            "Sending dialogue request to {} ({} inputs, model {})",
            path,
            inputs.len(),
            self.model_id
        );

        let response = self
            .client
            .post(self.endpoint(path))
            .query(&[("output_format", self.output_format.as_str())])
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "inputs": inputs,
                "model_id": self.model_id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            log::error!("ElevenLabs API error (status {}): {}", status, error_text);
            return Err(StudioError::Synthesis(format!(
                "{} returned {}: {}",
                path, status, error_text
            )));
        }

        Ok(response)
    }
}

#[async_trait]
impl SpeechBackend for ElevenLabsClient {
    async fn synthesize_timestamped(&self, inputs: &[DialogueInput]) -> Result<TimestampedSpeech> {
        let response = self
            .post_dialogue("/v1/text-to-dialogue/with-timestamps", inputs)
            .await?;
        let speech: TimestampedSpeech = response.json().await?;

        log::info!(
            "Received timestamped dialogue: {} voice segments, {} aligned characters",
            speech.voice_segments.len(),
            speech.preferred_alignment().map_or(0, |a| a.len())
        );
        Ok(speech)
    }

    async fn synthesize(&self, inputs: &[DialogueInput]) -> Result<Bytes> {
        let response = self.post_dialogue("/v1/text-to-dialogue", inputs).await?;
        let bytes = response.bytes().await?;

        if bytes.is_empty() {
            return Err(StudioError::Synthesis(
                "received empty audio from /v1/text-to-dialogue".to_string(),
            ));
        }

        log::info!("Received plain dialogue audio ({} bytes)", bytes.len());
        Ok(bytes)
    }
}
