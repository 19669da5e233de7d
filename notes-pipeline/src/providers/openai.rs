//! OpenAI-compatible REST clients for the speech and chat services.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::{ChatConfig, SpeechConfig};
use crate::providers::{ChatModel, SpeechClient, SpeechTranscript};
use error_common::{EngineError, EngineResult};

/// Speech client against `/audio/transcriptions` and `/audio/translations`.
pub struct OpenAiSpeechClient {
    http: reqwest::Client,
    config: SpeechConfig,
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    text: Option<String>,
    language: Option<String>,
}

impl OpenAiSpeechClient {
    pub fn new(config: SpeechConfig, timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }

    async fn submit(
        &self,
        operation: &str,
        audio: &[u8],
        file_name: &str,
    ) -> EngineResult<SpeechTranscript> {
        let url = format!(
            "{}/audio/{operation}",
            self.config.api_url.trim_end_matches('/')
        );
        let part = Part::bytes(audio.to_vec())
            .file_name(file_name.to_string())
            .mime_str("audio/wav")?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json");

        debug!(url = %url, bytes = audio.len(), "submitting audio");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream("speech", status.as_u16(), detail));
        }

        let body: SpeechResponse = response.json().await?;
        let text = body
            .text
            .ok_or_else(|| EngineError::Schema("speech response missing `text` field".into()))?;
        Ok(SpeechTranscript {
            text,
            language: body.language,
        })
    }
}

#[async_trait]
impl SpeechClient for OpenAiSpeechClient {
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> EngineResult<SpeechTranscript> {
        self.submit("transcriptions", audio, file_name).await
    }

    async fn translate_to_english(
        &self,
        audio: &[u8],
        file_name: &str,
    ) -> EngineResult<SpeechTranscript> {
        self.submit("translations", audio, file_name).await
    }
}

/// Chat-completion client against `/chat/completions`.
pub struct OpenAiChatModel {
    http: reqwest::Client,
    config: ChatConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiChatModel {
    pub fn new(config: ChatConfig, timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> EngineResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.config.api_url.trim_end_matches('/')
        );
        let payload = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream("chat", status.as_u16(), detail));
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .ok_or_else(|| EngineError::Schema("chat response contained no message content".into()))
    }
}
