pub mod neo4j;
pub mod openai;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ChatConfig, GraphConfig, SpeechConfig};
use crate::terminology::ConceptMatch;
use error_common::EngineResult;

/// Raw transcript returned by the speech service.
#[derive(Debug, Clone)]
pub struct SpeechTranscript {
    pub text: String,
    /// Detected language code, when the service reports one.
    pub language: Option<String>,
}

/// Speech-to-text provider seam.
#[async_trait]
pub trait SpeechClient: Send + Sync {
    /// Transcribe audio in its spoken language, with language auto-detection.
    async fn transcribe(&self, audio: &[u8], file_name: &str) -> EngineResult<SpeechTranscript>;

    /// Produce an English rendering of the same audio.
    async fn translate_to_english(
        &self,
        audio: &[u8],
        file_name: &str,
    ) -> EngineResult<SpeechTranscript>;
}

/// Chat-completion provider seam, used for both structured term extraction
/// and free-form note generation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion and return the model's message content.
    async fn complete(&self, system: &str, user: &str) -> EngineResult<String>;
}

/// Terminology concept index seam. Returns raw scored rows in index-native
/// order; score filtering and truncation belong to the resolver.
#[async_trait]
pub trait ConceptIndex: Send + Sync {
    async fn search(&self, keyword: &str) -> EngineResult<Vec<ConceptMatch>>;
}

/// Create the reqwest-backed speech client.
pub fn create_speech_client(
    config: &SpeechConfig,
    timeout: Duration,
) -> EngineResult<Arc<dyn SpeechClient>> {
    Ok(Arc::new(openai::OpenAiSpeechClient::new(
        config.clone(),
        timeout,
    )?))
}

/// Create the reqwest-backed chat model.
pub fn create_chat_model(config: &ChatConfig, timeout: Duration) -> EngineResult<Arc<dyn ChatModel>> {
    Ok(Arc::new(openai::OpenAiChatModel::new(
        config.clone(),
        timeout,
    )?))
}

/// Create the Neo4j-backed concept index.
pub fn create_concept_index(
    config: &GraphConfig,
    timeout: Duration,
) -> EngineResult<Arc<dyn ConceptIndex>> {
    Ok(Arc::new(neo4j::Neo4jConceptIndex::new(
        config.clone(),
        timeout,
    )?))
}
