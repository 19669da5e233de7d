use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::audio::{AudioClip, AudioStore};
use crate::providers::SpeechClient;
use error_common::{log_soft_failure, EngineResult};

/// Fixed sentinel text used when transcription fails. Downstream renderers
/// match on it to flag the degraded section.
pub const TRANSCRIPTION_UNAVAILABLE: &str = "[transcription unavailable]";

/// Outcome of transcribing one audio clip. Produced once per clip, never
/// mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub original_text: String,
    pub english_text: String,
    pub detected_language: String,
    pub was_translated: bool,
}

impl TranscriptionResult {
    /// Soft-failure sentinel: fixed failure text in both fields, unknown
    /// language, no translation. Keeps the `!was_translated` ⇒ texts-equal
    /// invariant.
    pub fn unavailable() -> Self {
        Self {
            original_text: TRANSCRIPTION_UNAVAILABLE.to_string(),
            english_text: TRANSCRIPTION_UNAVAILABLE.to_string(),
            detected_language: "unknown".to_string(),
            was_translated: false,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        self.english_text == TRANSCRIPTION_UNAVAILABLE
    }
}

/// True for the language codes and names the speech service uses for
/// English ("en", "en-US", "english").
fn is_english(language: &str) -> bool {
    let lower = language.to_lowercase();
    lower == "en" || lower == "english" || lower.starts_with("en-")
}

/// Sends recorded utterances to the speech service, translating non-English
/// speech to English in a second pass over the same audio.
///
/// Audio is persisted to the store before any transcription attempt so a
/// result can be replayed without re-recording. Every failure mode degrades
/// to the sentinel [`TranscriptionResult`]; callers never see an error.
pub struct TranscriptionGateway {
    speech: Arc<dyn SpeechClient>,
    store: AudioStore,
}

impl TranscriptionGateway {
    pub fn new(speech: Arc<dyn SpeechClient>, store: AudioStore) -> Self {
        Self { speech, store }
    }

    pub async fn transcribe(&self, clip: &AudioClip) -> TranscriptionResult {
        self.store.save_soft(clip).await;

        match self.try_transcribe(clip).await {
            Ok(result) => result,
            Err(err) => {
                log_soft_failure("transcription", &err);
                TranscriptionResult::unavailable()
            }
        }
    }

    async fn try_transcribe(&self, clip: &AudioClip) -> EngineResult<TranscriptionResult> {
        let file_name = clip.file_name();
        let transcript = self.speech.transcribe(clip.bytes(), &file_name).await?;

        let detected_language = transcript
            .language
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        // Without a detected language there is nothing to justify a second
        // billed call; treat the transcript as already English.
        if is_english(&detected_language) || detected_language == "unknown" {
            debug!(
                role = %clip.role(),
                language = %detected_language,
                "transcript accepted without translation"
            );
            return Ok(TranscriptionResult {
                original_text: transcript.text.clone(),
                english_text: transcript.text,
                detected_language,
                was_translated: false,
            });
        }

        info!(
            role = %clip.role(),
            language = %detected_language,
            "non-English speech detected, requesting English rendering"
        );
        let english = self
            .speech
            .translate_to_english(clip.bytes(), &file_name)
            .await?;

        Ok(TranscriptionResult {
            original_text: transcript.text,
            english_text: english.text,
            detected_language,
            was_translated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::SpeechTranscript;
    use async_trait::async_trait;
    use error_common::EngineError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedSpeech {
        text: &'static str,
        language: Option<&'static str>,
        english: &'static str,
        fail: bool,
        transcribe_calls: AtomicUsize,
        translate_calls: AtomicUsize,
    }

    impl ScriptedSpeech {
        fn new(text: &'static str, language: Option<&'static str>, english: &'static str) -> Self {
            Self {
                text,
                language,
                english,
                fail: false,
                transcribe_calls: AtomicUsize::new(0),
                translate_calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            let mut mock = Self::new("", None, "");
            mock.fail = true;
            mock
        }
    }

    #[async_trait]
    impl SpeechClient for ScriptedSpeech {
        async fn transcribe(&self, _audio: &[u8], _file: &str) -> EngineResult<SpeechTranscript> {
            self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(EngineError::Transport("connection refused".into()));
            }
            Ok(SpeechTranscript {
                text: self.text.to_string(),
                language: self.language.map(String::from),
            })
        }

        async fn translate_to_english(
            &self,
            _audio: &[u8],
            _file: &str,
        ) -> EngineResult<SpeechTranscript> {
            self.translate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(SpeechTranscript {
                text: self.english.to_string(),
                language: Some("en".to_string()),
            })
        }
    }

    fn gateway_with(speech: Arc<ScriptedSpeech>) -> (TranscriptionGateway, tempfile::TempDir) {
        let root = tempfile::tempdir().unwrap();
        let store = AudioStore::new(root.path().join("p"), root.path().join("d"));
        (TranscriptionGateway::new(speech, store), root)
    }

    #[tokio::test]
    async fn english_speech_skips_translation() {
        let speech = Arc::new(ScriptedSpeech::new(
            "I have had a fever and cough for three days",
            Some("en"),
            "",
        ));
        let (gateway, _root) = gateway_with(speech.clone());

        let clip = AudioClip::new(crate::SpeakerRole::Patient, b"wav".to_vec());
        let result = gateway.transcribe(&clip).await;

        assert!(!result.was_translated);
        assert_eq!(result.original_text, result.english_text);
        assert_eq!(result.detected_language, "en");
        assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 1);
        assert_eq!(speech.translate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_english_speech_gets_a_translation_pass() {
        let speech = Arc::new(ScriptedSpeech::new(
            "mujhe teen din se bukhar hai",
            Some("hi"),
            "I have had a fever for three days",
        ));
        let (gateway, _root) = gateway_with(speech.clone());

        let clip = AudioClip::new(crate::SpeakerRole::Patient, b"wav".to_vec());
        let result = gateway.transcribe(&clip).await;

        assert!(result.was_translated);
        assert_ne!(result.original_text, result.english_text);
        assert_eq!(result.english_text, "I have had a fever for three days");
        assert_eq!(result.detected_language, "hi");
        assert_eq!(speech.translate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_language_degrades_to_unknown_without_translation() {
        let speech = Arc::new(ScriptedSpeech::new("hello there", None, ""));
        let (gateway, _root) = gateway_with(speech.clone());

        let clip = AudioClip::new(crate::SpeakerRole::Doctor, b"wav".to_vec());
        let result = gateway.transcribe(&clip).await;

        assert_eq!(result.detected_language, "unknown");
        assert!(!result.was_translated);
        assert_eq!(result.original_text, result.english_text);
        assert_eq!(speech.translate_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transport_failure_yields_the_sentinel_result() {
        let speech = Arc::new(ScriptedSpeech::failing());
        let (gateway, _root) = gateway_with(speech);

        let clip = AudioClip::new(crate::SpeakerRole::Patient, b"wav".to_vec());
        let result = gateway.transcribe(&clip).await;

        assert!(result.is_unavailable());
        assert_eq!(result.detected_language, "unknown");
        assert!(!result.was_translated);
        // The invariant holds even for the sentinel.
        assert_eq!(result.original_text, result.english_text);
    }

    #[tokio::test]
    async fn audio_is_persisted_before_transcription() {
        let speech = Arc::new(ScriptedSpeech::new("text", Some("en"), ""));
        let root = tempfile::tempdir().unwrap();
        let store = AudioStore::new(root.path().join("p"), root.path().join("d"));
        let gateway = TranscriptionGateway::new(speech, store);

        let clip = AudioClip::new(crate::SpeakerRole::Patient, b"payload".to_vec());
        gateway.transcribe(&clip).await;

        let saved = root.path().join("p").join(clip.file_name());
        assert_eq!(std::fs::read(saved).unwrap(), b"payload");
    }
}
