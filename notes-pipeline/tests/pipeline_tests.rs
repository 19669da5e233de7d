//! End-to-end pipeline tests over counting mock providers: no network, but
//! full orchestration, caching and soft-failure behavior.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use error_common::{EngineError, EngineResult};
use notes_pipeline::providers::{ChatModel, ConceptIndex, SpeechClient, SpeechTranscript};
use notes_pipeline::{
    AudioClip, AudioStore, ConceptMatch, DoctorTermSource, MedicalTermExtractor, NoteSynthesizer,
    PipelineOrchestrator, RunState, SpeakerRole, TerminologyResolver, ResolverConfig,
    TranscriptionGateway,
};

/// Speech mock keyed on audio bytes, counting every billed call.
struct FakeSpeech {
    // audio bytes -> (original text, language, english text)
    utterances: HashMap<Vec<u8>, (String, String, String)>,
    transcribe_calls: AtomicUsize,
    translate_calls: AtomicUsize,
}

impl FakeSpeech {
    fn new() -> Self {
        Self {
            utterances: HashMap::new(),
            transcribe_calls: AtomicUsize::new(0),
            translate_calls: AtomicUsize::new(0),
        }
    }

    fn with_english(mut self, audio: &[u8], text: &str) -> Self {
        self.utterances.insert(
            audio.to_vec(),
            (text.to_string(), "en".to_string(), text.to_string()),
        );
        self
    }

    fn with_translated(mut self, audio: &[u8], original: &str, language: &str, english: &str) -> Self {
        self.utterances.insert(
            audio.to_vec(),
            (original.to_string(), language.to_string(), english.to_string()),
        );
        self
    }
}

#[async_trait]
impl SpeechClient for FakeSpeech {
    async fn transcribe(&self, audio: &[u8], _file: &str) -> EngineResult<SpeechTranscript> {
        self.transcribe_calls.fetch_add(1, Ordering::SeqCst);
        let (original, language, _) = self
            .utterances
            .get(audio)
            .ok_or_else(|| EngineError::Transport("unknown audio".into()))?;
        Ok(SpeechTranscript {
            text: original.clone(),
            language: Some(language.clone()),
        })
    }

    async fn translate_to_english(&self, audio: &[u8], _file: &str) -> EngineResult<SpeechTranscript> {
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        let (_, _, english) = self
            .utterances
            .get(audio)
            .ok_or_else(|| EngineError::Transport("unknown audio".into()))?;
        Ok(SpeechTranscript {
            text: english.clone(),
            language: Some("en".to_string()),
        })
    }
}

/// Chat mock: fixed response, counted calls, last user message recorded.
struct FakeChat {
    response: String,
    calls: AtomicUsize,
    last_user: Mutex<String>,
}

impl FakeChat {
    fn new(response: &str) -> Arc<Self> {
        Arc::new(Self {
            response: response.to_string(),
            calls: AtomicUsize::new(0),
            last_user: Mutex::new(String::new()),
        })
    }

    fn last_user(&self) -> String {
        self.last_user.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, _system: &str, user: &str) -> EngineResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user.lock().unwrap_or_else(|e| e.into_inner()) = user.to_string();
        Ok(self.response.clone())
    }
}

/// Concept index mock with per-keyword rows and counted calls.
struct FakeIndex {
    rows: HashMap<String, Vec<ConceptMatch>>,
    calls: AtomicUsize,
}

impl FakeIndex {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn with(mut self, term: &str, concept_id: &str, label: &str, score: f64) -> Self {
        self.rows.entry(term.to_string()).or_default().push(ConceptMatch {
            concept_id: concept_id.to_string(),
            term_label: label.to_string(),
            semantic_tag: Some("finding".to_string()),
            score,
        });
        self
    }
}

#[async_trait]
impl ConceptIndex for FakeIndex {
    async fn search(&self, keyword: &str) -> EngineResult<Vec<ConceptMatch>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.get(keyword).cloned().unwrap_or_default())
    }
}

struct Harness {
    orchestrator: PipelineOrchestrator,
    speech: Arc<FakeSpeech>,
    extraction_chat: Arc<FakeChat>,
    synthesis_chat: Arc<FakeChat>,
    index: Arc<FakeIndex>,
    _root: tempfile::TempDir,
}

impl Harness {
    fn new(speech: FakeSpeech, extraction: Arc<FakeChat>, synthesis: Arc<FakeChat>, index: FakeIndex) -> Self {
        Self::with_term_source(speech, extraction, synthesis, index, DoctorTermSource::RawTranscript)
    }

    fn with_term_source(
        speech: FakeSpeech,
        extraction_chat: Arc<FakeChat>,
        synthesis_chat: Arc<FakeChat>,
        index: FakeIndex,
        source: DoctorTermSource,
    ) -> Self {
        let root = tempfile::tempdir().unwrap();
        let speech = Arc::new(speech);
        let index = Arc::new(index);
        let store = AudioStore::new(root.path().join("patients"), root.path().join("doctors"));

        let orchestrator = PipelineOrchestrator::new(
            TranscriptionGateway::new(speech.clone(), store),
            MedicalTermExtractor::new(extraction_chat.clone()),
            TerminologyResolver::new(index.clone(), ResolverConfig::default()),
            NoteSynthesizer::new(synthesis_chat.clone()),
            source,
        );

        Self {
            orchestrator,
            speech,
            extraction_chat,
            synthesis_chat,
            index,
            _root: root,
        }
    }

    fn external_calls(&self) -> usize {
        self.speech.transcribe_calls.load(Ordering::SeqCst)
            + self.speech.translate_calls.load(Ordering::SeqCst)
            + self.extraction_chat.calls.load(Ordering::SeqCst)
            + self.synthesis_chat.calls.load(Ordering::SeqCst)
            + self.index.calls.load(Ordering::SeqCst)
    }
}

const PATIENT_AUDIO: &[u8] = b"patient-utterance";
const DOCTOR_AUDIO: &[u8] = b"doctor-utterance";
const EXTRACTION_JSON: &str =
    r#"{"diseases":["fever","cough"],"symptoms":["fever","cough"],"severity":"moderate","urgency":"medium"}"#;

fn english_harness() -> Harness {
    let speech = FakeSpeech::new()
        .with_english(PATIENT_AUDIO, "I have had a fever and cough for three days")
        .with_english(DOCTOR_AUDIO, "Prescribe paracetamol and rest for five days");
    let index = FakeIndex::new()
        .with("fever", "386661006", "Fever (finding)", 0.92)
        .with("cough", "49727002", "Cough (finding)", 0.85);
    Harness::new(
        speech,
        FakeChat::new(EXTRACTION_JSON),
        FakeChat::new("Presentation: fever and cough for three days.\nPlan: paracetamol."),
        index,
    )
}

#[tokio::test]
async fn english_end_to_end_scenario() {
    let harness = english_harness();
    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());

    let run = harness.orchestrator.run(patient, doctor).await;

    assert_eq!(run.state, RunState::NoteSynthesized);
    assert!(!run.is_degraded());

    assert_eq!(run.patient.transcription.detected_language, "en");
    assert!(!run.patient.transcription.was_translated);
    assert_eq!(run.patient.analysis.diseases, vec!["fever", "cough"]);

    let fever_matches = run.patient.terms.get("fever").unwrap();
    assert!(!fever_matches.is_empty());
    assert_eq!(fever_matches[0].concept_id, "386661006");

    // Doctor terms default to the raw transcript, lower-cased by the
    // resolver's normalization.
    assert!(run
        .doctor
        .terms
        .get("prescribe paracetamol and rest for five days")
        .is_some());
    assert!(run.doctor.analysis.is_none());

    let rendered = run.note.render();
    assert!(rendered.contains("Translation Applied: No"));
    assert!(rendered.contains("Patient Language: en"));
}

#[tokio::test]
async fn translated_scenario_feeds_english_text_downstream() {
    let speech = FakeSpeech::new()
        .with_translated(
            PATIENT_AUDIO,
            "mujhe teen din se bukhar aur khansi hai",
            "hi",
            "I have had a fever and cough for three days",
        )
        .with_english(DOCTOR_AUDIO, "Paracetamol twice daily");
    let extraction = FakeChat::new(EXTRACTION_JSON);
    let harness = Harness::new(
        speech,
        extraction.clone(),
        FakeChat::new("Presentation: fever."),
        FakeIndex::new().with("fever", "386661006", "Fever (finding)", 0.92),
    );

    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());
    let run = harness.orchestrator.run(patient, doctor).await;

    assert!(run.patient.transcription.was_translated);
    assert_ne!(
        run.patient.transcription.original_text,
        run.patient.transcription.english_text
    );
    assert_eq!(harness.speech.translate_calls.load(Ordering::SeqCst), 1);

    // The extractor saw the English rendering, not the original.
    assert_eq!(
        extraction.last_user(),
        "I have had a fever and cough for three days"
    );

    assert!(run.note.render().contains("Translation Applied: Yes"));
}

#[tokio::test]
async fn repeated_runs_are_idempotent_with_no_extra_external_calls() {
    let harness = english_harness();
    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());

    let first = harness
        .orchestrator
        .run(patient.clone(), doctor.clone())
        .await;
    let calls_after_first = harness.external_calls();

    // Byte-identical clips captured "later", as a UI re-render would.
    let patient_again = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor_again = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());
    let second = harness.orchestrator.run(patient_again, doctor_again).await;

    assert_eq!(harness.external_calls(), calls_after_first);
    assert_eq!(first.id, second.id);
    assert_eq!(first.note, second.note);
}

#[tokio::test]
async fn branch_caches_short_circuit_partial_resubmission() {
    let harness = english_harness();
    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());

    let first = harness.orchestrator.submit_patient(&patient).await;
    let calls_after_first = harness.external_calls();

    let second = harness.orchestrator.submit_patient(&patient).await;
    assert_eq!(harness.external_calls(), calls_after_first);
    assert_eq!(first.analysis, second.analysis);
}

#[tokio::test]
async fn state_progresses_from_empty_to_note_synthesized() {
    let harness = english_harness();
    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());
    let (pfp, dfp) = (patient.fingerprint().clone(), doctor.fingerprint().clone());

    assert_eq!(harness.orchestrator.state_for(&pfp, &dfp), RunState::Empty);

    harness.orchestrator.submit_patient(&patient).await;
    assert_eq!(
        harness.orchestrator.state_for(&pfp, &dfp),
        RunState::AwaitingDoctor
    );

    harness.orchestrator.submit_doctor(&doctor).await;
    assert_eq!(
        harness.orchestrator.state_for(&pfp, &dfp),
        RunState::DoctorTermsResolved
    );

    harness.orchestrator.run(patient, doctor).await;
    assert_eq!(
        harness.orchestrator.state_for(&pfp, &dfp),
        RunState::NoteSynthesized
    );
}

#[tokio::test]
async fn structured_doctor_extraction_stores_the_doctor_analysis() {
    let speech = FakeSpeech::new()
        .with_english(PATIENT_AUDIO, "I have a fever")
        .with_english(DOCTOR_AUDIO, "Likely viral fever, prescribing paracetamol");
    let harness = Harness::with_term_source(
        speech,
        FakeChat::new(r#"{"diseases":["fever"],"symptoms":["fever"],"severity":"mild","urgency":"low"}"#),
        FakeChat::new("note body"),
        FakeIndex::new().with("fever", "386661006", "Fever (finding)", 0.92),
        DoctorTermSource::StructuredExtraction,
    );

    let patient = AudioClip::new(SpeakerRole::Patient, PATIENT_AUDIO.to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());
    let run = harness.orchestrator.run(patient, doctor).await;

    let doctor_analysis = run.doctor.analysis.expect("structured mode stores analysis");
    assert_eq!(doctor_analysis.diseases, vec!["fever"]);
    // Doctor terms come from extraction now, not the raw transcript.
    assert!(run.doctor.terms.get("fever").is_some());
}

#[tokio::test]
async fn failed_transcription_degrades_the_run_without_halting_it() {
    // No utterance registered for the patient audio: transcription fails.
    let speech =
        FakeSpeech::new().with_english(DOCTOR_AUDIO, "Prescribing rest and fluids");
    let extraction = FakeChat::new(EXTRACTION_JSON);
    let harness = Harness::new(
        speech,
        extraction.clone(),
        FakeChat::new("note body"),
        FakeIndex::new(),
    );

    let patient = AudioClip::new(SpeakerRole::Patient, b"unregistered".to_vec());
    let doctor = AudioClip::new(SpeakerRole::Doctor, DOCTOR_AUDIO.to_vec());
    let run = harness.orchestrator.run(patient, doctor).await;

    assert_eq!(run.state, RunState::NoteSynthesized);
    assert!(run.is_degraded());
    assert!(run.patient.transcription.is_unavailable());
    assert!(run.patient.analysis.is_empty());
    assert!(run.patient.terms.is_empty());
    // The degraded branch never billed the extraction model.
    assert_eq!(extraction.calls.load(Ordering::SeqCst), 0);
    // The note still renders with a well-formed footer.
    assert!(run.note.render().contains("Translation Applied: No"));
}
