use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::audio::{AudioClip, AudioStore, Fingerprint};
use crate::config::{DoctorTermSource, PipelineConfig};
use crate::extraction::{MedicalAnalysis, MedicalTermExtractor};
use crate::providers::{create_chat_model, create_concept_index, create_speech_client};
use crate::synthesis::{ClinicalNote, NoteSynthesizer};
use crate::terminology::{TerminologyResolver, TerminologyResult};
use crate::transcription::{TranscriptionGateway, TranscriptionResult};
use error_common::EngineResult;

/// Progress of a pipeline run. Soft failures leave sentinel values inline
/// and the machine keeps advancing; `NoteSynthesized` is the only terminal
/// state and requires both branches complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Empty,
    PatientTranscribed,
    PatientAnalyzed,
    PatientTermsResolved,
    AwaitingDoctor,
    DoctorTranscribed,
    DoctorTermsResolved,
    NoteSynthesized,
}

/// Everything derived from one patient clip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientIntake {
    pub transcription: TranscriptionResult,
    pub analysis: MedicalAnalysis,
    pub terms: TerminologyResult,
}

/// Everything derived from one doctor clip. `analysis` is only present when
/// doctor terms come from structured extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorIntake {
    pub transcription: TranscriptionResult,
    pub analysis: Option<MedicalAnalysis>,
    pub terms: TerminologyResult,
}

/// One complete pipeline run for a {patient, doctor} clip pair. Owns every
/// derived artifact; cached by the fingerprint pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub patient_fingerprint: Fingerprint,
    pub doctor_fingerprint: Fingerprint,
    pub patient: PatientIntake,
    pub doctor: DoctorIntake,
    pub note: ClinicalNote,
    pub state: RunState,
    pub created_at: DateTime<Utc>,
}

impl PipelineRun {
    /// True when any stage fell back to its sentinel value; a renderer can
    /// use this to flag degraded sections.
    pub fn is_degraded(&self) -> bool {
        self.patient.transcription.is_unavailable()
            || self.doctor.transcription.is_unavailable()
            || self.note.is_fallback()
    }
}

/// Sequences transcription, extraction, terminology resolution and note
/// synthesis for a clip pair.
///
/// Each branch is cached by audio content fingerprint and completed runs by
/// the fingerprint pair, so re-submitting identical audio (a UI re-render)
/// never repeats billed external calls. Patient and doctor branches run
/// concurrently; synthesis joins them.
pub struct PipelineOrchestrator {
    gateway: TranscriptionGateway,
    extractor: MedicalTermExtractor,
    resolver: TerminologyResolver,
    synthesizer: NoteSynthesizer,
    doctor_term_source: DoctorTermSource,
    patient_cache: Mutex<HashMap<Fingerprint, PatientIntake>>,
    doctor_cache: Mutex<HashMap<Fingerprint, DoctorIntake>>,
    run_cache: Mutex<HashMap<(Fingerprint, Fingerprint), PipelineRun>>,
}

impl PipelineOrchestrator {
    pub fn new(
        gateway: TranscriptionGateway,
        extractor: MedicalTermExtractor,
        resolver: TerminologyResolver,
        synthesizer: NoteSynthesizer,
        doctor_term_source: DoctorTermSource,
    ) -> Self {
        Self {
            gateway,
            extractor,
            resolver,
            synthesizer,
            doctor_term_source,
            patient_cache: Mutex::new(HashMap::new()),
            doctor_cache: Mutex::new(HashMap::new()),
            run_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Wire the orchestrator from configuration. This is the only place a
    /// `Config` error can surface; everything after construction fails soft.
    pub fn from_config(config: PipelineConfig) -> EngineResult<Self> {
        let timeout = Duration::from_secs(config.request_timeout_secs);

        let speech = create_speech_client(&config.speech, timeout)?;
        let chat = create_chat_model(&config.chat, timeout)?;
        let index = create_concept_index(&config.graph, timeout)?;
        let store = AudioStore::new(&config.storage.patient_dir, &config.storage.doctor_dir);

        Ok(Self::new(
            TranscriptionGateway::new(speech, store),
            MedicalTermExtractor::new(chat.clone()),
            TerminologyResolver::new(index, config.resolver),
            NoteSynthesizer::new(chat),
            config.doctor_term_source,
        ))
    }

    /// Observable state for a clip pair, derived from what the caches hold.
    /// Intermediate per-branch states (`PatientTranscribed`,
    /// `PatientAnalyzed`, `DoctorTranscribed`) exist only inside an in-flight
    /// branch and are never visible between calls.
    pub fn state_for(&self, patient: &Fingerprint, doctor: &Fingerprint) -> RunState {
        let run_done = self
            .run_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&(patient.clone(), doctor.clone()));
        if run_done {
            return RunState::NoteSynthesized;
        }
        match (
            self.cached_patient(patient).is_some(),
            self.cached_doctor(doctor).is_some(),
        ) {
            (true, true) | (false, true) => RunState::DoctorTermsResolved,
            (true, false) => RunState::AwaitingDoctor,
            (false, false) => RunState::Empty,
        }
    }

    fn cached_patient(&self, fingerprint: &Fingerprint) -> Option<PatientIntake> {
        self.patient_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(fingerprint)
            .cloned()
    }

    fn cached_doctor(&self, fingerprint: &Fingerprint) -> Option<DoctorIntake> {
        self.doctor_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(fingerprint)
            .cloned()
    }

    /// Run the patient branch: transcribe, extract, resolve terminology.
    /// Idempotent per clip fingerprint.
    pub async fn submit_patient(&self, clip: &AudioClip) -> PatientIntake {
        let fingerprint = clip.fingerprint().clone();
        if let Some(hit) = self.cached_patient(&fingerprint) {
            debug!(fingerprint = %fingerprint, "patient branch cache hit");
            return hit;
        }

        let transcription = self.gateway.transcribe(clip).await;

        // A sentinel transcript carries no medical content; skip the billed
        // extraction and terminology calls and record the empty defaults.
        let (analysis, terms) = if transcription.is_unavailable() {
            (MedicalAnalysis::default(), TerminologyResult::default())
        } else {
            let analysis = self.extractor.extract(&transcription.english_text).await;
            let terms = self.resolver.resolve(&analysis.query_terms()).await;
            (analysis, terms)
        };

        let intake = PatientIntake {
            transcription,
            analysis,
            terms,
        };
        self.patient_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fingerprint, intake.clone());
        intake
    }

    /// Run the doctor branch: transcribe, derive terminology queries per the
    /// configured term source, resolve. Idempotent per clip fingerprint.
    pub async fn submit_doctor(&self, clip: &AudioClip) -> DoctorIntake {
        let fingerprint = clip.fingerprint().clone();
        if let Some(hit) = self.cached_doctor(&fingerprint) {
            debug!(fingerprint = %fingerprint, "doctor branch cache hit");
            return hit;
        }

        let transcription = self.gateway.transcribe(clip).await;

        let (analysis, term_list) = if transcription.is_unavailable() {
            (None, Vec::new())
        } else {
            match self.doctor_term_source {
                DoctorTermSource::RawTranscript => {
                    (None, vec![transcription.english_text.clone()])
                }
                DoctorTermSource::StructuredExtraction => {
                    let analysis = self.extractor.extract(&transcription.english_text).await;
                    let terms = analysis.query_terms();
                    (Some(analysis), terms)
                }
            }
        };

        let terms = self.resolver.resolve(&term_list).await;

        let intake = DoctorIntake {
            transcription,
            analysis,
            terms,
        };
        self.doctor_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(fingerprint, intake.clone());
        intake
    }

    /// Full pipeline for one clip pair. A completed run is cached by the
    /// fingerprint pair and returned verbatim on repeat invocation.
    pub async fn run(&self, patient_clip: AudioClip, doctor_clip: AudioClip) -> PipelineRun {
        let key = (
            patient_clip.fingerprint().clone(),
            doctor_clip.fingerprint().clone(),
        );
        if let Some(hit) = self
            .run_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .cloned()
        {
            debug!(run_id = %hit.id, "pipeline run cache hit");
            return hit;
        }

        let (patient, doctor) = tokio::join!(
            self.submit_patient(&patient_clip),
            self.submit_doctor(&doctor_clip),
        );

        let note = self
            .synthesizer
            .synthesize(
                &patient.transcription,
                &patient.analysis,
                &patient.terms,
                &doctor.transcription,
                &doctor.terms,
            )
            .await;

        let run = PipelineRun {
            id: Uuid::new_v4(),
            patient_fingerprint: key.0.clone(),
            doctor_fingerprint: key.1.clone(),
            patient,
            doctor,
            note,
            state: RunState::NoteSynthesized,
            created_at: Utc::now(),
        };

        info!(
            run_id = %run.id,
            degraded = run.is_degraded(),
            "pipeline run complete"
        );
        self.run_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, run.clone());
        run
    }
}
