//! Clinical text enrichment pipeline.
//!
//! Turns a pair of recorded utterances (one patient, one doctor) into a
//! structured clinical note backed by coded SNOMED CT concepts:
//!
//! 1. [`TranscriptionGateway`] — persists the audio, transcribes it with
//!    language auto-detection and translates non-English speech to English.
//! 2. [`MedicalTermExtractor`] — extracts diseases, symptoms, severity and
//!    urgency from the English transcript via a schema-constrained chat call.
//! 3. [`TerminologyResolver`] — resolves free-text terms to scored SNOMED CT
//!    concept matches through a fuzzy full-text graph query.
//! 4. [`NoteSynthesizer`] — drafts the final note and appends a
//!    deterministic metadata footer.
//! 5. [`PipelineOrchestrator`] — sequences the stages per audio pair, with
//!    idempotent caching keyed on audio content fingerprints so UI
//!    re-renders never repeat billed external calls.
//!
//! Every stage fails soft: a broken dependency degrades the note instead of
//! aborting the run. The only error a caller can observe is a
//! [`error_common::EngineError::Config`] from the factory.
//!
//! # Example
//!
//! ```rust,no_run
//! use notes_pipeline::{AudioClip, PipelineConfig, PipelineOrchestrator, SpeakerRole};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::from_env()?;
//! let orchestrator = PipelineOrchestrator::from_config(config)?;
//!
//! let patient = AudioClip::new(SpeakerRole::Patient, std::fs::read("patient.wav")?);
//! let doctor = AudioClip::new(SpeakerRole::Doctor, std::fs::read("doctor.wav")?);
//!
//! let run = orchestrator.run(patient, doctor).await;
//! println!("{}", run.note.render());
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod extraction;
pub mod pipeline;
pub mod providers;
pub mod synthesis;
pub mod terminology;
pub mod transcription;

pub use audio::*;
pub use config::*;
pub use extraction::*;
pub use pipeline::*;
pub use synthesis::*;
pub use terminology::*;
pub use transcription::*;
