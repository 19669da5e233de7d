use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::extraction::MedicalAnalysis;
use crate::providers::ChatModel;
use crate::terminology::TerminologyResult;
use crate::transcription::TranscriptionResult;
use error_common::log_soft_failure;

/// Fixed body used when the model could not produce a note.
pub const NOTE_UNAVAILABLE: &str = "\
Clinical note generation is currently unavailable. Please review the \
transcripts and coded terminology matches manually.";

/// The synthesized clinical note: a model-drafted body plus a metadata
/// footer computed by this system. Downstream consumers treat the rendered
/// form as an opaque string; the footer is always present and well-formed
/// regardless of what the model returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub body: String,
    pub generated_at: DateTime<Utc>,
    pub patient_language: String,
    pub doctor_language: String,
    pub translation_applied: bool,
}

impl ClinicalNote {
    /// Full document: body followed by the deterministic metadata footer.
    pub fn render(&self) -> String {
        format!(
            "{}\n\n---\nGenerated At: {}\nPatient Language: {}\nDoctor Language: {}\nTranslation Applied: {}\n",
            self.body,
            self.generated_at.to_rfc3339(),
            self.patient_language,
            self.doctor_language,
            if self.translation_applied { "Yes" } else { "No" },
        )
    }

    /// True when the body is the fixed failure message.
    pub fn is_fallback(&self) -> bool {
        self.body == NOTE_UNAVAILABLE
    }
}

impl fmt::Display for ClinicalNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

const SYNTHESIS_SYSTEM_PROMPT: &str = "\
You are a clinical assistant generating structured notes for doctors. Draft \
one note with these sections, in this exact order: Presentation, Findings, \
Assessment, Plan, Medications, Follow-up, Coded References. Keep the \
follow-up section separate if mentioned. Remove any personally identifiable \
information (name, address, phone number or similar) that remains in the \
source material.";

fn terminology_summary(label: &str, terms: &TerminologyResult) -> String {
    let mut summary = format!("{label} SNOMED CT Matches:\n");
    if terms.is_empty() {
        summary.push_str("- none queried\n");
        return summary;
    }
    for entry in terms.iter() {
        match entry.matches.first() {
            Some(top) => {
                let tag = top
                    .semantic_tag
                    .as_deref()
                    .map(|t| format!(" [{t}]"))
                    .unwrap_or_default();
                summary.push_str(&format!(
                    "- {}: {} - {}{tag}\n",
                    entry.term, top.concept_id, top.term_label
                ));
            }
            None => summary.push_str(&format!("- {}: N/A - no match\n", entry.term)),
        }
    }
    summary
}

fn list_or_none(terms: &[String]) -> String {
    if terms.is_empty() {
        "none noted".to_string()
    } else {
        terms.join(", ")
    }
}

/// Combines transcripts, extracted structure and resolved terminology into
/// one clinical note via the chat model. Fails soft: an external error
/// produces the fixed [`NOTE_UNAVAILABLE`] body, and the metadata footer is
/// appended either way.
pub struct NoteSynthesizer {
    chat: Arc<dyn ChatModel>,
}

impl NoteSynthesizer {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub async fn synthesize(
        &self,
        patient: &TranscriptionResult,
        patient_analysis: &MedicalAnalysis,
        patient_terms: &TerminologyResult,
        doctor: &TranscriptionResult,
        doctor_terms: &TerminologyResult,
    ) -> ClinicalNote {
        let prompt = Self::build_prompt(patient, patient_analysis, patient_terms, doctor, doctor_terms);

        let body = match self.chat.complete(SYNTHESIS_SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                warn!("note synthesis returned an empty body");
                NOTE_UNAVAILABLE.to_string()
            }
            Err(err) => {
                log_soft_failure("synthesis", &err);
                NOTE_UNAVAILABLE.to_string()
            }
        };

        ClinicalNote {
            body,
            generated_at: Utc::now(),
            patient_language: patient.detected_language.clone(),
            doctor_language: doctor.detected_language.clone(),
            translation_applied: patient.was_translated || doctor.was_translated,
        }
    }

    fn build_prompt(
        patient: &TranscriptionResult,
        patient_analysis: &MedicalAnalysis,
        patient_terms: &TerminologyResult,
        doctor: &TranscriptionResult,
        doctor_terms: &TerminologyResult,
    ) -> String {
        format!(
            "Draft a structured clinical note using the following information:\n\n\
             Patient Transcript:\n{}\n\n\
             Extracted Diseases: {}\n\
             Extracted Symptoms: {}\n\
             Severity: {:?}\n\
             Urgency: {:?}\n\n\
             Doctor's Transcript:\n{}\n\n\
             {}\n{}",
            patient.english_text,
            list_or_none(&patient_analysis.diseases),
            list_or_none(&patient_analysis.symptoms),
            patient_analysis.severity,
            patient_analysis.urgency,
            doctor.english_text,
            terminology_summary("Patient", patient_terms),
            terminology_summary("Doctor", doctor_terms),
        )
    }
}
