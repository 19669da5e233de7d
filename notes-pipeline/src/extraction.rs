use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::providers::ChatModel;
use error_common::{log_soft_failure, EngineResult};

/// Overall severity of the presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Critical,
    #[default]
    #[serde(other)]
    Unknown,
}

/// How urgently the presentation needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    Medium,
    High,
    Emergency,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Structured medical content extracted from one English transcript.
///
/// Diseases and symptoms keep extraction order: the model lists terms in the
/// order the speaker emphasized them. Every field is always populated; the
/// all-empty/unknown value is the extraction-failure state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MedicalAnalysis {
    #[serde(default)]
    pub diseases: Vec<String>,
    #[serde(default)]
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub urgency: Urgency,
}

impl MedicalAnalysis {
    /// Terms to run against the terminology graph: diseases first, then
    /// symptoms, extraction order preserved. The resolver handles overlap.
    pub fn query_terms(&self) -> Vec<String> {
        self.diseases
            .iter()
            .chain(self.symptoms.iter())
            .cloned()
            .collect()
    }

    /// True when extraction produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.diseases.is_empty()
            && self.symptoms.is_empty()
            && self.severity == Severity::Unknown
            && self.urgency == Urgency::Unknown
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = "\
You are a medical assistant for a doctor. Extract the diseases or clinical \
complaints and the symptoms mentioned in the transcript, and judge overall \
severity and urgency. Respond with only a JSON object, no prose and no code \
fences, exactly matching this schema: \
{\"diseases\": [string], \"symptoms\": [string], \
\"severity\": \"mild\"|\"moderate\"|\"severe\"|\"critical\"|\"unknown\", \
\"urgency\": \"low\"|\"medium\"|\"high\"|\"emergency\"|\"unknown\"}. \
List terms in the order they are mentioned. If the transcript reveals any \
personally identifiable information (name, address, phone number or similar), \
it must not appear in the output.";

const FALLBACK_SYSTEM_PROMPT: &str = "\
You are a medical assistant for a doctor. Extract only the diseases or \
clinical complaints mentioned in the transcript. Respond with only a JSON \
array of strings, like [\"fever\", \"cold\"], no prose and no code fences. \
Never include personally identifiable information.";

/// Strip a surrounding markdown code fence, if the model added one despite
/// instructions.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Extracts structured medical terms from English text via a
/// schema-constrained chat call.
///
/// `extract` never fails: parse failures fall back to a bare term list, and
/// anything worse resolves to [`MedicalAnalysis::default`]. Model output is
/// parsed strictly as JSON, never evaluated.
pub struct MedicalTermExtractor {
    chat: Arc<dyn ChatModel>,
}

impl MedicalTermExtractor {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub async fn extract(&self, english_text: &str) -> MedicalAnalysis {
        if english_text.trim().is_empty() {
            return MedicalAnalysis::default();
        }

        let raw = match self.chat.complete(EXTRACTION_SYSTEM_PROMPT, english_text).await {
            Ok(raw) => raw,
            Err(err) => {
                log_soft_failure("extraction", &err);
                return MedicalAnalysis::default();
            }
        };

        match Self::parse_analysis(&raw) {
            Ok(analysis) => {
                debug!(
                    diseases = analysis.diseases.len(),
                    symptoms = analysis.symptoms.len(),
                    "structured extraction parsed"
                );
                analysis
            }
            Err(err) => {
                warn!(error = %err, "structured extraction unparseable, trying bare term list");
                self.extract_bare_terms(english_text).await
            }
        }
    }

    fn parse_analysis(raw: &str) -> EngineResult<MedicalAnalysis> {
        let analysis: MedicalAnalysis = serde_json::from_str(strip_code_fences(raw))?;
        Ok(analysis)
    }

    /// Fallback path: ask for a plain term list and mirror it into both
    /// diseases and symptoms, leaving severity/urgency unknown.
    async fn extract_bare_terms(&self, english_text: &str) -> MedicalAnalysis {
        let raw = match self.chat.complete(FALLBACK_SYSTEM_PROMPT, english_text).await {
            Ok(raw) => raw,
            Err(err) => {
                log_soft_failure("extraction", &err);
                return MedicalAnalysis::default();
            }
        };

        match serde_json::from_str::<Vec<String>>(strip_code_fences(&raw)) {
            Ok(terms) => MedicalAnalysis {
                diseases: terms.clone(),
                symptoms: terms,
                severity: Severity::Unknown,
                urgency: Urgency::Unknown,
            },
            Err(err) => {
                log_soft_failure("extraction", &err.into());
                MedicalAnalysis::default()
            }
        }
    }
}
