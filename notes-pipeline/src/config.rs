use serde::{Deserialize, Serialize};

use crate::terminology::ResolverConfig;
use error_common::{EngineError, EngineResult};

/// Speech-to-text service configuration (OpenAI-compatible REST surface).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// Chat-completion service configuration, shared by term extraction and
/// note synthesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
}

/// Terminology graph configuration (Neo4j HTTP transactional endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    pub api_url: String,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Name of the full-text index holding SNOMED CT terms.
    pub index_name: String,
    /// Raw rows fetched per keyword before the resolver filters and caps.
    pub fetch_limit: usize,
}

/// Where persisted recordings live, one directory per speaker role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub patient_dir: String,
    pub doctor_dir: String,
}

/// How doctor-side terminology queries are derived.
///
/// The original workflow feeds the doctor's whole transcript to the
/// terminology search while patient terms go through structured extraction.
/// That asymmetry is kept as the default rather than silently corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DoctorTermSource {
    /// Query the terminology graph with the raw English transcript.
    #[default]
    RawTranscript,
    /// Run the doctor transcript through the structured extractor first.
    StructuredExtraction,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub speech: SpeechConfig,
    pub chat: ChatConfig,
    pub graph: GraphConfig,
    pub storage: StorageConfig,
    pub resolver: ResolverConfig,
    pub doctor_term_source: DoctorTermSource,
    /// Per-request timeout for every external call, in seconds. A timeout
    /// maps to the same soft-failure path as any other transport error.
    pub request_timeout_secs: u64,
}

/// Collects required and tunable environment variables, accumulating every
/// problem so one `Config` error names all of them.
struct EnvReader {
    missing: Vec<String>,
}

impl EnvReader {
    fn new() -> Self {
        Self {
            missing: Vec::new(),
        }
    }

    fn optional(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.trim().is_empty())
    }

    fn require(&mut self, name: &str) -> String {
        match Self::optional(name) {
            Some(value) => value,
            None => {
                self.missing.push(name.to_string());
                String::new()
            }
        }
    }

    fn with_default(name: &str, default: &str) -> String {
        Self::optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T: std::str::FromStr>(&mut self, name: &str, default: T) -> T {
        match Self::optional(name) {
            Some(raw) => match raw.parse() {
                Ok(value) => value,
                Err(_) => {
                    self.missing
                        .push(format!("{name} (unparseable value '{raw}')"));
                    default
                }
            },
            None => default,
        }
    }

    fn doctor_term_source(&mut self) -> DoctorTermSource {
        match Self::optional("DOCTOR_TERM_SOURCE") {
            None => DoctorTermSource::default(),
            Some(raw) => match raw.to_lowercase().as_str() {
                "raw-transcript" | "raw" => DoctorTermSource::RawTranscript,
                "structured-extraction" | "structured" => DoctorTermSource::StructuredExtraction,
                other => {
                    self.missing
                        .push(format!("DOCTOR_TERM_SOURCE (unrecognized value '{other}')"));
                    DoctorTermSource::default()
                }
            },
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Validation is eager: every missing required variable (and every
    /// unparseable tunable) is reported in a single [`EngineError::Config`]
    /// before any network call is attempted.
    pub fn from_env() -> EngineResult<Self> {
        let mut env = EnvReader::new();

        let speech = SpeechConfig {
            api_url: env.require("SPEECH_API_URL"),
            api_key: env.require("SPEECH_API_KEY"),
            model: EnvReader::with_default("SPEECH_MODEL", "whisper-1"),
        };

        let chat = ChatConfig {
            api_url: env.require("CHAT_API_URL"),
            api_key: env.require("CHAT_API_KEY"),
            model: EnvReader::with_default("CHAT_MODEL", "gpt-4o"),
        };

        let graph = GraphConfig {
            api_url: EnvReader::with_default("GRAPH_API_URL", "http://localhost:7474"),
            database: EnvReader::with_default("GRAPH_DATABASE", "neo4j"),
            username: EnvReader::with_default("GRAPH_USERNAME", "neo4j"),
            password: env.require("GRAPH_PASSWORD"),
            index_name: EnvReader::with_default("GRAPH_TERM_INDEX", "termIndex"),
            fetch_limit: env.parsed_or("GRAPH_FETCH_LIMIT", 50),
        };

        let storage = StorageConfig {
            patient_dir: EnvReader::with_default("PATIENT_RECORDINGS_DIR", "voice_recordings"),
            doctor_dir: EnvReader::with_default("DOCTOR_RECORDINGS_DIR", "doctors_recordings"),
        };

        let resolver = ResolverConfig {
            min_score: env.parsed_or("TERMINOLOGY_MIN_SCORE", 0.5),
            top_k: env.parsed_or("TERMINOLOGY_TOP_K", 5),
        };

        let doctor_term_source = env.doctor_term_source();
        let request_timeout_secs = env.parsed_or("REQUEST_TIMEOUT_SECS", 30);

        if !env.missing.is_empty() {
            return Err(EngineError::Config {
                missing: env.missing,
            });
        }

        Ok(Self {
            speech,
            chat,
            graph,
            storage,
            resolver,
            doctor_term_source,
            request_timeout_secs,
        })
    }
}
