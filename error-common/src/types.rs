use thiserror::Error;

/// Error taxonomy shared by every pipeline component.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Service unreachable: connection, DNS or timeout failures.
    #[error("transport error: {0}")]
    Transport(String),

    /// A dependency answered, but with a non-success status or an in-band
    /// error payload.
    #[error("upstream error from {service} (status {status}): {detail}")]
    Upstream {
        service: String,
        status: u16,
        detail: String,
    },

    /// The response parsed, but violated the expected structure.
    #[error("schema error: {0}")]
    Schema(String),

    /// Required configuration is absent. Lists every missing field so a
    /// deployment can be fixed in one pass.
    #[error("missing configuration: {}", missing.join(", "))]
    Config { missing: Vec<String> },
}

impl EngineError {
    /// Build an `Upstream` error from a service name and HTTP status.
    pub fn upstream(service: impl Into<String>, status: u16, detail: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            status,
            detail: detail.into(),
        }
    }

    /// Build a `Config` error naming the missing environment variables.
    pub fn missing_config<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Config {
            missing: fields.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        // Decode failures mean the body did not match the expected shape;
        // everything else is a transport-level fault.
        if err.is_decode() {
            Self::Schema(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Schema(err.to_string())
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Record a soft failure: the component converted `error` into a sentinel
/// value and the pipeline continues.
pub fn log_soft_failure(component: &str, error: &EngineError) {
    tracing::warn!(
        component = component,
        error = %error,
        "soft failure, continuing with sentinel value"
    );
}
