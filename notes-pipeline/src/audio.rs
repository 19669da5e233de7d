use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use error_common::{EngineError, EngineResult};

/// Who is speaking on a recorded clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    Patient,
    Doctor,
}

impl SpeakerRole {
    /// Tag used in persisted file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Doctor => "doctor",
        }
    }
}

impl fmt::Display for SpeakerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Content fingerprint of an audio clip: lowercase hex SHA-256 of the raw
/// bytes. Identical recordings always produce identical fingerprints, which
/// is what makes pipeline re-entry idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let hex = digest.iter().fold(String::with_capacity(64), |mut out, b| {
            use fmt::Write;
            let _ = write!(out, "{b:02x}");
            out
        });
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A recorded utterance. Immutable once captured.
#[derive(Debug, Clone)]
pub struct AudioClip {
    bytes: Vec<u8>,
    role: SpeakerRole,
    captured_at: DateTime<Utc>,
    fingerprint: Fingerprint,
}

impl AudioClip {
    /// Capture a clip now.
    pub fn new(role: SpeakerRole, bytes: Vec<u8>) -> Self {
        Self::with_timestamp(role, bytes, Utc::now())
    }

    /// Capture a clip with an explicit timestamp (replayed recordings).
    pub fn with_timestamp(role: SpeakerRole, bytes: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        let fingerprint = Fingerprint::of(&bytes);
        Self {
            bytes,
            role,
            captured_at,
            fingerprint,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn role(&self) -> SpeakerRole {
        self.role
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// File name the clip persists under: `{role}_{YYYYmmdd_HHMMSS}.wav`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.wav",
            self.role.tag(),
            self.captured_at.format("%Y%m%d_%H%M%S")
        )
    }
}

/// Durable storage for submitted audio, one directory per speaker role.
///
/// Files are write-once: a clip whose deterministic name already exists on
/// disk is never rewritten, so a stored recording can be replayed without
/// re-recording.
#[derive(Debug, Clone)]
pub struct AudioStore {
    patient_dir: PathBuf,
    doctor_dir: PathBuf,
}

impl AudioStore {
    pub fn new(patient_dir: impl Into<PathBuf>, doctor_dir: impl Into<PathBuf>) -> Self {
        Self {
            patient_dir: patient_dir.into(),
            doctor_dir: doctor_dir.into(),
        }
    }

    fn dir_for(&self, role: SpeakerRole) -> &Path {
        match role {
            SpeakerRole::Patient => &self.patient_dir,
            SpeakerRole::Doctor => &self.doctor_dir,
        }
    }

    /// Persist a clip and return the path it lives at.
    pub async fn save(&self, clip: &AudioClip) -> EngineResult<PathBuf> {
        let dir = self.dir_for(clip.role());
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| EngineError::Transport(format!("create {}: {e}", dir.display())))?;

        let path = dir.join(clip.file_name());
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(path = %path.display(), "recording already persisted, skipping write");
            return Ok(path);
        }

        tokio::fs::write(&path, clip.bytes())
            .await
            .map_err(|e| EngineError::Transport(format!("write {}: {e}", path.display())))?;
        debug!(
            path = %path.display(),
            bytes = clip.bytes().len(),
            fingerprint = %clip.fingerprint(),
            "recording persisted"
        );
        Ok(path)
    }

    /// Persist a clip, degrading to a warning on failure. Storage is a
    /// replay convenience; losing it must not block transcription.
    pub async fn save_soft(&self, clip: &AudioClip) -> Option<PathBuf> {
        match self.save(clip).await {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(role = %clip.role(), error = %err, "failed to persist recording");
                None
            }
        }
    }
}
