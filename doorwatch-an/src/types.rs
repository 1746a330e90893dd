//! Core types for doorwatch-an
//!
//! The artifact handle, the classification outcome, and the errors the
//! classify path can surface.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// One unit of captured media submitted for classification
///
/// Identity is the local path. Bytes are read lazily by the classifier and
/// again by the archiver/mailer at flush time; until flush (or the failure
/// path) completes, the file stays on disk untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name component, used for archive keys and email attachments
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unnamed")
    }

    /// Read the raw image bytes
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

/// A named concept with its confidence score, as returned by the
/// recognition service (ordered by relevance)
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub name: String,
    /// Confidence score in [0.0, 1.0]
    pub confidence: f32,
}

/// Verdict of a single classify call
#[derive(Debug, Clone, PartialEq)]
pub enum ClassificationOutcome {
    /// A concept met the confidence threshold
    Success {
        /// Confidence of the first concept at or above the threshold
        confidence: f32,
    },
    /// No concept met the threshold
    Failure {
        /// Highest confidence observed
        confidence: f32,
    },
    /// Admission declined by the monthly budget; no remote call was made
    QuotaExceeded,
}

/// Errors surfaced by the classify path
///
/// `Transient` covers unreachable-service and malformed-response cases and
/// has already consumed the single internal retry by the time it reaches the
/// caller; the artifact is left untouched so it can be reprocessed.
/// `RemoteStatus` is an explicit non-success status from the recognition
/// service and is never retried locally.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Recognition service unreachable or malformed response: {0}")]
    Transient(String),

    #[error("Recognition service returned status {code}: {message}")]
    RemoteStatus { code: u32, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_is_file_name() {
        let artifact = Artifact::new("/var/motion/front-2026-08-06.jpg");
        assert_eq!(artifact.name(), "front-2026-08-06.jpg");
    }

    #[test]
    fn artifact_name_falls_back_for_pathless_input() {
        let artifact = Artifact::new("/");
        assert_eq!(artifact.name(), "unnamed");
    }
}
