//! Artifact classification
//!
//! Admission-checks the quota, charges the attempt, invokes the remote
//! recognition call, and maps the concept list to a success/failure verdict
//! against the configured confidence threshold.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::services::quota::QuotaTracker;
use crate::services::recognizer::{RecognizeError, Recognizer};
use crate::types::{Artifact, ClassificationOutcome, ClassifyError, Concept};

/// Delay before the single internal retry on a malformed/empty response
const RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Classifier {
    recognizer: Arc<dyn Recognizer>,
    quota: Arc<QuotaTracker>,
    /// Confidence threshold in [0,1]; a concept at exactly the threshold is
    /// a success
    threshold: f32,
}

impl Classifier {
    pub fn new(recognizer: Arc<dyn Recognizer>, quota: Arc<QuotaTracker>, threshold: f32) -> Self {
        Self {
            recognizer,
            quota,
            threshold,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Classify one artifact
    ///
    /// The quota counter is incremented exactly once per invocation, before
    /// the remote call, and not at all on the quota-declined path. A
    /// malformed or empty response is retried once after a fixed delay; an
    /// explicit non-success status from the service propagates immediately
    /// without a local retry, and the artifact is left on disk untouched in
    /// both error cases.
    pub async fn classify(
        &self,
        artifact: &Artifact,
    ) -> Result<ClassificationOutcome, ClassifyError> {
        if !self.quota.allow().await {
            self.quota.log_declined().await;
            return Ok(ClassificationOutcome::QuotaExceeded);
        }

        // The attempt is the metered resource: charge before calling out,
        // and do not fail classification over a counter write problem.
        if let Err(e) = self.quota.record_call().await {
            warn!("Failed to record quota call: {}", e);
        }

        let bytes = artifact
            .read_bytes()
            .await
            .map_err(|e| ClassifyError::Transient(format!("read {}: {}", artifact.name(), e)))?;

        let concepts = match self.recognizer.recognize(&bytes).await {
            Ok(concepts) => concepts,
            Err(RecognizeError::Status { code, message }) => {
                return Err(ClassifyError::RemoteStatus { code, message });
            }
            Err(first_error) => {
                warn!(
                    "Error sending {} for recognition, trying again: {}",
                    artifact.name(),
                    first_error
                );
                tokio::time::sleep(RETRY_DELAY).await;
                match self.recognizer.recognize(&bytes).await {
                    Ok(concepts) => concepts,
                    Err(RecognizeError::Status { code, message }) => {
                        return Err(ClassifyError::RemoteStatus { code, message });
                    }
                    Err(retry_error) => {
                        return Err(ClassifyError::Transient(retry_error.to_string()));
                    }
                }
            }
        };

        Ok(self.evaluate(artifact, &concepts))
    }

    /// Map the ordered concept list to a verdict: success on the first
    /// concept at or above the threshold, otherwise failure carrying the
    /// highest confidence observed.
    fn evaluate(&self, artifact: &Artifact, concepts: &[Concept]) -> ClassificationOutcome {
        for concept in concepts {
            info!(
                "Analysis: {} {} {:.2}%",
                artifact.name(),
                concept.name,
                concept.confidence * 100.0
            );
        }

        match concepts.iter().find(|c| c.confidence >= self.threshold) {
            Some(hit) => {
                info!("Analysis success {}", artifact.name());
                ClassificationOutcome::Success {
                    confidence: hit.confidence,
                }
            }
            None => {
                let top = concepts
                    .iter()
                    .map(|c| c.confidence)
                    .fold(0.0f32, f32::max);
                info!("Analysis failure {}", artifact.name());
                ClassificationOutcome::Failure { confidence: top }
            }
        }
    }
}
