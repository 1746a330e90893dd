//! Clarifai API client
//!
//! Sends raw image bytes to the Clarifai model-outputs endpoint and maps the
//! response to an ordered concept list. The [`Recognizer`] trait is the seam
//! the classifier depends on; tests substitute an in-memory implementation.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;

use crate::types::Concept;

const CLARIFAI_BASE_URL: &str = "https://api.clarifai.com/v2";
const USER_AGENT: &str = concat!("doorwatch/", env!("CARGO_PKG_VERSION"));

/// Clarifai's own success status code
const STATUS_SUCCESS: u32 = 10000;

/// Recognition errors
#[derive(Debug, Error)]
pub enum RecognizeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {code}: {message}")]
    Status { code: u32, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    /// Well-formed response carrying no concepts
    #[error("No concepts in response")]
    Empty,
}

/// Remote recognition seam
///
/// Given raw image bytes, return the service's concepts ordered by
/// relevance. Implementations must not retry internally; retry policy
/// belongs to the classifier.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<Concept>, RecognizeError>;
}

/// Clarifai model-outputs response (the subset doorwatch reads)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClarifaiResponse {
    pub status: ClarifaiStatus,
    #[serde(default)]
    pub outputs: Vec<ClarifaiOutput>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClarifaiStatus {
    pub code: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClarifaiOutput {
    pub data: ClarifaiData,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClarifaiData {
    #[serde(default)]
    pub concepts: Vec<ClarifaiConcept>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClarifaiConcept {
    pub name: String,
    /// Confidence score (0.0 to 1.0)
    pub value: f32,
}

/// Clarifai API client
pub struct ClarifaiClient {
    http_client: reqwest::Client,
    /// Shared with the settings API so a key update takes effect without a
    /// restart
    api_key: Arc<RwLock<String>>,
    model_id: String,
}

impl ClarifaiClient {
    pub fn new(api_key: Arc<RwLock<String>>, model_id: String) -> Result<Self, RecognizeError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RecognizeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_key,
            model_id,
        })
    }

    fn current_key(&self) -> String {
        self.api_key.read().map(|k| k.clone()).unwrap_or_default()
    }

    /// Flatten a model-outputs response into the ordered concept list
    fn extract_concepts(response: &ClarifaiResponse) -> Vec<Concept> {
        response
            .outputs
            .iter()
            .flat_map(|output| output.data.concepts.iter())
            .map(|c| Concept {
                name: c.name.clone(),
                confidence: c.value,
            })
            .collect()
    }
}

#[async_trait]
impl Recognizer for ClarifaiClient {
    async fn recognize(&self, image_bytes: &[u8]) -> Result<Vec<Concept>, RecognizeError> {
        let url = format!("{}/models/{}/outputs", CLARIFAI_BASE_URL, self.model_id);
        let body = serde_json::json!({
            "inputs": [{
                "data": {
                    "image": {
                        "base64": base64::engine::general_purpose::STANDARD.encode(image_bytes),
                    }
                }
            }]
        });

        tracing::debug!(model_id = %self.model_id, bytes = image_bytes.len(), "Querying Clarifai API");

        let response = self
            .http_client
            .post(&url)
            .header("Authorization", format!("Key {}", self.current_key()))
            .json(&body)
            .send()
            .await
            .map_err(|e| RecognizeError::Network(e.to_string()))?;

        let http_status = response.status();
        if !http_status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(RecognizeError::Status {
                code: http_status.as_u16() as u32,
                message: error_text,
            });
        }

        let clarifai_response: ClarifaiResponse = response
            .json()
            .await
            .map_err(|e| RecognizeError::Parse(e.to_string()))?;

        if clarifai_response.status.code != STATUS_SUCCESS {
            return Err(RecognizeError::Status {
                code: clarifai_response.status.code,
                message: clarifai_response.status.description.clone(),
            });
        }

        let concepts = Self::extract_concepts(&clarifai_response);
        if concepts.is_empty() {
            return Err(RecognizeError::Empty);
        }

        if let Some(top) = concepts.first() {
            tracing::debug!(concept = %top.name, confidence = top.confidence, "Clarifai lookup successful");
        }

        Ok(concepts)
    }
}
