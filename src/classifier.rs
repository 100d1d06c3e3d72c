use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Category used when the classifier could not be reached or answered garbage.
pub const UNCATEGORIZED_NETWORK_ERROR: &str = "Uncategorized (Network Error)";

/// Category used when the classifier answered but reported failure.
pub const UNCATEGORIZED_ML_FAILURE: &str = "Uncategorized (ML Failure)";

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Response parsing error: {0}")]
    ParseError(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    pub image_base64: String,
}

impl ClassifyRequest {
    pub fn from_image(image: &[u8]) -> Self {
        Self {
            image_base64: STANDARD.encode(image),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    pub category: String,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// What the orchestrator gets back from a classification attempt.
///
/// When `success` is false, `category` already holds the matching
/// uncategorized marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationOutcome {
    pub category: String,
    pub success: bool,
    pub error_message: Option<String>,
}

impl ClassificationOutcome {
    pub fn classified(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            success: true,
            error_message: None,
        }
    }

    /// The service answered and said it could not classify the image.
    pub fn rejected(error_message: Option<String>) -> Self {
        Self {
            category: UNCATEGORIZED_ML_FAILURE.to_string(),
            success: false,
            error_message,
        }
    }

    /// The service could not be reached or did not answer properly.
    pub fn unreachable(error_message: impl Into<String>) -> Self {
        Self {
            category: UNCATEGORIZED_NETWORK_ERROR.to_string(),
            success: false,
            error_message: Some(error_message.into()),
        }
    }
}

impl From<ClassifyResponse> for ClassificationOutcome {
    fn from(response: ClassifyResponse) -> Self {
        if response.success {
            Self::classified(response.category)
        } else {
            Self::rejected(response.error_message)
        }
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `image`. Never fails; problems become a degraded outcome.
    async fn classify(&self, image: &[u8]) -> ClassificationOutcome;
}

/// Classifier reached over HTTP with a base64 JSON body.
pub struct HttpClassifier {
    client: Client,
    endpoint: Url,
}

impl HttpClassifier {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    /// Share an existing client (and its connection pool).
    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Raw request/response exchange with the classification service.
    pub async fn request(&self, image: &[u8]) -> Result<ClassifyResponse, ClassifierError> {
        let payload = ClassifyRequest::from_image(image);

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClassifierError::ApiError {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let response_text = response.text().await?;
        serde_json::from_str(&response_text)
            .map_err(|e| ClassifierError::ParseError(format!("Invalid JSON: {}", e)))
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &[u8]) -> ClassificationOutcome {
        match self.request(image).await {
            Ok(response) => {
                let outcome = ClassificationOutcome::from(response);
                if outcome.success {
                    info!("🏷️ Image classified as '{}'", outcome.category);
                } else {
                    warn!(
                        "Classification service reported failure: {}",
                        outcome.error_message.as_deref().unwrap_or("no details")
                    );
                }
                outcome
            }
            Err(e) => {
                error!("Image categorization failed: {}", e);
                ClassificationOutcome::unreachable(e.to_string())
            }
        }
    }
}
