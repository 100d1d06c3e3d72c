use crate::location::Coordinates;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server rejected metadata: {status} - {message}")]
    Status { status: u16, message: String },
}

/// Record reported to the backend for every captured image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub categorization: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl ImageMetadata {
    pub fn new(
        categorization: impl Into<String>,
        location: Coordinates,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            categorization: categorization.into(),
            latitude: location.latitude,
            longitude: location.longitude,
            timestamp: timestamp.into(),
        }
    }
}

/// ISO-8601 local date-time without offset, e.g. `2025-06-01T14:03:27.512`.
pub fn iso_local_timestamp(at: DateTime<Local>) -> String {
    at.naive_local().format("%Y-%m-%dT%H:%M:%S%.f").to_string()
}

#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn submit(&self, metadata: &ImageMetadata) -> Result<(), SubmissionError>;
}

/// Posts metadata as JSON; any 2xx status counts as delivered.
pub struct HttpMetadataSink {
    client: Client,
    endpoint: Url,
}

impl HttpMetadataSink {
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, SubmissionError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataSink for HttpMetadataSink {
    async fn submit(&self, metadata: &ImageMetadata) -> Result<(), SubmissionError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(metadata)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                message,
            });
        }

        info!("📨 Metadata accepted by server: {}", status);
        Ok(())
    }
}
