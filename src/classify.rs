//! Gateway to the external image classification service.
//!
//! The service takes a multipart upload in a `file` field and answers with
//! `{"autoCaption", "issueType", "urgency"}`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CLASSIFIER_URL: &str = "http://127.0.0.1:8000/analyze-image/";

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Issue metadata derived from a photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: String,
    pub description: String,
    pub urgency: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResponse {
    auto_caption: String,
    issue_type: String,
    urgency: String,
}

impl From<AnalyzeResponse> for Classification {
    fn from(r: AnalyzeResponse) -> Self {
        Classification {
            category: r.issue_type,
            description: r.auto_caption,
            urgency: r.urgency,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification service unreachable: {0}")]
    Request(#[source] reqwest::Error),

    #[error("classification service returned {0}")]
    Status(StatusCode),

    #[error("classification response malformed: {0}")]
    Decode(#[source] reqwest::Error),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, image: &ImageUpload) -> Result<Classification, ClassifyError>;
}

pub struct HttpClassifier {
    client: Client,
    endpoint: String,
}

impl HttpClassifier {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpClassifier {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn image_part(image: &ImageUpload) -> Part {
    let part = || Part::bytes(image.bytes.clone()).file_name(image.file_name.clone());
    match &image.content_type {
        // An unparseable client mime type is dropped rather than failing the upload.
        Some(mime) => part().mime_str(mime).unwrap_or_else(|_| part()),
        None => part(),
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    async fn classify(&self, image: &ImageUpload) -> Result<Classification, ClassifyError> {
        let form = Form::new().part("file", image_part(image));

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(ClassifyError::Request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClassifyError::Status(status));
        }

        let body: AnalyzeResponse = response.json().await.map_err(ClassifyError::Decode)?;
        tracing::debug!(category = %body.issue_type, urgency = %body.urgency, "Image classified");
        Ok(body.into())
    }
}
