use crate::{config::PredictionServiceConfig, image_codec::EncodedImage};
use otoscope_api::{PredictionResult, FILE_FIELD};
use reqwest::{multipart, Client, StatusCode};
use thiserror::Error;
use tracing::instrument;

pub const UNKNOWN_ERROR: &str = "Unknown error";

#[derive(Error, Debug)]
pub enum PredictionServiceError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("Request to prediction service failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{message}")]
    Backend { status: StatusCode, message: String },
    #[error("Malformed response from prediction service: {0}")]
    MalformedResponse(#[source] serde_json::Error),
}

pub struct PredictionService {
    client: Client,
    predict_url: String,
}

impl PredictionService {
    pub fn new(
        prediction_config: &PredictionServiceConfig,
    ) -> Result<Self, PredictionServiceError> {
        let mut builder = Client::builder()
            .user_agent(format!("otoscope-upload/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = prediction_config.get_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(PredictionServiceError::ClientBuild)?;

        Ok(Self {
            client,
            predict_url: prediction_config.get_predict_url(),
        })
    }

    pub fn predict_url(&self) -> &str {
        &self.predict_url
    }

    #[instrument(skip(self, image), fields(format = ?image.format, bytes = image.data.len()))]
    pub async fn predict(
        &self,
        image: &EncodedImage,
    ) -> Result<PredictionResult, PredictionServiceError> {
        let part = multipart::Part::bytes(image.data.to_vec())
            .file_name(image.file_name())
            .mime_str(image.mime_type())?;
        let form = multipart::Form::new().part(FILE_FIELD, part);

        let response = self
            .client
            .post(&self.predict_url)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;

        if status == StatusCode::OK {
            return serde_json::from_slice::<PredictionResult>(&body)
                .map_err(PredictionServiceError::MalformedResponse);
        }

        let message = extract_error_message(&body);
        tracing::warn!(status = %status, "Prediction service returned an error: {}", message);
        Err(PredictionServiceError::Backend { status, message })
    }
}

/// Reads the `error` field of a failed response, if there is one.
pub fn extract_error_message(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("error")
                .and_then(|error| error.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| UNKNOWN_ERROR.to_string())
}
