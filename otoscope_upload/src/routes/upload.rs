use crate::{
    image_codec::{EncodedImage, ImageCodecError},
    page::{render_error, render_prediction},
    prediction::PredictionServiceError,
    server::SharedState,
};
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use otoscope_api::{FILE_FIELD, NO_FILE_MESSAGE};
use std::time::Instant;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("{}", NO_FILE_MESSAGE)]
    MissingFile,
    #[error("Invalid upload form: {0}")]
    InvalidForm(#[from] MultipartError),
    #[error("{0}")]
    Image(#[from] ImageCodecError),
    #[error("{source}")]
    Prediction {
        image: EncodedImage,
        source: PredictionServiceError,
    },
}

impl UploadError {
    fn outcome(&self) -> &'static str {
        match self {
            UploadError::MissingFile | UploadError::InvalidForm(_) => "invalid_form",
            UploadError::Image(_) => "invalid_image",
            UploadError::Prediction { .. } => "prediction_error",
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::MissingFile => StatusCode::BAD_REQUEST,
            UploadError::InvalidForm(err) => err.status(),
            UploadError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            UploadError::Prediction { .. } => StatusCode::BAD_GATEWAY,
        };
        let image = match &self {
            UploadError::Prediction { image, .. } => Some(image),
            _ => None,
        };
        (status, Html(render_error(image, &self.to_string()))).into_response()
    }
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, UploadError> {
    let result = classify_upload(&state, multipart).await;
    match result {
        Ok(html) => {
            state.metrics.record_upload("success");
            Ok(html)
        }
        Err(err) => {
            tracing::warn!("Upload failed: {}", err);
            state.metrics.record_upload(err.outcome());
            Err(err)
        }
    }
}

async fn classify_upload(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Html<String>, UploadError> {
    let mut multipart = multipart.map_err(|_| UploadError::MissingFile)?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            upload = Some(field.bytes().await?);
            break;
        }
    }
    let upload = match upload {
        Some(upload) if !upload.is_empty() => upload,
        _ => return Err(UploadError::MissingFile),
    };

    let image = EncodedImage::from_upload(&upload)?;

    let started = Instant::now();
    let prediction = state.prediction_service.predict(&image).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match prediction {
        Ok(result) => {
            state
                .metrics
                .record_prediction_duration(elapsed_ms, "success");
            tracing::info!(
                predicted_class = %result.predicted_class,
                confidence_score = result.confidence_score,
                elapsed_ms,
                "Prediction received"
            );
            Ok(Html(render_prediction(&image, &result)))
        }
        Err(source) => {
            state
                .metrics
                .record_prediction_duration(elapsed_ms, "error");
            Err(UploadError::Prediction { image, source })
        }
    }
}
