use crate::{
    inference_service::{InferenceService, PredictError},
    model_service::ModelService,
    state::State,
};
use axum::{
    extract::{self, multipart::MultipartRejection, Multipart},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use otoscope_api::{ErrorResponse, PredictionResult, FILE_FIELD};
use tracing::instrument;

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictError::MissingInput => StatusCode::BAD_REQUEST,
            PredictError::InvalidUpload(err) => err.status(),
            PredictError::ProcessingFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[instrument(skip(service, multipart))]
pub async fn predict<M: ModelService, S: State>(
    extract::State(service): extract::State<InferenceService<M, S>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, PredictError> {
    // A request that is not multipart at all carries no file either.
    let mut multipart = multipart.map_err(|rejection| {
        tracing::warn!("Rejected upload: {}", rejection);
        PredictError::MissingInput
    })?;

    let mut image_data = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(FILE_FIELD) {
            image_data = Some(field.bytes().await?);
            break;
        }
    }

    let Some(image_data) = image_data else {
        tracing::warn!("Upload without a `{}` field", FILE_FIELD);
        return Err(PredictError::MissingInput);
    };

    match service.predict(image_data.to_vec()).await {
        Ok(result) => {
            tracing::info!(
                predicted_class = %result.predicted_class,
                confidence_score = result.confidence_score,
                "Prediction served"
            );
            Ok(Json(result))
        }
        Err(err) => {
            tracing::error!("Prediction failed: {}", err);
            Err(err)
        }
    }
}
