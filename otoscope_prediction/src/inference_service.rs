use crate::{
    model_service::{ModelError, ModelService},
    preprocessing::{PreprocessError, Preprocessing},
    state::{ClassLabel, State},
};
use axum::extract::multipart::MultipartError;
use otoscope_api::{ClassProbabilities, PredictionResult, NO_FILE_MESSAGE};
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum PredictError {
    #[error("{}", NO_FILE_MESSAGE)]
    MissingInput,
    #[error("{0}")]
    InvalidUpload(#[from] MultipartError),
    #[error("{0}")]
    ProcessingFailure(String),
}

impl From<PreprocessError> for PredictError {
    fn from(err: PreprocessError) -> Self {
        PredictError::ProcessingFailure(err.to_string())
    }
}

impl From<ModelError> for PredictError {
    fn from(err: ModelError) -> Self {
        PredictError::ProcessingFailure(err.to_string())
    }
}

pub struct InferenceService<M: ModelService, S: State> {
    model_service: Arc<M>,
    service_state: Arc<S>,
    preprocessing: Preprocessing,
}

impl<M: ModelService, S: State> Clone for InferenceService<M, S> {
    fn clone(&self) -> Self {
        Self {
            model_service: self.model_service.clone(),
            service_state: self.service_state.clone(),
            preprocessing: self.preprocessing.clone(),
        }
    }
}

impl<M: ModelService, S: State> InferenceService<M, S> {
    pub fn new(model_service: M, state: S) -> Self {
        Self {
            model_service: Arc::new(model_service),
            service_state: Arc::new(state),
            preprocessing: Preprocessing::default(),
        }
    }

    pub fn with_preprocessing(mut self, preprocessing: Preprocessing) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn labels(&self) -> &[ClassLabel] {
        self.service_state.get_labels()
    }

    #[instrument(skip(self, image_data), fields(bytes = image_data.len()))]
    pub async fn predict(&self, image_data: Vec<u8>) -> Result<PredictionResult, PredictError> {
        let preprocessing = self.preprocessing.clone();
        let input = tokio::task::spawn_blocking(move || preprocessing.run(&image_data))
            .await
            .map_err(|e| PredictError::ProcessingFailure(e.to_string()))??;

        let scores = self.model_service.predict(input).await?;
        let result = format_prediction(self.labels(), &scores)?;

        tracing::debug!(
            predicted_class = %result.predicted_class,
            confidence_score = result.confidence_score,
            "Prediction complete"
        );

        Ok(result)
    }
}

/// Pairs every label with its output score and picks the highest one.
/// Ties go to the lowest output index.
pub fn format_prediction(
    labels: &[ClassLabel],
    scores: &[f32],
) -> Result<PredictionResult, PredictError> {
    if scores.len() != labels.len() {
        return Err(PredictError::ProcessingFailure(format!(
            "model returned {} scores for {} class labels",
            scores.len(),
            labels.len()
        )));
    }

    if let Some(position) = scores.iter().position(|score| !score.is_finite()) {
        return Err(PredictError::ProcessingFailure(format!(
            "model returned a non-finite score at output {}",
            position
        )));
    }

    let best = labels
        .iter()
        .map(|class_label| (class_label, scores[class_label.index]))
        .reduce(|accum, entry| if entry.1 > accum.1 { entry } else { accum });
    let (predicted, confidence_score) = match best {
        Some(best) => best,
        None => {
            return Err(PredictError::ProcessingFailure(
                "no class labels configured".to_string(),
            ))
        }
    };

    let class_probabilities: ClassProbabilities = labels
        .iter()
        .map(|class_label| (class_label.label.clone(), scores[class_label.index]))
        .collect();

    Ok(PredictionResult {
        predicted_class: predicted.label.clone(),
        confidence_score,
        class_probabilities,
    })
}
