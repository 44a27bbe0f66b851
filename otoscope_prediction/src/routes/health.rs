use crate::{inference_service::InferenceService, model_service::ModelService, state::State};
use axum::{extract, response::IntoResponse, response::Json};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
pub struct Status {
    status: String,
    class_labels: Vec<String>,
}

pub async fn healthcheck<M: ModelService, S: State>(
    extract::State(service): extract::State<InferenceService<M, S>>,
) -> impl IntoResponse {
    Json(Status {
        status: "Available".into(),
        class_labels: service
            .labels()
            .iter()
            .map(|class_label| class_label.label.clone())
            .collect(),
    })
}
