mod health;
mod predict;

use crate::{inference_service::InferenceService, model_service::ModelService, state::State};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use otoscope_api::{HEALTH_ROUTE, PREDICT_ROUTE};

pub use health::healthcheck;
pub use predict::predict;

pub fn api_routes<M: ModelService, S: State>(
    inference_service: InferenceService<M, S>,
    max_body_bytes: usize,
) -> Router {
    Router::new()
        .route(PREDICT_ROUTE, post(predict::<M, S>))
        .route(HEALTH_ROUTE, get(healthcheck::<M, S>))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(inference_service)
}
