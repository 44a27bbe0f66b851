mod health;
mod index;
mod metrics;
mod upload;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub use health::healthcheck;
pub use index::index;
pub use metrics::metrics_handler;
pub use upload::upload_image;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/", get(index))
        .route("/upload", post(upload_image))
        .route("/health", get(healthcheck))
        .route("/metrics", get(metrics_handler))
}
