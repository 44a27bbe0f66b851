use async_trait::async_trait;
use ndarray::Array4;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("session mutex poisoned: {0}")]
    SessionPoisoned(String),
    #[error("failed to build tensor: {0}")]
    Tensor(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("failed to extract tensor: {0}")]
    Extraction(String),
    #[error("model output does not match configuration: {0}")]
    OutputMismatch(String),
}

/// Runs a batch of one preprocessed image and returns the per-class scores
/// in model output order.
#[async_trait]
pub trait ModelService: Send + Sync + 'static {
    async fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError>;
}
