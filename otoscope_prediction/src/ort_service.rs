use crate::{
    config::{ModelConfig, Validatable},
    model_service::{ModelError, ModelService},
};
use async_trait::async_trait;
use ndarray::Array4;
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::{TensorRef, ValueType},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Arc<Mutex<Session>>>>,
    counter: Arc<AtomicUsize>,
    output_name: Arc<str>,
}

impl OrtModelService {
    /// Loads `num_instances` sessions and checks that the graph exposes
    /// `output_name` with one score per class label.
    pub fn new(
        model_config: &ModelConfig,
        num_classes: usize,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        if let Some(session) = sessions.first() {
            let declared: Vec<(&str, Option<i64>)> = session
                .outputs
                .iter()
                .map(|output| {
                    let last_dim = match &output.output_type {
                        ValueType::Tensor { shape: dimensions, .. } => dimensions.last().copied(),
                        _ => None,
                    };
                    (output.name.as_str(), last_dim)
                })
                .collect();
            check_output_signature(&declared, &model_config.output_name, num_classes)?;
        }

        let sessions = sessions
            .into_iter()
            .map(|session| Arc::new(Mutex::new(session)))
            .collect::<Vec<_>>();

        tracing::info!(
            model = ?model_config.get_path(),
            "Created {} ONNX sessions",
            num_instances
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: Arc::from(model_config.output_name.as_str()),
        })
    }

    pub fn run_inference(&self, input: &Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let index = self.counter.fetch_add(1, Ordering::SeqCst) % self.sessions.len();
        let mut session = self.sessions[index]
            .lock()
            .map_err(|e| ModelError::SessionPoisoned(e.to_string()))?;

        tracing::debug!("Handling request with session {}", index);
        let owned_buffer;
        let input_view = if input.view().is_standard_layout() {
            input.view()
        } else {
            owned_buffer = input.as_standard_layout().to_owned();
            owned_buffer.view()
        };

        let tensor_ref = TensorRef::from_array_view(input_view)
            .map_err(|e| ModelError::Tensor(e.to_string()))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let output = outputs.get(&*self.output_name).ok_or_else(|| {
            ModelError::Extraction(format!("model has no output named `{}`", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelError::Extraction(e.to_string()))?;

        tracing::debug!(shape = ?shape, "Model output extracted");

        Ok(data.to_vec())
    }
}

/// Fails when `output_name` is not a declared output, or when its last
/// dimension is static and differs from the number of class labels.
/// Dynamic dimensions are reported by the runtime as negative values.
pub fn check_output_signature(
    declared: &[(&str, Option<i64>)],
    output_name: &str,
    num_classes: usize,
) -> Result<(), ModelError> {
    let Some((_, last_dim)) = declared.iter().find(|(name, _)| *name == output_name) else {
        let available: Vec<&str> = declared.iter().map(|(name, _)| *name).collect();
        return Err(ModelError::OutputMismatch(format!(
            "model has no output named `{}` (available: {})",
            output_name,
            available.join(", ")
        )));
    };

    match last_dim {
        Some(dim) if *dim >= 0 && *dim as usize != num_classes => {
            Err(ModelError::OutputMismatch(format!(
                "output `{}` yields {} scores for {} class labels",
                output_name, dim, num_classes
            )))
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl ModelService for OrtModelService {
    async fn predict(&self, input: Array4<f32>) -> Result<Vec<f32>, ModelError> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.run_inference(&input))
            .await
            .map_err(|e| ModelError::Inference(e.to_string()))?
    }
}
