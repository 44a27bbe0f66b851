use crate::{
    config::Config,
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    preprocessing::Preprocessing,
    routes::api_routes,
    state::{ServiceState, State},
};
use axum::Router;
use std::{future::Future, net::SocketAddr};
use tokio::{net::TcpListener, signal};

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService, S: State>(
        inference_service: InferenceService<M, S>,
        addr: &str,
        max_body_bytes: usize,
    ) -> std::io::Result<Self> {
        let router = api_routes(inference_service, max_body_bytes);
        let listener = TcpListener::bind(addr).await?;

        Ok(Self { router, listener })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown")
        })
        .await
    }

    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        tracing::info!("Inference service listening on {}", self.local_addr()?);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

pub async fn start_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let service_state = ServiceState::new(&config.labels).map_err(|e| {
        tracing::error!("Failed to load class labels: {}", e);
        e
    })?;
    let ort_model_service =
        OrtModelService::new(&config.model, service_state.get_labels().len()).map_err(|e| {
            tracing::error!("Failed to instantiate ort model service: {}", e);
            e
        })?;

    let temp_dir = config.upload.get_temp_dir();
    std::fs::create_dir_all(&temp_dir)?;

    let preprocessing = Preprocessing {
        width: config.model.input_width,
        height: config.model.input_height,
        temp_dir,
    };
    let inference_service =
        InferenceService::new(ort_model_service, service_state).with_preprocessing(preprocessing);

    let addr = config.server.get_address();
    let http_server =
        HttpServer::new(inference_service, &addr, config.server.max_body_bytes).await?;

    http_server.run().await?;
    tracing::info!("Inference service stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
