use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Router,
};
use image::{ImageBuffer, ImageFormat, Rgb};
use otoscope_upload::{
    config::{PredictionServiceConfig, ServerConfig},
    prediction::PredictionService,
    server::HttpServer,
    telemetry::Metrics,
};
use reqwest::multipart;
use std::{
    io::Cursor,
    net::SocketAddr,
    sync::{Arc, Mutex},
};
use tokio::{net::TcpListener, sync::broadcast};

#[derive(Clone)]
struct MockBackend {
    status: StatusCode,
    body: &'static str,
    received: Arc<Mutex<Vec<ReceivedFile>>>,
}

#[derive(Debug, Clone)]
struct ReceivedFile {
    file_name: Option<String>,
    content_type: Option<String>,
    format: Option<ImageFormat>,
}

async fn mock_predict(State(backend): State<MockBackend>, mut multipart: Multipart) -> impl IntoResponse {
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await.unwrap();
            backend.received.lock().unwrap().push(ReceivedFile {
                file_name,
                content_type,
                format: image::guess_format(&data).ok(),
            });
        }
    }
    (
        backend.status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        backend.body,
    )
}

struct Harness {
    app_addr: SocketAddr,
    received: Arc<Mutex<Vec<ReceivedFile>>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Harness {
    async fn start(status: StatusCode, body: &'static str) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let backend = MockBackend {
            status,
            body,
            received: received.clone(),
        };
        let backend_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_port = backend_listener.local_addr().unwrap().port();
        let backend_router = Router::new()
            .route("/predict", post(mock_predict))
            .with_state(backend);
        tokio::spawn(async move {
            axum::serve(backend_listener, backend_router).await.unwrap();
        });

        Self::with_backend_port(backend_port, received).await
    }

    /// Points the app at `backend_port` without starting anything there.
    async fn unreachable_backend() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = listener.local_addr().unwrap().port();
        drop(listener);

        Self::with_backend_port(closed_port, Arc::new(Mutex::new(Vec::new()))).await
    }

    async fn with_backend_port(
        backend_port: u16,
        received: Arc<Mutex<Vec<ReceivedFile>>>,
    ) -> Self {
        let prediction_service = PredictionService::new(&PredictionServiceConfig {
            host: "127.0.0.1".to_string(),
            port: backend_port,
            predict_path: "/predict".to_string(),
            timeout_secs: Some(10),
        })
        .unwrap();
        let server = HttpServer::new(
            Arc::new(prediction_service),
            Arc::new(Metrics::new().unwrap()),
            &ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                max_upload_bytes: 1024 * 1024,
            },
        )
        .await
        .unwrap();
        let app_addr = server.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        server.run(shutdown_rx).await.unwrap();

        Self {
            app_addr,
            received,
            shutdown_tx,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.app_addr, path)
    }

    async fn upload(&self, form: multipart::Form) -> (reqwest::StatusCode, String) {
        let response = reqwest::Client::new()
            .post(self.url("/upload"))
            .multipart(form)
            .send()
            .await
            .unwrap();
        let status = response.status();
        (status, response.text().await.unwrap())
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

fn image_form(format: ImageFormat, file_name: &str) -> multipart::Form {
    let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(300, 200, Rgb([180, 90, 60]));
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format).unwrap();
    let part = multipart::Part::bytes(cursor.into_inner()).file_name(file_name.to_string());
    multipart::Form::new().part("file", part)
}

const EARWAX: &str = r#"{"predicted_class": "Earwax", "confidence_score": 0.87, "class_probabilities": {"Aom":0.01,"Earwax":0.87,"Normal":0.07,"Others":0.05}}"#;

#[tokio::test]
async fn test_successful_prediction_is_rendered() {
    let harness = Harness::start(StatusCode::OK, EARWAX).await;

    let (status, html) = harness.upload(image_form(ImageFormat::Png, "ear.png")).await;

    assert_eq!(status, reqwest::StatusCode::OK);
    assert!(html.contains("Predicted Class: Earwax"));
    assert!(html.contains("Confidence Score: 0.87"));
    assert!(html.contains("Class Probabilities"));
    let aom = html.find("Aom: 0.01").unwrap();
    let others = html.find("Others: 0.05").unwrap();
    assert!(aom < others);
    assert!(html.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn test_upload_is_forwarded_in_its_original_format() {
    let harness = Harness::start(StatusCode::OK, EARWAX).await;

    harness
        .upload(image_form(ImageFormat::Jpeg, "ear.jpeg"))
        .await;

    let received = harness.received.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].file_name.as_deref(), Some("image.jpg"));
    assert_eq!(received[0].content_type.as_deref(), Some("image/jpeg"));
    assert_eq!(received[0].format, Some(ImageFormat::Jpeg));
}

#[tokio::test]
async fn test_backend_error_is_shown_in_banner() {
    let harness = Harness::start(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error": "bad image"}"#).await;

    let (_, html) = harness.upload(image_form(ImageFormat::Png, "ear.png")).await;

    assert!(html.contains(r#"class="banner error""#));
    assert!(html.contains("Error: bad image"));
    assert!(!html.contains("Predicted Class"));
}

#[tokio::test]
async fn test_backend_error_without_message_falls_back() {
    let harness = Harness::start(StatusCode::BAD_REQUEST, "not json").await;

    let (_, html) = harness.upload(image_form(ImageFormat::Png, "ear.png")).await;

    assert!(html.contains("Error: Unknown error"));
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let harness = Harness::start(StatusCode::OK, EARWAX).await;

    let (status, html) = harness
        .upload(multipart::Form::new().text("comment", "no image"))
        .await;

    assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
    assert!(html.contains("Error: No file provided"));
    assert!(harness.received.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_index_health_and_metrics_routes() {
    let harness = Harness::start(StatusCode::OK, EARWAX).await;

    let index = reqwest::get(harness.url("/")).await.unwrap();
    assert_eq!(index.status(), reqwest::StatusCode::OK);
    assert!(index.text().await.unwrap().contains(r#"type="file""#));

    let health: serde_json::Value = reqwest::get(harness.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "Available");

    let metrics = reqwest::get(harness.url("/metrics")).await.unwrap();
    assert_eq!(metrics.status(), reqwest::StatusCode::OK);
}

#[tokio::test]
async fn test_unreachable_backend_is_shown_in_banner() {
    let harness = Harness::unreachable_backend().await;

    let (status, html) = harness.upload(image_form(ImageFormat::Png, "ear.png")).await;

    assert_eq!(status, reqwest::StatusCode::BAD_GATEWAY);
    assert!(html.contains(r#"class="banner error""#));
    assert!(html.contains("Error: Request to prediction service failed"));
    assert!(html.contains("data:image/png;base64,"));
}

#[tokio::test]
async fn test_upload_metrics_are_exported() {
    let harness = Harness::start(StatusCode::OK, EARWAX).await;

    harness.upload(image_form(ImageFormat::Png, "ear.png")).await;

    let metrics = reqwest::get(harness.url("/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("uploads_total"), "{metrics}");
    assert!(metrics.contains("prediction_duration_ms"), "{metrics}");
}
