mod ort_service;
mod routes;
mod server;

pub mod config;
pub mod inference_service;
pub mod model_service;
pub mod preprocessing;
pub mod state;

pub use ort_service::OrtModelService;
pub use server::{start_server, HttpServer};
