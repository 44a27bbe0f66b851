mod routes;

pub mod app;
pub mod config;
pub mod image_codec;
pub mod page;
pub mod prediction;
pub mod server;
pub mod telemetry;

pub use app::start_app;
