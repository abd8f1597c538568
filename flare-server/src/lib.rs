//! `flare-server` exposes the FLARE retrieval pipeline over HTTP.
//! Handlers are thin: they parse requests, call [`flare_rag::RagPipeline`]
//! and map its errors onto status codes.

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use routes::{AppState, app_router};
pub use server::{build_pipeline, run_server};
