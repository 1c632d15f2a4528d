pub mod config;
pub mod handlers;
pub mod observability;
pub mod server;

pub use config::{AppConfig, LoggingConfig, ServerConfig};
pub use observability::{apply_logging_level, init_tracing, init_tracing_with_level};
pub use server::{AppState, KeygateServer, ServerBuilder, ServerError, build_app, build_state};
