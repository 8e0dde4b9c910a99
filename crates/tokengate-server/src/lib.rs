pub mod config;
pub mod observability;
pub mod server;

pub use config::AppConfig;
pub use observability::{apply_logging_level, init_tracing};
pub use server::{AppState, ServerBuilder, TokengateServer, build_app, build_router, build_state};
