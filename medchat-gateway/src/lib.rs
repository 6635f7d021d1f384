pub mod config;
pub mod error;
pub mod service;

pub use config::GatewayConfig;
pub use error::{ApiError, ErrorBody};
pub use service::{AppState, build_router, create_app};
