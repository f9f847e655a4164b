mod error;
pub use error::ApiError;

mod handler;
pub use handler::EcsApiHandler;

mod adapter;
pub use adapter::EngineApiAdapter;

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{HttpApi, TARGET_PREFIX};

#[cfg(feature = "http")]
pub use axum;
