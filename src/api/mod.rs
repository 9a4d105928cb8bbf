pub mod client;
pub mod error;
pub mod types;
#[cfg(test)]
pub mod mock;

pub use client::{ApiClientConfig, HttpBackend, MonitorBackend};
pub use error::ApiError;
