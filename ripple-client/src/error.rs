//! Client-side error taxonomy.
//!
//! Feed operations surface `ripple_core::TransportError` through the
//! engine; this type covers everything outside that path, namely
//! configuration, client construction, and identity bootstrap.

use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}
