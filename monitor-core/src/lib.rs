pub mod config;
pub mod model;
pub mod traits;

pub use config::{EmailConfig, ExchangeConfig};
pub use model::{Alert, FluctuationResult, PriceSample, Ticker};
pub use traits::{ConfigSource, LogControl, MessageComposer, Notifier, TickerSource};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Unknown exchange: {0}")]
    UnknownExchange(String),

    #[error("Fatal poller error: {0}")]
    Fatal(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl MonitorError {
    /// Transient errors skip the current cycle; everything else stops the poller.
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Fetch(_) | MonitorError::Configuration(_))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Failure to obtain a ticker snapshot from an exchange.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("exchange answered with status {0}")]
    Status(u16),

    #[error("failed to decode ticker payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("ticker payload is missing '{0}'")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file {} not found", .0.display())]
    Missing(PathBuf),

    #[error("failed to read configuration {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("failed to write configuration {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("invalid value {value:?} for '{key}'")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("notifier not configured: {0}")]
    NotConfigured(String),

    #[error("invalid address {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport failure: {0}")]
    Transport(String),
}
