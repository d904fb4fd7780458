use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

pub const DEFAULT_PERCENT_LIMIT: f64 = 30.0;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_HISTORY_CAPACITY: usize = 30;

/// Settings for one exchange, reloaded at the start of every poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    /// Alert when the absolute percent move exceeds this.
    pub percent_limit: f64,
    /// 0 disables the time window.
    pub time_limit_secs: u64,
    /// `None` evaluates every symbol the exchange reports.
    pub tracked_symbols: Option<BTreeSet<String>>,
    pub poll_interval_secs: u64,
    pub history_capacity: usize,
    /// Include the full price history in notification bodies.
    pub verbose: bool,
    pub recipients: Vec<String>,
    pub log_level: Option<LevelFilter>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            percent_limit: DEFAULT_PERCENT_LIMIT,
            time_limit_secs: 0,
            tracked_symbols: None,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            verbose: false,
            recipients: Vec::new(),
            log_level: None,
        }
    }
}

impl ExchangeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn tracks(&self, symbol: &str) -> bool {
        self.tracked_symbols
            .as_ref()
            .map_or(true, |symbols| symbols.contains(symbol))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub use_tls: bool,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            username: None,
            password: None,
            from_address: None,
            use_tls: true,
        }
    }
}

impl EmailConfig {
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn sender(&self) -> Option<&str> {
        self.from_address.as_deref().or(self.username.as_deref())
    }
}
