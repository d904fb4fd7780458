use crate::{Alert, ConfigError, DeliveryError, ExchangeConfig, Result, Ticker};
use async_trait::async_trait;
use std::fmt::Debug;
use tracing::level_filters::LevelFilter;

/// Fetches the current ticker snapshot of one exchange.
#[async_trait]
pub trait TickerSource: Send + Sync + Debug {
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>>;
}

/// Renders alerting symbols into a notification body.
pub trait MessageComposer: Send + Sync + Debug {
    fn compose(&self, alert: &Alert<'_>) -> String;

    fn subject(&self, exchange: &str) -> String {
        format!("{} Update", exchange)
    }
}

#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> std::result::Result<(), DeliveryError>;

    fn name(&self) -> &str;
}

/// Loads an exchange's configuration on top of the last known values.
///
/// Fields that are absent or invalid keep their value from `base`; an
/// unreadable source fails the whole load.
pub trait ConfigSource: Send + Sync + Debug {
    fn load(
        &self,
        exchange: &str,
        base: &ExchangeConfig,
    ) -> std::result::Result<ExchangeConfig, ConfigError>;
}

/// Adjusts log verbosity for a single exchange's poller.
pub trait LogControl: Send + Sync + Debug {
    fn set_level(&self, exchange: &str, level: LevelFilter);
}
