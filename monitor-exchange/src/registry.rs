use crate::compose::{binance_trade_link, bittrex_trade_link, HtmlComposer};
use crate::source::{HttpTickerSource, TickerEndpoint};
use monitor_core::{MessageComposer, MonitorError, Result, TickerSource};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const BINANCE_TICKER_URL: &str = "https://api.binance.com/api/v3/ticker/price";
pub const BITTREX_TICKER_URL: &str = "https://bittrex.com/api/v1.1/public/getmarketsummaries";

/// The collaborators one poller needs for a single exchange.
#[derive(Debug, Clone)]
pub struct ExchangeBundle {
    pub name: String,
    pub source: Arc<dyn TickerSource>,
    pub composer: Arc<dyn MessageComposer>,
}

impl ExchangeBundle {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn TickerSource>,
        composer: Arc<dyn MessageComposer>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            composer,
        }
    }
}

/// Exchange name to collaborator bundle. Lookups ignore case.
#[derive(Debug, Default, Clone)]
pub struct ExchangeRegistry {
    bundles: BTreeMap<String, ExchangeBundle>,
}

impl ExchangeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binance and Bittrex public ticker endpoints.
    pub fn builtin() -> Result<Self> {
        let mut registry = Self::new();

        registry.register(ExchangeBundle::new(
            "Binance",
            Arc::new(HttpTickerSource::new(TickerEndpoint::new(
                BINANCE_TICKER_URL,
                "symbol",
                "price",
            ))?),
            Arc::new(HtmlComposer::new(binance_trade_link)),
        ));

        registry.register(ExchangeBundle::new(
            "Bittrex",
            Arc::new(HttpTickerSource::new(
                TickerEndpoint::new(BITTREX_TICKER_URL, "MarketName", "Last")
                    .with_envelope("result"),
            )?),
            Arc::new(HtmlComposer::new(bittrex_trade_link)),
        ));

        Ok(registry)
    }

    /// Replaces any bundle already registered under the same name.
    pub fn register(&mut self, bundle: ExchangeBundle) {
        self.bundles.insert(bundle.name.to_lowercase(), bundle);
    }

    pub fn get(&self, name: &str) -> Result<ExchangeBundle> {
        self.bundles
            .get(&name.trim().to_lowercase())
            .cloned()
            .ok_or_else(|| MonitorError::UnknownExchange(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.bundles.values().map(|b| b.name.as_str()).collect()
    }
}
