use async_trait::async_trait;
use monitor_core::{FetchError, Result, Ticker, TickerSource};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Where an exchange publishes its ticker list and how its fields are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickerEndpoint {
    pub url: String,
    /// Key of the array inside a wrapping object, if any.
    pub envelope: Option<String>,
    pub symbol_key: String,
    pub price_key: String,
}

impl TickerEndpoint {
    pub fn new(
        url: impl Into<String>,
        symbol_key: impl Into<String>,
        price_key: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            envelope: None,
            symbol_key: symbol_key.into(),
            price_key: price_key.into(),
        }
    }

    pub fn with_envelope(mut self, envelope: impl Into<String>) -> Self {
        self.envelope = Some(envelope.into());
        self
    }

    /// Decodes a raw ticker payload into `Ticker`s.
    ///
    /// Entries without a symbol or with an unusable price are skipped.
    pub fn decode(&self, body: &[u8]) -> std::result::Result<Vec<Ticker>, FetchError> {
        let payload: Value = serde_json::from_slice(body)?;

        let entries = match &self.envelope {
            Some(key) => payload
                .get(key)
                .ok_or_else(|| FetchError::MissingField(key.clone()))?,
            None => &payload,
        };
        let entries = entries
            .as_array()
            .ok_or_else(|| FetchError::MissingField(format!("{} array", self.symbol_key)))?;

        let tickers = entries
            .iter()
            .filter_map(|entry| {
                let symbol = entry.get(&self.symbol_key)?.as_str()?;
                match parse_price(entry.get(&self.price_key)) {
                    Some(price) => Some(Ticker::new(symbol, price)),
                    None => {
                        debug!(symbol, "skipping ticker with unusable price");
                        None
                    }
                }
            })
            .collect();

        Ok(tickers)
    }
}

/// Null, missing and empty prices read as 0.
fn parse_price(value: Option<&Value>) -> Option<f64> {
    let price = match value {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) if s.trim().is_empty() => 0.0,
        Some(Value::String(s)) => s.trim().parse().ok()?,
        Some(_) => return None,
    };
    price.is_finite().then_some(price)
}

/// Polls a public REST ticker endpoint.
#[derive(Debug, Clone)]
pub struct HttpTickerSource {
    http: Client,
    endpoint: TickerEndpoint,
}

impl HttpTickerSource {
    pub fn new(endpoint: TickerEndpoint) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl TickerSource for HttpTickerSource {
    #[instrument(skip(self), fields(url = %self.endpoint.url), level = "debug")]
    async fn fetch_tickers(&self) -> Result<Vec<Ticker>> {
        let resp = self
            .http
            .get(&self.endpoint.url)
            .send()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()).into());
        }

        let body = resp.bytes().await.map_err(|e| FetchError::Http(e.to_string()))?;
        let tickers = self.endpoint.decode(&body)?;

        debug!(count = tickers.len(), "tickers fetched");
        Ok(tickers)
    }
}
