use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One entry of an exchange's ticker snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price: f64,
}

impl Ticker {
    pub fn new(symbol: impl Into<String>, price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(price: f64, observed_at: DateTime<Utc>) -> Self {
        Self { price, observed_at }
    }
}

/// Old/new extrema of a price window and the move between them.
///
/// `old_*` is whichever extremum occurs first in the window, so
/// `percent_diff` is negative for a drop. `elapsed` is never negative.
#[derive(Debug, Clone, PartialEq)]
pub struct FluctuationResult {
    pub old_price: f64,
    pub new_price: f64,
    pub old_at: DateTime<Utc>,
    pub new_at: DateTime<Utc>,
    pub percent_diff: f64,
    pub elapsed: Duration,
}

/// Everything a composer needs to render one alerting symbol.
#[derive(Debug, Clone, Copy)]
pub struct Alert<'a> {
    pub exchange: &'a str,
    pub symbol: &'a str,
    pub fluctuation: &'a FluctuationResult,
    pub percent_limit: f64,
    pub verbose: bool,
    pub history: &'a [PriceSample],
    pub sent_at: DateTime<Utc>,
}
