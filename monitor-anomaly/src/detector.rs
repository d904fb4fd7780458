use chrono::Duration;
use monitor_core::{ExchangeConfig, FluctuationResult, PriceSample};

/// Computes the fluctuation between the extrema of a price window.
///
/// The minimum and maximum are located by their last occurrence. Whichever of
/// the two comes first is the old price, the other the new price, so a drop
/// yields a negative `percent_diff`. A zero old price reports no change.
/// Returns `None` for an empty window.
pub fn detect_fluctuation(samples: &[PriceSample]) -> Option<FluctuationResult> {
    let first = samples.first()?;

    let (mut min_idx, mut max_idx) = (0, 0);
    let (mut min_price, mut max_price) = (first.price, first.price);

    for (idx, sample) in samples.iter().enumerate().skip(1) {
        if sample.price <= min_price {
            min_price = sample.price;
            min_idx = idx;
        }
        if sample.price >= max_price {
            max_price = sample.price;
            max_idx = idx;
        }
    }

    let (old, new) = if min_idx < max_idx {
        (&samples[min_idx], &samples[max_idx])
    } else {
        (&samples[max_idx], &samples[min_idx])
    };

    let percent_diff = if old.price != 0.0 {
        (new.price / old.price - 1.0) * 100.0
    } else {
        0.0
    };

    Some(FluctuationResult {
        old_price: old.price,
        new_price: new.price,
        old_at: old.observed_at,
        new_at: new.observed_at,
        percent_diff,
        elapsed: (new.observed_at - old.observed_at).abs(),
    })
}

/// Alert thresholds taken from an exchange's configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub percent_limit: f64,
    /// 0 accepts any elapsed time.
    pub time_limit_secs: u64,
}

impl Threshold {
    pub fn new(percent_limit: f64, time_limit_secs: u64) -> Self {
        Self {
            percent_limit,
            time_limit_secs,
        }
    }

    pub fn is_breached_by(&self, result: &FluctuationResult) -> bool {
        if result.percent_diff.abs() <= self.percent_limit {
            return false;
        }

        if self.time_limit_secs == 0 {
            return true;
        }
        // Limits beyond the representable range accept any elapsed time.
        i64::try_from(self.time_limit_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .map_or(true, |limit| result.elapsed <= limit)
    }
}

impl From<&ExchangeConfig> for Threshold {
    fn from(config: &ExchangeConfig) -> Self {
        Self::new(config.percent_limit, config.time_limit_secs)
    }
}
