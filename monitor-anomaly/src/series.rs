use chrono::{DateTime, Utc};
use monitor_core::PriceSample;
use std::collections::VecDeque;

/// Bounded price history of one symbol, oldest first.
///
/// A new sample is only stored when it differs from the last stored price,
/// and once `capacity` is reached every append evicts the oldest sample.
#[derive(Debug, Clone)]
pub struct PriceSeries {
    samples: VecDeque<PriceSample>,
    capacity: usize,
}

impl PriceSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns whether the sample was stored.
    pub fn observe(&mut self, price: f64, observed_at: DateTime<Utc>) -> bool {
        if self.last_price() == Some(price) {
            return false;
        }

        self.samples.push_back(PriceSample::new(price, observed_at));
        self.evict_overflow();
        true
    }

    pub fn snapshot(&self) -> Vec<PriceSample> {
        self.samples.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Shrinking drops the oldest samples first.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict_overflow();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_price(&self) -> Option<f64> {
        self.samples.back().map(|s| s.price)
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    fn evict_overflow(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }
}
