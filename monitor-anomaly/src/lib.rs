pub mod detector;
pub mod series;

pub use detector::{detect_fluctuation, Threshold};
pub use series::PriceSeries;
