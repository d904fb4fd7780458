pub mod compose;
pub mod registry;
pub mod source;

pub use compose::{format_elapsed, HtmlComposer};
pub use registry::{ExchangeBundle, ExchangeRegistry};
pub use source::{HttpTickerSource, TickerEndpoint};
