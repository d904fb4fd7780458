use chrono::{Duration, Local};
use monitor_core::{Alert, MessageComposer};
use std::fmt::Write;

type TradeLink = fn(&str) -> String;

/// Renders one alerting symbol as an HTML fragment.
///
/// Fragments of several symbols are concatenated into a single email body.
#[derive(Debug, Clone)]
pub struct HtmlComposer {
    trade_link: TradeLink,
}

impl HtmlComposer {
    pub fn new(trade_link: TradeLink) -> Self {
        Self { trade_link }
    }

    pub fn trade_link(&self, symbol: &str) -> String {
        (self.trade_link)(symbol)
    }
}

impl MessageComposer for HtmlComposer {
    fn compose(&self, alert: &Alert<'_>) -> String {
        let f = alert.fluctuation;
        let mut message = String::new();

        if alert.verbose {
            message.push_str("==========<br />");
            let _ = write!(message, "{} price history information<br />", alert.symbol);
            for sample in alert.history {
                let _ = write!(
                    message,
                    "{} price is {} on {}<br />",
                    alert.symbol,
                    sample.price,
                    sample.observed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S%.6f")
                );
            }
            message.push_str("==========<br />");
            message.push_str("<br />");
        }

        let color = if f.percent_diff > 0.0 { "green" } else { "red" };

        let _ = write!(message, "{}<br />", self.trade_link(alert.symbol));
        let _ = write!(
            message,
            "{}: <font color=\"{}\">{:+.2}%</font> in {}<br />",
            alert.symbol,
            color,
            f.percent_diff,
            format_elapsed(f.elapsed)
        );
        let _ = write!(message, "old price:     {:.8}<br />", f.old_price);
        let _ = write!(message, "new price:     {:.8}<br />", f.new_price);
        let _ = write!(message, "percent_limit: {}%<br />", alert.percent_limit);
        let _ = write!(
            message,
            "Time sent:     {}<br />",
            alert.sent_at.with_timezone(&Local).format("%Y-%m-%d %I:%M:%S %p")
        );
        message.push_str("<br />");

        message
    }
}

/// `H:MM:SS`, hours unbounded.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.num_seconds().abs();
    format!("{}:{:02}:{:02}", secs / 3600, secs / 60 % 60, secs % 60)
}

pub fn binance_trade_link(symbol: &str) -> String {
    let quote_len = if symbol.ends_with("USDT") { 4 } else { 3 };
    let split = symbol.len().saturating_sub(quote_len);
    match (symbol.get(..split), symbol.get(split..)) {
        (Some(base), Some(quote)) => {
            format!("https://www.binance.com/trade.html?symbol={}_{}", base, quote)
        }
        _ => format!("https://www.binance.com/trade.html?symbol={}", symbol),
    }
}

pub fn bittrex_trade_link(symbol: &str) -> String {
    format!("https://www.bittrex.com/Market/Index?MarketName={}", symbol)
}
