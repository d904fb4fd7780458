use crate::timing::{warn_if_slow, SLOW_FETCH};
use chrono::{DateTime, Utc};
use monitor_anomaly::{detect_fluctuation, PriceSeries, Threshold};
use monitor_core::{
    Alert, ConfigSource, ExchangeConfig, LogControl, MessageComposer, Notifier, Result, Ticker,
    TickerSource,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::level_filters::LevelFilter;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Delay between two consecutive sends of the same alert.
pub const SEND_PACING: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    Evaluating,
    Notifying,
    Stopped,
}

impl fmt::Display for PollerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollerState::Idle => "idle",
            PollerState::Polling => "polling",
            PollerState::Evaluating => "evaluating",
            PollerState::Notifying => "notifying",
            PollerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// When the series of an alerting symbol is emptied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryResetPolicy {
    /// After evaluation raised the alert, whatever happens to the sends.
    #[default]
    AfterAttempt,
    /// Only once every recipient accepted the message.
    OnDelivery,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryOutcome {
    /// No symbol alerted this cycle.
    #[default]
    NothingToSend,
    NoRecipients,
    Sent { delivered: usize, failed: usize },
}

impl DeliveryOutcome {
    pub fn all_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent { failed: 0, .. })
    }
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// The fetch failed and nothing was evaluated.
    pub skipped: bool,
    pub alerting: Vec<String>,
    pub delivery: DeliveryOutcome,
    pub cleared: Vec<String>,
}

impl CycleReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Requests a poller to exit. Clones signal the same poller.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Polls one exchange, keeps a price series per symbol and sends alerts.
///
/// All state is owned by the poller; nothing is shared with other exchanges.
#[derive(Debug)]
pub struct ExchangePoller {
    exchange: String,
    source: Arc<dyn TickerSource>,
    composer: Arc<dyn MessageComposer>,
    notifier: Arc<dyn Notifier>,
    config_source: Arc<dyn ConfigSource>,
    log_control: Option<Arc<dyn LogControl>>,
    reset_policy: HistoryResetPolicy,
    config: ExchangeConfig,
    applied_level: Option<LevelFilter>,
    series: HashMap<String, PriceSeries>,
    stop: StopHandle,
    state: watch::Sender<PollerState>,
}

impl ExchangePoller {
    pub fn new(
        exchange: impl Into<String>,
        source: Arc<dyn TickerSource>,
        composer: Arc<dyn MessageComposer>,
        notifier: Arc<dyn Notifier>,
        config_source: Arc<dyn ConfigSource>,
    ) -> Self {
        let (state, _) = watch::channel(PollerState::Idle);
        Self {
            exchange: exchange.into(),
            source,
            composer,
            notifier,
            config_source,
            log_control: None,
            reset_policy: HistoryResetPolicy::default(),
            config: ExchangeConfig::default(),
            applied_level: None,
            series: HashMap::new(),
            stop: StopHandle::new(),
            state,
        }
    }

    pub fn with_log_control(mut self, log_control: Arc<dyn LogControl>) -> Self {
        self.log_control = Some(log_control);
        self
    }

    pub fn with_reset_policy(mut self, policy: HistoryResetPolicy) -> Self {
        self.reset_policy = policy;
        self
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> watch::Receiver<PollerState> {
        self.state.subscribe()
    }

    pub fn series(&self, symbol: &str) -> Option<&PriceSeries> {
        self.series.get(symbol)
    }

    /// Idle loop: sleep, then run a cycle, until stopped or a fatal error.
    pub async fn run(mut self) -> Result<()> {
        let span = info_span!("poller", exchange = %self.exchange);
        async move {
            info!("Poller started");
            self.reload_config();

            let outcome = loop {
                if self.stop.is_stopped() {
                    break Ok(());
                }

                self.set_state(PollerState::Idle);
                let interval = self.config.poll_interval();
                info!("Waiting for {}s before next price poll...", interval.as_secs());
                if self.sleep_or_stop(interval).await {
                    break Ok(());
                }

                if let Err(e) = self.run_cycle(Utc::now()).await {
                    error!("Poller failed: {}", e);
                    break Err(e);
                }
            };

            self.set_state(PollerState::Stopped);
            info!("Poller stopped");
            outcome
        }
        .instrument(span)
        .await
    }

    /// Returns true when woken by a stop request.
    async fn sleep_or_stop(&self, interval: Duration) -> bool {
        let mut stop = self.stop.subscribe();
        let stopped = async move {
            loop {
                let requested = *stop.borrow_and_update();
                if requested || stop.changed().await.is_err() {
                    break;
                }
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(interval) => self.stop.is_stopped(),
            _ = stopped => true,
        }
    }

    /// Reloads configuration, then runs Polling, Evaluating and Notifying once.
    ///
    /// Transient fetch and configuration failures are absorbed; any other
    /// error is fatal for this poller.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> Result<CycleReport> {
        self.reload_config();

        self.set_state(PollerState::Polling);
        let tickers = match self.fetch().await {
            Ok(tickers) => tickers,
            Err(e) if e.is_transient() => {
                warn!("Skipping cycle: {}", e);
                return Ok(CycleReport::skipped());
            }
            Err(e) => return Err(e),
        };

        self.set_state(PollerState::Evaluating);
        let (alerting, body) = self.evaluate(&tickers, now);

        let mut report = CycleReport {
            alerting,
            ..Default::default()
        };
        if report.alerting.is_empty() {
            return Ok(report);
        }

        debug!("{}", body);
        report.delivery = if self.config.recipients.is_empty() {
            info!("No recipients configured, {} alert(s) not sent", report.alerting.len());
            DeliveryOutcome::NoRecipients
        } else {
            self.set_state(PollerState::Notifying);
            self.notify(&body).await
        };

        let clear = match self.reset_policy {
            HistoryResetPolicy::AfterAttempt => true,
            HistoryResetPolicy::OnDelivery => report.delivery.all_delivered(),
        };
        if clear {
            for symbol in &report.alerting {
                if let Some(series) = self.series.get_mut(symbol) {
                    series.clear();
                }
            }
            report.cleared = report.alerting.clone();
        }

        Ok(report)
    }

    fn reload_config(&mut self) {
        match self.config_source.load(&self.exchange, &self.config) {
            Ok(config) => {
                if config.history_capacity != self.config.history_capacity {
                    for series in self.series.values_mut() {
                        series.set_capacity(config.history_capacity);
                    }
                }
                self.config = config;
            }
            Err(e) => warn!("Keeping previous configuration: {}", e),
        }

        info!(
            "number of prices: {}, wait before poll: {}s, percent limit: {}%, \
             time limit: {}s, tickers: {:?}",
            self.config.history_capacity,
            self.config.poll_interval_secs,
            self.config.percent_limit,
            self.config.time_limit_secs,
            self.config.tracked_symbols
        );

        if let (Some(level), Some(control)) = (self.config.log_level, &self.log_control) {
            if self.applied_level != Some(level) {
                control.set_level(&self.exchange, level);
                self.applied_level = Some(level);
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<Ticker>> {
        info!("Get price updates");
        warn_if_slow("fetch_tickers", SLOW_FETCH, self.source.fetch_tickers()).await
    }

    /// Observes every tracked ticker and composes the body for those that alert.
    fn evaluate(&mut self, tickers: &[Ticker], now: DateTime<Utc>) -> (Vec<String>, String) {
        let threshold = Threshold::from(&self.config);
        let capacity = self.config.history_capacity;

        let mut alerting = Vec::new();
        let mut body = String::new();

        for ticker in latest_per_symbol(tickers) {
            if !self.config.tracks(&ticker.symbol) {
                continue;
            }

            let series = self
                .series
                .entry(ticker.symbol.clone())
                .or_insert_with(|| PriceSeries::new(capacity));
            series.observe(ticker.price, now);

            let history = series.snapshot();
            let Some(result) = detect_fluctuation(&history) else {
                continue;
            };
            debug!(
                symbol = %ticker.symbol,
                percent_diff = result.percent_diff,
                samples = history.len(),
                "evaluated"
            );

            if !threshold.is_breached_by(&result) {
                continue;
            }

            info!(
                "{}: {:+.2}%, old price: {:.8}, new price: {:.8}, elapsed: {}s, percent_limit: {}%",
                ticker.symbol,
                result.percent_diff,
                result.old_price,
                result.new_price,
                result.elapsed.num_seconds(),
                self.config.percent_limit
            );

            body.push_str(&self.composer.compose(&Alert {
                exchange: &self.exchange,
                symbol: &ticker.symbol,
                fluctuation: &result,
                percent_limit: self.config.percent_limit,
                verbose: self.config.verbose,
                history: &history,
                sent_at: now,
            }));
            alerting.push(ticker.symbol.clone());
        }

        (alerting, body)
    }

    async fn notify(&self, body: &str) -> DeliveryOutcome {
        let subject = self.composer.subject(&self.exchange);
        let (mut delivered, mut failed) = (0, 0);

        for (i, recipient) in self.config.recipients.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(SEND_PACING).await;
            }

            match self.notifier.send(recipient, &subject, body).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!("{} notification to {} failed: {}", self.notifier.name(), recipient, e);
                    failed += 1;
                }
            }
        }

        DeliveryOutcome::Sent { delivered, failed }
    }

    fn set_state(&self, state: PollerState) {
        self.state.send_replace(state);
    }
}

/// One ticker per symbol in first-seen order, keeping the last price listed.
fn latest_per_symbol(tickers: &[Ticker]) -> Vec<&Ticker> {
    let mut position: HashMap<&str, usize> = HashMap::with_capacity(tickers.len());
    let mut unique: Vec<&Ticker> = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        match position.get(ticker.symbol.as_str()) {
            Some(&i) => unique[i] = ticker,
            None => {
                position.insert(&ticker.symbol, unique.len());
                unique.push(ticker);
            }
        }
    }
    unique
}
