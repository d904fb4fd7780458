
use mock_collaborators::*;
use monitor_core::ExchangeConfig;
use monitor_engine::{DeliveryOutcome, HistoryResetPolicy, PollerState};
use std::sync::Arc;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[tokio::test]
async fn forty_percent_rise_alerts_and_clears_history() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0)])),
    ]);
    let notifier = RecordingNotifier::new();
    let config = StaticConfig::new(config(30.0, 0, 5, &["ops@example.com"]));
    let mut poller = poller("Binance", source, notifier.clone(), config);

    assert!(poller.run_cycle(at(0)).await.unwrap().alerting.is_empty());
    assert!(poller.run_cycle(at(2)).await.unwrap().alerting.is_empty());
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 1);

    let report = poller.run_cycle(at(5)).await.unwrap();

    assert_eq!(report.alerting, vec!["BTCUSDT"]);
    assert_eq!(report.delivery, DeliveryOutcome::Sent { delivered: 1, failed: 0 });
    assert_eq!(report.cleared, vec!["BTCUSDT"]);
    assert!(poller.series("BTCUSDT").unwrap().is_empty());

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ops@example.com");
    assert_eq!(sent[0].subject, "Binance Update");
    assert_eq!(sent[0].body, "BTCUSDT: +40.00% in 5s<br />");
}

#[tokio::test]
async fn move_outside_time_limit_keeps_history() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0)])),
    ]);
    let notifier = RecordingNotifier::new();
    let config = StaticConfig::new(config(30.0, 3, 5, &["ops@example.com"]));
    let mut poller = poller("Binance", source, notifier.clone(), config);

    for t in [0, 2, 5] {
        let report = poller.run_cycle(at(t)).await.unwrap();
        assert!(report.alerting.is_empty());
        assert!(report.cleared.is_empty());
    }

    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 2);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn fetch_failure_skips_cycle_without_losing_history() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Unreachable,
        Step::Tickers(tickers(&[("BTCUSDT", 101.0)])),
    ]);
    let config = StaticConfig::new(config(30.0, 0, 5, &[]));
    let mut poller = poller("Binance", source.clone(), RecordingNotifier::new(), config);

    poller.run_cycle(at(0)).await.unwrap();

    let report = poller.run_cycle(at(10)).await.unwrap();
    assert!(report.skipped);
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 1);

    let report = poller.run_cycle(at(20)).await.unwrap();
    assert!(!report.skipped);
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 2);
    assert_eq!(source.fetches(), 3);
}

#[tokio::test]
async fn unexpected_source_error_is_fatal() {
    let source = ScriptedSource::new(vec![Step::Fatal]);
    let config = StaticConfig::new(ExchangeConfig::default());
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config);

    let err = poller.run_cycle(at(0)).await.unwrap_err();
    assert!(!err.is_transient());
}

#[tokio::test]
async fn only_tracked_symbols_get_a_series() {
    let source = ScriptedSource::new(vec![Step::Tickers(tickers(&[
        ("BTCUSDT", 100.0),
        ("ETHBTC", 0.05),
    ]))]);
    let config = StaticConfig::new(ExchangeConfig {
        tracked_symbols: Some(["BTCUSDT".to_string()].into_iter().collect()),
        ..Default::default()
    });
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config);

    poller.run_cycle(at(0)).await.unwrap();

    assert!(poller.series("BTCUSDT").is_some());
    assert!(poller.series("ETHBTC").is_none());
}

#[tokio::test]
async fn repeated_symbol_in_one_fetch_uses_the_last_price() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 150.0), ("ETHBTC", 0.05), ("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 100.0), ("BTCUSDT", 150.0)])),
    ]);
    let notifier = RecordingNotifier::new();
    let config = StaticConfig::new(config(30.0, 0, 5, &["ops@example.com"]));
    let mut poller = poller("Binance", source, notifier.clone(), config);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(5)).await.unwrap();
    assert!(report.alerting.is_empty());
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 1);

    let report = poller.run_cycle(at(10)).await.unwrap();
    assert_eq!(report.alerting, vec!["BTCUSDT"]);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].body, "BTCUSDT: +50.00% in 10s<br />");
}

#[tokio::test]
async fn alert_leaves_other_symbols_untouched() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0), ("ETHBTC", 0.050)])),
        Step::Tickers(tickers(&[("BTCUSDT", 150.0), ("ETHBTC", 0.051)])),
    ]);
    let notifier = RecordingNotifier::new();
    let config = StaticConfig::new(config(30.0, 0, 5, &["ops@example.com"]));
    let mut poller = poller("Binance", source, notifier.clone(), config);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(10)).await.unwrap();

    assert_eq!(report.alerting, vec!["BTCUSDT"]);
    assert!(poller.series("BTCUSDT").unwrap().is_empty());
    assert_eq!(poller.series("ETHBTC").unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn every_recipient_gets_one_combined_message() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0), ("ETHBTC", 0.10)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0), ("ETHBTC", 0.05)])),
    ]);
    let notifier = RecordingNotifier::new();
    let config = StaticConfig::new(config(30.0, 0, 5, &["a@example.com", "b@example.com"]));
    let mut poller = poller("Bittrex", source, notifier.clone(), config);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(10)).await.unwrap();

    assert_eq!(report.alerting, vec!["BTCUSDT", "ETHBTC"]);
    let sent = notifier.sent();
    let recipients: Vec<_> = sent.iter().map(|s| s.recipient.as_str()).collect();
    assert_eq!(recipients, vec!["a@example.com", "b@example.com"]);
    for message in &sent {
        assert_eq!(message.subject, "Bittrex Update");
        assert_eq!(
            message.body,
            "BTCUSDT: +40.00% in 10s<br />ETHBTC: -50.00% in 10s<br />"
        );
    }
}

#[tokio::test]
async fn alert_without_recipients_still_resets_history() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0)])),
    ]);
    let config = StaticConfig::new(config(30.0, 0, 5, &[]));
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(5)).await.unwrap();

    assert_eq!(report.delivery, DeliveryOutcome::NoRecipients);
    assert!(poller.series("BTCUSDT").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_resets_history_after_attempt() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0)])),
    ]);
    let notifier = RecordingNotifier::rejecting(&["bad@example.com"]);
    let config = StaticConfig::new(config(30.0, 0, 5, &["bad@example.com", "ops@example.com"]));
    let mut poller = poller("Binance", source, notifier.clone(), config);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(5)).await.unwrap();

    assert_eq!(report.delivery, DeliveryOutcome::Sent { delivered: 1, failed: 1 });
    assert_eq!(notifier.sent().len(), 1);
    assert!(poller.series("BTCUSDT").unwrap().is_empty());
}

#[tokio::test]
async fn on_delivery_policy_keeps_history_when_a_send_fails() {
    let source = ScriptedSource::new(vec![
        Step::Tickers(tickers(&[("BTCUSDT", 100.0)])),
        Step::Tickers(tickers(&[("BTCUSDT", 140.0)])),
    ]);
    let notifier = RecordingNotifier::rejecting(&["bad@example.com"]);
    let config = StaticConfig::new(config(30.0, 0, 5, &["bad@example.com"]));
    let mut poller = poller("Binance", source, notifier, config)
        .with_reset_policy(HistoryResetPolicy::OnDelivery);

    poller.run_cycle(at(0)).await.unwrap();
    let report = poller.run_cycle(at(5)).await.unwrap();

    assert_eq!(report.alerting, vec!["BTCUSDT"]);
    assert!(report.cleared.is_empty());
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 2);
}

#[tokio::test]
async fn config_failure_keeps_last_known_values() {
    let source = ScriptedSource::new(vec![Step::Tickers(tickers(&[("BTCUSDT", 1.0)]))]);
    let config = StaticConfig::new(config(12.5, 0, 5, &[]));
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config.clone());

    poller.run_cycle(at(0)).await.unwrap();
    assert_eq!(poller.config().percent_limit, 12.5);

    config.set(ExchangeConfig {
        percent_limit: 99.0,
        ..Default::default()
    });
    config.fail(true);
    let report = poller.run_cycle(at(10)).await.unwrap();

    assert!(!report.skipped);
    assert_eq!(poller.config().percent_limit, 12.5);
}

#[tokio::test]
async fn shrinking_capacity_trims_existing_series() {
    let source = ScriptedSource::new(
        [1.0, 2.0, 3.0, 4.0]
            .into_iter()
            .map(|p| Step::Tickers(tickers(&[("BTCUSDT", p)])))
            .collect(),
    );
    let config = StaticConfig::new(config(1000.0, 0, 10, &[]));
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config.clone());

    for t in 0..4 {
        poller.run_cycle(at(t)).await.unwrap();
    }
    assert_eq!(poller.series("BTCUSDT").unwrap().len(), 4);

    config.set(config_with_capacity(2));
    poller.run_cycle(at(5)).await.unwrap();

    let series = poller.series("BTCUSDT").unwrap();
    assert_eq!(series.capacity(), 2);
    let prices: Vec<f64> = series.snapshot().iter().map(|s| s.price).collect();
    assert_eq!(prices, vec![3.0, 4.0]);
}

fn config_with_capacity(capacity: usize) -> ExchangeConfig {
    config(1000.0, 0, capacity, &[])
}

#[tokio::test]
async fn log_level_is_applied_once_per_change() {
    let source = ScriptedSource::new(vec![]);
    let config = StaticConfig::new(ExchangeConfig {
        log_level: Some(LevelFilter::DEBUG),
        ..Default::default()
    });
    let control = Arc::new(RecordingLogControl::default());
    let mut poller = poller("Binance", source, RecordingNotifier::new(), config.clone())
        .with_log_control(control.clone());

    poller.run_cycle(at(0)).await.unwrap();
    poller.run_cycle(at(10)).await.unwrap();
    config.set(ExchangeConfig {
        log_level: Some(LevelFilter::ERROR),
        ..Default::default()
    });
    poller.run_cycle(at(20)).await.unwrap();

    let levels = control.levels.lock().clone();
    assert_eq!(
        levels,
        vec![
            ("Binance".to_string(), LevelFilter::DEBUG),
            ("Binance".to_string(), LevelFilter::ERROR),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn run_polls_every_interval_until_stopped() {
    let source = ScriptedSource::new(vec![Step::Tickers(tickers(&[("BTCUSDT", 100.0)]))]);
    let config = StaticConfig::new(ExchangeConfig {
        poll_interval_secs: 10,
        ..Default::default()
    });
    let poller = poller("Binance", source.clone(), RecordingNotifier::new(), config);
    let stop = poller.stop_handle();
    let mut state = poller.state();

    let task = tokio::spawn(poller.run());
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(source.fetches(), 2);
    assert_eq!(*state.borrow_and_update(), PollerState::Idle);

    stop.stop();
    task.await.unwrap().unwrap();

    assert_eq!(*state.borrow(), PollerState::Stopped);
    assert_eq!(source.fetches(), 2);
}

#[tokio::test(start_paused = true)]
async fn stop_interrupts_the_sleep() {
    let source = ScriptedSource::new(vec![]);
    let config = StaticConfig::new(ExchangeConfig {
        poll_interval_secs: 3600,
        ..Default::default()
    });
    let poller = poller("Binance", source.clone(), RecordingNotifier::new(), config);
    let stop = poller.stop_handle();

    let task = tokio::spawn(poller.run());
    tokio::task::yield_now().await;
    stop.stop();

    let outcome = tokio::time::timeout(Duration::from_secs(1), task).await;
    assert!(outcome.unwrap().unwrap().is_ok());
    assert_eq!(source.fetches(), 0);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_ends_run() {
    let source = ScriptedSource::new(vec![Step::Fatal]);
    let config = StaticConfig::new(ExchangeConfig {
        poll_interval_secs: 1,
        ..Default::default()
    });
    let poller = poller("Binance", source, RecordingNotifier::new(), config);
    let state = poller.state();

    assert!(poller.run().await.is_err());
    assert_eq!(*state.borrow(), PollerState::Stopped);
}
