mod logging;

use anyhow::{bail, Result};
use clap::Parser;
use monitor_config::{load_email_config, IniConfigLoader};
use monitor_core::Notifier;
use monitor_engine::{ExchangePoller, PollerExit, PollerSupervisor};
use monitor_exchange::ExchangeRegistry;
use monitor_notifier::{EmailNotifier, LogNotifier};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watches exchange tickers and emails large price moves",
    long_about = None
)]
struct Args {
    /// Directory holding one `<exchange>.ini` per exchange
    #[arg(short, long, env = "MONITOR_CONFIG_DIR", default_value = "config")]
    config_dir: PathBuf,

    /// Exchanges to monitor
    #[arg(short, long, value_delimiter = ',', default_value = "binance,bittrex")]
    exchanges: Vec<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Log alerts instead of emailing them
    #[arg(long)]
    no_notifications: bool,

    /// Seconds between reports of running pollers
    #[arg(long, default_value_t = 600)]
    liveness_interval_secs: u64,

    /// Seconds to wait for pollers to finish on shutdown
    #[arg(long, default_value_t = 30)]
    shutdown_grace_secs: u64,
}

enum Outcome {
    Interrupted(&'static str),
    AllExited(Vec<PollerExit>),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_levels = logging::init_logging(args.debug, args.json_logs)?;

    info!("Starting Crypto Monitor");

    let loader = Arc::new(IniConfigLoader::new(&args.config_dir));
    let registry = ExchangeRegistry::builtin()?;
    let notifier = init_notifier(args.no_notifications)?;

    let mut pollers = Vec::with_capacity(args.exchanges.len());
    for name in &args.exchanges {
        let bundle = registry.get(name)?;
        loader.ensure_default(&bundle.name)?;

        pollers.push(
            ExchangePoller::new(
                bundle.name,
                bundle.source,
                bundle.composer,
                notifier.clone(),
                loader.clone(),
            )
            .with_log_control(log_levels.clone()),
        );
    }

    let mut supervisor = PollerSupervisor::new();
    supervisor.start(pollers);

    let liveness = Duration::from_secs(args.liveness_interval_secs);
    let outcome = tokio::select! {
        reason = shutdown_signal() => Outcome::Interrupted(reason),
        exits = supervisor.supervise(liveness) => Outcome::AllExited(exits),
    };

    match outcome {
        Outcome::Interrupted(reason) => {
            info!("{}, shutting down...", reason);
            let exits = supervisor
                .stop_all(Duration::from_secs(args.shutdown_grace_secs))
                .await;
            report(&exits);
            info!("Crypto Monitor stopped");
            Ok(())
        }
        Outcome::AllExited(exits) => {
            report(&exits);
            if exits.iter().any(|e| e.outcome.is_err()) {
                bail!("all pollers have exited");
            }
            warn!("All pollers have exited, nothing left to monitor");
            Ok(())
        }
    }
}

fn init_notifier(dry_run: bool) -> Result<Arc<dyn Notifier>> {
    if dry_run {
        info!("Notifications disabled, alerts will only be logged");
        return Ok(Arc::new(LogNotifier::new()));
    }

    let config = load_email_config()?;
    let notifier = EmailNotifier::new(config);
    if notifier.is_configured() {
        info!("Email notifications enabled");
    }
    Ok(Arc::new(notifier))
}

fn report(exits: &[PollerExit]) {
    for exit in exits {
        match &exit.outcome {
            Ok(()) => info!("{} poller finished", exit.exchange),
            Err(e) => error!("{} poller failed: {}", exit.exchange, e),
        }
    }
}

async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "Received Ctrl+C",
        _ = terminate => "Received terminate signal",
    }
}
