use crate::poller::{ExchangePoller, PollerState, StopHandle};
use monitor_core::{MonitorError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How a poller task ended.
#[derive(Debug)]
pub struct PollerExit {
    pub exchange: String,
    pub outcome: Result<()>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerStatus {
    pub exchange: String,
    pub running: bool,
    pub state: PollerState,
}

#[derive(Debug)]
struct PollerHandle {
    exchange: String,
    stop: StopHandle,
    state: watch::Receiver<PollerState>,
    running: Arc<AtomicBool>,
    join: Option<JoinHandle<Result<()>>>,
}

/// Marks its poller as exited when the task finishes, panics or is aborted.
struct ExitGuard {
    running: Arc<AtomicBool>,
    exited: Arc<Notify>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.exited.notify_one();
    }
}

/// Runs one task per exchange poller and collects how they end.
///
/// A poller that fails or panics only ends its own task; the others keep
/// running. There is no automatic restart.
#[derive(Debug, Default)]
pub struct PollerSupervisor {
    handles: Vec<PollerHandle>,
    exits: Vec<PollerExit>,
    exited: Arc<Notify>,
}

impl PollerSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns every poller and returns immediately.
    pub fn start<I>(&mut self, pollers: I)
    where
        I: IntoIterator<Item = ExchangePoller>,
    {
        for poller in pollers {
            let exchange = poller.exchange().to_string();
            let running = Arc::new(AtomicBool::new(true));
            let guard = ExitGuard {
                running: running.clone(),
                exited: self.exited.clone(),
            };

            let stop = poller.stop_handle();
            let state = poller.state();
            let join = tokio::spawn(async move {
                let _guard = guard;
                poller.run().await
            });

            info!("Started poller for {}", exchange);
            self.handles.push(PollerHandle {
                exchange,
                stop,
                state,
                running,
                join: Some(join),
            });
        }
    }

    /// Exchanges whose poller is still running.
    pub fn running(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| h.running.load(Ordering::SeqCst))
            .map(|h| h.exchange.clone())
            .collect()
    }

    pub fn status(&self) -> Vec<PollerStatus> {
        self.handles
            .iter()
            .map(|h| PollerStatus {
                exchange: h.exchange.clone(),
                running: h.running.load(Ordering::SeqCst),
                state: *h.state.borrow(),
            })
            .collect()
    }

    /// Signals one poller to stop. Returns false for an unknown exchange.
    pub fn stop(&self, exchange: &str) -> bool {
        match self
            .handles
            .iter()
            .find(|h| h.exchange.eq_ignore_ascii_case(exchange))
        {
            Some(handle) => {
                info!("Stopping poller for {}", handle.exchange);
                handle.stop.stop();
                true
            }
            None => false,
        }
    }

    /// Logs liveness every `liveness_every` and reports exits as they happen,
    /// until no poller is left running.
    ///
    /// Cancel safe: exits reaped so far are kept and returned by a later
    /// [`await_all`](Self::await_all) or [`stop_all`](Self::stop_all).
    pub async fn supervise(&mut self, liveness_every: Duration) -> Vec<PollerExit> {
        let mut liveness = tokio::time::interval(liveness_every.max(Duration::from_millis(1)));
        liveness.tick().await;

        loop {
            self.reap_finished().await;
            if self.running().is_empty() {
                break;
            }

            tokio::select! {
                _ = liveness.tick() => self.log_liveness(),
                _ = self.exited.notified() => {}
            }
        }

        info!("All pollers have exited");
        self.await_all().await
    }

    /// Waits until every poller task has ended.
    pub async fn await_all(&mut self) -> Vec<PollerExit> {
        for i in 0..self.handles.len() {
            self.reap(i).await;
        }
        std::mem::take(&mut self.exits)
    }

    /// Signals every poller, waits up to `grace`, then aborts the rest.
    pub async fn stop_all(&mut self, grace: Duration) -> Vec<PollerExit> {
        for handle in &self.handles {
            handle.stop.stop();
        }

        if tokio::time::timeout(grace, self.await_all()).await.is_err() {
            for handle in &self.handles {
                if let Some(join) = handle.join.as_ref().filter(|j| !j.is_finished()) {
                    warn!(
                        "Poller for {} did not stop within {}s, aborting",
                        handle.exchange,
                        grace.as_secs()
                    );
                    join.abort();
                }
            }
        }

        self.await_all().await
    }

    fn log_liveness(&self) {
        let report: Vec<String> = self
            .status()
            .into_iter()
            .filter(|s| s.running)
            .map(|s| format!("{} ({})", s.exchange, s.state))
            .collect();
        info!("Running pollers: {}", report.join(", "));
    }

    /// Exits reaped so far that have not been handed out yet.
    pub fn pending_exits(&self) -> &[PollerExit] {
        &self.exits
    }

    /// Reaps every poller whose exit guard has fired. The guard runs as the
    /// task completes, so awaiting its handle does not block.
    async fn reap_finished(&mut self) {
        for i in 0..self.handles.len() {
            let handle = &self.handles[i];
            if handle.join.is_some() && !handle.running.load(Ordering::SeqCst) {
                self.reap(i).await;
            }
        }
    }

    /// Awaits one task and records its exit. The handle is only released
    /// once the task has completed.
    async fn reap(&mut self, i: usize) {
        let handle = &mut self.handles[i];
        let Some(join) = handle.join.as_mut() else {
            return;
        };

        let outcome = match join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(MonitorError::Fatal(format!(
                "{} poller panicked",
                handle.exchange
            ))),
            Err(_) => Err(MonitorError::Fatal(format!(
                "{} poller was aborted",
                handle.exchange
            ))),
        };
        handle.join = None;

        match &outcome {
            Ok(()) => info!("Poller for {} exited", handle.exchange),
            Err(e) => error!("Poller for {} terminated: {}", handle.exchange, e),
        }

        self.exits.push(PollerExit {
            exchange: handle.exchange.clone(),
            outcome,
        });
    }
}
