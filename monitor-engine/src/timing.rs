use std::future::Future;
use std::time::{Duration, Instant};

/// Fetches slower than this are reported.
pub const SLOW_FETCH: Duration = Duration::from_secs(5);

/// Awaits `fut` and warns when it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
