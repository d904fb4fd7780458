use async_trait::async_trait;
use monitor_core::{DeliveryError, Notifier};
use tracing::{debug, info};

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        info!(
            recipient,
            subject,
            body_len = body.len(),
            "Notifications disabled, alert logged only"
        );
        debug!("{}", body.replace("<br />", "\n"));
        Ok(())
    }

    fn name(&self) -> &str {
        "Log"
    }
}
