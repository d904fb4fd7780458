use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use monitor_core::{DeliveryError, EmailConfig, Notifier};
use tracing::{error, info, warn};

/// Sends HTML alert bodies over SMTP.
///
/// Without credentials the notifier still constructs, but every send fails
/// with [`DeliveryError::NotConfigured`].
#[derive(Debug)]
pub struct EmailNotifier {
    config: EmailConfig,
    mailer: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        let mailer = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                let creds = Credentials::new(username.clone(), password.clone());

                let builder = if config.use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
                } else {
                    AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
                };

                match builder {
                    Ok(b) => Some(b.credentials(creds).port(config.smtp_port).build()),
                    Err(e) => {
                        error!("Invalid SMTP relay {}: {}", config.smtp_host, e);
                        None
                    }
                }
            }
            _ => {
                warn!("SMTP credentials missing, email alerts will not be delivered");
                None
            }
        };

        Self { config, mailer }
    }

    pub fn is_configured(&self) -> bool {
        self.mailer.is_some() && self.config.sender().is_some()
    }

    fn build_message(
        &self,
        recipient: &str,
        subject: &str,
        body: &str,
    ) -> Result<Message, DeliveryError> {
        let from: Mailbox = self
            .config
            .sender()
            .ok_or_else(|| DeliveryError::NotConfigured("no sender address".to_string()))?
            .parse()
            .map_err(|e| DeliveryError::Address(format!("from: {}", e)))?;
        let to: Mailbox = recipient
            .parse()
            .map_err(|e| DeliveryError::Address(format!("{}: {}", recipient, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let mailer = self.mailer.as_ref().ok_or_else(|| {
            DeliveryError::NotConfigured(format!("SMTP credentials for {}", self.config.smtp_host))
        })?;

        let email = self.build_message(recipient, subject, body)?;

        mailer
            .send(email)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        info!("Email notification sent to {}", recipient);
        Ok(())
    }

    fn name(&self) -> &str {
        "Email"
    }
}
