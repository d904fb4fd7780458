use config::{Config, Environment};
use monitor_core::{ConfigError, EmailConfig};
use tracing::warn;

const SMTP_ENV_PREFIX: &str = "MONITOR_SMTP";

/// Reads SMTP settings from `MONITOR_SMTP_{HOST,PORT,USERNAME,PASSWORD,FROM,TLS}`.
///
/// Unset variables keep the `EmailConfig` defaults. Missing credentials are not
/// an error here; the notifier reports them on each send attempt.
pub fn load_email_config() -> Result<EmailConfig, ConfigError> {
    let settings = Config::builder()
        .add_source(Environment::with_prefix(SMTP_ENV_PREFIX))
        .build()
        .map_err(|e| ConfigError::Read {
            path: SMTP_ENV_PREFIX.into(),
            reason: e.to_string(),
        })?;

    Ok(email_config_from(&settings))
}

fn email_config_from(settings: &Config) -> EmailConfig {
    let mut config = EmailConfig::default();
    let get = |key: &str| {
        settings
            .get_string(key)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(host) = get("host") {
        config.smtp_host = host;
    }
    if let Some(port) = get("port") {
        match port.parse() {
            Ok(port) => config.smtp_port = port,
            Err(_) => warn!("Invalid SMTP port {:?}, using {}", port, config.smtp_port),
        }
    }
    if let Some(tls) = get("tls") {
        config.use_tls = !matches!(tls.to_ascii_lowercase().as_str(), "false" | "no" | "0");
    }
    config.username = get("username");
    config.password = get("password");
    config.from_address = get("from");

    config
}
