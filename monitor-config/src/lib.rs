pub mod email;

pub use email::load_email_config;

use config::{Config, Environment, File, FileFormat};
use monitor_core::{ConfigError, ConfigSource, ExchangeConfig};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;
use tracing::{debug, info, warn};

const DEFAULT_TEMPLATE: &str = "\
# Price fluctuation monitor settings. Changes apply on the next poll.
#
# Alert when the price moves more than this many percent.
percent_limit = 30
# Only alert when the move happened within this many seconds (0 = any time).
time_limit = 0
# Comma separated symbols to watch. Empty watches every symbol.
my_tickers =
# Seconds to wait between polls.
wait_before_poll = 10
# Number of distinct prices kept per symbol.
number_of_prices_to_track = 30
# Include the full price history in alert emails (True/False).
verbose = False
# Comma separated alert recipients.
email =
# DEBUG, INFO, WARNING, ERROR or CRITICAL.
# logging_level = INFO
";

/// Reads `<dir>/<exchange>.ini`, overridable through `MONITOR_<EXCHANGE>_<KEY>`.
#[derive(Debug, Clone)]
pub struct IniConfigLoader {
    dir: PathBuf,
}

impl IniConfigLoader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, exchange: &str) -> PathBuf {
        self.dir.join(format!("{}.ini", exchange.to_lowercase()))
    }

    /// Writes the commented default file if none exists. Returns whether a file was created.
    pub fn ensure_default(&self, exchange: &str) -> Result<bool, ConfigError> {
        let path = self.path_for(exchange);
        if path.exists() {
            return Ok(false);
        }

        let write_err = |e: std::io::Error| ConfigError::Write {
            path: path.clone(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(&self.dir).map_err(write_err)?;
        std::fs::write(&path, DEFAULT_TEMPLATE).map_err(write_err)?;

        info!("Created default configuration {}", path.display());
        Ok(true)
    }

    fn read(&self, exchange: &str) -> Result<Config, ConfigError> {
        let path = self.path_for(exchange);
        if !path.exists() {
            return Err(ConfigError::Missing(path));
        }

        Config::builder()
            .add_source(File::from(path.as_path()).format(FileFormat::Ini))
            .add_source(Environment::with_prefix(&env_prefix(exchange)))
            .build()
            .map_err(|e| ConfigError::Read {
                path,
                reason: e.to_string(),
            })
    }
}

impl ConfigSource for IniConfigLoader {
    fn load(&self, exchange: &str, base: &ExchangeConfig) -> Result<ExchangeConfig, ConfigError> {
        let settings = self.read(exchange)?;
        let config = apply_settings(exchange, &settings, base);
        debug!(?config, "{} configuration loaded", exchange);
        Ok(config)
    }
}

fn env_prefix(exchange: &str) -> String {
    format!("MONITOR_{}", exchange.to_uppercase())
}

/// Overlays every recognised key of `settings` on `base`.
///
/// An invalid value is reported and leaves the field untouched.
pub fn apply_settings(exchange: &str, settings: &Config, base: &ExchangeConfig) -> ExchangeConfig {
    let mut config = base.clone();

    let apply = |key: &str, update: &mut dyn FnMut(&str) -> Result<(), ConfigError>| {
        if let Some(value) = raw_value(settings, key) {
            if let Err(e) = update(&value) {
                warn!(
                    "Invalid setting in {} configuration, keeping previous value: {}",
                    exchange, e
                );
            }
        }
    };

    apply("percent_limit", &mut |v| {
        config.percent_limit = parse_percent(v)?;
        Ok(())
    });
    apply("time_limit", &mut |v| {
        config.time_limit_secs = parse_number("time_limit", v)?;
        Ok(())
    });
    apply("my_tickers", &mut |v| {
        config.tracked_symbols = parse_symbols(v);
        Ok(())
    });
    apply("wait_before_poll", &mut |v| {
        config.poll_interval_secs = parse_positive("wait_before_poll", v)?;
        Ok(())
    });
    apply("number_of_prices_to_track", &mut |v| {
        config.history_capacity = parse_positive("number_of_prices_to_track", v)?;
        Ok(())
    });
    apply("verbose", &mut |v| {
        config.verbose = parse_flag("verbose", v)?;
        Ok(())
    });
    apply("email", &mut |v| {
        config.recipients = split_list(v);
        Ok(())
    });
    apply("logging_level", &mut |v| {
        config.log_level = Some(parse_level(v).unwrap_or_else(|| {
            warn!("Unknown logging_level {:?} for {}, using WARNING", v, exchange);
            LevelFilter::WARN
        }));
        Ok(())
    });

    config
}

fn raw_value(settings: &Config, key: &str) -> Option<String> {
    settings.get_string(key).ok().map(|v| v.trim().to_string())
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_percent(value: &str) -> Result<f64, ConfigError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .ok_or_else(|| invalid("percent_limit", value))
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse::<T>().map_err(|_| invalid(key, value))
}

fn parse_positive<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    let parsed: T = parse_number(key, value)?;
    if parsed < T::from(1) {
        return Err(invalid(key, value));
    }
    Ok(parsed)
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" | "" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_symbols(value: &str) -> Option<BTreeSet<String>> {
    let symbols: BTreeSet<String> = split_list(value).into_iter().collect();
    (!symbols.is_empty()).then_some(symbols)
}

fn parse_level(value: &str) -> Option<LevelFilter> {
    match value.to_ascii_uppercase().as_str() {
        "DEBUG" => Some(LevelFilter::DEBUG),
        "INFO" => Some(LevelFilter::INFO),
        "WARNING" | "WARN" => Some(LevelFilter::WARN),
        "ERROR" | "CRITICAL" => Some(LevelFilter::ERROR),
        _ => None,
    }
}
