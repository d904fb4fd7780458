use monitor_core::LogControl;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::span::{Attributes, Id};
use tracing::{warn, Event, Subscriber};
use tracing_subscriber::fmt as fmt_layer;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

const POLLER_SPAN: &str = "poller";

type Levels = Arc<RwLock<BTreeMap<String, LevelFilter>>>;

/// Per-exchange log levels on top of the process-wide filter.
///
/// Raising an exchange above the base level goes through `EnvFilter` span
/// directives; lowering it is enforced by [`ExchangeLevelGate`].
pub struct ExchangeLogLevels {
    handle: reload::Handle<EnvFilter, Registry>,
    base: String,
    levels: Levels,
}

impl fmt::Debug for ExchangeLogLevels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeLogLevels")
            .field("base", &self.base)
            .field("levels", &*self.levels.read())
            .finish()
    }
}

impl LogControl for ExchangeLogLevels {
    fn set_level(&self, exchange: &str, level: LevelFilter) {
        let directives = {
            let mut levels = self.levels.write();
            levels.insert(exchange.to_string(), level);
            directives(&self.base, &levels)
        };

        let applied = EnvFilter::try_new(&directives)
            .map_err(|e| e.to_string())
            .and_then(|filter| self.handle.reload(filter).map_err(|e| e.to_string()));
        match applied {
            Ok(()) => tracing::info!("Log level for {} set to {}", exchange, level),
            Err(e) => warn!("Failed to apply log level {} for {}: {}", level, exchange, e),
        }
    }
}

/// `base` followed by one `[poller{exchange=NAME}]=LEVEL` directive per exchange.
pub fn directives(base: &str, levels: &BTreeMap<String, LevelFilter>) -> String {
    let mut out = base.to_string();
    for (exchange, level) in levels {
        out.push_str(&format!(",[{}{{exchange={}}}]={}", POLLER_SPAN, exchange, level));
    }
    out
}

struct ExchangeTag(String);

#[derive(Default)]
struct ExchangeField(Option<String>);

impl Visit for ExchangeField {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "exchange" {
            self.0 = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "exchange" {
            self.0 = Some(format!("{:?}", value));
        }
    }
}

/// Drops events inside a `poller` span that are more verbose than the level
/// set for that span's exchange.
#[derive(Clone)]
pub struct ExchangeLevelGate {
    levels: Levels,
}

impl<S> Layer<S> for ExchangeLevelGate
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        if attrs.metadata().name() != POLLER_SPAN {
            return;
        }

        let mut field = ExchangeField::default();
        attrs.record(&mut field);
        if let (Some(exchange), Some(span)) = (field.0, ctx.span(id)) {
            span.extensions_mut().insert(ExchangeTag(exchange));
        }
    }

    fn event_enabled(&self, event: &Event<'_>, ctx: Context<'_, S>) -> bool {
        let Some(scope) = ctx.event_scope(event) else {
            return true;
        };

        for span in scope {
            if let Some(tag) = span.extensions().get::<ExchangeTag>() {
                return match self.levels.read().get(&tag.0) {
                    Some(level) => event.metadata().level() <= level,
                    None => true,
                };
            }
        }
        true
    }
}

/// The reloadable base filter, the per-exchange gate and the control handle
/// that drives both.
fn filter_layers(
    base: String,
) -> (reload::Layer<EnvFilter, Registry>, ExchangeLevelGate, Arc<ExchangeLogLevels>) {
    let filter = EnvFilter::try_new(&base).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);
    let levels = Levels::default();

    let gate = ExchangeLevelGate {
        levels: levels.clone(),
    };
    let control = Arc::new(ExchangeLogLevels {
        handle,
        base,
        levels,
    });
    (filter, gate, control)
}

pub fn init_logging(debug: bool, json: bool) -> anyhow::Result<Arc<ExchangeLogLevels>> {
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| if debug { "debug" } else { "info" }.to_string());

    let (filter, gate, control) = filter_layers(base);

    tracing_subscriber::registry()
        .with(filter)
        .with(gate)
        .with(json.then(|| fmt_layer::layer().json()))
        .with((!json).then(fmt_layer::layer))
        .try_init()?;

    Ok(control)
}
