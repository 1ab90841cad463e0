use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::level_filters::LevelFilter;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Collects event fields as JSON attributes.
#[derive(Default)]
struct AttributeVisitor {
    attributes: Map<String, Value>,
}

impl Visit for AttributeVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.attributes.insert(field.name().to_string(), value.into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.attributes
            .insert(field.name().to_string(), format!("{:?}", value).into());
    }
}

/// One JSON object per line in the OpenTelemetry log data model layout.
/// `event_name`/`event_domain` fields are promoted to `event.name`/`event.domain`.
#[derive(Clone)]
struct OtelJsonFormatter {
    service_name: String,
    service_version: String,
}

fn severity_number(level: &Level) -> u64 {
    match *level {
        Level::TRACE => 1,
        Level::DEBUG => 5,
        Level::INFO => 9,
        Level::WARN => 13,
        Level::ERROR => 17,
    }
}

impl<S, N> FormatEvent<S, N> for OtelJsonFormatter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
    N: for<'writer> FormatFields<'writer> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();
        let mut visitor = AttributeVisitor::default();
        event.record(&mut visitor);
        let mut attributes = visitor.attributes;

        for (from, to) in [("event_name", "event.name"), ("event_domain", "event.domain")] {
            if let Some(v) = attributes.remove(from) {
                attributes.insert(to.to_string(), v);
            }
        }
        attributes.insert("code.target".to_string(), metadata.target().into());
        if let Some(file) = metadata.file() {
            attributes.insert("code.filepath".to_string(), file.into());
        }
        if let Some(line) = metadata.line() {
            attributes.insert("code.lineno".to_string(), line.into());
        }

        let body = match attributes.remove("message") {
            Some(Value::String(s)) => s,
            _ => metadata.name().to_string(),
        };

        let record = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "severity_text": metadata.level().as_str(),
            "severity_number": severity_number(metadata.level()),
            "body": body,
            "resource": {
                "service.name": self.service_name,
                "service.version": self.service_version,
            },
            "attributes": attributes,
        });
        let line = serde_json::to_string(&record).map_err(|_| std::fmt::Error)?;
        writeln!(writer, "{}", line)
    }
}

/// Parse `logging.level`.
pub fn parse_level(level: &str) -> Result<LevelFilter, String> {
    match level.trim().to_lowercase().as_str() {
        "trace" => Ok(LevelFilter::TRACE),
        "debug" => Ok(LevelFilter::DEBUG),
        "info" => Ok(LevelFilter::INFO),
        "warn" => Ok(LevelFilter::WARN),
        "error" => Ok(LevelFilter::ERROR),
        other => Err(format!(
            "Invalid logging.level '{}'. Valid values: trace, debug, info, warn, error",
            other
        )),
    }
}

/// Install the global subscriber. `RUST_LOG` directives, when set, are added on top
/// of the configured level. `log` records (reqwest, hyper) are bridged into tracing.
pub fn init_logging(logging_config: &LoggingConfig) -> Result<(), String> {
    let level = parse_level(&logging_config.level)?;

    let mut filter = EnvFilter::default().add_directive(level.into());
    if let Ok(env) = std::env::var("RUST_LOG") {
        for directive in env.split(',').filter_map(|d| d.parse::<Directive>().ok()) {
            filter = filter.add_directive(directive);
        }
    }

    let registry = tracing_subscriber::registry().with(filter);
    let result = match logging_config.format.to_lowercase().as_str() {
        "json" => tracing::subscriber::set_global_default(registry.with(
            fmt::layer().event_format(OtelJsonFormatter {
                service_name: logging_config.service_name.clone(),
                service_version: logging_config.service_version.clone(),
            }),
        )),
        // "console" and anything unknown
        _ => tracing::subscriber::set_global_default(registry.with(fmt::layer().pretty())),
    };
    result.map_err(|e| format!("Error installing log subscriber: {}", e))?;

    // Bridge `log` records into tracing. An embedding application may already
    // have installed a logger, which is fine.
    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge not installed: {}", e);
    }
    Ok(())
}
