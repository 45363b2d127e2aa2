use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::client::TelemetryClient;
use super::envelope::{Properties, SeverityLevel};

/// Targets whose events are never forwarded. The telemetry module itself logs
/// from inside the delivery path, and the HTTP client stack logs while sending.
const EXCLUDED_TARGETS: &[&str] = &[
    "data_api::observability",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
];

/// Forwards INFO-and-above log events to telemetry as trace messages.
#[derive(Clone)]
pub(crate) struct ConsoleForwardLayer {
    client: TelemetryClient,
}

impl ConsoleForwardLayer {
    pub(crate) fn new(client: TelemetryClient) -> Self {
        Self { client }
    }
}

#[derive(Default)]
struct FieldMapVisitor {
    message: Option<String>,
    values: Properties,
}

impl Visit for FieldMapVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
            return;
        }
        self.values
            .insert(field.name().to_string(), redact(field.name(), format!("{value:?}")));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
            return;
        }
        self.values
            .insert(field.name().to_string(), redact(field.name(), value.to_string()));
    }
}

impl<S> Layer<S> for ConsoleForwardLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::INFO || is_excluded(metadata.target()) {
            return;
        }

        let mut visitor = FieldMapVisitor::default();
        event.record(&mut visitor);

        let Some(message) = visitor.message.filter(|m| !m.trim().is_empty()) else {
            return;
        };

        let mut properties = visitor.values;
        properties.insert("target".to_string(), metadata.target().to_string());

        self.client
            .track_trace(message, severity_of(metadata.level()), properties);
    }
}

fn is_excluded(target: &str) -> bool {
    EXCLUDED_TARGETS
        .iter()
        .any(|excluded| target == *excluded || target.starts_with(&format!("{excluded}::")))
}

fn severity_of(level: &Level) -> SeverityLevel {
    match *level {
        Level::ERROR => SeverityLevel::Error,
        Level::WARN => SeverityLevel::Warning,
        Level::INFO => SeverityLevel::Information,
        _ => SeverityLevel::Verbose,
    }
}

fn redact(field_name: &str, value: String) -> String {
    let field = field_name.to_ascii_lowercase();
    if field.contains("secret") || field.contains("password") || field.contains("key") {
        return "[REDACTED]".to_string();
    }
    value
}
