pub mod client;
pub mod disk_cache;
pub mod envelope;
mod layer;
pub mod options;
pub mod performance;
pub mod sink;
#[cfg(test)]
pub(crate) mod testing;

use std::{any::Any, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use url::Url;

use crate::config::config_model::DotEnvyConfig;
use client::TelemetryClient;
use envelope::ExceptionDetails;
use layer::ConsoleForwardLayer;
use options::{CommonProperties, TelemetryOptions, TelemetrySettings};
use sink::IngestionSink;

pub const SERVICE_NAME: &str = "data-api";

/// Builds the telemetry client, then the tracing subscriber that also forwards
/// console output to it, then the panic hook and performance collector.
pub fn init_observability(
    config: &DotEnvyConfig,
    started_at: DateTime<Utc>,
) -> Result<TelemetryClient> {
    let options = TelemetryOptions::default();
    let client = build_telemetry_client(config, options.clone())?;

    let console_layer = (client.is_enabled() && options.auto_collect_console)
        .then(|| ConsoleForwardLayer::new(client.clone()));

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(console_layer)
        .with(env_filter)
        .try_init()?;

    for warning in &config.warnings {
        warn!(
            service = SERVICE_NAME,
            environment = %config.stage,
            warning = %warning,
            "Configuration warning"
        );
    }

    if !client.is_enabled() {
        warn!(
            service = SERVICE_NAME,
            environment = %config.stage,
            "APPINSIGHTS_INSTRUMENTATIONKEY is not set; telemetry disabled"
        );
        return Ok(client);
    }

    info!(
        service = SERVICE_NAME,
        environment = %config.stage,
        endpoint = %config.telemetry.endpoint,
        "Telemetry client enabled"
    );

    if options.auto_collect_exceptions {
        install_panic_hook(client.clone());
    }
    if options.auto_collect_performance {
        performance::spawn_collector(client.clone(), started_at, options.performance_interval);
    }

    Ok(client)
}

pub fn build_telemetry_client(
    config: &DotEnvyConfig,
    options: TelemetryOptions,
) -> Result<TelemetryClient> {
    let common_properties = CommonProperties::new(config.stage.as_str());

    let Some(instrumentation_key) = config.telemetry.instrumentation_key.clone() else {
        return Ok(TelemetryClient::disabled(options, common_properties));
    };

    let endpoint =
        Url::parse(&config.telemetry.endpoint).context("APPINSIGHTS_ENDPOINT is invalid")?;
    let sink = IngestionSink::new(endpoint.clone())?;

    let settings = TelemetrySettings {
        instrumentation_key,
        role_name: SERVICE_NAME.to_string(),
        endpoint,
        cache_dir: config.telemetry.cache_dir.clone(),
        options,
        common_properties,
    };

    Ok(TelemetryClient::start(settings, Arc::new(sink)))
}

fn install_panic_hook(client: TelemetryClient) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        client.track_exception_details(ExceptionDetails {
            type_name: "Panic".to_string(),
            message: panic_message(info.payload()),
            has_full_stack: false,
            stack: info
                .location()
                .map(|location| format!("at {}:{}", location.file(), location.line())),
        });
        previous(info);
    }));
}

pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_loader::load_from;

    #[tokio::test]
    async fn missing_instrumentation_key_yields_disabled_client() {
        let config = load_from(|_| None).unwrap();
        let client = build_telemetry_client(&config, TelemetryOptions::default()).unwrap();
        assert!(!client.is_enabled());
        assert_eq!(client.common_properties().env_type, "");
    }

    #[tokio::test]
    async fn instrumentation_key_enables_client_with_stage_properties() {
        let config = load_from(|key| match key {
            "APPINSIGHTS_INSTRUMENTATIONKEY" => Some("abc".to_string()),
            "APP_ENV" => Some("container".to_string()),
            _ => None,
        })
        .unwrap();
        let client = build_telemetry_client(&config, TelemetryOptions::default()).unwrap();

        assert!(client.is_enabled());
        assert_eq!(client.common_properties().env_name, "container");
        assert_eq!(client.common_properties().env_type, "container");
        assert_eq!(client.options().max_batch_size, 1);
    }

    #[test]
    fn extracts_panic_messages() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
