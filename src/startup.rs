//! Startup sequence: the HTTP listener and the single database connection
//! attempt run side by side. Requests other than `/status` are refused with
//! 503 until the attempt succeeds; a failed attempt ends `run` with
//! [`StartupError::Database`] so `main` can flush telemetry and exit.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use mongodb::Database;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{
    config::config_model::DotEnvyConfig,
    infrastructure::{
        axum_http::http_serve,
        mongodb::{
            mongodb_connection::{self, DatabaseSlot},
            repositories::datasets::DatasetMongo,
        },
    },
    observability::client::TelemetryClient,
};

/// Exit status used when the database cannot be reached at startup.
pub const FATAL_EXIT_CODE: i32 = -1;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("database connection failed: {0:#}")]
    Database(anyhow::Error),

    #[error("http server failed: {0:#}")]
    Server(anyhow::Error),
}

/// Flips once from not-ready to ready when the database handle is available.
#[derive(Debug, Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Everything request handling needs, built once at process start.
#[derive(Clone)]
pub struct AppContext {
    pub started_at: DateTime<Utc>,
    pub config: Arc<DotEnvyConfig>,
    pub telemetry: TelemetryClient,
    pub database: DatabaseSlot,
    pub readiness: Readiness,
}

impl AppContext {
    pub fn new(
        started_at: DateTime<Utc>,
        config: DotEnvyConfig,
        telemetry: TelemetryClient,
    ) -> Self {
        Self {
            started_at,
            config: Arc::new(config),
            telemetry,
            database: DatabaseSlot::default(),
            readiness: Readiness::default(),
        }
    }
}

/// Serves until shutdown, or until the startup connection attempt fails.
pub async fn run(context: AppContext) -> Result<(), StartupError> {
    let listener = http_serve::bind(context.config.server.port)
        .await
        .map_err(StartupError::Server)?;

    let connect = mongodb_connection::establish_connection(
        &context.config.database,
        &context.telemetry,
    );

    serve_while_connecting(&context, listener, connect).await
}

/// Serves on `listener` while `connect` is in flight. Traffic other than
/// `/status` is refused until it resolves; a failed attempt ends serving.
pub async fn serve_while_connecting<F>(
    context: &AppContext,
    listener: TcpListener,
    connect: F,
) -> Result<(), StartupError>
where
    F: Future<Output = anyhow::Result<Database>>,
{
    let repository = Arc::new(DatasetMongo::new(
        context.database.clone(),
        context.telemetry.clone(),
    ));
    let app = http_serve::build_app(context, repository).map_err(StartupError::Server)?;

    tokio::select! {
        served = http_serve::serve(listener, app) => served.map_err(StartupError::Server),
        error = supervise_connection(context, connect) => Err(StartupError::Database(error)),
    }
}

/// Awaits the connection attempt. On success the handle is published and the
/// readiness gate opens, after which this future never resolves. On failure the
/// error is returned.
pub async fn supervise_connection<F>(context: &AppContext, connect: F) -> anyhow::Error
where
    F: Future<Output = anyhow::Result<Database>>,
{
    match connect.await {
        Ok(database) => {
            if !context.database.fill(database) {
                debug!("database slot was already filled");
            }
            context.readiness.mark_ready();
            info!("Database connection has been established; accepting traffic");
            std::future::pending().await
        }
        Err(error) => error,
    }
}

/// Reports the failed connection, waits for telemetry to drain and returns the
/// exit status for the process.
pub async fn report_fatal_connection_failure(
    telemetry: &TelemetryClient,
    error: &anyhow::Error,
) -> i32 {
    telemetry.track_exception(error);
    error!("CosmosDB connection failed with error: {:#}", error);

    let outcome = telemetry.flush().await;
    debug!(?outcome, "Telemetry flushed before exit");

    FATAL_EXIT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::config_loader::load_from;
    use crate::observability::{
        envelope::TelemetryData, options::TelemetryOptions, testing::recording_client,
    };
    use anyhow::anyhow;
    use std::time::Duration;

    fn context_with(telemetry: TelemetryClient) -> AppContext {
        AppContext::new(Utc::now(), load_from(|_| None).unwrap(), telemetry)
    }

    #[tokio::test]
    async fn failed_connection_is_returned_and_gate_stays_closed() {
        let (telemetry, _sink, _dir) = recording_client(TelemetryOptions::default());
        let context = context_with(telemetry);

        let error =
            supervise_connection(&context, async { Err(anyhow!("authentication failed")) }).await;

        assert_eq!(error.to_string(), "authentication failed");
        assert!(!context.readiness.is_ready());
        assert!(!context.database.is_filled());
    }

    #[tokio::test]
    async fn successful_connection_opens_gate_and_keeps_running() {
        let (telemetry, _sink, _dir) = recording_client(TelemetryOptions::default());
        let context = context_with(telemetry);
        let database = mongodb::Client::with_uri_str("mongodb://127.0.0.1:27017")
            .await
            .unwrap()
            .database("hackfest");

        let supervised = supervise_connection(&context, async { Ok(database) });
        let finished = tokio::time::timeout(Duration::from_millis(50), supervised).await;

        assert!(finished.is_err(), "supervisor must not resolve after success");
        assert!(context.readiness.is_ready());
        assert!(context.database.is_filled());
    }

    #[tokio::test]
    async fn failed_connection_stops_the_running_server() {
        let (telemetry, _sink, _dir) = recording_client(TelemetryOptions::default());
        let context = context_with(telemetry);
        let listener = http_serve::bind(0).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (fail_tx, fail_rx) = tokio::sync::oneshot::channel::<()>();
        let server_context = context.clone();
        let server = tokio::spawn(async move {
            serve_while_connecting(&server_context, listener, async move {
                let _ = fail_rx.await;
                Err(anyhow!("authentication failed"))
            })
            .await
        });

        let http = reqwest::Client::new();
        let refused = http
            .get(format!("http://{addr}/get/flights/latest"))
            .send()
            .await
            .unwrap();
        assert_eq!(refused.status().as_u16(), 503);

        let status = http
            .get(format!("http://{addr}/status"))
            .send()
            .await
            .unwrap();
        assert_eq!(status.status().as_u16(), 200);
        let body: serde_json::Value = status.json().await.unwrap();
        assert_eq!(body["payload"]["database"], "pending");

        fail_tx.send(()).unwrap();
        let outcome = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server must stop after the connection fails")
            .unwrap();

        match outcome {
            Err(StartupError::Database(error)) => {
                assert_eq!(error.to_string(), "authentication failed")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(!context.readiness.is_ready());
    }

    #[tokio::test]
    async fn fatal_failure_tracks_one_exception_and_flushes() {
        let (telemetry, sink, _dir) = recording_client(TelemetryOptions::default());

        let code =
            report_fatal_connection_failure(&telemetry, &anyhow!("server selection timeout"))
                .await;

        assert_eq!(code, FATAL_EXIT_CODE);
        let exceptions = sink.delivered_of("Exception");
        assert_eq!(exceptions.len(), 1);
        match &exceptions[0] {
            TelemetryData::ExceptionData(exception) => {
                assert_eq!(exception.exceptions[0].message, "server selection timeout");
            }
            other => panic!("unexpected telemetry: {other:?}"),
        }
        assert!(sink.delivered_of("Event").is_empty());
    }
}
