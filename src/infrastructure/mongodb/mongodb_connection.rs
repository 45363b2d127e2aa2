use std::{
    sync::{Arc, OnceLock},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use mongodb::{
    Client, Database,
    bson::doc,
    options::{ClientOptions, Credential},
};
use tracing::info;

use crate::{
    config::config_model::Database as DatabaseConfig,
    observability::{
        SERVICE_NAME,
        client::{DependencyTelemetry, TelemetryClient},
        envelope::Properties,
    },
};

pub const HOST_SUFFIX: &str = "documents.azure.com";
pub const PORT: u16 = 10255;
pub const CONNECTED_EVENT: &str = "MongoConnSuccess";

const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials are percent-encoded in the userinfo; the account name is used
/// verbatim as the host label.
pub fn connection_uri(user: &str, password: &str, database: &str) -> String {
    format!(
        "mongodb://{}:{}@{user}.{HOST_SUFFIX}:{PORT}/{database}?ssl=true",
        encode_userinfo(user),
        encode_userinfo(password),
    )
}

fn encode_userinfo(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

pub fn connection_target(user: &str) -> String {
    format!("{user}.{HOST_SUFFIX}:{PORT}")
}

/// Write-once holder for the connected database handle. Empty until the
/// startup connection attempt succeeds.
#[derive(Clone, Default)]
pub struct DatabaseSlot(Arc<OnceLock<Database>>);

impl DatabaseSlot {
    /// Returns false when the slot was already filled.
    pub fn fill(&self, database: Database) -> bool {
        self.0.set(database).is_ok()
    }

    pub fn get(&self) -> Option<&Database> {
        self.0.get()
    }

    pub fn is_filled(&self) -> bool {
        self.0.get().is_some()
    }
}

/// Single connection attempt: parse, authenticate, ping. No retries.
pub async fn establish_connection(
    config: &DatabaseConfig,
    telemetry: &TelemetryClient,
) -> Result<Database> {
    let started = Instant::now();
    let result = connect(config).await;

    record_attempt(
        telemetry,
        connection_target(&config.user),
        started.elapsed(),
        result,
    )
}

/// Reports one connection attempt: a dependency item always, plus the success
/// event and log line when it worked.
fn record_attempt<T>(
    telemetry: &TelemetryClient,
    target: String,
    elapsed: Duration,
    result: Result<T>,
) -> Result<T> {
    telemetry.track_dependency(DependencyTelemetry {
        dependency_type: "mongodb".to_string(),
        target,
        name: "connect".to_string(),
        data: "ping".to_string(),
        duration: elapsed,
        success: result.is_ok(),
        result_code: if result.is_ok() { "0" } else { "1" }.to_string(),
    });

    let connected = result?;

    telemetry.track_event(CONNECTED_EVENT, Properties::new());
    info!("connection success with CosmosDB");

    Ok(connected)
}

async fn connect(config: &DatabaseConfig) -> Result<Database> {
    let uri = connection_uri(&config.user, &config.password, &config.name);

    let mut options = ClientOptions::parse(&uri)
        .await
        .context("connection string is malformed")?;
    options.credential = Some(
        Credential::builder()
            .username(config.user.clone())
            .password(config.password.clone())
            .build(),
    );
    options.app_name = Some(SERVICE_NAME.to_string());
    options.server_selection_timeout = Some(SERVER_SELECTION_TIMEOUT);

    let client = Client::with_options(options)?;
    let database = client.database(&config.name);
    database
        .run_command(doc! { "ping": 1 })
        .await
        .context("database did not answer ping")?;

    Ok(database)
}
