use chrono::Utc;
use data_api::{
    config::config_loader,
    observability,
    startup::{self, AppContext, StartupError},
};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    if let Err(code) = run().await {
        std::process::exit(code);
    }
}

async fn run() -> Result<(), i32> {
    let started_at = Utc::now();

    let dotenvy_env = config_loader::load().map_err(|error| {
        eprintln!("Failed to load configuration: {:#}", error);
        1
    })?;

    let telemetry = observability::init_observability(&dotenvy_env, started_at).map_err(|error| {
        eprintln!("Failed to initialise observability: {:#}", error);
        1
    })?;
    info!("ENV has been loaded");

    let context = AppContext::new(started_at, dotenvy_env, telemetry.clone());

    match startup::run(context).await {
        Ok(()) => {
            telemetry.flush().await;
            Ok(())
        }
        Err(StartupError::Database(error)) => {
            Err(startup::report_fatal_connection_failure(&telemetry, &error).await)
        }
        Err(StartupError::Server(error)) => {
            error!("Server exited with error: {:#}", error);
            telemetry.track_exception(&error);
            telemetry.flush().await;
            Err(1)
        }
    }
}
