use std::path::PathBuf;

use super::stage::Stage;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub stage: Stage,
    pub server: Server,
    pub database: Database,
    pub telemetry: Telemetry,
    /// Warnings captured while loading so they can be logged once tracing is initialized.
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    /// Request body cap in bytes, configured in MiB.
    pub body_limit_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub user: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    pub instrumentation_key: Option<String>,
    pub endpoint: String,
    pub cache_dir: PathBuf,
}
