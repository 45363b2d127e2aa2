use std::{env, path::Path, str::FromStr};

use anyhow::{Context, Result};

use super::{
    config_model::{Database, DotEnvyConfig, Server, Telemetry},
    stage::Stage,
};

pub const STAGE_VAR: &str = "APP_ENV";
pub const OVERRIDE_FILE: &str = ".env.local";

const DEFAULT_PORT: u16 = 3009;
const DEFAULT_BODY_LIMIT_MB: u64 = 2;
const DEFAULT_DATABASE_NAME: &str = "hackfest";
const DEFAULT_INGESTION_ENDPOINT: &str = "https://dc.services.visualstudio.com/v2/track";

pub fn load() -> Result<DotEnvyConfig> {
    let stage = Stage::from(env::var(STAGE_VAR).ok().as_deref());

    let mut warnings = Vec::new();
    if !stage.is_container() {
        if let Some(warning) = load_override_file(Path::new(OVERRIDE_FILE)) {
            warnings.push(warning);
        }
    }

    let mut config = load_from(|key| env::var(key).ok())?;
    config.warnings.extend(warnings);
    Ok(config)
}

/// Populates the process environment from `path` without overwriting variables
/// that are already set. A missing file is not an error.
pub fn load_override_file(path: &Path) -> Option<String> {
    match dotenvy::from_path(path) {
        Ok(()) => None,
        Err(err) if err.not_found() => None,
        Err(err) => Some(format!(
            "{} could not be loaded; continuing without it ({err})",
            path.display()
        )),
    }
}

pub fn load_from<F>(lookup: F) -> Result<DotEnvyConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let stage = Stage::from(lookup(STAGE_VAR).as_deref());

    let body_limit_mb: u64 = parse_or(&lookup, "SERVER_BODY_LIMIT", DEFAULT_BODY_LIMIT_MB)?;
    let server = Server {
        port: parse_or(&lookup, "SERVER_PORT", DEFAULT_PORT)?,
        body_limit_bytes: mib_to_bytes(body_limit_mb).with_context(|| {
            format!("SERVER_BODY_LIMIT is invalid: {body_limit_mb} MiB is out of range")
        })?,
    };

    let database = Database {
        user: lookup("MONGODB_USER").unwrap_or_default(),
        password: lookup("MONGODB_PASSWORD").unwrap_or_default(),
        name: non_empty(lookup("MONGODB_DATABASE"))
            .unwrap_or_else(|| DEFAULT_DATABASE_NAME.to_string()),
    };

    let telemetry = Telemetry {
        instrumentation_key: non_empty(lookup("APPINSIGHTS_INSTRUMENTATIONKEY")),
        endpoint: non_empty(lookup("APPINSIGHTS_ENDPOINT"))
            .unwrap_or_else(|| DEFAULT_INGESTION_ENDPOINT.to_string()),
        cache_dir: non_empty(lookup("TELEMETRY_CACHE_DIR"))
            .map(Into::into)
            .unwrap_or_else(|| env::temp_dir().join("data-api-telemetry")),
    };

    Ok(DotEnvyConfig {
        stage,
        server,
        database,
        telemetry,
        warnings: Vec::new(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} is invalid")),
        None => Ok(default),
    }
}

fn mib_to_bytes(mib: u64) -> Option<usize> {
    mib.checked_mul(1024 * 1024)
        .and_then(|bytes| usize::try_from(bytes).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn applies_defaults_when_variables_are_missing() {
        let config = load_from(lookup_from(&[])).unwrap();

        assert_eq!(config.stage, Stage::Unset);
        assert_eq!(config.server.port, 3009);
        assert_eq!(config.server.body_limit_bytes, 2 * 1024 * 1024);
        assert_eq!(config.database.user, "");
        assert_eq!(config.database.name, "hackfest");
        assert!(config.telemetry.instrumentation_key.is_none());
        assert_eq!(
            config.telemetry.endpoint,
            "https://dc.services.visualstudio.com/v2/track"
        );
    }

    #[test]
    fn reads_credentials_and_stage() {
        let config = load_from(lookup_from(&[
            ("APP_ENV", "container"),
            ("MONGODB_USER", "hackfest-db"),
            ("MONGODB_PASSWORD", "s3cret"),
            ("APPINSIGHTS_INSTRUMENTATIONKEY", "0000-1111"),
            ("SERVER_PORT", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.stage, Stage::Container);
        assert_eq!(config.database.user, "hackfest-db");
        assert_eq!(config.database.password, "s3cret");
        assert_eq!(config.telemetry.instrumentation_key.as_deref(), Some("0000-1111"));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn rejects_invalid_numbers() {
        let err = load_from(lookup_from(&[("SERVER_PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT is invalid"));
    }

    #[test]
    fn rejects_body_limit_that_overflows_bytes() {
        let err = load_from(lookup_from(&[("SERVER_BODY_LIMIT", "18446744073709551615")]))
            .unwrap_err();
        assert!(err.to_string().contains("SERVER_BODY_LIMIT is invalid"));

        let config = load_from(lookup_from(&[("SERVER_BODY_LIMIT", "8")])).unwrap();
        assert_eq!(config.server.body_limit_bytes, 8 * 1024 * 1024);
    }

    #[test]
    fn missing_override_file_is_silently_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_override_file(&dir.path().join(".env.local")).is_none());
    }

    #[test]
    fn override_file_does_not_replace_existing_variables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env.local");
        std::fs::write(
            &path,
            "DATA_API_TEST_OVERRIDE_NEW=from-file\nDATA_API_TEST_OVERRIDE_KEPT=from-file\n",
        )
        .unwrap();
        unsafe {
            env::set_var("DATA_API_TEST_OVERRIDE_KEPT", "from-env");
        }

        assert!(load_override_file(&path).is_none());

        assert_eq!(env::var("DATA_API_TEST_OVERRIDE_NEW").unwrap(), "from-file");
        assert_eq!(env::var("DATA_API_TEST_OVERRIDE_KEPT").unwrap(), "from-env");
    }
}
