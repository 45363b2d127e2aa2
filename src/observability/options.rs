use std::{path::PathBuf, time::Duration};

use url::Url;

use super::envelope::Properties;

/// Feature switches of the telemetry client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryOptions {
    pub auto_dependency_correlation: bool,
    pub auto_collect_requests: bool,
    pub auto_collect_performance: bool,
    pub auto_collect_exceptions: bool,
    pub auto_collect_dependencies: bool,
    pub auto_collect_console: bool,
    pub use_disk_retry_caching: bool,
    /// Items buffered before a send is forced. 1 sends every item immediately.
    pub max_batch_size: usize,
    pub batch_interval: Duration,
    pub performance_interval: Duration,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            auto_dependency_correlation: false,
            auto_collect_requests: true,
            auto_collect_performance: true,
            auto_collect_exceptions: true,
            auto_collect_dependencies: true,
            auto_collect_console: true,
            use_disk_retry_caching: true,
            max_batch_size: 1,
            batch_interval: Duration::from_secs(15),
            performance_interval: Duration::from_secs(60),
        }
    }
}

/// Properties attached to every telemetry item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonProperties {
    pub env_name: String,
    pub env_type: String,
}

impl CommonProperties {
    pub fn new(env_type: impl Into<String>) -> Self {
        Self {
            env_name: "container".to_string(),
            env_type: env_type.into(),
        }
    }

    pub(crate) fn merge_into(&self, properties: &mut Properties) {
        properties
            .entry("EnvName".to_string())
            .or_insert_with(|| self.env_name.clone());
        properties
            .entry("EnvType".to_string())
            .or_insert_with(|| self.env_type.clone());
    }
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub instrumentation_key: String,
    pub role_name: String,
    pub endpoint: Url,
    pub cache_dir: PathBuf,
    pub options: TelemetryOptions,
    pub common_properties: CommonProperties,
}
