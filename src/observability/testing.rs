use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{
    client::TelemetryClient,
    envelope::{Envelope, TelemetryData},
    options::{CommonProperties, TelemetryOptions, TelemetrySettings},
    sink::TelemetrySink,
};

/// In-memory sink that records every delivered envelope.
#[derive(Clone, Default)]
pub(crate) struct RecordingSink {
    delivered: Arc<Mutex<Vec<Envelope>>>,
    attempts: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl RecordingSink {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn delivered(&self) -> Vec<Envelope> {
        self.delivered.lock().unwrap().clone()
    }

    pub(crate) fn delivered_of(&self, kind: &str) -> Vec<TelemetryData> {
        self.delivered()
            .into_iter()
            .map(|envelope| envelope.data)
            .filter(|data| data.kind() == kind)
            .collect()
    }
}

#[async_trait]
impl TelemetrySink for RecordingSink {
    async fn send(&self, batch: &[Envelope]) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            bail!("sink unavailable");
        }
        self.delivered.lock().unwrap().extend_from_slice(batch);
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "recording"
    }
}

/// Enabled client wired to a [`RecordingSink`], caching into a fresh temp dir.
pub(crate) fn recording_client(
    options: TelemetryOptions,
) -> (TelemetryClient, RecordingSink, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let sink = RecordingSink::default();
    let settings = TelemetrySettings {
        instrumentation_key: "00000000-0000-0000-0000-000000000000".to_string(),
        role_name: "data-api".to_string(),
        endpoint: "http://127.0.0.1:9/v2/track".parse().unwrap(),
        cache_dir: dir.path().to_path_buf(),
        options,
        common_properties: CommonProperties::new("development"),
    };
    let client = TelemetryClient::start(settings, Arc::new(sink.clone()));
    (client, sink, dir)
}
