use std::{collections::BTreeMap, sync::Arc, time::Duration};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    disk_cache::DiskRetryCache,
    envelope::{
        Envelope, EventData, ExceptionData, ExceptionDetails, MessageData, MetricData,
        Properties, RemoteDependencyData, RequestData, SeverityLevel, TelemetryData,
        format_duration, schema_version,
    },
    options::{CommonProperties, TelemetryOptions, TelemetrySettings},
    performance::PerformanceCounters,
    sink::TelemetrySink,
};

const QUEUE_CAPACITY: usize = 1024;

/// What a flush did with the items that were still buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    Delivered(usize),
    Cached(usize),
    Dropped(usize),
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RequestTelemetry {
    pub method: String,
    pub path: String,
    pub url: String,
    pub status: u16,
    pub duration: Duration,
    pub operation_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DependencyTelemetry {
    pub dependency_type: String,
    pub target: String,
    pub name: String,
    pub data: String,
    pub duration: Duration,
    pub success: bool,
    pub result_code: String,
}

enum Command {
    Track(Box<Envelope>),
    Flush(oneshot::Sender<FlushOutcome>),
}

/// Shared handle to the telemetry pipeline. Cloning is cheap.
#[derive(Clone)]
pub struct TelemetryClient {
    shared: Arc<Shared>,
}

struct Shared {
    tx: Option<mpsc::Sender<Command>>,
    instrumentation_key: String,
    role_name: String,
    options: TelemetryOptions,
    common_properties: CommonProperties,
    counters: PerformanceCounters,
}

impl TelemetryClient {
    /// Spawns the delivery task; must be called inside a tokio runtime.
    pub fn start(settings: TelemetrySettings, sink: Arc<dyn TelemetrySink>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);

        let cache = settings
            .options
            .use_disk_retry_caching
            .then(|| DiskRetryCache::new(settings.cache_dir.clone()));

        let worker = Worker {
            sink,
            cache,
            buffer: Vec::new(),
            max_batch_size: settings.options.max_batch_size.max(1),
        };
        tokio::spawn(worker.run(rx, settings.options.batch_interval));

        Self {
            shared: Arc::new(Shared {
                tx: Some(tx),
                instrumentation_key: settings.instrumentation_key,
                role_name: settings.role_name,
                options: settings.options,
                common_properties: settings.common_properties,
                counters: PerformanceCounters::default(),
            }),
        }
    }

    /// A client that accepts every call and sends nothing.
    pub fn disabled(options: TelemetryOptions, common_properties: CommonProperties) -> Self {
        Self {
            shared: Arc::new(Shared {
                tx: None,
                instrumentation_key: String::new(),
                role_name: String::new(),
                options,
                common_properties,
                counters: PerformanceCounters::default(),
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.tx.is_some()
    }

    pub fn options(&self) -> &TelemetryOptions {
        &self.shared.options
    }

    pub fn common_properties(&self) -> &CommonProperties {
        &self.shared.common_properties
    }

    pub fn counters(&self) -> &PerformanceCounters {
        &self.shared.counters
    }

    pub fn track_event(&self, name: &str, properties: Properties) {
        self.track(
            TelemetryData::EventData(EventData::new(name, properties)),
            BTreeMap::new(),
        );
    }

    pub fn track_exception(&self, error: &anyhow::Error) {
        self.track_exception_details(ExceptionDetails {
            type_name: "Error".to_string(),
            message: error.to_string(),
            has_full_stack: false,
            stack: Some(format!("{error:?}")),
        });
    }

    pub fn track_exception_details(&self, details: ExceptionDetails) {
        self.track(
            TelemetryData::ExceptionData(ExceptionData::new(details, Properties::new())),
            BTreeMap::new(),
        );
    }

    pub fn track_request(&self, request: RequestTelemetry) {
        let name = format!("{} {}", request.method, request.path);

        let mut tags = BTreeMap::new();
        tags.insert("ai.operation.name".to_string(), name.clone());
        if let Some(operation_id) = &request.operation_id {
            tags.insert("ai.operation.id".to_string(), operation_id.clone());
        }

        let data = RequestData {
            ver: schema_version(),
            id: Uuid::new_v4().to_string(),
            name,
            duration: format_duration(request.duration),
            response_code: request.status.to_string(),
            success: request.status < 400,
            url: request.url,
            properties: Properties::new(),
        };
        self.track(TelemetryData::RequestData(data), tags);
    }

    /// Dropped when dependency collection is switched off.
    pub fn track_dependency(&self, dependency: DependencyTelemetry) {
        if !self.shared.options.auto_collect_dependencies {
            return;
        }

        let data = RemoteDependencyData {
            ver: schema_version(),
            id: Uuid::new_v4().to_string(),
            name: dependency.name,
            result_code: dependency.result_code,
            duration: format_duration(dependency.duration),
            success: dependency.success,
            data: dependency.data,
            target: dependency.target,
            dependency_type: dependency.dependency_type,
            properties: Properties::new(),
        };
        self.track(TelemetryData::RemoteDependencyData(data), BTreeMap::new());
    }

    pub fn track_trace(&self, message: String, severity: SeverityLevel, properties: Properties) {
        self.track(
            TelemetryData::MessageData(MessageData::new(message, severity, properties)),
            BTreeMap::new(),
        );
    }

    pub fn track_metric(&self, name: &str, value: f64) {
        self.track(
            TelemetryData::MetricData(MetricData::single(name, value)),
            BTreeMap::new(),
        );
    }

    /// Resolves once every item tracked before this call has been handed to the sink
    /// or written to the disk cache.
    pub async fn flush(&self) -> FlushOutcome {
        let Some(tx) = &self.shared.tx else {
            return FlushOutcome::Disabled;
        };

        let (done_tx, done_rx) = oneshot::channel();
        if tx.send(Command::Flush(done_tx)).await.is_err() {
            return FlushOutcome::Dropped(0);
        }
        done_rx.await.unwrap_or(FlushOutcome::Dropped(0))
    }

    fn track(&self, mut data: TelemetryData, mut tags: BTreeMap<String, String>) {
        let Some(tx) = &self.shared.tx else {
            return;
        };

        self.shared
            .common_properties
            .merge_into(data.properties_mut());
        tags.insert("ai.cloud.role".to_string(), self.shared.role_name.clone());

        let envelope = Envelope::new(&self.shared.instrumentation_key, tags, data);
        match tx.try_send(Command::Track(Box::new(envelope))) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Telemetry queue full; dropping item");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Telemetry queue closed; dropping item");
            }
        }
    }
}

struct Worker {
    sink: Arc<dyn TelemetrySink>,
    cache: Option<DiskRetryCache>,
    buffer: Vec<Envelope>,
    max_batch_size: usize,
}

impl Worker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, batch_interval: Duration) {
        let mut ticker = tokio::time::interval(batch_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Track(envelope)) => {
                        self.buffer.push(*envelope);
                        if self.buffer.len() >= self.max_batch_size {
                            self.deliver().await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        let outcome = self.deliver().await;
                        let _ = done.send(outcome);
                    }
                    None => {
                        self.deliver().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    if !self.buffer.is_empty() {
                        self.deliver().await;
                    }
                }
            }
        }
    }

    async fn deliver(&mut self) -> FlushOutcome {
        if self.buffer.is_empty() {
            return FlushOutcome::Delivered(0);
        }

        let batch = std::mem::take(&mut self.buffer);
        let items = batch.len();

        match self.sink.send(&batch).await {
            Ok(()) => {
                debug!(sink = self.sink.sink_name(), items, "Telemetry batch delivered");
                self.replay_cached().await;
                FlushOutcome::Delivered(items)
            }
            Err(error) => {
                warn!(
                    sink = self.sink.sink_name(),
                    items,
                    error = %error,
                    "Telemetry send failed"
                );
                let Some(cache) = &self.cache else {
                    return FlushOutcome::Dropped(items);
                };
                match cache.store(&batch).await {
                    Ok(path) => {
                        debug!(path = %path.display(), items, "Telemetry batch cached to disk");
                        FlushOutcome::Cached(items)
                    }
                    Err(error) => {
                        warn!(error = %error, items, "Telemetry disk cache write failed; dropping batch");
                        FlushOutcome::Dropped(items)
                    }
                }
            }
        }
    }

    async fn replay_cached(&self) {
        let Some(cache) = &self.cache else {
            return;
        };

        let pending = match cache.pending().await {
            Ok(pending) => pending,
            Err(error) => {
                warn!(error = %error, "Telemetry disk cache unreadable");
                return;
            }
        };

        for path in pending {
            let batch = match cache.load(&path).await {
                Ok(batch) => batch,
                Err(error) => {
                    warn!(path = %path.display(), error = %error, "Discarding corrupt telemetry cache file");
                    cache.remove(&path).await.ok();
                    continue;
                }
            };

            if self.sink.send(&batch).await.is_err() {
                // sink went away again; keep the rest for the next success
                return;
            }
            if let Err(error) = cache.remove(&path).await {
                warn!(path = %path.display(), error = %error, "Failed to remove replayed telemetry cache file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::testing::recording_client;

    #[tokio::test]
    async fn sends_each_item_immediately_with_common_properties() {
        let (client, sink, _dir) = recording_client(TelemetryOptions::default());

        client.track_event("MongoConnSuccess", Properties::new());
        assert_eq!(client.flush().await, FlushOutcome::Delivered(0));

        let delivered = sink.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(sink.attempts(), 1);
        assert_eq!(
            delivered[0].tags.get("ai.cloud.role").map(String::as_str),
            Some("data-api")
        );
        match &delivered[0].data {
            TelemetryData::EventData(event) => {
                assert_eq!(event.name, "MongoConnSuccess");
                assert_eq!(event.properties["EnvName"], "container");
                assert_eq!(event.properties["EnvType"], "development");
            }
            other => panic!("unexpected telemetry: {other:?}"),
        }
    }

    #[tokio::test]
    async fn larger_batches_wait_for_flush() {
        let options = TelemetryOptions {
            max_batch_size: 10,
            ..TelemetryOptions::default()
        };
        let (client, sink, _dir) = recording_client(options);

        client.track_metric("a", 1.0);
        client.track_metric("b", 2.0);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sink.attempts(), 0);

        assert_eq!(client.flush().await, FlushOutcome::Delivered(2));
        assert_eq!(sink.attempts(), 1);
        assert_eq!(sink.delivered().len(), 2);
    }

    #[tokio::test]
    async fn failed_batches_are_cached_then_replayed() {
        let options = TelemetryOptions {
            max_batch_size: 10,
            ..TelemetryOptions::default()
        };
        let (client, sink, dir) = recording_client(options);
        let cache = DiskRetryCache::new(dir.path());

        sink.set_failing(true);
        client.track_event("lost-for-now", Properties::new());
        assert_eq!(client.flush().await, FlushOutcome::Cached(1));
        assert_eq!(cache.pending().await.unwrap().len(), 1);

        sink.set_failing(false);
        client.track_event("fresh", Properties::new());
        assert_eq!(client.flush().await, FlushOutcome::Delivered(1));

        assert_eq!(sink.delivered_of("Event").len(), 2);
        assert!(cache.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_batches_are_dropped_without_disk_cache() {
        let options = TelemetryOptions {
            max_batch_size: 10,
            use_disk_retry_caching: false,
            ..TelemetryOptions::default()
        };
        let (client, sink, _dir) = recording_client(options);

        sink.set_failing(true);
        client.track_event("gone", Properties::new());
        assert_eq!(client.flush().await, FlushOutcome::Dropped(1));
    }

    #[tokio::test]
    async fn dependency_collection_can_be_switched_off() {
        let options = TelemetryOptions {
            auto_collect_dependencies: false,
            ..TelemetryOptions::default()
        };
        let (client, sink, _dir) = recording_client(options);

        client.track_dependency(DependencyTelemetry {
            dependency_type: "mongodb".to_string(),
            target: "db".to_string(),
            name: "ping".to_string(),
            data: "ping".to_string(),
            duration: Duration::from_millis(1),
            success: true,
            result_code: "0".to_string(),
        });
        client.flush().await;

        assert!(sink.delivered().is_empty());
    }

    #[tokio::test]
    async fn disabled_client_flushes_immediately() {
        let client = TelemetryClient::disabled(
            TelemetryOptions::default(),
            CommonProperties::new("development"),
        );
        client.track_event("ignored", Properties::new());

        assert!(!client.is_enabled());
        assert_eq!(client.flush().await, FlushOutcome::Disabled);
    }

    #[tokio::test]
    async fn request_items_carry_operation_tags() {
        let (client, sink, _dir) = recording_client(TelemetryOptions::default());

        client.track_request(RequestTelemetry {
            method: "GET".to_string(),
            path: "/status".to_string(),
            url: "/status?verbose=1".to_string(),
            status: 200,
            duration: Duration::from_millis(3),
            operation_id: Some("op-1".to_string()),
        });
        client.flush().await;

        let delivered = sink.delivered();
        assert_eq!(delivered[0].tags["ai.operation.id"], "op-1");
        match &delivered[0].data {
            TelemetryData::RequestData(request) => {
                assert_eq!(request.name, "GET /status");
                assert_eq!(request.response_code, "200");
                assert!(request.success);
            }
            other => panic!("unexpected telemetry: {other:?}"),
        }
    }
}
