use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use super::client::TelemetryClient;

/// Request counters drained by the periodic performance collector.
#[derive(Debug, Default)]
pub struct PerformanceCounters {
    requests: AtomicU64,
    total_duration_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceSnapshot {
    pub requests: u64,
    pub average_duration_ms: f64,
}

impl PerformanceCounters {
    pub fn record_request(&self, duration: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn take_snapshot(&self) -> PerformanceSnapshot {
        let requests = self.requests.swap(0, Ordering::Relaxed);
        let total = self.total_duration_ms.swap(0, Ordering::Relaxed);
        let average_duration_ms = if requests == 0 {
            0.0
        } else {
            total as f64 / requests as f64
        };
        PerformanceSnapshot {
            requests,
            average_duration_ms,
        }
    }
}

pub fn spawn_collector(
    client: TelemetryClient,
    started_at: DateTime<Utc>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            collect_once(&client, started_at, period);
        }
    })
}

pub(crate) fn collect_once(client: &TelemetryClient, started_at: DateTime<Utc>, period: Duration) {
    let uptime = (Utc::now() - started_at).num_milliseconds().max(0) as f64 / 1000.0;
    client.track_metric("Process Uptime Seconds", uptime);

    let snapshot = client.counters().take_snapshot();
    let rate = snapshot.requests as f64 / period.as_secs_f64().max(1.0);
    client.track_metric("Requests/Sec", rate);
    if snapshot.requests > 0 {
        client.track_metric("Request Duration Ms", snapshot.average_duration_ms);
    }
}
