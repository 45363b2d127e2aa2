use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatusResponse {
    pub message: &'static str,
    pub payload: StatusPayload,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    pub uptime: String,
    pub started_at: DateTime<Utc>,
    pub database: &'static str,
}

pub fn status_report(
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    database_ready: bool,
) -> StatusResponse {
    StatusResponse {
        message: "api-server status",
        payload: StatusPayload {
            uptime: humanize_since(started_at, now),
            started_at,
            database: if database_ready { "connected" } else { "pending" },
        },
    }
}

/// Relative phrasing of the time elapsed since `from`, e.g. "5 minutes ago".
pub fn humanize_since(from: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - from).num_seconds().max(0) as f64;
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;
    let months = days / 30.0;
    let years = days / 365.0;

    if seconds < 45.0 {
        "a few seconds ago".to_string()
    } else if seconds < 90.0 {
        "a minute ago".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes ago", minutes.round() as i64)
    } else if minutes < 90.0 {
        "an hour ago".to_string()
    } else if hours < 22.0 {
        format!("{} hours ago", hours.round() as i64)
    } else if hours < 36.0 {
        "a day ago".to_string()
    } else if days < 26.0 {
        format!("{} days ago", days.round() as i64)
    } else if days < 46.0 {
        "a month ago".to_string()
    } else if days < 320.0 {
        format!("{} months ago", months.round().max(2.0) as i64)
    } else if months < 18.0 {
        "a year ago".to_string()
    } else {
        format!("{} years ago", years.round().max(2.0) as i64)
    }
}
