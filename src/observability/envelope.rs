//! Ingestion wire format: one JSON array of envelopes per request.

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type Properties = BTreeMap<String, String>;

const SCHEMA_VERSION: u8 = 2;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub name: String,
    pub time: DateTime<Utc>,
    #[serde(rename = "iKey")]
    pub instrumentation_key: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    pub data: TelemetryData,
}

impl Envelope {
    pub fn new(
        instrumentation_key: &str,
        tags: BTreeMap<String, String>,
        data: TelemetryData,
    ) -> Self {
        let compact_key: String = instrumentation_key.chars().filter(|c| *c != '-').collect();
        Self {
            name: format!(
                "Microsoft.ApplicationInsights.{}.{}",
                compact_key,
                data.kind()
            ),
            time: Utc::now(),
            instrumentation_key: instrumentation_key.to_string(),
            tags,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "baseType", content = "baseData")]
pub enum TelemetryData {
    EventData(EventData),
    ExceptionData(ExceptionData),
    RequestData(RequestData),
    RemoteDependencyData(RemoteDependencyData),
    MessageData(MessageData),
    MetricData(MetricData),
}

impl TelemetryData {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryData::EventData(_) => "Event",
            TelemetryData::ExceptionData(_) => "Exception",
            TelemetryData::RequestData(_) => "Request",
            TelemetryData::RemoteDependencyData(_) => "RemoteDependency",
            TelemetryData::MessageData(_) => "Message",
            TelemetryData::MetricData(_) => "Metric",
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            TelemetryData::EventData(data) => &mut data.properties,
            TelemetryData::ExceptionData(data) => &mut data.properties,
            TelemetryData::RequestData(data) => &mut data.properties,
            TelemetryData::RemoteDependencyData(data) => &mut data.properties,
            TelemetryData::MessageData(data) => &mut data.properties,
            TelemetryData::MetricData(data) => &mut data.properties,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityLevel {
    Verbose = 0,
    Information = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventData {
    pub ver: u8,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl EventData {
    pub fn new(name: impl Into<String>, properties: Properties) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            name: name.into(),
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub type_name: String,
    pub message: String,
    pub has_full_stack: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionData {
    pub ver: u8,
    pub exceptions: Vec<ExceptionDetails>,
    pub severity_level: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl ExceptionData {
    pub fn new(details: ExceptionDetails, properties: Properties) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            exceptions: vec![details],
            severity_level: SeverityLevel::Error as u8,
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RequestData {
    pub ver: u8,
    pub id: String,
    pub name: String,
    pub duration: String,
    pub response_code: String,
    pub success: bool,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDependencyData {
    pub ver: u8,
    pub id: String,
    pub name: String,
    pub result_code: String,
    pub duration: String,
    pub success: bool,
    pub data: String,
    pub target: String,
    #[serde(rename = "type")]
    pub dependency_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MessageData {
    pub ver: u8,
    pub message: String,
    pub severity_level: u8,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl MessageData {
    pub fn new(message: impl Into<String>, severity: SeverityLevel, properties: Properties) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            message: message.into(),
            severity_level: severity as u8,
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPoint {
    pub name: String,
    /// 0 = measurement
    pub kind: u8,
    pub value: f64,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricData {
    pub ver: u8,
    pub metrics: Vec<DataPoint>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: Properties,
}

impl MetricData {
    pub fn single(name: impl Into<String>, value: f64) -> Self {
        Self {
            ver: SCHEMA_VERSION,
            metrics: vec![DataPoint {
                name: name.into(),
                kind: 0,
                value,
                count: 1,
            }],
            properties: Properties::new(),
        }
    }
}

/// Formats a duration as `d.hh:mm:ss.fff`.
pub fn format_duration(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = (total_secs / 3600) % 24;
    let days = total_secs / 86_400;
    format!("{days}.{hours:02}:{mins:02}:{secs:02}.{ms:03}")
}

pub(crate) fn schema_version() -> u8 {
    SCHEMA_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn formats_durations_as_timespans() {
        assert_eq!(format_duration(Duration::from_millis(0)), "0.00:00:00.000");
        assert_eq!(format_duration(Duration::from_millis(1_234)), "0.00:00:01.234");
        assert_eq!(
            format_duration(Duration::from_secs(86_400 + 3_600 * 2 + 60 * 3 + 4)),
            "1.02:03:04.000"
        );
    }

    #[test]
    fn event_envelope_matches_ingestion_shape() {
        let mut properties = Properties::new();
        properties.insert("EnvName".to_string(), "container".to_string());
        let envelope = Envelope::new(
            "aaaa-bbbb",
            BTreeMap::new(),
            TelemetryData::EventData(EventData::new("MongoConnSuccess", properties)),
        );

        let value = serde_json::to_value(&envelope).unwrap();

        assert_eq!(value["name"], "Microsoft.ApplicationInsights.aaaabbbb.Event");
        assert_eq!(value["iKey"], "aaaa-bbbb");
        assert_eq!(value["data"]["baseType"], "EventData");
        assert_eq!(
            value["data"]["baseData"],
            json!({ "ver": 2, "name": "MongoConnSuccess", "properties": { "EnvName": "container" } })
        );
        assert!(value.get("tags").is_none());
    }

    #[test]
    fn dependency_type_is_serialized_as_type() {
        let data = RemoteDependencyData {
            ver: 2,
            id: "1".to_string(),
            name: "connect".to_string(),
            result_code: "0".to_string(),
            duration: format_duration(Duration::from_millis(5)),
            success: true,
            data: "ping".to_string(),
            target: "db.example".to_string(),
            dependency_type: "mongodb".to_string(),
            properties: Properties::new(),
        };

        let value = serde_json::to_value(TelemetryData::RemoteDependencyData(data)).unwrap();

        assert_eq!(value["baseType"], "RemoteDependencyData");
        assert_eq!(value["baseData"]["type"], "mongodb");
        assert_eq!(value["baseData"]["resultCode"], "0");
    }
}
