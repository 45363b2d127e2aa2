use serde::{Deserialize, Serialize};

/// One stored snapshot of a dataset, keyed by the producer's timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "FeatureCollection")]
    pub feature_collection: serde_json::Value,
}

/// Single-document pointer to the newest snapshot of a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestDatasetEntity {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}
