use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::domain::{
    entities::datasets::DatasetDocument, repositories::datasets::DatasetRepository,
    value_objects::datasets::Dataset,
};

pub struct DatasetsUseCase<T>
where
    T: DatasetRepository + Send + Sync,
{
    dataset_repository: Arc<T>,
}

impl<T> DatasetsUseCase<T>
where
    T: DatasetRepository + Send + Sync,
{
    pub fn new(dataset_repository: Arc<T>) -> Self {
        Self { dataset_repository }
    }

    /// Resolves the latest pointer, then loads the snapshot it names.
    pub async fn latest(&self, dataset: Dataset) -> Result<Option<DatasetDocument>> {
        let Some(timestamp) = self
            .dataset_repository
            .find_latest_timestamp(dataset)
            .await?
        else {
            debug!(%dataset, "datasets: no latest pointer stored");
            return Ok(None);
        };

        self.dataset_repository
            .find_by_timestamp(dataset, timestamp)
            .await
    }

    pub async fn find(&self, dataset: Dataset, timestamp: String) -> Result<Option<DatasetDocument>> {
        self.dataset_repository
            .find_by_timestamp(dataset, timestamp)
            .await
    }

    /// Stores the snapshot, then moves the latest pointer to it.
    pub async fn save(
        &self,
        dataset: Dataset,
        timestamp: String,
        feature_collection: serde_json::Value,
    ) -> Result<DatasetDocument> {
        let document = DatasetDocument {
            timestamp: timestamp.clone(),
            feature_collection,
        };

        self.dataset_repository
            .save(dataset, document.clone())
            .await?;
        self.dataset_repository
            .set_latest(dataset, timestamp.clone())
            .await?;

        info!(%dataset, %timestamp, "datasets: snapshot saved");
        Ok(document)
    }
}
