use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::datasets::DatasetDocument;
use crate::domain::value_objects::datasets::Dataset;

#[async_trait]
#[automock]
pub trait DatasetRepository {
    async fn find_latest_timestamp(&self, dataset: Dataset) -> Result<Option<String>>;
    async fn find_by_timestamp(
        &self,
        dataset: Dataset,
        timestamp: String,
    ) -> Result<Option<DatasetDocument>>;
    async fn save(&self, dataset: Dataset, document: DatasetDocument) -> Result<()>;
    async fn set_latest(&self, dataset: Dataset, timestamp: String) -> Result<()>;
}
