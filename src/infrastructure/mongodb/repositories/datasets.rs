use std::time::Instant;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use mongodb::{Database, bson::doc};

use crate::domain::{
    entities::datasets::{DatasetDocument, LatestDatasetEntity},
    repositories::datasets::DatasetRepository,
    value_objects::datasets::Dataset,
};
use crate::infrastructure::mongodb::mongodb_connection::DatabaseSlot;
use crate::observability::client::{DependencyTelemetry, TelemetryClient};

pub struct DatasetMongo {
    database: DatabaseSlot,
    telemetry: TelemetryClient,
}

impl DatasetMongo {
    pub fn new(database: DatabaseSlot, telemetry: TelemetryClient) -> Self {
        Self {
            database,
            telemetry,
        }
    }

    fn database(&self) -> Result<&Database> {
        self.database
            .get()
            .ok_or_else(|| anyhow!("database connection is not established"))
    }

    /// Runs one driver operation and reports it as a dependency call.
    async fn observe<F, T>(&self, operation: &str, collection: &str, action: F) -> Result<T>
    where
        F: IntoFuture<Output = mongodb::error::Result<T>>,
    {
        let started = Instant::now();
        let result = action.await;

        self.telemetry.track_dependency(DependencyTelemetry {
            dependency_type: "mongodb".to_string(),
            target: self
                .database()
                .map(|db| db.name().to_string())
                .unwrap_or_default(),
            name: format!("{collection}.{operation}"),
            data: operation.to_string(),
            duration: started.elapsed(),
            success: result.is_ok(),
            result_code: if result.is_ok() { "0" } else { "1" }.to_string(),
        });

        Ok(result?)
    }
}

#[async_trait]
impl DatasetRepository for DatasetMongo {
    async fn find_latest_timestamp(&self, dataset: Dataset) -> Result<Option<String>> {
        let name = dataset.latest_collection();
        let collection = self.database()?.collection::<LatestDatasetEntity>(name);

        let latest = self
            .observe("findOne", name, collection.find_one(doc! {}))
            .await?;

        Ok(latest.map(|entity| entity.timestamp))
    }

    async fn find_by_timestamp(
        &self,
        dataset: Dataset,
        timestamp: String,
    ) -> Result<Option<DatasetDocument>> {
        let name = dataset.collection();
        let collection = self.database()?.collection::<DatasetDocument>(name);

        self.observe(
            "findOne",
            name,
            collection.find_one(doc! { "Timestamp": &timestamp }),
        )
        .await
    }

    async fn save(&self, dataset: Dataset, document: DatasetDocument) -> Result<()> {
        let name = dataset.collection();
        let collection = self.database()?.collection::<DatasetDocument>(name);

        self.observe(
            "replaceOne",
            name,
            collection
                .replace_one(doc! { "Timestamp": &document.timestamp }, &document)
                .upsert(true),
        )
        .await?;

        Ok(())
    }

    async fn set_latest(&self, dataset: Dataset, timestamp: String) -> Result<()> {
        let name = dataset.latest_collection();
        let collection = self.database()?.collection::<LatestDatasetEntity>(name);

        self.observe(
            "replaceOne",
            name,
            collection
                .replace_one(doc! {}, LatestDatasetEntity { timestamp })
                .upsert(true),
        )
        .await?;

        Ok(())
    }
}
