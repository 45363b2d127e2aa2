use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    application::usercases::datasets::DatasetsUseCase,
    domain::{repositories::datasets::DatasetRepository, value_objects::datasets::Dataset},
    infrastructure::axum_http::error_responses::{AppError, JsonBody},
};

pub fn routes<T>(dataset_repository: Arc<T>) -> Router
where
    T: DatasetRepository + Send + Sync + 'static,
{
    let datasets_usecase = DatasetsUseCase::new(dataset_repository);

    Router::new()
        .route("/get/:dataset/latest", get(latest::<T>))
        .route("/get/:dataset/:timestamp", get(find::<T>))
        .route("/save/:dataset/:timestamp", post(save::<T>))
        .with_state(Arc::new(datasets_usecase))
}

fn parse_dataset(name: &str) -> Result<Dataset, AppError> {
    name.parse().map_err(|_| AppError::NotFound)
}

pub async fn latest<T>(
    State(datasets_usecase): State<Arc<DatasetsUseCase<T>>>,
    Path(dataset): Path<String>,
) -> Result<impl IntoResponse, AppError>
where
    T: DatasetRepository + Send + Sync,
{
    let dataset = parse_dataset(&dataset)?;

    match datasets_usecase.latest(dataset).await {
        Ok(Some(document)) => Ok(Json(document)),
        Ok(None) => Err(AppError::NotFound),
        Err(err) => {
            error!(%dataset, "datasets: failed to load latest document: {:#}", err);
            Err(AppError::Internal(err))
        }
    }
}

pub async fn find<T>(
    State(datasets_usecase): State<Arc<DatasetsUseCase<T>>>,
    Path((dataset, timestamp)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError>
where
    T: DatasetRepository + Send + Sync,
{
    let dataset = parse_dataset(&dataset)?;

    match datasets_usecase.find(dataset, timestamp).await {
        Ok(Some(document)) => Ok(Json(document)),
        Ok(None) => Err(AppError::NotFound),
        Err(err) => {
            error!(%dataset, "datasets: failed to load document: {:#}", err);
            Err(AppError::Internal(err))
        }
    }
}

pub async fn save<T>(
    State(datasets_usecase): State<Arc<DatasetsUseCase<T>>>,
    Path((dataset, timestamp)): Path<(String, String)>,
    JsonBody(feature_collection): JsonBody<Value>,
) -> Result<impl IntoResponse, AppError>
where
    T: DatasetRepository + Send + Sync,
{
    let dataset = parse_dataset(&dataset)?;
    if !(feature_collection.is_object() || feature_collection.is_array()) {
        return Err(AppError::BadRequest(
            "request body must be a JSON object or array".to_string(),
        ));
    }

    match datasets_usecase
        .save(dataset, timestamp, feature_collection)
        .await
    {
        Ok(document) => {
            info!(%dataset, timestamp = %document.timestamp, "datasets: document saved");
            Ok(Json(json!({
                "message": format!("{dataset} data saved"),
                "timestamp": document.timestamp,
            })))
        }
        Err(err) => {
            error!(%dataset, "datasets: failed to save document: {:#}", err);
            Err(AppError::Internal(err))
        }
    }
}
