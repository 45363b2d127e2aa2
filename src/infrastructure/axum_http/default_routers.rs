use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use tracing::debug;

use super::error_responses::AppError;
use crate::{application::usercases::status::status_report, startup::AppContext};

pub const STATUS_PATH: &str = "/status";

pub async fn not_found() -> AppError {
    debug!("router: not_found handler invoked");
    AppError::NotFound
}

pub async fn status(State(context): State<AppContext>) -> impl IntoResponse {
    Json(status_report(
        context.started_at,
        Utc::now(),
        context.readiness.is_ready(),
    ))
}
