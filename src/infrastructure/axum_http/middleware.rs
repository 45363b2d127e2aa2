use std::{any::Any, time::Instant};

use axum::{
    Json,
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{ETag, HeaderMapExt, IfNoneMatch};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{error, warn};
use uuid::Uuid;

use super::{
    default_routers::STATUS_PATH,
    error_responses::{AppError, ErrorReport},
};
use crate::{
    config::stage::Stage,
    observability::{
        client::{RequestTelemetry, TelemetryClient},
        panic_message,
    },
    startup::Readiness,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, OPTIONS, PUT, PATCH, DELETE";
pub const ALLOW_HEADERS: &str = "X-Requested-With,content-type";

/// `Last-Modified` value for a response produced now.
pub fn last_modified_now() -> Option<HeaderValue> {
    HeaderValue::from_str(&Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()).ok()
}

/// Reports the finished request/response pair. Only GET and POST are sent as
/// request telemetry; every request feeds the performance counters.
pub async fn capture_request(
    State(telemetry): State<TelemetryClient>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();
    let operation_id = telemetry.options().auto_dependency_correlation.then(|| {
        request
            .headers()
            .get("x-request-id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    });

    let started = Instant::now();
    let response = next.run(request).await;
    let duration = started.elapsed();

    telemetry.counters().record_request(duration);

    if telemetry.options().auto_collect_requests && (method == Method::GET || method == Method::POST)
    {
        telemetry.track_request(RequestTelemetry {
            method: method.to_string(),
            path,
            url,
            status: response.status().as_u16(),
            duration,
            operation_id,
        });
    }

    response
}

/// Strong validator over the full body of successful GET/HEAD responses, with
/// `If-None-Match` answered by 304.
pub async fn strong_etag(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let if_none_match = request.headers().typed_get::<IfNoneMatch>();

    let response = next.run(request).await;
    if !(method == Method::GET || method == Method::HEAD)
        || !response.status().is_success()
        || response.headers().contains_key(header::ETAG)
    {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(error = %err, "failed to buffer response body for etag");
            return AppError::Internal(anyhow::anyhow!("response body could not be buffered"))
                .into_response();
        }
    };

    let Ok(etag) = strong_etag_for(&bytes).parse::<ETag>() else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    if let Some(condition) = if_none_match {
        if !condition.precondition_passes(&etag) {
            parts.status = StatusCode::NOT_MODIFIED;
            parts.headers.remove(header::CONTENT_LENGTH);
            parts.headers.remove(header::CONTENT_TYPE);
            parts.headers.typed_insert(etag);
            return Response::from_parts(parts, Body::empty());
        }
    }

    parts.headers.typed_insert(etag);
    Response::from_parts(parts, Body::from(bytes))
}

/// `"<length hex>-<27 chars of base64 sha256>"`
pub fn strong_etag_for(body: &[u8]) -> String {
    let digest = STANDARD.encode(Sha256::digest(body));
    format!("\"{:x}-{}\"", body.len(), &digest[..27])
}

/// Terminal stage: every error response, whether it carries an [`ErrorReport`]
/// from our handlers or is a bare status from a layer, leaves with the same
/// JSON error body. Detail is included only in development.
pub async fn error_handler(State(stage): State<Stage>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();

    let report = match response.extensions().get::<ErrorReport>() {
        Some(report) => report.clone(),
        None if status.is_client_error() || status.is_server_error() => {
            AppError::from_status(status).report()
        }
        None => return response,
    };

    if report.status >= 500 {
        error!(
            status = report.status,
            message = %report.message,
            detail = report.detail.as_deref().unwrap_or(""),
            "request failed"
        );
    }

    let (parts, _) = response.into_parts();
    let mut rendered = (
        report.status_code(),
        Json(report.body(stage.is_development())),
    )
        .into_response();

    for (name, value) in parts.headers.iter() {
        if name == header::CONTENT_TYPE || name == header::CONTENT_LENGTH {
            continue;
        }
        rendered.headers_mut().append(name.clone(), value.clone());
    }
    rendered.extensions_mut().insert(report);

    rendered
}

/// Refuses traffic with 503 until the database is connected. `/status` stays
/// reachable so the gate itself can be observed.
pub async fn readiness_gate(
    State(readiness): State<Readiness>,
    request: Request,
    next: Next,
) -> Response {
    if readiness.is_ready() || request.uri().path() == STATUS_PATH {
        return next.run(request).await;
    }
    AppError::ServiceUnavailable.into_response()
}

pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    AppError::Internal(anyhow::anyhow!(
        "handler panicked: {}",
        panic_message(payload.as_ref())
    ))
    .into_response()
}
