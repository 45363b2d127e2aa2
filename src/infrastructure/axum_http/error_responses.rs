use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Every failure a request can end in. Rendering into a body is left to the
/// terminal error handler, which knows the runtime mode.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not Found")]
    NotFound,

    #[error("{0}")]
    BadRequest(String),

    #[error("Payload Too Large")]
    PayloadTooLarge,

    #[error("Service Unavailable")]
    ServiceUnavailable,

    #[error("Internal Server Error")]
    Internal(#[from] anyhow::Error),

    #[error("{message}")]
    Status { status: StatusCode, message: String },
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Status { status, .. } => *status,
        }
    }

    /// Error for a bare status produced outside our handlers (layers, extractors).
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::NOT_FOUND => AppError::NotFound,
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
            StatusCode::SERVICE_UNAVAILABLE => AppError::ServiceUnavailable,
            other => AppError::Status {
                status: other,
                message: other
                    .canonical_reason()
                    .unwrap_or("Internal Server Error")
                    .to_string(),
            },
        }
    }

    pub fn report(&self) -> ErrorReport {
        let status = self.status();
        let status = if status.is_client_error() || status.is_server_error() {
            status
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let detail = match self {
            AppError::Internal(source) => Some(format!("{source:?}")),
            _ => None,
        };

        ErrorReport {
            status: status.as_u16(),
            name: error_name(status),
            message: self.to_string(),
            expose: status.is_client_error(),
            detail,
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => AppError::PayloadTooLarge,
            status => AppError::Status {
                status,
                message: rejection.body_text(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = self.report();
        let mut response = report.status_code().into_response();
        response.extensions_mut().insert(report);
        response
    }
}

/// Serializable snapshot of an [`AppError`], carried in response extensions.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorReport {
    pub status: u16,
    pub name: String,
    pub message: String,
    pub expose: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status: u16,
    status_code: u16,
    name: &'a str,
    message: &'a str,
    expose: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
}

impl ErrorReport {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Full detail is only included when `include_detail` is set (development).
    pub fn body(&self, include_detail: bool) -> Value {
        let error = include_detail.then(|| {
            json!({
                "name": self.name,
                "message": self.message,
                "status": self.status,
                "detail": self.detail,
            })
        });

        serde_json::to_value(ErrorBody {
            status: self.status,
            status_code: self.status,
            name: &self.name,
            message: &self.message,
            expose: self.expose,
            error,
        })
        .unwrap_or_else(|_| json!({ "status": self.status, "message": self.message }))
    }
}

/// "Not Found" -> "NotFoundError"
fn error_name(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Internal Server Error");
    let mut name: String = reason
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect();
    if !name.ends_with("Error") {
        name.push_str("Error");
    }
    name
}

/// `Json<T>` whose rejections flow into the error handler as [`AppError`].
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_errors_after_their_status() {
        assert_eq!(error_name(StatusCode::NOT_FOUND), "NotFoundError");
        assert_eq!(error_name(StatusCode::PAYLOAD_TOO_LARGE), "PayloadTooLargeError");
        assert_eq!(
            error_name(StatusCode::INTERNAL_SERVER_ERROR),
            "InternalServerError"
        );
    }

    #[test]
    fn internal_errors_hide_detail_outside_development() {
        let report = AppError::Internal(anyhow::anyhow!("pool exhausted")).report();

        let public = report.body(false);
        assert_eq!(public["status"], 500);
        assert_eq!(public["statusCode"], 500);
        assert_eq!(public["message"], "Internal Server Error");
        assert_eq!(public["expose"], false);
        assert!(public.get("error").is_none());

        let development = report.body(true);
        assert!(
            development["error"]["detail"]
                .as_str()
                .unwrap()
                .contains("pool exhausted")
        );
    }

    #[test]
    fn bare_statuses_map_to_known_errors() {
        assert!(matches!(
            AppError::from_status(StatusCode::PAYLOAD_TOO_LARGE),
            AppError::PayloadTooLarge
        ));
        let timeout = AppError::from_status(StatusCode::REQUEST_TIMEOUT).report();
        assert_eq!(timeout.status, 408);
        assert_eq!(timeout.message, "Request Timeout");
    }

    #[test]
    fn non_error_statuses_default_to_500() {
        let report = AppError::Status {
            status: StatusCode::OK,
            message: "odd".to_string(),
        }
        .report();
        assert_eq!(report.status, 500);
    }
}
