use crate::error::DataError;
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

fn status_for(err: &DataError) -> StatusCode {
    match err {
        DataError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DataError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        DataError::Database(_) | DataError::Cancelled => StatusCode::INTERNAL_SERVER_ERROR,
        DataError::NotFound(_) => StatusCode::NOT_FOUND,
        DataError::Validation(_) => StatusCode::BAD_REQUEST,
        DataError::Referential(_) => StatusCode::CONFLICT,
        DataError::Conversion(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DataError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        DataError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
        DataError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        DataError::Storage(_) | DataError::Mail(_) => StatusCode::BAD_GATEWAY,
        DataError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
    }
}

fn data_error_response(err: DataError) -> Response {
    let status = status_for(&err);

    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!("Data error: {}", err);
        "Internal Server Error".to_string()
    } else {
        if status.is_server_error() {
            tracing::warn!("Backend error: {}", err);
        }
        err.to_string()
    };

    let mut body = json!({
        "error": message,
        "code": err.code(),
        "retryable": err.is_retryable(),
    });

    let mut retry_after = None;
    match &err {
        DataError::Validation(fields) => {
            body["fields"] = json!(fields);
        }
        DataError::RateLimited { retry_after: wait } => {
            let secs = wait.as_secs().max(1);
            body["retry_after_secs"] = json!(secs);
            retry_after = Some(secs);
        }
        _ => {}
    }

    let mut response = (status, Json(body)).into_response();
    if let Some(secs) = retry_after {
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(secs));
    }
    response
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::Data(e) => return data_error_response(e),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
            AppError::Anyhow(e) => {
                tracing::error!("Anyhow error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Internal Server Error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": code,
            "retryable": false,
        }));

        (status, body).into_response()
    }
}
