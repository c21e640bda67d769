//! Error → HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;

use ck_domain::error::Error;
use ck_store::StoreError;

/// Handler error. Every variant of the shared [`Error`] maps to a status
/// and a structured JSON body.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e.into())
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            Error::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Error::Deployment(_) => (StatusCode::BAD_REQUEST, "invalid_deployment"),
            Error::Auth(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Error::Provider { .. } | Error::Http(_) | Error::Timeout(_) => {
                (StatusCode::BAD_GATEWAY, "upstream_error")
            }
            Error::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, status = status.as_u16(), "request rejected");
        }

        let body = match &self.0 {
            Error::Validation(details) => json!({ "error": code, "details": details }),
            other => json!({ "error": code, "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_statuses() {
        let cases = [
            (Error::Validation(vec!["k".into()]), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::not_found("agent", "a1"), StatusCode::NOT_FOUND),
            (Error::Deployment("nope".into()), StatusCode::BAD_REQUEST),
            (Error::Auth("missing key".into()), StatusCode::UNAUTHORIZED),
            (
                Error::Provider {
                    provider: "cohere".into(),
                    message: "HTTP 500".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (Error::Other("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).into_response().status(), status);
        }
    }

    #[test]
    fn missing_store_row_is_not_found() {
        let err: ApiError = StoreError::MessageNotFound("m1".into()).into();
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }
}
