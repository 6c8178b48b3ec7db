//! HTTP error mapping

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardrails_core::Error;
use serde_json::json;
use tracing::error;

/// Error returned by request handlers
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Engine(#[from] Error),

    /// A required identity header is absent or unreadable
    #[error("missing or invalid {0} header")]
    MissingIdentity(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("content is {size} bytes, the limit is {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    /// The request body exceeded the transport limit
    #[error("{0}")]
    BodyTooLarge(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(err) => engine_status(err),
            Self::MissingIdentity(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PayloadTooLarge { .. } | Self::BodyTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Engine(err) => err.kind(),
            Self::MissingIdentity(_) => "unauthenticated",
            Self::BadRequest(_) => "bad_request",
            Self::PayloadTooLarge { .. } | Self::BodyTooLarge(_) => "payload_too_large",
            Self::Internal(_) => "internal_error",
        }
    }
}

fn engine_status(err: &Error) -> StatusCode {
    match err {
        Error::Compile { .. } | Error::InvalidRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Forbidden { .. } | Error::Entitlement { .. } => StatusCode::FORBIDDEN,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::LifecycleState { .. } | Error::BuiltInRule { .. } => StatusCode::CONFLICT,
        Error::Recording(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::ScanTimeout { .. }
        | Error::Config(_)
        | Error::Io(_)
        | Error::Serialization(_)
        | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            AppError::BodyTooLarge(rejection.body_text())
        } else {
            AppError::BadRequest(rejection.body_text())
        }
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.kind(), "Request failed: {}", self);
        }

        let mut body = json!({
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
            }
        });
        if let AppError::Engine(err) = &self {
            if let Some(rule_id) = err.rule_id() {
                body["error"]["rule_id"] = json!(rule_id);
            }
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardrails_core::RuleId;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AppError::from(Error::compile("regex", "unclosed group")), 422),
            (AppError::from(Error::invalid_rule("name must not be empty")), 422),
            (AppError::from(Error::forbidden("member", "create rules")), 403),
            (AppError::from(Error::not_found("rule", "rule_x")), 404),
            (
                AppError::from(Error::LifecycleState {
                    suggestion_id: "sug_1".to_string(),
                    status: "approved".to_string(),
                }),
                409,
            ),
            (AppError::from(Error::recording("disk full")), 503),
            (AppError::PayloadTooLarge { size: 10, limit: 5 }, 413),
            (AppError::MissingIdentity("X-User-Id"), 401),
            (AppError::from(Error::internal("boom")), 500),
        ];

        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{}", err.kind());
        }
    }

    #[test]
    fn test_kind_and_rule_id_survive() {
        let err = AppError::from(Error::compile("regex", "unclosed group").with_rule(&RuleId::from("rule_1")));
        assert_eq!(err.kind(), "compile_error");
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
