use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use accord_lifecycle::LifecycleError;
use accord_types::api::ErrorBody;
use accord_verify::VerificationError;

/// Every failure leaves the API as a status plus a stable machine code and
/// an actionable message. The verification path never collapses into a
/// generic error — wrong code, expired, cooldown, and attempt exhaustion
/// each keep their own code.
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, error: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.to_string(),
                message: message.into(),
            },
        }
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", "request not found")
    }

    fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal",
            "internal error, try again",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        use VerificationError::*;
        let (status, code) = match &e {
            InvalidPhoneFormat => (StatusCode::BAD_REQUEST, "invalid_phone"),
            NotFound => (StatusCode::NOT_FOUND, "code_not_found"),
            Expired => (StatusCode::GONE, "code_expired"),
            AlreadyUsed => (StatusCode::CONFLICT, "code_already_used"),
            AttemptsExceeded => (StatusCode::TOO_MANY_REQUESTS, "attempts_exceeded"),
            TooSoon { .. } => (StatusCode::TOO_MANY_REQUESTS, "resend_too_soon"),
            DeliveryFailed(_) => (StatusCode::BAD_GATEWAY, "delivery_failed"),
            Store(e) => {
                tracing::error!("verification store error: {}", e);
                return Self::internal();
            }
        };
        Self::new(status, code, e.to_string())
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        match &e {
            LifecycleError::NotFound => Self::not_found(),
            LifecycleError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "invalid_transition", e.to_string())
            }
            LifecycleError::Store(e) => {
                tracing::error!("lifecycle store error: {}", e);
                Self::internal()
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!("internal error: {}", e);
        Self::internal()
    }
}
