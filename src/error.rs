use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::identity::IdentityError;
use crate::roles::RoleError;
use crate::slots::booking::BookingError;
use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn invalid_credentials() -> Self {
        ApiError::Unauthorized("INVALID_CREDENTIALS", "Email or password is incorrect".into())
    }

    pub fn unauthenticated() -> Self {
        ApiError::Unauthorized("UNAUTHENTICATED", "Missing, invalid or expired token".into())
    }

    pub fn profile_not_found() -> Self {
        ApiError::Forbidden(
            "PROFILE_NOT_FOUND",
            "Identity has no role assigned; use /api/admin/assign-role or /api/signup".into(),
        )
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::BadRequest("VALIDATION_ERROR", msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden("FORBIDDEN", msg.into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiError::to_error_response("INTERNAL", &msg),
                )
                    .into_response()
            }
        }
    }
}

/// Extractor rejections: client mistakes become `VALIDATION_ERROR`, anything
/// axum reports as a server error stays internal.
fn rejection(status: StatusCode, text: String) -> ApiError {
    if status.is_server_error() {
        ApiError::Internal(text)
    } else {
        ApiError::validation(text)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        rejection(r.status(), r.body_text())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate(msg) => ApiError::Conflict("DUPLICATE", msg),
            other => ApiError::Internal(format!("store error: {other}")),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::InvalidToken => ApiError::unauthenticated(),
            IdentityError::InvalidCredentials => ApiError::invalid_credentials(),
            IdentityError::EmailExists => ApiError::Conflict(
                "EMAIL_EXISTS",
                "An account with this email already exists".into(),
            ),
            IdentityError::WeakPassword => ApiError::BadRequest(
                "WEAK_PASSWORD",
                "Password must be at least 6 characters long".into(),
            ),
            IdentityError::InvalidEmail => ApiError::BadRequest(
                "INVALID_EMAIL",
                "Please provide a valid email address".into(),
            ),
            IdentityError::UserNotFound => {
                ApiError::NotFound("USER_NOT_FOUND", "No identity exists for this user".into())
            }
            IdentityError::Store(e) => e.into(),
            other => ApiError::Internal(format!("identity provider error: {other}")),
        }
    }
}

impl From<RoleError> for ApiError {
    fn from(e: RoleError) -> Self {
        match e {
            RoleError::Unauthenticated => ApiError::unauthenticated(),
            RoleError::ProfileNotFound => ApiError::profile_not_found(),
            RoleError::Identity(e) => e.into(),
            RoleError::Store(e) => e.into(),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(e: BookingError) -> Self {
        match e {
            BookingError::InvalidRequest(msg) => ApiError::validation(msg),
            BookingError::SlotUnavailable => ApiError::BadRequest(
                "SLOT_UNAVAILABLE",
                "This slot is already booked or does not exist".into(),
            ),
            BookingError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_errors_map_to_http_statuses() {
        let r = ApiError::from(BookingError::SlotUnavailable).into_response();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        let r = ApiError::from(BookingError::InvalidRequest("date is required".into())).into_response();
        assert_eq!(r.status(), StatusCode::BAD_REQUEST);

        let r = ApiError::from(BookingError::Store(StoreError::Timeout(std::time::Duration::from_millis(5))))
            .into_response();
        assert_eq!(r.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn role_errors_keep_unauthenticated_and_profile_missing_apart() {
        let r = ApiError::from(RoleError::Unauthenticated).into_response();
        assert_eq!(r.status(), StatusCode::UNAUTHORIZED);

        let r = ApiError::from(RoleError::ProfileNotFound).into_response();
        assert_eq!(r.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn email_exists_is_a_conflict() {
        let r = ApiError::from(IdentityError::EmailExists).into_response();
        assert_eq!(r.status(), StatusCode::CONFLICT);
    }
}
