use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use tracing::{error, warn};

use roster_core::errors::{AuthError, Error};

/// Core error rendered as `{success: false, error, detail}` with a mapped status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self(Error::Validation(r.body_text()))
    }
}

pub fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Auth(AuthError::NotAuthenticated | AuthError::SessionMissing) => {
            StatusCode::UNAUTHORIZED
        }
        Error::Auth(_) => StatusCode::BAD_REQUEST,
        Error::Permission(_) => StatusCode::FORBIDDEN,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        // The session was torn down while the request was running.
        Error::Cancelled => StatusCode::GONE,
        Error::Platform(_) => StatusCode::BAD_GATEWAY,
        Error::Config(_) | Error::Io(_) | Error::Json(_) | Error::Csv(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, kind = self.0.kind(), "request failed");
        } else {
            warn!(error = %self.0, kind = self.0.kind(), %status, "request rejected");
        }

        (
            status,
            Json(json!({
                "success": false,
                "error": self.0.kind(),
                "detail": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
