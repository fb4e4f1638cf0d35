//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body with an
//! appropriate status code.
//!
//! Internal errors are logged with full detail but only a generic message is
//! returned, so SQL and connection details never reach clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use trackeame_core::RegistrationError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The caller referenced a resource that does not exist (or is not theirs).
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// No caller identity on a route that needs one.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::Registration(e) => match e {
                RegistrationError::InvalidInput(_) => (StatusCode::BAD_REQUEST, e.to_string()),
                RegistrationError::UnknownCarrier(_) => (StatusCode::NOT_FOUND, e.to_string()),
                RegistrationError::UnsupportedCarrier(_) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
                RegistrationError::Duplicate { .. } => (StatusCode::CONFLICT, e.to_string()),
                RegistrationError::Persistence(inner) => {
                    error!(error = %inner, "database error during registration");
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
                }
            },
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_owned())
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = self.status_and_message();
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<validator::ValidationErrors> for ServerError {
    fn from(e: validator::ValidationErrors) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use trackeame_carriers::AdapterError;

    use super::*;

    #[test]
    fn registration_errors_map_to_client_statuses() {
        let duplicate = ServerError::from(RegistrationError::Duplicate {
            carrier: "andreani".into(),
            tracking_code: "360002423941550".into(),
        });
        assert_eq!(duplicate.status_and_message().0, StatusCode::CONFLICT);

        let invalid = ServerError::from(RegistrationError::InvalidInput(AdapterError::InvalidInput {
            carrier: "andreani".into(),
            tracking_code: "123".into(),
            reason: "expected 15 characters".into(),
        }));
        assert_eq!(invalid.status_and_message().0, StatusCode::BAD_REQUEST);

        let unsupported = ServerError::from(RegistrationError::UnsupportedCarrier("oca".into()));
        assert_eq!(unsupported.status_and_message().0, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn database_detail_is_hidden() {
        let (status, message) = ServerError::Database(sqlx::Error::PoolTimedOut).status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "internal server error");
    }
}
