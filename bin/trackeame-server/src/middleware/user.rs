//! Caller identity.
//!
//! Token verification happens upstream (gateway or auth proxy); by the time a
//! request reaches us the verified subject and email travel as headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use trackeame_types::User;

use crate::error::ServerError;

pub static X_USER_ID: &str = "x-user-id";
pub static X_USER_EMAIL: &str = "x-user-email";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub email: Option<String>,
}

impl Caller {
    /// Full user record, for routes that create data on the caller's behalf.
    pub fn user(&self) -> Result<User, ServerError> {
        let email = self
            .email
            .clone()
            .ok_or_else(|| ServerError::Unauthorized(format!("missing {X_USER_EMAIL} header")))?;
        Ok(User {
            id: self.id.clone(),
            email,
        })
    }
}

fn header(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header(parts, X_USER_ID)
            .ok_or_else(|| ServerError::Unauthorized("user not authenticated".to_owned()))?;
        Ok(Caller {
            id,
            email: header(parts, X_USER_EMAIL),
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(req: Request<()>) -> Result<Caller, ServerError> {
        let (mut parts, _) = req.into_parts();
        Caller::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn reads_identity_headers() {
        let req = Request::builder()
            .header(X_USER_ID, "auth0|abc")
            .header(X_USER_EMAIL, "ana@example.com")
            .body(())
            .unwrap();
        let caller = extract(req).await.unwrap();
        assert_eq!(caller.id, "auth0|abc");
        assert_eq!(caller.user().unwrap().email, "ana@example.com");
    }

    #[tokio::test]
    async fn missing_or_blank_id_is_rejected() {
        let req = Request::builder().header(X_USER_ID, "  ").body(()).unwrap();
        assert!(matches!(extract(req).await, Err(ServerError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn registration_needs_an_email() {
        let req = Request::builder().header(X_USER_ID, "auth0|abc").body(()).unwrap();
        let caller = extract(req).await.unwrap();
        assert!(matches!(caller.user(), Err(ServerError::Unauthorized(_))));
    }
}
