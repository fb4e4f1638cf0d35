use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Require `Authorization: Bearer <TRACKEAME_ADMIN_TOKEN>` when a token is configured.
pub async fn admin_auth(State(state): State<Arc<AppState>>, req: Request<Body>, next: Next) -> Response {
    if let Some(expected) = state.config.admin_token.as_deref() {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected) {
            return (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({ "error": "unauthorised" })),
            )
                .into_response();
        }
    }
    next.run(req).await
}
