use axum::{
    debug_handler,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::SqlitePool;

use crate::AppError;

use super::{bearer_token, has_role, resolve_token, ADMIN_ROLE};

/// Authoritative admin check for the client route guard.
#[debug_handler]
pub async fn verify_admin(
    State(db_pool): State<SqlitePool>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return denied(StatusCode::UNAUTHORIZED, "No authorization header");
    };

    let user = match resolve_token(&db_pool, token).await {
        Ok(user) => user,
        Err(AppError::Unauthorized) => return denied(StatusCode::UNAUTHORIZED, "Invalid token"),
        Err(err) => {
            tracing::error!("session lookup failed: {err}");
            return denied(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error");
        }
    };

    match has_role(&db_pool, &user.id, ADMIN_ROLE).await {
        Ok(is_admin) => Json(json!({ "isAdmin": is_admin, "userId": user.id })).into_response(),
        Err(err) => {
            tracing::error!(user_id = %user.id, "error checking admin role: {err}");
            denied(StatusCode::INTERNAL_SERVER_ERROR, "Error checking role")
        }
    }
}

fn denied(status: StatusCode, error: &str) -> Response {
    (status, Json(json!({ "isAdmin": false, "error": error }))).into_response()
}
