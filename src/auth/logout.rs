use axum::{debug_handler, extract::State, http::{HeaderMap, StatusCode}};
use sqlx::SqlitePool;

use crate::{AppError, AppResult};

use super::{bearer_token, hash_token};

#[debug_handler]
pub async fn logout(
    State(db_pool): State<SqlitePool>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    sqlx::query("DELETE FROM sessions WHERE token_hash=?")
        .bind(hash_token(token))
        .execute(&db_pool)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
