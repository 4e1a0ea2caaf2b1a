use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{config::Config, AppJson, AppResult, AppState};

use super::{issue_session, password, CurrentUser, SessionResponse};

const BAD_CREDENTIALS: &str = "Invalid login credentials";

#[derive(Deserialize)]
pub(crate) struct LoginBody {
    email: String,
    password: String,
}

#[debug_handler(state = AppState)]
pub async fn login(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    AppJson(LoginBody { email, password }): AppJson<LoginBody>,
) -> AppResult<Json<SessionResponse>> {
    let email = email.trim().to_lowercase();

    let Some((id, password_hash)): Option<(String, String)> =
        sqlx::query_as("SELECT id,password_hash FROM users WHERE email=?")
            .bind(&email)
            .fetch_optional(&db_pool)
            .await?
    else {
        password::verify_decoy(&password);
        return Err(BAD_CREDENTIALS)?;
    };

    if !password::verify_password(&password, &password_hash)? {
        tracing::info!(user_id = %id, "login refused");
        return Err(BAD_CREDENTIALS)?;
    }

    tracing::info!(user_id = %id, "welcome");
    let session = issue_session(&db_pool, CurrentUser { id, email }, config.session_ttl_hours).await?;
    Ok(Json(session))
}
