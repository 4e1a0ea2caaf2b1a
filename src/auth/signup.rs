use std::sync::Arc;

use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{appresult::is_unique_violation, config::Config, AppError, AppJson, AppResult, AppState};

use super::{create_user, issue_session, normalize_email, password, SessionResponse, ADMIN_ROLE};

#[derive(Debug, Deserialize)]
pub(crate) struct SignupBody {
    email: String,
    password: String,
    full_name: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn signup(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    AppJson(SignupBody { email, password, full_name }): AppJson<SignupBody>,
) -> AppResult<(StatusCode, Json<SessionResponse>)> {
    let email = normalize_email(&email).ok_or("A valid email address is required")?;
    if password.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(format!("Password must be at least {} characters", password::MIN_PASSWORD_LEN))?;
    }
    let full_name = full_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty());

    let password_hash = password::hash_password(&password)?;
    let roles: &[&str] = if config.is_admin_email(&email) { &[ADMIN_ROLE] } else { &[] };

    let mut tx = db_pool.begin().await?;
    let user = match create_user(&mut tx, &email, &password_hash, full_name, roles).await {
        Ok(user) => user,
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::Conflict("User already registered".to_owned()));
        }
        Err(err) => return Err(err.into()),
    };
    tx.commit().await?;

    let session = issue_session(&db_pool, user, config.session_ttl_hours).await?;
    Ok((StatusCode::CREATED, Json(session)))
}
