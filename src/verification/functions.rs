use std::sync::Arc;

use axum::{debug_handler, extract::State, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, config::{Config, Environment}, db, AppJson, AppResult, AppState};

use super::{otp, CodeDelivery};

#[derive(Deserialize)]
pub(crate) struct RequestCodeBody {
    voter_id: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestCodeResponse {
    pub success: bool,
    pub message: &'static str,
    pub expires_in_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_otp: Option<String>,
}

#[debug_handler(state = AppState)]
pub async fn request_code(
    State(db_pool): State<SqlitePool>,
    State(config): State<Arc<Config>>,
    State(delivery): State<Arc<dyn CodeDelivery>>,
    user: CurrentUser,
    AppJson(RequestCodeBody { voter_id, email }): AppJson<RequestCodeBody>,
) -> AppResult<Json<RequestCodeResponse>> {
    let issued = otp::request_code(
        &db_pool,
        &user,
        voter_id.as_deref().unwrap_or_default(),
        email.as_deref().unwrap_or_default(),
        db::now(),
    ).await?;

    delivery.deliver(&user.email, &issued.code)?;

    Ok(Json(RequestCodeResponse {
        success: true,
        message: "Verification code sent to your email",
        expires_in_minutes: otp::CODE_TTL_MINUTES,
        debug_otp: (config.environment == Environment::Development).then_some(issued.code),
    }))
}

#[derive(Deserialize)]
pub(crate) struct VerifyCodeBody {
    otp_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub message: &'static str,
    pub voter_id: String,
}

#[debug_handler(state = AppState)]
pub async fn verify_code(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
    AppJson(VerifyCodeBody { otp_code }): AppJson<VerifyCodeBody>,
) -> AppResult<Json<VerifyCodeResponse>> {
    let voter_id = otp::verify_code(&db_pool, &user, otp_code.as_deref().unwrap_or_default(), db::now()).await?;

    Ok(Json(VerifyCodeResponse {
        success: true,
        message: "Your identity has been verified successfully!",
        voter_id,
    }))
}
