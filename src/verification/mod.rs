use axum::{debug_handler, extract::State, routing::{get, post}, Json, Router};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{auth::CurrentUser, db::{self, Profile}, AppError, AppResult, AppState};

mod delivery;
mod functions;
pub mod otp;
pub mod review;

pub use delivery::{CodeDelivery, LogDelivery};
pub use otp::VerificationState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/functions/request-code", post(functions::request_code))
        .route("/functions/verify-code", post(functions::verify_code))
        .route("/verification/status", get(status))
        .route("/verification/requests", get(review::own_requests).post(review::submit_request))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/verifications", get(review::review_queue))
        .route("/verifications/{id}/approve", post(review::approve))
        .route("/verifications/{id}/reject", post(review::reject))
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: VerificationState,
    pub voter_id: Option<String>,
    pub pending_expires_at: Option<i64>,
}

#[debug_handler]
pub async fn status(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
) -> AppResult<Json<StatusResponse>> {
    let profile = Profile::fetch(&db_pool, &user.id).await?.ok_or(AppError::NotFound("profile"))?;
    let pending = otp::pending_challenge(&db_pool, &user.id).await?;
    let now = db::now();

    let state = otp::verification_state(&profile, pending.as_ref(), now);
    Ok(Json(StatusResponse {
        state,
        voter_id: profile.voter_id,
        pending_expires_at: pending
            .filter(|_| state == VerificationState::Pending)
            .map(|challenge| challenge.expires_at),
    }))
}
