use axum::{routing::{get, patch, post, put}, Router};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use crate::{AppError, AppResult, AppState};

mod candidates;
mod election;
mod live;
mod results;
pub mod tally;
pub mod votes;

pub use election::delete_election;
pub use tally::{Tally, VoteEvent, VoteFeed};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/elections", get(election::list))
        .route("/elections/active", get(election::active))
        .route("/elections/{id}", get(election::get_one))
        .route("/elections/{id}/candidates", get(candidates::list))
        .route("/elections/{id}/results", get(results::results))
        .route("/elections/{id}/live", get(live::live_tally))
        .route("/elections/{id}/votes", post(votes::cast))
        .route("/elections/{id}/vote", get(votes::has_voted))
}

pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/elections", get(election::admin_list).post(election::create))
        .route("/elections/{id}", patch(election::update_status).delete(election::delete))
        .route("/candidates", get(candidates::admin_list).post(candidates::create))
        .route("/candidates/{id}", put(candidates::update).delete(candidates::delete))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ElectionStatus {
    Upcoming,
    Active,
    Completed,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct Election {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_date: i64,
    pub end_date: i64,
    pub status: ElectionStatus,
    pub created_at: i64,
}

impl Election {
    pub async fn fetch(db_pool: &SqlitePool, id: &str) -> AppResult<Election> {
        sqlx::query_as("SELECT * FROM elections WHERE id=?")
            .bind(id)
            .fetch_optional(db_pool)
            .await?
            .ok_or(AppError::NotFound("election"))
    }
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub election_id: String,
    pub name: String,
    pub party: Option<String>,
    pub bio: Option<String>,
    pub image_url: Option<String>,
    pub created_at: i64,
}

/// Trims optional text fields; blank becomes `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}
