use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::AppResult;

use super::Election;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidateResult {
    pub candidate_id: String,
    pub name: String,
    pub party: Option<String>,
    pub votes: i64,
    #[sqlx(skip)]
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct ElectionResults {
    pub election: Election,
    pub candidates: Vec<CandidateResult>,
    pub total_votes: i64,
}

/// Aggregate results. Reads only the `vote_counts` view, never individual ballots.
#[debug_handler]
pub async fn results(
    State(db_pool): State<SqlitePool>,
    Path(election_id): Path<Uuid>,
) -> AppResult<Json<ElectionResults>> {
    let election = Election::fetch(&db_pool, &election_id.to_string()).await?;

    let mut candidates: Vec<CandidateResult> = sqlx::query_as(
        "SELECT c.id AS candidate_id, c.name, c.party, COALESCE(v.vote_count,0) AS votes
        FROM candidates c LEFT JOIN vote_counts v ON v.candidate_id=c.id AND v.election_id=c.election_id
        WHERE c.election_id=?
        ORDER BY votes DESC, c.name"
    )
        .bind(&election.id)
        .fetch_all(&db_pool)
        .await?;

    let total_votes: i64 = candidates.iter().map(|c| c.votes).sum();
    for candidate in &mut candidates {
        candidate.percentage = percentage(candidate.votes, total_votes);
    }

    Ok(Json(ElectionResults { election, candidates, total_votes }))
}

fn percentage(votes: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (votes as f64 * 1000.0 / total as f64).round() / 10.0
}
