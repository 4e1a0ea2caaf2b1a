use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::{FromRow, SqlitePool};

use crate::{auth::AdminUser, AppResult};

#[derive(Debug, Default, FromRow, Serialize, PartialEq, Eq)]
pub struct Dashboard {
    pub total_elections: i64,
    pub active_elections: i64,
    pub total_voters: i64,
    pub verified_voters: i64,
    pub pending_verifications: i64,
    pub total_votes: i64,
}

pub async fn dashboard_stats(db_pool: &SqlitePool) -> AppResult<Dashboard> {
    Ok(
        sqlx::query_as(
            "SELECT
                (SELECT COUNT(*) FROM elections) AS total_elections,
                (SELECT COUNT(*) FROM elections WHERE status='active') AS active_elections,
                (SELECT COUNT(*) FROM profiles) AS total_voters,
                (SELECT COUNT(*) FROM profiles WHERE is_verified=1) AS verified_voters,
                (SELECT COUNT(*) FROM verification_requests WHERE status='pending') AS pending_verifications,
                (SELECT COALESCE(SUM(vote_count),0) FROM vote_counts) AS total_votes"
        )
            .fetch_one(db_pool)
            .await?
    )
}

#[debug_handler]
pub async fn dashboard(
    State(db_pool): State<SqlitePool>,
    _admin: AdminUser,
) -> AppResult<Json<Dashboard>> {
    Ok(Json(dashboard_stats(&db_pool).await?))
}

#[cfg(test)]
mod tests {
    use crate::db;

    use super::*;

    #[tokio::test]
    async fn empty_database_reports_zeroes() {
        let db_pool = db::memory_pool().await.unwrap();
        assert_eq!(dashboard_stats(&db_pool).await.unwrap(), Dashboard::default());
    }
}
