use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{auth::AdminUser, db, AppError, AppJson, AppResult};

use super::{non_blank, Election, ElectionStatus};

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Vec<Election>>> {
    Ok(Json(
        sqlx::query_as("SELECT * FROM elections ORDER BY start_date DESC")
            .fetch_all(&db_pool)
            .await?
    ))
}

/// The election voters land on: the most recent active one.
#[debug_handler]
pub(crate) async fn active(
    State(db_pool): State<SqlitePool>,
) -> AppResult<Json<Election>> {
    sqlx::query_as("SELECT * FROM elections WHERE status='active' ORDER BY start_date DESC LIMIT 1")
        .fetch_optional(&db_pool)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("active election"))
}

#[debug_handler]
pub(crate) async fn get_one(
    State(db_pool): State<SqlitePool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Election>> {
    Ok(Json(Election::fetch(&db_pool, &id.to_string()).await?))
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ElectionRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub election: Election,
    pub candidate_count: i64,
    pub total_votes: i64,
}

#[debug_handler]
pub(crate) async fn admin_list(
    State(db_pool): State<SqlitePool>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<ElectionRow>>> {
    Ok(Json(
        sqlx::query_as(
            "SELECT e.*,
                (SELECT COUNT(*) FROM candidates c WHERE c.election_id=e.id) AS candidate_count,
                (SELECT COALESCE(SUM(v.vote_count),0) FROM vote_counts v WHERE v.election_id=e.id) AS total_votes
            FROM elections e ORDER BY e.created_at DESC"
        )
            .fetch_all(&db_pool)
            .await?
    ))
}

#[derive(Deserialize)]
pub(crate) struct NewElection {
    title: String,
    description: Option<String>,
    start_date: i64,
    end_date: i64,
}

#[debug_handler]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    AppJson(NewElection { title, description, start_date, end_date }): AppJson<NewElection>,
) -> AppResult<(StatusCode, Json<Election>)> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Election title is required")?;
    }
    if end_date <= start_date {
        return Err("Election must end after it starts")?;
    }

    let election = Election {
        id: Uuid::now_v7().to_string(),
        title: title.to_owned(),
        description: non_blank(description),
        start_date,
        end_date,
        status: ElectionStatus::Upcoming,
        created_at: db::now(),
    };
    sqlx::query("INSERT INTO elections (id,title,description,start_date,end_date,status,created_at) VALUES (?,?,?,?,?,?,?)")
        .bind(&election.id)
        .bind(&election.title)
        .bind(&election.description)
        .bind(election.start_date)
        .bind(election.end_date)
        .bind(election.status)
        .bind(election.created_at)
        .execute(&db_pool)
        .await?;

    tracing::info!(election_id = %election.id, admin = %admin.id, "election created");
    Ok((StatusCode::CREATED, Json(election)))
}

#[derive(Deserialize)]
pub(crate) struct StatusUpdate {
    status: ElectionStatus,
}

#[debug_handler]
pub(crate) async fn update_status(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    AppJson(StatusUpdate { status }): AppJson<StatusUpdate>,
) -> AppResult<Json<Election>> {
    let id = id.to_string();
    let updated = sqlx::query("UPDATE elections SET status=? WHERE id=?")
        .bind(status)
        .bind(&id)
        .execute(&db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound("election"));
    }

    tracing::info!(election_id = %id, admin = %admin.id, ?status, "election status changed");
    Ok(Json(Election::fetch(&db_pool, &id).await?))
}

/// Removes an election with its candidates and ballots. False when it did not exist.
pub async fn delete_election(db_pool: &SqlitePool, id: &str) -> AppResult<bool> {
    let mut tx = db_pool.begin().await?;
    for statement in [
        "DELETE FROM votes WHERE election_id=?",
        "DELETE FROM candidates WHERE election_id=?",
    ] {
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;
    }
    let deleted = sqlx::query("DELETE FROM elections WHERE id=?")
        .bind(id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Ok(false);
    }
    tx.commit().await?;
    Ok(true)
}

#[debug_handler]
pub(crate) async fn delete(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let id = id.to_string();
    if !delete_election(&db_pool, &id).await? {
        return Err(AppError::NotFound("election"));
    }

    tracing::info!(election_id = %id, admin = %admin.id, "election deleted");
    Ok(StatusCode::NO_CONTENT)
}
