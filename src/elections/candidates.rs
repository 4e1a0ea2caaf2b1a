use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{auth::AdminUser, db, AppError, AppJson, AppResult};

use super::{non_blank, Candidate, Election};

#[debug_handler]
pub(crate) async fn list(
    State(db_pool): State<SqlitePool>,
    Path(election_id): Path<Uuid>,
) -> AppResult<Json<Vec<Candidate>>> {
    let election = Election::fetch(&db_pool, &election_id.to_string()).await?;
    Ok(Json(
        sqlx::query_as("SELECT * FROM candidates WHERE election_id=? ORDER BY created_at")
            .bind(&election.id)
            .fetch_all(&db_pool)
            .await?
    ))
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CandidateRow {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub candidate: Candidate,
    pub election_title: String,
}

#[debug_handler]
pub(crate) async fn admin_list(
    State(db_pool): State<SqlitePool>,
    _admin: AdminUser,
) -> AppResult<Json<Vec<CandidateRow>>> {
    Ok(Json(
        sqlx::query_as(
            "SELECT c.*, COALESCE(e.title,'Unknown') AS election_title
            FROM candidates c LEFT JOIN elections e ON e.id=c.election_id
            ORDER BY c.created_at DESC"
        )
            .fetch_all(&db_pool)
            .await?
    ))
}

#[derive(Deserialize)]
pub(crate) struct CandidateBody {
    election_id: Uuid,
    name: String,
    party: Option<String>,
    bio: Option<String>,
    image_url: Option<String>,
}

impl CandidateBody {
    async fn validate(self, db_pool: &SqlitePool) -> AppResult<CandidateBody> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err("Candidate name is required")?;
        }
        Election::fetch(db_pool, &self.election_id.to_string()).await?;

        Ok(CandidateBody {
            election_id: self.election_id,
            name,
            party: non_blank(self.party),
            bio: non_blank(self.bio),
            image_url: non_blank(self.image_url),
        })
    }
}

#[debug_handler]
pub(crate) async fn create(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    AppJson(body): AppJson<CandidateBody>,
) -> AppResult<(StatusCode, Json<Candidate>)> {
    let CandidateBody { election_id, name, party, bio, image_url } = body.validate(&db_pool).await?;

    let candidate = Candidate {
        id: Uuid::now_v7().to_string(),
        election_id: election_id.to_string(),
        name,
        party,
        bio,
        image_url,
        created_at: db::now(),
    };
    sqlx::query("INSERT INTO candidates (id,election_id,name,party,bio,image_url,created_at) VALUES (?,?,?,?,?,?,?)")
        .bind(&candidate.id)
        .bind(&candidate.election_id)
        .bind(&candidate.name)
        .bind(&candidate.party)
        .bind(&candidate.bio)
        .bind(&candidate.image_url)
        .bind(candidate.created_at)
        .execute(&db_pool)
        .await?;

    tracing::info!(candidate_id = %candidate.id, election_id = %candidate.election_id, admin = %admin.id, "candidate added");
    Ok((StatusCode::CREATED, Json(candidate)))
}

#[debug_handler]
pub(crate) async fn update(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    AppJson(body): AppJson<CandidateBody>,
) -> AppResult<Json<Candidate>> {
    let CandidateBody { election_id, name, party, bio, image_url } = body.validate(&db_pool).await?;
    let id = id.to_string();

    let has_votes = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM votes WHERE candidate_id=? AND election_id<>? LIMIT 1")
        .bind(&id)
        .bind(election_id.to_string())
        .fetch_optional(&db_pool)
        .await?
        .is_some();
    if has_votes {
        return Err(AppError::Conflict("Candidate already has votes in another election".to_owned()));
    }

    let updated = sqlx::query("UPDATE candidates SET election_id=?, name=?, party=?, bio=?, image_url=? WHERE id=?")
        .bind(election_id.to_string())
        .bind(&name)
        .bind(&party)
        .bind(&bio)
        .bind(&image_url)
        .bind(&id)
        .execute(&db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(AppError::NotFound("candidate"));
    }

    tracing::info!(candidate_id = %id, admin = %admin.id, "candidate updated");
    Ok(Json(
        sqlx::query_as("SELECT * FROM candidates WHERE id=?")
            .bind(&id)
            .fetch_one(&db_pool)
            .await?
    ))
}

#[debug_handler]
pub(crate) async fn delete(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let id = id.to_string();

    let has_votes = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM votes WHERE candidate_id=? LIMIT 1")
        .bind(&id)
        .fetch_optional(&db_pool)
        .await?
        .is_some();
    if has_votes {
        return Err(AppError::Conflict("Candidate already has votes and cannot be removed".to_owned()));
    }

    let deleted = sqlx::query("DELETE FROM candidates WHERE id=?")
        .bind(&id)
        .execute(&db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(AppError::NotFound("candidate"));
    }

    tracing::info!(candidate_id = %id, admin = %admin.id, "candidate removed");
    Ok(StatusCode::NO_CONTENT)
}
