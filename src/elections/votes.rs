use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{appresult::is_unique_violation, auth::CurrentUser, db::{self, Profile}, AppError, AppJson, AppResult};

use super::{Election, ElectionStatus, VoteEvent, VoteFeed};

pub const ALREADY_VOTED: &str = "You have already voted in this election";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Ballot {
    pub success: bool,
    /// Opaque receipt the voter can keep; not linked to the ballot by any public read.
    pub receipt: String,
}

/// Records one ballot for `user` and announces it to live subscribers.
pub async fn cast_vote(
    db_pool: &SqlitePool,
    feed: &VoteFeed,
    user: &CurrentUser,
    election_id: &str,
    candidate_id: &str,
) -> AppResult<Ballot> {
    let profile = Profile::fetch(db_pool, &user.id).await?.ok_or(AppError::NotFound("profile"))?;
    if !profile.is_verified {
        return Err("You must verify your identity before voting")?;
    }

    let election = Election::fetch(db_pool, election_id).await?;
    if election.status != ElectionStatus::Active {
        return Err("This election is not open for voting")?;
    }

    let standing = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM candidates WHERE id=? AND election_id=?")
        .bind(candidate_id)
        .bind(&election.id)
        .fetch_optional(db_pool)
        .await?
        .is_some();
    if !standing {
        return Err("Candidate is not standing in this election")?;
    }

    let receipt = format!("0x{}", hex::encode(rand::random::<[u8; 32]>()));
    let inserted = sqlx::query("INSERT INTO votes (id,election_id,candidate_id,user_id,receipt,created_at) VALUES (?,?,?,?,?,?)")
        .bind(Uuid::now_v7().to_string())
        .bind(&election.id)
        .bind(candidate_id)
        .bind(&user.id)
        .bind(&receipt)
        .bind(db::now())
        .execute(db_pool)
        .await;
    let seq = match inserted {
        Ok(result) => result.last_insert_rowid(),
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::Conflict(ALREADY_VOTED.to_owned()));
        }
        Err(err) => return Err(err)?,
    };

    tracing::info!(election_id = %election.id, seq, "ballot recorded");
    feed.publish(VoteEvent {
        seq,
        election_id: election.id,
        candidate_id: candidate_id.to_owned(),
    });

    Ok(Ballot { success: true, receipt })
}

#[derive(Deserialize)]
pub(crate) struct CastBody {
    candidate_id: Uuid,
}

#[debug_handler(state = crate::AppState)]
pub async fn cast(
    State(db_pool): State<SqlitePool>,
    State(feed): State<VoteFeed>,
    user: CurrentUser,
    Path(election_id): Path<Uuid>,
    AppJson(CastBody { candidate_id }): AppJson<CastBody>,
) -> AppResult<(StatusCode, Json<Ballot>)> {
    let ballot = cast_vote(&db_pool, &feed, &user, &election_id.to_string(), &candidate_id.to_string()).await?;
    Ok((StatusCode::CREATED, Json(ballot)))
}

#[derive(Serialize)]
pub struct HasVoted {
    has_voted: bool,
}

#[debug_handler]
pub async fn has_voted(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
    Path(election_id): Path<Uuid>,
) -> AppResult<Json<HasVoted>> {
    let has_voted = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM votes WHERE election_id=? AND user_id=?")
        .bind(election_id.to_string())
        .bind(&user.id)
        .fetch_optional(&db_pool)
        .await?
        .is_some();
    Ok(Json(HasVoted { has_voted }))
}
