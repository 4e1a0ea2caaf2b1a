use std::str::FromStr;

use axum::{body::Bytes, debug_handler, extract::{Path, Query, State}, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    appresult::is_unique_violation,
    auth::{AdminUser, CurrentUser},
    db::{self, Profile},
    AppError, AppJson, AppResult,
};

use super::otp::{MAX_VOTER_ID_LEN, VOTER_ID_TAKEN};

const DEFAULT_REJECTION: &str = "Document not acceptable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ReviewStatus::*;
        match s {
            "pending" => Ok(Pending),
            "approved" => Ok(Approved),
            "rejected" => Ok(Rejected),
            other => Err(format!("Unknown status filter {other:?}")),
        }
    }
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        use ReviewStatus::*;
        match self {
            Pending => "pending",
            Approved => "approved",
            Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct VerificationRequest {
    pub id: String,
    pub user_id: String,
    pub document_url: String,
    pub document_type: String,
    pub voter_id: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<i64>,
    pub created_at: i64,
}

/// A request as the review queue shows it, with who asked.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ReviewItem {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub request: VerificationRequest,
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SubmitBody {
    document_url: String,
    document_type: String,
    voter_id: Option<String>,
}

#[debug_handler]
pub async fn submit_request(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
    AppJson(SubmitBody { document_url, document_type, voter_id }): AppJson<SubmitBody>,
) -> AppResult<(StatusCode, Json<VerificationRequest>)> {
    let document_url = document_url.trim();
    let document_type = document_type.trim();
    if document_url.is_empty() || document_type.is_empty() {
        return Err("Document and document type are required")?;
    }
    let voter_id = voter_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    if voter_id.is_some_and(|id| id.chars().count() > MAX_VOTER_ID_LEN) {
        return Err(format!("Voter ID must be at most {MAX_VOTER_ID_LEN} characters"))?;
    }

    let profile = Profile::fetch(&db_pool, &user.id).await?.ok_or(AppError::NotFound("profile"))?;
    if profile.is_verified {
        return Err("Your identity is already verified")?;
    }

    let mut tx = db_pool.begin().await?;
    let pending = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM verification_requests WHERE user_id=? AND status='pending'")
        .bind(&user.id)
        .fetch_optional(&mut *tx)
        .await?;
    if pending.is_some() {
        return Err(AppError::Conflict("A verification request is already pending".to_owned()));
    }

    let request = VerificationRequest {
        id: Uuid::now_v7().to_string(),
        user_id: user.id.clone(),
        document_url: document_url.to_owned(),
        document_type: document_type.to_owned(),
        voter_id: voter_id.map(str::to_owned),
        status: ReviewStatus::Pending.as_str().to_owned(),
        rejection_reason: None,
        reviewed_by: None,
        reviewed_at: None,
        created_at: db::now(),
    };
    sqlx::query("INSERT INTO verification_requests (id,user_id,document_url,document_type,voter_id,status,created_at) VALUES (?,?,?,?,?,?,?)")
        .bind(&request.id)
        .bind(&request.user_id)
        .bind(&request.document_url)
        .bind(&request.document_type)
        .bind(&request.voter_id)
        .bind(&request.status)
        .bind(request.created_at)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, request_id = %request.id, "verification request submitted");
    Ok((StatusCode::CREATED, Json(request)))
}

#[debug_handler]
pub async fn own_requests(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
) -> AppResult<Json<Vec<VerificationRequest>>> {
    Ok(Json(
        sqlx::query_as("SELECT * FROM verification_requests WHERE user_id=? ORDER BY created_at DESC")
            .bind(&user.id)
            .fetch_all(&db_pool)
            .await?
    ))
}

#[derive(Deserialize)]
pub(crate) struct ReviewQuery {
    status: Option<String>,
}

#[debug_handler]
pub async fn review_queue(
    State(db_pool): State<SqlitePool>,
    _admin: AdminUser,
    Query(ReviewQuery { status }): Query<ReviewQuery>,
) -> AppResult<Json<Vec<ReviewItem>>> {
    let status = match status.as_deref() {
        None | Some("all") => None,
        Some(other) => Some(other.parse::<ReviewStatus>()?),
    };

    let items = sqlx::query_as(
        "SELECT r.*, p.full_name, p.email FROM verification_requests r LEFT JOIN profiles p ON p.user_id=r.user_id WHERE (?1 IS NULL OR r.status=?1) ORDER BY r.created_at DESC"
    )
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&db_pool)
        .await?;
    Ok(Json(items))
}

async fn load_pending(tx: &mut sqlx::SqliteConnection, id: &str) -> AppResult<VerificationRequest> {
    let request: VerificationRequest = sqlx::query_as("SELECT * FROM verification_requests WHERE id=?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("verification request"))?;
    if request.status != ReviewStatus::Pending.as_str() {
        return Err("Only pending requests can be reviewed")?;
    }
    Ok(request)
}

#[debug_handler]
pub async fn approve(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VerificationRequest>> {
    let mut tx = db_pool.begin().await?;
    let mut request = load_pending(&mut tx, &id.to_string()).await?;
    let now = db::now();

    if let Some(voter_id) = &request.voter_id {
        let claimed_elsewhere = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM profiles WHERE voter_id=? AND user_id<>?")
            .bind(voter_id)
            .bind(&request.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if claimed_elsewhere {
            return Err(AppError::Conflict(VOTER_ID_TAKEN.to_owned()));
        }
    }

    let updated = sqlx::query("UPDATE profiles SET is_verified=1, voter_id=COALESCE(?, voter_id), updated_at=? WHERE user_id=?")
        .bind(&request.voter_id)
        .bind(now)
        .bind(&request.user_id)
        .execute(&mut *tx)
        .await;
    match updated {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(AppError::Conflict(VOTER_ID_TAKEN.to_owned())),
        Err(err) => return Err(err)?,
    }

    sqlx::query("UPDATE verification_requests SET status='approved', reviewed_by=?, reviewed_at=? WHERE id=?")
        .bind(&admin.id)
        .bind(now)
        .bind(&request.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(request_id = %request.id, reviewer = %admin.id, "verification request approved");
    request.status = ReviewStatus::Approved.as_str().to_owned();
    request.reviewed_by = Some(admin.id);
    request.reviewed_at = Some(now);
    Ok(Json(request))
}

#[derive(Deserialize, Default)]
pub(crate) struct RejectBody {
    reason: Option<String>,
}

#[debug_handler]
pub async fn reject(
    State(db_pool): State<SqlitePool>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> AppResult<Json<VerificationRequest>> {
    let RejectBody { reason } = if body.is_empty() {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| format!("Invalid request body: {e}"))?
    };
    let reason = reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or(DEFAULT_REJECTION)
        .to_owned();

    let mut tx = db_pool.begin().await?;
    let mut request = load_pending(&mut tx, &id.to_string()).await?;
    let now = db::now();

    sqlx::query("UPDATE verification_requests SET status='rejected', rejection_reason=?, reviewed_by=?, reviewed_at=? WHERE id=?")
        .bind(&reason)
        .bind(&admin.id)
        .bind(now)
        .bind(&request.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(request_id = %request.id, reviewer = %admin.id, "verification request rejected");
    request.status = ReviewStatus::Rejected.as_str().to_owned();
    request.rejection_reason = Some(reason);
    request.reviewed_by = Some(admin.id);
    request.reviewed_at = Some(now);
    Ok(Json(request))
}
