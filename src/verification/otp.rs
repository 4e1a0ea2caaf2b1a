//! One-time passcode exchange binding a claimed voter id to an account.
//!
//! A user has at most one unverified challenge at a time. A challenge is
//! single use: once marked verified it never matches again, whatever happens
//! to the voter-id claim that follows.

use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{appresult::is_unique_violation, auth::CurrentUser, db::{OtpChallenge, Profile}, AppError, AppResult};

pub const CODE_TTL_MINUTES: i64 = 10;
pub const CODE_LEN: usize = 6;
pub const MAX_VOTER_ID_LEN: usize = 64;

pub const INVALID_CODE: &str = "Invalid or expired verification code";
pub const EXPIRED_CODE: &str = "Verification code has expired. Please request a new one.";
pub const VOTER_ID_TAKEN: &str = "This Voter ID is already registered to another account";

#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationState {
    None,
    Pending,
    Verified,
}

/// Where a user stands: verified wins, then any live challenge.
pub fn verification_state(profile: &Profile, pending: Option<&OtpChallenge>, now: i64) -> VerificationState {
    if profile.is_verified {
        VerificationState::Verified
    } else if pending.is_some_and(|challenge| !challenge.verified && challenge.expires_at >= now) {
        VerificationState::Pending
    } else {
        VerificationState::None
    }
}

pub fn generate_code() -> String {
    rand::rng().random_range(100_000..=999_999u32).to_string()
}

/// Digest stored in place of the code. Bound to the user so equal codes differ across users.
pub fn hash_code(user_id: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

fn digests_match(stored: &str, submitted: &str) -> bool {
    stored.as_bytes().ct_eq(submitted.as_bytes()).into()
}

fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit())
}

pub async fn pending_challenge(db_pool: &SqlitePool, user_id: &str) -> AppResult<Option<OtpChallenge>> {
    Ok(
        sqlx::query_as("SELECT * FROM otp_verifications WHERE user_id=? AND verified=0 ORDER BY created_at DESC LIMIT 1")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await?
    )
}

/// Replaces any pending challenge for `user` with a fresh one.
pub async fn request_code(
    db_pool: &SqlitePool,
    user: &CurrentUser,
    voter_id: &str,
    email: &str,
    now: i64,
) -> AppResult<IssuedCode> {
    let voter_id = voter_id.trim();
    let email = email.trim().to_lowercase();
    if voter_id.is_empty() || email.is_empty() {
        return Err("Voter ID and email are required")?;
    }
    if voter_id.chars().count() > MAX_VOTER_ID_LEN {
        return Err(format!("Voter ID must be at most {MAX_VOTER_ID_LEN} characters"))?;
    }
    if email != user.email.to_lowercase() {
        return Err("Email must match your account email")?;
    }

    let code = generate_code();
    let expires_at = now + CODE_TTL_MINUTES * 60;

    let mut tx = db_pool.begin().await?;
    let replaced = sqlx::query("DELETE FROM otp_verifications WHERE user_id=? AND verified=0")
        .bind(&user.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    sqlx::query("INSERT INTO otp_verifications (id,user_id,email,voter_id,code_hash,expires_at,verified,created_at) VALUES (?,?,?,?,?,?,0,?)")
        .bind(Uuid::now_v7().to_string())
        .bind(&user.id)
        .bind(&email)
        .bind(voter_id)
        .bind(hash_code(&user.id, &code))
        .bind(expires_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, replaced, "verification code requested");
    Ok(IssuedCode { code, expires_at })
}

/// Consumes the matching challenge and claims its voter id for `user`.
/// Returns the claimed voter id.
pub async fn verify_code(
    db_pool: &SqlitePool,
    user: &CurrentUser,
    code: &str,
    now: i64,
) -> AppResult<String> {
    let code = code.trim();
    if !is_well_formed(code) {
        return Err("Valid 6-digit OTP code is required")?;
    }
    let submitted = hash_code(&user.id, code);

    let mut tx = db_pool.begin().await?;
    let pending: Vec<OtpChallenge> = sqlx::query_as("SELECT * FROM otp_verifications WHERE user_id=? AND verified=0")
        .bind(&user.id)
        .fetch_all(&mut *tx)
        .await?;

    let Some(challenge) = pending
        .into_iter()
        .find(|challenge| digests_match(&challenge.code_hash, &submitted))
    else {
        return Err(INVALID_CODE)?;
    };

    if challenge.expires_at < now {
        return Err(EXPIRED_CODE)?;
    }

    let consumed = sqlx::query("UPDATE otp_verifications SET verified=1 WHERE id=? AND verified=0")
        .bind(&challenge.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if consumed == 0 {
        return Err(INVALID_CODE)?;
    }

    let claimed_elsewhere = sqlx::query_as::<_, (i64,)>("SELECT 1 FROM profiles WHERE voter_id=? AND user_id<>?")
        .bind(&challenge.voter_id)
        .bind(&user.id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
    if claimed_elsewhere {
        tx.commit().await?;
        tracing::warn!(user_id = %user.id, "voter id already claimed");
        return Err(AppError::Conflict(VOTER_ID_TAKEN.to_owned()));
    }

    // The unique index on profiles.voter_id settles a concurrent claim that slipped past the check.
    let updated = sqlx::query("UPDATE profiles SET is_verified=1, voter_id=?, updated_at=? WHERE user_id=?")
        .bind(&challenge.voter_id)
        .bind(now)
        .bind(&user.id)
        .execute(&mut *tx)
        .await;
    match updated {
        Ok(result) if result.rows_affected() == 1 => {}
        Ok(_) => return Err(anyhow::anyhow!("no profile for user {}", user.id))?,
        Err(err) if is_unique_violation(&err) => {
            tx.commit().await?;
            tracing::warn!(user_id = %user.id, "voter id claimed concurrently");
            return Err(AppError::Conflict(VOTER_ID_TAKEN.to_owned()));
        }
        Err(err) => return Err(err)?,
    }
    tx.commit().await?;

    tracing::info!(user_id = %user.id, voter_id = %challenge.voter_id, "identity verified");
    Ok(challenge.voter_id)
}
