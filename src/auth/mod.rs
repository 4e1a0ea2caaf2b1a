use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::{db, AppError, AppResult, AppState};

mod admin;
mod login;
mod logout;
mod me;
mod password;
mod signup;

pub use admin::verify_admin;
pub use login::login;
pub use logout::logout;
pub use me::me;
pub use signup::signup;

pub const ADMIN_ROLE: &str = "admin";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/me", get(me))
        .route("/functions/verify-admin", get(verify_admin).post(verify_admin))
}

/// The caller, resolved from the bearer token on every request.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

/// A caller whose `admin` role was confirmed against storage for this request.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl<S> FromRequestParts<S> for CurrentUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let db_pool = SqlitePool::from_ref(state);
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        resolve_token(&db_pool, token).await
    }
}

impl<S> FromRequestParts<S> for AdminUser
where
    SqlitePool: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        let db_pool = SqlitePool::from_ref(state);
        if !has_role(&db_pool, &user.id, ADMIN_ROLE).await? {
            tracing::warn!(user_id = %user.id, "admin route refused");
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then_some(token)
}

pub(crate) fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

pub async fn resolve_token(db_pool: &SqlitePool, token: &str) -> AppResult<CurrentUser> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT users.id,users.email FROM sessions JOIN users ON users.id=sessions.user_id WHERE sessions.token_hash=? AND sessions.expires_at>?"
    )
        .bind(hash_token(token))
        .bind(db::now())
        .fetch_optional(db_pool)
        .await?;

    let (id, email) = row.ok_or(AppError::Unauthorized)?;
    Ok(CurrentUser { id, email })
}

pub async fn has_role(db_pool: &SqlitePool, user_id: &str, role: &str) -> AppResult<bool> {
    Ok(
        sqlx::query_as::<_, (i64,)>("SELECT 1 FROM user_roles WHERE user_id=? AND role=?")
            .bind(user_id)
            .bind(role)
            .fetch_optional(db_pool)
            .await?
            .is_some()
    )
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_at: i64,
    pub user: CurrentUser,
}

pub(crate) async fn issue_session(db_pool: &SqlitePool, user: CurrentUser, ttl_hours: i64) -> AppResult<SessionResponse> {
    let access_token = hex::encode(rand::random::<[u8; 32]>());
    let now = db::now();
    let expires_at = now + ttl_hours * 60 * 60;

    // every sign-in sweeps expired sessions
    let purged = sqlx::query("DELETE FROM sessions WHERE expires_at<=?")
        .bind(now)
        .execute(db_pool)
        .await?
        .rows_affected();
    if purged > 0 {
        tracing::debug!(purged, "expired sessions removed");
    }

    sqlx::query("INSERT INTO sessions (token_hash,user_id,expires_at) VALUES (?,?,?)")
        .bind(hash_token(&access_token))
        .bind(&user.id)
        .bind(expires_at)
        .execute(db_pool)
        .await?;

    Ok(SessionResponse { access_token, token_type: "bearer", expires_at, user })
}

pub(crate) async fn create_user(
    tx: &mut Transaction<'_, Sqlite>,
    email: &str,
    password_hash: &str,
    full_name: Option<&str>,
    roles: &[&str],
) -> Result<CurrentUser, sqlx::Error> {
    let id = Uuid::now_v7().to_string();
    let now = db::now();

    sqlx::query("INSERT INTO users (id,email,password_hash,created_at) VALUES (?,?,?,?)")
        .bind(&id)
        .bind(email)
        .bind(password_hash)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    sqlx::query("INSERT INTO profiles (user_id,email,full_name,is_verified,updated_at) VALUES (?,?,?,0,?)")
        .bind(&id)
        .bind(email)
        .bind(full_name)
        .bind(now)
        .execute(&mut **tx)
        .await?;

    for role in roles {
        sqlx::query("INSERT INTO user_roles (user_id,role) VALUES (?,?)")
            .bind(&id)
            .bind(role)
            .execute(&mut **tx)
            .await?;
    }

    tracing::info!(user_id = %id, ?roles, "user created");
    Ok(CurrentUser { id, email: email.to_owned() })
}

/// Lower-cases and checks the rough shape `local@domain.tld`.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    let (local, domain) = email.split_once('@')?;
    let shaped = !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.contains(char::is_whitespace);
    shaped.then_some(email)
}
