use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use time::OffsetDateTime;

// unique: users.email
// unique: profiles.user_id, profiles.voter_id
// unique: votes(election_id, user_id)
// votes.seq never repeats, even after ballots are deleted
const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sessions (
        token_hash TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        expires_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS user_roles (
        user_id TEXT NOT NULL REFERENCES users(id),
        role TEXT NOT NULL,
        PRIMARY KEY (user_id, role)
    )",
    "CREATE TABLE IF NOT EXISTS profiles (
        user_id TEXT PRIMARY KEY REFERENCES users(id),
        email TEXT NOT NULL,
        full_name TEXT,
        is_verified INTEGER NOT NULL DEFAULT 0,
        voter_id TEXT,
        updated_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS profiles_voter_id ON profiles(voter_id)",
    "CREATE TABLE IF NOT EXISTS otp_verifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        email TEXT NOT NULL,
        voter_id TEXT NOT NULL,
        code_hash TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        verified INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS verification_requests (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        document_url TEXT NOT NULL,
        document_type TEXT NOT NULL,
        voter_id TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        rejection_reason TEXT,
        reviewed_by TEXT,
        reviewed_at INTEGER,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS elections (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        start_date INTEGER NOT NULL,
        end_date INTEGER NOT NULL,
        status TEXT NOT NULL DEFAULT 'upcoming',
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS candidates (
        id TEXT PRIMARY KEY,
        election_id TEXT NOT NULL REFERENCES elections(id),
        name TEXT NOT NULL,
        party TEXT,
        bio TEXT,
        image_url TEXT,
        created_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS votes (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        election_id TEXT NOT NULL REFERENCES elections(id),
        candidate_id TEXT NOT NULL REFERENCES candidates(id),
        user_id TEXT NOT NULL REFERENCES users(id),
        receipt TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (election_id, user_id)
    )",
    "CREATE VIEW IF NOT EXISTS vote_counts AS
        SELECT election_id, candidate_id, COUNT(*) AS vote_count
        FROM votes
        GROUP BY election_id, candidate_id",
];

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    Ok(())
}

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

/// A migrated in-memory database. Single connection, so every query sees the same data.
pub async fn memory_pool() -> Result<SqlitePool, sqlx::Error> {
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq, Eq)]
pub struct Profile {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub is_verified: bool,
    pub voter_id: Option<String>,
    pub updated_at: i64,
}

impl Profile {
    pub async fn fetch(db_pool: &SqlitePool, user_id: &str) -> Result<Option<Profile>, sqlx::Error> {
        sqlx::query_as("SELECT user_id,email,full_name,is_verified,voter_id,updated_at FROM profiles WHERE user_id=?")
            .bind(user_id)
            .fetch_optional(db_pool)
            .await
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OtpChallenge {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub voter_id: String,
    pub code_hash: String,
    pub expires_at: i64,
    pub verified: bool,
    pub created_at: i64,
}
