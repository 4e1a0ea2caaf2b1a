use axum::{debug_handler, extract::State, Json};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{db::Profile, AppResult};

use super::CurrentUser;

#[derive(Serialize)]
pub struct MeResponse {
    user: CurrentUser,
    profile: Option<Profile>,
    /// Optimistic, for UI hints only. Admin routes check the role themselves.
    roles: Vec<String>,
}

#[debug_handler]
pub async fn me(
    State(db_pool): State<SqlitePool>,
    user: CurrentUser,
) -> AppResult<Json<MeResponse>> {
    let profile = Profile::fetch(&db_pool, &user.id).await?;
    let roles = sqlx::query_as::<_, (String,)>("SELECT role FROM user_roles WHERE user_id=? ORDER BY role")
        .bind(&user.id)
        .fetch_all(&db_pool)
        .await?
        .into_iter()
        .map(|(role,)| role)
        .collect();

    Ok(Json(MeResponse { user, profile, roles }))
}
