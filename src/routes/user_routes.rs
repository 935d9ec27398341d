// src/routes/user_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use serde::Serialize;

use crate::{
    error::{ApiError, db_error},
    middleware::auth_context::AuthContext,
    models::{AppState, MessageResponse, UserPublic, UserRole, UserRow, UserStatus, now_utc},
    policy,
};

pub(crate) const USER_COLUMNS: &str =
    "id, username, email, password_hash, user_type, status, first_name, last_name";

pub(crate) async fn fetch_user<'e, E>(db: E, user_id: i64) -> Result<Option<UserRow>, sqlx::Error>
where
    E: sqlx::SqliteExecutor<'e>,
{
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(db)
        .await
}

pub(crate) async fn fetch_user_by_username<'e, E>(
    db: E,
    username: &str,
) -> Result<Option<UserRow>, sqlx::Error>
where
    E: sqlx::SqliteExecutor<'e>,
{
    sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?"))
        .bind(username)
        .fetch_optional(db)
        .await
}

/// Load a user or answer 404 with `message`.
pub(crate) async fn require_user(
    state: &AppState,
    user_id: i64,
    message: &str,
) -> Result<UserRow, ApiError> {
    fetch_user(&state.db, user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound(message.into()))
}

#[derive(Debug, Serialize)]
pub struct UsersListResponse {
    pub users: Vec<UserPublic>,
}

#[derive(Debug, Serialize)]
pub struct TherapistsListResponse {
    pub therapists: Vec<UserPublic>,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserPublic,
}

#[derive(Debug, Serialize)]
pub struct UserUpdatedResponse {
    pub message: String,
    pub user: UserPublic,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{user_id}", get(get_user).delete(delete_user))
        .route("/users/{user_id}/disable", post(disable_user))
        .route("/users/{user_id}/enable", post(enable_user))
        .route("/therapists", get(list_therapists))
}

pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<UsersListResponse>, ApiError> {
    let users: Vec<UserPublic> = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, username, email, user_type, first_name, last_name, status
        FROM users
        ORDER BY id ASC
        "#,
    )
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(UsersListResponse { users }))
}

pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = require_user(&state, user_id, "User not found.").await?;
    Ok(Json(UserResponse { user: user.into() }))
}

pub async fn list_therapists(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> Result<Json<TherapistsListResponse>, ApiError> {
    let therapists: Vec<UserPublic> = sqlx::query_as::<_, UserPublic>(
        r#"
        SELECT id, username, email, user_type, first_name, last_name, status
        FROM users
        WHERE user_type = ?
        ORDER BY id ASC
        "#,
    )
    .bind(UserRole::Therapist)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(TherapistsListResponse { therapists }))
}

async fn set_user_status(
    state: &AppState,
    auth: &AuthContext,
    user_id: i64,
    status: UserStatus,
) -> Result<UserPublic, ApiError> {
    policy::MANAGE_USERS.check(auth, &[])?;

    let res = sqlx::query("UPDATE users SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_utc())
        .bind(user_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    if res.rows_affected() == 0 {
        return Err(ApiError::NotFound("User not found.".into()));
    }

    if status == UserStatus::Inactive {
        // Disabled accounts lose every open session.
        sqlx::query(
            "UPDATE session_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL",
        )
        .bind(now_utc())
        .bind(user_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;
    }

    tracing::info!("user {} set to {} by {}", user_id, status, auth.user_id);
    Ok(require_user(state, user_id, "User not found.").await?.into())
}

pub async fn disable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<UserUpdatedResponse>, ApiError> {
    let user = set_user_status(&state, &auth, user_id, UserStatus::Inactive).await?;
    Ok(Json(UserUpdatedResponse {
        message: "User disabled successfully!".into(),
        user,
    }))
}

pub async fn enable_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<UserUpdatedResponse>, ApiError> {
    let user = set_user_status(&state, &auth, user_id, UserStatus::Active).await?;
    Ok(Json(UserUpdatedResponse {
        message: "User enabled successfully!".into(),
        user,
    }))
}

/// Rows in other tables that point at a user and must not be orphaned.
/// Sessions and notifications belong to the user alone and go with it.
#[derive(Debug, sqlx::FromRow)]
struct UserDependents {
    appointments: i64,
    treatments: i64,
    mood_entries: i64,
    chat_messages: i64,
}

impl UserDependents {
    fn total(&self) -> i64 {
        self.appointments + self.treatments + self.mood_entries + self.chat_messages
    }
}

pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    policy::MANAGE_USERS.check(&auth, &[])?;

    let mut tx = state.db.begin().await.map_err(db_error)?;

    if fetch_user(&mut *tx, user_id).await.map_err(db_error)?.is_none() {
        return Err(ApiError::NotFound("User not found.".into()));
    }

    let deps: UserDependents = sqlx::query_as::<_, UserDependents>(
        r#"
        SELECT
          (SELECT COUNT(*) FROM appointments WHERE patient_id = ?1 OR therapist_id = ?1) AS appointments,
          (SELECT COUNT(*) FROM treatments   WHERE patient_id = ?1 OR therapist_id = ?1) AS treatments,
          (SELECT COUNT(*) FROM mood_entries WHERE patient_id = ?1 OR therapist_id = ?1) AS mood_entries,
          (SELECT COUNT(*) FROM chat_messages WHERE sender_id = ?1 OR recipient_id = ?1) AS chat_messages
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *tx)
    .await
    .map_err(db_error)?;

    if deps.total() > 0 {
        tracing::warn!("refusing to delete user {user_id}: {deps:?}");
        return Err(ApiError::Conflict(format!(
            "User cannot be deleted: referenced by {} appointment(s), {} treatment(s), {} mood entr(ies) and {} chat message(s).",
            deps.appointments, deps.treatments, deps.mood_entries, deps.chat_messages
        )));
    }

    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!("user {} deleted by {}", user_id, auth.user_id);
    Ok(MessageResponse::new("User deleted successfully!"))
}
