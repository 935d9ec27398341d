use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{post, put},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{
    auth::{
        generate_access_token, generate_temp_password, hash_access_token, hash_password,
        verify_password,
    },
    error::{ApiError, db_error},
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, MessageResponse, UserPublic, UserRole, UserStatus, now_utc},
    notify::{self, EmailStatus},
    routes::{
        non_empty,
        user_routes::{fetch_user, fetch_user_by_username},
    },
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/change-password", put(change_password))
        .route("/forgot-password", post(forgot_password))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub email: Option<String>,
    pub user_type: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub message: String,
    pub user: UserPublic,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ForgotPasswordResponse {
    pub message: String,
    pub email_status: EmailStatus,
}

/// Issue a new bearer token for `user_id`. Only the token hash is stored.
async fn create_session(state: &AppState, user_id: i64) -> Result<String, ApiError> {
    let access_token = generate_access_token();
    let token_hash = hash_access_token(&access_token);
    let now = now_utc();
    let expires_at = now + Duration::hours(state.session_ttl_hours);

    sqlx::query(
        r#"
        INSERT INTO session_tokens (user_id, token_hash, expires_at, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(now)
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    Ok(access_token)
}

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let (Some(username), Some(password), Some(email)) = (
        non_empty(&req.username),
        req.password.as_deref().filter(|p| !p.is_empty()),
        non_empty(&req.email),
    ) else {
        return Err(ApiError::BadRequest(
            "Username, password, and email are required.".into(),
        ));
    };

    let user_type: UserRole = match non_empty(&req.user_type) {
        None => UserRole::Patient,
        Some(raw) => raw.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "Invalid user type. Possible values: {}",
                UserRole::expected()
            ))
        })?,
    };

    if fetch_user_by_username(&state.db, username)
        .await
        .map_err(db_error)?
        .is_some()
    {
        return Err(ApiError::BadRequest("User already exists.".into()));
    }

    let email_taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?;
    if email_taken.is_some() {
        return Err(ApiError::BadRequest("Email is already registered.".into()));
    }

    let password_hash = hash_password(password).map_err(ApiError::Internal)?;
    let now = now_utc();

    let res = sqlx::query(
        r#"
        INSERT INTO users
            (username, email, password_hash, user_type, status, first_name, last_name, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(username)
    .bind(email)
    .bind(&password_hash)
    .bind(user_type)
    .bind(UserStatus::Active)
    .bind(non_empty(&req.first_name).unwrap_or(""))
    .bind(non_empty(&req.last_name).unwrap_or(""))
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await
    .map_err(|e| match e {
        // Lost a race against a concurrent registration.
        sqlx::Error::Database(ref d) if d.is_unique_violation() => {
            ApiError::BadRequest("User already exists.".into())
        }
        other => db_error(other),
    })?;

    let user_id = res.last_insert_rowid();
    let user = fetch_user(&state.db, user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::Internal(format!("user {user_id} vanished after insert")))?;

    let access_token = create_session(&state, user_id).await?;

    tracing::info!("registered {} user {}", user.user_type, user.username);

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully!".into(),
            user: user.into(),
            access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let (Some(username), Some(password)) = (
        non_empty(&req.username),
        req.password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        tracing::warn!("login attempt with missing username or password");
        return Err(ApiError::BadRequest(
            "Username and password are required.".into(),
        ));
    };

    let Some(user) = fetch_user_by_username(&state.db, username)
        .await
        .map_err(db_error)?
    else {
        tracing::info!("login attempt for unknown user {username}");
        return Err(ApiError::NotFound("User not found.".into()));
    };

    if !verify_password(password, &user.password_hash) {
        tracing::warn!("failed login for {username}: wrong password");
        return Err(ApiError::Unauthorized("Invalid password.".into()));
    }

    if user.status != UserStatus::Active {
        tracing::warn!("login refused for disabled account {username}");
        return Err(ApiError::Forbidden("Account is disabled.".into()));
    }

    let access_token = create_session(&state, user.id).await?;
    tracing::info!("user {} logged in", user.username);

    Ok(Json(AuthResponse {
        message: "Login successful!".into(),
        user: user.into(),
        access_token,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<MessageResponse>, ApiError> {
    let rows = sqlx::query(
        r#"
        UPDATE session_tokens
        SET revoked_at = ?
        WHERE id = ?
          AND user_id = ?
          AND revoked_at IS NULL
        "#,
    )
    .bind(now_utc())
    .bind(auth.session_token_id)
    .bind(auth.user_id)
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    if rows.rows_affected() == 0 {
        return Err(ApiError::invalid_token());
    }

    Ok(MessageResponse::new("Logged out successfully."))
}

pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (Some(current), Some(new_password)) = (
        req.current_password.as_deref().filter(|p| !p.is_empty()),
        req.new_password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(ApiError::BadRequest(
            "Current password and new password are required.".into(),
        ));
    };

    let user = fetch_user(&state.db, auth.user_id)
        .await
        .map_err(db_error)?
        .ok_or_else(ApiError::invalid_token)?;

    if !verify_password(current, &user.password_hash) {
        return Err(ApiError::Unauthorized(
            "Current password is incorrect.".into(),
        ));
    }

    let new_hash = hash_password(new_password).map_err(ApiError::Internal)?;
    let now = now_utc();

    let mut tx = state.db.begin().await.map_err(db_error)?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(new_hash)
        .bind(now)
        .bind(auth.user_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    // Keep the current session, drop the others.
    sqlx::query(
        r#"
        UPDATE session_tokens
        SET revoked_at = ?
        WHERE user_id = ?
          AND revoked_at IS NULL
          AND id <> ?
        "#,
    )
    .bind(now)
    .bind(auth.user_id)
    .bind(auth.session_token_id)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!("user {} changed password", auth.user_id);
    Ok(MessageResponse::new("Password changed successfully!"))
}

pub async fn forgot_password(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ForgotPasswordRequest>,
) -> Result<Json<ForgotPasswordResponse>, ApiError> {
    let Some(username) = non_empty(&req.username) else {
        return Err(ApiError::BadRequest("Username is required.".into()));
    };

    let user = fetch_user_by_username(&state.db, username)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound("User not found.".into()))?;

    let temporary = generate_temp_password();
    let new_hash = hash_password(&temporary).map_err(ApiError::Internal)?;
    let now = now_utc();

    let mut tx = state.db.begin().await.map_err(db_error)?;

    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(new_hash)
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    sqlx::query("UPDATE session_tokens SET revoked_at = ? WHERE user_id = ? AND revoked_at IS NULL")
        .bind(now)
        .bind(user.id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    let email = notify::password_reset_email(&user, &temporary);
    let email_status = notify::send_email(state.mailer.as_ref(), &user.email, &email).await;
    tracing::info!("password reset for {}: {}", user.username, email_status.as_str());

    Ok(Json(ForgotPasswordResponse {
        message: "Password has been reset. A temporary password was sent by email.".into(),
        email_status,
    }))
}
