// src/routes/notification_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, put},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, db_error},
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, MessageResponse, NotificationRow, NotificationStatus, now_utc},
    notify::insert_notification,
    routes::non_empty,
};

const NOTIFICATION_COLUMNS: &str = "id, user_id, message, status, created_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_unread).post(create_notification))
        .route("/notifications/{notification_id}", put(update_notification))
        .route(
            "/notifications/{notification_id}/mark_as_read",
            patch(mark_as_read),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNotificationRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NotificationMessageResponse {
    pub message: String,
    pub notification: NotificationRow,
}

#[derive(Debug, Serialize)]
pub struct NotificationsListResponse {
    pub message: String,
    pub notifications: Vec<NotificationRow>,
}

async fn fetch_notification(
    state: &AppState,
    notification_id: i64,
) -> Result<Option<NotificationRow>, ApiError> {
    sqlx::query_as::<_, NotificationRow>(&format!(
        "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = ?"
    ))
    .bind(notification_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)
}

async fn write_status(
    state: &AppState,
    notification_id: i64,
    status: NotificationStatus,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE notifications SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_utc())
        .bind(notification_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// A free-form notification addressed to the caller.
pub async fn create_notification(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<NotificationMessageResponse>), ApiError> {
    let Some(message) = non_empty(&req.message) else {
        return Err(ApiError::BadRequest("Message is required.".into()));
    };

    let notification_id = insert_notification(&state.db, auth.user_id, message)
        .await
        .map_err(db_error)?;

    let notification = fetch_notification(&state, notification_id)
        .await?
        .ok_or_else(|| {
            ApiError::Internal(format!("notification {notification_id} vanished after insert"))
        })?;

    Ok((
        StatusCode::CREATED,
        Json(NotificationMessageResponse {
            message: "Notification created successfully!".into(),
            notification,
        }),
    ))
}

pub async fn list_unread(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<NotificationsListResponse>, ApiError> {
    let notifications: Vec<NotificationRow> = sqlx::query_as::<_, NotificationRow>(&format!(
        r#"
        SELECT {NOTIFICATION_COLUMNS}
        FROM notifications
        WHERE user_id = ? AND status = ?
        ORDER BY id ASC
        "#
    ))
    .bind(auth.user_id)
    .bind(NotificationStatus::Unread)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(NotificationsListResponse {
        message: "Unread notifications retrieved successfully!".into(),
        notifications,
    }))
}

/// Someone else's notification is reported exactly like a missing one.
pub async fn mark_as_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(notification_id): Path<i64>,
) -> Result<Json<NotificationMessageResponse>, ApiError> {
    let owned = fetch_notification(&state, notification_id)
        .await?
        .filter(|n| n.user_id == auth.user_id);

    if owned.is_none() {
        return Err(ApiError::NotFound(
            "Notification not found or access denied.".into(),
        ));
    }

    write_status(&state, notification_id, NotificationStatus::Read).await?;

    let notification = fetch_notification(&state, notification_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Notification not found.".into()))?;

    Ok(Json(NotificationMessageResponse {
        message: "Notification marked as read successfully!".into(),
        notification,
    }))
}

pub async fn update_notification(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(notification_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateNotificationRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if fetch_notification(&state, notification_id).await?.is_none() {
        return Err(ApiError::NotFound("Notification not found.".into()));
    }

    let Some(raw) = non_empty(&req.status) else {
        return Err(ApiError::BadRequest("Status is required.".into()));
    };
    let status: NotificationStatus = raw.parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid status value. Use one of: {}.",
            NotificationStatus::expected()
        ))
    })?;

    write_status(&state, notification_id, status).await?;

    Ok(MessageResponse::new("Notification updated successfully!"))
}
