// src/routes/chat_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, db_error},
    lifecycle,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{
        AppState, ChatMessageRow, ChatStatus, MessageResponse, MessageStatus, MessageType,
        now_utc,
    },
    policy,
    routes::{appointment_routes::require_appointment, non_empty, user_routes::require_user},
};

const MESSAGE_COLUMNS: &str = r#"
    m.id AS id, m.sender_id AS sender_id, m.recipient_id AS recipient_id,
    m.appointment_id AS appointment_id, m.content AS content,
    m.message_type AS message_type, m.status AS status, m.chat_status AS chat_status,
    m.created_at AS created_at
"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/chat/messages", get(list_my_messages).post(send_message))
        .route("/chat/messages/reply", post(reply_message))
        .route(
            "/chat/messages/appointment/{appointment_id}",
            get(list_appointment_messages),
        )
        .route("/chat/messages/{id}/status", patch(update_message_status))
        // `{id}` is the appointment id here.
        .route("/chat/messages/{id}/complete", post(complete_chat))
}

/* ============================================================
   Request / Response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub recipient_id: Option<i64>,
    pub content: Option<String>,
    pub appointment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub original_message_id: Option<i64>,
    pub recipient_id: Option<i64>,
    pub content: Option<String>,
    pub appointment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageStatusRequest {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageSentResponse {
    pub message: String,
    pub message_id: i64,
}

#[derive(Debug, Serialize)]
pub struct ReplySentResponse {
    pub message: String,
    pub reply_id: i64,
}

#[derive(Debug, Serialize)]
pub struct MessagesListResponse {
    pub messages: Vec<ChatMessageRow>,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct NamedChatMessage {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub message: ChatMessageRow,
    pub sender_name: String,
    pub recipient_name: String,
}

#[derive(Debug, Serialize)]
pub struct NamedMessagesListResponse {
    pub messages: Vec<NamedChatMessage>,
}

/* ============================================================
   Helpers
   ============================================================ */

struct NewMessage<'a> {
    sender_id: i64,
    recipient_id: i64,
    appointment_id: i64,
    content: &'a str,
    message_type: MessageType,
    chat_status: ChatStatus,
}

async fn insert_message(state: &AppState, msg: NewMessage<'_>) -> Result<i64, ApiError> {
    let res = sqlx::query(
        r#"
        INSERT INTO chat_messages
            (sender_id, recipient_id, appointment_id, content, message_type, status, chat_status, created_at)
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(msg.sender_id)
    .bind(msg.recipient_id)
    .bind(msg.appointment_id)
    .bind(msg.content)
    .bind(msg.message_type)
    .bind(MessageStatus::Delivered)
    .bind(msg.chat_status)
    .bind(now_utc())
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    Ok(res.last_insert_rowid())
}

async fn fetch_message(state: &AppState, message_id: i64) -> Result<ChatMessageRow, ApiError> {
    sqlx::query_as::<_, ChatMessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages m WHERE m.id = ?"
    ))
    .bind(message_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::NotFound("Message not found.".into()))
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageSentResponse>), ApiError> {
    let (Some(recipient_id), Some(content), Some(appointment_id)) =
        (req.recipient_id, non_empty(&req.content), req.appointment_id)
    else {
        return Err(ApiError::BadRequest(
            "Recipient ID, message content, and appointment ID are required.".into(),
        ));
    };

    require_user(&state, recipient_id, "Recipient not found.").await?;
    require_appointment(&state, appointment_id).await?;

    let message_id = insert_message(
        &state,
        NewMessage {
            sender_id: auth.user_id,
            recipient_id,
            appointment_id,
            content,
            message_type: lifecycle::direction_of_new_message(auth.user_id, recipient_id),
            chat_status: ChatStatus::Started,
        },
    )
    .await?;

    tracing::info!(
        "chat message {} from {} to {} on appointment {}",
        message_id,
        auth.user_id,
        recipient_id,
        appointment_id
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageSentResponse {
            message: "Message sent successfully!".into(),
            message_id,
        }),
    ))
}

pub async fn reply_message(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ReplyRequest>,
) -> Result<(StatusCode, Json<ReplySentResponse>), ApiError> {
    let (Some(original_id), Some(recipient_id), Some(content), Some(appointment_id)) = (
        req.original_message_id,
        req.recipient_id,
        non_empty(&req.content),
        req.appointment_id,
    ) else {
        return Err(ApiError::BadRequest(
            "Original message ID, recipient ID, reply content, and appointment ID are required."
                .into(),
        ));
    };

    let original = fetch_message(&state, original_id)
        .await
        .map_err(|e| match e {
            ApiError::NotFound(_) => ApiError::NotFound("Original message not found.".into()),
            other => other,
        })?;
    require_user(&state, recipient_id, "Recipient not found.").await?;
    require_appointment(&state, appointment_id).await?;

    let reply_id = insert_message(
        &state,
        NewMessage {
            sender_id: auth.user_id,
            recipient_id,
            appointment_id,
            content,
            message_type: lifecycle::direction_of_reply(auth.user_id, original.recipient_id),
            chat_status: ChatStatus::Ongoing,
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReplySentResponse {
            message: "Reply sent successfully!".into(),
            reply_id,
        }),
    ))
}

pub async fn list_my_messages(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<MessagesListResponse>, ApiError> {
    let messages: Vec<ChatMessageRow> = sqlx::query_as::<_, ChatMessageRow>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM chat_messages m
        WHERE m.sender_id = ?1 OR m.recipient_id = ?1
        ORDER BY m.id ASC
        "#
    ))
    .bind(auth.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(MessagesListResponse { messages }))
}

pub async fn list_appointment_messages(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<NamedMessagesListResponse>, ApiError> {
    let messages: Vec<NamedChatMessage> = sqlx::query_as::<_, NamedChatMessage>(&format!(
        r#"
        SELECT {MESSAGE_COLUMNS},
               (s.first_name || ' ' || s.last_name) AS sender_name,
               (r.first_name || ' ' || r.last_name) AS recipient_name
        FROM chat_messages m
        JOIN users s ON s.id = m.sender_id
        JOIN users r ON r.id = m.recipient_id
        WHERE m.appointment_id = ?
        ORDER BY m.id ASC
        "#
    ))
    .bind(appointment_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    if messages.is_empty() {
        return Err(ApiError::NotFound(
            "No messages found for this appointment.".into(),
        ));
    }

    Ok(Json(NamedMessagesListResponse { messages }))
}

pub async fn update_message_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(message_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateMessageStatusRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Some(raw) = non_empty(&req.status) else {
        return Err(ApiError::BadRequest("Status is required.".into()));
    };
    let status: MessageStatus = raw.parse().map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid status value. Use one of: {}.",
            MessageStatus::expected()
        ))
    })?;

    let message = fetch_message(&state, message_id).await?;
    policy::UPDATE_MESSAGE_STATUS.check(&auth, &[message.sender_id, message.recipient_id])?;

    sqlx::query("UPDATE chat_messages SET status = ? WHERE id = ?")
        .bind(status)
        .bind(message_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    Ok(MessageResponse::new("Message status updated successfully!"))
}

/// Close the caller's side of an appointment chat and move the appointment
/// to ONGOING.
pub async fn complete_chat(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM chat_messages WHERE appointment_id = ?")
            .bind(appointment_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db_error)?;

    if count == 0 {
        return Err(ApiError::NotFound(
            "No messages found for this appointment.".into(),
        ));
    }

    sqlx::query(
        r#"
        UPDATE chat_messages
        SET chat_status = ?1
        WHERE appointment_id = ?2
          AND (sender_id = ?3 OR recipient_id = ?3)
        "#,
    )
    .bind(ChatStatus::Completed)
    .bind(appointment_id)
    .bind(auth.user_id)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    lifecycle::mark_chat_completed(&mut *tx, appointment_id)
        .await
        .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!("chat on appointment {} completed by {}", appointment_id, auth.user_id);
    Ok(MessageResponse::new(
        "Chat marked as completed and appointment status updated to ONGOING successfully!",
    ))
}
