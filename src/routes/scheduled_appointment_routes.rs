// src/routes/scheduled_appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::{
    error::{ApiError, db_error},
    lifecycle,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, ScheduledAppointmentRow, ScheduledStatus, now_utc, parse_iso_datetime},
    routes::{appointment_routes::require_appointment, non_empty},
};

/// Scheduled appointment columns, for queries that alias the table as `s`.
pub(crate) const SCHEDULED_COLUMNS: &str = r#"
    s.id AS id, s.appointment_id AS appointment_id, s.scheduled_time AS scheduled_time,
    s.status AS status, s.created_at AS created_at, s.updated_at AS updated_at
"#;

pub(crate) async fn fetch_scheduled<'e, E>(
    db: E,
    scheduled_id: i64,
) -> Result<Option<ScheduledAppointmentRow>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, ScheduledAppointmentRow>(&format!(
        "SELECT {SCHEDULED_COLUMNS} FROM scheduled_appointments s WHERE s.id = ?"
    ))
    .bind(scheduled_id)
    .fetch_optional(db)
    .await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/scheduled_appointments", post(schedule_appointment))
        .route(
            "/scheduled_appointments/{appointment_id}",
            get(get_scheduled_appointment),
        )
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub appointment_id: Option<i64>,
    pub scheduled_time: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ScheduledAppointmentResponse {
    pub message: String,
    pub scheduled_appointment: ScheduledAppointmentRow,
}

/// Attach a slot to an appointment. The slot status decides the
/// appointment status once, here.
pub async fn schedule_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledAppointmentResponse>), ApiError> {
    let (Some(appointment_id), Some(raw_time)) =
        (req.appointment_id, non_empty(&req.scheduled_time))
    else {
        return Err(ApiError::BadRequest(
            "Appointment ID and scheduled time are required.".into(),
        ));
    };

    let scheduled_time = parse_iso_datetime(raw_time).ok_or_else(|| {
        ApiError::BadRequest(
            "Invalid scheduled time. Use ISO 8601, e.g. 2024-01-10T09:00:00.".into(),
        )
    })?;

    let status: ScheduledStatus = match non_empty(&req.status) {
        None => ScheduledStatus::Scheduled,
        Some(raw) => raw.parse().map_err(|_| {
            ApiError::BadRequest(format!(
                "Invalid status value. Use one of: {}.",
                ScheduledStatus::expected()
            ))
        })?,
    };

    require_appointment(&state, appointment_id).await?;

    let now = now_utc();
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let res = sqlx::query(
        r#"
        INSERT INTO scheduled_appointments
            (appointment_id, scheduled_time, status, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?)
        "#,
    )
    .bind(appointment_id)
    .bind(scheduled_time)
    .bind(status)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    let new_status = lifecycle::status_after_scheduling(status);
    lifecycle::set_status(&mut *tx, appointment_id, new_status)
        .await
        .map_err(db_error)?;

    let scheduled_id = res.last_insert_rowid();
    let scheduled_appointment = fetch_scheduled(&mut *tx, scheduled_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            ApiError::Internal(format!("scheduled appointment {scheduled_id} missing after insert"))
        })?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(
        "appointment {} scheduled as {} by {}, now {}",
        appointment_id,
        status,
        auth.user_id,
        new_status
    );

    Ok((
        StatusCode::CREATED,
        Json(ScheduledAppointmentResponse {
            message: "Appointment scheduled successfully!".into(),
            scheduled_appointment,
        }),
    ))
}

/// First slot attached to the appointment.
pub async fn get_scheduled_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<ScheduledAppointmentResponse>, ApiError> {
    let scheduled_appointment: ScheduledAppointmentRow =
        sqlx::query_as::<_, ScheduledAppointmentRow>(&format!(
            r#"
            SELECT {SCHEDULED_COLUMNS}
            FROM scheduled_appointments s
            WHERE s.appointment_id = ?
            ORDER BY s.id ASC
            LIMIT 1
            "#
        ))
        .bind(appointment_id)
        .fetch_optional(&state.db)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound("Scheduled appointment not found.".into()))?;

    Ok(Json(ScheduledAppointmentResponse {
        message: "Scheduled appointment retrieved successfully!".into(),
        scheduled_appointment,
    }))
}
