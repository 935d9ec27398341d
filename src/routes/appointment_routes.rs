// src/routes/appointment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use sqlx::SqliteExecutor;

use crate::{
    error::{ApiError, db_error},
    lifecycle,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{
        AppState, AppointmentRow, AppointmentStatus, MessageResponse, PatientNoteRow,
        TreatmentRow, UserRole, UserRow, UserStatus, fmt, now_utc, parse_date, parse_time,
    },
    notify::{self, Email, EmailStatus},
    policy,
    routes::{
        non_empty,
        patient_note_routes::NOTE_COLUMNS,
        treatment_routes::TREATMENT_COLUMNS,
        user_routes::{fetch_user, require_user},
    },
};

/// Appointment columns, for queries that alias `appointments` as `a`.
pub(crate) const APPOINTMENT_COLUMNS: &str = r#"
    a.id AS id, a.patient_id AS patient_id, a.therapist_id AS therapist_id,
    a.date AS date, a.time AS time, a.status AS status, a.notes AS notes,
    a.has_patient_note AS has_patient_note, a.chat_completed AS chat_completed,
    a.created_at AS created_at, a.updated_at AS updated_at
"#;

pub(crate) async fn fetch_appointment<'e, E>(
    db: E,
    appointment_id: i64,
) -> Result<Option<AppointmentRow>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, AppointmentRow>(&format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments a WHERE a.id = ?"
    ))
    .bind(appointment_id)
    .fetch_optional(db)
    .await
}

pub(crate) async fn require_appointment(
    state: &AppState,
    appointment_id: i64,
) -> Result<AppointmentRow, ApiError> {
    fetch_appointment(&state.db, appointment_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound("Appointment not found.".into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/appointments", get(list_appointments).post(create_appointment))
        .route("/appointments/user/{user_id}", get(list_user_appointments))
        .route(
            "/appointments/{appointment_id}",
            get(get_appointment)
                .put(update_appointment)
                .delete(delete_appointment),
        )
        .route("/appointments/{appointment_id}/ongoing", put(mark_ongoing))
        .route("/appointment-details/{appointment_id}", get(get_appointment_details))
        .route("/therapist/{therapist_id}/patients", get(list_therapist_patients))
        .route("/patient/{patient_id}/therapists", get(list_patient_therapists))
}

/* ============================================================
   Request / Response DTOs
   ============================================================ */

#[derive(Debug, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Option<i64>,
    pub therapist_id: Option<i64>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// An appointment plus the outcome of the patient email it triggered.
#[derive(Debug, Serialize)]
pub struct AppointmentWithEmail {
    #[serde(flatten)]
    pub appointment: AppointmentRow,
    pub email_status: EmailStatus,
}

#[derive(Debug, Serialize)]
pub struct AppointmentMutationResponse {
    pub message: String,
    pub appointment: AppointmentWithEmail,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct AppointmentListItem {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub appointment: AppointmentRow,
    pub therapist_name: String,
}

#[derive(Debug, Serialize)]
pub struct AppointmentsListResponse {
    pub appointments: Vec<AppointmentListItem>,
}

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub appointment: AppointmentRow,
}

#[derive(Debug, Serialize)]
pub struct AppointmentDetailsResponse {
    pub appointment_id: i64,
    pub date: NaiveDate,
    #[serde(serialize_with = "fmt::time")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: String,
    pub therapist_name: String,
    pub patient_notes: Vec<PatientNoteRow>,
    pub treatments: Vec<TreatmentRow>,
}

/// The other party of an appointment, as shown in patient/therapist lists.
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct Counterpart {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub status: UserStatus,
}

#[derive(Debug, Serialize)]
pub struct PatientsListResponse {
    pub patients: Vec<Counterpart>,
}

#[derive(Debug, Serialize)]
pub struct TherapistsListResponse {
    pub therapists: Vec<Counterpart>,
}

/* ============================================================
   Helpers
   ============================================================ */

/// Email the patient of `appt`. A missing patient row reads as "no address".
async fn email_patient(
    state: &AppState,
    appt: &AppointmentRow,
    build: fn(&AppointmentRow, &UserRow) -> Email,
) -> Result<EmailStatus, ApiError> {
    let Some(patient) = fetch_user(&state.db, appt.patient_id)
        .await
        .map_err(db_error)?
    else {
        return Ok(EmailStatus::NoAddress);
    };

    let email = build(appt, &patient);
    let status = notify::send_email(state.mailer.as_ref(), &patient.email, &email).await;
    tracing::info!(
        "appointment {} email to patient {}: {}",
        appt.id,
        patient.id,
        status.as_str()
    );
    Ok(status)
}

async fn list_with_therapist_name(
    state: &AppState,
    filter: &str,
    user_id: i64,
) -> Result<Vec<AppointmentListItem>, ApiError> {
    sqlx::query_as::<_, AppointmentListItem>(&format!(
        r#"
        SELECT {APPOINTMENT_COLUMNS},
               (t.first_name || ' ' || t.last_name) AS therapist_name
        FROM appointments a
        JOIN users t ON t.id = a.therapist_id
        WHERE {filter}
        ORDER BY a.date ASC, a.time ASC, a.id ASC
        "#
    ))
    .bind(user_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)
}

/* ============================================================
   Handlers
   ============================================================ */

pub async fn create_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<AppointmentMutationResponse>), ApiError> {
    let (Some(patient_id), Some(therapist_id), Some(date), Some(time)) = (
        req.patient_id,
        req.therapist_id,
        non_empty(&req.date),
        non_empty(&req.time),
    ) else {
        return Err(ApiError::BadRequest(
            "Therapist ID, patient ID, date, and time are required.".into(),
        ));
    };

    let (Some(date), Some(time)) = (parse_date(date), parse_time(time)) else {
        return Err(ApiError::BadRequest(
            "Invalid date or time format. Please use YYYY-MM-DD for date and HH:MM:SS for time."
                .into(),
        ));
    };

    require_user(&state, patient_id, "Patient not found.").await?;
    require_user(&state, therapist_id, "Therapist not found.").await?;

    let now = now_utc();
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let res = sqlx::query(
        r#"
        INSERT INTO appointments
            (patient_id, therapist_id, date, time, status, notes, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(patient_id)
    .bind(therapist_id)
    .bind(date)
    .bind(time)
    .bind(AppointmentStatus::Pending)
    .bind(req.notes.as_deref().unwrap_or(""))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    let appointment_id = res.last_insert_rowid();
    let appointment = fetch_appointment(&mut *tx, appointment_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            ApiError::Internal(format!("appointment {appointment_id} vanished after insert"))
        })?;

    notify::insert_notification(
        &mut *tx,
        patient_id,
        &notify::booking_notification(&appointment),
    )
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(
        "appointment {} created by {} for patient {} with therapist {}",
        appointment.id,
        auth.user_id,
        patient_id,
        therapist_id
    );

    let email_status = email_patient(&state, &appointment, notify::booking_email).await?;

    Ok((
        StatusCode::CREATED,
        Json(AppointmentMutationResponse {
            message: "Appointment created successfully!".into(),
            appointment: AppointmentWithEmail {
                appointment,
                email_status,
            },
        }),
    ))
}

/// Appointments where the caller is either party.
pub async fn list_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<AppointmentsListResponse>, ApiError> {
    let appointments =
        list_with_therapist_name(&state, "a.patient_id = ?1 OR a.therapist_id = ?1", auth.user_id)
            .await?;
    Ok(Json(AppointmentsListResponse { appointments }))
}

pub async fn list_user_appointments(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<Json<AppointmentsListResponse>, ApiError> {
    policy::LIST_USER_APPOINTMENTS.check(&auth, &[user_id])?;

    let appointments = if auth.role == UserRole::Therapist {
        list_with_therapist_name(&state, "a.therapist_id = ?1", auth.user_id).await?
    } else {
        list_with_therapist_name(&state, "a.patient_id = ?1", user_id).await?
    };

    Ok(Json(AppointmentsListResponse { appointments }))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let appointment = require_appointment(&state, appointment_id).await?;
    Ok(Json(AppointmentResponse { appointment }))
}

pub async fn get_appointment_details(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<AppointmentDetailsResponse>, ApiError> {
    let appointment = require_appointment(&state, appointment_id).await?;

    let therapist_name = fetch_user(&state.db, appointment.therapist_id)
        .await
        .map_err(db_error)?
        .map(|t| t.full_name())
        .unwrap_or_else(|| "Unknown".to_string());

    let patient_notes: Vec<PatientNoteRow> = sqlx::query_as::<_, PatientNoteRow>(&format!(
        r#"
        SELECT {NOTE_COLUMNS}
        FROM patient_notes n
        JOIN scheduled_appointments s ON s.id = n.scheduled_appointment_id
        WHERE s.appointment_id = ?
        ORDER BY n.id ASC
        "#
    ))
    .bind(appointment.id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    let treatments: Vec<TreatmentRow> = sqlx::query_as::<_, TreatmentRow>(&format!(
        "SELECT {TREATMENT_COLUMNS} FROM treatments t WHERE t.patient_id = ? ORDER BY t.id ASC"
    ))
    .bind(appointment.patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(AppointmentDetailsResponse {
        appointment_id: appointment.id,
        date: appointment.date,
        time: appointment.time,
        status: appointment.status,
        notes: appointment.notes,
        therapist_name,
        patient_notes,
        treatments,
    }))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentMutationResponse>, ApiError> {
    require_appointment(&state, appointment_id).await?;

    // Validate before touching anything so a bad name leaves the row as is.
    let status: Option<AppointmentStatus> = non_empty(&req.status)
        .map(|raw| {
            raw.parse::<AppointmentStatus>().map_err(|_| {
                ApiError::BadRequest(format!(
                    "Invalid status value. Use one of: {}.",
                    AppointmentStatus::expected()
                ))
            })
        })
        .transpose()?;

    let mut tx = state.db.begin().await.map_err(db_error)?;

    if let Some(status) = status {
        lifecycle::set_status(&mut *tx, appointment_id, status)
            .await
            .map_err(db_error)?;
    }

    if let Some(notes) = non_empty(&req.notes) {
        sqlx::query("UPDATE appointments SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(now_utc())
            .bind(appointment_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
    }

    let appointment = fetch_appointment(&mut *tx, appointment_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound("Appointment not found.".into()))?;

    notify::insert_notification(
        &mut *tx,
        appointment.patient_id,
        &notify::status_update_notification(&appointment),
    )
    .await
    .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!(
        "appointment {} updated by {} (status {})",
        appointment.id,
        auth.user_id,
        appointment.status
    );

    let email_status = email_patient(&state, &appointment, notify::status_update_email).await?;

    Ok(Json(AppointmentMutationResponse {
        message: "Appointment updated successfully!".into(),
        appointment: AppointmentWithEmail {
            appointment,
            email_status,
        },
    }))
}

pub async fn mark_ongoing(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let found = lifecycle::set_status(&state.db, appointment_id, AppointmentStatus::Ongoing)
        .await
        .map_err(db_error)?;

    if !found {
        return Err(ApiError::NotFound("Appointment not found.".into()));
    }

    Ok(MessageResponse::new(
        "Appointment marked as ongoing successfully!",
    ))
}

/// Removes the appointment together with its chat, its scheduled slots and,
/// through the foreign key, the notes filed on those slots.
pub async fn delete_appointment(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(appointment_id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut tx = state.db.begin().await.map_err(db_error)?;

    if fetch_appointment(&mut *tx, appointment_id)
        .await
        .map_err(db_error)?
        .is_none()
    {
        return Err(ApiError::NotFound("Appointment not found.".into()));
    }

    sqlx::query("DELETE FROM chat_messages WHERE appointment_id = ?")
        .bind(appointment_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    sqlx::query("DELETE FROM scheduled_appointments WHERE appointment_id = ?")
        .bind(appointment_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    sqlx::query("DELETE FROM appointments WHERE id = ?")
        .bind(appointment_id)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    tracing::info!("appointment {} deleted by {}", appointment_id, auth.user_id);
    Ok(MessageResponse::new("Appointment deleted successfully!"))
}

pub async fn list_therapist_patients(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(therapist_id): Path<i64>,
) -> Result<Json<PatientsListResponse>, ApiError> {
    policy::LIST_THERAPIST_PATIENTS.check(&auth, &[therapist_id])?;

    let patients: Vec<Counterpart> = sqlx::query_as::<_, Counterpart>(
        r#"
        SELECT DISTINCT u.id, u.first_name, u.last_name, u.email, u.status
        FROM users u
        JOIN appointments a ON a.patient_id = u.id
        WHERE a.therapist_id = ?
        ORDER BY u.id ASC
        "#,
    )
    .bind(therapist_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(PatientsListResponse { patients }))
}

pub async fn list_patient_therapists(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(patient_id): Path<i64>,
) -> Result<Json<TherapistsListResponse>, ApiError> {
    policy::LIST_PATIENT_THERAPISTS.check(&auth, &[patient_id])?;

    let therapists: Vec<Counterpart> = sqlx::query_as::<_, Counterpart>(
        r#"
        SELECT DISTINCT u.id, u.first_name, u.last_name, u.email, u.status
        FROM users u
        JOIN appointments a ON a.therapist_id = u.id
        WHERE a.patient_id = ?
        ORDER BY u.id ASC
        "#,
    )
    .bind(patient_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(TherapistsListResponse { therapists }))
}
