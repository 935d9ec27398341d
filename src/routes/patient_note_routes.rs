// src/routes/patient_note_routes.rs

use std::collections::HashMap;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, db_error},
    lifecycle,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, PatientNoteRow, ScheduledAppointmentRow, now_utc},
    routes::{
        non_empty,
        scheduled_appointment_routes::{SCHEDULED_COLUMNS, fetch_scheduled},
    },
};

/// Patient note columns, for queries that alias the table as `n`.
pub(crate) const NOTE_COLUMNS: &str = r#"
    n.id AS id, n.scheduled_appointment_id AS scheduled_appointment_id,
    n.notes AS notes, n.diagnosis AS diagnosis,
    n.created_at AS created_at, n.updated_at AS updated_at
"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/patient_notes", get(list_patient_notes).post(create_patient_note))
        .route(
            "/patient_notes/{note_id}",
            get(get_patient_note).put(update_patient_note),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub scheduled_appointment_id: Option<i64>,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateNoteRequest {
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotesQuery {
    pub user_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct NoteWithSlot {
    #[serde(flatten)]
    pub note: PatientNoteRow,
    pub scheduled_appointment: ScheduledAppointmentRow,
}

#[derive(Debug, Serialize)]
pub struct NoteCreatedResponse {
    pub message: String,
    pub patient_note: NoteWithSlot,
}

#[derive(Debug, Serialize)]
pub struct NotesListResponse {
    pub message: String,
    pub patient_notes: Vec<NoteWithSlot>,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub patient_note: PatientNoteRow,
}

#[derive(Debug, Serialize)]
pub struct NoteUpdatedResponse {
    pub message: String,
    pub patient_note: PatientNoteRow,
}

async fn fetch_note(state: &AppState, note_id: i64) -> Result<PatientNoteRow, ApiError> {
    sqlx::query_as::<_, PatientNoteRow>(&format!(
        "SELECT {NOTE_COLUMNS} FROM patient_notes n WHERE n.id = ?"
    ))
    .bind(note_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::NotFound("Patient note not found.".into()))
}

/// File a note on a slot. The parent appointment is flagged and moved to
/// ALMOST_COMPLETE whatever its current status.
pub async fn create_patient_note(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteCreatedResponse>), ApiError> {
    let (Some(scheduled_id), Some(notes)) = (req.scheduled_appointment_id, non_empty(&req.notes))
    else {
        return Err(ApiError::BadRequest(
            "Scheduled appointment ID and notes are required.".into(),
        ));
    };

    let scheduled_appointment = fetch_scheduled(&state.db, scheduled_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| ApiError::NotFound("Scheduled appointment not found.".into()))?;

    let now = now_utc();
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let res = sqlx::query(
        r#"
        INSERT INTO patient_notes
            (scheduled_appointment_id, notes, diagnosis, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?)
        "#,
    )
    .bind(scheduled_id)
    .bind(notes)
    .bind(non_empty(&req.diagnosis))
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    lifecycle::mark_patient_note(&mut *tx, scheduled_appointment.appointment_id)
        .await
        .map_err(db_error)?;

    tx.commit().await.map_err(db_error)?;

    let note = fetch_note(&state, res.last_insert_rowid()).await?;

    tracing::info!(
        "patient note {} filed by {} on appointment {}",
        note.id,
        auth.user_id,
        scheduled_appointment.appointment_id
    );

    Ok((
        StatusCode::CREATED,
        Json(NoteCreatedResponse {
            message: "Patient note created successfully!".into(),
            patient_note: NoteWithSlot {
                note,
                scheduled_appointment,
            },
        }),
    ))
}

/// All notes, or with `?user_id=` only those on appointments where that
/// user is patient or therapist.
pub async fn list_patient_notes(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<NotesQuery>,
) -> Result<Json<NotesListResponse>, ApiError> {
    const SCOPE: &str = r#"
        JOIN appointments a ON a.id = s.appointment_id
        WHERE (?1 IS NULL OR a.patient_id = ?1 OR a.therapist_id = ?1)
    "#;

    let notes: Vec<PatientNoteRow> = sqlx::query_as::<_, PatientNoteRow>(&format!(
        r#"
        SELECT {NOTE_COLUMNS}
        FROM patient_notes n
        JOIN scheduled_appointments s ON s.id = n.scheduled_appointment_id
        {SCOPE}
        ORDER BY n.id ASC
        "#
    ))
    .bind(q.user_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    let slots: HashMap<i64, ScheduledAppointmentRow> =
        sqlx::query_as::<_, ScheduledAppointmentRow>(&format!(
            r#"
            SELECT DISTINCT {SCHEDULED_COLUMNS}
            FROM scheduled_appointments s
            JOIN patient_notes n ON n.scheduled_appointment_id = s.id
            {SCOPE}
            "#
        ))
        .bind(q.user_id)
        .fetch_all(&state.db)
        .await
        .map_err(db_error)?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let patient_notes = notes
        .into_iter()
        .filter_map(|note| {
            let scheduled_appointment = slots.get(&note.scheduled_appointment_id)?.clone();
            Some(NoteWithSlot {
                note,
                scheduled_appointment,
            })
        })
        .collect();

    Ok(Json(NotesListResponse {
        message: "Patient notes retrieved successfully!".into(),
        patient_notes,
    }))
}

pub async fn get_patient_note(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(note_id): Path<i64>,
) -> Result<Json<NoteResponse>, ApiError> {
    let patient_note = fetch_note(&state, note_id).await?;
    Ok(Json(NoteResponse { patient_note }))
}

/// Fields left out of the body keep their value. An empty diagnosis clears it.
pub async fn update_patient_note(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(note_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateNoteRequest>,
) -> Result<Json<NoteUpdatedResponse>, ApiError> {
    let mut note = fetch_note(&state, note_id).await?;

    if req.notes.is_some() {
        let Some(notes) = non_empty(&req.notes) else {
            return Err(ApiError::BadRequest("Notes cannot be empty.".into()));
        };
        note.notes = notes.to_string();
    }
    if req.diagnosis.is_some() {
        note.diagnosis = non_empty(&req.diagnosis).map(str::to_string);
    }

    sqlx::query("UPDATE patient_notes SET notes = ?, diagnosis = ?, updated_at = ? WHERE id = ?")
        .bind(&note.notes)
        .bind(&note.diagnosis)
        .bind(now_utc())
        .bind(note_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    let patient_note = fetch_note(&state, note_id).await?;

    Ok(Json(NoteUpdatedResponse {
        message: "Patient note updated successfully!".into(),
        patient_note,
    }))
}
