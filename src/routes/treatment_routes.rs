// src/routes/treatment_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, db_error},
    lifecycle,
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, AppointmentStatus, TreatmentRow, now_utc, parse_date},
    routes::{appointment_routes::require_appointment, non_empty, user_routes::fetch_user},
};

/// Treatment columns, for queries that alias the table as `t`.
pub(crate) const TREATMENT_COLUMNS: &str = r#"
    t.id AS id, t.patient_id AS patient_id, t.therapist_id AS therapist_id,
    t.notes AS notes, t.prescription AS prescription,
    t.start_date AS start_date, t.end_date AS end_date,
    t.created_at AS created_at, t.updated_at AS updated_at
"#;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/treatments", get(list_treatments).post(create_treatment))
        .route(
            "/treatments/{treatment_id}",
            get(get_treatment).put(update_treatment),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateTreatmentRequest {
    pub patient_id: Option<i64>,
    pub therapist_id: Option<i64>,
    pub notes: Option<String>,
    pub prescription: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub appointment_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTreatmentRequest {
    pub notes: Option<String>,
    pub prescription: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TreatmentsQuery {
    pub patient_id: Option<i64>,
    pub therapist_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TreatmentMessageResponse {
    pub message: String,
    pub treatment: TreatmentRow,
}

#[derive(Debug, Serialize)]
pub struct TreatmentsListResponse {
    pub message: String,
    pub treatments: Vec<TreatmentRow>,
}

#[derive(Debug, Serialize)]
pub struct TreatmentResponse {
    pub treatment: TreatmentRow,
}

fn parse_date_field(field: &str, raw: &str) -> Result<NaiveDate, ApiError> {
    parse_date(raw).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid date format for {field}. Use YYYY-MM-DD."))
    })
}

async fn fetch_treatment(state: &AppState, treatment_id: i64) -> Result<TreatmentRow, ApiError> {
    sqlx::query_as::<_, TreatmentRow>(&format!(
        "SELECT {TREATMENT_COLUMNS} FROM treatments t WHERE t.id = ?"
    ))
    .bind(treatment_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::NotFound("Treatment not found.".into()))
}

/// Record a treatment. A linked appointment is closed as COMPLETED in the
/// same transaction.
pub async fn create_treatment(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateTreatmentRequest>,
) -> Result<(StatusCode, Json<TreatmentMessageResponse>), ApiError> {
    let (Some(patient_id), Some(therapist_id), Some(notes), Some(prescription)) = (
        req.patient_id,
        req.therapist_id,
        non_empty(&req.notes),
        non_empty(&req.prescription),
    ) else {
        return Err(ApiError::BadRequest(
            "Patient ID, Therapist ID, Notes, and Prescription are required.".into(),
        ));
    };

    let start_date = match non_empty(&req.start_date) {
        Some(raw) => parse_date_field("start_date", raw)?,
        None => now_utc().date(),
    };
    let end_date = non_empty(&req.end_date)
        .map(|raw| parse_date_field("end_date", raw))
        .transpose()?;

    let patient = fetch_user(&state.db, patient_id).await.map_err(db_error)?;
    let therapist = fetch_user(&state.db, therapist_id).await.map_err(db_error)?;
    if patient.is_none() || therapist.is_none() {
        return Err(ApiError::NotFound("Patient or Therapist not found.".into()));
    }

    if let Some(appointment_id) = req.appointment_id {
        require_appointment(&state, appointment_id).await?;
    }

    let now = now_utc();
    let mut tx = state.db.begin().await.map_err(db_error)?;

    let res = sqlx::query(
        r#"
        INSERT INTO treatments
            (patient_id, therapist_id, notes, prescription, start_date, end_date, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(patient_id)
    .bind(therapist_id)
    .bind(notes)
    .bind(prescription)
    .bind(start_date)
    .bind(end_date)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .map_err(db_error)?;

    if let Some(appointment_id) = req.appointment_id {
        lifecycle::set_status(&mut *tx, appointment_id, AppointmentStatus::Completed)
            .await
            .map_err(db_error)?;
    }

    tx.commit().await.map_err(db_error)?;

    let treatment = fetch_treatment(&state, res.last_insert_rowid()).await?;

    tracing::info!(
        "treatment {} recorded by {} for patient {}",
        treatment.id,
        auth.user_id,
        patient_id
    );

    Ok((
        StatusCode::CREATED,
        Json(TreatmentMessageResponse {
            message: "Treatment created successfully!".into(),
            treatment,
        }),
    ))
}

pub async fn list_treatments(
    State(state): State<AppState>,
    _auth: AuthContext,
    Query(q): Query<TreatmentsQuery>,
) -> Result<Json<TreatmentsListResponse>, ApiError> {
    let treatments: Vec<TreatmentRow> = sqlx::query_as::<_, TreatmentRow>(&format!(
        r#"
        SELECT {TREATMENT_COLUMNS}
        FROM treatments t
        WHERE (?1 IS NULL OR t.patient_id = ?1)
          AND (?2 IS NULL OR t.therapist_id = ?2)
        ORDER BY t.id ASC
        "#
    ))
    .bind(q.patient_id)
    .bind(q.therapist_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(TreatmentsListResponse {
        message: "Treatments retrieved successfully!".into(),
        treatments,
    }))
}

pub async fn get_treatment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(treatment_id): Path<i64>,
) -> Result<Json<TreatmentResponse>, ApiError> {
    let treatment = fetch_treatment(&state, treatment_id).await?;
    Ok(Json(TreatmentResponse { treatment }))
}

/// Fields left out of the body keep their value.
pub async fn update_treatment(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(treatment_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateTreatmentRequest>,
) -> Result<Json<TreatmentMessageResponse>, ApiError> {
    let mut treatment = fetch_treatment(&state, treatment_id).await?;

    if req.notes.is_some() {
        treatment.notes = non_empty(&req.notes).map(str::to_string);
    }
    if req.prescription.is_some() {
        treatment.prescription = non_empty(&req.prescription).map(str::to_string);
    }
    if let Some(raw) = req.start_date.as_deref() {
        treatment.start_date = parse_date_field("start_date", raw)?;
    }
    if req.end_date.is_some() {
        treatment.end_date = non_empty(&req.end_date)
            .map(|raw| parse_date_field("end_date", raw))
            .transpose()?;
    }

    sqlx::query(
        r#"
        UPDATE treatments
        SET notes = ?, prescription = ?, start_date = ?, end_date = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&treatment.notes)
    .bind(&treatment.prescription)
    .bind(treatment.start_date)
    .bind(treatment.end_date)
    .bind(now_utc())
    .bind(treatment_id)
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    let treatment = fetch_treatment(&state, treatment_id).await?;

    Ok(Json(TreatmentMessageResponse {
        message: "Treatment updated successfully!".into(),
        treatment,
    }))
}
