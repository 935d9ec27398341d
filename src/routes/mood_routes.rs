// src/routes/mood_routes.rs

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, db_error},
    middleware::{auth_context::AuthContext, json_body::ApiJson},
    models::{AppState, MoodEntryRow, now_utc},
    routes::{non_empty, user_routes::require_user},
};

const MOOD_COLUMNS: &str =
    "id, mood_score, symptoms, patient_id, therapist_id, created_at, updated_at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mood_entries", get(list_mood_entries).post(create_mood_entry))
        .route(
            "/mood_entries/{entry_id}",
            get(get_mood_entry).put(update_mood_entry),
        )
}

#[derive(Debug, Deserialize)]
pub struct CreateMoodEntryRequest {
    pub mood_score: Option<i64>,
    pub symptoms: Option<String>,
    pub therapist_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMoodEntryRequest {
    pub mood_score: Option<i64>,
    pub symptoms: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MoodQuery {
    pub therapist_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MoodEntryMessageResponse {
    pub message: String,
    pub mood_entry: MoodEntryRow,
}

#[derive(Debug, Serialize)]
pub struct MoodEntryResponse {
    pub mood_entry: MoodEntryRow,
}

#[derive(Debug, Serialize)]
pub struct MoodEntriesListResponse {
    pub mood_entries: Vec<MoodEntryRow>,
}

async fn fetch_mood_entry(state: &AppState, entry_id: i64) -> Result<MoodEntryRow, ApiError> {
    sqlx::query_as::<_, MoodEntryRow>(&format!(
        "SELECT {MOOD_COLUMNS} FROM mood_entries WHERE id = ?"
    ))
    .bind(entry_id)
    .fetch_optional(&state.db)
    .await
    .map_err(db_error)?
    .ok_or_else(|| ApiError::NotFound("Mood entry not found.".into()))
}

/// The caller is recorded as the patient.
pub async fn create_mood_entry(
    State(state): State<AppState>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateMoodEntryRequest>,
) -> Result<(StatusCode, Json<MoodEntryMessageResponse>), ApiError> {
    let (Some(mood_score), Some(therapist_id)) = (req.mood_score, req.therapist_id) else {
        return Err(ApiError::BadRequest(
            "Mood score and therapist ID are required.".into(),
        ));
    };

    require_user(&state, therapist_id, "Therapist not found.").await?;

    let now = now_utc();
    let res = sqlx::query(
        r#"
        INSERT INTO mood_entries
            (mood_score, symptoms, patient_id, therapist_id, created_at, updated_at)
        VALUES
            (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(mood_score)
    .bind(non_empty(&req.symptoms))
    .bind(auth.user_id)
    .bind(therapist_id)
    .bind(now)
    .bind(now)
    .execute(&state.db)
    .await
    .map_err(db_error)?;

    let mood_entry = fetch_mood_entry(&state, res.last_insert_rowid()).await?;

    Ok((
        StatusCode::CREATED,
        Json(MoodEntryMessageResponse {
            message: "Mood entry created successfully!".into(),
            mood_entry,
        }),
    ))
}

/// The caller's own entries, optionally for one therapist.
pub async fn list_mood_entries(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(q): Query<MoodQuery>,
) -> Result<Json<MoodEntriesListResponse>, ApiError> {
    let mood_entries: Vec<MoodEntryRow> = sqlx::query_as::<_, MoodEntryRow>(&format!(
        r#"
        SELECT {MOOD_COLUMNS}
        FROM mood_entries
        WHERE patient_id = ?1
          AND (?2 IS NULL OR therapist_id = ?2)
        ORDER BY id ASC
        "#
    ))
    .bind(auth.user_id)
    .bind(q.therapist_id)
    .fetch_all(&state.db)
    .await
    .map_err(db_error)?;

    Ok(Json(MoodEntriesListResponse { mood_entries }))
}

pub async fn get_mood_entry(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(entry_id): Path<i64>,
) -> Result<Json<MoodEntryResponse>, ApiError> {
    let mood_entry = fetch_mood_entry(&state, entry_id).await?;
    Ok(Json(MoodEntryResponse { mood_entry }))
}

pub async fn update_mood_entry(
    State(state): State<AppState>,
    _auth: AuthContext,
    Path(entry_id): Path<i64>,
    ApiJson(req): ApiJson<UpdateMoodEntryRequest>,
) -> Result<Json<MoodEntryMessageResponse>, ApiError> {
    let mut entry = fetch_mood_entry(&state, entry_id).await?;

    if let Some(score) = req.mood_score {
        entry.mood_score = score;
    }
    if req.symptoms.is_some() {
        entry.symptoms = non_empty(&req.symptoms).map(str::to_string);
    }

    sqlx::query("UPDATE mood_entries SET mood_score = ?, symptoms = ?, updated_at = ? WHERE id = ?")
        .bind(entry.mood_score)
        .bind(&entry.symptoms)
        .bind(now_utc())
        .bind(entry_id)
        .execute(&state.db)
        .await
        .map_err(db_error)?;

    let mood_entry = fetch_mood_entry(&state, entry_id).await?;

    Ok(Json(MoodEntryMessageResponse {
        message: "Mood entry updated successfully!".into(),
        mood_entry,
    }))
}
