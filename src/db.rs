// src/db.rs

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

/// Tables are created on startup when absent. Existing data is left alone;
/// there is no migration replay.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        user_type     TEXT NOT NULL CHECK (user_type IN ('ADMIN', 'PATIENT', 'THERAPIST')),
        status        TEXT NOT NULL DEFAULT 'ACTIVE' CHECK (status IN ('ACTIVE', 'INACTIVE')),
        first_name    TEXT NOT NULL DEFAULT '',
        last_name     TEXT NOT NULL DEFAULT '',
        created_at    TEXT NOT NULL,
        updated_at    TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS session_tokens (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id      INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token_hash   TEXT NOT NULL UNIQUE,
        expires_at   TEXT NOT NULL,
        revoked_at   TEXT,
        last_seen_at TEXT,
        created_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS appointments (
        id               INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id       INTEGER NOT NULL REFERENCES users(id),
        therapist_id     INTEGER NOT NULL REFERENCES users(id),
        date             TEXT NOT NULL,
        time             TEXT NOT NULL,
        status           TEXT NOT NULL DEFAULT 'PENDING' CHECK (status IN
                           ('PENDING', 'BOOKED', 'ONGOING', 'ALMOST_COMPLETE', 'CANCELLED', 'COMPLETED')),
        notes            TEXT NOT NULL DEFAULT '',
        has_patient_note INTEGER NOT NULL DEFAULT 0,
        chat_completed   INTEGER NOT NULL DEFAULT 0,
        created_at       TEXT NOT NULL,
        updated_at       TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS scheduled_appointments (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        appointment_id INTEGER NOT NULL REFERENCES appointments(id),
        scheduled_time TEXT NOT NULL,
        status         TEXT NOT NULL DEFAULT 'SCHEDULED' CHECK (status IN ('SCHEDULED', 'CONFIRMED', 'CANCELLED')),
        created_at     TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patient_notes (
        id                       INTEGER PRIMARY KEY AUTOINCREMENT,
        scheduled_appointment_id INTEGER NOT NULL REFERENCES scheduled_appointments(id) ON DELETE CASCADE,
        notes                    TEXT NOT NULL,
        diagnosis                TEXT,
        created_at               TEXT NOT NULL,
        updated_at               TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS treatments (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        patient_id   INTEGER NOT NULL REFERENCES users(id),
        therapist_id INTEGER NOT NULL REFERENCES users(id),
        notes        TEXT,
        prescription TEXT,
        start_date   TEXT NOT NULL,
        end_date     TEXT,
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        message    TEXT NOT NULL,
        status     TEXT NOT NULL DEFAULT 'UNREAD' CHECK (status IN ('UNREAD', 'READ')),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chat_messages (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_id      INTEGER NOT NULL REFERENCES users(id),
        recipient_id   INTEGER NOT NULL REFERENCES users(id),
        appointment_id INTEGER NOT NULL REFERENCES appointments(id),
        content        TEXT NOT NULL,
        message_type   TEXT NOT NULL CHECK (message_type IN ('PATIENT_TO_THERAPIST', 'THERAPIST_TO_PATIENT')),
        status         TEXT NOT NULL DEFAULT 'DELIVERED' CHECK (status IN ('DELIVERED', 'SEEN', 'REPLIED')),
        chat_status    TEXT NOT NULL DEFAULT 'STARTED' CHECK (chat_status IN ('STARTED', 'ONGOING', 'COMPLETED')),
        created_at     TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mood_entries (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        mood_score   INTEGER NOT NULL,
        symptoms     TEXT,
        patient_id   INTEGER NOT NULL REFERENCES users(id),
        therapist_id INTEGER NOT NULL REFERENCES users(id),
        created_at   TEXT NOT NULL,
        updated_at   TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id)",
    "CREATE INDEX IF NOT EXISTS idx_appointments_therapist ON appointments(therapist_id)",
    "CREATE INDEX IF NOT EXISTS idx_scheduled_appointment ON scheduled_appointments(appointment_id)",
    "CREATE INDEX IF NOT EXISTS idx_chat_appointment ON chat_messages(appointment_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, status)",
];

/// Open (creating if needed) the SQLite database at `database_url` and
/// ensure the schema exists.
pub async fn connect_sqlite(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    tracing::info!("Database ready at {database_url}");
    Ok(pool)
}

/// Private in-memory database on a single, never-recycled connection.
/// Every pooled connection to `:memory:` would otherwise see its own empty DB.
pub async fn connect_in_memory() -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in SCHEMA {
        sqlx::query(*stmt).execute(pool).await?;
    }
    Ok(())
}
