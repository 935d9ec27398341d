use std::sync::Arc;

use axum::Json;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use crate::mail::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub mailer: Arc<dyn Mailer>,
    pub session_ttl_hours: i64,
}

/* -------------------------
   API DTOs
--------------------------*/

/// Envelope for responses that carry nothing but a message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(MessageResponse {
            message: message.into(),
        })
    }
}

/* -------------------------
   Enums
--------------------------*/

/// A client-supplied name that matches none of an enum's variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} `{value}`, expected one of: {expected}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
    pub expected: String,
}

/// Declares a TEXT-backed enum with a fixed name table. Parsing is
/// case-insensitive and goes through that table only. The table must spell
/// each variant in SCREAMING_SNAKE_CASE so it agrees with serde and sqlx.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, sqlx::Type)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            /// Comma separated list of accepted names, for error messages.
            pub fn expected() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s.trim().to_ascii_uppercase();
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str() == key)
                    .ok_or_else(|| UnknownVariant {
                        kind: $kind,
                        value: s.to_string(),
                        expected: Self::expected(),
                    })
            }
        }
    };
}

string_enum! {
    pub enum UserRole: "user type" {
        Admin => "ADMIN",
        Patient => "PATIENT",
        Therapist => "THERAPIST",
    }
}

string_enum! {
    pub enum UserStatus: "user status" {
        Active => "ACTIVE",
        Inactive => "INACTIVE",
    }
}

string_enum! {
    /// Lifecycle status of an appointment. Writers live in `crate::lifecycle`.
    pub enum AppointmentStatus: "appointment status" {
        Pending => "PENDING",
        Booked => "BOOKED",
        Ongoing => "ONGOING",
        AlmostComplete => "ALMOST_COMPLETE",
        Cancelled => "CANCELLED",
        Completed => "COMPLETED",
    }
}

string_enum! {
    pub enum ScheduledStatus: "scheduled appointment status" {
        Scheduled => "SCHEDULED",
        Confirmed => "CONFIRMED",
        Cancelled => "CANCELLED",
    }
}

string_enum! {
    pub enum NotificationStatus: "notification status" {
        Unread => "UNREAD",
        Read => "READ",
    }
}

string_enum! {
    pub enum MessageStatus: "message status" {
        Delivered => "DELIVERED",
        Seen => "SEEN",
        Replied => "REPLIED",
    }
}

string_enum! {
    pub enum MessageType: "message type" {
        PatientToTherapist => "PATIENT_TO_THERAPIST",
        TherapistToPatient => "THERAPIST_TO_PATIENT",
    }
}

string_enum! {
    pub enum ChatStatus: "chat status" {
        Started => "STARTED",
        Ongoing => "ONGOING",
        Completed => "COMPLETED",
    }
}

/* -------------------------
   DB Row Models
--------------------------*/

#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub user_type: UserRole,
    pub status: UserStatus,
    pub first_name: String,
    pub last_name: String,
}

impl UserRow {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// User as exposed over the API (no password hash).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub user_type: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub status: UserStatus,
}

impl From<UserRow> for UserPublic {
    fn from(u: UserRow) -> Self {
        UserPublic {
            id: u.id,
            username: u.username,
            email: u.email,
            user_type: u.user_type,
            first_name: u.first_name,
            last_name: u.last_name,
            status: u.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AppointmentRow {
    pub id: i64,
    pub patient_id: i64,
    pub therapist_id: i64,
    pub date: NaiveDate,
    #[serde(serialize_with = "fmt::time")]
    pub time: NaiveTime,
    pub status: AppointmentStatus,
    pub notes: String,
    pub has_patient_note: bool,
    pub chat_completed: bool,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "fmt::timestamp")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ScheduledAppointmentRow {
    pub id: i64,
    pub appointment_id: i64,
    #[serde(serialize_with = "fmt::timestamp")]
    pub scheduled_time: NaiveDateTime,
    pub status: ScheduledStatus,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "fmt::timestamp")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PatientNoteRow {
    pub id: i64,
    pub scheduled_appointment_id: i64,
    pub notes: String,
    pub diagnosis: Option<String>,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "fmt::timestamp")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TreatmentRow {
    pub id: i64,
    pub patient_id: i64,
    pub therapist_id: i64,
    pub notes: Option<String>,
    pub prescription: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "fmt::timestamp")]
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct NotificationRow {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub status: NotificationStatus,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub appointment_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub status: MessageStatus,
    pub chat_status: ChatStatus,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct MoodEntryRow {
    pub id: i64,
    pub mood_score: i64,
    pub symptoms: Option<String>,
    pub patient_id: i64,
    pub therapist_id: i64,
    #[serde(serialize_with = "fmt::timestamp")]
    pub created_at: NaiveDateTime,
    #[serde(serialize_with = "fmt::timestamp")]
    pub updated_at: NaiveDateTime,
}

/* -------------------------
   Helpers
--------------------------*/

/// Current UTC wall-clock time, the value written to every timestamp column.
pub fn now_utc() -> NaiveDateTime {
    Utc::now().naive_utc()
}

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn parse_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), TIME_FORMAT).ok()
}

/// Accepts `YYYY-MM-DDTHH:MM:SS`, the space separated form, optional
/// fractional seconds, or a full RFC 3339 value (converted to UTC).
pub fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

/// Serde helpers for the wire formats of dates and times.
pub mod fmt {
    use chrono::{NaiveDateTime, NaiveTime};
    use serde::Serializer;

    pub fn timestamp<S: Serializer>(v: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&v.format("%Y-%m-%d %H:%M:%S"))
    }

    pub fn time<S: Serializer>(v: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&v.format(super::TIME_FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_names_parse_case_insensitively() {
        assert_eq!("booked".parse::<AppointmentStatus>(), Ok(AppointmentStatus::Booked));
        assert_eq!(
            " Almost_Complete ".parse::<AppointmentStatus>(),
            Ok(AppointmentStatus::AlmostComplete)
        );
        assert_eq!("therapist".parse::<UserRole>(), Ok(UserRole::Therapist));
    }

    #[test]
    fn unknown_name_is_rejected_with_expected_list() {
        let err = "bogus".parse::<AppointmentStatus>().unwrap_err();
        assert_eq!(err.kind, "appointment status");
        assert_eq!(err.value, "bogus");
        assert_eq!(
            err.expected,
            "PENDING, BOOKED, ONGOING, ALMOST_COMPLETE, CANCELLED, COMPLETED"
        );
    }

    #[test]
    fn serializes_as_screaming_snake_case() {
        let v = serde_json::to_value(MessageType::PatientToTherapist).unwrap();
        assert_eq!(v, serde_json::json!("PATIENT_TO_THERAPIST"));
        assert_eq!(AppointmentStatus::AlmostComplete.to_string(), "ALMOST_COMPLETE");
    }

    #[test]
    fn iso_datetime_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 10)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        assert_eq!(parse_iso_datetime("2024-01-10T09:30:00"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-10 09:30:00"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-10T10:30:00+01:00"), Some(expected));
        assert_eq!(parse_iso_datetime("2024-01-10T09:30"), Some(expected));
        assert_eq!(parse_iso_datetime("tomorrow"), None);
    }

    #[test]
    fn date_and_time_formats_are_strict() {
        assert!(parse_date("2024-01-10").is_some());
        assert!(parse_date("10/01/2024").is_none());
        assert!(parse_time("09:00:00").is_some());
        assert!(parse_time("9am").is_none());
    }
}
