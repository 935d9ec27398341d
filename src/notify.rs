// src/notify.rs

//! In-app notifications and best-effort patient emails.
//!
//! Callers commit their own write and the notification row first, then call
//! [`send_email`]. The email outcome never changes the HTTP status; it is
//! reported back as `email_status`.

use serde::{Serialize, Serializer};
use sqlx::SqliteExecutor;

use crate::mail::Mailer;
use crate::models::{AppointmentRow, NotificationStatus, UserRow, now_utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailStatus {
    Sent,
    Failed,
    NoAddress,
}

impl EmailStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EmailStatus::Sent => "Email sent successfully.",
            EmailStatus::Failed => "Email failed to send.",
            EmailStatus::NoAddress => "Patient email not found.",
        }
    }
}

impl Serialize for EmailStatus {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

pub struct Email {
    pub subject: &'static str,
    pub body: String,
}

/// Insert an UNREAD notification for `user_id` and return its id.
pub async fn insert_notification<'e, E>(
    db: E,
    user_id: i64,
    message: &str,
) -> Result<i64, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let now = now_utc();
    let res = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, message, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(user_id)
    .bind(message)
    .bind(NotificationStatus::Unread)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(res.last_insert_rowid())
}

/// Try once to deliver `email` to `to`. Never fails the caller.
pub async fn send_email(mailer: &dyn Mailer, to: &str, email: &Email) -> EmailStatus {
    if to.trim().is_empty() {
        return EmailStatus::NoAddress;
    }
    match mailer.send(to, email.subject, &email.body).await {
        Ok(()) => EmailStatus::Sent,
        Err(e) => {
            tracing::warn!("Failed to send email to {to}: {e}");
            EmailStatus::Failed
        }
    }
}

fn signed(first_name: &str, line: &str) -> String {
    format!("Dear {first_name},\n\n{line}\n\nBest regards,\nYour Therapy Team")
}

pub fn booking_notification(appt: &AppointmentRow) -> String {
    format!(
        "Your appointment has been successfully booked for {} at {}.",
        appt.date,
        appt.time.format("%H:%M:%S")
    )
}

pub fn booking_email(appt: &AppointmentRow, patient: &UserRow) -> Email {
    Email {
        subject: "Appointment Confirmation",
        body: signed(&patient.first_name, &booking_notification(appt)),
    }
}

pub fn status_update_notification(appt: &AppointmentRow) -> String {
    format!(
        "Your appointment on {} at {} has been updated to {}.",
        appt.date,
        appt.time.format("%H:%M:%S"),
        appt.status
    )
}

pub fn status_update_email(appt: &AppointmentRow, patient: &UserRow) -> Email {
    Email {
        subject: "Appointment Status Update",
        body: signed(&patient.first_name, &status_update_notification(appt)),
    }
}

pub fn password_reset_email(user: &UserRow, temporary_password: &str) -> Email {
    Email {
        subject: "Password Reset",
        body: signed(
            &user.first_name,
            &format!(
                "Your password has been reset. Your temporary password is: {temporary_password}\nPlease change it after logging in."
            ),
        ),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime};

    use super::*;
    use crate::mail::{LogMailer, MailError};
    use crate::models::{AppointmentStatus, UserRole, UserStatus};

    struct Refusing;

    #[async_trait]
    impl Mailer for Refusing {
        async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
            Err(MailError::Transport("connection refused".into()))
        }
    }

    fn appointment(status: AppointmentStatus) -> AppointmentRow {
        AppointmentRow {
            id: 1,
            patient_id: 1,
            therapist_id: 2,
            date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            status,
            notes: String::new(),
            has_patient_note: false,
            chat_completed: false,
            created_at: now_utc(),
            updated_at: now_utc(),
        }
    }

    fn patient() -> UserRow {
        UserRow {
            id: 1,
            username: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            user_type: UserRole::Patient,
            status: UserStatus::Active,
            first_name: "Alice".into(),
            last_name: "Smith".into(),
        }
    }

    #[test]
    fn texts_mention_date_time_and_status() {
        let appt = appointment(AppointmentStatus::Booked);
        assert_eq!(
            booking_notification(&appt),
            "Your appointment has been successfully booked for 2024-01-10 at 09:00:00."
        );
        assert_eq!(
            status_update_notification(&appt),
            "Your appointment on 2024-01-10 at 09:00:00 has been updated to BOOKED."
        );
        let email = status_update_email(&appt, &patient());
        assert_eq!(email.subject, "Appointment Status Update");
        assert!(email.body.starts_with("Dear Alice,"));
    }

    #[tokio::test]
    async fn delivery_failure_degrades_to_status() {
        let email = booking_email(&appointment(AppointmentStatus::Pending), &patient());
        assert_eq!(
            send_email(&Refusing, "alice@example.com", &email).await,
            EmailStatus::Failed
        );
        assert_eq!(send_email(&Refusing, "  ", &email).await, EmailStatus::NoAddress);
    }

    #[tokio::test]
    async fn disabled_mailer_is_not_reported_as_sent() {
        let email = booking_email(&appointment(AppointmentStatus::Pending), &patient());
        assert_eq!(
            send_email(&LogMailer, "alice@example.com", &email).await,
            EmailStatus::Failed
        );
    }

    #[test]
    fn email_status_serializes_as_sentence() {
        let v = serde_json::to_value(EmailStatus::Sent).unwrap();
        assert_eq!(v, serde_json::json!("Email sent successfully."));
    }
}
