// src/lifecycle.rs

//! Appointment status writes.
//!
//! Status is a plain column. Every write below is an unconditional overwrite;
//! none of them looks at the current value. The writers are:
//!
//! | Operation                          | New status                      |
//! |------------------------------------|---------------------------------|
//! | `POST /appointments`               | `PENDING` (set on insert)       |
//! | `POST /scheduled_appointments`     | [`status_after_scheduling`]     |
//! | `PUT /appointments/{id}`           | client supplied name            |
//! | `PUT /appointments/{id}/ongoing`   | `ONGOING`                       |
//! | `POST /patient_notes`              | `ALMOST_COMPLETE` (+ note flag) |
//! | `POST /treatments` with appointment| `COMPLETED`                     |
//! | `POST /chat/messages/{id}/complete`| `ONGOING` (+ chat flag)         |

use sqlx::SqliteExecutor;

use crate::models::{AppointmentStatus, MessageType, ScheduledStatus, now_utc};

/// Overwrite an appointment's status. Returns `false` when no row has `id`.
pub async fn set_status<'e, E>(
    db: E,
    appointment_id: i64,
    status: AppointmentStatus,
) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query("UPDATE appointments SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status)
        .bind(now_utc())
        .bind(appointment_id)
        .execute(db)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// A patient note was filed: flag it and move to `ALMOST_COMPLETE`.
pub async fn mark_patient_note<'e, E>(db: E, appointment_id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query(
        r#"
        UPDATE appointments
        SET has_patient_note = 1,
            status = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(AppointmentStatus::AlmostComplete)
    .bind(now_utc())
    .bind(appointment_id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// The chat for an appointment was closed: flag it and move to `ONGOING`.
pub async fn mark_chat_completed<'e, E>(db: E, appointment_id: i64) -> Result<bool, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    let res = sqlx::query(
        r#"
        UPDATE appointments
        SET chat_completed = 1,
            status = ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(AppointmentStatus::Ongoing)
    .bind(now_utc())
    .bind(appointment_id)
    .execute(db)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// One-shot decision taken when a slot is attached.
pub fn status_after_scheduling(scheduled: ScheduledStatus) -> AppointmentStatus {
    match scheduled {
        ScheduledStatus::Scheduled => AppointmentStatus::Booked,
        ScheduledStatus::Confirmed | ScheduledStatus::Cancelled => AppointmentStatus::Cancelled,
    }
}

/// Direction of a first message. Decided by comparing ids, not roles, so any
/// message to someone else counts as patient-to-therapist.
pub fn direction_of_new_message(sender_id: i64, recipient_id: i64) -> MessageType {
    if sender_id != recipient_id {
        MessageType::PatientToTherapist
    } else {
        MessageType::TherapistToPatient
    }
}

/// Direction of a reply: therapist-to-patient when the replier received the
/// original message, patient-to-therapist otherwise. Ids only, as above.
pub fn direction_of_reply(replier_id: i64, original_recipient_id: i64) -> MessageType {
    if replier_id == original_recipient_id {
        MessageType::TherapistToPatient
    } else {
        MessageType::PatientToTherapist
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_scheduled_books() {
        assert_eq!(
            status_after_scheduling(ScheduledStatus::Scheduled),
            AppointmentStatus::Booked
        );
        assert_eq!(
            status_after_scheduling(ScheduledStatus::Confirmed),
            AppointmentStatus::Cancelled
        );
        assert_eq!(
            status_after_scheduling(ScheduledStatus::Cancelled),
            AppointmentStatus::Cancelled
        );
    }

    #[test]
    fn new_message_direction_compares_ids() {
        // A therapist writing to a patient is still tagged patient-to-therapist.
        assert_eq!(direction_of_new_message(2, 1), MessageType::PatientToTherapist);
        assert_eq!(direction_of_new_message(1, 2), MessageType::PatientToTherapist);
        assert_eq!(direction_of_new_message(4, 4), MessageType::TherapistToPatient);
    }

    #[test]
    fn reply_direction_compares_against_original_recipient() {
        assert_eq!(direction_of_reply(2, 2), MessageType::TherapistToPatient);
        assert_eq!(direction_of_reply(1, 2), MessageType::PatientToTherapist);
    }
}
