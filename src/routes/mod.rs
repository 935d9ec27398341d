use axum::Router;

use crate::models::AppState;

pub mod appointment_routes;
pub mod auth_routes;
pub mod chat_routes;
pub mod mood_routes;
pub mod notification_routes;
pub mod patient_note_routes;
pub mod scheduled_appointment_routes;
pub mod treatment_routes;
pub mod user_routes;

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(auth_routes::router())
        .merge(user_routes::router())
        .merge(appointment_routes::router())
        .merge(scheduled_appointment_routes::router())
        .merge(patient_note_routes::router())
        .merge(treatment_routes::router())
        .merge(notification_routes::router())
        .merge(chat_routes::router())
        .merge(mood_routes::router())
        .with_state(state)
}

/// Trimmed value of an optional string field, `None` when absent or blank.
pub(crate) fn non_empty(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_fields_count_as_missing() {
        assert_eq!(non_empty(&None), None);
        assert_eq!(non_empty(&Some("   ".into())), None);
        assert_eq!(non_empty(&Some(" bob ".into())), Some("bob"));
    }
}
