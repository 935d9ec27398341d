mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn booking_flow_follows_the_status_lifecycle() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;

    let (status, body) = app
        .post(
            "/appointments",
            &alice.token,
            json!({
                "patient_id": alice.id,
                "therapist_id": bob.id,
                "date": "2024-01-10",
                "time": "09:00:00",
                "notes": "first visit",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "Appointment created successfully!");
    assert_eq!(body["appointment"]["status"], "PENDING");
    assert_eq!(body["appointment"]["date"], "2024-01-10");
    assert_eq!(body["appointment"]["time"], "09:00:00");
    assert_eq!(body["appointment"]["has_patient_note"], false);
    assert_eq!(body["appointment"]["email_status"], "Email sent successfully.");
    let appt = body["appointment"]["id"].as_i64().unwrap();

    let sent = app.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "alice@example.com");
    assert_eq!(sent[0].subject, "Appointment Confirmation");
    assert!(sent[0].body.contains("booked for 2024-01-10 at 09:00:00"));

    let (status, body) = app.get("/notifications", &alice.token).await;
    assert_eq!(status, StatusCode::OK);
    let unread = body["notifications"].as_array().unwrap();
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0]["status"], "UNREAD");
    assert_eq!(
        unread[0]["message"],
        "Your appointment has been successfully booked for 2024-01-10 at 09:00:00."
    );

    let (status, body) = app
        .put(&format!("/appointments/{appt}"), &bob.token, json!({"status": "booked"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "BOOKED");
    assert_eq!(app.mailer.sent().len(), 2);
    assert_eq!(app.mailer.sent()[1].subject, "Appointment Status Update");

    let (_, body) = app.get("/notifications", &alice.token).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 2);

    app.schedule(&bob.token, appt, "cancelled").await;
    assert_eq!(app.appointment(&alice.token, appt).await["status"], "CANCELLED");
}

#[tokio::test]
async fn invalid_status_leaves_appointment_untouched() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let appt = app.create_appointment(&alice.token, alice.id, bob.id).await;

    let (status, body) = app
        .put(&format!("/appointments/{appt}"), &bob.token, json!({"status": "bogus"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("Invalid status value."));
    assert_eq!(app.appointment(&alice.token, appt).await["status"], "PENDING");

    // Only the booking email went out.
    assert_eq!(app.mailer.sent().len(), 1);
}

#[tokio::test]
async fn update_can_change_notes_without_status() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let appt = app.create_appointment(&alice.token, alice.id, bob.id).await;

    let (status, body) = app
        .put(&format!("/appointments/{appt}"), &bob.token, json!({"notes": "bring x-rays"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["notes"], "bring x-rays");
    assert_eq!(body["appointment"]["status"], "PENDING");

    let (status, _) = app
        .put("/appointments/999", &bob.token, json!({"status": "booked"}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_validates_input() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;

    let (status, body) = app
        .post("/appointments", &alice.token, json!({"patient_id": alice.id}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Therapist ID, patient ID, date, and time are required."
    );

    let (status, _) = app
        .post(
            "/appointments",
            &alice.token,
            json!({"patient_id": alice.id, "therapist_id": bob.id, "date": "10/01/2024", "time": "09:00:00"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .post(
            "/appointments",
            &alice.token,
            json!({"patient_id": alice.id, "therapist_id": 999, "date": "2024-01-10", "time": "09:00:00"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Therapist not found.");
    assert_eq!(app.count("SELECT COUNT(*) FROM appointments").await, 0);
}

#[tokio::test]
async fn email_failure_still_commits_booking_and_notification() {
    let app = TestApp::with_failing_mailer().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;

    let (status, body) = app
        .post(
            "/appointments",
            &alice.token,
            json!({"patient_id": alice.id, "therapist_id": bob.id, "date": "2024-02-01", "time": "14:30:00"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["email_status"], "Email failed to send.");

    assert_eq!(app.count("SELECT COUNT(*) FROM appointments").await, 1);
    let (_, body) = app.get("/notifications", &alice.token).await;
    assert_eq!(body["notifications"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn scheduling_maps_slot_status_onto_appointment() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;

    let booked = app.create_appointment(&alice.token, alice.id, bob.id).await;
    let slot = app.schedule(&bob.token, booked, "SCHEDULED").await;
    assert_eq!(app.appointment(&alice.token, booked).await["status"], "BOOKED");

    let (status, body) = app
        .get(&format!("/scheduled_appointments/{booked}"), &alice.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scheduled_appointment"]["id"], slot);
    assert_eq!(body["scheduled_appointment"]["status"], "SCHEDULED");

    let confirmed = app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.schedule(&bob.token, confirmed, "confirmed").await;
    assert_eq!(app.appointment(&alice.token, confirmed).await["status"], "CANCELLED");

    let (status, _) = app
        .post(
            "/scheduled_appointments",
            &bob.token,
            json!({"appointment_id": booked, "scheduled_time": "2024-01-10T09:00:00", "status": "maybe"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .post(
            "/scheduled_appointments",
            &bob.token,
            json!({"appointment_id": 999, "scheduled_time": "2024-01-10T09:00:00"}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let fresh = app.create_appointment(&alice.token, alice.id, bob.id).await;
    let (status, body) = app
        .get(&format!("/scheduled_appointments/{fresh}"), &alice.token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Scheduled appointment not found.");
}

#[tokio::test]
async fn patient_note_and_treatment_drive_completion() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let appt = app.create_appointment(&alice.token, alice.id, bob.id).await;
    let slot = app.schedule(&bob.token, appt, "CANCELLED").await;

    let (status, body) = app
        .post(
            "/patient_notes",
            &bob.token,
            json!({"scheduled_appointment_id": slot, "notes": "Stable", "diagnosis": "Mild strain"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["patient_note"]["notes"], "Stable");
    assert_eq!(body["patient_note"]["scheduled_appointment"]["id"], slot);

    let after_note = app.appointment(&alice.token, appt).await;
    assert_eq!(after_note["status"], "ALMOST_COMPLETE");
    assert_eq!(after_note["has_patient_note"], true);

    let (status, details) = app
        .get(&format!("/appointment-details/{appt}"), &alice.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(details["therapist_name"], "Bob Jones");
    assert_eq!(details["patient_notes"].as_array().unwrap().len(), 1);
    assert_eq!(details["patient_notes"][0]["diagnosis"], "Mild strain");
    assert!(details["treatments"].as_array().unwrap().is_empty());

    let (status, body) = app
        .post(
            "/treatments",
            &bob.token,
            json!({
                "patient_id": alice.id,
                "therapist_id": bob.id,
                "notes": "Physio twice weekly",
                "prescription": "Ibuprofen",
                "start_date": "2024-01-11",
                "appointment_id": appt,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["treatment"]["start_date"], "2024-01-11");
    assert_eq!(app.appointment(&alice.token, appt).await["status"], "COMPLETED");

    let (_, details) = app
        .get(&format!("/appointment-details/{appt}"), &alice.token)
        .await;
    assert_eq!(details["status"], "COMPLETED");
    assert_eq!(details["treatments"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let carol = app.register("carol", "patient", "Carol", "White").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let dan = app.register("dan", "therapist", "Dan", "Brown").await;

    app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.create_appointment(&carol.token, carol.id, dan.id).await;

    let (status, body) = app.get("/appointments", &alice.token).await;
    assert_eq!(status, StatusCode::OK);
    let mine = body["appointments"].as_array().unwrap();
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|a| a["patient_id"] == alice.id));
    assert_eq!(mine[0]["therapist_name"], "Bob Jones");

    let (_, body) = app.get("/appointments", &dan.token).await;
    assert_eq!(body["appointments"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .get(&format!("/appointments/user/{}", carol.id), &alice.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get(&format!("/appointments/user/{}", alice.id), &alice.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointments"].as_array().unwrap().len(), 2);

    // A therapist always gets their own appointments, whatever id is asked for.
    let (status, body) = app
        .get(&format!("/appointments/user/{}", carol.id), &bob.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = body["appointments"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|a| a["therapist_id"] == bob.id));
}

#[tokio::test]
async fn counterpart_lists_are_distinct_and_owner_only() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let carol = app.register("carol", "patient", "Carol", "White").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let dan = app.register("dan", "therapist", "Dan", "Brown").await;

    app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.create_appointment(&carol.token, carol.id, bob.id).await;

    let (status, body) = app
        .get(&format!("/therapist/{}/patients", bob.id), &bob.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let patients = body["patients"].as_array().unwrap();
    assert_eq!(patients.len(), 2);
    assert_eq!(patients[0]["first_name"], "Alice");
    assert_eq!(patients[0]["email"], "alice@example.com");

    let (status, _) = app
        .get(&format!("/therapist/{}/patients", bob.id), &dan.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .get(&format!("/therapist/{}/patients", bob.id), &alice.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .get(&format!("/patient/{}/therapists", alice.id), &alice.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["therapists"].as_array().unwrap().len(), 1);

    let (status, _) = app
        .get(&format!("/patient/{}/therapists", alice.id), &carol.token)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_removes_dependent_rows() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let appt = app.create_appointment(&alice.token, alice.id, bob.id).await;
    let slot = app.schedule(&bob.token, appt, "SCHEDULED").await;
    let (status, _) = app
        .post(
            "/patient_notes",
            &bob.token,
            json!({"scheduled_appointment_id": slot, "notes": "Stable"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .post(
            "/chat/messages",
            &alice.token,
            json!({"recipient_id": bob.id, "content": "hello", "appointment_id": appt}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app.delete(&format!("/appointments/{appt}"), &bob.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Appointment deleted successfully!");

    assert_eq!(app.count("SELECT COUNT(*) FROM appointments").await, 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM scheduled_appointments").await, 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM chat_messages").await, 0);
    assert_eq!(app.count("SELECT COUNT(*) FROM patient_notes").await, 0);

    let (status, _) = app.get(&format!("/appointments/{appt}"), &alice.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete(&format!("/appointments/{appt}"), &bob.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_writes_overwrite_terminal_states() {
    let app = TestApp::new().await;
    let alice = app.register("alice", "patient", "Alice", "Smith").await;
    let bob = app.register("bob", "therapist", "Bob", "Jones").await;
    let appt = app.create_appointment(&alice.token, alice.id, bob.id).await;
    app.schedule(&bob.token, appt, "CANCELLED").await;
    assert_eq!(app.appointment(&alice.token, appt).await["status"], "CANCELLED");

    let (status, body) = app
        .put(&format!("/appointments/{appt}/ongoing"), &bob.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Appointment marked as ongoing successfully!");
    assert_eq!(app.appointment(&alice.token, appt).await["status"], "ONGOING");

    let (status, body) = app
        .put(
            &format!("/appointments/{appt}"),
            &bob.token,
            json!({"status": "Almost_Complete"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "ALMOST_COMPLETE");
}
