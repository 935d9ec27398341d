#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::SqlitePool;
use tower::ServiceExt;

use carebook_server::{
    app, db,
    mail::{MailError, Mailer},
    models::AppState,
};

pub const PASSWORD: &str = "pw1";

#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Accepts every email and keeps a copy.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentEmail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Simulates an unreachable SMTP relay.
pub struct FailingMailer;

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), MailError> {
        Err(MailError::Transport("connection refused".into()))
    }
}

#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub token: String,
}

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Self {
        let recorder = Arc::new(RecordingMailer::default());
        Self::build(recorder.clone(), recorder).await
    }

    pub async fn with_failing_mailer() -> Self {
        Self::build(Arc::new(FailingMailer), Arc::new(RecordingMailer::default())).await
    }

    async fn build(mailer: Arc<dyn Mailer>, recorder: Arc<RecordingMailer>) -> Self {
        let pool = db::connect_in_memory().await.expect("in-memory database");
        let state = AppState {
            db: pool.clone(),
            mailer,
            session_ttl_hours: 1,
        };
        Self {
            router: app(state),
            db: pool,
            mailer: recorder,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(v) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(v.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::PATCH, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::DELETE, uri, Some(token), None).await
    }

    pub async fn register(
        &self,
        username: &str,
        user_type: &str,
        first_name: &str,
        last_name: &str,
    ) -> Account {
        let (status, body) = self
            .send(
                Method::POST,
                "/register",
                None,
                Some(json!({
                    "username": username,
                    "password": PASSWORD,
                    "email": format!("{username}@example.com"),
                    "user_type": user_type,
                    "first_name": first_name,
                    "last_name": last_name,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {username}: {body}");
        Account {
            id: body["user"]["id"].as_i64().unwrap(),
            token: body["access_token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn create_appointment(&self, token: &str, patient_id: i64, therapist_id: i64) -> i64 {
        let (status, body) = self
            .post(
                "/appointments",
                token,
                json!({
                    "patient_id": patient_id,
                    "therapist_id": therapist_id,
                    "date": "2024-01-10",
                    "time": "09:00:00",
                    "notes": "first visit",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create appointment: {body}");
        body["appointment"]["id"].as_i64().unwrap()
    }

    pub async fn schedule(&self, token: &str, appointment_id: i64, status: &str) -> i64 {
        let (code, body) = self
            .post(
                "/scheduled_appointments",
                token,
                json!({
                    "appointment_id": appointment_id,
                    "scheduled_time": "2024-01-10T09:00:00",
                    "status": status,
                }),
            )
            .await;
        assert_eq!(code, StatusCode::CREATED, "schedule: {body}");
        body["scheduled_appointment"]["id"].as_i64().unwrap()
    }

    pub async fn appointment(&self, token: &str, appointment_id: i64) -> Value {
        let (status, body) = self
            .get(&format!("/appointments/{appointment_id}"), token)
            .await;
        assert_eq!(status, StatusCode::OK, "get appointment: {body}");
        body["appointment"].clone()
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(&self.db).await.unwrap()
    }
}
