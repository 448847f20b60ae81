//! Route handlers for the intake API.

pub mod admin;
pub mod chatbot;
pub mod contacts;
pub mod health;
pub mod patients;
pub mod uploads;
pub mod volunteers;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{middleware, Json, Router};
use database::query::SortOrder;
use database::validation::FieldValidator;
use database::StatsWindow;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::error::{expose_error_detail, ApiError, Result};
use crate::state::AppState;
use crate::storage::{MAX_UPLOAD_BYTES, PUBLIC_PREFIX};

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/api/health", get(health::health))
        // Patients
        .route("/api/patients", post(patients::submit).get(patients::list))
        .route("/api/patients/statistics", get(patients::statistics))
        .route("/api/patients/:id", get(patients::fetch).put(patients::update))
        .route("/api/patients/:id/notes", post(patients::add_note))
        .route("/api/patients/:id/assign", put(patients::assign))
        .route("/api/patients/:id/resolve", put(patients::resolve))
        // Volunteers
        .route("/api/volunteers", post(volunteers::submit).get(volunteers::list))
        .route("/api/volunteers/available", get(volunteers::available))
        .route("/api/volunteers/statistics", get(volunteers::statistics))
        .route("/api/volunteers/:id", get(volunteers::fetch))
        .route("/api/volunteers/:id/approve", put(volunteers::approve))
        .route("/api/volunteers/:id/reject", put(volunteers::reject))
        .route("/api/volunteers/:id/status", put(volunteers::set_status))
        .route("/api/volunteers/:id/reviews", post(volunteers::add_review))
        // Contact messages
        .route("/api/contact", post(contacts::submit).get(contacts::list))
        .route("/api/contact/statistics", get(contacts::statistics))
        .route("/api/contact/:id", get(contacts::fetch).put(contacts::update))
        .route("/api/contact/:id/notes", post(contacts::add_note))
        .route("/api/contact/:id/respond", post(contacts::respond))
        .route("/api/contact/:id/assign", put(contacts::assign))
        // Chat assistant
        .route("/api/chatbot", post(chatbot::send_message))
        .route("/api/chatbot/end", post(chatbot::end))
        .route("/api/chatbot/rate", post(chatbot::rate))
        .route("/api/chatbot/sessions", get(chatbot::list_sessions))
        .route("/api/chatbot/sessions/:session_id", get(chatbot::fetch_session))
        .route("/api/chatbot/statistics", get(chatbot::statistics))
        // Admin reporting
        .route("/api/admin/dashboard", get(admin::dashboard))
        .route("/api/admin/overview", get(admin::overview))
        .route("/api/admin/analytics", get(admin::analytics))
        .route("/api/admin/alerts", get(admin::alerts))
        // Uploads
        .route("/api/uploads/:kind", post(uploads::upload))
}

/// The full application: routes, middleware and static upload serving.
pub fn app(state: AppState) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);
    let timeout = state.config.request_timeout;

    router()
        // Room for a full-size upload plus multipart framing.
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 1024 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            expose_error_detail,
        ))
        .nest_service(PUBLIC_PREFIX, uploads)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
}

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub data: T,
}

/// 200 with `data`.
pub fn ok<T>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: None,
        data,
    })
}

/// 200 with a message and `data`.
pub fn ok_with<T>(message: &str, data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        message: Some(message.to_string()),
        data,
    })
}

/// 201 with a message and `data`.
pub fn created<T>(message: &str, data: T) -> (StatusCode, Json<Envelope<T>>) {
    (StatusCode::CREATED, ok_with(message, data))
}

/// `startDate`/`endDate` query parameters for statistics.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl WindowQuery {
    pub fn window(&self) -> Result<StatsWindow> {
        Ok(StatsWindow::resolve(
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?)
    }
}

/// A staff note.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteBody {
    pub author: Option<String>,
    pub content: Option<String>,
}

impl NoteBody {
    /// Returns `(author, content)`; the author defaults to `staff`.
    pub fn validate(&self) -> Result<(String, String)> {
        let mut v = FieldValidator::new();
        let author = v.optional_text("author", self.author.as_deref(), 100);
        let content = v.required_text("content", self.content.as_deref(), 1000);

        match content {
            Some(content) if v.is_valid() => {
                Ok((author.unwrap_or_else(|| "staff".to_string()), content))
            }
            _ => Err(ApiError::Validation(v.into_errors())),
        }
    }
}

/// Turn collected errors into a 400.
pub fn finish(v: FieldValidator) -> Result<()> {
    if v.is_valid() {
        Ok(())
    } else {
        Err(ApiError::Validation(v.into_errors()))
    }
}

/// Parse `sortOrder`, defaulting to descending.
pub fn sort_order(v: &mut FieldValidator, raw: Option<&str>) -> SortOrder {
    v.optional_choice("sortOrder", raw, SortOrder::parse)
        .unwrap_or_default()
}

/// Split a comma-separated query value.
pub fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Best-effort client details for intake records.
pub fn client_info(headers: &axum::http::HeaderMap) -> (Option<String>, Option<String>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let user_agent = header("user-agent");
    let ip = header("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .or_else(|| header("x-real-ip"));
    (user_agent, ip)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use database::Database;
    use serde_json::Value;
    use tower::ServiceExt;
    use triage_core::{
        async_trait, AiSummary, ChatReply, ConcernContext, GuardedTriage, KeywordTriage, Triage,
        TriageError,
    };

    use crate::config::Config;
    use crate::notify::testing::RecordingNotifier;
    use crate::state::AppState;
    use crate::storage::LocalFileStore;

    /// A strategy whose every call fails.
    pub struct FailingTriage;

    #[async_trait]
    impl Triage for FailingTriage {
        async fn summarize(&self, _context: &ConcernContext) -> Result<AiSummary, TriageError> {
            Err(TriageError::Network("connection refused".to_string()))
        }

        async fn reply(&self, _message: &str) -> Result<ChatReply, TriageError> {
            Err(TriageError::Network("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "FailingTriage"
        }
    }

    /// A strategy that answers every message with the same reply.
    pub struct ScriptedTriage(pub ChatReply);

    #[async_trait]
    impl Triage for ScriptedTriage {
        async fn summarize(&self, context: &ConcernContext) -> Result<AiSummary, TriageError> {
            Ok(triage_core::summarize_concern(context))
        }

        async fn reply(&self, _message: &str) -> Result<ChatReply, TriageError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &str {
            "ScriptedTriage"
        }
    }

    pub struct TestApp {
        pub app: Router,
        pub state: AppState,
        pub notifier: Arc<RecordingNotifier>,
    }

    pub async fn test_app() -> TestApp {
        test_app_with(Arc::new(KeywordTriage::new()), &[]).await
    }

    /// An app over a fresh in-memory database with `vars` as its environment.
    pub async fn test_app_with(strategy: Arc<dyn Triage>, vars: &[(&str, &str)]) -> TestApp {
        let upload_dir = std::env::temp_dir().join(format!("careconnect-{}", uuid::Uuid::new_v4()));
        let upload_dir = upload_dir.to_string_lossy().to_string();
        let config = Config::from_lookup(|key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .or_else(|| (key == "UPLOAD_DIR").then(|| upload_dir.clone()))
        })
        .unwrap();

        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let notifier = Arc::new(RecordingNotifier::default());
        let state = AppState::new(
            db,
            GuardedTriage::new(strategy, Duration::from_millis(200)),
            Arc::new(LocalFileStore::new(&config.upload_dir)),
            notifier.clone(),
            config,
        );

        TestApp {
            app: super::app(state.clone()),
            state,
            notifier,
        }
    }

    /// Send a request and decode the JSON response.
    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        request_json(app, request).await
    }

    pub async fn request_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    pub fn patient_body() -> Value {
        serde_json::json!({
            "fullName": "A",
            "age": 30,
            "gender": "male",
            "phone": "1",
            "email": "a@b.com",
            "location": "X",
            "medicalConcern": "I have a headache",
            "urgencyLevel": "medium"
        })
    }

    pub fn volunteer_body(email: &str) -> Value {
        serde_json::json!({
            "fullName": "Dana Reyes",
            "email": email,
            "phone": "555-0100",
            "skills": ["first-aid", "general-practice"],
            "experience": "Ten years as a ward nurse",
            "availability": [{"day": "monday", "startTime": "09:00", "endTime": "17:00"}],
            "city": "Springfield",
            "state": "IL",
            "whyVolunteer": "To give back"
        })
    }
}
