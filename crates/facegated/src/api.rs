//! HTTP API.
//!
//! Endpoints:
//! - POST /api/recognize   {image: data URL} -> {faces_detected, names}
//! - POST /api/add_person  multipart name + file -> {status: "added", name}
//! - GET  /api/history     {log: [line]}
//! - GET  /api/people      {people: [identity]} (fresh directory scan)
//! - GET  /api/status      daemon status
//!
//! Handled failures are answered with HTTP 200 and `{error, kind}`.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::engine::EngineHandle;
use crate::events::{EventLog, EventLogError};
use crate::recognize::{self, Recognition, RecognizeError};
use crate::registry::{Registry, RegistryError};

/// Upper bound for request bodies (probe data URLs and uploaded reference images).
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub registry: Arc<Registry>,
    pub events: Arc<EventLog>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Recognize(#[from] RecognizeError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("missing form field {0:?}")]
    MissingField(&'static str),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Recognize(RecognizeError::Probe(_)) => "invalid_image",
            ApiError::Recognize(RecognizeError::Engine(_)) => "engine",
            ApiError::Recognize(RecognizeError::EventLog(_)) | ApiError::EventLog(_) => "event_log",
            ApiError::Registry(RegistryError::InvalidIdentity(_)) => "invalid_identity",
            ApiError::Registry(RegistryError::UnsupportedExtension(_)) => "unsupported_extension",
            ApiError::Registry(RegistryError::Io { .. }) => "store",
            ApiError::Multipart(_) | ApiError::MissingField(_) => "invalid_form",
            ApiError::Recognize(RecognizeError::Task(_)) | ApiError::Task(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(kind = self.kind(), error = %self, "request failed");
        (
            StatusCode::OK,
            Json(json!({
                "error": self.to_string(),
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}

#[derive(Debug, Deserialize)]
struct RecognizeRequest {
    image: String,
}

/// Build the router with permissive CORS (local/dev use).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/recognize", post(recognize))
        .route("/api/add_person", post(add_person))
        .route("/api/history", get(history))
        .route("/api/people", get(people))
        .route("/api/status", get(status))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `addr` until ctrl-c.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "facegated listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("facegated shutting down");
        })
        .await?;
    Ok(())
}

async fn recognize(
    State(state): State<AppState>,
    Json(req): Json<RecognizeRequest>,
) -> Result<Json<Recognition>, ApiError> {
    let result = recognize::recognize(req.image, &state.engine, state.registry.dir(), &state.events).await?;
    Ok(Json(result))
}

async fn add_person(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut name = None;
    let mut upload = None;

    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await?),
            Some("file") => {
                let extension = field
                    .file_name()
                    .and_then(|f| Path::new(f).extension())
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string();
                upload = Some((extension, field.bytes().await?));
            }
            _ => {}
        }
    }

    let name = name.ok_or(ApiError::MissingField("name"))?;
    let (extension, bytes) = upload.ok_or(ApiError::MissingField("file"))?;

    let registry = state.registry.clone();
    let stored = tokio::task::spawn_blocking(move || registry.register(&name, &bytes, &extension)).await??;

    Ok(Json(json!({ "status": "added", "name": stored })))
}

async fn history(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let log = state.events.read_all().await?;
    Ok(Json(json!({ "log": log })))
}

async fn people(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let registry = state.registry.clone();
    let people = tokio::task::spawn_blocking(move || registry.scan_people()).await??;
    Ok(Json(json!({ "people": people })))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "identities": state.registry.list_identities().len(),
        "store_dir": state.registry.dir().display().to_string(),
        "log_file": state.events.path().display().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use crate::testutil::{png_bytes, png_data_url, SizeMatchEngine};
    use axum::body::Body;
    use axum::http::{header, Request};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "facegate-test-boundary";

    struct TestApp {
        router: Router,
        _dir: tempfile::TempDir,
    }

    fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState {
            engine: spawn_engine(SizeMatchEngine, 4),
            registry: Arc::new(Registry::open(dir.path().join("known_faces")).unwrap()),
            events: Arc::new(EventLog::new(dir.path().join("events.log"))),
        };
        TestApp {
            router: router(state),
            _dir: dir,
        }
    }

    async fn send(app: &TestApp, request: Request<Body>) -> Value {
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn get_json(app: &TestApp, uri: &str) -> Value {
        send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    async fn recognize_json(app: &TestApp, image: &str) -> Value {
        let request = Request::builder()
            .method("POST")
            .uri("/api/recognize")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json!({ "image": image }).to_string()))
            .unwrap();
        send(app, request).await
    }

    async fn add_person(app: &TestApp, name: Option<&str>, file: Option<(&str, Vec<u8>)>) -> Value {
        let mut body = Vec::new();
        if let Some(name) = name {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"name\"\r\n\r\n{name}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(&bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let request = Request::builder()
            .method("POST")
            .uri("/api/add_person")
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap();
        send(app, request).await
    }

    #[tokio::test]
    async fn test_add_person_then_people() {
        let app = app();
        let added = add_person(&app, Some("alice"), Some(("alice.jpg", png_bytes(4, 4)))).await;
        assert_eq!(added, json!({ "status": "added", "name": "alice" }));

        let people = get_json(&app, "/api/people").await;
        assert_eq!(people, json!({ "people": ["alice"] }));

        let status = get_json(&app, "/api/status").await;
        assert_eq!(status["identities"], 1);
    }

    #[tokio::test]
    async fn test_recognize_known_face_logs_history() {
        let app = app();
        add_person(&app, Some("alice"), Some(("alice.png", png_bytes(4, 4)))).await;
        add_person(&app, Some("bob"), Some(("bob.png", png_bytes(7, 5)))).await;

        let result = recognize_json(&app, &png_data_url(4, 4)).await;
        assert_eq!(result, json!({ "faces_detected": 1, "names": ["alice"] }));

        let history = get_json(&app, "/api/history").await;
        let log = history["log"].as_array().unwrap();
        assert_eq!(log.len(), 1);
        let line = log[0].as_str().unwrap();
        assert!(line.contains(" - alice"));
        assert!(line.ends_with('\n'));
    }

    #[tokio::test]
    async fn test_recognize_unknown_face_returns_sentinel() {
        let app = app();
        add_person(&app, Some("alice"), Some(("alice.png", png_bytes(4, 4)))).await;

        let result = recognize_json(&app, &png_data_url(10, 10)).await;
        assert_eq!(result, json!({ "faces_detected": 0, "names": ["Неизвестен"] }));
        assert_eq!(get_json(&app, "/api/history").await, json!({ "log": [] }));
    }

    #[tokio::test]
    async fn test_recognize_malformed_data_url_is_error_payload() {
        let app = app();
        let result = recognize_json(&app, "data:image/png;base64").await;
        assert_eq!(result["kind"], "invalid_image");
        assert!(result["error"].as_str().unwrap().contains("data URL"));
        assert!(result.get("names").is_none());
    }

    #[tokio::test]
    async fn test_add_person_rejects_bad_input() {
        let app = app();

        let traversal = add_person(&app, Some("../evil"), Some(("x.jpg", png_bytes(2, 2)))).await;
        assert_eq!(traversal["kind"], "invalid_identity");

        let gif = add_person(&app, Some("carol"), Some(("carol.gif", png_bytes(2, 2)))).await;
        assert_eq!(gif["kind"], "unsupported_extension");

        let no_file = add_person(&app, Some("dave"), None).await;
        assert_eq!(no_file["kind"], "invalid_form");

        assert_eq!(get_json(&app, "/api/people").await, json!({ "people": [] }));
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let app = app();
        let request = Request::builder()
            .uri("/api/people")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let allow = response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap();
        assert_eq!(allow, "*");
    }
}
