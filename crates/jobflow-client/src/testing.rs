//! Test utilities for jobflow-client
//!
//! [`FakeJobServer`] is an in-process processing backend with scripted job
//! statuses. [`TestServer`] serves any axum router on an ephemeral port.

use std::collections::{BTreeMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::to_bytes;
use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::config::{ClientConfig, ClientConfigBuilder};
use crate::Result;

/// A test server that automatically shuts down when dropped
pub struct TestServer {
    pub addr: SocketAddr,
    base_path: String,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    /// Serve `router` on an ephemeral local port
    pub async fn start(router: Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        // Give server a moment to start
        tokio::time::sleep(Duration::from_millis(10)).await;

        Ok(Self {
            addr,
            base_path: String::new(),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Path prefix the routes are mounted under
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    pub fn base_url(&self) -> String {
        format!("http://{}{}", self.addr, self.base_path)
    }

    /// Client config pointed at this server, with a short poll interval
    pub fn config_builder(&self) -> ClientConfigBuilder {
        ClientConfig::builder(self.base_url())
            .poll_interval_ms(10)
            .request_timeout_ms(5_000)
            .connect_timeout_ms(2_000)
    }

    /// Shutdown the server gracefully
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// =============================================================================
// Fake backend
// =============================================================================

/// Status body for a job still running
pub fn pending(progress: f64) -> Value {
    json!({ "data": { "state": 0, "progress": progress } })
}

/// Status body for a finished job
pub fn completed(file: &str) -> Value {
    json!({ "data": { "state": 1, "progress": 100, "file": file } })
}

/// Status body for a failed job
pub fn failed(code: i64) -> Value {
    json!({ "data": { "state": code, "progress": 0 } })
}

/// A submission as received by the fake backend
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordedSubmit {
    /// Submit path below the mount point, e.g. `/visual/inpaint`
    pub path: String,
    /// Text fields
    pub fields: BTreeMap<String, String>,
    /// File fields: field name to file name
    pub files: BTreeMap<String, String>,
    /// Whether the body was multipart
    pub multipart: bool,
}

#[derive(Debug)]
struct FakeState {
    statuses: Mutex<VecDeque<Value>>,
    submit_response: Mutex<Value>,
    upload_response: Mutex<Value>,
    points_response: Mutex<Option<Value>>,
    reject_after: Mutex<Option<u32>>,
    submits: Mutex<Vec<RecordedSubmit>>,
    status_reads: AtomicU32,
    uploads: AtomicU32,
    points_reads: AtomicU32,
}

/// In-process processing backend with scripted behavior
///
/// Status reads pop the scripted bodies in order; the last one repeats once
/// the script is exhausted. All routes except login and points require
/// `Authorization: Bearer` [`FakeJobServer::TOKEN`].
#[derive(Debug, Clone)]
pub struct FakeJobServer {
    state: Arc<FakeState>,
}

impl Default for FakeJobServer {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeJobServer {
    pub const TOKEN: &'static str = "test-token";
    pub const USERNAME: &'static str = "alice";
    pub const PASSWORD: &'static str = "secret";
    pub const BASE_PATH: &'static str = "/api";
    pub const UPLOADED_URL: &'static str = "http://cdn.test/uploads/source.png";

    pub fn new() -> Self {
        Self {
            state: Arc::new(FakeState {
                statuses: Mutex::new(VecDeque::from([pending(0.0)])),
                submit_response: Mutex::new(json!({ "task_id": "job-1" })),
                upload_response: Mutex::new(json!({ "url": Self::UPLOADED_URL })),
                points_response: Mutex::new(Some(json!({
                    "configs": { "inpaint": 50, "scale": 10 },
                    "descriptions": {}
                }))),
                reject_after: Mutex::new(None),
                submits: Mutex::new(Vec::new()),
                status_reads: AtomicU32::new(0),
                uploads: AtomicU32::new(0),
                points_reads: AtomicU32::new(0),
            }),
        }
    }

    /// Replace the status script
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = Value>) -> &Self {
        *self.state.statuses.lock() = statuses.into_iter().collect();
        self
    }

    pub fn set_submit_response(&self, body: Value) -> &Self {
        *self.state.submit_response.lock() = body;
        self
    }

    pub fn set_upload_response(&self, body: Value) -> &Self {
        *self.state.upload_response.lock() = body;
        self
    }

    /// `None` makes the points endpoint answer 500
    pub fn set_points_response(&self, body: Option<Value>) -> &Self {
        *self.state.points_response.lock() = body;
        self
    }

    /// Answer 401 to every status read after the first `reads`
    pub fn reject_token_after(&self, reads: u32) -> &Self {
        *self.state.reject_after.lock() = Some(reads);
        self
    }

    pub fn status_reads(&self) -> u32 {
        self.state.status_reads.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> u32 {
        self.state.uploads.load(Ordering::SeqCst)
    }

    pub fn points_reads(&self) -> u32 {
        self.state.points_reads.load(Ordering::SeqCst)
    }

    pub fn submits(&self) -> Vec<RecordedSubmit> {
        self.state.submits.lock().clone()
    }

    /// Routes mounted under [`FakeJobServer::BASE_PATH`]
    pub fn router(&self) -> Router {
        let routes = Router::new()
            .route("/auth/login", post(login))
            .route("/upload/image", post(upload))
            .route("/visual/{operation}", post(submit_visual))
            .route("/pdf/remove-pdf-watermark", post(submit_pdf))
            .route("/visual/task/{id}", get(status))
            .route("/pdf/task/{id}", get(status))
            .route("/points/configs/dict", get(points))
            .with_state(self.state.clone());

        Router::new().nest(Self::BASE_PATH, routes)
    }

    /// Serve the fake backend on an ephemeral port
    pub async fn start(&self) -> Result<TestServer> {
        Ok(TestServer::start(self.router())
            .await?
            .with_base_path(Self::BASE_PATH))
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    let expected = format!("Bearer {}", FakeJobServer::TOKEN);
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == expected)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "detail": "Not authenticated" })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(Form(form): Form<LoginForm>) -> Response {
    if form.username == FakeJobServer::USERNAME && form.password == FakeJobServer::PASSWORD {
        Json(json!({ "access_token": FakeJobServer::TOKEN, "token_type": "bearer" }))
            .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Incorrect username or password" })),
        )
            .into_response()
    }
}

async fn upload(State(state): State<Arc<FakeState>>, request: Request) -> Response {
    if !authorized(request.headers()) {
        return unauthorized();
    }

    let recorded = match read_body(request).await {
        Ok(recorded) => recorded,
        Err(response) => return response,
    };
    if !recorded.files.contains_key("file") {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "file field is required" })),
        )
            .into_response();
    }

    state.uploads.fetch_add(1, Ordering::SeqCst);
    Json(state.upload_response.lock().clone()).into_response()
}

async fn submit_visual(
    State(state): State<Arc<FakeState>>,
    Path(operation): Path<String>,
    request: Request,
) -> Response {
    record_submit(state, format!("/visual/{}", operation), request).await
}

async fn submit_pdf(State(state): State<Arc<FakeState>>, request: Request) -> Response {
    record_submit(state, "/pdf/remove-pdf-watermark".to_string(), request).await
}

async fn record_submit(state: Arc<FakeState>, path: String, request: Request) -> Response {
    if !authorized(request.headers()) {
        return unauthorized();
    }

    let mut recorded = match read_body(request).await {
        Ok(recorded) => recorded,
        Err(response) => return response,
    };
    recorded.path = path;
    state.submits.lock().push(recorded);

    Json(state.submit_response.lock().clone()).into_response()
}

async fn status(
    State(state): State<Arc<FakeState>>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }

    let reads = state.status_reads.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(limit) = *state.reject_after.lock() {
        if reads > limit {
            return unauthorized();
        }
    }

    let mut statuses = state.statuses.lock();
    let body = if statuses.len() > 1 {
        statuses.pop_front()
    } else {
        statuses.front().cloned()
    };
    Json(body.unwrap_or_else(|| pending(0.0))).into_response()
}

async fn points(State(state): State<Arc<FakeState>>) -> Response {
    state.points_reads.fetch_add(1, Ordering::SeqCst);
    match state.points_response.lock().clone() {
        Some(body) => Json(body).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "message": "points unavailable" })),
        )
            .into_response(),
    }
}

fn bad_multipart(e: MultipartError) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "detail": e.body_text() })),
    )
        .into_response()
}

/// Parse a multipart or urlencoded form body
async fn read_body(request: Request) -> std::result::Result<RecordedSubmit, Response> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("multipart/form-data"));

    let mut recorded = RecordedSubmit {
        multipart: is_multipart,
        ..Default::default()
    };

    if is_multipart {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;

        while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
            let name = field.name().unwrap_or_default().to_string();
            match field.file_name().map(String::from) {
                Some(file_name) => {
                    field.bytes().await.map_err(bad_multipart)?;
                    recorded.files.insert(name, file_name);
                }
                None => {
                    let text = field.text().await.map_err(bad_multipart)?;
                    recorded.fields.insert(name, text);
                }
            }
        }
    } else {
        let bytes = to_bytes(request.into_body(), usize::MAX)
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()).into_response())?;
        recorded.fields = url::form_urlencoded::parse(&bytes).into_owned().collect();
    }

    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_bodies() {
        assert_eq!(pending(30.0)["data"]["state"], 0);
        assert_eq!(completed("http://x/y.png")["data"]["file"], "http://x/y.png");
        assert_eq!(failed(-7)["data"]["state"], -7);
    }

    #[tokio::test]
    async fn test_truncated_multipart_is_rejected() {
        let fake = FakeJobServer::new();
        let server = fake.start().await.unwrap();

        let body = "--XYZ\r\n\
                    Content-Disposition: form-data; name=\"file\"; filename=\"a.png\"\r\n\
                    \r\n\
                    partial";
        let response = reqwest::Client::new()
            .post(format!("{}/upload/image", server.base_url()))
            .bearer_auth(FakeJobServer::TOKEN)
            .header("content-type", "multipart/form-data; boundary=XYZ")
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        assert_eq!(fake.uploads(), 0);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_base_url_includes_mount_point() {
        let fake = FakeJobServer::new();
        let server = fake.start().await.unwrap();
        assert!(server.base_url().ends_with("/api"));
        assert!(server.base_url().starts_with("http://127.0.0.1:"));
        server.shutdown().await;
    }
}
