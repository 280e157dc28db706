//! In-process stand-in for the MedHome REST API
//!
//! Issues numbered tokens (`access-1`, `refresh-1`, ...) and counts the
//! calls the tests care about. Knobs let a test expire the access token,
//! refuse every access token, reject refreshes, slow refreshes down, or play
//! the admin.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use chrono::Utc;
use client::{ApiClient, MemoryTokenStore, SessionManager, TokenStore};
use common::models::{
    Enrollment, LoginCredentials, RefreshTokenRequest, Role, TokenResponse, User,
};
use serde_json::json;
use uuid::Uuid;

pub const EMAIL: &str = "student@medhome.test";
pub const PASSWORD: &str = "Correct1pass";

struct Tokens {
    generation: u32,
    access_token: String,
    refresh_token: String,
    access_valid: bool,
    reject_all_access: bool,
    login_expires_in: u64,
    refresh_expires_in: u64,
    reject_refresh: bool,
    refresh_delay: Duration,
}

#[derive(Clone)]
pub struct MockState {
    tokens: Arc<Mutex<Tokens>>,
    enrollments: Arc<Mutex<HashMap<Uuid, Enrollment>>>,
    user_id: Uuid,
    pub refresh_calls: Arc<AtomicUsize>,
    pub logout_calls: Arc<AtomicUsize>,
    pub me_calls: Arc<AtomicUsize>,
    pub upload_calls: Arc<AtomicUsize>,
}

impl MockState {
    fn new() -> Self {
        Self {
            tokens: Arc::new(Mutex::new(Tokens {
                generation: 0,
                access_token: String::new(),
                refresh_token: String::new(),
                access_valid: false,
                reject_all_access: false,
                login_expires_in: 3600,
                refresh_expires_in: 3600,
                reject_refresh: false,
                refresh_delay: Duration::ZERO,
            })),
            enrollments: Arc::new(Mutex::new(HashMap::new())),
            user_id: Uuid::new_v4(),
            refresh_calls: Arc::new(AtomicUsize::new(0)),
            logout_calls: Arc::new(AtomicUsize::new(0)),
            me_calls: Arc::new(AtomicUsize::new(0)),
            upload_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make the current access token fail with 401 from now on.
    pub fn expire_access_token(&self) {
        self.tokens.lock().unwrap().access_valid = false;
    }

    /// Answer 401 to every access token, including freshly refreshed ones.
    pub fn reject_all_access(&self) {
        self.tokens.lock().unwrap().reject_all_access = true;
    }

    pub fn reject_refresh(&self) {
        self.tokens.lock().unwrap().reject_refresh = true;
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.tokens.lock().unwrap().refresh_delay = delay;
    }

    pub fn set_refresh_expires_in(&self, seconds: u64) {
        self.tokens.lock().unwrap().refresh_expires_in = seconds;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Admin decision, as taken on the server.
    pub fn admin_reject(&self, id: Uuid, reason: &str) {
        let mut enrollments = self.enrollments.lock().unwrap();
        enrollments.get_mut(&id).unwrap().reject(reason).unwrap();
    }

    pub fn admin_approve(&self, id: Uuid) {
        let mut enrollments = self.enrollments.lock().unwrap();
        enrollments.get_mut(&id).unwrap().approve().unwrap();
    }

    pub fn enrollment(&self, id: Uuid) -> Option<Enrollment> {
        self.enrollments.lock().unwrap().get(&id).cloned()
    }

    pub fn enrollment_count(&self) -> usize {
        self.enrollments.lock().unwrap().len()
    }

    fn issue(&self, tokens: &mut Tokens, expires_in: u64) -> TokenResponse {
        tokens.generation += 1;
        tokens.access_token = format!("access-{}", tokens.generation);
        tokens.refresh_token = format!("refresh-{}", tokens.generation);
        tokens.access_valid = true;
        TokenResponse {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let tokens = self.tokens.lock().unwrap();
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "));
        tokens.access_valid
            && !tokens.reject_all_access
            && presented == Some(tokens.access_token.as_str())
    }
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// A running mock server
pub struct MockApi {
    pub base_url: String,
    pub state: MockState,
}

impl MockApi {
    pub async fn start() -> Self {
        let state = MockState::new();
        let app = Router::new()
            .route("/auth/login", post(login))
            .route("/auth/refresh", post(refresh))
            .route("/auth/logout", post(logout))
            .route("/auth/me", get(me))
            .route("/enrollments", post(submit).get(list))
            .route("/enrollments/:id", get(fetch).delete(cancel))
            .route("/enrollments/:id/receipt", patch(resubmit))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    /// A fresh session manager with a memory store, plus that store.
    pub fn session(&self) -> (SessionManager, Arc<MemoryTokenStore>) {
        let store = Arc::new(MemoryTokenStore::default());
        let manager = self.session_with_store(store.clone());
        (manager, store)
    }

    pub fn session_with_store(&self, store: Arc<dyn TokenStore>) -> SessionManager {
        SessionManager::new(reqwest_client(), self.base_url.clone(), store)
    }

    /// A logged-in API client.
    pub async fn logged_in_client(&self) -> ApiClient {
        let (session, _) = self.session();
        session.login(&credentials()).await.unwrap();
        ApiClient::new(session)
    }
}

fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

pub fn credentials() -> LoginCredentials {
    LoginCredentials {
        email: EMAIL.to_string(),
        password: PASSWORD.to_string(),
    }
}

async fn login(State(state): State<MockState>, Json(body): Json<LoginCredentials>) -> Response {
    if body.email != EMAIL || body.password != PASSWORD {
        return error(StatusCode::UNAUTHORIZED, "Invalid credentials");
    }
    let mut tokens = state.tokens.lock().unwrap();
    let expires_in = tokens.login_expires_in;
    let response = state.issue(&mut tokens, expires_in);
    Json(response).into_response()
}

async fn refresh(State(state): State<MockState>, Json(body): Json<RefreshTokenRequest>) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let delay = state.tokens.lock().unwrap().refresh_delay;
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut tokens = state.tokens.lock().unwrap();
    if tokens.reject_refresh || body.refresh_token != tokens.refresh_token {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let expires_in = tokens.refresh_expires_in;
    let response = state.issue(&mut tokens, expires_in);
    Json(response).into_response()
}

async fn logout(State(state): State<MockState>) -> Response {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "message": "Logged out successfully" })).into_response()
}

async fn me(State(state): State<MockState>, headers: HeaderMap) -> Response {
    state.me_calls.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let now = Utc::now();
    Json(User {
        id: state.user_id,
        email: EMAIL.to_string(),
        full_name: "Test Student".to_string(),
        role: Role::Student,
        whatsapp_number: None,
        is_approved: true,
        is_blocked: false,
        email_verified: true,
        created_at: now,
        updated_at: now,
    })
    .into_response()
}

async fn read_receipt(mut multipart: Multipart) -> Result<(Option<String>, String), Response> {
    let mut course_id = None;
    let mut receipt = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| error(StatusCode::BAD_REQUEST, "Malformed multipart body"))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("course_id") => course_id = field.text().await.ok(),
            Some("receipt") => {
                let name = field.file_name().unwrap_or("receipt").to_string();
                let _ = field.bytes().await;
                receipt = Some(format!("receipts/{}", name));
            }
            _ => {}
        }
    }
    let receipt = receipt.ok_or_else(|| error(StatusCode::BAD_REQUEST, "receipt is required"))?;
    Ok((course_id, receipt))
}

async fn submit(State(state): State<MockState>, headers: HeaderMap, multipart: Multipart) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    state.upload_calls.fetch_add(1, Ordering::SeqCst);

    let (course_id, receipt) = match read_receipt(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };
    let Some(course_id) = course_id.and_then(|c| c.parse::<Uuid>().ok()) else {
        return error(StatusCode::BAD_REQUEST, "course_id is required");
    };

    let enrollment = Enrollment::new(state.user_id, course_id, receipt);
    state
        .enrollments
        .lock()
        .unwrap()
        .insert(enrollment.id, enrollment.clone());
    (StatusCode::CREATED, Json(enrollment)).into_response()
}

async fn list(State(state): State<MockState>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let all: Vec<Enrollment> = state.enrollments.lock().unwrap().values().cloned().collect();
    Json(all).into_response()
}

async fn fetch(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    match state.enrollment(id) {
        Some(enrollment) => Json(enrollment).into_response(),
        None => error(StatusCode::NOT_FOUND, "Enrollment not found"),
    }
}

async fn resubmit(
    State(state): State<MockState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    state.upload_calls.fetch_add(1, Ordering::SeqCst);

    let (_, receipt) = match read_receipt(multipart).await {
        Ok(parts) => parts,
        Err(response) => return response,
    };

    let mut enrollments = state.enrollments.lock().unwrap();
    let Some(enrollment) = enrollments.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Enrollment not found");
    };
    match enrollment.resubmit_receipt(receipt) {
        Ok(()) => Json(enrollment.clone()).into_response(),
        Err(e) => error(StatusCode::CONFLICT, &e.to_string()),
    }
}

async fn cancel(State(state): State<MockState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Unauthorized");
    }
    let mut enrollments = state.enrollments.lock().unwrap();
    let Some(enrollment) = enrollments.get_mut(&id) else {
        return error(StatusCode::NOT_FOUND, "Enrollment not found");
    };
    match enrollment.cancel() {
        Ok(()) => Json(enrollment.clone()).into_response(),
        Err(e) => error(StatusCode::CONFLICT, &e.to_string()),
    }
}
