// 🌐 Web Server
// Public dashboard, session-gated admin area and the JSON admin API

pub mod pages;

use crate::auth::{
    authenticate, clear_session_cookie, ensure_initial_admin, session_cookie, token_from_cookie_header,
    SessionStore,
};
use crate::config::AppConfig;
use crate::dashboard::{build_rows, DashboardRow};
use crate::db::{FieldChanges, RecordStore, SqliteStore, VpsInstance};
use crate::error::RenewalError;
use crate::expiry::Clock;
use crate::forms::{describe, ServerForm};
use crate::renewal::{Renewal, RenewalEngine};
use anyhow::Result;
use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const LOGIN_PATH: &str = "/admin/login";
const DASHBOARD_PATH: &str = "/admin/dashboard";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub sessions: Arc<SessionStore>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Wire up state and seed the first admin if none exists
    pub fn bootstrap(store: SqliteStore, config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        ensure_initial_admin(&*store.connection()?, &config)?;
        let sessions = SessionStore::new(Duration::hours(config.session_ttl_hours));
        Ok(Self {
            store: Arc::new(store),
            sessions: Arc::new(sessions),
            config: Arc::new(config),
            clock,
        })
    }

    fn has_session(&self, headers: &HeaderMap) -> bool {
        session_token(headers).map_or(false, |token| self.sessions.is_valid(token, Utc::now()))
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(token_from_cookie_header)
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }
}

impl ApiResponse<()> {
    fn failure(error: String, kind: Option<&'static str>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
            kind,
        }
    }
}

fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::failure(message.into(), None))).into_response()
}

fn storage_failure(err: anyhow::Error) -> Response {
    tracing::error!(error = %format!("{:#}", err), "record store failure");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

fn renewal_status(err: &RenewalError) -> StatusCode {
    match err {
        RenewalError::InvalidDate(_) | RenewalError::UnsupportedCycle(_) | RenewalError::InvalidState { .. } => {
            StatusCode::BAD_REQUEST
        }
        RenewalError::RecordNotFound(_) => StatusCode::NOT_FOUND,
        RenewalError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============================================================================
// Session gates
// ============================================================================

async fn require_admin_page(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.has_session(request.headers()) {
        return next.run(request).await;
    }
    let path = request.uri().path();
    let target = if path == DASHBOARD_PATH {
        LOGIN_PATH.to_string()
    } else {
        format!("{}?redirect={}", LOGIN_PATH, urlencoding::encode(path))
    };
    Redirect::to(&target).into_response()
}

async fn require_admin_api(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if state.has_session(request.headers()) {
        return next.run(request).await;
    }
    api_error(StatusCode::UNAUTHORIZED, "Unauthorized")
}

// ============================================================================
// Public routes
// ============================================================================

fn current_rows(state: &AppState) -> Result<Vec<DashboardRow>> {
    let instances = state.store.list_all()?;
    Ok(build_rows(&instances, state.clock.today()))
}

/// GET / - public dashboard
async fn index(State(state): State<AppState>) -> Response {
    match current_rows(&state) {
        Ok(rows) => Html(pages::index(&rows)).into_response(),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to load dashboard");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load dashboard").into_response()
        }
    }
}

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/vps-list - dashboard rows as JSON
async fn vps_list(State(state): State<AppState>) -> Response {
    match current_rows(&state) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_failure(e),
    }
}

// ============================================================================
// Login / logout
// ============================================================================

#[derive(Deserialize)]
struct LoginQuery {
    redirect: Option<String>,
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
    #[serde(default)]
    redirect: Option<String>,
}

/// Only same-site admin paths are followed after login
fn redirect_target(requested: Option<&str>) -> &str {
    match requested {
        Some(path) if path.starts_with("/admin/") && path != LOGIN_PATH => path,
        _ => DASHBOARD_PATH,
    }
}

async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoginQuery>,
) -> Response {
    if state.has_session(&headers) {
        return Redirect::to(DASHBOARD_PATH).into_response();
    }
    Html(pages::login(None, query.redirect.as_deref())).into_response()
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let verified = state
        .store
        .connection()
        .and_then(|conn| authenticate(&conn, &form.username, &form.password));

    match verified {
        Ok(true) => {}
        Ok(false) => {
            tracing::warn!(username = %form.username.trim(), "rejected admin login");
            return (
                StatusCode::UNAUTHORIZED,
                Html(pages::login(Some("Invalid username or password."), form.redirect.as_deref())),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "login lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(pages::login(Some("Login is unavailable right now."), form.redirect.as_deref())),
            )
                .into_response();
        }
    }

    let token = match state.sessions.create(Utc::now()) {
        Ok(token) => token,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to create session");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session").into_response();
        }
    };
    tracing::info!(username = %form.username.trim(), "admin logged in");

    let cookie = session_cookie(&token, state.sessions.ttl(), state.config.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Redirect::to(redirect_target(form.redirect.as_deref())),
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        state.sessions.revoke(token);
    }
    (
        [(header::SET_COOKIE, clear_session_cookie())],
        Redirect::to(LOGIN_PATH),
    )
        .into_response()
}

// ============================================================================
// Admin pages
// ============================================================================

#[derive(Deserialize, Default)]
struct FlashQuery {
    notice: Option<String>,
    error: Option<String>,
}

fn back_to_dashboard(kind: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", DASHBOARD_PATH, kind, urlencoding::encode(message)))
}

fn renewal_notice(name: &str, renewal: &Renewal) -> String {
    format!(
        "Renewed {}: {} → {}",
        name, renewal.previous_end_date, renewal.new_end_date
    )
}

/// GET /admin/dashboard
async fn admin_dashboard(State(state): State<AppState>, Query(flash): Query<FlashQuery>) -> Response {
    let instances = match state.store.list_all() {
        Ok(instances) => instances,
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to load admin dashboard");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load servers").into_response();
        }
    };
    let today = state.clock.today();
    let entries: Vec<(VpsInstance, DashboardRow)> = instances
        .into_iter()
        .map(|vps| {
            let row = DashboardRow::from_instance(&vps, today);
            (vps, row)
        })
        .collect();

    Html(pages::admin_dashboard(
        &entries,
        flash.notice.as_deref(),
        flash.error.as_deref(),
    ))
    .into_response()
}

/// POST /admin/servers
async fn create_server_form(State(state): State<AppState>, Form(form): Form<ServerForm>) -> Redirect {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => return back_to_dashboard("error", &describe(&errors)),
    };
    match state.store.insert(&new) {
        Ok(id) => {
            tracing::info!(id, name = %new.name, "server added");
            back_to_dashboard("notice", &format!("Added {}", new.name))
        }
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "failed to add server");
            back_to_dashboard("error", "Failed to add server")
        }
    }
}

/// POST /admin/servers/:id/delete
async fn delete_server_form(State(state): State<AppState>, Path(id): Path<i64>) -> Redirect {
    match state.store.delete(id) {
        Ok(0) => back_to_dashboard("error", &format!("Server {} not found", id)),
        Ok(_) => {
            tracing::info!(id, "server deleted");
            back_to_dashboard("notice", "Server deleted")
        }
        Err(e) => {
            tracing::error!(id, error = %format!("{:#}", e), "failed to delete server");
            back_to_dashboard("error", "Failed to delete server")
        }
    }
}

/// POST /admin/servers/:id/renew
async fn renew_server_form(State(state): State<AppState>, Path(id): Path<i64>) -> Redirect {
    let outcome = RenewalEngine::new(state.store.as_ref()).renew(id);
    match outcome {
        Ok(renewal) => {
            let name = state
                .store
                .get_by_id(id)
                .ok()
                .flatten()
                .map_or_else(|| format!("server {}", id), |vps| vps.name);
            back_to_dashboard("notice", &renewal_notice(&name, &renewal))
        }
        Err(e) => {
            tracing::warn!(id, kind = e.kind(), error = %e, "renewal refused");
            back_to_dashboard("error", &e.to_string())
        }
    }
}

// ============================================================================
// Admin JSON API
// ============================================================================

/// GET /api/admin/servers
async fn api_list_servers(State(state): State<AppState>) -> Response {
    match state.store.list_all() {
        Ok(instances) => Json(ApiResponse::ok(instances)).into_response(),
        Err(e) => storage_failure(e),
    }
}

/// POST /api/admin/servers
async fn api_create_server(State(state): State<AppState>, Json(form): Json<ServerForm>) -> Response {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => return api_error(StatusCode::UNPROCESSABLE_ENTITY, describe(&errors)),
    };
    let created = state
        .store
        .insert(&new)
        .and_then(|id| state.store.get_by_id(id));
    match created {
        Ok(Some(vps)) => {
            tracing::info!(id = vps.id, name = %vps.name, "server added");
            (StatusCode::CREATED, Json(ApiResponse::ok(vps))).into_response()
        }
        Ok(None) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "Inserted server vanished"),
        Err(e) => storage_failure(e),
    }
}

/// GET /api/admin/servers/:id
async fn api_get_server(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.get_by_id(id) {
        Ok(Some(vps)) => Json(ApiResponse::ok(vps)).into_response(),
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("Server {} not found", id)),
        Err(e) => storage_failure(e),
    }
}

/// PUT /api/admin/servers/:id - replaces every editable field
async fn api_update_server(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(form): Json<ServerForm>,
) -> Response {
    let new = match form.validate() {
        Ok(new) => new,
        Err(errors) => return api_error(StatusCode::UNPROCESSABLE_ENTITY, describe(&errors)),
    };
    let updated = state
        .store
        .update(id, &FieldChanges::replace_all(&new))
        .and_then(|rows| if rows == 0 { Ok(None) } else { state.store.get_by_id(id) });
    match updated {
        Ok(Some(vps)) => {
            tracing::info!(id, "server updated");
            Json(ApiResponse::ok(vps)).into_response()
        }
        Ok(None) => api_error(StatusCode::NOT_FOUND, format!("Server {} not found", id)),
        Err(e) => storage_failure(e),
    }
}

/// DELETE /api/admin/servers/:id
async fn api_delete_server(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.store.delete(id) {
        Ok(0) => api_error(StatusCode::NOT_FOUND, format!("Server {} not found", id)),
        Ok(_) => {
            tracing::info!(id, "server deleted");
            Json(ApiResponse::ok(id)).into_response()
        }
        Err(e) => storage_failure(e),
    }
}

/// POST /api/admin/servers/:id/renew
async fn api_renew_server(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match RenewalEngine::new(state.store.as_ref()).renew(id) {
        Ok(renewal) => Json(ApiResponse::ok(renewal)).into_response(),
        Err(e) => {
            tracing::warn!(id, kind = e.kind(), error = %e, "renewal refused");
            (
                renewal_status(&e),
                Json(ApiResponse::failure(e.to_string(), Some(e.kind()))),
            )
                .into_response()
        }
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let admin_pages = Router::new()
        .route(DASHBOARD_PATH, get(admin_dashboard))
        .route("/admin/servers", post(create_server_form))
        .route("/admin/servers/:id/delete", post(delete_server_form))
        .route("/admin/servers/:id/renew", post(renew_server_form))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_page));

    let admin_api = Router::new()
        .route("/api/admin/servers", get(api_list_servers).post(api_create_server))
        .route(
            "/api/admin/servers/:id",
            get(api_get_server).put(api_update_server).delete(api_delete_server),
        )
        .route("/api/admin/servers/:id/renew", post(api_renew_server))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin_api));

    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health_check))
        .route("/api/vps-list", get(vps_list))
        .route(LOGIN_PATH, get(login_page).post(login))
        .route("/admin/logout", post(logout))
        .merge(admin_pages)
        .merge(admin_api)
        .nest_service("/static", ServeDir::new("web"))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
