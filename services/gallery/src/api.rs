use crate::auth::{self, Authenticator, CookieSettings, LOGIN_PATH};
use crate::catalog::{Catalog, CreateEvent, EventDetail, EventSummary, PhotoPreview, PublicGallery};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{Photo, Session, UploadFile};
use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Redirect},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

/// Where a successful sign-in lands
pub const EVENTS_PATH: &str = "/admin/events";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<Catalog>,
    pub auth: Arc<Authenticator>,
    pub cookies: CookieSettings,
}

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Confirmation carried by destructive form posts
#[derive(Debug, Deserialize)]
pub struct ConfirmForm {
    #[serde(default)]
    pub confirm: bool,
}

/// Login view
#[derive(Debug, Serialize)]
pub struct LoginView {
    pub signed_in: bool,
    pub action: &'static str,
    pub fields: [&'static str; 2],
}

/// Event directory
#[derive(Debug, Serialize)]
pub struct EventListResponse {
    pub events: Vec<EventSummary>,
}

/// Result of an upload batch
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub uploaded: Vec<Photo>,
}

/// Settings view
#[derive(Debug, Serialize)]
pub struct SettingsView {
    pub admin_id: i64,
    pub email: String,
    pub session_expires_at: DateTime<Utc>,
    pub gallery_base_url: String,
}

/// Create the HTTP router: public gallery plus the gated admin console
pub fn create_router(state: AppState, config: &ApiConfig, max_upload_bytes: usize) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    let admin = Router::new()
        .route("/admin/events", get(list_events).post(create_event))
        .route("/admin/events/new", get(new_event_form))
        .route("/admin/events/:id", get(event_detail))
        .route("/admin/events/:id/delete", post(delete_event))
        .route("/admin/events/:id/photos", post(upload_photos))
        .route(
            "/admin/events/:id/photos/:photo_id/delete",
            post(delete_photo),
        )
        .route("/admin/events/:id/qr.png", get(download_qr))
        .route("/admin/settings", get(settings))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    Router::new()
        .route("/", get(landing))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/event/:slug", get(public_gallery))
        .route("/event/:slug/photos/:photo_id", get(public_preview))
        .route("/event/:slug/photos/:photo_id/download", get(public_download))
        .route(LOGIN_PATH, get(login_view).post(sign_in))
        .route("/admin/logout", post(sign_out))
        .merge(admin)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn landing() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "gallery-service",
        "links": {
            "admin": LOGIN_PATH,
            "gallery": "/event/{slug}"
        }
    }))
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "gallery-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.catalog.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

async fn login_view(State(state): State<AppState>, jar: CookieJar) -> Result<Json<LoginView>> {
    let signed_in = match state.cookies.token(&jar) {
        Some(token) => state.auth.current_session(token).await?.is_some(),
        None => false,
    };

    Ok(Json(LoginView {
        signed_in,
        action: LOGIN_PATH,
        fields: ["email", "password"],
    }))
}

#[instrument(skip_all, fields(email = %form.email))]
async fn sign_in(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<(CookieJar, Redirect)> {
    let session = state.auth.sign_in(&form.email, &form.password).await?;
    let jar = jar.add(state.cookies.session_cookie(session.token));
    Ok((jar, Redirect::to(EVENTS_PATH)))
}

async fn sign_out(State(state): State<AppState>, jar: CookieJar) -> Result<(CookieJar, Redirect)> {
    if let Some(token) = state.cookies.token(&jar) {
        state.auth.sign_out(token).await?;
    }
    let jar = jar.remove(state.cookies.removal_cookie());
    Ok((jar, Redirect::to(LOGIN_PATH)))
}

async fn list_events(State(state): State<AppState>) -> Result<Json<EventListResponse>> {
    let events = state.catalog.list_events().await?;
    Ok(Json(EventListResponse { events }))
}

async fn new_event_form() -> impl IntoResponse {
    Json(serde_json::json!({
        "action": EVENTS_PATH,
        "encoding": "multipart/form-data",
        "fields": [
            { "name": "name", "type": "text", "required": true },
            { "name": "event_date", "type": "date", "required": false },
            { "name": "cover", "type": "file", "accept": "image/*", "required": false }
        ]
    }))
}

#[instrument(skip_all, fields(admin_id = session.admin_id))]
async fn create_event(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    mut multipart: Multipart,
) -> Result<Redirect> {
    let mut name = String::new();
    let mut event_date = None;
    let mut cover = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed_upload)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "name" => name = field.text().await.map_err(malformed_upload)?,
            "event_date" => {
                let value = field.text().await.map_err(malformed_upload)?;
                event_date = parse_event_date(&value)?;
            }
            "cover" => {
                let file = read_file(field).await?;
                if !file.is_empty() {
                    cover = Some(file);
                }
            }
            _ => {}
        }
    }

    let event = state
        .catalog
        .create_event(CreateEvent {
            name,
            event_date,
            cover,
        })
        .await?;

    info!(event_id = event.id, email = %session.email, "Event created from admin console");
    Ok(Redirect::to(&format!("{}/{}", EVENTS_PATH, event.id)))
}

async fn event_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<EventDetail>> {
    Ok(Json(state.catalog.event_detail(id).await?))
}

#[instrument(skip_all, fields(admin_id = session.admin_id, event_id = id))]
async fn delete_event(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    Form(form): Form<ConfirmForm>,
) -> Result<Redirect> {
    require_confirmation(&form)?;
    state.catalog.delete_event(id).await?;
    Ok(Redirect::to(EVENTS_PATH))
}

#[instrument(skip_all, fields(admin_id = session.admin_id, event_id = id))]
async fn upload_photos(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let mut folder = String::new();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(malformed_upload)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "folder" => folder = field.text().await.map_err(malformed_upload)?,
            "files" | "file" => files.push(read_file(field).await?),
            _ => {}
        }
    }

    let uploaded = state.catalog.upload_photos(id, &folder, files).await?;
    Ok(Json(UploadResponse { uploaded }))
}

#[instrument(skip_all, fields(admin_id = session.admin_id, event_id = id, photo_id = photo_id))]
async fn delete_photo(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Path((id, photo_id)): Path<(i64, i64)>,
    Form(form): Form<ConfirmForm>,
) -> Result<Redirect> {
    require_confirmation(&form)?;
    state.catalog.delete_photo(id, photo_id).await?;
    Ok(Redirect::to(&format!("{}/{}", EVENTS_PATH, id)))
}

async fn download_qr(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let (filename, png) = state.catalog.qr_code(id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        png,
    ))
}

async fn settings(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Json<SettingsView> {
    Json(SettingsView {
        admin_id: session.admin_id,
        email: session.email,
        session_expires_at: session.expires_at,
        gallery_base_url: state.catalog.base_url().to_string(),
    })
}

async fn public_gallery(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PublicGallery>> {
    Ok(Json(state.catalog.public_gallery(&slug).await?))
}

async fn public_preview(
    State(state): State<AppState>,
    Path((slug, photo_id)): Path<(String, i64)>,
) -> Result<Json<PhotoPreview>> {
    Ok(Json(state.catalog.public_preview(&slug, photo_id).await?))
}

async fn public_download(
    State(state): State<AppState>,
    Path((slug, photo_id)): Path<(String, i64)>,
) -> Result<Redirect> {
    let url = state.catalog.public_download(&slug, photo_id).await?;
    Ok(Redirect::to(&url))
}

fn require_confirmation(form: &ConfirmForm) -> Result<()> {
    if form.confirm {
        Ok(())
    } else {
        Err(Error::validation("Deletion must be confirmed."))
    }
}

/// Empty input means no date
fn parse_event_date(value: &str) -> Result<Option<NaiveDate>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| Error::validation(format!("Invalid event date '{}', expected YYYY-MM-DD", value)))
}

async fn read_file(field: axum::extract::multipart::Field<'_>) -> Result<UploadFile> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let content_type = field.content_type().map(str::to_string);
    let data = field.bytes().await.map_err(malformed_upload)?;

    Ok(UploadFile {
        filename,
        content_type,
        data,
    })
}

fn malformed_upload(e: axum::extract::multipart::MultipartError) -> Error {
    Error::validation(format!("Malformed form data: {}", e))
}

/// Serve the router until `shutdown` is cancelled
pub async fn start_api_server(
    state: AppState,
    config: &ApiConfig,
    max_upload_bytes: usize,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let router = create_router(state, config, max_upload_bytes);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting gallery HTTP server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_date() {
        assert_eq!(parse_event_date("").unwrap(), None);
        assert_eq!(parse_event_date("  ").unwrap(), None);
        assert_eq!(
            parse_event_date("2024-06-01").unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 1)
        );
        assert!(matches!(
            parse_event_date("01/06/2024"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_require_confirmation() {
        assert!(require_confirmation(&ConfirmForm { confirm: true }).is_ok());
        let err = require_confirmation(&ConfirmForm { confirm: false }).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
