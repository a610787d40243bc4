use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::{Path, Request, State},
    http::{HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

use weighin_core::models::{ChartPoint, Measurement, bmi, format_date, parse_iso_date};
use weighin_core::session::{EditOutcome, Session, SessionError, parse_weight};
use weighin_core::store::MeasurementStore;

use crate::pages::{Notice, render_edit, render_home};

const BODY_LIMIT: usize = 64 * 1024;

pub type SharedSession = Session<Box<dyn MeasurementStore>>;

#[derive(Clone)]
struct AppState {
    session: Arc<Mutex<SharedSession>>,
}

// --- Request / Response types ---

#[derive(Deserialize)]
struct LogForm {
    #[serde(default)]
    weight: String,
}

#[derive(Deserialize)]
struct EditForm {
    date: String,
    weight: String,
}

#[derive(Deserialize)]
struct DeleteForm {
    date: String,
}

#[derive(Deserialize)]
struct LogRequest {
    weight: String,
}

#[derive(Deserialize)]
struct UpdateRequest {
    weight: f64,
}

#[derive(Serialize)]
struct ReloadResponse {
    rows: usize,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unavailable(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Parse { .. } => Self::BadRequest(err.to_string()),
            SessionError::StoreConnection { .. } => {
                warn!("{err:#}");
                Self::Unavailable("Measurement store is unavailable".to_string())
            }
            SessionError::StoreWrite { ref date, .. } => {
                let msg = format!("Failed to save the weight for {date}; nothing was changed");
                warn!("{err:#}");
                Self::Unavailable(msg)
            }
        }
    }
}

/// User-facing message for a failed interaction on the HTML pages.
fn notice_for(err: &SessionError) -> Notice {
    match err {
        SessionError::Parse { .. } => {
            Notice::Error("Invalid input. Please enter a numeric value.".to_string())
        }
        SessionError::StoreConnection { .. } => {
            Notice::Error("Failed to load data from the measurement store!".to_string())
        }
        SessionError::StoreWrite { date, .. } => Notice::Error(format!(
            "Could not save the weight for {date}. Nothing was changed."
        )),
    }
}

// --- Middleware ---

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'; style-src 'unsafe-inline'; form-action 'self'"),
    );
    response
}

/// Run `f` against the session on the blocking pool; store calls may do
/// file or network I/O.
async fn with_session<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut SharedSession) -> T + Send + 'static,
    T: Send + 'static,
{
    let session = Arc::clone(&state.session);
    let out = tokio::task::spawn_blocking(move || {
        let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    })
    .await
    .context("session task panicked")?;
    Ok(out)
}

/// Points plus a notice when the first load of the session fell back to
/// an empty series.
fn load_view(session: &mut SharedSession, notices: &mut Vec<Notice>) -> Vec<ChartPoint> {
    if let Err(e) = session.ensure_loaded() {
        notices.push(notice_for(&e));
    }
    session.chart_series()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

// --- HTML handlers ---

async fn home(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let html = with_session(&state, |session| {
        let mut notices = Vec::new();
        let points = load_view(session, &mut notices);
        render_home(&points, today(), &notices)
    })
    .await?;
    Ok(Html(html))
}

async fn submit_today(
    State(state): State<AppState>,
    Form(form): Form<LogForm>,
) -> Result<Html<String>, ApiError> {
    let html = with_session(&state, move |session| {
        let mut notices = Vec::new();
        let _ = load_view(session, &mut notices);
        match session.record_today(&form.weight) {
            Ok(Some(_)) => notices.push(Notice::Success("New weight data saved!".to_string())),
            Ok(None) => {}
            Err(e) => notices.push(notice_for(&e)),
        }
        render_home(&session.chart_series(), today(), &notices)
    })
    .await?;
    Ok(Html(html))
}

async fn edit_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let html = with_session(&state, |session| {
        let mut notices = Vec::new();
        let points = load_view(session, &mut notices);
        render_edit(&points, &notices)
    })
    .await?;
    Ok(Html(html))
}

async fn submit_edit(
    State(state): State<AppState>,
    Form(form): Form<EditForm>,
) -> Result<Html<String>, ApiError> {
    let html = with_session(&state, move |session| {
        let mut notices = Vec::new();
        let _ = load_view(session, &mut notices);
        let parsed = parse_iso_date(&form.date)
            .map_err(|e| Notice::Error(e.to_string()))
            .and_then(|d| {
                parse_weight(&form.weight)
                    .map(|w| Measurement::new(d, w))
                    .map_err(|e| notice_for(&e))
            });
        match parsed.map(|m| (m.date, session.edit(m))) {
            Ok((_, Ok(EditOutcome::Applied))) => {
                notices.push(Notice::Success("Changes saved!".to_string()));
            }
            Ok((date, Ok(EditOutcome::Missing))) => notices.push(Notice::Info(format!(
                "No weight entry for {}; nothing was changed.",
                format_date(date)
            ))),
            Ok((_, Err(e))) => notices.push(notice_for(&e)),
            Err(notice) => notices.push(notice),
        }
        render_edit(&session.chart_series(), &notices)
    })
    .await?;
    Ok(Html(html))
}

async fn submit_delete(
    State(state): State<AppState>,
    Form(form): Form<DeleteForm>,
) -> Result<Html<String>, ApiError> {
    let html = with_session(&state, move |session| {
        let mut notices = Vec::new();
        let _ = load_view(session, &mut notices);
        match parse_iso_date(&form.date) {
            Ok(date) => match session.delete(date) {
                Ok(EditOutcome::Applied) => notices.push(Notice::Success(format!(
                    "Deleted weight entry for {}.",
                    format_date(date)
                ))),
                Ok(EditOutcome::Missing) => notices.push(Notice::Info(format!(
                    "No weight entry for {}; nothing was changed.",
                    format_date(date)
                ))),
                Err(e) => notices.push(notice_for(&e)),
            },
            Err(e) => notices.push(Notice::Error(e.to_string())),
        }
        render_edit(&session.chart_series(), &notices)
    })
    .await?;
    Ok(Html(html))
}

// --- JSON handlers ---

async fn list_measurements(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChartPoint>>, ApiError> {
    let points = with_session(&state, |session| {
        session.ensure_loaded()?;
        Ok::<_, SessionError>(session.chart_series())
    })
    .await??;
    Ok(Json(points))
}

async fn log_today(
    State(state): State<AppState>,
    Json(req): Json<LogRequest>,
) -> Result<Response, ApiError> {
    let result = with_session(&state, move |session| {
        let height = session.height_m();
        session.record_today(&req.weight).map(|m| {
            m.map(|m| ChartPoint {
                date: m.date,
                weight: m.weight,
                bmi: bmi(m.weight, height),
            })
        })
    })
    .await??;

    Ok(match result {
        Some(point) => (StatusCode::CREATED, Json(point)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn update_measurement(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
    Json(req): Json<UpdateRequest>,
) -> Result<Json<ChartPoint>, ApiError> {
    let date = parse_iso_date(&date_str)
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))?;
    if !req.weight.is_finite() || req.weight <= 0.0 {
        return Err(ApiError::BadRequest(
            "weight must be greater than 0".to_string(),
        ));
    }

    let (outcome, height) = with_session(&state, move |session| {
        let height = session.height_m();
        session
            .edit(Measurement::new(date, req.weight))
            .map(|o| (o, height))
    })
    .await??;

    match outcome {
        EditOutcome::Applied => Ok(Json(ChartPoint {
            date,
            weight: req.weight,
            bmi: bmi(req.weight, height),
        })),
        EditOutcome::Missing => Err(ApiError::NotFound(format!(
            "No weight entry for {date_str}"
        ))),
    }
}

async fn delete_measurement(
    State(state): State<AppState>,
    Path(date_str): Path<String>,
) -> Result<StatusCode, ApiError> {
    let date = parse_iso_date(&date_str)
        .map_err(|_| ApiError::BadRequest(format!("Invalid date '{date_str}'. Use YYYY-MM-DD")))?;

    match with_session(&state, move |session| session.delete(date)).await?? {
        EditOutcome::Applied => Ok(StatusCode::NO_CONTENT),
        EditOutcome::Missing => Err(ApiError::NotFound(format!(
            "No weight entry for {date_str}"
        ))),
    }
}

async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let rows = with_session(&state, |session| {
        session.reload()?;
        Ok::<_, SessionError>(session.series().len())
    })
    .await??;
    Ok(Json(ReloadResponse { rows }))
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home).post(submit_today))
        .route("/edit", get(edit_page).post(submit_edit))
        .route("/delete", post(submit_delete))
        .route("/api/measurements", get(list_measurements))
        .route("/api/measurements/today", post(log_today))
        .route(
            "/api/measurements/{date}",
            put(update_measurement).delete(delete_measurement),
        )
        .route("/api/reload", post(reload))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .with_state(state)
}

// --- Server startup ---

/// Seed the store on the runtime's blocking pool before serving. Called from
/// outside the runtime. A store that cannot be initialized is logged and
/// still served, so the page shows the empty view.
pub fn initialize_store(
    rt: &tokio::runtime::Handle,
    store: Box<dyn MeasurementStore>,
) -> anyhow::Result<Box<dyn MeasurementStore>> {
    rt.block_on(async move {
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.initialize() {
                warn!("could not initialize {}: {e:#}", store.describe());
            }
            store
        })
        .await
    })
    .context("store initialization task panicked")
}

pub async fn start_server(session: SharedSession, port: u16, bind: &str) -> anyhow::Result<()> {
    let store = session.store().describe();
    let state = AppState {
        session: Arc::new(Mutex::new(session)),
    };
    let app = build_router(state);

    if bind != "127.0.0.1" && bind != "localhost" {
        eprintln!(
            "Warning: Listening on {bind}. Anyone who can reach this address can read and change your data."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("Failed to bind {bind}:{port}"))?;
    info!(%store, "serving measurements");
    eprintln!("Listening on http://{bind}:{port}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use weighin_core::db::Database;
    use weighin_core::models::{DEFAULT_HEIGHT_M, seed_measurements};
    use weighin_core::store::SqliteStore;

    struct Unreachable;

    impl MeasurementStore for Unreachable {
        fn initialize(&self) -> anyhow::Result<usize> {
            anyhow::bail!("offline")
        }
        fn load_all(&self) -> anyhow::Result<Vec<Measurement>> {
            anyhow::bail!("offline")
        }
        fn upsert(&self, _: &Measurement) -> anyhow::Result<()> {
            anyhow::bail!("offline")
        }
        fn update(&self, _: &Measurement) -> anyhow::Result<bool> {
            anyhow::bail!("offline")
        }
        fn delete(&self, _: NaiveDate) -> anyhow::Result<bool> {
            anyhow::bail!("offline")
        }
        fn describe(&self) -> String {
            "unreachable".to_string()
        }
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn initialize_store_seeds_from_outside_the_runtime() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let store: Box<dyn MeasurementStore> = Box::new(SqliteStore::new(dir.path().join("w.db")));

        let store = initialize_store(rt.handle(), store).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 11);

        let app = build_router(AppState {
            session: Arc::new(Mutex::new(Session::new(store, DEFAULT_HEIGHT_M))),
        });
        let response = rt
            .block_on(
                app.oneshot(
                    axum::http::Request::get("/api/measurements")
                        .body(Body::empty())
                        .unwrap(),
                ),
            )
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn initialize_store_keeps_unreachable_store() {
        let rt = runtime();
        let store = initialize_store(rt.handle(), Box::new(Unreachable)).unwrap();
        assert_eq!(store.describe(), "unreachable");
    }

    fn seeded_app() -> (tempfile::TempDir, Router) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("w.db");
        Database::open(&path)
            .unwrap()
            .seed_if_empty(&seed_measurements())
            .unwrap();
        let store: Box<dyn MeasurementStore> = Box::new(SqliteStore::new(path));
        let state = AppState {
            session: Arc::new(Mutex::new(Session::new(store, DEFAULT_HEIGHT_M))),
        };
        (dir, build_router(state))
    }

    fn offline_app() -> Router {
        let store: Box<dyn MeasurementStore> = Box::new(Unreachable);
        build_router(AppState {
            session: Arc::new(Mutex::new(Session::new(store, DEFAULT_HEIGHT_M))),
        })
    }

    async fn body_string(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn form_post(uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::post(uri)
            .header("content-type", "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn home_renders_table_and_charts() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("Your Weight &amp; BMI Data"));
        assert_eq!(html.matches("<svg").count(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn security_headers_present() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(
            response.headers().get("x-content-type-options").unwrap(),
            "nosniff"
        );
        assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn form_submit_with_text_shows_error_and_keeps_data() {
        let (_dir, app) = seeded_app();
        let response = app
            .clone()
            .oneshot(form_post("/", "weight=abc"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("Invalid input. Please enter a numeric value."));

        let response = app
            .oneshot(
                axum::http::Request::get("/api/measurements")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 11);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn form_submit_saves_today() {
        let (_dir, app) = seeded_app();
        let response = app.oneshot(form_post("/", "weight=70.5")).await.unwrap();

        let html = body_string(response).await;
        assert!(html.contains("New weight data saved!"));
        assert!(html.contains(&format!("<td>{}</td>", format_date(today()))));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blank_form_submit_changes_nothing() {
        let (_dir, app) = seeded_app();
        let response = app.oneshot(form_post("/", "weight=")).await.unwrap();

        let html = body_string(response).await;
        assert!(!html.contains("New weight data saved!"));
        assert!(!html.contains("class=\"error\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn api_log_today_returns_bmi() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/measurements/today",
                r#"{"weight":"91"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["date"], format_date(today()));
        let bmi = json["bmi"].as_f64().unwrap();
        assert!((bmi - 91.0 / (1.82 * 1.82)).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn api_log_today_rejects_text() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/measurements/today",
                r#"{"weight":"heavy"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn api_update_and_delete() {
        let (_dir, app) = seeded_app();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/measurements/2024-11-06",
                r#"{"weight":117.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/api/measurements/2030-01-01",
                r#"{"weight":117.0}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(
                axum::http::Request::delete("/api/measurements/2024-11-06")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                axum::http::Request::delete("/api/measurements/not-a-date")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn edit_form_updates_row() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(form_post("/edit", "date=2024-12-25&weight=107.1"))
            .await
            .unwrap();

        let html = body_string(response).await;
        assert!(html.contains("Changes saved!"));
        assert!(html.contains("value=\"107.1\""));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_form_removes_row() {
        let (_dir, app) = seeded_app();
        let response = app
            .oneshot(form_post("/delete", "date=2024-12-25"))
            .await
            .unwrap();

        let html = body_string(response).await;
        assert!(html.contains("Deleted weight entry for 2024-12-25."));
        assert!(!html.contains("<td>2024-12-25</td>"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_store_degrades_to_empty_page() {
        let app = offline_app();
        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_string(response).await;
        assert!(html.contains("Failed to load data from the measurement store!"));
        assert!(html.contains("No weight data available."));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_store_reload_returns_503() {
        let app = offline_app();
        let response = app
            .oneshot(
                axum::http::Request::post("/api/reload")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_write_is_rolled_back_and_reported() {
        let app = offline_app();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/measurements/today",
                r#"{"weight":"80"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("nothing was changed"));
    }

    #[tokio::test]
    async fn internal_error_does_not_leak_details() {
        let error = ApiError::Internal(anyhow::anyhow!("secret path /home/user/weight_tracker.db"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn body_size_limit_rejects_oversized() {
        let app = offline_app();
        let big = "a".repeat(BODY_LIMIT + 1);
        let response = app
            .oneshot(json_request("POST", "/api/measurements/today", &big))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
