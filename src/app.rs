use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::config::ServerConfig;
use crate::dashboard::Dashboard;
use crate::engine::{Outputs, ReactiveEngine};
use crate::error::DashboardError;
use crate::graph::{self, GraphOptions};
use crate::input::{InputSpec, InputValue};

pub const SESSION_COOKIE: &str = "session";

/// Bounds on the sessions kept in memory.
#[derive(Clone, Copy, Debug)]
pub struct SessionLimits {
    pub max_sessions: usize,
    pub idle: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        SessionLimits {
            max_sessions: 1000,
            idle: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&ServerConfig> for SessionLimits {
    fn from(config: &ServerConfig) -> Self {
        SessionLimits {
            max_sessions: config.max_sessions.max(1),
            idle: Duration::from_secs(config.session_idle_secs),
        }
    }
}

type SharedEngine = Arc<Mutex<ReactiveEngine>>;

struct Session {
    engine: SharedEngine,
    last_seen: Instant,
}

/// Shared server state: the startup dashboard plus one engine per browser
/// session.
///
/// The session map lock is only held to look up or insert an engine. Each
/// engine has its own lock, held for the duration of one event.
pub struct AppState {
    dashboard: Dashboard,
    sessions: Mutex<HashMap<Uuid, Session>>,
    limits: SessionLimits,
    graph: GraphOptions,
}

impl AppState {
    pub fn new(dashboard: Dashboard) -> Self {
        Self::with_limits(dashboard, SessionLimits::default())
    }

    pub fn with_limits(dashboard: Dashboard, limits: SessionLimits) -> Self {
        AppState {
            dashboard,
            sessions: Mutex::new(HashMap::new()),
            limits,
            graph: GraphOptions::default(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions().len()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the session cookie to an engine.
    ///
    /// Only ids this server issued and still holds are honoured; anything
    /// else gets a fresh id and a new cookie.
    fn session(&self, jar: CookieJar) -> (CookieJar, Uuid, SharedEngine) {
        let now = Instant::now();
        let mut sessions = self.sessions();

        let idle = self.limits.idle;
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_seen) < idle);
        if sessions.len() < before {
            debug!("Dropped {} idle session(s)", before - sessions.len());
        }

        let known = jar
            .get(SESSION_COOKIE)
            .and_then(|c| Uuid::parse_str(c.value()).ok())
            .filter(|id| sessions.contains_key(id));
        if let Some(id) = known {
            if let Some(session) = sessions.get_mut(&id) {
                session.last_seen = now;
                return (jar, id, session.engine.clone());
            }
        }

        while sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_seen)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                    debug!("Dropped least recently used session {}", id);
                }
                None => break,
            }
        }

        let id = Uuid::new_v4();
        debug!("Starting session {}", id);
        let engine = Arc::new(Mutex::new(self.dashboard.session()));
        sessions.insert(
            id,
            Session {
                engine: engine.clone(),
                last_seen: now,
            },
        );

        let mut cookie = Cookie::new(SESSION_COOKIE, id.to_string());
        cookie.set_path("/");
        cookie.set_http_only(true);
        (jar.add(cookie), id, engine)
    }
}

/// Locks one session's engine, initializing it on first use.
fn lock_engine(engine: &Mutex<ReactiveEngine>) -> MutexGuard<'_, ReactiveEngine> {
    // Render panics are caught inside the engine, so a poisoned lock still
    // guards a consistent engine.
    let mut guard = engine.lock().unwrap_or_else(PoisonError::into_inner);
    if !guard.is_initialized() {
        guard.initialize();
    }
    guard
}

/// Runs rendering and drawing off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[derive(Deserialize)]
struct InputEvent {
    name: String,
    value: InputValue,
}

#[derive(Deserialize)]
struct BatchEvent {
    changes: Vec<InputEvent>,
}

#[derive(Serialize)]
struct InputState<'a> {
    #[serde(flatten)]
    spec: &'a InputSpec,
    value: Option<&'a InputValue>,
}

/// Error body sent for a rejected request.
enum ApiError {
    Dashboard(DashboardError),
    /// The request body was not a well-formed event.
    BadRequest(String),
    Internal(String),
}

impl From<DashboardError> for ApiError {
    fn from(e: DashboardError) -> Self {
        ApiError::Dashboard(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Dashboard(
                e @ (DashboardError::NoSuchInput(_) | DashboardError::InvalidInputValue { .. }),
            ) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Dashboard(e @ DashboardError::UnknownView(_)) => {
                (StatusCode::NOT_FOUND, e.to_string())
            }
            ApiError::Dashboard(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => {
                warn!("Request failed: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (
            status,
            Json(serde_json::json!({
                "status": "error",
                "message": message,
            })),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>, static_dir: &FsPath) -> Router {
    Router::new()
        .route("/", get(serve_dashboard))
        .route("/api/dashboard", get(get_dashboard))
        .route("/api/input", post(post_input))
        .route("/api/inputs", post(post_inputs))
        .route("/api/figure/:view", get(get_figure))
        .nest_service("/static", ServeDir::new(static_dir))
        .with_state(state)
}

pub async fn run(config: &ServerConfig, dashboard: Dashboard) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState::with_limits(dashboard, SessionLimits::from(config)));
    let app = router(state, &config.static_dir);

    let listener = TcpListener::bind(config.addr()).await?;
    info!("Listening on http://{}", config.addr());
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_dashboard() -> Html<&'static str> {
    Html(include_str!("./static/dashboard.html"))
}

async fn get_dashboard(State(state): State<Arc<AppState>>, jar: CookieJar) -> Response {
    let (jar, _, engine) = state.session(jar);
    let graph = state.graph.clone();
    let body = blocking(move || {
        let (inputs, views, outputs) = {
            let engine = lock_engine(&engine);
            let inputs: Vec<InputState> = engine
                .inputs()
                .specs()
                .iter()
                .map(|spec| InputState {
                    spec,
                    value: engine.inputs().value(&spec.name),
                })
                .collect();
            let views: Vec<&str> = engine
                .registry()
                .views()
                .iter()
                .map(|v| v.name.as_str())
                .collect();
            (
                serde_json::json!(inputs),
                serde_json::json!(views),
                engine.outputs().clone(),
            )
        };
        serde_json::json!({
            "inputs": inputs,
            "views": views,
            "outputs": graph::present_all(&outputs, &graph),
        })
    })
    .await;
    match body {
        Ok(body) => (jar, Json(body)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

async fn post_input(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    event: Result<Json<InputEvent>, JsonRejection>,
) -> Response {
    let (jar, id, engine) = state.session(jar);
    let Json(event) = match event {
        Ok(event) => event,
        Err(rejection) => return (jar, ApiError::from(rejection)).into_response(),
    };
    info!("Session {}: {} = {}", id, event.name, event.value);
    let response = apply(&state, engine, vec![(event.name, event.value)]).await;
    (jar, response).into_response()
}

async fn post_inputs(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    batch: Result<Json<BatchEvent>, JsonRejection>,
) -> Response {
    let (jar, id, engine) = state.session(jar);
    let Json(batch) = match batch {
        Ok(batch) => batch,
        Err(rejection) => return (jar, ApiError::from(rejection)).into_response(),
    };
    info!("Session {}: batch of {} change(s)", id, batch.changes.len());
    let changes = batch.changes.into_iter().map(|e| (e.name, e.value)).collect();
    let response = apply(&state, engine, changes).await;
    (jar, response).into_response()
}

/// Applies one event to a session and draws the recomputed views.
async fn apply(
    state: &AppState,
    engine: SharedEngine,
    changes: Vec<(String, InputValue)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let graph = state.graph.clone();
    blocking(move || {
        let updated: Outputs = lock_engine(&engine).apply_batch(changes)?;
        Ok(Json(serde_json::json!({
            "status": "ok",
            "updated": graph::present_all(&updated, &graph),
        })))
    })
    .await?
}

/// The session's current artifact for `view`, undrawn.
async fn get_figure(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Path(view): Path<String>,
) -> Response {
    let (jar, _, engine) = state.session(jar);
    let artifact = blocking(move || {
        let engine = lock_engine(&engine);
        engine.registry().get(&view)?;
        Ok::<_, ApiError>(engine.output(&view).cloned().unwrap_or(Artifact::Empty))
    })
    .await
    .and_then(|result| result);
    match artifact {
        Ok(artifact) => (jar, Json(artifact)).into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::{CATEGORY_DROPDOWN, INSTALLS_GRAPHIC, RATING_GRAPHIC};
    use crate::dataset::Dataset;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use serde_json::Value;
    use tower::ServiceExt;

    fn dashboard() -> Dashboard {
        let dataset = Dataset::load(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/fixtures/playstore-sample.csv"
        ))
        .unwrap();
        Dashboard::build(Arc::new(dataset)).unwrap()
    }

    fn state() -> Arc<AppState> {
        Arc::new(AppState::new(dashboard()))
    }

    fn app(state: &Arc<AppState>) -> Router {
        router(state.clone(), FsPath::new("static"))
    }

    fn post(uri: &str, cookie: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, cookie))
            .body(body.into())
            .unwrap()
    }

    fn get(uri: &str, cookie: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, cookie))
            .body(Body::empty())
            .unwrap()
    }

    /// Session id from a response's `Set-Cookie`, if one was issued.
    fn issued(response: &Response) -> Option<String> {
        let cookie = response.headers().get(header::SET_COOKIE)?.to_str().ok()?;
        let value = cookie.strip_prefix("session=")?;
        Some(value.split(';').next().unwrap_or(value).to_string())
    }

    async fn json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn open_session(state: &Arc<AppState>) -> String {
        let response = app(state)
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        issued(&response).unwrap()
    }

    #[tokio::test]
    async fn dashboard_issues_session_and_renders_every_view() {
        let state = state();
        let response = app(&state)
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let id = issued(&response).unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let body = json(response).await;
        assert_eq!(body["views"].as_array().unwrap().len(), 6);
        assert_eq!(body["inputs"].as_array().unwrap().len(), 4);
        assert_eq!(body["outputs"].as_object().unwrap().len(), 6);
        assert_eq!(body["outputs"]["data-table"]["kind"], "table");
        assert_eq!(body["outputs"]["top-categories"]["kind"], "svg");
        // No app targets Android 1.
        assert_eq!(body["outputs"]["version-graphic"]["kind"], "error");
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn known_session_keeps_its_cookie() {
        let state = state();
        let id = open_session(&state).await;
        let response = app(&state).oneshot(get("/api/dashboard", &id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(issued(&response).is_none());
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn unknown_cookie_values_get_a_fresh_session() {
        let state = state();
        let forged = Uuid::new_v4().to_string();
        for cookie in ["alice", forged.as_str()] {
            let response = app(&state).oneshot(get("/api/dashboard", cookie)).await.unwrap();
            let id = issued(&response).unwrap();
            assert_ne!(id, cookie);
        }
        let ids: Vec<Uuid> = state.sessions().keys().copied().collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.iter().any(|id| id.to_string() == forged));
    }

    #[tokio::test]
    async fn session_count_is_capped() {
        let limits = SessionLimits {
            max_sessions: 2,
            idle: Duration::from_secs(60),
        };
        let state = Arc::new(AppState::with_limits(dashboard(), limits));
        let first = open_session(&state).await;
        open_session(&state).await;
        open_session(&state).await;
        assert_eq!(state.session_count(), 2);

        // The least recently used session was dropped.
        let response = app(&state).oneshot(get("/api/dashboard", &first)).await.unwrap();
        assert!(issued(&response).is_some());
    }

    #[tokio::test]
    async fn idle_sessions_are_dropped() {
        let limits = SessionLimits {
            max_sessions: 10,
            idle: Duration::ZERO,
        };
        let state = Arc::new(AppState::with_limits(dashboard(), limits));
        open_session(&state).await;
        open_session(&state).await;
        assert_eq!(state.session_count(), 1);
    }

    #[tokio::test]
    async fn input_change_returns_only_dependent_views() {
        let state = state();
        let id = open_session(&state).await;
        let body = serde_json::json!({ "name": CATEGORY_DROPDOWN, "value": "GAME" });
        let response = app(&state)
            .oneshot(post("/api/input", &id, body.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["status"], "ok");
        let updated = body["updated"].as_object().unwrap();
        let mut names: Vec<&str> = updated.keys().map(String::as_str).collect();
        names.sort_unstable();
        assert_eq!(names, vec![RATING_GRAPHIC, INSTALLS_GRAPHIC]);
    }

    #[tokio::test]
    async fn out_of_domain_value_is_rejected() {
        let state = state();
        let id = open_session(&state).await;
        let body = serde_json::json!({ "name": CATEGORY_DROPDOWN, "value": "FOOBAR" });
        let response = app(&state)
            .oneshot(post("/api/input", &id, body.to_string()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json(response).await;
        assert_eq!(body["status"], "error");
        assert!(body["message"].as_str().unwrap().contains("FOOBAR"));
    }

    #[tokio::test]
    async fn malformed_event_gets_json_error() {
        let state = state();
        let id = open_session(&state).await;
        for body in [
            r#"{"name":"xaxis-column","value":true}"#,
            r#"{"name":"xaxis-column","value":null}"#,
            r#"{"changes":"GAME"}"#,
            "not json",
        ] {
            let uri = if body.contains("changes") { "/api/inputs" } else { "/api/input" };
            let response = app(&state).oneshot(post(uri, &id, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", body);
            assert_eq!(json(response).await["status"], "error");
        }
    }

    #[tokio::test]
    async fn unknown_figure_is_not_found() {
        let state = state();
        let response = app(&state)
            .oneshot(Request::get("/api/figure/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["status"], "error");
    }

    #[tokio::test]
    async fn sessions_do_not_share_inputs() {
        let state = state();
        let alice = open_session(&state).await;
        let bob = open_session(&state).await;

        let batch = serde_json::json!({ "changes": [
            { "name": CATEGORY_DROPDOWN, "value": "TOOLS" },
            { "name": "version-slider", "value": 4 },
        ]});
        let response = app(&state)
            .oneshot(post("/api/inputs", &alice, batch.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // Bob still holds the default, so re-sending it changes nothing.
        let resend = serde_json::json!({ "name": CATEGORY_DROPDOWN, "value": "ART_AND_DESIGN" });
        let response = app(&state)
            .oneshot(post("/api/input", &bob, resend.to_string()))
            .await
            .unwrap();
        let body = json(response).await;
        assert!(body["updated"].as_object().unwrap().is_empty());
        assert_eq!(state.session_count(), 2);

        let response = app(&state)
            .oneshot(get("/api/figure/version-graphic", &alice))
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["kind"], "chart");
        assert_eq!(body["marks"]["type"], "bars");
    }

    #[tokio::test]
    async fn infinite_scatter_is_a_view_error() {
        use crate::dashboard::{SCATTER_GRAPHIC, X_VARIABLE, Y_VARIABLE, correlation};
        use crate::dataset::Column;
        use crate::input::{Domain, InputSurface};
        use crate::registry::ViewRegistry;

        let dataset = Dataset::new(vec![
            ("Category".to_string(), Column::categorical(["GAME", "TOOLS"])),
            ("Price".to_string(), Column::numeric([0.0, f64::INFINITY])),
        ])
        .unwrap();
        let mut inputs = InputSurface::new();
        for (name, default) in [(X_VARIABLE, "Price"), (Y_VARIABLE, "Category")] {
            inputs
                .declare(name, Domain::enumerated(["Category", "Price"]), default.into())
                .unwrap();
        }
        let mut registry = ViewRegistry::new();
        registry
            .register(SCATTER_GRAPHIC, &[X_VARIABLE, Y_VARIABLE], &inputs, correlation)
            .unwrap();
        let dashboard = Dashboard {
            dataset: Arc::new(dataset),
            registry: Arc::new(registry),
            inputs,
        };

        let state = Arc::new(AppState::new(dashboard));
        let response = app(&state)
            .oneshot(Request::get("/api/dashboard").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = json(response).await;
        assert_eq!(body["outputs"][SCATTER_GRAPHIC]["kind"], "error");
    }
}
