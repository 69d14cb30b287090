//! HTTP control panel: start, pause/resume, stop and observe validation runs
//!
//! Every handler is a thin adapter over [`ValidationRunner`]; the run itself
//! executes on a background task and handlers only read snapshots.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tabwalk::{
    escape_html, DriverFactory, RunReport, RunRequest, RunStatus, TabwalkError, ValidationRunner,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{CliError, CliResult};
use crate::logging::tail_lines;

/// Lines returned by `/logs` when none are requested
pub const DEFAULT_LOG_LINES: i64 = 100;

/// Upper bound for `/logs?lines=`
pub const MAX_LOG_LINES: i64 = 1000;

type Reply = (StatusCode, Json<Value>);

/// Shared state behind every route
#[derive(Debug)]
pub struct AppState<F: DriverFactory> {
    /// Owns the run lifecycle
    pub runner: ValidationRunner<F>,
    /// File tailed by `/logs`
    pub log_file: PathBuf,
}

impl<F: DriverFactory> AppState<F> {
    /// Create the shared state
    #[must_use]
    pub fn new(runner: ValidationRunner<F>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            log_file: log_file.into(),
        }
    }
}

/// Build the control panel router
pub fn router<F: DriverFactory>(state: Arc<AppState<F>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index::<F>))
        .route("/health", get(health::<F>))
        .route("/start_validation", post(start_validation::<F>))
        .route("/pause_resume_validation", post(pause_resume_validation::<F>))
        .route("/stop_validation", post(stop_validation::<F>))
        .route("/status", get(status::<F>))
        .route("/logs", get(logs::<F>))
        .route("/screenshots", get(screenshots::<F>))
        .route("/generate_report", get(generate_report::<F>))
        .route("/download_report", get(download_report::<F>))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process exits
pub async fn serve<F: DriverFactory>(state: Arc<AppState<F>>, addr: SocketAddr) -> CliResult<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CliError::server(format!("Cannot bind {addr}: {e}")))?;
    tracing::info!(%addr, "control panel listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| CliError::server(e.to_string()))
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn reply(status: StatusCode, body: Value) -> Reply {
    (status, Json(body))
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn index<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Html<String> {
    let config = app.runner.config();
    let options: String = config
        .environments
        .keys()
        .map(|name| {
            let name = escape_html(name);
            format!("<option value=\"{name}\">{name}</option>")
        })
        .collect();
    Html(format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>{project} - Tabwalk</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; background: #f5f5f5; }}
        .card {{ background: white; border-radius: 8px; padding: 20px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); margin-bottom: 20px; }}
        button {{ padding: 8px 16px; margin-right: 8px; border: none; border-radius: 4px; background: #2196F3; color: white; cursor: pointer; }}
        pre {{ background: #263238; color: #eceff1; padding: 12px; border-radius: 4px; max-height: 400px; overflow: auto; }}
    </style>
</head>
<body>
    <div class="card">
        <h1>{project}</h1>
        <select id="env">{options}</select>
        <label><input type="checkbox" id="retry"> Retry failed only</label>
        <button onclick="start()">Start</button>
        <button onclick="post('/pause_resume_validation')">Pause / Resume</button>
        <button onclick="post('/stop_validation')">Stop</button>
        <a href="/download_report">Download report</a>
    </div>
    <div class="card"><pre id="status">Loading...</pre></div>
    <script>
        async function post(path, body) {{
            const res = await fetch(path, {{ method: 'POST', headers: {{ 'Content-Type': 'application/json' }}, body: JSON.stringify(body || {{}}) }});
            document.getElementById('status').textContent = JSON.stringify(await res.json(), null, 2);
        }}
        function start() {{
            post('/start_validation', {{ environment: document.getElementById('env').value, retry_failed: document.getElementById('retry').checked }});
        }}
        async function poll() {{
            const res = await fetch('/status');
            const s = await res.json();
            document.getElementById('status').textContent = s.status + ' ' + s.progress_percent + '% (' + s.successful + ' ok, ' + s.failed + ' failed, ' + s.skipped + ' skipped)';
        }}
        setInterval(poll, 2000);
        poll();
    </script>
</body>
</html>"#,
        project = escape_html(&config.project_name),
    ))
}

async fn health<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": now(),
        "app": app.runner.config().project_name,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StartBody {
    environment: Option<String>,
    retry_failed: bool,
}

async fn start_validation<F: DriverFactory>(
    State(app): State<Arc<AppState<F>>>,
    body: Bytes,
) -> Reply {
    if body.is_empty() {
        return reply(StatusCode::BAD_REQUEST, json!({ "error": "Missing request data" }));
    }
    let request: StartBody = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return reply(
                StatusCode::BAD_REQUEST,
                json!({ "error": format!("Invalid request: {e}") }),
            );
        }
    };
    let Some(environment) = request.environment.filter(|env| !env.trim().is_empty()) else {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Environment must be specified" }),
        );
    };

    let environments = &app.runner.config().environments;
    if !environments.contains_key(&environment) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({
                "error": format!("Invalid environment: {environment}"),
                "valid_environments": environments.keys().collect::<Vec<_>>(),
            }),
        );
    }

    let run_request = RunRequest::new(environment.clone()).retry_failed(request.retry_failed);
    match app.runner.start_run(run_request) {
        Ok(run_id) => {
            let snapshot = app.runner.snapshot();
            reply(
                StatusCode::ACCEPTED,
                json!({
                    "message": "Validation started",
                    "run_id": run_id,
                    "environment": environment,
                    "status": snapshot.status,
                    "retry_failed": request.retry_failed,
                    "start_time": snapshot.start_time,
                }),
            )
        }
        Err(TabwalkError::RunInProgress { run_id }) => reply(
            StatusCode::CONFLICT,
            json!({
                "error": "Validation already in progress",
                "run_id": run_id,
                "status": app.runner.state().status(),
            }),
        ),
        Err(e) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": e.to_string() }),
        ),
    }
}

async fn pause_resume_validation<F: DriverFactory>(
    State(app): State<Arc<AppState<F>>>,
) -> Reply {
    match app.runner.pause_or_resume() {
        Ok(status) => {
            let message = if status == RunStatus::Paused {
                "Validation paused"
            } else {
                "Validation resumed"
            };
            reply(StatusCode::OK, json!({ "message": message, "status": status }))
        }
        Err(e) => reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": control_error(&e), "status": app.runner.state().status() }),
        ),
    }
}

async fn stop_validation<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Reply {
    match app.runner.stop() {
        Ok(()) => reply(
            StatusCode::OK,
            json!({ "message": "Validation stopping", "status": app.runner.state().status() }),
        ),
        Err(e) => reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": control_error(&e), "status": app.runner.state().status() }),
        ),
    }
}

fn control_error(err: &TabwalkError) -> String {
    match err {
        TabwalkError::InvalidState { message } => message.clone(),
        other => other.to_string(),
    }
}

async fn status<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Reply {
    let snapshot = app.runner.snapshot();
    let active = snapshot.status.is_active();
    let mut body = match serde_json::to_value(&snapshot) {
        Ok(body) => body,
        Err(e) => {
            return reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": format!("Cannot serialize run state: {e}") }),
            );
        }
    };
    if let Value::Object(ref mut map) = body {
        map.insert("active".to_string(), Value::Bool(active));
        map.insert("timestamp".to_string(), Value::String(now()));
        map.insert("total_checks".to_string(), json!(snapshot.total_checks()));
        map.insert("success_rate".to_string(), json!(snapshot.success_rate()));
    }
    reply(StatusCode::OK, body)
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    lines: Option<i64>,
}

async fn logs<F: DriverFactory>(
    State(app): State<Arc<AppState<F>>>,
    Query(query): Query<LogsQuery>,
) -> Reply {
    let lines = query.lines.unwrap_or(DEFAULT_LOG_LINES);
    if !(1..=MAX_LOG_LINES).contains(&lines) {
        return reply(
            StatusCode::BAD_REQUEST,
            json!({ "error": "Lines parameter must be between 1 and 1000" }),
        );
    }
    let log_file = app.log_file.clone();
    let path = log_file.clone();
    let tail = tokio::task::spawn_blocking(move || tail_lines(&path, lines as usize)).await;
    match tail {
        Ok(Ok(logs)) => reply(
            StatusCode::OK,
            json!({
                "count": logs.len(),
                "logs": logs,
                "log_file": log_file.display().to_string(),
            }),
        ),
        Ok(Err(e)) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": format!("Error reading log file: {e}") }),
        ),
        Err(e) => reply(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": format!("Error reading log file: {e}") }),
        ),
    }
}

async fn screenshots<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Reply {
    let snapshot = app.runner.snapshot();
    let mut entries = Vec::with_capacity(snapshot.screenshots.len());
    for path in &snapshot.screenshots {
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            continue;
        };
        let filename = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        entries.push(json!({ "filename": filename, "path": path, "size": metadata.len() }));
    }
    reply(
        StatusCode::OK,
        json!({ "count": entries.len(), "screenshots": entries }),
    )
}

fn current_report<F: DriverFactory>(runner: &ValidationRunner<F>) -> Option<RunReport> {
    let snapshot = runner.snapshot();
    snapshot.run_id.as_ref()?;
    Some(RunReport::from_state(&runner.config().project_name, &snapshot))
}

fn no_report() -> Response {
    reply(
        StatusCode::NOT_FOUND,
        json!({ "error": "No validation results available" }),
    )
    .into_response()
}

async fn generate_report<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Response {
    current_report(&app.runner).map_or_else(no_report, |report| {
        Html(report.render_html()).into_response()
    })
}

async fn download_report<F: DriverFactory>(State(app): State<Arc<AppState<F>>>) -> Response {
    let Some(report) = current_report(&app.runner) else {
        return no_report();
    };
    let disposition = format!("attachment; filename={}", report.file_name());
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.render_html(),
    )
        .into_response()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tabwalk::mock::{ScriptedElement, ScriptedFactory, ScriptedPage};
    use tabwalk::{Locator, TabSpec, TimingConfig, ValidationConfig};
    use tower::ServiceExt;

    fn config() -> ValidationConfig {
        let mut config = ValidationConfig::new("Acme CRM")
            .with_environment("staging", "https://staging.example.com")
            .with_environment("prod", "https://crm.example.com")
            .with_tab(TabSpec::new("Home", Locator::id("home"), Locator::id("home_body")))
            .with_timing(TimingConfig::immediate());
        config.output.capture_screenshots = false;
        config
    }

    fn app_state(log_file: &Path) -> Arc<AppState<ScriptedFactory>> {
        let page = ScriptedPage::new()
            .element(Locator::id("home"), ScriptedElement::visible())
            .element(Locator::id("home_body"), ScriptedElement::visible());
        let runner = ValidationRunner::new(config(), ScriptedFactory::new(page));
        Arc::new(AppState::new(runner, log_file))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_index_escapes_configured_names() {
        let mut config = config().with_environment("<b>qa</b>", "https://qa.example.com");
        config.project_name = "<script>alert(1)</script> & Co".to_string();
        let runner = ValidationRunner::new(config, ScriptedFactory::new(ScriptedPage::new()));
        let app = router(Arc::new(AppState::new(runner, Path::new("missing.log"))));

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<h1>&lt;script&gt;alert(1)&lt;/script&gt; &amp; Co</h1>"));
        assert!(html.contains("<option value=\"&lt;b&gt;qa&lt;/b&gt;\">&lt;b&gt;qa&lt;/b&gt;</option>"));
        assert!(!html.contains("<script>alert(1)"));
        assert!(html.contains("<option value=\"staging\">staging</option>"));
    }

    #[tokio::test]
    async fn test_health() {
        let state = app_state(Path::new("missing.log"));
        let app = router(state);
        let (status, body) = send(&app, "GET", "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["app"], "Acme CRM");
    }

    #[tokio::test]
    async fn test_start_requires_body_and_environment() {
        let app = router(app_state(Path::new("missing.log")));

        let (status, body) = send(&app, "POST", "/start_validation", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing request data");

        let (status, body) = send(&app, "POST", "/start_validation", "{}").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Environment must be specified");

        let (status, body) = send(&app, "POST", "/start_validation", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request"));
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_environment() {
        let app = router(app_state(Path::new("missing.log")));
        let (status, body) =
            send(&app, "POST", "/start_validation", r#"{"environment":"qa"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid environment: qa");
        assert_eq!(body["valid_environments"], json!(["prod", "staging"]));
    }

    #[tokio::test]
    async fn test_start_runs_to_completion() {
        let state = app_state(Path::new("missing.log"));
        let app = router(Arc::clone(&state));
        let (status, body) =
            send(&app, "POST", "/start_validation", r#"{"environment":"staging"}"#).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["message"], "Validation started");
        let run_id = body["run_id"].as_str().unwrap().to_string();

        state.runner.wait_for_completion().await;
        let (status, body) = send(&app, "GET", "/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_id"], run_id.as_str());
        assert_eq!(body["status"], "Completed");
        assert_eq!(body["active"], false);
        assert_eq!(body["progress_percent"], 100);
    }

    #[tokio::test]
    async fn test_second_start_conflicts_and_stop_wins() {
        let state = app_state(Path::new("missing.log"));
        let app = router(Arc::clone(&state));
        state.runner.start_run(RunRequest::new("staging")).unwrap();
        assert_eq!(state.runner.pause_or_resume().unwrap(), RunStatus::Paused);

        let (status, body) =
            send(&app, "POST", "/start_validation", r#"{"environment":"prod"}"#).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Validation already in progress");
        assert_eq!(body["status"], "Paused");

        let (status, body) = send(&app, "POST", "/stop_validation", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Validation stopping");

        let final_state = state.runner.wait_for_completion().await;
        assert_eq!(final_state.status, RunStatus::Stopped);
    }

    #[tokio::test]
    async fn test_resume_through_panel() {
        let state = app_state(Path::new("missing.log"));
        let app = router(Arc::clone(&state));
        state.runner.start_run(RunRequest::new("staging")).unwrap();
        state.runner.pause_or_resume().unwrap();

        let (status, body) = send(&app, "POST", "/pause_resume_validation", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Validation resumed");
        assert_eq!(body["status"], "Running");

        let final_state = state.runner.wait_for_completion().await;
        assert_eq!(final_state.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_controls_without_run() {
        let app = router(app_state(Path::new("missing.log")));
        let (status, body) = send(&app, "POST", "/pause_resume_validation", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No validation is currently running");
        assert_eq!(body["status"], "Not Started");

        let (status, _) = send(&app, "POST", "/stop_validation", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_logs_bounds_and_tail() {
        let dir = tempfile::tempdir().unwrap();
        let log_file = dir.path().join("tabwalk.log");
        std::fs::write(&log_file, "a\nb\nc\n").unwrap();
        let app = router(app_state(&log_file));

        let (status, body) = send(&app, "GET", "/logs?lines=0", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Lines parameter must be between 1 and 1000");

        let (status, _) = send(&app, "GET", "/logs?lines=1001", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/logs?lines=2", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["logs"], json!(["b", "c"]));
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_logs_missing_file_is_server_error() {
        let dir = tempfile::tempdir().unwrap();
        let app = router(app_state(&dir.path().join("absent.log")));
        let (status, body) = send(&app, "GET", "/logs", "").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Error reading log file"));
    }

    #[tokio::test]
    async fn test_report_routes() {
        let state = app_state(Path::new("missing.log"));
        let app = router(Arc::clone(&state));

        let (status, _) = send(&app, "GET", "/generate_report", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.runner.start_run(RunRequest::new("staging")).unwrap();
        state.runner.wait_for_completion().await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/download_report")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=staging_"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(String::from_utf8_lossy(&bytes).contains("Acme CRM"));

        let (status, body) = send(&app, "GET", "/screenshots", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 0);
    }
}
