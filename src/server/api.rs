use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::{
        IntoResponse,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::agent::models::{AnalysisResult, ExecutionResult, SessionKind};
use crate::agent::orchestrator::Orchestrator;
use crate::agent::status::{normalize, raw_status};
use crate::config::ConfigStatus;
use crate::errors::ApiError;
use crate::github::{Issue, IssueState};

use super::stream::session_events;

const STREAM_INTERVAL: Duration = Duration::from_secs(1);

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config_status: ConfigStatus,
    /// Poll cadence of the session event stream.
    pub stream_interval: Duration,
    /// How long the event stream follows a session that never finishes.
    pub stream_max_duration: Duration,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, config_status: ConfigStatus) -> Self {
        Self {
            orchestrator,
            config_status,
            stream_interval: STREAM_INTERVAL,
            stream_max_duration: SessionKind::Unified.timing().max_wait,
        }
    }
}

pub type SharedState = Arc<AppState>;

// ── Query / response types ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct IssuesQuery {
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    #[serde(default = "default_post_comment")]
    pub post_comment: bool,
    #[serde(default)]
    pub unified: bool,
}

fn default_post_comment() -> bool {
    true
}

/// An issue together with whatever has been cached for it.
#[derive(Debug, Serialize)]
pub struct IssueView {
    #[serde(flatten)]
    pub issue: Issue,
    pub analysis: Option<AnalysisResult>,
    pub execution: Option<ExecutionResult>,
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .route("/api/issues", get(list_issues))
        .route("/api/issues/{number}", get(get_issue))
        .route("/api/analyze/{number}", post(analyze_issue))
        .route("/api/execute/{number}", post(execute_issue))
        .route("/api/sessions/{id}", get(get_session))
        .route("/api/sessions/{id}/stream", get(stream_session))
        .route("/api/history", get(get_history))
}

fn issue_view(state: &AppState, issue: Issue) -> IssueView {
    let cached = state.orchestrator.store().get(issue.number);
    IssueView {
        issue,
        analysis: cached.as_ref().and_then(|c| c.analysis.clone()),
        execution: cached.and_then(|c| c.execution),
    }
}

async fn fetch_issue(state: &AppState, number: i64) -> Result<Issue, ApiError> {
    state
        .orchestrator
        .tracker()
        .get_issue(number)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Issue #{} not found", number)))
}

/// Cancels in-flight polling when the handler future is dropped, which is
/// what happens when the client disconnects.
fn request_cancellation() -> (CancellationToken, tokio_util::sync::DropGuard) {
    let token = CancellationToken::new();
    let guard = token.clone().drop_guard();
    (token, guard)
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "Devin Issue Assistant API",
        "status": "running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let status = &state.config_status;
    Json(json!({
        "status": status.label(),
        "configuration": status,
        "repo": if status.is_healthy() { status.repository.clone() } else { None },
    }))
}

async fn list_issues(
    State(state): State<SharedState>,
    Query(query): Query<IssuesQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let issue_state = match query.state.as_deref() {
        Some(raw) => raw
            .parse::<IssueState>()
            .map_err(|e| ApiError::BadRequest(e.to_string()))?,
        None => IssueState::Open,
    };
    let issues = state.orchestrator.tracker().list_issues(issue_state).await?;
    let views: Vec<IssueView> = issues.into_iter().map(|i| issue_view(&state, i)).collect();
    Ok(Json(json!({
        "success": true,
        "count": views.len(),
        "issues": views,
    })))
}

async fn get_issue(
    State(state): State<SharedState>,
    Path(number): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = fetch_issue(&state, number).await?;
    Ok(Json(json!({
        "success": true,
        "issue": issue_view(&state, issue),
    })))
}

async fn analyze_issue(
    State(state): State<SharedState>,
    Path(number): Path<i64>,
    Query(query): Query<AnalyzeQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let issue = fetch_issue(&state, number).await?;
    let (cancel, _guard) = request_cancellation();
    info!(issue = number, unified = query.unified, post_comment = query.post_comment, "Analyze requested");

    if query.unified {
        let unified = state
            .orchestrator
            .run_unified(&issue, query.post_comment, &cancel)
            .await?;
        return Ok(Json(json!({
            "success": true,
            "issue_number": number,
            "analysis": unified.analysis,
            "execution": unified.execution,
        })));
    }

    let analysis = state
        .orchestrator
        .run_analysis(&issue, query.post_comment, &cancel)
        .await?;
    Ok(Json(json!({
        "success": true,
        "issue_number": number,
        "analysis": analysis,
    })))
}

async fn execute_issue(
    State(state): State<SharedState>,
    Path(number): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let entry = state
        .orchestrator
        .store()
        .get(number)
        .filter(|e| e.analysis.is_some())
        .ok_or_else(|| ApiError::BadRequest("Please analyze the issue first before executing".into()))?;
    let issue = match entry.issue {
        Some(issue) => issue,
        None => fetch_issue(&state, number).await?,
    };

    let (cancel, _guard) = request_cancellation();
    let execution = state.orchestrator.run_execution(&issue, &cancel).await?;
    Ok(Json(json!({
        "success": true,
        "issue_number": number,
        "execution": execution,
    })))
}

async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let agent = state.orchestrator.agent();
    let payload = agent.fetch_session(&id).await?;
    Ok(Json(json!({
        "success": true,
        "session": {
            "session_id": id,
            "status": normalize(&payload),
            "raw_status": raw_status(&payload),
            "session_url": agent.session_url(&id),
            "payload": payload,
        },
    })))
}

async fn stream_session(State(state): State<SharedState>, Path(id): Path<String>) -> impl IntoResponse {
    let events = session_events(
        state.orchestrator.agent().clone(),
        state.orchestrator.store().clone(),
        id,
        state.stream_interval,
        state.stream_max_duration,
    );
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn get_history(State(state): State<SharedState>) -> impl IntoResponse {
    let history: Vec<serde_json::Value> = state
        .orchestrator
        .store()
        .entries()
        .into_iter()
        .map(|(number, entry)| {
            json!({
                "issue_number": number,
                "issue_title": entry.issue.as_ref().map(|i| i.title.as_str()).unwrap_or("Unknown"),
                "analysis": entry.analysis,
                "execution": entry.execution,
                "updated_at": entry.updated_at,
            })
        })
        .collect();
    Json(json!({
        "success": true,
        "count": history.len(),
        "history": history,
    }))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::cache::{InMemoryStore, ResultStore};
    use crate::testing::{FakeClock, MemoryTracker, ScriptedAgent};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    const FENCED_OUTPUT: &str = "```json\n{\"summary\":\"Fix emoji handling\",\"confidence\":0.9,\"implementation_steps\":[\"a\",\"b\"]}\n```";

    fn issues() -> Vec<Issue> {
        vec![
            Issue::new(42, "Login fails with emoji").with_labels(&["bug"]),
            Issue::new(7, "Add dark mode").with_labels(&["enhancement"]),
        ]
    }

    fn healthy() -> ConfigStatus {
        ConfigStatus {
            github_configured: true,
            devin_configured: true,
            repository: Some("acme/app".into()),
        }
    }

    struct TestApp {
        router: Router,
        agent: Arc<ScriptedAgent>,
        tracker: Arc<MemoryTracker>,
        store: Arc<InMemoryStore>,
    }

    impl TestApp {
        async fn call(&self, method: &str, uri: &str) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap();
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            (status, body_json(response.into_body()).await)
        }
    }

    fn test_app(script: Vec<Value>) -> TestApp {
        let agent = Arc::new(ScriptedAgent::new(script));
        let tracker = Arc::new(MemoryTracker::new(issues()));
        let store = Arc::new(InMemoryStore::new());
        let orchestrator = Orchestrator::new(agent.clone(), tracker.clone(), store.clone(), "acme/app")
            .with_clock(FakeClock::new());
        let mut state = AppState::new(orchestrator, healthy());
        state.stream_interval = Duration::from_millis(1);
        TestApp {
            router: api_router().with_state(Arc::new(state)),
            agent,
            tracker,
            store,
        }
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_root_banner() {
        let app = test_app(vec![]);
        let (status, body) = app.call("GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
    }

    #[tokio::test]
    async fn test_health_both_paths() {
        let app = test_app(vec![]);
        for path in ["/health", "/api/health"] {
            let (status, body) = app.call("GET", path).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "healthy");
            assert_eq!(body["repo"], "acme/app");
            assert_eq!(body["configuration"]["devin_configured"], true);
        }
    }

    #[tokio::test]
    async fn test_health_misconfigured_hides_repo() {
        let agent = Arc::new(ScriptedAgent::new(vec![]));
        let orchestrator = Orchestrator::new(
            agent,
            Arc::new(MemoryTracker::default()),
            Arc::new(InMemoryStore::new()),
            "",
        );
        let status = ConfigStatus {
            github_configured: false,
            devin_configured: true,
            repository: Some("acme/app".into()),
        };
        let router = api_router().with_state(Arc::new(AppState::new(orchestrator, status)));
        let response = router
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: Value = body_json(response.into_body()).await;
        assert_eq!(body["status"], "misconfigured");
        assert!(body["repo"].is_null());
    }

    #[tokio::test]
    async fn test_list_issues() {
        let app = test_app(vec![]);
        let (status, body) = app.call("GET", "/api/issues?state=open").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["issues"][0]["number"], 42);
        assert_eq!(body["issues"][0]["labels"], json!(["bug"]));
        assert!(body["issues"][0]["analysis"].is_null());
    }

    #[tokio::test]
    async fn test_list_issues_invalid_state() {
        let app = test_app(vec![]);
        let (status, body) = app.call("GET", "/api/issues?state=merged").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Invalid issue state"));
    }

    #[tokio::test]
    async fn test_get_issue_not_found() {
        let app = test_app(vec![]);
        let (status, body) = app.call("GET", "/api/issues/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Issue #999 not found");
    }

    #[tokio::test]
    async fn test_analyze_caches_and_enriches_issue() {
        let app = test_app(vec![json!({"status": "completed", "output": FENCED_OUTPUT})]);

        let (status, body) = app.call("POST", "/api/analyze/42?post_comment=false").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["issue_number"], 42);
        assert_eq!(body["analysis"]["summary"], "Fix emoji handling");
        assert_eq!(body["analysis"]["confidence"], 0.9);
        assert_eq!(body["analysis"]["is_fallback"], false);
        assert!(app.tracker.comments().is_empty());

        let (_, body) = app.call("GET", "/api/issues/42").await;
        assert_eq!(body["issue"]["analysis"]["summary"], "Fix emoji handling");
    }

    #[tokio::test]
    async fn test_analyze_posts_comment_by_default() {
        let app = test_app(vec![json!({"status": "completed", "output": FENCED_OUTPUT})]);
        let (status, _) = app.call("POST", "/api/analyze/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.tracker.comments().len(), 1);
    }

    #[tokio::test]
    async fn test_analyze_unknown_issue() {
        let app = test_app(vec![]);
        let (status, _) = app.call("POST", "/api/analyze/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(app.agent.created().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_unified() {
        let output = format!("{}\nhttps://github.com/acme/app/pull/5", FENCED_OUTPUT);
        let app = test_app(vec![json!({"status": "completed", "output": output})]);
        let (status, body) = app.call("POST", "/api/analyze/42?unified=true&post_comment=false").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["analysis"]["summary"], "Fix emoji handling");
        assert_eq!(body["execution"]["pr_number"], 5);
    }

    #[tokio::test]
    async fn test_execute_requires_analysis() {
        let app = test_app(vec![]);
        let (status, body) = app.call("POST", "/api/execute/42").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("analyze the issue first"));
    }

    #[tokio::test]
    async fn test_execute_after_analysis() {
        let app = test_app(vec![
            json!({"status": "completed", "output": FENCED_OUTPUT}),
            json!({"status": "finished", "output": "PR: https://github.com/acme/app/pull/11"}),
        ]);
        app.call("POST", "/api/analyze/42?post_comment=false").await;

        let (status, body) = app.call("POST", "/api/execute/42").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["execution"]["status"], "completed");
        assert_eq!(body["execution"]["pr_number"], 11);

        let (_, history) = app.call("GET", "/api/history").await;
        assert_eq!(history["count"], 1);
        assert_eq!(history["history"][0]["issue_title"], "Login fails with emoji");
        assert_eq!(history["history"][0]["execution"]["pr_number"], 11);
    }

    #[tokio::test]
    async fn test_get_session_normalizes_status() {
        let app = test_app(vec![json!({"status_enum": "blocked", "extra": 1})]);
        let (status, body) = app.call("GET", "/api/sessions/devin-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["session"]["status"], "completed");
        assert_eq!(body["session"]["raw_status"], "blocked");
        assert_eq!(body["session"]["payload"]["extra"], 1);
        assert_eq!(
            body["session"]["session_url"],
            "https://app.devin.ai/sessions/devin-1"
        );
    }

    #[tokio::test]
    async fn test_history_empty() {
        let app = test_app(vec![]);
        let (_, body) = app.call("GET", "/api/history").await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["history"], json!([]));
    }

    #[tokio::test]
    async fn test_stream_emits_messages_status_and_completion() {
        let app = test_app(vec![
            json!({"status": "running", "messages": [{"message": "looking"}]}),
            json!({"status": "finished", "messages": [{"message": "looking"}, {"message": "done"}]}),
        ]);
        let request = Request::builder()
            .uri("/api/sessions/devin-1/stream")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(text.matches("event: message").count(), 2);
        assert_eq!(text.matches("event: status").count(), 2);
        assert_eq!(text.matches("event: completed").count(), 1);
        assert!(text.find("event: completed").unwrap() > text.rfind("event: status").unwrap());
        assert_eq!(app.agent.fetches(), 2);
    }

    async fn stream_text(app: &TestApp, uri: &str) -> String {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_stream_emits_new_thinking_steps_once() {
        let app = test_app(vec![
            json!({"status": "running", "thinking_steps": ["Reading the issue"]}),
            json!({"status": "running", "thinking_steps": ["Reading the issue", "Locating the parser"]}),
            json!({"status": "completed", "thinking_steps": ["Reading the issue", "Locating the parser"]}),
        ]);

        let text = stream_text(&app, "/api/sessions/devin-1/stream").await;

        assert_eq!(text.matches("event: thinking").count(), 2);
        assert_eq!(text.matches("Reading the issue").count(), 1);
        assert_eq!(text.matches("Locating the parser").count(), 1);
        assert!(text.contains("\"thinking_count\":2"));
        assert_eq!(text.matches("event: completed").count(), 1);
    }

    #[tokio::test]
    async fn test_stream_gives_up_on_session_that_never_finishes() {
        let agent = Arc::new(ScriptedAgent::new(vec![json!({"status": "running"})]));
        let orchestrator = Orchestrator::new(
            agent.clone(),
            Arc::new(MemoryTracker::default()),
            Arc::new(InMemoryStore::new()),
            "acme/app",
        );
        let mut state = AppState::new(orchestrator, healthy());
        state.stream_interval = Duration::from_millis(1);
        state.stream_max_duration = Duration::from_millis(30);
        let router = api_router().with_state(Arc::new(state));

        let request = Request::builder()
            .uri("/api/sessions/devin-1/stream")
            .body(Body::empty())
            .unwrap();
        let response = router.oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert!(text.trim_end().ends_with('}'));
        assert_eq!(text.matches("event: timeout").count(), 1);
        assert_eq!(text.matches("event: completed").count(), 0);
        assert!(agent.fetches() >= 1);
    }

    #[tokio::test]
    async fn test_stream_completion_refreshes_timed_out_analysis() {
        let app = test_app(vec![json!({"status": "completed", "output": FENCED_OUTPUT})]);
        let issue = issues().remove(0);
        let stale = AnalysisResult {
            summary: "placeholder".into(),
            confidence: 0.75,
            is_fallback: true,
            note: Some("timed out".into()),
            ..AnalysisResult::default()
        }
        .with_session("devin-1", "https://app.devin.ai/sessions/devin-1");
        app.store.record_analysis(&issue, stale);

        let request = Request::builder()
            .uri("/api/sessions/devin-1/stream")
            .body(Body::empty())
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("updated_analysis"));

        let refreshed = app.store.get(42).unwrap().analysis.unwrap();
        assert_eq!(refreshed.summary, "Fix emoji handling");
        assert!(!refreshed.is_fallback);
    }
}
