//! Session orchestration: create a session, poll it, turn the payload into
//! a result, cache it, and optionally report back on the issue.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::AgentError;
use crate::github::comment::format_analysis_comment;
use crate::github::{Issue, IssueTracker};

use super::cache::ResultStore;
use super::client::{AgentService, CreateSessionRequest};
use super::extract::{extract, find_pull_request};
use super::heuristic::fallback_analysis;
use super::models::{
    AnalysisResult, ExecutionResult, ExecutionStatus, FallbackReason, Session, SessionKind,
    UnifiedResult,
};
use super::poller::{Clock, PollOutcome, Poller, timeout_analysis};
use super::prompts::{analysis_prompt, execution_prompt, unified_prompt};

/// Fields that may carry the new session's id, in priority order.
const SESSION_ID_FIELDS: &[&str] = &[
    "session_id",
    "sessionId",
    "id",
    "session",
    "devin_session_id",
];

/// First non-empty string (or number) among the known id fields, then
/// `data.id`.
pub fn extract_session_id(response: &Value) -> Option<String> {
    SESSION_ID_FIELDS
        .iter()
        .filter_map(|field| response.get(*field))
        .chain(response.pointer("/data/id"))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

pub struct Orchestrator {
    agent: Arc<dyn AgentService>,
    tracker: Arc<dyn IssueTracker>,
    store: Arc<dyn ResultStore>,
    poller: Poller,
    repo: String,
}

impl Orchestrator {
    pub fn new(
        agent: Arc<dyn AgentService>,
        tracker: Arc<dyn IssueTracker>,
        store: Arc<dyn ResultStore>,
        repo: &str,
    ) -> Self {
        Self {
            poller: Poller::new(agent.clone()),
            agent,
            tracker,
            store,
            repo: repo.to_string(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.poller = Poller::with_clock(self.agent.clone(), clock);
        self
    }

    pub fn agent(&self) -> &Arc<dyn AgentService> {
        &self.agent
    }

    pub fn tracker(&self) -> &Arc<dyn IssueTracker> {
        &self.tracker
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    async fn start_session(&self, request: CreateSessionRequest) -> Result<Session, AgentError> {
        let kind = request.metadata.kind;
        let issue = request.metadata.issue_number;
        let response = self.agent.create_session(&request).await?;
        let Some(session_id) = extract_session_id(&response) else {
            warn!(issue, %kind, %response, "Create-session response has no session id");
            return Err(AgentError::SessionIdMissing { response });
        };
        info!(issue, %kind, session_id = %session_id, "Session created");
        Ok(Session::new(&session_id, kind))
    }

    fn session_failed_fallback(&self, issue: &Issue, err: AgentError) -> Result<AnalysisResult, AgentError> {
        match err {
            AgentError::AgentSessionFailed {
                session_id,
                status,
                payload,
            } => {
                warn!(issue = issue.number, %session_id, %status, %payload, "Agent session failed, using heuristic analysis");
                let url = self.agent.session_url(&session_id);
                Ok(fallback_analysis(issue, FallbackReason::AgentSessionFailed).with_session(&session_id, &url))
            }
            other => Err(other),
        }
    }

    async fn post_analysis_comment(&self, issue: &Issue, analysis: &AnalysisResult) {
        let body = format_analysis_comment(analysis);
        match self.tracker.post_comment(issue.number, &body).await {
            Ok(comment_id) => info!(issue = issue.number, comment_id, "Posted analysis comment"),
            Err(e) => warn!(issue = issue.number, error = %e, "Failed to post analysis comment"),
        }
    }

    /// Analyze an issue. Agent-side failures and timeouts degrade to a
    /// heuristic result; only collaborator errors and cancellation are
    /// returned as errors.
    pub async fn run_analysis(
        &self,
        issue: &Issue,
        post_comment: bool,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AgentError> {
        info!(issue = issue.number, "Starting analysis");
        let request = CreateSessionRequest::new(analysis_prompt(issue), issue.number, SessionKind::Analysis);
        let mut session = self.start_session(request).await?;

        let analysis = match self.poller.poll(&mut session, issue, cancel).await {
            Ok(analysis) => analysis,
            Err(err) => self.session_failed_fallback(issue, err)?,
        };

        self.store.record_analysis(issue, analysis.clone());
        if post_comment && !analysis.is_fallback {
            self.post_analysis_comment(issue, &analysis).await;
        }
        info!(
            issue = issue.number,
            confidence = analysis.confidence,
            fallback = analysis.is_fallback,
            "Analysis finished"
        );
        Ok(analysis)
    }

    /// Ask the agent to implement a fix, using the cached analysis plan when
    /// there is one.
    pub async fn run_execution(
        &self,
        issue: &Issue,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, AgentError> {
        info!(issue = issue.number, "Starting execution");
        let analysis = self.store.get(issue.number).and_then(|entry| entry.analysis);
        let mut request = CreateSessionRequest::new(
            execution_prompt(issue, &self.repo, analysis.as_ref()),
            issue.number,
            SessionKind::Execution,
        );
        if let Some(analysis_session) = analysis.as_ref().and_then(|a| a.session_id.as_deref()) {
            request = request.with_analysis_session(analysis_session);
        }

        let mut session = match self.start_session(request).await {
            Ok(session) => session,
            Err(AgentError::Other(e)) => {
                warn!(issue = issue.number, error = %e, "Agent unavailable for execution");
                let execution = unavailable_execution(&e);
                self.store.record_execution(issue, execution.clone());
                return Ok(execution);
            }
            Err(e) => return Err(e),
        };

        let session_url = self.agent.session_url(&session.id);
        let execution = match self.poller.wait_for_terminal(&mut session, cancel).await {
            Ok(PollOutcome::Completed { payload }) => {
                let pr = find_pull_request(&payload);
                let message = match pr.as_ref().and_then(|p| p.number) {
                    Some(n) => format!("Execution completed; pull request #{} opened for issue #{}", n, issue.number),
                    None => format!("Execution completed for issue #{}", issue.number),
                };
                ExecutionResult {
                    status: ExecutionStatus::Completed,
                    message,
                    session_id: Some(session.id.clone()),
                    session_url: Some(session_url),
                    pr_url: pr.as_ref().and_then(|p| p.url.clone()),
                    pr_number: pr.and_then(|p| p.number),
                }
            }
            Ok(PollOutcome::TimedOut { .. }) => ExecutionResult {
                status: ExecutionStatus::TimedOut,
                message: format!(
                    "Execution for issue #{} is still running; follow the session for progress",
                    issue.number
                ),
                session_id: Some(session.id.clone()),
                session_url: Some(session_url),
                pr_url: None,
                pr_number: None,
            },
            Err(AgentError::AgentSessionFailed { session_id, status, .. }) => {
                warn!(issue = issue.number, %session_id, %status, "Execution session failed");
                ExecutionResult {
                    status: ExecutionStatus::Failed,
                    message: format!("Agent reported '{}' while implementing issue #{}", status, issue.number),
                    session_id: Some(session_id),
                    session_url: Some(session_url),
                    pr_url: None,
                    pr_number: None,
                }
            }
            Err(e) => return Err(e),
        };

        self.store.record_execution(issue, execution.clone());
        info!(issue = issue.number, status = %execution.status, pr = ?execution.pr_number, "Execution finished");
        Ok(execution)
    }

    /// Analysis and implementation in a single session.
    pub async fn run_unified(
        &self,
        issue: &Issue,
        post_comment: bool,
        cancel: &CancellationToken,
    ) -> Result<UnifiedResult, AgentError> {
        info!(issue = issue.number, "Starting unified analysis and execution");
        let request = CreateSessionRequest::new(unified_prompt(issue, &self.repo), issue.number, SessionKind::Unified);
        let mut session = self.start_session(request).await?;
        let session_url = self.agent.session_url(&session.id);

        let (analysis, execution) = match self.poller.wait_for_terminal(&mut session, cancel).await {
            Ok(PollOutcome::Completed { payload }) => {
                let pr = find_pull_request(&payload);
                let execution = ExecutionResult {
                    status: ExecutionStatus::Completed,
                    message: match pr.as_ref().and_then(|p| p.number) {
                        Some(n) => format!("Analysis and implementation completed; pull request #{}", n),
                        None => "Analysis and implementation completed; no pull request was found".to_string(),
                    },
                    session_id: Some(session.id.clone()),
                    session_url: Some(session_url.clone()),
                    pr_url: pr.as_ref().and_then(|p| p.url.clone()),
                    pr_number: pr.and_then(|p| p.number),
                };
                (extract(&payload, issue), execution)
            }
            Ok(PollOutcome::TimedOut { last_payload }) => (
                timeout_analysis(issue, last_payload.as_ref()),
                ExecutionResult {
                    status: ExecutionStatus::TimedOut,
                    message: "Unified session is still running; follow the session for progress".to_string(),
                    session_id: Some(session.id.clone()),
                    session_url: Some(session_url.clone()),
                    pr_url: None,
                    pr_number: None,
                },
            ),
            Err(err) => {
                let status = match &err {
                    AgentError::AgentSessionFailed { status, .. } => status.clone(),
                    _ => String::new(),
                };
                let analysis = self.session_failed_fallback(issue, err)?;
                let execution = ExecutionResult {
                    status: ExecutionStatus::Failed,
                    message: format!("Agent reported '{}' during the unified session", status),
                    session_id: Some(session.id.clone()),
                    session_url: Some(session_url.clone()),
                    pr_url: None,
                    pr_number: None,
                };
                (analysis, execution)
            }
        };
        let analysis = analysis.with_session(&session.id, &session_url);

        self.store.record_analysis(issue, analysis.clone());
        self.store.record_execution(issue, execution.clone());
        if post_comment && !analysis.is_fallback {
            self.post_analysis_comment(issue, &analysis).await;
        }
        Ok(UnifiedResult { analysis, execution })
    }
}

fn unavailable_execution(err: &anyhow::Error) -> ExecutionResult {
    let detail = format!("{:#}", err);
    let hint = if detail.contains("429") || detail.to_lowercase().contains("rate limit") {
        "The API rate limit was reached; try again in a few minutes or implement the plan manually."
    } else {
        "Implement the plan manually or try again later."
    };
    ExecutionResult {
        status: ExecutionStatus::Unavailable,
        message: format!("Devin API is currently unavailable ({}). {}", detail, hint),
        session_id: None,
        session_url: None,
        pr_url: None,
        pr_number: None,
    }
}
