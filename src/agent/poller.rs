//! Drives a remote session to a terminal state under its timing policy.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::github::Issue;

use super::client::AgentService;
use super::extract::extract;
use super::heuristic::{fallback_analysis, heuristic};
use super::models::{AnalysisResult, FallbackReason, Session};
use super::status::{SessionStatus, raw_status};

/// Time source for the poll loop. Tests substitute a clock that advances
/// only when slept on.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a poll loop ended without error.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed { payload: Value },
    /// The wait budget ran out while the session was still running.
    TimedOut { last_payload: Option<Value> },
}

#[derive(Clone)]
pub struct Poller {
    agent: Arc<dyn AgentService>,
    clock: Arc<dyn Clock>,
}

impl Poller {
    pub fn new(agent: Arc<dyn AgentService>) -> Self {
        Self::with_clock(agent, Arc::new(TokioClock))
    }

    pub fn with_clock(agent: Arc<dyn AgentService>, clock: Arc<dyn Clock>) -> Self {
        Self { agent, clock }
    }

    /// Poll until the session completes, fails, times out or is cancelled.
    ///
    /// The first fetch happens immediately. Between fetches the loop sleeps
    /// `min(interval, remaining)`, so the wait budget is never overshot by a
    /// sleep. A fetch still pending when the budget runs out is abandoned.
    /// Cancellation is checked around every fetch and sleep.
    pub async fn wait_for_terminal(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<PollOutcome, AgentError> {
        let timing = session.kind.timing();
        let started = self.clock.now();
        let mut polls = 0u32;

        loop {
            let budget_left = timing
                .max_wait
                .saturating_sub(self.clock.now().saturating_duration_since(started));
            let payload = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(session)),
                fetched = self.agent.fetch_session(&session.id) => fetched?,
                _ = self.clock.sleep(budget_left) => {
                    warn!(
                        session_id = %session.id,
                        kind = %session.kind,
                        poll = polls + 1,
                        "Session fetch outlived the wait budget"
                    );
                    return Ok(PollOutcome::TimedOut {
                        last_payload: session.raw_payload().cloned(),
                    });
                }
            };
            polls += 1;

            let raw = raw_status(&payload).to_string();
            let status = session.observe(payload);
            let elapsed = self.clock.now().saturating_duration_since(started);
            debug!(
                session_id = %session.id,
                kind = %session.kind,
                poll = polls,
                elapsed_secs = elapsed.as_secs(),
                status = %raw,
                "Polled session"
            );

            match status {
                SessionStatus::Completed => {
                    info!(session_id = %session.id, poll = polls, elapsed_secs = elapsed.as_secs(), "Session completed");
                    return Ok(PollOutcome::Completed {
                        payload: session.raw_payload().cloned().unwrap_or_default(),
                    });
                }
                SessionStatus::Failed => {
                    warn!(session_id = %session.id, status = %raw, "Session failed");
                    return Err(AgentError::AgentSessionFailed {
                        session_id: session.id.clone(),
                        status: raw,
                        payload: session.raw_payload().cloned().unwrap_or_default(),
                    });
                }
                SessionStatus::Running => {}
            }

            if elapsed >= timing.max_wait {
                warn!(
                    session_id = %session.id,
                    kind = %session.kind,
                    poll = polls,
                    elapsed_secs = elapsed.as_secs(),
                    "Session timed out"
                );
                return Ok(PollOutcome::TimedOut {
                    last_payload: session.raw_payload().cloned(),
                });
            }

            let nap = timing.interval.min(timing.max_wait - elapsed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled(session)),
                _ = self.clock.sleep(nap) => {}
            }
        }
    }

    /// Poll an analysis-style session and extract its result.
    ///
    /// A timeout still yields a result: whatever the last payload contained,
    /// with heuristic confidence and a "timed out" note.
    pub async fn poll(
        &self,
        session: &mut Session,
        issue: &Issue,
        cancel: &CancellationToken,
    ) -> Result<AnalysisResult, AgentError> {
        let result = match self.wait_for_terminal(session, cancel).await? {
            PollOutcome::Completed { payload } => extract(&payload, issue),
            PollOutcome::TimedOut { last_payload } => timeout_analysis(issue, last_payload.as_ref()),
        };
        Ok(result.with_session(&session.id, &self.agent.session_url(&session.id)))
    }
}

fn cancelled(session: &Session) -> AgentError {
    info!(session_id = %session.id, "Polling cancelled");
    AgentError::Cancelled {
        session_id: session.id.clone(),
    }
}

pub(crate) fn timeout_analysis(issue: &Issue, last_payload: Option<&Value>) -> AnalysisResult {
    let Some(payload) = last_payload else {
        return fallback_analysis(issue, FallbackReason::SessionTimeout);
    };
    let estimate = heuristic(&issue.labels);
    let mut result = extract(payload, issue);
    result.confidence = estimate.confidence;
    result.complexity = result.complexity.or(Some(estimate.complexity));
    result.note = None;
    result.mark_fallback(FallbackReason::SessionTimeout);
    result
}
