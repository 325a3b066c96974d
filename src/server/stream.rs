//! Server-Sent Events feed of one agent session.
//!
//! Each poll emits any new `messages[]` and `thinking_steps[]` entries, then
//! a `status` event. When the session reaches a terminal status a
//! `completed` event closes the stream; if the session belongs to a cached
//! analysis, that analysis is re-extracted from the final payload first.
//! A session still running after `max_duration` ends the stream with a
//! `timeout` event.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use chrono::Utc;
use futures::Stream;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::agent::cache::ResultStore;
use crate::agent::client::AgentService;
use crate::agent::extract::extract;
use crate::agent::models::AnalysisResult;
use crate::agent::status::{SessionStatus, normalize, raw_status};
use crate::util::truncate_chars;

const ERROR_BACKOFF_FACTOR: u32 = 5;
const MAX_CONSECUTIVE_ERRORS: u32 = 5;
const SUMMARY_PREVIEW_CHARS: usize = 200;

fn sse_event(kind: &str, data: Value) -> Event {
    let body = json!({
        "type": kind,
        "data": data,
        "timestamp": Utc::now().to_rfc3339(),
    });
    Event::default().event(kind).data(body.to_string())
}

struct SessionFeed {
    agent: Arc<dyn AgentService>,
    store: Arc<dyn ResultStore>,
    session_id: String,
    interval: Duration,
    polls: u32,
    consecutive_errors: u32,
    max_duration: Duration,
    started: Instant,
    seen_messages: usize,
    seen_thinking: usize,
    pending: VecDeque<Event>,
    finished: bool,
}

impl SessionFeed {
    async fn step(&mut self) {
        if self.polls > 0 {
            let pause = if self.consecutive_errors > 0 {
                self.interval * ERROR_BACKOFF_FACTOR
            } else {
                self.interval
            };
            tokio::time::sleep(pause).await;
        }
        if self.started.elapsed() >= self.max_duration {
            warn!(session_id = %self.session_id, polls = self.polls, "Session stream gave up on a running session");
            self.pending.push_back(sse_event(
                "timeout",
                json!({
                    "session_id": self.session_id,
                    "elapsed_secs": self.started.elapsed().as_secs(),
                }),
            ));
            self.finished = true;
            return;
        }
        self.polls += 1;

        match self.agent.fetch_session(&self.session_id).await {
            Ok(payload) => {
                self.consecutive_errors = 0;
                self.on_payload(&payload);
            }
            Err(e) => {
                self.consecutive_errors += 1;
                warn!(session_id = %self.session_id, error = %e, "Session stream fetch failed");
                if self.consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    self.pending.push_back(sse_event(
                        "fatal_error",
                        json!({"error": format!("{:#}", e), "session_id": self.session_id}),
                    ));
                    self.finished = true;
                } else {
                    self.pending.push_back(sse_event(
                        "error",
                        json!({"error": format!("{:#}", e), "session_id": self.session_id}),
                    ));
                }
            }
        }
    }

    fn on_payload(&mut self, payload: &Value) {
        let messages = entries(payload, "messages");
        for message in messages.iter().skip(self.seen_messages) {
            self.pending.push_back(sse_event("message", message.clone()));
        }
        self.seen_messages = self.seen_messages.max(messages.len());

        let thinking = entries(payload, "thinking_steps");
        for step in thinking.iter().skip(self.seen_thinking) {
            self.pending.push_back(sse_event("thinking", step.clone()));
        }
        self.seen_thinking = self.seen_thinking.max(thinking.len());

        let raw = raw_status(payload).to_string();
        let status = normalize(payload);
        let completed = status.is_terminal();
        self.pending.push_back(sse_event(
            "status",
            json!({
                "status": raw,
                "normalized": status,
                "message_count": messages.len(),
                "thinking_count": thinking.len(),
                "completed": completed,
            }),
        ));

        if !completed {
            return;
        }

        let mut data = json!({
            "session_id": self.session_id,
            "final_status": raw,
            "normalized": status,
            "total_messages": messages.len(),
        });
        if status == SessionStatus::Completed
            && let Some(updated) = self.refresh_cached_analysis(payload)
        {
            data["updated_analysis"] = json!({
                "summary": truncate_chars(&updated.summary, SUMMARY_PREVIEW_CHARS),
                "confidence": updated.confidence,
                "steps_count": updated.implementation_steps.len(),
            });
        }
        self.pending.push_back(sse_event("completed", data));
        info!(session_id = %self.session_id, status = %raw, "Session stream finished");
        self.finished = true;
    }

    /// Re-extract the cached analysis that came from this session, e.g. one
    /// that timed out before the agent finished.
    fn refresh_cached_analysis(&self, payload: &Value) -> Option<AnalysisResult> {
        let (_, entry) = self.store.entries().into_iter().find(|(_, entry)| {
            entry
                .analysis
                .as_ref()
                .and_then(|a| a.session_id.as_deref())
                == Some(self.session_id.as_str())
        })?;
        let issue = entry.issue?;
        let url = self.agent.session_url(&self.session_id);
        let updated = extract(payload, &issue).with_session(&self.session_id, &url);
        self.store.record_analysis(&issue, updated.clone());
        info!(issue = issue.number, session_id = %self.session_id, "Refreshed cached analysis from final session payload");
        Some(updated)
    }
}

fn entries<'a>(payload: &'a Value, key: &str) -> &'a [Value] {
    payload
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Event stream for `session_id`, polling every `interval` for at most
/// `max_duration`.
pub fn session_events(
    agent: Arc<dyn AgentService>,
    store: Arc<dyn ResultStore>,
    session_id: String,
    interval: Duration,
    max_duration: Duration,
) -> impl Stream<Item = Result<Event, Infallible>> {
    info!(session_id = %session_id, "Starting session stream");
    let feed = SessionFeed {
        agent,
        store,
        session_id,
        interval,
        polls: 0,
        consecutive_errors: 0,
        max_duration,
        started: Instant::now(),
        seen_messages: 0,
        seen_thinking: 0,
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(feed, |mut feed| async move {
        loop {
            if let Some(event) = feed.pending.pop_front() {
                return Some((Ok(event), feed));
            }
            if feed.finished {
                return None;
            }
            feed.step().await;
        }
    })
}
