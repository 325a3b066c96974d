//! In-process doubles for the agent, issue-tracker and clock seams.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::agent::client::{AgentService, CreateSessionRequest};
use crate::agent::poller::Clock;
use crate::github::{Issue, IssueState, IssueTracker};

/// A clock that only moves when slept on (or advanced by hand).
#[derive(Debug)]
pub struct FakeClock {
    base: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.base + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

/// Agent double that replays a script of session payloads. The last payload
/// repeats once the script runs out.
pub struct ScriptedAgent {
    create_response: Result<Value, String>,
    script: Mutex<VecDeque<Value>>,
    last: Mutex<Value>,
    fetches: AtomicUsize,
    created: Mutex<Vec<CreateSessionRequest>>,
    clock: Option<(Arc<FakeClock>, Duration)>,
    hang_after: Option<usize>,
}

impl ScriptedAgent {
    pub fn new(script: Vec<Value>) -> Self {
        Self {
            create_response: Ok(json!({"session_id": "devin-1"})),
            script: Mutex::new(script.into()),
            last: Mutex::new(json!({"status": "running"})),
            fetches: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
            clock: None,
            hang_after: None,
        }
    }

    pub fn with_create_response(mut self, response: Value) -> Self {
        self.create_response = Ok(response);
        self
    }

    pub fn failing_create(mut self, message: &str) -> Self {
        self.create_response = Err(message.to_string());
        self
    }

    /// Each fetch advances `clock` by `cost`.
    pub fn with_fetch_cost(mut self, clock: Arc<FakeClock>, cost: Duration) -> Self {
        self.clock = Some((clock, cost));
        self
    }

    /// Fetches after the first `answered` never resolve.
    pub fn hanging_after(mut self, answered: usize) -> Self {
        self.hang_after = Some(answered);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<CreateSessionRequest> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentService for ScriptedAgent {
    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Value> {
        self.created.lock().unwrap().push(request.clone());
        match &self.create_response {
            Ok(response) => Ok(response.clone()),
            Err(message) => bail!("{}", message),
        }
    }

    async fn fetch_session(&self, _session_id: &str) -> Result<Value> {
        let previous = self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.hang_after.is_some_and(|answered| previous >= answered) {
            std::future::pending::<()>().await;
        }
        if let Some((clock, cost)) = &self.clock {
            clock.advance(*cost);
        }
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("https://app.devin.ai/sessions/{}", session_id)
    }
}

/// Issue tracker backed by a fixed list of issues; records posted comments.
#[derive(Default)]
pub struct MemoryTracker {
    issues: Vec<Issue>,
    comments: Mutex<Vec<(i64, String)>>,
    reject_comments: bool,
}

impl MemoryTracker {
    pub fn new(issues: Vec<Issue>) -> Self {
        Self {
            issues,
            ..Self::default()
        }
    }

    pub fn rejecting_comments(mut self) -> Self {
        self.reject_comments = true;
        self
    }

    pub fn comments(&self) -> Vec<(i64, String)> {
        self.comments.lock().unwrap().clone()
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>> {
        Ok(self
            .issues
            .iter()
            .filter(|i| state == IssueState::All || i.state == state.as_str())
            .cloned()
            .collect())
    }

    async fn get_issue(&self, number: i64) -> Result<Option<Issue>> {
        Ok(self.issues.iter().find(|i| i.number == number).cloned())
    }

    async fn post_comment(&self, number: i64, body: &str) -> Result<i64> {
        if self.reject_comments {
            bail!("403 Forbidden");
        }
        let mut comments = self.comments.lock().unwrap();
        comments.push((number, body.to_string()));
        Ok(comments.len() as i64)
    }
}
