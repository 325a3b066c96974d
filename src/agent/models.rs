use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::status::{SessionStatus, normalize};

/// What a remote session was created to do. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Analysis,
    Execution,
    Unified,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Execution => "execution",
            Self::Unified => "unified",
        }
    }

    /// Poll cadence and total wait budget for this kind of session.
    pub fn timing(&self) -> TimingPolicy {
        match self {
            Self::Analysis => TimingPolicy::new(Duration::from_secs(5), Duration::from_secs(300)),
            Self::Execution => TimingPolicy::new(Duration::from_secs(5), Duration::from_secs(600)),
            Self::Unified => TimingPolicy::new(Duration::from_secs(10), Duration::from_secs(900)),
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl TimingPolicy {
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self { interval, max_wait }
    }
}

/// One remote agent invocation.
///
/// Status only changes through [`Session::observe`], which runs the raw
/// payload through the status normalizer. Once the session reaches a
/// terminal status, further observations are ignored.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub kind: SessionKind,
    status: SessionStatus,
    raw_payload: Option<serde_json::Value>,
}

impl Session {
    pub fn new(id: &str, kind: SessionKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            status: SessionStatus::Running,
            raw_payload: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn raw_payload(&self) -> Option<&serde_json::Value> {
        self.raw_payload.as_ref()
    }

    /// Record a freshly fetched payload and return the resulting status.
    pub fn observe(&mut self, payload: serde_json::Value) -> SessionStatus {
        if self.status.is_terminal() {
            return self.status;
        }
        self.status = normalize(&payload);
        self.raw_payload = Some(payload);
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::VeryHigh => "very_high",
        }
    }

    /// Lenient parse of agent-written complexity words ("Very High",
    /// "very-high", "moderate", ...).
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        match normalized.trim_matches('_') {
            "low" | "simple" | "easy" | "trivial" => Some(Self::Low),
            "medium" | "moderate" => Some(Self::Medium),
            "high" | "hard" | "complex" => Some(Self::High),
            "very_high" | "veryhigh" | "very__high" | "critical" => Some(Self::VeryHigh),
            _ => None,
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a result had to be generated locally instead of from agent output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    SessionTimeout,
    AgentSessionFailed,
    ParseExhausted,
}

impl FallbackReason {
    pub fn note(&self) -> &'static str {
        match self {
            Self::SessionTimeout => {
                "The Devin session timed out before finishing; this is a heuristic analysis. \
                 Check the session link for live progress."
            }
            Self::AgentSessionFailed => {
                "The Devin agent reported failure for this session; this is a heuristic analysis."
            }
            Self::ParseExhausted => {
                "The Devin agent output could not be parsed into a structured analysis; \
                 missing fields were filled in heuristically."
            }
        }
    }
}

/// Normalized analysis of one issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary: String,
    /// Always within [0.0, 1.0].
    pub confidence: f64,
    #[serde(default)]
    pub implementation_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub potential_challenges: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub is_fallback: bool,
    /// Non-empty whenever `is_fallback` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    /// Head of the agent's raw text, kept for debugging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_excerpt: Option<String>,
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            summary: String::new(),
            confidence: 0.0,
            implementation_steps: Vec::new(),
            complexity: None,
            potential_challenges: Vec::new(),
            success_criteria: Vec::new(),
            is_fallback: false,
            note: None,
            session_id: None,
            session_url: None,
            raw_excerpt: None,
        }
    }
}

impl AnalysisResult {
    /// Mark as locally generated. The reason's note is kept ahead of any
    /// note already present.
    pub fn mark_fallback(&mut self, reason: FallbackReason) {
        self.is_fallback = true;
        self.note = Some(match self.note.take() {
            Some(existing) if !existing.is_empty() && existing != reason.note() => {
                format!("{} {}", reason.note(), existing)
            }
            _ => reason.note().to_string(),
        });
    }

    pub fn with_session(mut self, session_id: &str, session_url: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self.session_url = Some(session_url.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    TimedOut,
    /// The agent service could not be reached at all.
    Unavailable,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResult {
    pub analysis: AnalysisResult,
    pub execution: ExecutionResult,
}
