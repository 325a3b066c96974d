//! Remote coding-agent sessions.
//!
//! The flow for one request:
//!
//! ```text
//! Orchestrator ──create──▶ AgentService
//!      │
//!      ▼
//!   Poller ──fetch──▶ AgentService      (status via status::normalize)
//!      │
//!      ▼
//!   extract ──▶ AnalysisResult          (heuristic fills the gaps)
//!      │
//!      ▼
//!  ResultStore / IssueTracker comment
//! ```
//!
//! Everything that talks to the network sits behind the `AgentService` and
//! `IssueTracker` traits; time sits behind `poller::Clock`.

pub mod cache;
pub mod client;
pub mod extract;
pub mod heuristic;
pub mod models;
pub mod orchestrator;
pub mod poller;
pub mod prompts;
pub mod status;

pub use cache::{CacheEntry, InMemoryStore, ResultStore};
pub use client::{AgentService, CreateSessionRequest, DevinClient};
pub use models::{
    AnalysisResult, Complexity, ExecutionResult, ExecutionStatus, FallbackReason, Session,
    SessionKind, UnifiedResult,
};
pub use orchestrator::Orchestrator;
pub use poller::{Clock, PollOutcome, Poller, TokioClock};
pub use status::SessionStatus;
