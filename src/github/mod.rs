//! GitHub issue-tracker collaborator.
//!
//! The core only ever reads issues and posts comments; both go through the
//! [`IssueTracker`] seam so tests can substitute an in-memory double.

pub mod client;
pub mod comment;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};

pub use client::GitHubClient;

/// A GitHub issue (subset of fields).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Label names. GitHub sends label objects; bare strings are accepted too.
    #[serde(default, deserialize_with = "deserialize_labels")]
    pub labels: Vec<String>,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub html_url: Option<String>,
    /// Pull requests also come through the issues endpoint; filter them out.
    #[serde(default, skip_serializing)]
    pub pull_request: Option<serde_json::Value>,
}

fn default_state() -> String {
    "open".to_string()
}

impl Issue {
    pub fn new(number: i64, title: &str) -> Self {
        Self {
            number,
            title: title.to_string(),
            body: None,
            labels: Vec::new(),
            state: default_state(),
            html_url: None,
            pull_request: None,
        }
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLabel {
    Name(String),
    Object { name: String },
}

fn deserialize_labels<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<RawLabel>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|label| match label {
            RawLabel::Name(name) | RawLabel::Object { name } => name,
        })
        .collect())
}

/// Which issues to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    #[default]
    Open,
    Closed,
    All,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
            Self::All => "all",
        }
    }
}

impl std::str::FromStr for IssueState {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(Self::Open),
            "closed" => Ok(Self::Closed),
            "all" => Ok(Self::All),
            _ => anyhow::bail!("Invalid issue state '{}'. Valid values: open, closed, all", s),
        }
    }
}

/// Abstraction over the issue tracker for testability.
/// Real implementation: `GitHubClient`.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// List issues, newest first, with pull requests filtered out.
    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>>;

    /// Fetch one issue. `Ok(None)` when the tracker has no such issue.
    async fn get_issue(&self, number: i64) -> Result<Option<Issue>>;

    /// Post a markdown comment and return the new comment's id.
    async fn post_comment(&self, number: i64, body: &str) -> Result<i64>;
}
