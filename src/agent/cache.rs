//! Process-wide result cache, keyed by issue number.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::github::Issue;

use super::models::{AnalysisResult, ExecutionResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub issue: Option<Issue>,
    pub analysis: Option<AnalysisResult>,
    pub execution: Option<ExecutionResult>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    fn empty() -> Self {
        Self {
            issue: None,
            analysis: None,
            execution: None,
            updated_at: Utc::now(),
        }
    }
}

/// Storage seam for analysis/execution results. Writes are last-write-wins.
pub trait ResultStore: Send + Sync {
    fn get(&self, number: i64) -> Option<CacheEntry>;

    fn set(&self, number: i64, entry: CacheEntry);

    /// Issue numbers with an entry, ascending.
    fn keys(&self) -> Vec<i64>;

    fn record_analysis(&self, issue: &Issue, analysis: AnalysisResult) {
        let mut entry = self.get(issue.number).unwrap_or_else(CacheEntry::empty);
        entry.issue = Some(issue.clone());
        entry.analysis = Some(analysis);
        entry.updated_at = Utc::now();
        self.set(issue.number, entry);
    }

    fn record_execution(&self, issue: &Issue, execution: ExecutionResult) {
        let mut entry = self.get(issue.number).unwrap_or_else(CacheEntry::empty);
        entry.issue = Some(issue.clone());
        entry.execution = Some(execution);
        entry.updated_at = Utc::now();
        self.set(issue.number, entry);
    }

    /// All entries, ordered by issue number.
    fn entries(&self) -> Vec<(i64, CacheEntry)> {
        self.keys()
            .into_iter()
            .filter_map(|n| self.get(n).map(|entry| (n, entry)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<i64, CacheEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// A poisoned lock still holds consistent data: every write is a single insert.
impl ResultStore for InMemoryStore {
    fn get(&self, number: i64) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&number).cloned()
    }

    fn set(&self, number: i64, entry: CacheEntry) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(number, entry);
    }

    fn keys(&self) -> Vec<i64> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<i64> = entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }
}
