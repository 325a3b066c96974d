//! Label-based stand-in analysis for when the agent cannot provide one.

use crate::github::Issue;

use super::models::{AnalysisResult, Complexity, FallbackReason};

/// Steps used whenever no implementation plan could be recovered.
pub const GENERIC_IMPLEMENTATION_STEPS: [&str; 6] = [
    "Analyze the issue requirements",
    "Locate the relevant code",
    "Implement the changes",
    "Write or update tests",
    "Verify the fix",
    "Update documentation",
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heuristic {
    pub confidence: f64,
    pub complexity: Complexity,
}

/// Label rules, first match wins.
const RULES: &[(&[&str], f64, Complexity)] = &[
    (&["bug", "fix"], 0.75, Complexity::Low),
    (&["feature", "enhancement"], 0.60, Complexity::Medium),
    (&["documentation", "docs"], 0.85, Complexity::Low),
];

const DEFAULT_HEURISTIC: Heuristic = Heuristic {
    confidence: 0.65,
    complexity: Complexity::Medium,
};

/// Estimate confidence and complexity from issue labels alone.
pub fn heuristic<S: AsRef<str>>(labels: &[S]) -> Heuristic {
    let lowered: Vec<String> = labels.iter().map(|l| l.as_ref().to_lowercase()).collect();
    RULES
        .iter()
        .find(|(needles, _, _)| {
            lowered
                .iter()
                .any(|label| needles.iter().any(|needle| label.contains(needle)))
        })
        .map(|&(_, confidence, complexity)| Heuristic {
            confidence,
            complexity,
        })
        .unwrap_or(DEFAULT_HEURISTIC)
}

pub fn generic_steps() -> Vec<String> {
    GENERIC_IMPLEMENTATION_STEPS.iter().map(|s| s.to_string()).collect()
}

/// Summary used when neither the agent nor the text patterns produced one.
pub fn placeholder_summary(issue: &Issue) -> String {
    let kind = issue.labels.first().map(String::as_str).unwrap_or("general");
    format!(
        "Issue #{} (\"{}\") appears to be a {} issue that requires investigation and implementation.",
        issue.number, issue.title, kind
    )
}

/// A complete, invariant-respecting analysis built without agent output.
pub fn fallback_analysis(issue: &Issue, reason: FallbackReason) -> AnalysisResult {
    let Heuristic {
        confidence,
        complexity,
    } = heuristic(&issue.labels);
    let mut result = AnalysisResult {
        summary: placeholder_summary(issue),
        confidence,
        implementation_steps: generic_steps(),
        complexity: Some(complexity),
        ..AnalysisResult::default()
    };
    result.mark_fallback(reason);
    result
}
