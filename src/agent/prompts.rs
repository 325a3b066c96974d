//! Prompt templates for each session kind.

use crate::github::Issue;

use super::models::AnalysisResult;

const RESPONSE_SCHEMA: &str = r#"```json
{
  "summary": "one or two sentences describing what needs to be done",
  "confidence": 0.0,
  "implementation_steps": ["step 1", "step 2"],
  "complexity": "low | medium | high | very_high",
  "potential_challenges": ["challenge"],
  "success_criteria": ["criterion"]
}
```"#;

fn issue_block(issue: &Issue) -> String {
    let body = issue
        .body
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or("No description provided");
    let labels = if issue.labels.is_empty() {
        "None".to_string()
    } else {
        issue.labels.join(", ")
    };
    format!(
        "GitHub Issue #{}:\nTitle: {}\n\nDescription:\n{}\n\nLabels: {}",
        issue.number, issue.title, body, labels
    )
}

pub fn analysis_prompt(issue: &Issue) -> String {
    format!(
        "Analyze this GitHub issue and provide:\n\
         1. A brief summary of what needs to be done\n\
         2. A confidence score (0.0 to 1.0) indicating how feasible this is to solve\n\
         3. A step-by-step implementation plan\n\n\
         {}\n\n\
         Do not change any code. Respond with a single JSON object in this format:\n{}",
        issue_block(issue),
        RESPONSE_SCHEMA
    )
}

/// Implementation prompt. Embeds the earlier plan when one is known.
pub fn execution_prompt(issue: &Issue, repo: &str, analysis: Option<&AnalysisResult>) -> String {
    let plan = match analysis {
        Some(a) if !a.implementation_steps.is_empty() => a
            .implementation_steps
            .iter()
            .enumerate()
            .map(|(i, step)| format!("{}. {}", i + 1, step))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => "No prior plan available; investigate the issue first.".to_string(),
    };
    format!(
        "Implement the proposed fix for GitHub issue #{} in repository {}.\n\n\
         {}\n\n\
         Implementation Plan:\n{}\n\n\
         Please implement this solution and create a pull request with the changes. \
         Include proper commit messages and a PR description that references issue #{}.",
        issue.number,
        repo,
        issue_block(issue),
        plan,
        issue.number
    )
}

/// Analysis and implementation in one session.
pub fn unified_prompt(issue: &Issue, repo: &str) -> String {
    format!(
        "Analyze and then fix this GitHub issue in repository {}.\n\n\
         {}\n\n\
         First, analyze the issue and respond with a single JSON object in this format:\n{}\n\n\
         Then implement the fix and open a pull request that references issue #{}. \
         Include the pull request URL in your final message.",
        repo,
        issue_block(issue),
        RESPONSE_SCHEMA,
        issue.number
    )
}
