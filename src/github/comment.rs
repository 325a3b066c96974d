//! Markdown rendering of results for issue comments.

use crate::agent::models::AnalysisResult;

/// Render an analysis as a GitHub comment. Output depends only on the input.
pub fn format_analysis_comment(analysis: &AnalysisResult) -> String {
    let confidence_pct = (analysis.confidence * 100.0).round() as u32;
    let mut comment = format!(
        "**Devin AI Analysis**\n\n**Summary:** {}\n\n**Confidence Score:** {}%\n",
        analysis.summary, confidence_pct
    );

    if let Some(complexity) = analysis.complexity {
        comment.push_str(&format!("\n**Complexity:** {}\n", complexity));
    }

    comment.push_str("\n**Proposed Implementation Steps:**\n");
    for (i, step) in analysis.implementation_steps.iter().enumerate() {
        comment.push_str(&format!("\n{}. {}", i + 1, step));
    }

    push_list(&mut comment, "Potential Challenges", &analysis.potential_challenges);
    push_list(&mut comment, "Success Criteria", &analysis.success_criteria);

    if let Some(url) = &analysis.session_url {
        comment.push_str(&format!("\n\n[View Devin session]({})", url));
    }

    comment.push_str("\n\n---\n*This analysis was generated automatically by Devin AI*");
    comment
}

fn push_list(comment: &mut String, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    comment.push_str(&format!("\n\n**{}:**\n", title));
    for item in items {
        comment.push_str(&format!("\n- {}", item));
    }
}
