//! Issue listing, `issue-assistant issues`.

use std::path::Path;

use anyhow::Result;
use issue_assistant::config::Settings;
use issue_assistant::github::{GitHubClient, Issue, IssueState, IssueTracker};
use issue_assistant::util::truncate_chars;

const TITLE_WIDTH: usize = 60;

fn issue_line(issue: &Issue) -> String {
    let labels = if issue.labels.is_empty() {
        String::new()
    } else {
        format!("  [{}]", issue.labels.join(", "))
    };
    format!(
        "#{:<6} {:<8} {}{}",
        issue.number,
        issue.state,
        truncate_chars(&issue.title, TITLE_WIDTH),
        labels
    )
}

pub async fn cmd_issues(config: Option<&Path>, state: &str) -> Result<()> {
    let state: IssueState = state.parse()?;
    let settings = Settings::resolve(config)?;
    let (token, repo) = settings.github_credentials()?;
    let client = GitHubClient::new(&settings.github.api_base, repo, token);

    let issues = client.list_issues(state).await?;
    if issues.is_empty() {
        println!("No {} issues in {}", state.as_str(), repo);
        return Ok(());
    }
    println!("{} {} issue(s) in {}:", issues.len(), state.as_str(), repo);
    for issue in &issues {
        println!("  {}", issue_line(issue));
    }
    Ok(())
}
