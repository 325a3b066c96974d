use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use super::{Issue, IssueState, IssueTracker};

pub const GITHUB_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "issue-assistant";
const ISSUES_PER_PAGE: u32 = 30;

/// Response from the create-comment endpoint (subset of fields).
#[derive(Debug, Deserialize)]
struct CreatedComment {
    id: i64,
}

/// REST client for one GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
    repo: String,
    token: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, repo: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            repo: repo.to_string(),
            token: token.to_string(),
        }
    }

    pub fn repo(&self) -> &str {
        &self.repo
    }

    fn issues_url(&self) -> String {
        format!("{}/repos/{}/issues", self.api_base, self.repo)
    }

    fn issue_url(&self, number: i64) -> String {
        format!("{}/{}", self.issues_url(), number)
    }

    fn comments_url(&self, number: i64) -> String {
        format!("{}/comments", self.issue_url(number))
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
    }
}

#[async_trait]
impl IssueTracker for GitHubClient {
    async fn list_issues(&self, state: IssueState) -> Result<Vec<Issue>> {
        info!(repo = %self.repo, state = state.as_str(), "Fetching issues");
        let per_page = ISSUES_PER_PAGE.to_string();
        let issues: Vec<Issue> = self
            .get(&self.issues_url())
            .query(&[
                ("state", state.as_str()),
                ("per_page", per_page.as_str()),
                ("sort", "created"),
                ("direction", "desc"),
            ])
            .send()
            .await
            .context("Failed to send issues request to GitHub")?
            .error_for_status()
            .context("GitHub issues API returned error status")?
            .json()
            .await
            .context("Failed to parse issues response from GitHub")?;

        // Filter out pull requests (they have a pull_request key)
        let issues: Vec<Issue> = issues.into_iter().filter(|i| !i.is_pull_request()).collect();
        info!(repo = %self.repo, count = issues.len(), "Fetched issues");
        Ok(issues)
    }

    async fn get_issue(&self, number: i64) -> Result<Option<Issue>> {
        debug!(repo = %self.repo, issue = number, "Fetching issue");
        let resp = self
            .get(&self.issue_url(number))
            .send()
            .await
            .with_context(|| format!("Failed to send request for issue #{}", number))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let issue = resp
            .error_for_status()
            .with_context(|| format!("GitHub returned error status for issue #{}", number))?
            .json::<Issue>()
            .await
            .with_context(|| format!("Failed to parse issue #{} from GitHub", number))?;
        Ok(Some(issue))
    }

    async fn post_comment(&self, number: i64, body: &str) -> Result<i64> {
        info!(repo = %self.repo, issue = number, "Posting comment");
        let created: CreatedComment = self
            .http
            .post(self.comments_url(number))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT)
            .json(&serde_json::json!({ "body": body }))
            .send()
            .await
            .with_context(|| format!("Failed to post comment to issue #{}", number))?
            .error_for_status()
            .with_context(|| format!("GitHub rejected comment on issue #{}", number))?
            .json()
            .await
            .context("Failed to parse comment response from GitHub")?;
        Ok(created.id)
    }
}
