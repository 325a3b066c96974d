//! Layered configuration for the issue assistant.
//!
//! Resolution order (later wins): built-in defaults → TOML file → process
//! environment (after `.env` is loaded) → CLI flags applied by the caller.
//!
//! # Configuration File Format
//!
//! ```toml
//! [github]
//! token = "ghp_..."
//! repo = "owner/name"
//! api_base = "https://api.github.com"
//!
//! [devin]
//! api_key = "..."
//! api_base = "https://api.devin.ai/v1"
//! app_base = "https://app.devin.ai"
//!
//! [server]
//! port = 8000
//! frontend_url = "http://localhost:5173"
//! ```

use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::agent::client::{DEVIN_API_BASE, DEVIN_APP_BASE};
use crate::github::client::GITHUB_API_BASE;

pub const DEFAULT_CONFIG_FILE: &str = "issue-assistant.toml";
const REDACTED: &str = "********";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubSection {
    #[serde(default)]
    pub token: Option<String>,
    /// Repository slug, `owner/name`.
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_github_api_base")]
    pub api_base: String,
}

fn default_github_api_base() -> String {
    GITHUB_API_BASE.to_string()
}

impl Default for GitHubSection {
    fn default() -> Self {
        Self {
            token: None,
            repo: None,
            api_base: default_github_api_base(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevinSection {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_devin_api_base")]
    pub api_base: String,
    /// Base of the browser-facing session links.
    #[serde(default = "default_devin_app_base")]
    pub app_base: String,
}

fn default_devin_api_base() -> String {
    DEVIN_API_BASE.to_string()
}

fn default_devin_app_base() -> String {
    DEVIN_APP_BASE.to_string()
}

impl Default for DevinSection {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: default_devin_api_base(),
            app_base: default_devin_app_base(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origin allowed by CORS in addition to the local dev origins.
    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
}

fn default_port() -> u16 {
    8000
}

fn default_frontend_url() -> String {
    "http://localhost:5173".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            frontend_url: default_frontend_url(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub github: GitHubSection,
    #[serde(default)]
    pub devin: DevinSection,
    #[serde(default)]
    pub server: ServerSection,
}

/// Which collaborators have credentials. Reported by the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigStatus {
    pub github_configured: bool,
    pub devin_configured: bool,
    pub repository: Option<String>,
}

impl ConfigStatus {
    pub fn is_healthy(&self) -> bool {
        self.github_configured && self.devin_configured
    }

    pub fn label(&self) -> &'static str {
        if self.is_healthy() { "healthy" } else { "misconfigured" }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Settings {
    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse issue-assistant config")
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// An explicit path must exist; otherwise `issue-assistant.toml` in the
    /// working directory is used when present.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Overlay environment variables. `lookup` is injected so tests need not
    /// touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| non_empty(lookup(key));

        if let Some(token) = var("GITHUB_TOKEN") {
            self.github.token = Some(token);
        }
        if let Some(repo) = var("GITHUB_REPO") {
            self.github.repo = Some(repo);
        }
        if let Some(base) = var("GITHUB_API_BASE") {
            self.github.api_base = base;
        }
        if let Some(key) = var("DEVIN_API_KEY") {
            self.devin.api_key = Some(key);
        }
        if let Some(base) = var("DEVIN_API_BASE") {
            self.devin.api_base = base;
        }
        if let Some(url) = var("FRONTEND_URL") {
            self.server.frontend_url = url;
        }
        if let Some(port) = var("BACKEND_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid BACKEND_PORT '{}'", port))?;
        }
        Ok(())
    }

    /// File, then `.env` and the process environment.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal
        let _ = dotenvy::dotenv();
        let mut settings = Self::load_or_default(path)?;
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Missing required settings, as human-readable entries.
    pub fn validate(&self) -> Vec<String> {
        let mut missing = Vec::new();
        if non_empty(self.github.token.clone()).is_none() {
            missing.push("github.token (GITHUB_TOKEN)".to_string());
        }
        match self.github.repo.as_deref() {
            None | Some("") => missing.push("github.repo (GITHUB_REPO)".to_string()),
            Some(repo) if !is_repo_slug(repo) => {
                missing.push(format!("github.repo must be 'owner/name', got '{}'", repo))
            }
            Some(_) => {}
        }
        if non_empty(self.devin.api_key.clone()).is_none() {
            missing.push("devin.api_key (DEVIN_API_KEY)".to_string());
        }
        missing
    }

    pub fn config_status(&self) -> ConfigStatus {
        ConfigStatus {
            github_configured: non_empty(self.github.token.clone()).is_some()
                && self.github.repo.as_deref().is_some_and(is_repo_slug),
            devin_configured: non_empty(self.devin.api_key.clone()).is_some(),
            repository: self.github.repo.clone(),
        }
    }

    /// Token and repository, or an error naming what is missing.
    pub fn github_credentials(&self) -> Result<(&str, &str)> {
        match (self.github.token.as_deref(), self.github.repo.as_deref()) {
            (Some(token), Some(repo)) if !token.is_empty() && is_repo_slug(repo) => Ok((token, repo)),
            _ => bail!("GitHub is not configured: set GITHUB_TOKEN and GITHUB_REPO (owner/name)"),
        }
    }

    pub fn devin_api_key(&self) -> Result<&str> {
        match self.devin.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("Devin is not configured: set DEVIN_API_KEY"),
        }
    }

    /// Copy with secrets masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.github.token.is_some() {
            copy.github.token = Some(REDACTED.to_string());
        }
        if copy.devin.api_key.is_some() {
            copy.devin.api_key = Some(REDACTED.to_string());
        }
        copy
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings")
    }
}

fn is_repo_slug(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}
