//! Agent-backed commands: `analyze`, `execute` and `session`.

use std::path::Path;

use anyhow::{Context, Result};
use issue_assistant::agent::client::{AgentService, DevinClient};
use issue_assistant::agent::models::{ExecutionResult, ExecutionStatus};
use issue_assistant::agent::orchestrator::Orchestrator;
use issue_assistant::agent::status::{normalize, raw_status};
use issue_assistant::config::Settings;
use issue_assistant::github::comment::format_analysis_comment;
use issue_assistant::github::Issue;
use issue_assistant::server::build_orchestrator;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Token cancelled on Ctrl+C so in-flight polling stops at the next sleep.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_signal.cancel(),
            Err(e) => warn!(error = %e, "Failed to install Ctrl+C handler"),
        }
    });
    token
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to serialize result")?);
    Ok(())
}

fn execution_report(execution: &ExecutionResult) -> String {
    let mut report = format!("Execution {}: {}\n", execution.status, execution.message);
    if let Some(url) = &execution.pr_url {
        report.push_str(&format!("Pull request: {}\n", url));
    }
    if let Some(url) = &execution.session_url {
        report.push_str(&format!("Session: {}\n", url));
    }
    if execution.status == ExecutionStatus::Unavailable {
        report.push_str("The agent could not be reached; nothing was changed.\n");
    }
    report
}

async fn load_issue(orchestrator: &Orchestrator, number: i64) -> Result<Issue> {
    orchestrator
        .tracker()
        .get_issue(number)
        .await?
        .with_context(|| format!("Issue #{} not found", number))
}

pub async fn cmd_analyze(
    config: Option<&Path>,
    number: i64,
    post_comment: bool,
    unified: bool,
    json: bool,
) -> Result<()> {
    let settings = Settings::resolve(config)?;
    let orchestrator = build_orchestrator(&settings, true)?;
    let issue = load_issue(&orchestrator, number).await?;
    let cancel = ctrl_c_token();

    if unified {
        let result = orchestrator.run_unified(&issue, post_comment, &cancel).await?;
        if json {
            return print_json(&result);
        }
        println!("{}", format_analysis_comment(&result.analysis));
        print!("{}", execution_report(&result.execution));
        return Ok(());
    }

    let analysis = orchestrator.run_analysis(&issue, post_comment, &cancel).await?;
    if json {
        return print_json(&analysis);
    }
    println!("{}", format_analysis_comment(&analysis));
    if let Some(note) = &analysis.note {
        println!("Note: {}", note);
    }
    Ok(())
}

pub async fn cmd_execute(config: Option<&Path>, number: i64, json: bool) -> Result<()> {
    let settings = Settings::resolve(config)?;
    let orchestrator = build_orchestrator(&settings, true)?;
    let issue = load_issue(&orchestrator, number).await?;

    let execution = orchestrator.run_execution(&issue, &ctrl_c_token()).await?;
    if json {
        return print_json(&execution);
    }
    print!("{}", execution_report(&execution));
    Ok(())
}

pub async fn cmd_session(config: Option<&Path>, id: &str) -> Result<()> {
    let settings = Settings::resolve(config)?;
    let client = DevinClient::new(
        &settings.devin.api_base,
        &settings.devin.app_base,
        settings.devin_api_key()?,
    )?;
    let payload = client.fetch_session(id).await?;
    println!("Session {}", id);
    println!("  status:   {} ({})", normalize(&payload), raw_status(&payload));
    println!("  url:      {}", client.session_url(id));
    let messages = payload
        .get("messages")
        .and_then(|m| m.as_array())
        .map_or(0, |m| m.len());
    println!("  messages: {}", messages);
    Ok(())
}
