//! HTTP surface: JSON API plus a Server-Sent Events session feed.

pub mod api;
pub mod stream;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderValue;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};

use crate::agent::cache::InMemoryStore;
use crate::agent::client::DevinClient;
use crate::agent::orchestrator::Orchestrator;
use crate::config::Settings;
use crate::github::client::GitHubClient;

use self::api::AppState;

const DEV_ORIGINS: &[&str] = &[
    "http://localhost:5173",
    "http://127.0.0.1:5173",
    "http://localhost:3000",
];

/// Wire the GitHub and Devin clients into an orchestrator.
///
/// With `strict` unset, missing credentials are logged and left empty so the
/// server can still start and report itself as misconfigured.
pub fn build_orchestrator(settings: &Settings, strict: bool) -> Result<Orchestrator> {
    let (token, repo) = match settings.github_credentials() {
        Ok(credentials) => credentials,
        Err(e) if !strict => {
            warn!(error = %e, "Starting without GitHub credentials");
            (
                settings.github.token.as_deref().unwrap_or_default(),
                settings.github.repo.as_deref().unwrap_or_default(),
            )
        }
        Err(e) => return Err(e),
    };
    let api_key = match settings.devin_api_key() {
        Ok(key) => key,
        Err(e) if !strict => {
            warn!(error = %e, "Starting without a Devin API key");
            ""
        }
        Err(e) => return Err(e),
    };

    let tracker = Arc::new(GitHubClient::new(&settings.github.api_base, repo, token));
    let agent = Arc::new(DevinClient::new(
        &settings.devin.api_base,
        &settings.devin.app_base,
        api_key,
    )?);
    Ok(Orchestrator::new(agent, tracker, Arc::new(InMemoryStore::new()), repo))
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let mut origins: Vec<HeaderValue> = Vec::new();
    for origin in std::iter::once(frontend_url).chain(DEV_ORIGINS.iter().copied()) {
        match HeaderValue::from_str(origin.trim_end_matches('/')) {
            Ok(value) if !origins.contains(&value) => origins.push(value),
            Ok(_) => {}
            Err(_) => warn!(origin, "Ignoring invalid CORS origin"),
        }
    }
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

pub fn build_router(state: Arc<AppState>, frontend_url: &str) -> Router {
    api::api_router()
        .with_state(state)
        .layer(cors_layer(frontend_url))
}

pub async fn start_server(settings: Settings) -> Result<()> {
    let orchestrator = build_orchestrator(&settings, false)?;
    let status = settings.config_status();
    if !status.is_healthy() {
        warn!(missing = ?settings.validate(), "Configuration incomplete; API calls will fail");
    }
    let state = Arc::new(AppState::new(orchestrator, status));
    let app = build_router(state, &settings.server.frontend_url);

    let addr = format!("0.0.0.0:{}", settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(%local_addr, frontend = %settings.server.frontend_url, "Issue assistant API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}
