//! `issue-assistant serve`.

use std::path::Path;

use anyhow::Result;
use issue_assistant::config::Settings;
use issue_assistant::server;

pub async fn cmd_serve(config: Option<&Path>, port: Option<u16>) -> Result<()> {
    let mut settings = Settings::resolve(config)?;
    if let Some(port) = port {
        settings.server.port = port;
    }
    server::start_server(settings).await
}
