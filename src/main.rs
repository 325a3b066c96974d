use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use issue_assistant::logging::{self, LogOptions};

mod cmd;

#[derive(Parser)]
#[command(name = "issue-assistant")]
#[command(version, about = "Triage and fix GitHub issues with the Devin agent")]
pub struct Cli {
    /// Path to a TOML config file (defaults to ./issue-assistant.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Port to listen on (overrides config and BACKEND_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// List repository issues
    Issues {
        /// open, closed or all
        #[arg(long, default_value = "open")]
        state: String,
    },
    /// Analyze an issue and report a plan with a confidence score
    Analyze {
        number: i64,

        /// Do not post the analysis as an issue comment
        #[arg(long)]
        no_comment: bool,

        /// Analyze and implement in a single agent session
        #[arg(long)]
        unified: bool,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Implement a previously analyzed issue
    Execute {
        number: i64,

        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the current state of an agent session
    Session { id: String },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone, Copy)]
pub enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show,
    /// Report missing or invalid settings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogOptions {
        verbose: cli.verbose,
        json: cli.log_json,
    })?;

    let config = cli.config.as_deref();
    match &cli.command {
        Commands::Serve { port } => cmd::cmd_serve(config, *port).await?,
        Commands::Issues { state } => cmd::cmd_issues(config, state).await?,
        Commands::Analyze {
            number,
            no_comment,
            unified,
            json,
        } => cmd::cmd_analyze(config, *number, !*no_comment, *unified, *json).await?,
        Commands::Execute { number, json } => cmd::cmd_execute(config, *number, *json).await?,
        Commands::Session { id } => cmd::cmd_session(config, id).await?,
        Commands::Config { command } => cmd::cmd_config(config, *command)?,
    }

    Ok(())
}
