//! Issue assistant: triage GitHub issues with the Devin coding agent.
//!
//! The [`agent`] module drives analysis and implementation sessions;
//! [`server`] exposes them over HTTP and [`github`] talks to the issue
//! tracker.

pub mod agent;
pub mod config;
pub mod errors;
pub mod github;
pub mod logging;
pub mod server;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;
