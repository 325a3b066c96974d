//! CLI command implementations.
//!
//! | Module    | Commands handled                 |
//! |-----------|----------------------------------|
//! | `serve`   | `Serve`                          |
//! | `issues`  | `Issues`                         |
//! | `agent`   | `Analyze`, `Execute`, `Session`  |
//! | `config`  | `Config`                         |

pub mod agent;
pub mod config;
pub mod issues;
pub mod serve;

pub use agent::{cmd_analyze, cmd_execute, cmd_session};
pub use config::cmd_config;
pub use issues::cmd_issues;
pub use serve::cmd_serve;
