//! Boundary to the provisioning engine that applies playbooks.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::ansible::{Inventory, Playbook};

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("no playbooks to run")]
    NoPlaybooks,
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to render {what}: {message}")]
    Render { what: &'static str, message: String },
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },
}

/// Everything the runner needs for one target group.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub target_group: &'a str,
    pub inventory: &'a Inventory,
    pub playbooks: &'a [Playbook],
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Combined output of the engine.
    pub output: String,
}

#[async_trait]
pub trait Runner: Send + Sync {
    /// Applies the playbooks to the inventory hosts.
    ///
    /// # Errors
    /// Returns a [`RunnerError`] when the engine cannot be started or reports failure.
    async fn run(&self, request: RunRequest<'_>) -> Result<RunReport, RunnerError>;
}
