//! Target discovery: backends and the time-bounded fan-in that merges them.

mod fan_in;
mod file_sd;
mod static_sd;

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::labels::LabelSet;
use crate::relabel::RelabelConfig;

pub use fan_in::FanIn;
pub use file_sd::{FileDiscoverer, FileSdConfig};
pub use static_sd::{StaticConfig, StaticDiscoverer};

#[derive(thiserror::Error, Debug)]
pub enum DiscoveryError {
    #[error("no discovery sources configured")]
    NoSources,
    #[error("invalid file_sd pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("file_sd refresh_interval must be greater than zero")]
    ZeroRefreshInterval,
}

/// A batch of targets sharing group-level labels, tagged with the source that produced it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiscoveredGroup {
    pub source: String,
    pub targets: Vec<LabelSet>,
    pub labels: LabelSet,
}

impl DiscoveredGroup {
    /// Target label sets with the group labels merged underneath.
    pub fn merged_targets(&self) -> impl Iterator<Item = LabelSet> + '_ {
        self.targets.iter().map(|t| t.merged_over(&self.labels))
    }
}

pub type GroupSender = mpsc::UnboundedSender<Vec<DiscoveredGroup>>;

/// A discovery backend.
///
/// Backends send full snapshots of the groups they own. A later snapshot for
/// the same `source` replaces the earlier one; an empty target list clears it.
#[async_trait]
pub trait Discoverer: Send {
    async fn run(self: Box<Self>, cancel: CancellationToken, tx: GroupSender);
}

/// The `targets` section of a target group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TargetsConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub static_configs: Vec<StaticConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_sd_configs: Vec<FileSdConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub relabel_configs: Vec<RelabelConfig>,
}

impl TargetsConfig {
    /// Starts one backend per configured source.
    ///
    /// # Errors
    /// Returns [`DiscoveryError::NoSources`] when nothing is configured, or the
    /// first backend that fails to start.
    pub fn discoverers(&self) -> Result<Vec<Box<dyn Discoverer>>, DiscoveryError> {
        if self.static_configs.is_empty() && self.file_sd_configs.is_empty() {
            return Err(DiscoveryError::NoSources);
        }

        let mut discoverers: Vec<Box<dyn Discoverer>> = Vec::new();
        if !self.static_configs.is_empty() {
            discoverers.push(Box::new(StaticDiscoverer::new(&self.static_configs)));
        }
        for cfg in &self.file_sd_configs {
            discoverers.push(Box::new(FileDiscoverer::new(cfg)?));
        }
        Ok(discoverers)
    }

    /// Resolves relative file patterns against `dir`.
    pub fn set_directory(&mut self, dir: &Path) {
        for cfg in &mut self.file_sd_configs {
            cfg.set_directory(dir);
        }
    }
}
