use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::static_sd::StaticConfig;
use super::{DiscoveredGroup, Discoverer, DiscoveryError, GroupSender};
use crate::labels::LabelSet;

/// Label carrying the file a target was read from.
pub const FILEPATH_LABEL: &str = "__meta_filepath";

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_mins(5);

/// Targets read from YAML or JSON files matching glob patterns.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSdConfig {
    pub files: Vec<String>,
    #[serde(with = "crate::duration")]
    pub refresh_interval: Duration,
}

impl Default for FileSdConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

impl FileSdConfig {
    pub(crate) fn set_directory(&mut self, dir: &Path) {
        for pattern in &mut self.files {
            if Path::new(pattern.as_str()).is_relative() {
                *pattern = dir.join(pattern.as_str()).to_string_lossy().into_owned();
            }
        }
    }
}

/// Re-reads matching files every refresh interval until cancelled.
pub struct FileDiscoverer {
    patterns: Vec<String>,
    interval: Duration,
    // Sources sent in the previous refresh, cleared when their file disappears.
    last_sources: BTreeSet<String>,
}

impl FileDiscoverer {
    /// # Errors
    /// Returns [`DiscoveryError::InvalidPattern`] for a malformed glob.
    pub fn new(cfg: &FileSdConfig) -> Result<Self, DiscoveryError> {
        for pattern in &cfg.files {
            glob::Pattern::new(pattern).map_err(|source| DiscoveryError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        }
        if cfg.refresh_interval.is_zero() {
            return Err(DiscoveryError::ZeroRefreshInterval);
        }
        Ok(Self {
            patterns: cfg.files.clone(),
            interval: cfg.refresh_interval,
            last_sources: BTreeSet::new(),
        })
    }

    async fn refresh(&mut self) -> Vec<DiscoveredGroup> {
        let mut groups = Vec::new();
        for path in self.matching_files().await {
            match read_file(&path).await {
                Ok(configs) => {
                    let file = path.to_string_lossy().into_owned();
                    for (i, cfg) in configs.iter().enumerate() {
                        let mut group = cfg.to_group(format!("{file}:{i}"));
                        group.labels = group
                            .labels
                            .builder()
                            .set(FILEPATH_LABEL, file.as_str())
                            .build();
                        groups.push(group);
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read file_sd file");
                }
            }
        }

        let current: BTreeSet<String> = groups.iter().map(|g| g.source.clone()).collect();
        for stale in self.last_sources.difference(&current) {
            groups.push(DiscoveredGroup {
                source: stale.clone(),
                targets: Vec::new(),
                labels: LabelSet::new(),
            });
        }
        self.last_sources = current;
        groups
    }

    async fn matching_files(&self) -> Vec<PathBuf> {
        let patterns = self.patterns.clone();
        let listed = tokio::task::spawn_blocking(move || {
            let mut paths = BTreeSet::new();
            for pattern in &patterns {
                let Ok(entries) = glob::glob(pattern) else {
                    continue;
                };
                for entry in entries {
                    match entry {
                        Ok(path) => {
                            paths.insert(path);
                        }
                        Err(e) => tracing::warn!(error = %e, "Failed to list file_sd path"),
                    }
                }
            }
            paths
        })
        .await;

        match listed {
            Ok(paths) => paths.into_iter().collect(),
            Err(e) => {
                tracing::warn!(error = %e, "file_sd listing task failed");
                Vec::new()
            }
        }
    }
}

async fn read_file(path: &Path) -> anyhow::Result<Vec<StaticConfig>> {
    let content = tokio::fs::read_to_string(path).await?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let configs = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_saphyr::from_str(&content)?
    };
    Ok(configs)
}

#[async_trait]
impl Discoverer for FileDiscoverer {
    async fn run(self: Box<Self>, cancel: CancellationToken, tx: GroupSender) {
        let mut this = self;
        loop {
            let groups = this.refresh().await;
            tracing::debug!(groups = groups.len(), "file_sd refreshed");
            if tx.send(groups).is_err() {
                return;
            }
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(this.interval) => {}
            }
        }
    }
}
