use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{DiscoveredGroup, Discoverer};
use crate::labels::LabelSet;

/// Runs discovery backends concurrently and snapshots their output at a deadline.
pub struct FanIn {
    discoverers: Vec<Box<dyn Discoverer>>,
}

impl FanIn {
    #[must_use]
    pub fn new(discoverers: Vec<Box<dyn Discoverer>>) -> Self {
        Self { discoverers }
    }

    /// Collects targets until `wait` elapses or every backend has exited.
    ///
    /// Keeps the latest group per source, merges group labels under host
    /// labels and drops duplicate label sets. Backends that never reported
    /// contribute nothing.
    pub async fn collect(self, wait: Duration) -> Vec<LabelSet> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<DiscoveredGroup>>();
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();
        let backends = self.discoverers.len();
        for discoverer in self.discoverers {
            tasks.spawn(discoverer.run(cancel.child_token(), tx.clone()));
        }
        drop(tx);

        tracing::info!(
            backends,
            wait = %crate::duration::format(wait),
            "Waiting for service discovery"
        );

        let mut latest: BTreeMap<String, DiscoveredGroup> = BTreeMap::new();
        let deadline = tokio::time::sleep(wait);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => {
                    tracing::debug!("discovery deadline reached");
                    break;
                }
                batch = rx.recv() => {
                    let Some(groups) = batch else {
                        tracing::debug!("all discovery backends finished");
                        break;
                    };
                    for group in groups {
                        latest.insert(group.source.clone(), group);
                    }
                }
            }
        }

        cancel.cancel();
        tasks.abort_all();

        let mut seen = HashSet::new();
        let mut targets = Vec::new();
        for group in latest.values() {
            for labels in group.merged_targets() {
                if seen.insert(labels.clone()) {
                    targets.push(labels);
                }
            }
        }
        tracing::info!(targets = targets.len(), sources = latest.len(), "Discovery done");
        targets
    }
}
