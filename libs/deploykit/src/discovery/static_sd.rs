use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{DiscoveredGroup, Discoverer, GroupSender};
use crate::labels::{ADDRESS_LABEL, LabelSet};

/// A fixed list of addresses with shared labels.
///
/// The same shape is used for the entries of file-based discovery files.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl StaticConfig {
    pub(crate) fn to_group(&self, source: String) -> DiscoveredGroup {
        DiscoveredGroup {
            source,
            targets: self
                .targets
                .iter()
                .map(|addr| LabelSet::from([(ADDRESS_LABEL, addr.as_str())]))
                .collect(),
            labels: self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect(),
        }
    }
}

/// Emits every static config once and exits.
pub struct StaticDiscoverer {
    groups: Vec<DiscoveredGroup>,
}

impl StaticDiscoverer {
    #[must_use]
    pub fn new(configs: &[StaticConfig]) -> Self {
        let groups = configs
            .iter()
            .enumerate()
            .map(|(i, cfg)| cfg.to_group(format!("static:{i}")))
            .collect();
        Self { groups }
    }
}

#[async_trait]
impl Discoverer for StaticDiscoverer {
    async fn run(self: Box<Self>, _cancel: CancellationToken, tx: GroupSender) {
        if tx.send(self.groups).is_err() {
            tracing::debug!("fan-in closed before static targets were sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn sends_one_batch_with_indexed_sources() {
        let configs = vec![
            StaticConfig {
                targets: vec!["10.0.0.1:22".to_owned(), "10.0.0.2:22".to_owned()],
                labels: BTreeMap::from([("env".to_owned(), "prod".to_owned())]),
            },
            StaticConfig {
                targets: vec!["10.0.0.3:22".to_owned()],
                labels: BTreeMap::new(),
            },
        ];
        let (tx, mut rx) = mpsc::unbounded_channel();
        Box::new(StaticDiscoverer::new(&configs))
            .run(CancellationToken::new(), tx)
            .await;

        let batch = rx.recv().await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].source, "static:0");
        assert_eq!(batch[0].targets.len(), 2);
        assert_eq!(batch[0].labels.get("env"), Some("prod"));
        assert_eq!(batch[1].source, "static:1");
        assert!(rx.recv().await.is_none());
    }
}
