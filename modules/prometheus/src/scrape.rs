use std::collections::BTreeMap;

use deploykit::LabelSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeConfig {
    pub job_name: String,
    pub metrics_path: String,
    pub scheme: String,
    pub static_configs: Vec<StaticConfig>,
}

/// One job per module; targets with the same visible labels share a static config.
///
/// Meta labels are dropped and targets without an address are skipped.
#[must_use]
pub fn scrape_configs(
    targets: &BTreeMap<String, BTreeMap<String, Vec<LabelSet>>>,
) -> Vec<ScrapeConfig> {
    let mut jobs: BTreeMap<&str, BTreeMap<BTreeMap<String, String>, Vec<String>>> =
        BTreeMap::new();
    for (group, modules) in targets {
        for (module, labels) in modules {
            let job = jobs.entry(module.as_str()).or_default();
            for target in labels {
                let Some(address) = target.address() else {
                    tracing::warn!(group = %group, module = %module, labels = %target, "Skipping scrape target without address");
                    continue;
                };
                let visible = target
                    .visible()
                    .map(|(name, value)| (name.to_owned(), value.to_owned()))
                    .collect();
                let addresses = job.entry(visible).or_default();
                if !addresses.iter().any(|a| a == address) {
                    addresses.push(address.to_owned());
                }
            }
        }
    }

    jobs.into_iter()
        .filter(|(_, configs)| !configs.is_empty())
        .map(|(job, configs)| ScrapeConfig {
            job_name: job.to_owned(),
            metrics_path: "/metrics".to_owned(),
            scheme: "http".to_owned(),
            static_configs: configs
                .into_iter()
                .map(|(labels, targets)| StaticConfig { targets, labels })
                .collect(),
        })
        .collect()
}
