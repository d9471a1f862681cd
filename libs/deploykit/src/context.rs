//! State shared between modules during one deployer run.
//!
//! Phase 1 fills targets, rules, dashboards and reverse proxy entries for every
//! target group. Phase 2 reads them while generating playbooks. The Prometheus
//! server list only appears once the metrics backend group reaches phase 2, so
//! groups processed earlier see it as absent.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::labels::LabelSet;
use crate::proxy::ReverseProxyEntry;
use crate::rules::RuleGroup;

/// A Prometheus server reachable by the dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrometheusServer {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Default)]
pub struct PipelineContext {
    data_dir: PathBuf,
    targets: BTreeMap<String, BTreeMap<String, Vec<LabelSet>>>,
    rule_groups: BTreeMap<String, Vec<RuleGroup>>,
    dashboards: Vec<serde_json::Value>,
    dashboard_files: BTreeMap<String, Vec<u8>>,
    reverse_proxy_entries: Vec<ReverseProxyEntry>,
    prometheus_servers: Option<Vec<PrometheusServer>>,
}

impl PipelineContext {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Appends targets produced by `module` for `group`.
    pub fn add_targets(&mut self, group: &str, module: &str, targets: Vec<LabelSet>) {
        self.targets
            .entry(group.to_owned())
            .or_default()
            .entry(module.to_owned())
            .or_default()
            .extend(targets);
    }

    /// Targets per group, then per module.
    #[must_use]
    pub fn targets(&self) -> &BTreeMap<String, BTreeMap<String, Vec<LabelSet>>> {
        &self.targets
    }

    pub fn add_rule_group(&mut self, group: &str, rules: RuleGroup) {
        self.rule_groups
            .entry(group.to_owned())
            .or_default()
            .push(rules);
    }

    #[must_use]
    pub fn rule_groups(&self) -> &BTreeMap<String, Vec<RuleGroup>> {
        &self.rule_groups
    }

    pub fn add_dashboards(&mut self, dashboards: impl IntoIterator<Item = serde_json::Value>) {
        self.dashboards.extend(dashboards);
    }

    #[must_use]
    pub fn dashboards(&self) -> &[serde_json::Value] {
        &self.dashboards
    }

    /// Merges dashboard files; a later file with the same name replaces the earlier one.
    pub fn add_dashboard_files(&mut self, files: BTreeMap<String, Vec<u8>>) {
        self.dashboard_files.extend(files);
    }

    #[must_use]
    pub fn dashboard_files(&self) -> &BTreeMap<String, Vec<u8>> {
        &self.dashboard_files
    }

    pub fn add_reverse_proxy_entries(
        &mut self,
        entries: impl IntoIterator<Item = ReverseProxyEntry>,
    ) {
        self.reverse_proxy_entries.extend(entries);
    }

    #[must_use]
    pub fn reverse_proxy_entries(&self) -> &[ReverseProxyEntry] {
        &self.reverse_proxy_entries
    }

    pub fn set_prometheus_servers(&mut self, servers: Vec<PrometheusServer>) {
        self.prometheus_servers = Some(servers);
    }

    /// `None` until the metrics backend group has been reached in phase 2.
    #[must_use]
    pub fn prometheus_servers(&self) -> Option<&[PrometheusServer]> {
        self.prometheus_servers.as_deref()
    }
}
