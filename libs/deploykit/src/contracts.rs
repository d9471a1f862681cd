use std::collections::BTreeMap;

use crate::ansible::{Playbook, Vars};
use crate::context::{PipelineContext, PrometheusServer};
use crate::labels::LabelSet;
use crate::proxy::ReverseProxyEntry;
use crate::rules::RuleGroup;

/// Options handed to a module configuration when it builds its module.
#[derive(Debug, Clone, Default)]
pub struct ModuleOptions {
    /// Target group the module instance serves.
    pub target_group: String,
}

/// A service module instantiated for one target group.
///
/// The deployer calls the hooks in two phases. Phase 1 calls `get_targets`
/// and the side-artifact hooks for every group; phase 2 calls `host_vars`
/// and `playbook` once every group finished phase 1.
pub trait Module: Send + Sync {
    /// Projects the group's targets into the targets this module exposes.
    ///
    /// # Errors
    /// Returns an error when a target cannot be projected.
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>>;

    /// Builds the module's playbook. `None` means nothing to run.
    ///
    /// # Errors
    /// Returns an error when the playbook cannot be generated.
    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>>;

    /// Extra inventory variables for one host.
    ///
    /// # Errors
    /// Returns an error when the variables cannot be computed for `target`.
    fn host_vars(&self, _target: &LabelSet, _group: &str) -> anyhow::Result<Vars> {
        Ok(Vars::new())
    }

    fn get_rules(&self, _group: &str) -> Option<RuleGroup> {
        None
    }

    fn get_dashboards(&self) -> Vec<serde_json::Value> {
        Vec::new()
    }

    fn get_dashboard_files(&self) -> BTreeMap<String, Vec<u8>> {
        BTreeMap::new()
    }

    /// # Errors
    /// Returns an error when an entry cannot be derived from a target.
    fn reverse_proxy(
        &self,
        _targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<ReverseProxyEntry>> {
        Ok(Vec::new())
    }

    /// Prometheus servers this module runs on the group's hosts.
    ///
    /// Only consulted for the metrics backend group.
    ///
    /// # Errors
    /// Returns an error when a server address cannot be derived.
    fn prometheus_servers(
        &self,
        _targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<PrometheusServer>> {
        Ok(Vec::new())
    }
}
