use deploykit::duration;
use deploykit::labels::{join_host_port, split_host_port};
use deploykit::targets::{project_targets, require_address};
use deploykit::{LabelSet, Module, PipelineContext, Playbook, PrometheusServer, RuleGroup};
use serde_json::json;

use crate::config::PrometheusConfig;
use crate::rules;
use crate::scrape::scrape_configs;

/// Module whose targets Prometheus forwards alerts to.
const ALERTMANAGER_MODULE: &str = "alertmanager";

pub struct PrometheusModule {
    config: PrometheusConfig,
}

impl PrometheusModule {
    #[must_use]
    pub fn new(config: PrometheusConfig) -> Self {
        Self { config }
    }

    fn alertmanager_targets(ctx: &PipelineContext) -> Vec<String> {
        let mut addresses: Vec<String> = ctx
            .targets()
            .values()
            .filter_map(|modules| modules.get(ALERTMANAGER_MODULE))
            .flatten()
            .filter_map(LabelSet::address)
            .map(str::to_owned)
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }
}

impl Module for PrometheusModule {
    /// Prometheus scrapes itself on its listen port.
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(project_targets(targets, self.config.port, group)?)
    }

    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let jobs = scrape_configs(ctx.targets());
        let groups: Vec<&RuleGroup> = ctx.rule_groups().values().flatten().collect();
        tracing::info!(
            jobs = jobs.len(),
            rule_groups = groups.len(),
            "Prometheus configuration assembled"
        );

        let mut playbook = Playbook::new("Prometheus")
            .privileged()
            .var(
                "prometheus_version",
                self.config.prometheus_version.as_str(),
            )
            .var(
                "prometheus_web_listen_address",
                join_host_port(&self.config.listen_address, self.config.port),
            )
            .var(
                "prometheus_global",
                json!({
                    "scrape_interval": duration::format(self.config.scrape_interval),
                    "scrape_timeout": duration::format(self.config.scrape_timeout),
                    "evaluation_interval": duration::format(self.config.evaluation_interval),
                }),
            )
            .var(
                "prometheus_storage_retention",
                duration::format(self.config.retention),
            )
            .var("prometheus_scrape_configs", serde_json::to_value(&jobs)?)
            .var(
                "prometheus_rule_groups",
                json!({ "groups": serde_json::to_value(&groups)? }),
            )
            .role("prometheus");

        let alertmanagers = Self::alertmanager_targets(ctx);
        if !alertmanagers.is_empty() {
            playbook = playbook.var(
                "prometheus_alertmanager_config",
                json!([{ "static_configs": [{ "targets": alertmanagers }] }]),
            );
        }
        Ok(Some(playbook))
    }

    fn get_rules(&self, group: &str) -> Option<RuleGroup> {
        Some(rules::rule_group(group))
    }

    fn prometheus_servers(
        &self,
        targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<PrometheusServer>> {
        targets
            .iter()
            .map(|target| -> anyhow::Result<PrometheusServer> {
                let (host, _) = split_host_port(require_address(target)?);
                Ok(PrometheusServer {
                    name: format!("prometheus on {host}"),
                    url: format!("http://{}", join_host_port(host, self.config.port)),
                })
            })
            .collect()
    }
}
