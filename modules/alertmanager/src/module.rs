use anyhow::Context;
use deploykit::ansible::Vars;
use deploykit::labels::join_host_port;
use deploykit::proxy::{replace_host, reverse_proxy_address, reverse_proxy_entries};
use deploykit::targets::project_targets;
use deploykit::{LabelSet, Module, PipelineContext, Playbook, ReverseProxyEntry, RuleGroup};
use serde_json::{Value, json};

use crate::config::AlertmanagerConfig;
use crate::rules;

const PROXY_NAME: &str = "alertmanager";
const PROXY_PREFIX: &str = "/alertmanager";
const EXTERNAL_ADDRESS_VAR: &str = "o11y_alertmanager_external_address";

pub struct AlertmanagerModule {
    config: AlertmanagerConfig,
}

impl AlertmanagerModule {
    #[must_use]
    pub fn new(config: AlertmanagerConfig) -> Self {
        Self { config }
    }
}

impl Module for AlertmanagerModule {
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(project_targets(targets, self.config.listen_port, group)?)
    }

    fn playbook(&self, _ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let email_configs: Vec<Value> = self
            .config
            .receivers
            .iter()
            .map(|to| json!({ "to": to }))
            .collect();

        Ok(Some(
            Playbook::new("Alertmanager")
                .privileged()
                .var(
                    "alertmanager_receivers",
                    json!([{ "name": "email", "email_configs": email_configs }]),
                )
                .var(
                    "alertmanager_route",
                    json!({
                        "group_by": ["alertname"],
                        "group_wait": "30s",
                        "group_interval": "5m",
                        "repeat_interval": "3h",
                        "receiver": "email",
                    }),
                )
                .var(
                    "alertmanager_smtp",
                    json!({
                        "from": self.config.smtp_from,
                        "smarthost": self.config.smtp_smarthost,
                    }),
                )
                .var(
                    "alertmanager_web_external_url",
                    format!("{{{{{EXTERNAL_ADDRESS_VAR}}}}}"),
                )
                .var(
                    "alertmanager_web_listen_address",
                    join_host_port(&self.config.listen_address, self.config.listen_port),
                )
                .role("alertmanager"),
        ))
    }

    fn host_vars(&self, target: &LabelSet, _group: &str) -> anyhow::Result<Vars> {
        let address = reverse_proxy_address(target, PROXY_NAME, PROXY_PREFIX)?;
        Ok(Vars::from([(
            EXTERNAL_ADDRESS_VAR.to_owned(),
            Value::from(address),
        )]))
    }

    fn get_rules(&self, group: &str) -> Option<RuleGroup> {
        Some(rules::rule_group(group))
    }

    fn reverse_proxy(
        &self,
        targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<ReverseProxyEntry>> {
        let entries =
            reverse_proxy_entries(targets, self.config.listen_port, PROXY_NAME, PROXY_PREFIX)
                .context("could not get reverse proxy entries")?;
        if self.config.is_local() {
            return replace_host(entries, &self.config.listen_address)
                .context("could not point reverse proxy entries at the local address");
        }
        Ok(entries)
    }
}
