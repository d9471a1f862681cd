use deploykit::targets::project_targets;
use deploykit::{LabelSet, Module, PipelineContext, Playbook, RuleGroup};

use crate::config::LinuxConfig;
use crate::{dashboard, rules};

pub struct LinuxModule {
    config: LinuxConfig,
}

impl LinuxModule {
    #[must_use]
    pub fn new(config: LinuxConfig) -> Self {
        Self { config }
    }
}

impl Module for LinuxModule {
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>> {
        if !self.config.enable_exporter {
            return Ok(Vec::new());
        }
        Ok(project_targets(
            targets,
            self.config.node_exporter_port,
            group,
        )?)
    }

    fn playbook(&self, _ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        if !self.config.enable_exporter {
            return Ok(None);
        }
        Ok(Some(
            Playbook::new("Linux")
                .privileged()
                .var(
                    "node_exporter_version",
                    self.config.node_exporter_version.as_str(),
                )
                .var(
                    "node_exporter_web_listen_address",
                    format!("0.0.0.0:{}", self.config.node_exporter_port),
                )
                .role("node_exporter"),
        ))
    }

    fn get_rules(&self, group: &str) -> Option<RuleGroup> {
        Some(rules::rule_group(group))
    }

    fn get_dashboards(&self) -> Vec<serde_json::Value> {
        if self.config.enable_exporter {
            vec![dashboard::node_dashboard()]
        } else {
            Vec::new()
        }
    }
}
