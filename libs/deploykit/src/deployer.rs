//! Two-phase deployment pipeline.
//!
//! Phase 1 walks every target group in document order: discovery, relabeling,
//! then each enabled module projects its targets and contributes rules,
//! dashboards and reverse proxy entries to the [`PipelineContext`].
//!
//! Phase 2 walks the groups again: it builds the group inventory, lets modules
//! add host variables, collects playbooks against the now complete context and
//! hands them to the [`Runner`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::ansible::{Inventory, Playbook};
use crate::config::{ConfigError, DeployConfig, TargetGroup};
use crate::context::PipelineContext;
use crate::contracts::{Module, ModuleOptions};
use crate::discovery::{DiscoveryError, FanIn};
use crate::inventory::build_inventory;
use crate::labels::LabelSet;
use crate::relabel::{self, RelabelError};
use crate::runner::{RunReport, RunRequest, Runner, RunnerError};

#[derive(thiserror::Error, Debug)]
pub enum DeployError {
    #[error("configuration must have at least one target group")]
    NoTargetGroups,
    #[error("invalid configuration: {0}")]
    Config(#[source] ConfigError),
    #[error("target group '{group}': discovery failed: {source}")]
    Discovery {
        group: String,
        #[source]
        source: DiscoveryError,
    },
    #[error("target group '{group}': relabeling failed: {source}")]
    Relabel {
        group: String,
        #[source]
        source: RelabelError,
    },
    #[error("target group '{group}': module '{module}' failed to start: {source}")]
    ModuleInit {
        group: String,
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("target group '{group}': module '{module}' failed to produce targets: {source}")]
    Targets {
        group: String,
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("target group '{group}': module '{module}' failed to produce a playbook: {source}")]
    Playbook {
        group: String,
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("target group '{group}': module '{module}' failed to list Prometheus servers: {source}")]
    PrometheusServers {
        group: String,
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("target group '{group}': module '{module}' failed to produce host variables: {source}")]
    HostVars {
        group: String,
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("runner failed for target group(s): {}", GroupList(.failures))]
    Runner { failures: Vec<RunnerFailure> },
}

#[derive(Debug)]
pub struct RunnerFailure {
    pub group: String,
    pub source: RunnerError,
}

struct GroupList<'a>(&'a [RunnerFailure]);

impl fmt::Display for GroupList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} ({})", failure.group, failure.source)?;
        }
        Ok(())
    }
}

/// What the runner did for one group.
#[derive(Debug)]
pub struct GroupReport {
    pub group: String,
    pub hosts: usize,
    pub playbooks: usize,
    /// `None` when the group had no playbooks and the runner was skipped.
    pub report: Option<RunReport>,
}

#[derive(Debug)]
pub struct DeployReport {
    pub context: PipelineContext,
    pub groups: Vec<GroupReport>,
}

pub struct Deployer {
    config: DeployConfig,
    runner: Arc<dyn Runner>,
}

impl Deployer {
    /// # Errors
    /// Returns [`DeployError::NoTargetGroups`] or [`DeployError::Config`] for an invalid configuration.
    pub fn new(config: DeployConfig, runner: Arc<dyn Runner>) -> Result<Self, DeployError> {
        validate(&config)?;
        Ok(Self { config, runner })
    }

    #[must_use]
    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Runs both phases over every target group.
    ///
    /// # Errors
    /// Phase 1 and playbook generation errors abort the run. Runner failures are
    /// collected and reported together once every group has been attempted.
    pub async fn run(&self) -> Result<DeployReport, DeployError> {
        validate(&self.config)?;
        let mut ctx = PipelineContext::new(self.config.global.data_directory.clone());

        tracing::info!(groups = self.config.target_groups.len(), "Phase: targets");
        let mut resolved = Vec::with_capacity(self.config.target_groups.len());
        for group in &self.config.target_groups {
            let targets = self.discover(group).await?;
            collect_artifacts(group, &targets, &mut ctx)?;
            resolved.push((group, targets));
        }

        tracing::info!("Phase: playbooks");
        let mut reports = Vec::with_capacity(resolved.len());
        let mut failures = Vec::new();
        for (group, targets) in &resolved {
            let modules = instantiate(group)?;
            let inventory = self.inventory_for(group, targets, &modules)?;

            if group.name == self.config.global.metrics_backend_group {
                let mut servers = Vec::new();
                for (name, module) in &modules {
                    servers.extend(module.prometheus_servers(targets, &group.name).map_err(
                        |source| DeployError::PrometheusServers {
                            group: group.name.clone(),
                            module: *name,
                            source,
                        },
                    )?);
                }
                tracing::info!(group = %group.name, servers = servers.len(), "Prometheus servers recorded");
                ctx.set_prometheus_servers(servers);
            }

            let playbooks = playbooks_for(group, &modules, &ctx)?;
            let hosts = inventory.host_names().count();
            if playbooks.is_empty() {
                tracing::info!(group = %group.name, "No playbooks, skipping runner");
                reports.push(GroupReport {
                    group: group.name.clone(),
                    hosts,
                    playbooks: 0,
                    report: None,
                });
                continue;
            }

            tracing::info!(
                group = %group.name,
                hosts,
                playbooks = playbooks.len(),
                "Running playbooks"
            );
            let request = RunRequest {
                target_group: &group.name,
                inventory: &inventory,
                playbooks: &playbooks,
            };
            match self.runner.run(request).await {
                Ok(report) => reports.push(GroupReport {
                    group: group.name.clone(),
                    hosts,
                    playbooks: playbooks.len(),
                    report: Some(report),
                }),
                Err(source) => {
                    tracing::error!(group = %group.name, error = %source, "Runner failed");
                    failures.push(RunnerFailure {
                        group: group.name.clone(),
                        source,
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(DeployError::Runner { failures });
        }
        tracing::info!("Deployment done");
        Ok(DeployReport {
            context: ctx,
            groups: reports,
        })
    }

    async fn discover(&self, group: &TargetGroup) -> Result<Vec<LabelSet>, DeployError> {
        let discoverers =
            group
                .targets
                .discoverers()
                .map_err(|source| DeployError::Discovery {
                    group: group.name.clone(),
                    source,
                })?;
        let discovered = FanIn::new(discoverers)
            .collect(self.config.global.sd_sync_time)
            .await;

        let mut targets = Vec::with_capacity(discovered.len());
        for labels in &discovered {
            let relabeled = relabel::process(labels, &group.targets.relabel_configs).map_err(
                |source| DeployError::Relabel {
                    group: group.name.clone(),
                    source,
                },
            )?;
            if let Some(labels) = relabeled {
                targets.push(labels);
            }
        }
        tracing::info!(
            group = %group.name,
            discovered = discovered.len(),
            kept = targets.len(),
            "Targets resolved"
        );
        Ok(targets)
    }

    fn inventory_for(
        &self,
        group: &TargetGroup,
        targets: &[LabelSet],
        modules: &[(&'static str, Box<dyn Module>)],
    ) -> Result<Inventory, DeployError> {
        let mut inventory = build_inventory(targets);
        let all = inventory.all_mut();
        // The last label set per address is the one the inventory kept.
        let mut winners: BTreeMap<&str, &LabelSet> = BTreeMap::new();
        for target in targets {
            if let Some(address) = target.address() {
                winners.insert(address, target);
            }
        }
        for (address, target) in winners {
            for (name, module) in modules {
                let vars = module
                    .host_vars(target, &group.name)
                    .map_err(|source| DeployError::HostVars {
                        group: group.name.clone(),
                        module: *name,
                        source,
                    })?;
                if let Some(host) = all.hosts.get_mut(address) {
                    host.vars.extend(vars);
                }
            }
        }
        tracing::debug!(
            group = %group.name,
            data_dir = %self.config.global.data_directory.display(),
            "Inventory built"
        );
        Ok(inventory)
    }
}

fn validate(config: &DeployConfig) -> Result<(), DeployError> {
    config.validate().map_err(|e| match e {
        ConfigError::NoTargetGroups => DeployError::NoTargetGroups,
        other => DeployError::Config(other),
    })
}

fn instantiate(group: &TargetGroup) -> Result<Vec<(&'static str, Box<dyn Module>)>, DeployError> {
    let opts = ModuleOptions {
        target_group: group.name.clone(),
    };
    group
        .modules
        .enabled()
        .map(|config| {
            let module = config
                .new_module(&opts)
                .map_err(|source| DeployError::ModuleInit {
                    group: group.name.clone(),
                    module: config.name(),
                    source,
                })?;
            Ok((config.name(), module))
        })
        .collect()
}

fn collect_artifacts(
    group: &TargetGroup,
    targets: &[LabelSet],
    ctx: &mut PipelineContext,
) -> Result<(), DeployError> {
    for (name, module) in instantiate(group)? {
        tracing::debug!(group = %group.name, module = name, "Collecting module targets");
        let projected =
            module
                .get_targets(targets, &group.name)
                .map_err(|source| DeployError::Targets {
                    group: group.name.clone(),
                    module: name,
                    source,
                })?;
        ctx.add_targets(&group.name, name, projected);

        if let Some(rules) = module.get_rules(&group.name) {
            ctx.add_rule_group(&group.name, rules);
        }
        ctx.add_dashboards(module.get_dashboards());
        ctx.add_dashboard_files(module.get_dashboard_files());
        let entries = module
            .reverse_proxy(targets, &group.name)
            .map_err(|source| DeployError::Targets {
                group: group.name.clone(),
                module: name,
                source,
            })?;
        ctx.add_reverse_proxy_entries(entries);
    }
    Ok(())
}

fn playbooks_for(
    group: &TargetGroup,
    modules: &[(&'static str, Box<dyn Module>)],
    ctx: &PipelineContext,
) -> Result<Vec<Playbook>, DeployError> {
    let mut playbooks = Vec::new();
    for (name, module) in modules {
        let playbook = module
            .playbook(ctx)
            .map_err(|source| DeployError::Playbook {
                group: group.name.clone(),
                module: *name,
                source,
            })?;
        if let Some(playbook) = playbook {
            playbooks.push(playbook);
        } else {
            tracing::debug!(group = %group.name, module = *name, "Module has no playbook");
        }
    }
    Ok(playbooks)
}
