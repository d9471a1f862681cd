#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Pipeline tests with in-test modules and a recording runner.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use deploykit::labels::split_host_port;
use deploykit::{
    ADDRESS_LABEL, DeployConfig, DeployError, Deployer, LabelSet, Module, ModuleOptions,
    ModuleRegistry, Playbook, PipelineContext, PrometheusServer, RunReport, RunRequest, Runner,
    RunnerError, RuleGroup, ServiceConfig, Vars,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

// --- test modules -----------------------------------------------------------

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct ExporterConfig {
    enabled: bool,
}

struct Exporter;

impl Module for Exporter {
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(deploykit::targets::project_targets(targets, 9100, group)?)
    }

    fn playbook(&self, _ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        Ok(Some(Playbook::new("Exporter").role("exporter")))
    }

    fn host_vars(&self, target: &LabelSet, _group: &str) -> anyhow::Result<Vars> {
        let mut vars = Vars::from([(
            "exporter_address".to_owned(),
            json!(target.address().unwrap_or_default()),
        )]);
        for (name, _) in target.visible() {
            vars.insert(format!("seen_{name}"), json!(true));
        }
        Ok(vars)
    }

    fn get_rules(&self, group: &str) -> Option<RuleGroup> {
        Some(RuleGroup::new(format!("{group}-exporter"), vec![]))
    }

    fn get_dashboards(&self) -> Vec<serde_json::Value> {
        vec![json!({"title": "Exporter"})]
    }
}

impl ServiceConfig for ExporterConfig {
    const NAME: &'static str = "exporter";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, _opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(Exporter))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct BackendConfig {
    enabled: bool,
    fail_servers: bool,
}

struct Backend {
    fail_servers: bool,
}

impl Module for Backend {
    fn get_targets(&self, _targets: &[LabelSet], _group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(Vec::new())
    }

    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let jobs: Vec<_> = ctx
            .targets()
            .iter()
            .flat_map(|(group, modules)| modules.keys().map(move |m| format!("{group}/{m}")))
            .collect();
        Ok(Some(Playbook::new("Backend").var("jobs", json!(jobs))))
    }

    fn prometheus_servers(
        &self,
        targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<PrometheusServer>> {
        if self.fail_servers {
            anyhow::bail!("no listen address");
        }
        Ok(targets
            .iter()
            .filter_map(LabelSet::address)
            .map(|addr| {
                let (host, _) = split_host_port(addr);
                PrometheusServer {
                    name: host.to_owned(),
                    url: format!("http://{host}:9090"),
                }
            })
            .collect())
    }
}

impl ServiceConfig for BackendConfig {
    const NAME: &'static str = "backend";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, _opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(Backend {
            fail_servers: self.fail_servers,
        }))
    }
}

/// Records what it saw of the Prometheus server list.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct DashboardsConfig {
    enabled: bool,
}

struct Dashboards;

impl Module for Dashboards {
    fn get_targets(&self, _targets: &[LabelSet], _group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(Vec::new())
    }

    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let datasources: Vec<_> = ctx
            .prometheus_servers()
            .unwrap_or_default()
            .iter()
            .map(|s| s.url.clone())
            .collect();
        Ok(Some(
            Playbook::new("Dashboards")
                .var("datasources", json!(datasources))
                .var("dashboards", ctx.dashboards().len()),
        ))
    }
}

impl ServiceConfig for DashboardsConfig {
    const NAME: &'static str = "dashboards";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, _opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(Dashboards))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, deny_unknown_fields)]
struct BrokenConfig {
    enabled: bool,
}

struct Broken;

impl Module for Broken {
    fn get_targets(&self, _targets: &[LabelSet], _group: &str) -> anyhow::Result<Vec<LabelSet>> {
        anyhow::bail!("cannot project")
    }

    fn playbook(&self, _ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        Ok(None)
    }
}

impl ServiceConfig for BrokenConfig {
    const NAME: &'static str = "broken";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, _opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        Ok(Box::new(Broken))
    }
}

// --- runner -------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Recorded {
    group: String,
    hosts: Vec<String>,
    host_vars: BTreeMap<String, Vars>,
    playbooks: Vec<Playbook>,
}

#[derive(Default)]
struct RecordingRunner {
    runs: Mutex<Vec<Recorded>>,
    fail_groups: Vec<String>,
}

impl RecordingRunner {
    fn failing(groups: &[&str]) -> Self {
        Self {
            fail_groups: groups.iter().map(|g| (*g).to_owned()).collect(),
            ..Self::default()
        }
    }

    fn runs(&self) -> Vec<Recorded> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Runner for RecordingRunner {
    async fn run(&self, request: RunRequest<'_>) -> Result<RunReport, RunnerError> {
        let all = request.inventory.all().cloned().unwrap_or_default();
        self.runs.lock().unwrap().push(Recorded {
            group: request.target_group.to_owned(),
            hosts: all.hosts.keys().cloned().collect(),
            host_vars: all.hosts.into_iter().map(|(k, h)| (k, h.vars)).collect(),
            playbooks: request.playbooks.to_vec(),
        });
        if self.fail_groups.iter().any(|g| g == request.target_group) {
            return Err(RunnerError::Failed {
                program: "ansible-playbook".to_owned(),
                status: "exit status: 2".to_owned(),
                output: String::new(),
            });
        }
        Ok(RunReport {
            output: format!("ok {}", request.target_group),
        })
    }
}

// --- helpers ------------------------------------------------------------------

fn registry() -> ModuleRegistry {
    let mut builder = ModuleRegistry::builder();
    builder
        .register::<ExporterConfig>()
        .unwrap()
        .register::<BackendConfig>()
        .unwrap()
        .register::<DashboardsConfig>()
        .unwrap()
        .register::<BrokenConfig>()
        .unwrap();
    builder.build()
}

fn config(yaml: &str) -> DeployConfig {
    DeployConfig::from_yaml(yaml, &registry()).unwrap()
}

async fn deploy(
    yaml: &str,
    runner: Arc<RecordingRunner>,
) -> Result<deploykit::DeployReport, DeployError> {
    Deployer::new(config(yaml), runner)?.run().await
}

// --- tests --------------------------------------------------------------------

#[tokio::test]
async fn projects_targets_onto_module_port() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: prometheus
    targets:
      static_configs:
        - targets: ['10.0.0.1:9100', '10.0.0.2:9100']
    modules:
      exporter_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    let report = deploy(yaml, runner.clone()).await.unwrap();

    let projected = &report.context.targets()["prometheus"]["exporter"];
    assert_eq!(
        projected,
        &vec![
            LabelSet::from([(ADDRESS_LABEL, "10.0.0.1:9100"), ("group_name", "prometheus")]),
            LabelSet::from([(ADDRESS_LABEL, "10.0.0.2:9100"), ("group_name", "prometheus")]),
        ]
    );
    assert_eq!(report.context.rule_groups()["prometheus"][0].name, "prometheus-exporter");
    assert_eq!(report.context.dashboards().len(), 1);

    let runs = runner.runs();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].hosts, vec!["10.0.0.1:9100", "10.0.0.2:9100"]);
    assert_eq!(
        runs[0].host_vars["10.0.0.1:9100"]["exporter_address"],
        json!("10.0.0.1:9100")
    );
}

#[tokio::test]
async fn metrics_servers_are_absent_for_earlier_groups() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: grafana
    targets:
      static_configs: [{ targets: ['10.0.0.9:22'] }]
    modules:
      dashboards_module: { enabled: true }
  - name: prometheus
    targets:
      static_configs: [{ targets: ['10.0.0.1:22'] }]
    modules:
      backend_module: { enabled: true }
  - name: late
    targets:
      static_configs: [{ targets: ['10.0.0.5:22'] }]
    modules:
      dashboards_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    let report = deploy(yaml, runner.clone()).await.unwrap();

    let runs = runner.runs();
    let datasources = |group: &str| {
        runs.iter()
            .find(|r| r.group == group)
            .unwrap()
            .playbooks[0]
            .vars["datasources"]
            .clone()
    };
    assert_eq!(datasources("grafana"), json!([]));
    assert_eq!(datasources("late"), json!(["http://10.0.0.1:9090"]));
    assert_eq!(report.context.prometheus_servers().unwrap().len(), 1);
}

#[tokio::test]
async fn playbooks_see_targets_of_every_group() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: prometheus
    targets:
      static_configs: [{ targets: ['10.0.0.1:22'] }]
    modules:
      backend_module: { enabled: true }
  - name: web
    targets:
      static_configs: [{ targets: ['10.0.0.2:22'] }]
    modules:
      exporter_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    deploy(yaml, runner.clone()).await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs[0].group, "prometheus");
    assert_eq!(
        runs[0].playbooks[0].vars["jobs"],
        json!(["prometheus/backend", "web/exporter"])
    );
}

#[tokio::test]
async fn disabled_modules_are_never_instantiated() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: web
    targets:
      static_configs: [{ targets: ['10.0.0.2:22'] }]
    modules:
      exporter_module: { enabled: true }
      broken_module: { enabled: false }
";
    let runner = Arc::new(RecordingRunner::default());
    let report = deploy(yaml, runner.clone()).await.unwrap();

    assert!(report.context.targets()["web"].contains_key("exporter"));
    assert!(!report.context.targets()["web"].contains_key("broken"));
    assert_eq!(runner.runs()[0].playbooks.len(), 1);
}

#[tokio::test]
async fn module_errors_abort_the_run() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: web
    targets:
      static_configs: [{ targets: ['10.0.0.2:22'] }]
    modules:
      broken_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    let err = deploy(yaml, runner.clone()).await.unwrap_err();
    assert!(matches!(err, DeployError::Targets { module: "broken", .. }));
    assert!(runner.runs().is_empty());
}

#[tokio::test]
async fn groups_without_playbooks_skip_the_runner() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: idle
    targets:
      static_configs: [{ targets: ['10.0.0.2:22'] }]
";
    let runner = Arc::new(RecordingRunner::default());
    let report = deploy(yaml, runner.clone()).await.unwrap();
    assert!(runner.runs().is_empty());
    assert_eq!(report.groups[0].hosts, 1);
    assert!(report.groups[0].report.is_none());
}

#[tokio::test]
async fn runner_failures_are_aggregated() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: a
    targets:
      static_configs: [{ targets: ['10.0.0.1:22'] }]
    modules: { exporter_module: { enabled: true } }
  - name: b
    targets:
      static_configs: [{ targets: ['10.0.0.2:22'] }]
    modules: { exporter_module: { enabled: true } }
  - name: c
    targets:
      static_configs: [{ targets: ['10.0.0.3:22'] }]
    modules: { exporter_module: { enabled: true } }
";
    let runner = Arc::new(RecordingRunner::failing(&["a", "c"]));
    let err = deploy(yaml, runner.clone()).await.unwrap_err();

    assert_eq!(runner.runs().len(), 3);
    let failures = match err {
        DeployError::Runner { failures } => failures,
        other => panic!("expected runner failure, got {other}"),
    };
    let groups: Vec<_> = failures.iter().map(|f| f.group.as_str()).collect();
    assert_eq!(groups, vec!["a", "c"]);
}

#[tokio::test]
async fn relabeling_drops_and_rewrites_targets() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: web
    targets:
      static_configs:
        - targets: ['10.0.0.1:22', '10.0.0.2:22']
          labels: { env: prod }
      relabel_configs:
        - source_labels: [__address__]
          regex: '10\.0\.0\.2:.*'
          action: drop
        - source_labels: [env]
          target_label: stage
    modules:
      exporter_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    deploy(yaml, runner.clone()).await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs[0].hosts, vec!["10.0.0.1:22"]);
    let vars = &runs[0].host_vars["10.0.0.1:22"];
    assert_eq!(vars["env"], json!("prod"));
    assert_eq!(vars["stage"], json!("prod"));
}

#[tokio::test]
async fn prometheus_server_errors_are_reported_as_such() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: prometheus
    targets:
      static_configs: [{ targets: ['10.0.0.1:22'] }]
    modules:
      backend_module: { enabled: true, fail_servers: true }
";
    let runner = Arc::new(RecordingRunner::default());
    let err = deploy(yaml, runner.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::PrometheusServers { module: "backend", .. }
    ));
    assert!(err.to_string().contains("Prometheus servers"));
    assert!(runner.runs().is_empty());
}

#[tokio::test]
async fn host_vars_come_from_the_last_target_per_address() {
    let yaml = r"
global: { sd_sync_time: 5s }
target_groups:
  - name: web
    targets:
      static_configs:
        - targets: ['10.0.0.1:22']
          labels: { tier: old }
        - targets: ['10.0.0.1:22']
          labels: { stage: new }
    modules:
      exporter_module: { enabled: true }
";
    let runner = Arc::new(RecordingRunner::default());
    deploy(yaml, runner.clone()).await.unwrap();

    let runs = runner.runs();
    assert_eq!(runs[0].hosts, vec!["10.0.0.1:22"]);
    let vars = &runs[0].host_vars["10.0.0.1:22"];
    assert_eq!(vars["seen_stage"], json!(true));
    assert!(!vars.contains_key("seen_tier"));
    assert!(!vars.contains_key("tier"));
}

#[tokio::test]
async fn group_without_sources_fails_discovery() {
    let yaml = r"
target_groups:
  - name: empty
";
    let err = deploy(yaml, Arc::new(RecordingRunner::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, DeployError::Discovery { .. }));
}
