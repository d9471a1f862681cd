use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::Context;
use deploykit::ansible::Vars;
use deploykit::proxy::{replace_host, reverse_proxy_address, reverse_proxy_entries};
use deploykit::targets::project_targets;
use deploykit::{LabelSet, Module, PipelineContext, Playbook, ReverseProxyEntry};
use serde_json::{Value, json};

use crate::config::GrafanaConfig;
use crate::dashboards::{dashboard_file_name, rewrite_dashboard};

const PROXY_NAME: &str = "grafana";
const PROXY_PREFIX: &str = "/grafana";

pub struct GrafanaModule {
    config: GrafanaConfig,
}

impl GrafanaModule {
    #[must_use]
    pub fn new(config: GrafanaConfig) -> Self {
        Self { config }
    }
}

/// Writes every dashboard into `dir` and removes files no longer produced.
fn sync_dashboards(dir: &Path, ctx: &PipelineContext) -> anyhow::Result<usize> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create '{}'", dir.display()))?;

    let mut expected = BTreeSet::new();
    for dashboard in ctx.dashboards() {
        let dashboard = rewrite_dashboard(dashboard.clone());
        let name = dashboard_file_name(&dashboard);
        let content = serde_json::to_vec_pretty(&dashboard)?;
        let path = dir.join(&name);
        fs::write(&path, content)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        expected.insert(name);
    }
    for (name, content) in ctx.dashboard_files() {
        let Some(file_name) = Path::new(name).file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(name = %name, "Ignoring dashboard file with an invalid name");
            continue;
        };
        let path = dir.join(file_name);
        fs::write(&path, content)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        expected.insert(file_name.to_owned());
    }

    for entry in fs::read_dir(dir).with_context(|| format!("failed to list '{}'", dir.display()))? {
        let entry = entry?;
        let stale = entry.file_type()?.is_file()
            && entry
                .file_name()
                .to_str()
                .is_none_or(|name| !expected.contains(name));
        if stale {
            tracing::debug!(path = %entry.path().display(), "Removing stale dashboard");
            fs::remove_file(entry.path())?;
        }
    }
    Ok(expected.len())
}

fn datasources(ctx: &PipelineContext) -> Vec<Value> {
    let Some(servers) = ctx.prometheus_servers() else {
        tracing::warn!(
            "Prometheus servers are not known yet, Grafana is deployed without datasources; \
             list the metrics backend group before this one"
        );
        return Vec::new();
    };
    servers
        .iter()
        .enumerate()
        .map(|(i, server)| {
            json!({
                "name": server.name,
                "type": "prometheus",
                "access": "proxy",
                "url": server.url,
                "basicAuth": false,
                "isDefault": i == 0,
            })
        })
        .collect()
}

impl Module for GrafanaModule {
    fn get_targets(&self, targets: &[LabelSet], group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(project_targets(targets, self.config.grafana_port, group)?)
    }

    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let dir = ctx.data_dir().join("dashboards");
        let written = sync_dashboards(&dir, ctx)?;
        let datasources = datasources(ctx);
        tracing::info!(
            dashboards = written,
            datasources = datasources.len(),
            "Grafana provisioning prepared"
        );

        Ok(Some(
            Playbook::new("Grafana")
                .privileged()
                .var("grafana_version", self.config.grafana_version.as_str())
                .var("grafana_provisioning_synced", true)
                .var(
                    "grafana_security",
                    json!({
                        "admin_user": "admin",
                        "admin_password": self.config.admin_password,
                    }),
                )
                .var("grafana_address", self.config.grafana_address.as_str())
                .var("grafana_port", self.config.grafana_port)
                .var("grafana_datasources", datasources)
                .var("grafana_dashboards_dir", dir.display().to_string())
                .var("grafana_metrics", json!({"enabled": true}))
                .var(
                    "grafana_auth",
                    json!({
                        "disable_login_form": true,
                        "oauth_auto_login": false,
                        "disable_signout_menu": false,
                        "signout_redirect_url": "/auth/logout",
                        "proxy": {
                            "enabled": true,
                            "header_name": "X-Token-Subject",
                            "header_property": "username",
                            "auto_sign_up": true,
                        },
                    }),
                )
                .var(
                    "grafana_server",
                    json!({
                        "protocol": "http",
                        "enforce_domain": false,
                        "enable_gzip": false,
                        "static_root_path": "public",
                        "router_logging": false,
                        "serve_from_sub_path": true,
                    }),
                )
                .var(
                    "grafana_users",
                    json!({
                        "allow_sign_up": false,
                        "auto_assign_org_role": self.config.users_role,
                        "default_theme": "dark",
                    }),
                )
                .role("grafana"),
        ))
    }

    fn host_vars(&self, target: &LabelSet, _group: &str) -> anyhow::Result<Vars> {
        let url = reverse_proxy_address(target, PROXY_NAME, PROXY_PREFIX)?;
        Ok(Vars::from([("grafana_url".to_owned(), Value::from(url))]))
    }

    fn reverse_proxy(
        &self,
        targets: &[LabelSet],
        _group: &str,
    ) -> anyhow::Result<Vec<ReverseProxyEntry>> {
        let entries =
            reverse_proxy_entries(targets, self.config.grafana_port, PROXY_NAME, PROXY_PREFIX)
                .context("could not get reverse proxy entries")?;
        if self.config.is_local() {
            return replace_host(entries, &self.config.grafana_address)
                .context("could not point reverse proxy entries at the local address");
        }
        Ok(entries)
    }
}
