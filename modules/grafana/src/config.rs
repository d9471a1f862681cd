use deploykit::{Module, ModuleOptions, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::module::GrafanaModule;

/// Configuration for the `grafana` module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GrafanaConfig {
    pub enabled: bool,
    pub admin_password: String,
    pub grafana_version: String,
    pub grafana_address: String,
    pub grafana_port: u16,
    /// Organization role given to users signed up through the portal.
    pub users_role: String,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            admin_password: "changeme".to_owned(),
            grafana_version: "10.2.1".to_owned(),
            grafana_address: "127.0.0.1".to_owned(),
            grafana_port: 3000,
            users_role: "Viewer".to_owned(),
        }
    }
}

impl GrafanaConfig {
    /// Grafana only listens on the loopback interface.
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self.grafana_address.as_str(),
            "127.0.0.1" | "localhost" | "::1"
        )
    }
}

impl ServiceConfig for GrafanaConfig {
    const NAME: &'static str = "grafana";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.grafana_port == 0 {
            anyhow::bail!("grafana_port must not be 0");
        }
        if !matches!(self.users_role.as_str(), "Viewer" | "Editor" | "Admin") {
            anyhow::bail!(
                "users_role must be one of Viewer, Editor or Admin, got '{}'",
                self.users_role
            );
        }
        Ok(())
    }

    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        if self.admin_password == Self::default().admin_password {
            tracing::warn!(group = %opts.target_group, "Grafana admin password is the default one");
        }
        Ok(Box::new(GrafanaModule::new(self.clone())))
    }
}
