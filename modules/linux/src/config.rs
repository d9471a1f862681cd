use deploykit::{Module, ModuleOptions, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::module::LinuxModule;

/// Configuration for the `linux` module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinuxConfig {
    pub enabled: bool,
    pub enable_exporter: bool,
    pub node_exporter_version: String,
    pub node_exporter_port: u16,
}

impl Default for LinuxConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            enable_exporter: true,
            node_exporter_version: "1.5.0".to_owned(),
            node_exporter_port: 9100,
        }
    }
}

impl ServiceConfig for LinuxConfig {
    const NAME: &'static str = "linux";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.node_exporter_port == 0 {
            anyhow::bail!("node_exporter_port must not be 0");
        }
        if self.node_exporter_version.is_empty() {
            anyhow::bail!("node_exporter_version must not be empty");
        }
        Ok(())
    }

    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        tracing::debug!(group = %opts.target_group, "Creating linux module");
        Ok(Box::new(LinuxModule::new(self.clone())))
    }
}
