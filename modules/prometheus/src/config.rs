use std::time::Duration;

use deploykit::{Module, ModuleOptions, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::module::PrometheusModule;

/// Configuration for the `prometheus` module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PrometheusConfig {
    pub enabled: bool,
    pub prometheus_version: String,
    pub listen_address: String,
    pub port: u16,
    #[serde(with = "deploykit::duration")]
    pub scrape_interval: Duration,
    #[serde(with = "deploykit::duration")]
    pub scrape_timeout: Duration,
    #[serde(with = "deploykit::duration")]
    pub evaluation_interval: Duration,
    #[serde(with = "deploykit::duration")]
    pub retention: Duration,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            prometheus_version: "2.43.0".to_owned(),
            listen_address: "0.0.0.0".to_owned(),
            port: 9090,
            scrape_interval: Duration::from_secs(15),
            scrape_timeout: Duration::from_secs(10),
            evaluation_interval: Duration::from_secs(15),
            retention: Duration::from_secs(15 * 24 * 3600),
        }
    }
}

impl ServiceConfig for PrometheusConfig {
    const NAME: &'static str = "prometheus";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.port == 0 {
            anyhow::bail!("port must not be 0");
        }
        if self.scrape_timeout > self.scrape_interval {
            anyhow::bail!(
                "scrape_timeout ({}) must not exceed scrape_interval ({})",
                deploykit::duration::format(self.scrape_timeout),
                deploykit::duration::format(self.scrape_interval)
            );
        }
        Ok(())
    }

    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        tracing::debug!(group = %opts.target_group, "Creating prometheus module");
        Ok(Box::new(PrometheusModule::new(self.clone())))
    }
}
