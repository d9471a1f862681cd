use deploykit::{Module, ModuleOptions, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::module::AlertmanagerModule;

/// Configuration for the `alertmanager` module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertmanagerConfig {
    pub enabled: bool,
    pub listen_address: String,
    pub listen_port: u16,
    /// E-mail addresses notified for every alert.
    pub receivers: Vec<String>,
    pub smtp_from: String,
    pub smtp_smarthost: String,
}

impl Default for AlertmanagerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: "127.0.0.1".to_owned(),
            listen_port: 9093,
            receivers: vec!["default@change.me".to_owned()],
            smtp_from: "default@change.me".to_owned(),
            smtp_smarthost: "smtp.gmail.com:587".to_owned(),
        }
    }
}

impl AlertmanagerConfig {
    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(
            self.listen_address.as_str(),
            "127.0.0.1" | "localhost" | "::1"
        )
    }
}

impl ServiceConfig for AlertmanagerConfig {
    const NAME: &'static str = "alertmanager";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.listen_port == 0 {
            anyhow::bail!("listen_port must not be 0");
        }
        if let Some(bad) = self.receivers.iter().find(|r| !r.contains('@')) {
            anyhow::bail!("receiver '{bad}' is not an e-mail address");
        }
        if !self.smtp_smarthost.contains(':') {
            anyhow::bail!(
                "smtp_smarthost '{}' must be in host:port form",
                self.smtp_smarthost
            );
        }
        Ok(())
    }

    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        tracing::debug!(
            group = %opts.target_group,
            receivers = self.receivers.len(),
            "Creating alertmanager module"
        );
        Ok(Box::new(AlertmanagerModule::new(self.clone())))
    }
}
