use deploykit::{Module, ModuleOptions, ServiceConfig};
use serde::{Deserialize, Serialize};

use crate::module::PortalModule;
use crate::users::bcrypt_cost;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct User {
    pub username: String,
    pub bcrypt_password: String,
    #[serde(default)]
    pub email: String,
    /// `user` when empty.
    #[serde(default)]
    pub role: String,
}

/// Configuration for the `portal` module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalConfig {
    pub enabled: bool,
    pub authp_version: String,
    pub users: Vec<User>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            authp_version: "1.0.3".to_owned(),
            users: Vec::new(),
        }
    }
}

impl ServiceConfig for PortalConfig {
    const NAME: &'static str = "portal";

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn validate(&self) -> anyhow::Result<()> {
        for user in &self.users {
            if user.username.is_empty() {
                anyhow::bail!("portal user without a username");
            }
            bcrypt_cost(&user.bcrypt_password)
                .map_err(|e| anyhow::anyhow!("user '{}': {e}", user.username))?;
        }
        Ok(())
    }

    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        tracing::debug!(group = %opts.target_group, users = self.users.len(), "Creating portal module");
        Ok(Box::new(PortalModule::new(self.clone())))
    }
}
