use std::fs;
use std::io;
use std::path::Path;

use anyhow::Context;
use deploykit::ansible::Vars;
use deploykit::labels::split_host_port;
use deploykit::targets::require_address;
use deploykit::{LabelSet, Module, PipelineContext, Playbook};
use serde_json::Value;

use crate::config::{PortalConfig, User};
use crate::users::PortalUser;

/// Bcrypt hash of the built-in administrator, relative to the data directory.
pub const ADMIN_PASSWORD_FILE: &str = "admin-password";
const ADMIN_USERNAME: &str = "webadmin";

pub struct PortalModule {
    config: PortalConfig,
}

impl PortalModule {
    #[must_use]
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }

    /// Configured users, plus the built-in administrator when none is an admin.
    fn users(&self, data_dir: &Path) -> anyhow::Result<Vec<PortalUser>> {
        let mut users = self
            .config
            .users
            .iter()
            .map(|user| {
                PortalUser::from_user(user)
                    .with_context(|| format!("portal user '{}'", user.username))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        if users.iter().any(PortalUser::is_admin) {
            return Ok(users);
        }

        let path = data_dir.join(ADMIN_PASSWORD_FILE);
        match fs::read_to_string(&path) {
            Ok(hash) => {
                let admin = User {
                    username: ADMIN_USERNAME.to_owned(),
                    bcrypt_password: hash.trim().to_owned(),
                    email: "admin@localhost".to_owned(),
                    role: "admin".to_owned(),
                };
                users.push(
                    PortalUser::from_user(&admin)
                        .with_context(|| format!("invalid hash in '{}'", path.display()))?,
                );
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    path = %path.display(),
                    "No admin user configured and no admin password hash found, the portal has no administrator"
                );
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read '{}'", path.display()));
            }
        }
        Ok(users)
    }
}

impl Module for PortalModule {
    fn get_targets(&self, _targets: &[LabelSet], _group: &str) -> anyhow::Result<Vec<LabelSet>> {
        Ok(Vec::new())
    }

    fn playbook(&self, ctx: &PipelineContext) -> anyhow::Result<Option<Playbook>> {
        let users = self.users(ctx.data_dir())?;
        let entries = ctx.reverse_proxy_entries();
        tracing::info!(
            users = users.len(),
            proxy_entries = entries.len(),
            "Portal configuration assembled"
        );
        Ok(Some(
            Playbook::new("Portal")
                .privileged()
                .var("authp_version", self.config.authp_version.as_str())
                .var("authp_users", serde_json::to_value(&users)?)
                .var("o11y_proxy_entries", serde_json::to_value(entries)?)
                .role("authp"),
        ))
    }

    fn host_vars(&self, target: &LabelSet, _group: &str) -> anyhow::Result<Vars> {
        let (host, _) = split_host_port(require_address(target)?);
        let address = if host.contains(':') {
            format!("http://[{host}]")
        } else {
            format!("http://{host}")
        };
        Ok(Vars::from([(
            "o11y_portal_address".to_owned(),
            Value::from(address),
        )]))
    }
}
