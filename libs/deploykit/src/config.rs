//! The deployment document: global settings and target groups.
//!
//! [`RawConfig`] is the serde view of the document, with each group's
//! `modules` section left undecoded. [`DeployConfig::resolve`] decodes those
//! sections through the [`ModuleRegistry`] and validates the result.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::discovery::TargetsConfig;
use crate::registry::{ModuleConfigs, ModuleRegistry, RegistryError};
use crate::relabel::RelabelError;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("invalid YAML: {0}")]
    Yaml(String),
    #[error("configuration must have at least one target group")]
    NoTargetGroups,
    #[error("target group #{index} has an empty name")]
    EmptyGroupName { index: usize },
    #[error("target group '{name}' is defined more than once")]
    DuplicateGroup { name: String },
    #[error("target group '{group}': {source}")]
    Modules {
        group: String,
        #[source]
        source: RegistryError,
    },
    #[error("target group '{group}': {source}")]
    Relabel {
        group: String,
        #[source]
        source: RelabelError,
    },
    #[error("sd_sync_time must be greater than zero")]
    ZeroSyncTime,
}

/// Settings shared by every target group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GlobalConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansible_ssh_key_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ansible_become_password_file: Option<PathBuf>,
    pub ansible_user: String,
    /// How long discovery runs before targets are snapshotted.
    #[serde(with = "crate::duration")]
    pub sd_sync_time: Duration,
    pub data_directory: PathBuf,
    /// Record unknown SSH host keys in `<data_directory>/known_hosts` on first contact.
    pub ansible_trust_on_first_use: bool,
    /// Group whose hosts run Prometheus.
    pub metrics_backend_group: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            ansible_ssh_key_path: None,
            ansible_become_password_file: None,
            ansible_user: "ansible".to_owned(),
            sd_sync_time: Duration::from_secs(10),
            data_directory: PathBuf::from("data"),
            ansible_trust_on_first_use: true,
            metrics_backend_group: "prometheus".to_owned(),
        }
    }
}

impl GlobalConfig {
    /// Resolves relative paths against `dir`.
    pub fn set_directory(&mut self, dir: &Path) {
        self.data_directory = join_dir(dir, &self.data_directory);
        if let Some(path) = self.ansible_ssh_key_path.as_mut() {
            *path = join_dir(dir, path);
        }
        if let Some(path) = self.ansible_become_password_file.as_mut() {
            *path = join_dir(dir, path);
        }
    }
}

/// `path` if absolute, otherwise `dir/path`.
#[must_use]
pub fn join_dir(dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || path.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        dir.join(path)
    }
}

/// A target group with its `modules` section still undecoded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RawTargetGroup {
    pub name: String,
    pub targets: TargetsConfig,
    pub modules: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub global: GlobalConfig,
    pub target_groups: Vec<RawTargetGroup>,
}

impl RawConfig {
    /// # Errors
    /// Returns [`ConfigError::Yaml`] if the document does not parse.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|e| ConfigError::Yaml(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TargetGroup {
    pub name: String,
    pub targets: TargetsConfig,
    pub modules: ModuleConfigs,
}

/// Fully decoded and validated deployment document.
#[derive(Clone, Debug, PartialEq)]
pub struct DeployConfig {
    pub global: GlobalConfig,
    pub target_groups: Vec<TargetGroup>,
}

impl DeployConfig {
    /// Decodes every group's modules and validates the document.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn resolve(raw: RawConfig, registry: &ModuleRegistry) -> Result<Self, ConfigError> {
        let target_groups = raw
            .target_groups
            .into_iter()
            .map(|group| {
                let modules = registry.decode_configs(&group.modules).map_err(|source| {
                    ConfigError::Modules {
                        group: group.name.clone(),
                        source,
                    }
                })?;
                Ok(TargetGroup {
                    name: group.name,
                    targets: group.targets,
                    modules,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let config = Self {
            global: raw.global,
            target_groups,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and resolves a YAML document.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] if the document does not parse or is invalid.
    pub fn from_yaml(yaml: &str, registry: &ModuleRegistry) -> Result<Self, ConfigError> {
        Self::resolve(RawConfig::from_yaml(yaml)?, registry)
    }

    /// # Errors
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_groups.is_empty() {
            return Err(ConfigError::NoTargetGroups);
        }
        if self.global.sd_sync_time.is_zero() {
            return Err(ConfigError::ZeroSyncTime);
        }
        let mut seen = HashSet::new();
        for (index, group) in self.target_groups.iter().enumerate() {
            if group.name.is_empty() {
                return Err(ConfigError::EmptyGroupName { index });
            }
            if !seen.insert(group.name.as_str()) {
                return Err(ConfigError::DuplicateGroup {
                    name: group.name.clone(),
                });
            }
            for relabel in &group.targets.relabel_configs {
                relabel.validate().map_err(|source| ConfigError::Relabel {
                    group: group.name.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }

    /// Resolves relative paths (data directory, keys, `file_sd` patterns) against `dir`.
    pub fn set_directory(&mut self, dir: &Path) {
        self.global.set_directory(dir);
        for group in &mut self.target_groups {
            group.targets.set_directory(dir);
        }
    }

    /// Back to the serde view, modules encoded in registry order.
    ///
    /// # Errors
    /// Returns [`ConfigError::Modules`] if a module configuration cannot be encoded.
    pub fn to_raw(&self, registry: &ModuleRegistry) -> Result<RawConfig, ConfigError> {
        let target_groups = self
            .target_groups
            .iter()
            .map(|group| {
                let modules = registry.encode_configs(&group.modules).map_err(|source| {
                    ConfigError::Modules {
                        group: group.name.clone(),
                        source,
                    }
                })?;
                Ok(RawTargetGroup {
                    name: group.name.clone(),
                    targets: group.targets.clone(),
                    modules,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(RawConfig {
            global: self.global.clone(),
            target_groups,
        })
    }

    /// # Errors
    /// Returns a [`ConfigError`] if the document cannot be encoded.
    pub fn to_yaml(&self, registry: &ModuleRegistry) -> Result<String, ConfigError> {
        let raw = self.to_raw(registry)?;
        serde_saphyr::to_string(&raw).map_err(|e| ConfigError::Yaml(e.to_string()))
    }
}
