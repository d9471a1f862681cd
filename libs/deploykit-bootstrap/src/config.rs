//! Layered configuration for the deployer process.
//!
//! Layers, lowest priority first: built-in defaults, the YAML file,
//! `O11Y__`-prefixed environment variables (`__` separates nesting levels,
//! e.g. `O11Y__GLOBAL__SD_SYNC_TIME=30s`), then CLI overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use deploykit::{DeployConfig, ModuleRegistry, RawConfig};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::logging::LoggingConfig;

pub const ENV_PREFIX: &str = "O11Y__";

/// Arguments of the command line that take part in the merge.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub print_config: bool,
    pub verbose: u8,
    pub data_directory: Option<PathBuf>,
}

/// The deployment document plus process-level settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    #[serde(flatten)]
    pub document: RawConfig,
    pub logging: LoggingConfig,
    /// Directory the config file was loaded from; relative paths resolve against it.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads defaults, then `path` (if any), then the environment.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a layer does not match the schema.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            if !path.is_file() {
                anyhow::bail!("config file does not exist: {}", path.display());
            }
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| match path {
                Some(path) => format!("failed to load configuration from '{}'", path.display()),
                None => "failed to load configuration".to_owned(),
            })?;
        config.base_dir = path.map(|p| {
            p.parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
        });
        tracing::debug!(
            groups = config.document.target_groups.len(),
            "Configuration layers merged"
        );
        Ok(config)
    }

    /// Parses a YAML document without touching files or the environment.
    ///
    /// # Errors
    /// Returns an error if the document does not match the schema.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::string(yaml))
            .extract()
            .context("failed to parse configuration")
    }

    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(dir) = &args.data_directory {
            self.document.global.data_directory.clone_from(dir);
        }
        self.logging.verbosity = args.verbose;
    }

    /// Decodes every group's `modules` section and resolves relative paths.
    ///
    /// # Errors
    /// Returns an error if the document fails registry decoding or validation.
    pub fn resolve(&self, registry: &ModuleRegistry) -> Result<DeployConfig> {
        let mut config = DeployConfig::resolve(self.document.clone(), registry)
            .context("invalid deployment configuration")?;
        if let Some(dir) = &self.base_dir {
            config.set_directory(dir);
        }
        Ok(config)
    }

    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        serde_saphyr::to_string(self).context("failed to serialize configuration")
    }
}
