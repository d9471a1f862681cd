//! Deploykit: pluggable service modules and the deployment pipeline.
//!
//! The crate is organised leaves first:
//! - [`labels`] and [`relabel`]: target label sets and the relabeling engine
//! - [`discovery`]: discovery backends and the time-bounded fan-in
//! - [`registry`]: the module configuration registry
//! - [`contracts`] and [`context`]: what a service module implements and what it can read
//! - [`deployer`]: the two-phase orchestration pipeline
//!
//! Service modules register their configuration type with [`register_module!`]
//! and are collected with [`ModuleRegistry::discover`].

pub mod ansible;
pub mod config;
pub mod context;
pub mod contracts;
pub mod deployer;
pub mod discovery;
pub mod duration;
pub mod inventory;
pub mod labels;
pub mod proxy;
pub mod registry;
pub mod relabel;
pub mod rules;
pub mod runner;
pub mod targets;

pub use ansible::{Host, HostGroup, Inventory, Playbook, Role, Task, Vars};
pub use config::{ConfigError, DeployConfig, GlobalConfig, RawConfig, RawTargetGroup, TargetGroup};
pub use context::{PipelineContext, PrometheusServer};
pub use contracts::{Module, ModuleOptions};
pub use deployer::{DeployError, DeployReport, Deployer, GroupReport};
pub use discovery::{DiscoveredGroup, Discoverer, DiscoveryError, FanIn, TargetsConfig};
pub use labels::{ADDRESS_LABEL, GROUP_NAME_LABEL, LabelSet, LabelSetBuilder};
pub use proxy::ReverseProxyEntry;
pub use registry::{
    ConfigRegistration, ModuleConfig, ModuleConfigs, ModuleRegistry, RegistryBuilder,
    RegistryError, ServiceConfig,
};
pub use relabel::{RelabelAction, RelabelConfig, RelabelError};
pub use rules::{Rule, RuleGroup};
pub use runner::{RunReport, RunRequest, Runner, RunnerError};
pub use targets::TargetError;

// Re-exported for `register_module!`.
#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
