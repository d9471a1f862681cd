//! Process bootstrap for the deployer binary: layered configuration and logging.

pub mod config;
pub mod logging;

pub use config::{AppConfig, CliArgs, ENV_PREFIX};
pub use logging::{LogFormat, LoggingConfig, init_logging};
