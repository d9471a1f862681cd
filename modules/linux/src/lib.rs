//! Linux hosts: installs the node exporter and publishes it as a scrape target.

mod config;
mod dashboard;
mod module;
mod rules;

pub use config::LinuxConfig;
pub use module::LinuxModule;

deploykit::register_module!(LinuxConfig);
