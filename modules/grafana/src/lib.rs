//! Grafana on the group's hosts, served behind the portal under `/grafana`.
//!
//! Dashboards collected from every module are rewritten to use the
//! provisioned Prometheus datasource and a `group_name` filter, then written
//! to `<data_directory>/dashboards`.

mod config;
mod dashboards;
mod module;

pub use config::GrafanaConfig;
pub use dashboards::{add_group_name_selector, dashboard_file_name, rewrite_dashboard};
pub use module::GrafanaModule;

deploykit::register_module!(GrafanaConfig);
