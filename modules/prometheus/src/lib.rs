//! Prometheus server for the metrics backend group.
//!
//! Scrapes every target other modules projected during phase 1 and loads
//! their rule groups.

mod config;
mod module;
mod rules;
mod scrape;

pub use config::PrometheusConfig;
pub use module::PrometheusModule;
pub use scrape::{ScrapeConfig, StaticConfig, scrape_configs};

deploykit::register_module!(PrometheusConfig);
