//! Alertmanager with e-mail receivers, proxied by the portal under `/alertmanager`.

mod config;
mod module;
mod rules;

pub use config::AlertmanagerConfig;
pub use module::AlertmanagerModule;

deploykit::register_module!(AlertmanagerConfig);
