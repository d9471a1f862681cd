//! Authenticating portal that reverse-proxies every web interface other
//! modules publish.

mod config;
mod module;
mod users;

pub use config::{PortalConfig, User};
pub use module::{ADMIN_PASSWORD_FILE, PortalModule};
pub use users::{PortalUser, UserError, bcrypt_cost, user_id};

deploykit::register_module!(PortalConfig);
