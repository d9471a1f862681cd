use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::User;

const BCRYPT_VERSIONS: [&str; 4] = ["2a", "2b", "2x", "2y"];
/// Salt and hash, radix-64 encoded.
const BCRYPT_PAYLOAD_LEN: usize = 53;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum UserError {
    #[error("password is not a bcrypt hash")]
    NotBcrypt,
    #[error("bcrypt cost {cost} is outside 4..=31")]
    CostOutOfRange { cost: u32 },
}

/// Cost factor encoded in a `$2b$12$...` style hash.
///
/// # Errors
/// Returns [`UserError`] when `hash` is not a well-formed bcrypt hash.
pub fn bcrypt_cost(hash: &str) -> Result<u32, UserError> {
    let mut parts = hash
        .strip_prefix('$')
        .ok_or(UserError::NotBcrypt)?
        .splitn(3, '$');
    let (Some(version), Some(cost), Some(payload)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(UserError::NotBcrypt);
    };
    if !BCRYPT_VERSIONS.contains(&version)
        || cost.len() != 2
        || payload.len() != BCRYPT_PAYLOAD_LEN
    {
        return Err(UserError::NotBcrypt);
    }
    let cost: u32 = cost.parse().map_err(|_| UserError::NotBcrypt)?;
    if !(4..=31).contains(&cost) {
        return Err(UserError::CostOutOfRange { cost });
    }
    Ok(cost)
}

/// Name-based (version 5) UUID of the username in the DNS namespace.
#[must_use]
pub fn user_id(username: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_DNS, username.as_bytes()).to_string()
}

/// A user as the portal role expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalUser {
    pub uuid: String,
    pub username: String,
    pub bcrypt_password: String,
    pub email: String,
    pub email_domain: String,
    pub bcrypt_cost: u32,
    pub role: String,
}

impl PortalUser {
    /// # Errors
    /// Returns [`UserError`] when the password is not a valid bcrypt hash.
    pub fn from_user(user: &User) -> Result<Self, UserError> {
        let email_domain = user
            .email
            .split_once('@')
            .map(|(_, domain)| domain.to_owned())
            .unwrap_or_default();
        Ok(Self {
            uuid: user_id(&user.username),
            username: user.username.clone(),
            bcrypt_cost: bcrypt_cost(&user.bcrypt_password)?,
            bcrypt_password: user.bcrypt_password.clone(),
            email: user.email.clone(),
            email_domain,
            role: if user.role.is_empty() {
                "user".to_owned()
            } else {
                user.role.clone()
            },
        })
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}
