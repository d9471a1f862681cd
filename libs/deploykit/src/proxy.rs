//! Reverse proxy entries published by modules and served by the portal.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::labels::{LabelSet, join_host_port, split_host_port};
use crate::targets::{TargetError, require_address};

/// Jinja expression resolving to the portal address on the managed host.
pub const PORTAL_ADDRESS_VAR: &str = "{{o11y_portal_address|default(\"\")}}";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseProxyEntry {
    pub name: String,
    pub url: String,
    pub prefix: String,
    #[serde(default)]
    pub host: String,
}

/// First 20 hex characters of the SHA-256 of `s`.
#[must_use]
pub fn hash_string(s: &str) -> String {
    let mut hex = hex::encode(Sha256::digest(s.as_bytes()));
    hex.truncate(20);
    hex
}

fn entry_prefix(prefix: &str, name: &str, host: &str) -> String {
    format!("{prefix}/{}", hash_string(&format!("{name} on {host}")))
}

/// One entry per target, pointing at `port` on the target's host.
///
/// # Errors
/// Fails on the first target without an address.
pub fn reverse_proxy_entries(
    targets: &[LabelSet],
    port: u16,
    name: &str,
    prefix: &str,
) -> Result<Vec<ReverseProxyEntry>, TargetError> {
    targets
        .iter()
        .map(|target| {
            let (host, _) = split_host_port(require_address(target)?);
            Ok(ReverseProxyEntry {
                name: name.to_owned(),
                url: format!("http://{}", join_host_port(host, port)),
                prefix: entry_prefix(prefix, name, host),
                host: String::new(),
            })
        })
        .collect()
}

/// Public address of the entry for `target`, relative to the portal address.
///
/// # Errors
/// Fails when the target has no address.
pub fn reverse_proxy_address(
    target: &LabelSet,
    name: &str,
    prefix: &str,
) -> Result<String, TargetError> {
    let (host, _) = split_host_port(require_address(target)?);
    Ok(format!("{PORTAL_ADDRESS_VAR}{}", entry_prefix(prefix, name, host)))
}

/// Points every entry at `host`, keeping scheme, port and prefix.
///
/// # Errors
/// Fails when an entry URL cannot be parsed.
pub fn replace_host(
    entries: Vec<ReverseProxyEntry>,
    host: &str,
) -> Result<Vec<ReverseProxyEntry>, TargetError> {
    entries
        .into_iter()
        .map(|mut entry| {
            let url = Url::parse(&entry.url).map_err(|source| TargetError::InvalidUrl {
                url: entry.url.clone(),
                source,
            })?;
            entry.url = match url.port_or_known_default() {
                Some(port) => format!("{}://{}", url.scheme(), join_host_port(host, port)),
                None => format!("{}://{host}", url.scheme()),
            };
            host.clone_into(&mut entry.host);
            Ok(entry)
        })
        .collect()
}
