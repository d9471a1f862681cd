//! Projection of discovered targets onto a module's port.

use crate::labels::{ADDRESS_LABEL, GROUP_NAME_LABEL, LabelSet, join_host_port, split_host_port};

#[derive(thiserror::Error, Debug)]
pub enum TargetError {
    #[error("target {labels} has no __address__ label")]
    MissingAddress { labels: String },
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Address of `target`, or [`TargetError::MissingAddress`].
///
/// # Errors
/// Fails when the target has no non-empty `__address__`.
pub fn require_address(target: &LabelSet) -> Result<&str, TargetError> {
    target.address().ok_or_else(|| TargetError::MissingAddress {
        labels: target.to_string(),
    })
}

/// Rewrites each target's address to `port` and tags it with the group name.
///
/// # Errors
/// Fails on the first target without an address.
pub fn project_targets(
    targets: &[LabelSet],
    port: u16,
    group: &str,
) -> Result<Vec<LabelSet>, TargetError> {
    targets
        .iter()
        .map(|target| {
            let (host, _) = split_host_port(require_address(target)?);
            Ok(target
                .builder()
                .set(ADDRESS_LABEL, join_host_port(host, port))
                .set(GROUP_NAME_LABEL, group)
                .build())
        })
        .collect()
}
