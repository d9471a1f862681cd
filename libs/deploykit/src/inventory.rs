//! Builds the Ansible inventory of a target group.

use crate::ansible::{Host, Inventory};
use crate::labels::LabelSet;

/// One host per distinct address, carrying the non-meta labels as host variables.
///
/// Label sets without an address are skipped. When two sets share an address
/// the later one wins.
#[must_use]
pub fn build_inventory(targets: &[LabelSet]) -> Inventory {
    let mut inventory = Inventory::default();
    let all = inventory.all_mut();
    for target in targets {
        let Some(address) = target.address() else {
            tracing::debug!(labels = %target, "Skipping target without address");
            continue;
        };
        let vars = target
            .visible()
            .map(|(name, value)| (name.to_owned(), serde_json::Value::from(value)))
            .collect();
        all.hosts.insert(address.to_owned(), Host { vars });
    }
    inventory
}
