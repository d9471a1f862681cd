//! Label sets describing a single discovered target.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Reserved label holding the network address of a target.
pub const ADDRESS_LABEL: &str = "__address__";

/// Label set by modules on projected targets to name their target group.
pub const GROUP_NAME_LABEL: &str = "group_name";

/// Labels starting with this prefix are internal to discovery and relabeling.
pub const META_LABEL_PREFIX: &str = "__";

/// Immutable, name-sorted set of labels.
///
/// Derived sets are produced through [`LabelSet::builder`], which starts from a copy.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns the target address, if present and non-empty.
    #[must_use]
    pub fn address(&self) -> Option<&str> {
        self.get(ADDRESS_LABEL).filter(|addr| !addr.is_empty())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Labels that are not meta labels.
    pub fn visible(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(name, _)| !name.starts_with(META_LABEL_PREFIX))
    }

    /// Starts a builder from a copy of this set.
    #[must_use]
    pub fn builder(&self) -> LabelSetBuilder {
        LabelSetBuilder {
            labels: self.0.clone(),
        }
    }

    /// Returns a new set with `other`'s labels filled in where this set has none.
    #[must_use]
    pub fn merged_over(&self, other: &LabelSet) -> LabelSet {
        let mut labels = other.0.clone();
        labels.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        LabelSet(labels)
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}=\"{value}\"")?;
        }
        f.write_str("}")
    }
}

impl<K, V> FromIterator<(K, V)> for LabelSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        LabelSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for LabelSet {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Mutable copy of a [`LabelSet`].
///
/// Setting a label to the empty string removes it.
#[derive(Clone, Debug, Default)]
pub struct LabelSetBuilder {
    labels: BTreeMap<String, String>,
}

impl LabelSetBuilder {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        let name = name.into();
        if value.is_empty() {
            self.labels.remove(&name);
        } else {
            self.labels.insert(name, value);
        }
        self
    }

    pub fn del(&mut self, name: &str) -> &mut Self {
        self.labels.remove(name);
        self
    }

    /// Keeps only the labels for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) -> &mut Self {
        self.labels.retain(|name, _| keep(name));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn build(&self) -> LabelSet {
        LabelSet(self.labels.clone())
    }
}

/// Splits `host:port`, accepting bracketed IPv6 hosts and bare hosts without a port.
#[must_use]
pub fn split_host_port(address: &str) -> (&str, Option<&str>) {
    if let Some(rest) = address.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').filter(|p| !p.is_empty());
            return (host, port);
        }
        return (address, None);
    }
    match address.rsplit_once(':') {
        // More than one colon without brackets is a bare IPv6 address.
        Some((host, _)) if host.contains(':') => (address, None),
        Some((host, port)) if !port.is_empty() => (host, Some(port)),
        Some((host, _)) => (host, None),
        None => (address, None),
    }
}

/// Joins a host and a port, bracketing IPv6 hosts.
#[must_use]
pub fn join_host_port(host: &str, port: impl fmt::Display) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_does_not_touch_the_original() {
        let original = LabelSet::from([(ADDRESS_LABEL, "10.0.0.1:22"), ("env", "prod")]);
        let derived = original.builder().set("env", "dev").del(ADDRESS_LABEL).build();

        assert_eq!(original.get("env"), Some("prod"));
        assert_eq!(original.address(), Some("10.0.0.1:22"));
        assert_eq!(derived, LabelSet::from([("env", "dev")]));
    }

    #[test]
    fn setting_empty_value_removes_label() {
        let set = LabelSet::from([("a", "1"), ("b", "2")]);
        let derived = set.builder().set("a", "").build();
        assert_eq!(derived, LabelSet::from([("b", "2")]));
    }

    #[test]
    fn merged_over_prefers_own_labels() {
        let host = LabelSet::from([(ADDRESS_LABEL, "h1"), ("env", "host")]);
        let group = LabelSet::from([("env", "group"), ("dc", "east")]);
        let merged = host.merged_over(&group);
        assert_eq!(
            merged,
            LabelSet::from([(ADDRESS_LABEL, "h1"), ("dc", "east"), ("env", "host")])
        );
    }

    #[test]
    fn visible_skips_meta_labels() {
        let set = LabelSet::from([(ADDRESS_LABEL, "h1"), ("__meta_x", "y"), ("env", "prod")]);
        let visible: Vec<_> = set.visible().collect();
        assert_eq!(visible, vec![("env", "prod")]);
    }

    #[test]
    fn display_is_sorted() {
        let set = LabelSet::from([("b", "2"), ("a", "1")]);
        assert_eq!(set.to_string(), r#"{a="1", b="2"}"#);
    }

    #[test]
    fn split_host_port_variants() {
        assert_eq!(split_host_port("10.0.0.1:22"), ("10.0.0.1", Some("22")));
        assert_eq!(split_host_port("example.org"), ("example.org", None));
        assert_eq!(split_host_port("[::1]:9100"), ("::1", Some("9100")));
        assert_eq!(split_host_port("[::1]"), ("::1", None));
        assert_eq!(split_host_port("fe80::1"), ("fe80::1", None));
    }

    #[test]
    fn join_host_port_brackets_ipv6() {
        assert_eq!(join_host_port("10.0.0.1", 9100), "10.0.0.1:9100");
        assert_eq!(join_host_port("::1", "9100"), "[::1]:9100");
    }
}
