//! Prometheus-style relabeling of discovered label sets.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::labels::{LabelSet, LabelSetBuilder};

const DEFAULT_REGEX: &str = "(.*)";

#[derive(thiserror::Error, Debug)]
pub enum RelabelError {
    #[error("invalid relabel regex '{regex}': {source}")]
    InvalidRegex {
        regex: String,
        #[source]
        source: regex::Error,
    },
    #[error("relabel action '{action}' requires 'target_label'")]
    MissingTargetLabel { action: RelabelAction },
    #[error("relabel action 'hashmod' requires a non-zero 'modulus'")]
    ZeroModulus,
    #[error("'{target_label}' is not a valid target label for action '{action}'")]
    InvalidTargetLabel {
        action: RelabelAction,
        target_label: String,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelabelAction {
    #[default]
    Replace,
    Keep,
    Drop,
    KeepEqual,
    DropEqual,
    HashMod,
    LabelMap,
    LabelDrop,
    LabelKeep,
    Lowercase,
    Uppercase,
}

impl fmt::Display for RelabelAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Replace => "replace",
            Self::Keep => "keep",
            Self::Drop => "drop",
            Self::KeepEqual => "keepequal",
            Self::DropEqual => "dropequal",
            Self::HashMod => "hashmod",
            Self::LabelMap => "labelmap",
            Self::LabelDrop => "labeldrop",
            Self::LabelKeep => "labelkeep",
            Self::Lowercase => "lowercase",
            Self::Uppercase => "uppercase",
        })
    }
}

/// Fully anchored regular expression, kept together with its source text.
#[derive(Clone, Debug)]
pub struct RelabelRegex {
    source: String,
    compiled: Regex,
}

impl RelabelRegex {
    /// # Errors
    /// Returns [`RelabelError::InvalidRegex`] if the pattern does not compile.
    pub fn new(pattern: &str) -> Result<Self, RelabelError> {
        let compiled =
            Regex::new(&format!("^(?s:{pattern})$")).map_err(|source| RelabelError::InvalidRegex {
                regex: pattern.to_owned(),
                source,
            })?;
        Ok(Self {
            source: pattern.to_owned(),
            compiled,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for RelabelRegex {
    fn default() -> Self {
        Self {
            source: DEFAULT_REGEX.to_owned(),
            compiled: Regex::new(&format!("^(?s:{DEFAULT_REGEX})$"))
                .unwrap_or_else(|_| unreachable!("default relabel regex compiles")),
        }
    }
}

impl PartialEq for RelabelRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for RelabelRegex {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for RelabelRegex {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(d)?;
        Self::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// One relabeling step.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelabelConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub source_labels: Vec<String>,
    pub separator: String,
    pub regex: RelabelRegex,
    #[serde(skip_serializing_if = "is_zero")]
    pub modulus: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub target_label: String,
    pub replacement: String,
    pub action: RelabelAction,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &u64) -> bool {
    *v == 0
}

impl Default for RelabelConfig {
    fn default() -> Self {
        Self {
            source_labels: Vec::new(),
            separator: ";".to_owned(),
            regex: RelabelRegex::default(),
            modulus: 0,
            target_label: String::new(),
            replacement: "$1".to_owned(),
            action: RelabelAction::Replace,
        }
    }
}

impl RelabelConfig {
    /// Checks the fields the action depends on.
    ///
    /// # Errors
    /// Returns a [`RelabelError`] describing the first inconsistency.
    pub fn validate(&self) -> Result<(), RelabelError> {
        let needs_target = matches!(
            self.action,
            RelabelAction::Replace
                | RelabelAction::HashMod
                | RelabelAction::Lowercase
                | RelabelAction::Uppercase
                | RelabelAction::KeepEqual
                | RelabelAction::DropEqual
        );
        if needs_target && self.target_label.is_empty() {
            return Err(RelabelError::MissingTargetLabel {
                action: self.action,
            });
        }
        if self.action == RelabelAction::HashMod && self.modulus == 0 {
            return Err(RelabelError::ZeroModulus);
        }
        // Replace may build its target from capture groups; everyone else needs a literal name.
        if needs_target
            && self.action != RelabelAction::Replace
            && !is_valid_label_name(&self.target_label)
        {
            return Err(RelabelError::InvalidTargetLabel {
                action: self.action,
                target_label: self.target_label.clone(),
            });
        }
        Ok(())
    }
}

/// Runs `configs` over `labels` in order.
///
/// Returns `Ok(None)` when a step drops the target.
///
/// # Errors
/// Returns a [`RelabelError`] if one of the configs is inconsistent.
pub fn process(
    labels: &LabelSet,
    configs: &[RelabelConfig],
) -> Result<Option<LabelSet>, RelabelError> {
    let mut lb = labels.builder();
    for cfg in configs {
        cfg.validate()?;
        if !apply(cfg, &mut lb) {
            return Ok(None);
        }
    }
    Ok(Some(lb.build()))
}

fn apply(cfg: &RelabelConfig, lb: &mut LabelSetBuilder) -> bool {
    let value = cfg
        .source_labels
        .iter()
        .map(|name| lb.get(name).unwrap_or_default())
        .collect::<Vec<_>>()
        .join(&cfg.separator);
    let regex = &cfg.regex.compiled;

    match cfg.action {
        RelabelAction::Drop => return !regex.is_match(&value),
        RelabelAction::Keep => return regex.is_match(&value),
        RelabelAction::DropEqual => {
            return lb.get(&cfg.target_label).unwrap_or_default() != value;
        }
        RelabelAction::KeepEqual => {
            return lb.get(&cfg.target_label).unwrap_or_default() == value;
        }
        RelabelAction::Replace => {
            let Some(caps) = regex.captures(&value) else {
                return true;
            };
            let mut target = String::new();
            caps.expand(&cfg.target_label, &mut target);
            if !is_valid_label_name(&target) {
                return true;
            }
            let mut result = String::new();
            caps.expand(&cfg.replacement, &mut result);
            lb.set(target, result);
        }
        RelabelAction::Lowercase => {
            lb.set(cfg.target_label.as_str(), value.to_lowercase());
        }
        RelabelAction::Uppercase => {
            lb.set(cfg.target_label.as_str(), value.to_uppercase());
        }
        RelabelAction::HashMod => {
            let bucket = hash_u64(&value) % cfg.modulus;
            lb.set(cfg.target_label.as_str(), bucket.to_string());
        }
        RelabelAction::LabelMap => {
            let renamed: Vec<(String, String)> = lb
                .iter()
                .filter(|(name, _)| regex.is_match(name))
                .map(|(name, v)| {
                    (
                        regex.replace(name, cfg.replacement.as_str()).into_owned(),
                        v.to_owned(),
                    )
                })
                .collect();
            for (name, v) in renamed {
                lb.set(name, v);
            }
        }
        RelabelAction::LabelDrop => {
            lb.retain(|name| !regex.is_match(name));
        }
        RelabelAction::LabelKeep => {
            lb.retain(|name| regex.is_match(name));
        }
    }
    true
}

fn hash_u64(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&digest[digest.len() - 8..]);
    u64::from_be_bytes(tail)
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
