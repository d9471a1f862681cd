//! Ansible inventory and playbook shapes handed to the runner.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Free-form variables attached to hosts, groups and plays.
pub type Vars = BTreeMap<String, serde_json::Value>;

/// Name of the group every host belongs to.
pub const ALL_GROUP: &str = "all";

/// YAML inventory: group name to group.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    pub groups: BTreeMap<String, HostGroup>,
}

impl Inventory {
    /// The `all` group, created on first use.
    pub fn all_mut(&mut self) -> &mut HostGroup {
        self.groups.entry(ALL_GROUP.to_owned()).or_default()
    }

    #[must_use]
    pub fn all(&self) -> Option<&HostGroup> {
        self.groups.get(ALL_GROUP)
    }

    /// Host names of the `all` group, sorted.
    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.all()
            .into_iter()
            .flat_map(|group| group.hosts.keys().map(String::as_str))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct HostGroup {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub hosts: BTreeMap<String, Host>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: Vars,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Host {
    pub vars: Vars,
}

/// One Ansible play.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Playbook {
    pub name: String,
    pub hosts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_user: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: Vars,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
    #[serde(default, rename = "become")]
    pub become_root: bool,
}

impl Playbook {
    /// A play against every host of the inventory.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hosts: ALL_GROUP.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.become_root = true;
        self
    }

    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn role(mut self, name: impl Into<String>) -> Self {
        self.roles.push(Role {
            name: name.into(),
            ..Role::default()
        });
        self
    }

    #[must_use]
    pub fn task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(rename = "role")]
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: Vars,
}

/// A task: its name plus the module invocation, e.g. `{"copy": {...}}`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(flatten)]
    pub action: Vars,
}

impl Task {
    #[must_use]
    pub fn new(name: impl Into<String>, module: &str, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            action: Vars::from([(module.to_owned(), args)]),
        }
    }
}
