//! Module configuration registry.
//!
//! Each service module contributes one configuration type. The registry maps
//! the document key `<name>_module` to a decode/encode function pair for that
//! type, so the `modules` section of a target group can be decoded without
//! knowing the set of modules in advance.
//!
//! Entries are kept sorted by document key. Decoding yields exactly one
//! configuration per registered module in that order, and encoding writes keys
//! in that order, whatever order the modules registered in.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::contracts::{Module, ModuleOptions};

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("module '{name}' is registered twice")]
    DuplicateName { name: &'static str },
    #[error("unknown module '{key}'")]
    UnregisteredModule { key: String },
    #[error("configuration type '{type_name}' is not registered")]
    UnregisteredType { type_name: &'static str },
    #[error("modules section must be a mapping, found {found}")]
    NotAMapping { found: &'static str },
    #[error("invalid configuration for module '{module}': {source}")]
    Decode {
        module: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode configuration for module '{module}': {source}")]
    Encode {
        module: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid configuration for module '{module}': {source}")]
    Invalid {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Configuration of one service module.
///
/// Implementors should carry `#[serde(default, deny_unknown_fields)]` so that
/// partial documents decode over [`Default`] and typos are rejected.
pub trait ServiceConfig:
    Serialize + DeserializeOwned + Default + Clone + PartialEq + fmt::Debug + Send + Sync + 'static
{
    /// Stable module name; the document key is `<NAME>_module`.
    const NAME: &'static str;

    fn is_enabled(&self) -> bool;

    /// Checks cross-field constraints after decoding.
    ///
    /// # Errors
    /// Returns an error describing the invalid field.
    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Instantiates the module for one target group.
    ///
    /// # Errors
    /// Returns an error if the module cannot be created from this configuration.
    fn build(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>>;
}

/// Object-safe view of a [`ServiceConfig`].
pub trait ModuleConfig: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;
    fn is_enabled(&self) -> bool;

    /// # Errors
    /// Returns an error if the module cannot be created from this configuration.
    fn new_module(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>>;

    fn type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
    fn clone_box(&self) -> Box<dyn ModuleConfig>;
    fn eq_config(&self, other: &dyn ModuleConfig) -> bool;
}

impl<T: ServiceConfig> ModuleConfig for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn is_enabled(&self) -> bool {
        ServiceConfig::is_enabled(self)
    }

    fn new_module(&self, opts: &ModuleOptions) -> anyhow::Result<Box<dyn Module>> {
        self.build(opts)
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ModuleConfig> {
        Box::new(self.clone())
    }

    fn eq_config(&self, other: &dyn ModuleConfig) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }
}

impl Clone for Box<dyn ModuleConfig> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl PartialEq for dyn ModuleConfig {
    fn eq(&self, other: &Self) -> bool {
        self.eq_config(other)
    }
}

/// Decoded `modules` section: one configuration per registered module.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModuleConfigs(Vec<Box<dyn ModuleConfig>>);

impl ModuleConfigs {
    pub fn iter(&self) -> impl Iterator<Item = &dyn ModuleConfig> {
        self.0.iter().map(Box::as_ref)
    }

    /// Enabled configurations, in registry order.
    pub fn enabled(&self) -> impl Iterator<Item = &dyn ModuleConfig> {
        self.iter().filter(|c| c.is_enabled())
    }

    #[must_use]
    pub fn get<T: ServiceConfig>(&self) -> Option<&T> {
        self.iter().find_map(|c| c.as_any().downcast_ref::<T>())
    }

    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&dyn ModuleConfig> {
        self.iter().find(|c| c.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Box<dyn ModuleConfig>> for ModuleConfigs {
    fn from_iter<I: IntoIterator<Item = Box<dyn ModuleConfig>>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

type DecodeFn = fn(Option<&Value>) -> Result<Box<dyn ModuleConfig>, RegistryError>;
type EncodeFn = fn(&dyn ModuleConfig) -> Result<Value, RegistryError>;

struct Entry {
    name: &'static str,
    field_key: String,
    type_id: TypeId,
    decode: DecodeFn,
    encode: EncodeFn,
}

fn decode_as<T: ServiceConfig>(raw: Option<&Value>) -> Result<Box<dyn ModuleConfig>, RegistryError> {
    let config = match raw {
        None | Some(Value::Null) => T::default(),
        Some(value) => T::deserialize(value).map_err(|source| RegistryError::Decode {
            module: T::NAME,
            source,
        })?,
    };
    config.validate().map_err(|source| RegistryError::Invalid {
        module: T::NAME,
        source,
    })?;
    Ok(Box::new(config))
}

fn encode_as<T: ServiceConfig>(config: &dyn ModuleConfig) -> Result<Value, RegistryError> {
    let Some(config) = config.as_any().downcast_ref::<T>() else {
        return Err(RegistryError::UnregisteredType {
            type_name: config.type_name(),
        });
    };
    serde_json::to_value(config).map_err(|source| RegistryError::Encode {
        module: T::NAME,
        source,
    })
}

/// Document key of a module.
#[must_use]
pub fn field_key(name: &str) -> String {
    format!("{name}_module")
}

/// Collects module configuration types before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: Vec<Entry>,
}

impl RegistryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, keeping entries sorted by document key.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateName`] if a module with the same name is registered.
    pub fn register<T: ServiceConfig>(&mut self) -> Result<&mut Self, RegistryError> {
        if self.entries.iter().any(|e| e.name == T::NAME) {
            return Err(RegistryError::DuplicateName { name: T::NAME });
        }
        let entry = Entry {
            name: T::NAME,
            field_key: field_key(T::NAME),
            type_id: TypeId::of::<T>(),
            decode: decode_as::<T>,
            encode: encode_as::<T>,
        };
        let at = self
            .entries
            .partition_point(|e| e.field_key < entry.field_key);
        self.entries.insert(at, entry);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ModuleRegistry {
        let by_type = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.type_id, i))
            .collect();
        ModuleRegistry {
            entries: self.entries,
            by_type,
        }
    }
}

/// Frozen set of module configuration types.
pub struct ModuleRegistry {
    entries: Vec<Entry>,
    by_type: HashMap<TypeId, usize>,
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl ModuleRegistry {
    #[must_use]
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Builds a registry from every module linked into the binary.
    ///
    /// # Errors
    /// Returns [`RegistryError::DuplicateName`] if two linked modules share a name.
    pub fn discover() -> Result<Self, RegistryError> {
        let mut builder = RegistryBuilder::new();
        for registration in inventory::iter::<ConfigRegistration> {
            tracing::debug!(module = registration.name, "Registering module configuration");
            (registration.register)(&mut builder)?;
        }
        let registry = builder.build();
        tracing::info!(modules = registry.len(), "Module registry built");
        Ok(registry)
    }

    /// Registered module names, in document key order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    #[must_use]
    pub fn field_key_of(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .map(|e| e.field_key.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Decodes a `modules` document.
    ///
    /// A missing document or a missing/null entry yields the module's defaults.
    ///
    /// # Errors
    /// Fails on unknown keys, a non-mapping document, or an invalid entry.
    pub fn decode_configs(&self, doc: &Value) -> Result<ModuleConfigs, RegistryError> {
        let empty = Map::new();
        let map = match doc {
            Value::Null => &empty,
            Value::Object(map) => map,
            other => {
                return Err(RegistryError::NotAMapping {
                    found: value_kind(other),
                });
            }
        };

        if let Some(key) = map
            .keys()
            .find(|key| !self.entries.iter().any(|e| &e.field_key == *key))
        {
            return Err(RegistryError::UnregisteredModule { key: key.clone() });
        }

        self.entries
            .iter()
            .map(|e| (e.decode)(map.get(&e.field_key)))
            .collect()
    }

    /// Encodes configurations back into a `modules` document.
    ///
    /// # Errors
    /// Fails if a configuration's type is not registered or cannot be serialized.
    pub fn encode_configs(&self, configs: &ModuleConfigs) -> Result<Value, RegistryError> {
        let mut slots: Vec<Option<Value>> = vec![None; self.entries.len()];
        for config in configs.iter() {
            let Some(&idx) = self.by_type.get(&config.as_any().type_id()) else {
                return Err(RegistryError::UnregisteredType {
                    type_name: config.type_name(),
                });
            };
            slots[idx] = Some((self.entries[idx].encode)(config)?);
        }

        let mut map = Map::new();
        for (entry, value) in self.entries.iter().zip(slots) {
            if let Some(value) = value {
                map.insert(entry.field_key.clone(), value);
            }
        }
        Ok(Value::Object(map))
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

/// Link-time registration of a module configuration type.
///
/// Submitted by [`register_module!`](crate::register_module) and collected by
/// [`ModuleRegistry::discover`].
pub struct ConfigRegistration {
    pub name: &'static str,
    register: fn(&mut RegistryBuilder) -> Result<(), RegistryError>,
}

impl ConfigRegistration {
    #[must_use]
    pub const fn of<T: ServiceConfig>() -> Self {
        Self {
            name: T::NAME,
            register: register_one::<T>,
        }
    }
}

fn register_one<T: ServiceConfig>(builder: &mut RegistryBuilder) -> Result<(), RegistryError> {
    builder.register::<T>().map(|_| ())
}

inventory::collect!(ConfigRegistration);

/// Registers a [`ServiceConfig`] type for [`ModuleRegistry::discover`].
///
/// ```ignore
/// deploykit::register_module!(LinuxConfig);
/// ```
#[macro_export]
macro_rules! register_module {
    ($config:ty) => {
        $crate::__private::inventory::submit! {
            $crate::registry::ConfigRegistration::of::<$config>()
        }
    };
}
