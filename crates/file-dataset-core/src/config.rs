//! Connection configuration values and cache-key normalization.
//!
//! A connection configuration is a string-keyed mapping of scalar or
//! nested values. Two configurations describe the same connection iff
//! their *normalized* representations are equal, where normalization is:
//!
//! - mappings become their entries sorted by key, each value normalized
//!   recursively (key order never matters);
//! - sequences become their elements normalized recursively, order
//!   preserved (element order always matters);
//! - scalars pass through unchanged, except floats, which normalize to
//!   their IEEE-754 bit pattern so the result is hashable.
//!
//! The normalized form ([`ConfigKey`]) is the cache key used by
//! [`crate::connection::ConnectionRegistry`]. The algorithm is part of
//! this crate's contract: independent callers that build logically equal
//! configurations must land on the same registry entry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A scalar or nested configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    /// Boolean scalar.
    Bool(bool),
    /// 64-bit signed integer scalar.
    Int(i64),
    /// 64-bit floating point scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Sequence of values. Element order is significant.
    List(Vec<ConfigValue>),
    /// Nested string-keyed mapping. Key order is not significant.
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Normalize this value into its hashable cache-key form.
    pub fn normalized(&self) -> ConfigKey {
        match self {
            ConfigValue::Bool(b) => ConfigKey::Bool(*b),
            ConfigValue::Int(n) => ConfigKey::Int(*n),
            ConfigValue::Float(f) => ConfigKey::Float(f.to_bits()),
            ConfigValue::Str(s) => ConfigKey::Str(s.clone()),
            ConfigValue::List(items) => {
                ConfigKey::Seq(items.iter().map(ConfigValue::normalized).collect())
            }
            ConfigValue::Map(entries) => ConfigKey::Entries(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.normalized()))
                    .collect(),
            ),
        }
    }

    /// Borrow the string contents if this value is a string scalar.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        ConfigValue::Float(value)
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::Str(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::Str(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        ConfigValue::List(value)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(value: BTreeMap<String, ConfigValue>) -> Self {
        ConfigValue::Map(value)
    }
}

/// Fully normalized, hashable form of a configuration value.
///
/// Produced by [`ConfigValue::normalized`] and
/// [`ConnectionConfig::normalized`]; equality of `ConfigKey`s defines
/// equality of configurations for connection caching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// IEEE-754 bit pattern of a float scalar.
    Float(u64),
    /// String scalar.
    Str(String),
    /// Normalized sequence elements in their original order.
    Seq(Vec<ConfigKey>),
    /// Normalized mapping entries, sorted by key.
    Entries(Vec<(String, ConfigKey)>),
}

/// Format-specific argument map passed to backend readers and writers.
///
/// Datasets store fully-populated copies of these maps at construction
/// time, so later mutation of the map a caller passed in never changes
/// the dataset's effective arguments.
pub type FormatArgs = BTreeMap<String, ConfigValue>;

/// Declarative configuration for a backend connection.
///
/// One required entry, [`ConnectionConfig::BACKEND_KEY`], names the
/// backend kind; every other entry is a backend-specific connection
/// parameter handed to the connector verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionConfig {
    entries: BTreeMap<String, ConfigValue>,
}

impl ConnectionConfig {
    /// Entry that identifies the backend kind.
    pub const BACKEND_KEY: &'static str = "backend";

    /// Create an empty connection configuration.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Add an entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert an entry, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.entries.get(key)
    }

    /// Remove and return an entry by key.
    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.entries.remove(key)
    }

    /// The configured backend kind, if present and a string.
    pub fn backend_kind(&self) -> Option<&str> {
        self.get(Self::BACKEND_KEY).and_then(ConfigValue::as_str)
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ConfigValue)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the configuration has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize the whole configuration into its cache-key form.
    pub fn normalized(&self) -> ConfigKey {
        ConfigKey::Entries(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.normalized()))
                .collect(),
        )
    }
}

impl Default for ConnectionConfig {
    /// An in-process DataFusion session with an in-memory catalog.
    fn default() -> Self {
        Self::new().with(Self::BACKEND_KEY, "datafusion")
    }
}
