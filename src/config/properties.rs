//! Property bags and the resolution chain.
//!
//! # Data Flow
//! ```text
//! request properties ─┐
//! client properties  ─┼─→ PropertyChain (first hit wins) ─→ config::parse ─→ setting
//! system properties  ─┘
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::connector::{ConnectorConfiguration, SettingsExtension};
use crate::config::keys;

/// A single externally supplied property value.
#[derive(Clone)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Arbitrary shared object: override configurations, suppliers, controllers.
    Object(Arc<dyn Any + Send + Sync>),
}

impl PropertyValue {
    /// The string form of a scalar value. Objects and nulls have none.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Downcast an object value.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            PropertyValue::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl fmt::Debug for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "Null"),
            PropertyValue::Bool(b) => write!(f, "Bool({})", b),
            PropertyValue::Int(i) => write!(f, "Int({})", i),
            PropertyValue::Str(s) => write!(f, "Str({:?})", s),
            PropertyValue::Object(_) => write!(f, "Object(..)"),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => write!(f, "null"),
            PropertyValue::Bool(b) => write!(f, "{}", b),
            PropertyValue::Int(i) => write!(f, "{}", i),
            PropertyValue::Str(s) => write!(f, "{}", s),
            PropertyValue::Object(_) => write!(f, "<object>"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Int(value.into())
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        PropertyValue::Int(value.into())
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Str(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Str(value)
    }
}

/// Anything that can answer a named property lookup.
pub trait PropertySource {
    fn property(&self, key: &str) -> Option<&PropertyValue>;
}

/// A string-keyed property bag.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, PropertyValue>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a scalar property.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Store an arbitrary object under `key`.
    pub fn set_object<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) -> &mut Self {
        self.values
            .insert(key.into(), PropertyValue::Object(Arc::new(value)));
        self
    }

    /// Store an override configuration under the well-known key.
    pub fn set_configuration<X: SettingsExtension>(
        &mut self,
        configuration: ConnectorConfiguration<X>,
    ) -> &mut Self {
        self.set_object(keys::CONNECTOR_CONFIGURATION, configuration)
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyValue> {
        self.values.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl PropertySource for Properties {
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(key)
    }
}

/// Process-level property layer, the lowest link of the request chain.
///
/// Keys are normalized to environment-variable form: upper case with `.` and `-`
/// replaced by `_`, so `restlink.config.client.readTimeout` is read from
/// `RESTLINK_CONFIG_CLIENT_READTIMEOUT`.
#[derive(Debug, Clone, Default)]
pub struct SystemProperties {
    values: HashMap<String, PropertyValue>,
}

impl SystemProperties {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = vars
            .into_iter()
            .map(|(k, v)| (normalize(k.as_ref()), PropertyValue::Str(v.into())))
            .collect();
        Self { values }
    }
}

impl PropertySource for SystemProperties {
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.values.get(&normalize(key))
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '.' | '-' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// Ordered property layers; the first layer holding a key wins.
#[derive(Default)]
pub struct PropertyChain<'a> {
    layers: Vec<&'a dyn PropertySource>,
}

impl<'a> PropertyChain<'a> {
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Append a lower-precedence layer.
    pub fn then(mut self, layer: &'a dyn PropertySource) -> Self {
        self.layers.push(layer);
        self
    }
}

impl PropertySource for PropertyChain<'_> {
    fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.layers.iter().find_map(|layer| layer.property(key))
    }
}
