use core::any::TypeId;
use core::fmt;
use std::collections::BTreeMap;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::ConfigError;
use crate::value::Value;

/// A mapping node of a [`Configuration`] tree.
///
/// `BTreeMap` keeps key order deterministic, so encoding the same object
/// graph twice produces byte-identical documents.
pub type ConfigMap = BTreeMap<String, Configuration>;

// -----------------------------------------------------------------------------
// Configuration

/// A node of the intermediate configuration tree.
///
/// This is the closed set of shapes the engine encodes into and decodes
/// from. Every node maps one-to-one onto a JSON value, and a document
/// round-trips through [`serde_json`] without loss.
///
/// # Examples
///
/// ```
/// use cfgbox::config::Configuration;
///
/// let config: Configuration = serde_json::from_str(r#"{"answer": 42}"#).unwrap();
/// assert_eq!(config.as_map().unwrap()["answer"], Configuration::Int(42));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub enum Configuration {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<Configuration>),
    Map(ConfigMap),
}

impl Configuration {
    /// Returns a short name for the node's shape, for diagnostics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Configuration::Null => "null",
            Configuration::Bool(_) => "bool",
            Configuration::Int(_) => "int",
            Configuration::Float(_) => "float",
            Configuration::Str(_) => "str",
            Configuration::Seq(_) => "seq",
            Configuration::Map(_) => "map",
        }
    }

    /// The [`TypeId`] of the native type an untagged node decodes into.
    pub fn native_type_id(&self) -> TypeId {
        match self {
            Configuration::Null => TypeId::of::<()>(),
            Configuration::Bool(_) => TypeId::of::<bool>(),
            Configuration::Int(_) => TypeId::of::<i64>(),
            Configuration::Float(_) => TypeId::of::<f64>(),
            Configuration::Str(_) => TypeId::of::<String>(),
            Configuration::Seq(_) => TypeId::of::<Vec<Value>>(),
            Configuration::Map(_) => TypeId::of::<BTreeMap<String, Value>>(),
        }
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Configuration::Null)
    }

    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Configuration::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Configuration::Int(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the node as a float, widening an integer node if needed.
    #[inline]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Configuration::Float(value) => Some(*value),
            Configuration::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Configuration::Str(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn as_seq(&self) -> Option<&[Configuration]> {
        match self {
            Configuration::Seq(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_map(&self) -> Option<&ConfigMap> {
        match self {
            Configuration::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Like [`as_str`](Self::as_str), but produces a
    /// [`ConfigError::MalformedConfiguration`] naming the actual shape.
    pub fn expect_str(&self) -> Result<&str, ConfigError> {
        self.as_str()
            .ok_or_else(|| ConfigError::malformed(format!("expected a str node, found {}", self.kind())))
    }

    /// Like [`as_seq`](Self::as_seq), but produces a
    /// [`ConfigError::MalformedConfiguration`] naming the actual shape.
    pub fn expect_seq(&self) -> Result<&[Configuration], ConfigError> {
        self.as_seq()
            .ok_or_else(|| ConfigError::malformed(format!("expected a seq node, found {}", self.kind())))
    }

    /// Like [`as_map`](Self::as_map), but produces a
    /// [`ConfigError::MalformedConfiguration`] naming the actual shape.
    pub fn expect_map(&self) -> Result<&ConfigMap, ConfigError> {
        self.as_map()
            .ok_or_else(|| ConfigError::malformed(format!("expected a map node, found {}", self.kind())))
    }
}

impl Default for Configuration {
    #[inline]
    fn default() -> Self {
        Configuration::Null
    }
}

impl From<bool> for Configuration {
    #[inline]
    fn from(value: bool) -> Self {
        Configuration::Bool(value)
    }
}

impl From<i64> for Configuration {
    #[inline]
    fn from(value: i64) -> Self {
        Configuration::Int(value)
    }
}

impl From<f64> for Configuration {
    #[inline]
    fn from(value: f64) -> Self {
        Configuration::Float(value)
    }
}

impl From<String> for Configuration {
    #[inline]
    fn from(value: String) -> Self {
        Configuration::Str(value)
    }
}

impl From<&str> for Configuration {
    #[inline]
    fn from(value: &str) -> Self {
        Configuration::Str(value.to_string())
    }
}

impl From<Vec<Configuration>> for Configuration {
    #[inline]
    fn from(items: Vec<Configuration>) -> Self {
        Configuration::Seq(items)
    }
}

impl From<ConfigMap> for Configuration {
    #[inline]
    fn from(entries: ConfigMap) -> Self {
        Configuration::Map(entries)
    }
}

// -----------------------------------------------------------------------------
// Serde

impl Serialize for Configuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Configuration::Null => serializer.serialize_unit(),
            Configuration::Bool(value) => serializer.serialize_bool(*value),
            Configuration::Int(value) => serializer.serialize_i64(*value),
            Configuration::Float(value) => serializer.serialize_f64(*value),
            Configuration::Str(value) => serializer.serialize_str(value),
            Configuration::Seq(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Configuration::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

struct ConfigurationVisitor;

impl<'de> Visitor<'de> for ConfigurationVisitor {
    type Value = Configuration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a configuration node")
    }

    #[inline]
    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Configuration::Null)
    }

    #[inline]
    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(Configuration::Null)
    }

    #[inline]
    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
        deserializer.deserialize_any(self)
    }

    #[inline]
    fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
        Ok(Configuration::Bool(value))
    }

    #[inline]
    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        Ok(Configuration::Int(value))
    }

    #[inline]
    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        // Values past i64::MAX lose the integer shape rather than fail.
        match i64::try_from(value) {
            Ok(value) => Ok(Configuration::Int(value)),
            Err(_) => Ok(Configuration::Float(value as f64)),
        }
    }

    #[inline]
    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
        Ok(Configuration::Float(value))
    }

    #[inline]
    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        Ok(Configuration::Str(value.to_string()))
    }

    #[inline]
    fn visit_string<E: de::Error>(self, value: String) -> Result<Self::Value, E> {
        Ok(Configuration::Str(value))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(Configuration::Seq(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut entries = ConfigMap::new();
        while let Some((key, value)) = map.next_entry::<String, Configuration>()? {
            entries.insert(key, value);
        }
        Ok(Configuration::Map(entries))
    }
}

impl<'de> Deserialize<'de> for Configuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConfigurationVisitor)
    }
}

// -----------------------------------------------------------------------------
// Tests
