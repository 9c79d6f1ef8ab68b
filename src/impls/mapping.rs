//! Hooks for map-shaped containers.
//!
//! `BTreeMap<String, Value>` is the native type of untagged map nodes.
//! String-keyed maps keep the map shape in their payload; maps with other
//! key types cannot, since configuration map keys are strings, so they
//! encode as an enveloped sequence of `[key, value]` pairs instead.

use core::fmt;
use std::collections::{BTreeMap, HashMap};

use crate::config::{ConfigMap, Configuration};
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::impls::sequence::decode_element;
use crate::tag::{GenericTagCell, TypeTag};
use crate::value::{ConfigValue, Value};

// -----------------------------------------------------------------------------
// Tags

impl<K: TypeTag, V: TypeTag> TypeTag for BTreeMap<K, V> {
    fn module() -> &'static str {
        "alloc"
    }

    fn class_name() -> &'static str {
        static CELL: GenericTagCell = GenericTagCell::new();
        CELL.get_or_insert::<Self>(|| {
            format!("BTreeMap<{}, {}>", K::class_name(), V::class_name())
        })
    }
}

impl<K: TypeTag, V: TypeTag> TypeTag for HashMap<K, V> {
    fn module() -> &'static str {
        "std"
    }

    fn class_name() -> &'static str {
        static CELL: GenericTagCell = GenericTagCell::new();
        CELL.get_or_insert::<Self>(|| {
            format!("HashMap<{}, {}>", K::class_name(), V::class_name())
        })
    }
}

// -----------------------------------------------------------------------------
// Registration

/// The dynamic map hooks, installed with the builtins.
pub(crate) fn install(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
    hooks.register_encoder::<BTreeMap<String, Value>, _>(
        |entries, driver| {
            let mut map = ConfigMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), driver.get_config(&**value, None)?);
            }
            Ok(Configuration::Map(map))
        },
        false,
        false,
    )?;
    hooks.register_decoder::<BTreeMap<String, Value>, _>(
        |config, _, driver| {
            config
                .expect_map()?
                .iter()
                .map(|(key, node)| Ok((key.clone(), driver.configure(node.clone(), None)?)))
                .collect()
        },
        false,
    )?;
    Ok(())
}

/// Registers hooks for a string-keyed `BTreeMap<String, V>`.
///
/// The payload stays a plain map, readable as a dynamic map by anyone
/// without the hook.
#[track_caller]
pub fn register_string_map<V>(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError>
where
    V: ConfigValue + TypeTag + PartialEq + fmt::Debug,
{
    hooks.register_encoder::<BTreeMap<String, V>, _>(
        |entries, driver| {
            let mut map = ConfigMap::new();
            for (key, value) in entries {
                map.insert(key.clone(), driver.get_config(value, None)?);
            }
            Ok(Configuration::Map(map))
        },
        false,
        overwrite,
    )?;
    hooks.register_decoder::<BTreeMap<String, V>, _>(
        |config, _, driver| {
            config
                .expect_map()?
                .iter()
                .map(|(key, node)| Ok((key.clone(), decode_element::<V>(node, driver)?)))
                .collect()
        },
        overwrite,
    )
}

/// Registers hooks for a `BTreeMap<K, V>` with non-string keys, encoded as
/// an enveloped sequence of `[key, value]` pairs.
#[track_caller]
pub fn register_pair_map<K, V>(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError>
where
    K: ConfigValue + TypeTag + Ord + fmt::Debug,
    V: ConfigValue + TypeTag + PartialEq + fmt::Debug,
{
    hooks.register_encoder::<BTreeMap<K, V>, _>(
        |entries, driver| {
            let pairs = entries
                .iter()
                .map(|(key, value)| {
                    Ok(Configuration::Seq(vec![
                        driver.get_config(key, None)?,
                        driver.get_config(value, None)?,
                    ]))
                })
                .collect::<Result<Vec<_>, ConfigError>>()?;
            Ok(Configuration::Seq(pairs))
        },
        true,
        overwrite,
    )?;
    hooks.register_decoder::<BTreeMap<K, V>, _>(
        |config, _, driver| {
            config
                .expect_seq()?
                .iter()
                .map(|item| {
                    let pair = item.expect_seq()?;
                    if pair.len() != 2 {
                        return Err(ConfigError::malformed(format!(
                            "expected a [key, value] pair, found a sequence of {} elements",
                            pair.len()
                        )));
                    }
                    Ok((
                        decode_element::<K>(&pair[0], driver)?,
                        decode_element::<V>(&pair[1], driver)?,
                    ))
                })
                .collect()
        },
        overwrite,
    )
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{register_pair_map, register_string_map};
    use crate::boxed::{is_boxed_shape, read_tag};
    use crate::config::Configuration;
    use crate::engine::Engine;
    use crate::value::{ConfigValue, Value};

    #[test]
    fn dynamic_map_is_heterogeneous() {
        let engine = Engine::new().unwrap();
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        values.insert("count".to_string(), Box::new(3_i64));
        values.insert("name".to_string(), Box::new("belt".to_string()));
        let config = engine.get_config(&values, None, None).unwrap();
        assert!(!is_boxed_shape(&config));
        let rebuilt = engine.configure(config, None, None).unwrap();
        assert!((*rebuilt).dyn_eq(&values));
    }

    #[test]
    fn string_map_round_trips_untagged() {
        let mut engine = Engine::new().unwrap();
        register_string_map::<i64>(engine.hooks_mut(), false).unwrap();
        let mut values = BTreeMap::new();
        values.insert("a".to_string(), 1_i64);
        values.insert("b".to_string(), 2_i64);
        let config = engine.get_config(&values, Some(false), None).unwrap();
        assert!(matches!(config, Configuration::Map(_)));
        let rebuilt: BTreeMap<String, i64> = engine.configure_as(config, None, None).unwrap();
        assert_eq!(rebuilt, values);
    }

    #[test]
    fn pair_map_encodes_as_pairs() {
        let mut engine = Engine::new().unwrap();
        register_pair_map::<i64, String>(engine.hooks_mut(), false).unwrap();
        let mut values = BTreeMap::new();
        values.insert(1_i64, "one".to_string());
        values.insert(2_i64, "two".to_string());
        let config = engine.get_config(&values, None, None).unwrap();
        let (pair, payload) = read_tag(&config).unwrap();
        assert_eq!(pair.class(), "BTreeMap<i64, String>");
        assert_eq!(
            payload.as_seq().unwrap()[0],
            Configuration::Seq(vec![
                Configuration::Int(1),
                Configuration::Str("one".into())
            ])
        );
        let rebuilt: BTreeMap<i64, String> = engine.configure_as(config, None, None).unwrap();
        assert_eq!(rebuilt, values);
    }

    #[test]
    fn lopsided_pair_is_malformed() {
        let mut engine = Engine::new().unwrap();
        register_pair_map::<i64, String>(engine.hooks_mut(), false).unwrap();
        let config = Configuration::Seq(vec![Configuration::Seq(vec![Configuration::Int(1)])]);
        let err = engine
            .configure_as::<BTreeMap<i64, String>>(config, None, None)
            .unwrap_err();
        assert!(err.to_string().contains("[key, value]"));
    }
}
