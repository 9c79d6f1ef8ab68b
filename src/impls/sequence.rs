//! Hooks for sequence-shaped containers.
//!
//! `Vec<Value>` is the native type of untagged sequence nodes and is
//! installed with the builtins. Homogeneous containers (`Vec<T>`, sets,
//! tuples) are opt-in per element type through the `register_*` functions,
//! since a generic hook cannot be registered for every possible `T` up
//! front. Sets and tuples always encode enveloped: their payloads are plain
//! sequences and would otherwise decode back as `Vec<Value>`.

use core::any::TypeId;
use core::fmt;
use core::hash::Hash;
use std::collections::{BTreeSet, HashSet};

use crate::config::Configuration;
use crate::engine::Driver;
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::tag::{GenericTagCell, TypeTag};
use crate::value::{ConfigValue, Value};

// -----------------------------------------------------------------------------
// Tags

impl<T: TypeTag> TypeTag for Vec<T> {
    fn module() -> &'static str {
        "alloc"
    }

    fn class_name() -> &'static str {
        static CELL: GenericTagCell = GenericTagCell::new();
        CELL.get_or_insert::<Self>(|| format!("Vec<{}>", T::class_name()))
    }
}

impl<T: TypeTag> TypeTag for HashSet<T> {
    fn module() -> &'static str {
        "std"
    }

    fn class_name() -> &'static str {
        static CELL: GenericTagCell = GenericTagCell::new();
        CELL.get_or_insert::<Self>(|| format!("HashSet<{}>", T::class_name()))
    }
}

impl<T: TypeTag> TypeTag for BTreeSet<T> {
    fn module() -> &'static str {
        "alloc"
    }

    fn class_name() -> &'static str {
        static CELL: GenericTagCell = GenericTagCell::new();
        CELL.get_or_insert::<Self>(|| format!("BTreeSet<{}>", T::class_name()))
    }
}

// -----------------------------------------------------------------------------
// Element plumbing

fn encode_elements<'a, I>(items: I, driver: &Driver<'_>) -> Result<Configuration, ConfigError>
where
    I: IntoIterator<Item = &'a dyn ConfigValue>,
{
    let items = items
        .into_iter()
        .map(|item| driver.get_config(item, None))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Configuration::Seq(items))
}

pub(crate) fn decode_element<T: ConfigValue>(
    node: &Configuration,
    driver: &Driver<'_>,
) -> Result<T, ConfigError> {
    driver
        .configure_with(node.clone(), None, Some(TypeId::of::<T>()))?
        .take::<T>()
        .map_err(|value| {
            ConfigError::malformed(format!(
                "sequence element decoded to a `{}`",
                (*value).type_name()
            ))
        })
}

// -----------------------------------------------------------------------------
// Registration

/// The dynamic sequence hooks, installed with the builtins.
pub(crate) fn install(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
    hooks.register_encoder::<Vec<Value>, _>(
        |values, driver| encode_elements(values.iter().map(|value| &**value), driver),
        false,
        false,
    )?;
    hooks.register_decoder::<Vec<Value>, _>(
        |config, _, driver| {
            config
                .expect_seq()?
                .iter()
                .map(|node| driver.configure(node.clone(), None))
                .collect()
        },
        false,
    )?;
    Ok(())
}

/// Registers hooks for a homogeneous `Vec<T>`.
///
/// The payload stays a plain sequence, so untyped output of a `Vec<T>` is
/// readable as a dynamic sequence by anyone without the hook.
#[track_caller]
pub fn register_vec<T>(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError>
where
    T: ConfigValue + TypeTag + PartialEq + fmt::Debug,
{
    hooks.register_encoder::<Vec<T>, _>(
        |values, driver| encode_elements(values.iter().map(|value| value as &dyn ConfigValue), driver),
        false,
        overwrite,
    )?;
    hooks.register_decoder::<Vec<T>, _>(
        |config, _, driver| {
            config
                .expect_seq()?
                .iter()
                .map(|node| decode_element::<T>(node, driver))
                .collect()
        },
        overwrite,
    )
}

/// Registers hooks for a `HashSet<T>`. Always enveloped.
#[track_caller]
pub fn register_hash_set<T>(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError>
where
    T: ConfigValue + TypeTag + Eq + Hash + fmt::Debug,
{
    hooks.register_encoder::<HashSet<T>, _>(
        |values, driver| encode_elements(values.iter().map(|value| value as &dyn ConfigValue), driver),
        true,
        overwrite,
    )?;
    hooks.register_decoder::<HashSet<T>, _>(
        |config, _, driver| {
            config
                .expect_seq()?
                .iter()
                .map(|node| decode_element::<T>(node, driver))
                .collect()
        },
        overwrite,
    )
}

/// Registers hooks for a `BTreeSet<T>`. Always enveloped.
#[track_caller]
pub fn register_btree_set<T>(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError>
where
    T: ConfigValue + TypeTag + Ord + fmt::Debug,
{
    hooks.register_encoder::<BTreeSet<T>, _>(
        |values, driver| encode_elements(values.iter().map(|value| value as &dyn ConfigValue), driver),
        true,
        overwrite,
    )?;
    hooks.register_decoder::<BTreeSet<T>, _>(
        |config, _, driver| {
            config
                .expect_seq()?
                .iter()
                .map(|node| decode_element::<T>(node, driver))
                .collect()
        },
        overwrite,
    )
}

// -----------------------------------------------------------------------------
// Tuples

/// A tuple that can act as a fixed-length sequence payload.
///
/// Implemented for tuples of up to four elements; [`register_tuple`] wires
/// an implementor into a registry.
pub trait TupleCodec: ConfigValue + TypeTag + Sized {
    fn encode(&self, driver: &Driver<'_>) -> Result<Configuration, ConfigError>;
    fn decode(config: &Configuration, driver: &Driver<'_>) -> Result<Self, ConfigError>;
}

/// Registers hooks for a tuple type. Always enveloped.
#[track_caller]
pub fn register_tuple<T: TupleCodec>(
    hooks: &mut HookRegistry,
    overwrite: bool,
) -> Result<(), ConfigError> {
    hooks.register_encoder::<T, _>(|value, driver| value.encode(driver), true, overwrite)?;
    hooks.register_decoder::<T, _>(|config, _, driver| T::decode(config, driver), overwrite)
}

macro_rules! impl_tuple_codec {
    ($len:literal => $($idx:tt : $name:ident),+) => {
        impl<$($name: TypeTag),+> TypeTag for ($($name,)+) {
            fn module() -> &'static str {
                "core"
            }

            fn class_name() -> &'static str {
                static CELL: GenericTagCell = GenericTagCell::new();
                CELL.get_or_insert::<Self>(|| {
                    let names = [$($name::class_name()),+];
                    format!("({})", names.join(", "))
                })
            }
        }

        impl<$($name),+> TupleCodec for ($($name,)+)
        where
            $($name: ConfigValue + TypeTag + PartialEq + fmt::Debug,)+
        {
            fn encode(&self, driver: &Driver<'_>) -> Result<Configuration, ConfigError> {
                Ok(Configuration::Seq(vec![
                    $(driver.get_config(&self.$idx, None)?,)+
                ]))
            }

            fn decode(config: &Configuration, driver: &Driver<'_>) -> Result<Self, ConfigError> {
                let items = config.expect_seq()?;
                if items.len() != $len {
                    return Err(ConfigError::malformed(format!(
                        "expected a sequence of {} elements, found {}",
                        $len,
                        items.len()
                    )));
                }
                Ok(($(decode_element::<$name>(&items[$idx], driver)?,)+))
            }
        }
    };
}

impl_tuple_codec!(1 => 0: A);
impl_tuple_codec!(2 => 0: A, 1: B);
impl_tuple_codec!(3 => 0: A, 1: B, 2: C);
impl_tuple_codec!(4 => 0: A, 1: B, 2: C, 3: D);

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{register_btree_set, register_tuple, register_vec};
    use crate::boxed::{is_boxed_shape, read_tag};
    use crate::config::Configuration;
    use crate::engine::Engine;
    use crate::value::{ConfigValue, Value};

    #[test]
    fn dynamic_sequence_is_heterogeneous() {
        let engine = Engine::new().unwrap();
        let values: Vec<Value> = vec![Box::new(1_i64), Box::new(true)];
        let config = engine.get_config(&values, None, None).unwrap();
        assert_eq!(
            config,
            Configuration::Seq(vec![Configuration::Int(1), Configuration::Bool(true)])
        );
        let rebuilt = engine.configure(config, None, None).unwrap();
        assert!((*rebuilt).dyn_eq(&values));
    }

    #[test]
    fn typed_vec_round_trips_untagged() {
        let mut engine = Engine::new().unwrap();
        register_vec::<i64>(engine.hooks_mut(), false).unwrap();
        let values = vec![1_i64, 2, 3];
        let config = engine.get_config(&values, Some(false), None).unwrap();
        assert!(!is_boxed_shape(&config));
        let rebuilt: Vec<i64> = engine.configure_as(config, None, None).unwrap();
        assert_eq!(rebuilt, values);
    }

    #[test]
    fn set_is_enveloped_and_named_by_element() {
        let mut engine = Engine::new().unwrap();
        register_btree_set::<i64>(engine.hooks_mut(), false).unwrap();
        let values: BTreeSet<i64> = [3, 1, 2].into();
        let config = engine.get_config(&values, None, None).unwrap();
        let (pair, payload) = read_tag(&config).unwrap();
        assert_eq!(pair.class(), "BTreeSet<i64>");
        assert_eq!(payload.as_seq().unwrap().len(), 3);
        let rebuilt: BTreeSet<i64> = engine.configure_as(config, None, None).unwrap();
        assert_eq!(rebuilt, values);
    }

    #[test]
    fn tuple_resolves_through_its_envelope_alone() {
        let mut engine = Engine::new().unwrap();
        register_tuple::<(i64, String)>(engine.hooks_mut(), false).unwrap();
        let value = (4_i64, "four".to_string());
        let config = engine.get_config(&value, None, None).unwrap();
        let (pair, _) = read_tag(&config).unwrap();
        assert_eq!(pair.class(), "(i64, String)");
        // No target type given: the envelope alone names the tuple.
        let rebuilt = engine.configure(config, None, None).unwrap();
        assert!((*rebuilt).dyn_eq(&value));
    }

    #[test]
    fn short_tuple_payload_is_malformed() {
        let mut engine = Engine::new().unwrap();
        register_tuple::<(i64, String)>(engine.hooks_mut(), false).unwrap();
        let err = engine
            .configure_as::<(i64, String)>(
                Configuration::Seq(vec![Configuration::Int(4)]),
                None,
                None,
            )
            .unwrap_err();
        assert!(err.to_string().contains("2 elements"));
    }
}
