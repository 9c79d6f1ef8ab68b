//! Hooks for the scalar types every untagged leaf node decodes into.

use crate::config::Configuration;
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::impl_type_tag;

impl_type_tag!(() => "core", "unit");
impl_type_tag!(bool => "core", "bool");
impl_type_tag!(i64 => "core", "i64");
impl_type_tag!(f64 => "core", "f64");
impl_type_tag!(String => "alloc", "String");

fn shape_error(expected: &str, found: &Configuration) -> ConfigError {
    ConfigError::malformed(format!("expected a {expected} node, found {}", found.kind()))
}

pub(crate) fn install(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
    hooks.register_encoder::<(), _>(|_, _| Ok(Configuration::Null), false, false)?;
    hooks.register_decoder::<(), _>(
        |config, _, _| match config {
            Configuration::Null => Ok(()),
            other => Err(shape_error("null", other)),
        },
        false,
    )?;

    hooks.register_encoder::<bool, _>(|value, _| Ok(Configuration::Bool(*value)), false, false)?;
    hooks.register_decoder::<bool, _>(
        |config, _, _| config.as_bool().ok_or_else(|| shape_error("bool", config)),
        false,
    )?;

    hooks.register_encoder::<i64, _>(|value, _| Ok(Configuration::Int(*value)), false, false)?;
    hooks.register_decoder::<i64, _>(
        |config, _, _| config.as_int().ok_or_else(|| shape_error("int", config)),
        false,
    )?;

    hooks.register_encoder::<f64, _>(|value, _| Ok(Configuration::Float(*value)), false, false)?;
    // An int node is a valid float payload; documents written by hand
    // rarely spell `1.0`.
    hooks.register_decoder::<f64, _>(
        |config, _, _| config.as_float().ok_or_else(|| shape_error("float", config)),
        false,
    )?;
    hooks.register_conversion::<f64, _>(
        |value| {
            value.take::<i64>().map(|value| value as f64).map_err(|value| {
                ConfigError::malformed(format!(
                    "no conversion from `{}` to a float",
                    (*value).type_name()
                ))
            })
        },
        false,
    )?;

    hooks.register_encoder::<String, _>(
        |value, _| Ok(Configuration::Str(value.clone())),
        false,
        false,
    )?;
    hooks.register_decoder::<String, _>(
        |config, _, _| config.expect_str().map(str::to_string),
        false,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::Configuration;
    use crate::engine::Engine;

    #[test]
    fn leaves_round_trip_untagged() {
        let engine = Engine::new().unwrap();
        for value in [
            Configuration::Null,
            Configuration::Bool(false),
            Configuration::Int(-3),
            Configuration::Float(0.25),
            Configuration::Str("text".into()),
        ] {
            let decoded = engine.configure(value.clone(), None, None).unwrap();
            let encoded = engine.get_config(&*decoded, Some(false), None).unwrap();
            assert_eq!(encoded, value);
        }
    }

    #[test]
    fn float_target_accepts_an_int_node() {
        let engine = Engine::new().unwrap();
        let value: f64 = engine
            .configure_as(Configuration::Int(4), None, None)
            .unwrap();
        assert_eq!(value, 4.0);
    }

    #[test]
    fn boxed_int_converts_to_a_float_target() {
        let engine = Engine::new().unwrap();
        let boxed = engine.get_config(&4_i64, Some(true), None).unwrap();
        let value: f64 = engine.configure_as(boxed, None, None).unwrap();
        assert_eq!(value, 4.0);
    }

    #[test]
    fn mistyped_leaf_is_malformed() {
        let engine = Engine::new().unwrap();
        assert!(engine
            .configure_as::<bool>(Configuration::Int(1), None, None)
            .is_err());
    }
}
