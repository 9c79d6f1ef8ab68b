use core::any::TypeId;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::boxed::{self, is_boxed_shape, INSTANCE_KEY};
use crate::config::Configuration;
use crate::configurable::Configurable;
use crate::context::Context;
use crate::error::ConfigError;
use crate::hooks::HookRegistry;
use crate::utils::{new_map, HashMap};
use crate::value::{ConfigValue, Value};

/// The name of the context every engine starts with.
pub const DEFAULT_CONTEXT: &str = "default";

// -----------------------------------------------------------------------------
// Engine

/// An encode/decode engine: one hook registry plus a set of named contexts.
///
/// Engines are plain values with no global state; two engines never share
/// hooks, namespaces or contexts. Every engine starts with a
/// [`DEFAULT_CONTEXT`] context, used whenever an operation does not name
/// one.
///
/// # Examples
///
/// ```
/// use cfgbox::engine::Engine;
///
/// let engine = Engine::new().unwrap();
/// let config = engine.get_config(&42_i64, Some(false), None).unwrap();
/// let value = engine.configure(config, None, None).unwrap();
/// assert!((*value).dyn_eq(&42_i64));
/// ```
pub struct Engine {
    hooks: HookRegistry,
    contexts: HashMap<String, Context>,
}

impl Engine {
    /// Creates an engine with the builtin hooks and a default context.
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self::with_hooks(HookRegistry::with_builtins()?))
    }

    /// Creates an engine around an explicit hook registry.
    pub fn with_hooks(hooks: HookRegistry) -> Self {
        let mut contexts = new_map();
        contexts.insert(DEFAULT_CONTEXT.to_string(), Context::new(DEFAULT_CONTEXT));
        Self { hooks, contexts }
    }

    #[inline]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    #[inline]
    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Looks a context up by name.
    pub fn context(&self, name: &str) -> Result<&Context, ConfigError> {
        self.contexts.get(name).ok_or_else(|| ConfigError::UnknownContext {
            name: name.to_string(),
        })
    }

    /// Looks a context up by name, mutably.
    pub fn context_mut(&mut self, name: &str) -> Result<&mut Context, ConfigError> {
        self.contexts.get_mut(name).ok_or_else(|| ConfigError::UnknownContext {
            name: name.to_string(),
        })
    }

    /// Creates a context, or returns the existing one of that name.
    pub fn add_context(&mut self, name: impl Into<String>) -> &mut Context {
        let name = name.into();
        self.contexts
            .entry(name.clone())
            .or_insert_with(|| Context::new(name))
    }

    /// Installs `T`'s [`Configurable`] hooks and registers it in a context
    /// (the default one when `context` is `None`).
    #[track_caller]
    pub fn register<T: Configurable>(
        &mut self,
        context: Option<&str>,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        self.hooks.register_configurable::<T>(overwrite)?;
        self.context_mut(context.unwrap_or(DEFAULT_CONTEXT))?
            .register::<T>(overwrite)
    }

    /// Borrows a recursion view over the hooks and one context.
    pub fn driver(&self, context: Option<&str>) -> Result<Driver<'_>, ConfigError> {
        let context = self.context(context.unwrap_or(DEFAULT_CONTEXT))?;
        Ok(Driver {
            hooks: &self.hooks,
            context,
        })
    }

    /// Encodes a value into a [`Configuration`].
    ///
    /// `typed` controls the tag envelope on the result: `Some(true)` always
    /// wraps, `Some(false)` never wraps, and `None` wraps exactly the types
    /// that cannot be rebuilt from an untagged payload (configurables,
    /// adapters and hook-boxed types).
    pub fn get_config(
        &self,
        value: &dyn ConfigValue,
        typed: Option<bool>,
        context: Option<&str>,
    ) -> Result<Configuration, ConfigError> {
        self.driver(context)?.get_config(value, typed)
    }

    /// Decodes a [`Configuration`] into a value, deriving the target type
    /// from the tag envelope or, for untagged nodes, from the node's shape.
    pub fn configure(
        &self,
        config: Configuration,
        existing: Option<Value>,
        context: Option<&str>,
    ) -> Result<Value, ConfigError> {
        self.driver(context)?.configure_with(config, existing, None)
    }

    /// Decodes a [`Configuration`] into a `T`.
    ///
    /// An untagged payload is decoded directly with `T`'s hooks; a tagged
    /// one resolves its own type first and must then decode to a `T`, or to
    /// something `T` has a conversion hook for.
    pub fn configure_as<T: ConfigValue>(
        &self,
        config: Configuration,
        existing: Option<T>,
        context: Option<&str>,
    ) -> Result<T, ConfigError> {
        let existing = existing.map(|value| Box::new(value) as Value);
        let value = self.driver(context)?.configure_with(
            config,
            existing,
            Some(TypeId::of::<T>()),
        )?;
        value.take::<T>().map_err(|value| {
            ConfigError::malformed(format!(
                "decoded a `{}` where a `{}` was requested",
                (*value).type_name(),
                core::any::type_name::<T>()
            ))
        })
    }
}

// -----------------------------------------------------------------------------
// Driver

/// A borrowed view of an [`Engine`]'s hooks plus one active context.
///
/// Hooks recurse through the driver rather than the engine, so an entire
/// encode or decode of an object graph runs under a single context.
pub struct Driver<'a> {
    hooks: &'a HookRegistry,
    context: &'a Context,
}

impl<'a> Driver<'a> {
    /// The context this traversal resolves names under.
    #[inline]
    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// See [`Engine::get_config`].
    pub fn get_config(
        &self,
        value: &dyn ConfigValue,
        typed: Option<bool>,
    ) -> Result<Configuration, ConfigError> {
        let type_id = value.value_type_id();
        let codec = self.hooks.codec(type_id).ok_or_else(|| {
            ConfigError::NotConfigurable {
                type_name: value.type_name().into(),
            }
        })?;
        let config = codec
            .encode(value, self)
            .ok_or_else(|| ConfigError::NotConfigurable {
                type_name: value.type_name().into(),
            })??;
        let config = if codec.encodes_boxed() {
            self.box_config(type_id, config)?
        } else {
            config
        };
        match typed {
            Some(true) => self.box_config(type_id, config),
            Some(false) => Ok(unwrap_envelope(config)),
            None if codec.is_configurable() => self.box_config(type_id, config),
            None => Ok(config),
        }
    }

    /// See [`Engine::configure`].
    pub fn configure(
        &self,
        config: Configuration,
        existing: Option<Value>,
    ) -> Result<Value, ConfigError> {
        self.configure_with(config, existing, None)
    }

    /// Decodes a configuration with an optional target type.
    ///
    /// The type to decode as comes from, in order: the tag envelope, the
    /// `target`, the payload's native shape. When the decoded value's type
    /// differs from `target`, the target's conversion hook is the one
    /// fallback before the mismatch becomes an error.
    pub fn configure_with(
        &self,
        config: Configuration,
        existing: Option<Value>,
        target: Option<TypeId>,
    ) -> Result<Value, ConfigError> {
        let (type_id, payload) = if is_boxed_shape(&config) {
            self.unbox_config(config)?
        } else {
            (target.unwrap_or_else(|| config.native_type_id()), config)
        };
        let codec = self
            .hooks
            .codec(type_id)
            .ok_or_else(|| self.not_configurable(type_id))?;
        // Identity checks go through the trait object: `Value` is itself a
        // `ConfigValue`, and unqualified calls would answer for the box.
        let existing = existing.filter(|value| (**value).value_type_id() == type_id);
        let value = codec
            .decode(&payload, existing, self)
            .ok_or_else(|| self.not_configurable(type_id))??;
        // An explicit target outranks what the envelope resolved to.
        let expected = target.unwrap_or(type_id);
        if (*value).value_type_id() == expected {
            return Ok(value);
        }
        let found = (*value).type_name();
        log::trace!("decoded type differs from the expected one; trying a conversion hook");
        self.hooks
            .codec(expected)
            .and_then(|codec| codec.convert(value))
            .unwrap_or_else(|| {
                Err(ConfigError::malformed(format!(
                    "decoded a `{found}` where another type was expected, and the \
                     expected type has no conversion hook"
                )))
            })
    }

    /// Wraps a payload in the tag envelope this context names `type_id` by.
    pub fn box_config(
        &self,
        type_id: TypeId,
        config: Configuration,
    ) -> Result<Configuration, ConfigError> {
        boxed::box_config(type_id, config, self.context, self.hooks.namespace())
    }

    /// Resolves a node to a type id and its payload. See
    /// [`boxed::unbox_config`](crate::boxed::unbox_config).
    pub fn unbox_config(
        &self,
        config: Configuration,
    ) -> Result<(TypeId, Configuration), ConfigError> {
        boxed::unbox_config(config, self.context, self.hooks.namespace())
    }

    fn not_configurable(&self, type_id: TypeId) -> ConfigError {
        let type_name = match self.hooks.namespace().pair_of(type_id) {
            Some(pair) => pair.to_string().into(),
            None => "<unknown>".into(),
        };
        ConfigError::NotConfigurable { type_name }
    }
}

/// Strips the tag envelope off a node, if it carries one.
fn unwrap_envelope(config: Configuration) -> Configuration {
    if !is_boxed_shape(&config) {
        return config;
    }
    let Configuration::Map(mut entries) = config else {
        unreachable!("boxed shape is always a map");
    };
    match entries.remove(INSTANCE_KEY) {
        Some(payload) => payload,
        None => unreachable!("boxed shape has an instance"),
    }
}

// -----------------------------------------------------------------------------
// EngineArc

/// A thread-safe, shared handle over an [`Engine`].
///
/// A poisoned lock is recovered rather than propagated; the engine's
/// tables stay usable after a panicked writer.
#[derive(Clone)]
pub struct EngineArc {
    internal: Arc<RwLock<Engine>>,
}

impl EngineArc {
    pub fn new(engine: Engine) -> Self {
        Self {
            internal: Arc::new(RwLock::new(engine)),
        }
    }

    /// Takes a read lock on the engine.
    pub fn read(&self) -> RwLockReadGuard<'_, Engine> {
        self.internal.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes a write lock on the engine.
    pub fn write(&self) -> RwLockWriteGuard<'_, Engine> {
        self.internal
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::any::TypeId;

    use super::{Engine, EngineArc, DEFAULT_CONTEXT};
    use crate::boxed::{is_boxed_shape, read_tag, CLASS_KEY, INSTANCE_KEY, MODULE_KEY};
    use crate::config::{ConfigMap, Configuration};
    use crate::error::ConfigError;
    use crate::impl_configurable;
    use crate::tag::TagPair;
    use crate::value::{ConfigValue, Value};

    #[derive(Clone, Debug, Default, PartialEq)]
    struct Sensor {
        label: String,
        interval: i64,
        enabled: bool,
    }

    impl_configurable!(Sensor in "sensors" {
        label: String,
        interval: i64,
        enabled: bool,
    });

    fn engine() -> Engine {
        let mut engine = Engine::new().unwrap();
        engine.register::<Sensor>(None, false).unwrap();
        engine
    }

    fn sensor() -> Sensor {
        Sensor {
            label: "probe".to_string(),
            interval: 30,
            enabled: true,
        }
    }

    #[test]
    fn scalar_round_trip() {
        let engine = engine();
        let config = engine.get_config(&42_i64, Some(false), None).unwrap();
        assert_eq!(config, Configuration::Int(42));
        let value = engine.configure(config, None, None).unwrap();
        assert!((*value).dyn_eq(&42_i64));
    }

    #[test]
    fn configurable_encodes_boxed_by_default() {
        let engine = engine();
        let config = engine.get_config(&sensor(), None, None).unwrap();
        assert!(is_boxed_shape(&config));
        let (pair, payload) = read_tag(&config).unwrap();
        assert_eq!(pair, TagPair::new("sensors", "Sensor"));
        let entries = payload.as_map().unwrap();
        assert_eq!(entries["label"], Configuration::Str("probe".into()));
        assert_eq!(entries["interval"], Configuration::Int(30));
        assert_eq!(entries["enabled"], Configuration::Bool(true));
    }

    #[test]
    fn boxed_document_round_trips_without_a_target_type() {
        let engine = engine();
        let config = engine.get_config(&sensor(), None, None).unwrap();
        let value = engine.configure(config, None, None).unwrap();
        assert!((*value).dyn_eq(&sensor()));
    }

    #[test]
    fn untyped_output_carries_no_envelope() {
        let engine = engine();
        let config = engine.get_config(&sensor(), Some(false), None).unwrap();
        assert!(!is_boxed_shape(&config));
        // Decoding needs the target type back.
        let rebuilt: Sensor = engine.configure_as(config, None, None).unwrap();
        assert_eq!(rebuilt, sensor());
    }

    #[test]
    fn typed_output_is_not_double_wrapped() {
        let engine = engine();
        let config = engine.get_config(&sensor(), Some(true), None).unwrap();
        let entries = config.as_map().unwrap();
        assert_eq!(entries.len(), 3);
        assert!(!is_boxed_shape(&entries[INSTANCE_KEY]));
    }

    #[test]
    fn existing_instance_keeps_unmentioned_properties() {
        let engine = engine();
        let mut entries = ConfigMap::new();
        entries.insert("interval".to_string(), Configuration::Int(60));
        let rebuilt: Sensor = engine
            .configure_as(Configuration::Map(entries), Some(sensor()), None)
            .unwrap();
        assert_eq!(rebuilt.interval, 60);
        assert_eq!(rebuilt.label, "probe");
        assert!(rebuilt.enabled);
    }

    #[test]
    fn unknown_property_is_malformed() {
        let engine = engine();
        let mut entries = ConfigMap::new();
        entries.insert("cadence".to_string(), Configuration::Int(60));
        let err = engine
            .configure_as::<Sensor>(Configuration::Map(entries), None, None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::MalformedConfiguration { .. }));
    }

    #[test]
    fn contexts_gate_resolution_independently() {
        let mut engine = engine();
        engine.add_context("locked").deny_module("sensors");
        let config = engine.get_config(&sensor(), None, None).unwrap();

        let err = engine.configure(config.clone(), None, Some("locked")).unwrap_err();
        assert!(matches!(err, ConfigError::AccessDenied { .. }));
        assert!(engine.configure(config, None, Some(DEFAULT_CONTEXT)).is_ok());
    }

    #[test]
    fn boxing_respects_the_encoding_context_too() {
        let mut engine = engine();
        engine.add_context("locked").deny_module("sensors");
        let err = engine.get_config(&sensor(), None, Some("locked")).unwrap_err();
        assert!(matches!(err, ConfigError::AccessDenied { .. }));
    }

    #[test]
    fn context_registration_renames_the_tag() {
        let mut engine = engine();
        engine
            .add_context("legacy")
            .register_as::<Sensor>(TagPair::new("probes", "Probe"), false)
            .unwrap();
        let config = engine.get_config(&sensor(), None, Some("legacy")).unwrap();
        let (pair, _) = read_tag(&config).unwrap();
        assert_eq!(pair, TagPair::new("probes", "Probe"));
        // The alias resolves when decoded under the same context ...
        assert!(engine.configure(config.clone(), None, Some("legacy")).is_ok());
        // ... but not under the default one.
        assert!(engine.configure(config, None, None).is_err());
    }

    #[test]
    fn unknown_context_is_an_error() {
        let engine = engine();
        let err = engine.get_config(&1_i64, None, Some("nope")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownContext { .. }));
    }

    #[test]
    fn forged_tag_does_not_resolve() {
        let engine = engine();
        let mut entries = ConfigMap::new();
        entries.insert(MODULE_KEY.to_string(), Configuration::Str("os".into()));
        entries.insert(CLASS_KEY.to_string(), Configuration::Str("Command".into()));
        entries.insert(INSTANCE_KEY.to_string(), Configuration::Str("rm".into()));
        let err = engine.configure(Configuration::Map(entries), None, None).unwrap_err();
        assert!(matches!(err, ConfigError::AccessDenied { .. }));
    }

    #[test]
    fn conversion_hook_bridges_a_type_mismatch() {
        #[derive(Debug, PartialEq)]
        struct Celsius(f64);
        crate::impl_type_tag!(Celsius => "units", "Celsius");

        let mut engine = engine();
        engine
            .hooks_mut()
            .register_conversion::<Celsius, _>(
                |value| {
                    value
                        .take::<f64>()
                        .map(Celsius)
                        .map_err(|_| ConfigError::malformed("only floats convert to Celsius"))
                },
                false,
            )
            .unwrap();
        // An untagged float decoded as Celsius goes through the fallback,
        // because Celsius has no decoder of its own.
        let boxed = engine.get_config(&21.5_f64, Some(true), None).unwrap();
        let value: Celsius = engine.configure_as(boxed, None, None).unwrap();
        assert_eq!(value, Celsius(21.5));
    }

    #[test]
    fn nested_graph_round_trips_through_json() {
        let engine = engine();
        let values: Vec<Value> = vec![
            Box::new(sensor()),
            Box::new("plain".to_string()),
            Box::new(7_i64),
        ];
        let config = engine.get_config(&values, None, None).unwrap();
        let text = serde_json::to_string(&config).unwrap();
        let parsed: Configuration = serde_json::from_str(&text).unwrap();
        let rebuilt = engine.configure(parsed, None, None).unwrap();
        assert!((*rebuilt).dyn_eq(&values));
    }

    #[test]
    fn plain_data_round_trips_by_shape_alone() {
        // [{"a": 1, "b": [2, 3]}, ["4", "5", {"x": "x", "y": -10.0, "z": null}]]
        let engine = Engine::new().unwrap();
        let build = || -> Vec<Value> {
            let mut first: std::collections::BTreeMap<String, Value> = Default::default();
            first.insert("a".into(), Box::new(1_i64));
            first.insert(
                "b".into(),
                Box::new(vec![Box::new(2_i64) as Value, Box::new(3_i64) as Value]),
            );
            let mut inner: std::collections::BTreeMap<String, Value> = Default::default();
            inner.insert("x".into(), Box::new("x".to_string()));
            inner.insert("y".into(), Box::new(-10.0_f64));
            inner.insert("z".into(), Box::new(()));
            let second: Vec<Value> = vec![
                Box::new("4".to_string()),
                Box::new("5".to_string()),
                Box::new(inner),
            ];
            vec![Box::new(first) as Value, Box::new(second) as Value]
        };
        let value = build();
        let config = engine.get_config(&value, None, None).unwrap();
        assert!(!is_boxed_shape(&config));
        let rebuilt = engine.configure(config, None, None).unwrap();
        assert!((*rebuilt).dyn_eq(&build()));
    }

    #[test]
    fn shared_handle_survives_concurrent_use() {
        let shared = EngineArc::new(engine());
        let clone = shared.clone();
        let handle = std::thread::spawn(move || {
            clone.read().get_config(&sensor(), None, None).unwrap()
        });
        let config = shared.read().get_config(&sensor(), None, None).unwrap();
        assert_eq!(handle.join().unwrap(), config);
    }
}
