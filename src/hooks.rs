use core::any::TypeId;
use core::panic::Location;
use std::borrow::Cow;

use crate::config::Configuration;
use crate::configurable::Configurable;
use crate::engine::Driver;
use crate::error::ConfigError;
use crate::tag::{TagPair, TypeTag};
use crate::utils::{new_map, new_set, HashMap, HashSet};
use crate::value::{ConfigValue, Value};

// -----------------------------------------------------------------------------
// Namespace

/// The set of types known to an [`Engine`](crate::engine::Engine) by name.
///
/// Every hook registration records its type's `(module, class)` pair here.
/// The namespace is what makes a type *reachable*: contexts consult it when
/// deciding whether an unregistered pair may still be resolved, and when
/// producing a tag for a type they never saw registered directly.
#[derive(Default)]
pub struct Namespace {
    names: HashMap<TagPair, TypeId>,
    modules: HashSet<Cow<'static, str>>,
    pairs_by_id: HashMap<TypeId, TagPair>,
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            names: new_map(),
            modules: new_set(),
            pairs_by_id: new_map(),
        }
    }

    /// Records a `(module, class)` pair for a type.
    ///
    /// First write wins: re-inserting the same pair for a different type
    /// keeps the original binding and logs the collision instead of
    /// replacing it, so a stray registration cannot silently hijack a name.
    pub fn insert(&mut self, pair: TagPair, type_id: TypeId) {
        self.modules.insert(Cow::Owned(pair.module().to_string()));
        match self.names.entry(pair.clone()) {
            hashbrown::hash_map::Entry::Occupied(entry) => {
                if *entry.get() != type_id {
                    log::warn!("namespace already binds `{pair}` to a different type; keeping the original binding");
                    return;
                }
            }
            hashbrown::hash_map::Entry::Vacant(entry) => {
                entry.insert(type_id);
            }
        }
        self.pairs_by_id.entry(type_id).or_insert(pair);
    }

    /// Resolves a `(module, class)` pair to a type id, if known.
    pub fn get(&self, module: &str, class: &str) -> Option<TypeId> {
        self.names
            .get(&TagPair::new(module.to_string(), class.to_string()))
            .copied()
    }

    /// Returns `true` if at least one type from `module` is known.
    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    /// Returns the `(module, class)` pair a type was first recorded under.
    pub fn pair_of(&self, type_id: TypeId) -> Option<&TagPair> {
        self.pairs_by_id.get(&type_id)
    }
}

// -----------------------------------------------------------------------------
// Erased hooks

/// A type-erased encoder hook.
pub type EncodeFn =
    Box<dyn Fn(&dyn ConfigValue, &Driver<'_>) -> Result<Configuration, ConfigError> + Send + Sync>;

/// A type-erased decoder hook. Receives the configuration payload and,
/// optionally, an existing instance to reconfigure in place of building a
/// fresh one.
pub type DecodeFn = Box<
    dyn Fn(&Configuration, Option<Value>, &Driver<'_>) -> Result<Value, ConfigError> + Send + Sync,
>;

/// A type-erased conversion fallback, applied when a decoder produced a
/// value of a different type than the tag requested.
pub type ConvertFn = Box<dyn Fn(Value) -> Result<Value, ConfigError> + Send + Sync>;

struct Encoder {
    func: EncodeFn,
    /// Whether the encoder's output is wrapped in a tag envelope at the
    /// hook level, before the caller's `typed` preference applies.
    boxed: bool,
    registered_at: &'static Location<'static>,
}

struct Decoder {
    func: DecodeFn,
    registered_at: &'static Location<'static>,
}

struct Converter {
    func: ConvertFn,
    registered_at: &'static Location<'static>,
}

/// The hook entry for a single type.
#[derive(Default)]
pub struct Codec {
    encoder: Option<Encoder>,
    decoder: Option<Decoder>,
    converter: Option<Converter>,
    configurable: bool,
}

impl Codec {
    /// Whether this entry was installed through a
    /// [`Configurable`] implementation.
    #[inline]
    pub fn is_configurable(&self) -> bool {
        self.configurable
    }

    /// Whether the encoder output carries a tag envelope unconditionally.
    #[inline]
    pub fn encodes_boxed(&self) -> bool {
        self.encoder.as_ref().is_some_and(|encoder| encoder.boxed)
    }

    pub(crate) fn encode(
        &self,
        value: &dyn ConfigValue,
        driver: &Driver<'_>,
    ) -> Option<Result<Configuration, ConfigError>> {
        self.encoder
            .as_ref()
            .map(|encoder| (encoder.func)(value, driver))
    }

    pub(crate) fn decode(
        &self,
        config: &Configuration,
        existing: Option<Value>,
        driver: &Driver<'_>,
    ) -> Option<Result<Value, ConfigError>> {
        self.decoder
            .as_ref()
            .map(|decoder| (decoder.func)(config, existing, driver))
    }

    pub(crate) fn convert(&self, value: Value) -> Option<Result<Value, ConfigError>> {
        self.converter.as_ref().map(|converter| (converter.func)(value))
    }
}

// -----------------------------------------------------------------------------
// HookRegistry

/// The engine-wide table of encode/decode hooks, keyed by [`TypeId`].
///
/// Hooks are shared by every context of an engine; contexts only restrict
/// which types a given document may *name*, never how a type is encoded.
///
/// # Examples
///
/// ```
/// use cfgbox::config::Configuration;
/// use cfgbox::error::ConfigError;
/// use cfgbox::hooks::HookRegistry;
/// use cfgbox::impl_type_tag;
///
/// #[derive(Debug, PartialEq)]
/// struct Celsius(f64);
/// impl_type_tag!(Celsius => "units", "Celsius");
///
/// let mut hooks = HookRegistry::new();
/// hooks
///     .register_encoder::<Celsius, _>(|value, _| Ok(Configuration::Float(value.0)), false, false)
///     .unwrap();
/// hooks
///     .register_decoder::<Celsius, _>(
///         |config, _, _| {
///             config
///                 .as_float()
///                 .map(Celsius)
///                 .ok_or_else(|| ConfigError::malformed("expected a float"))
///         },
///         false,
///     )
///     .unwrap();
/// ```
pub struct HookRegistry {
    codecs: HashMap<TypeId, Codec>,
    namespace: Namespace,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Creates an empty registry, without even the builtin scalar hooks.
    pub fn new() -> Self {
        Self {
            codecs: new_map(),
            namespace: Namespace::new(),
        }
    }

    /// Creates a registry preloaded with the builtin hooks (scalars,
    /// dynamic sequences and mappings, datetimes) and, when the
    /// `auto_register` feature is enabled, every hook set submitted through
    /// [`submit_config_hooks!`](crate::submit_config_hooks).
    pub fn with_builtins() -> Result<Self, ConfigError> {
        let mut hooks = Self::new();
        crate::impls::install_builtins(&mut hooks)?;
        #[cfg(feature = "auto_register")]
        for submission in inventory::iter::<HookSubmission> {
            (submission.install)(&mut hooks)?;
        }
        Ok(hooks)
    }

    /// The name index of every type this registry has seen.
    #[inline]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the hook entry for a type, if any hook was registered.
    #[inline]
    pub fn codec(&self, type_id: TypeId) -> Option<&Codec> {
        self.codecs.get(&type_id)
    }

    /// Returns `true` if the type has both an encoder and a decoder, whether
    /// registered directly or through a [`Configurable`] implementation.
    pub fn has_codec(&self, type_id: TypeId) -> bool {
        self.codecs
            .get(&type_id)
            .is_some_and(|codec| codec.encoder.is_some() && codec.decoder.is_some())
    }

    /// Registers an encoder hook for `T`.
    ///
    /// With `boxed`, the encoder's output is wrapped in a tag envelope even
    /// when the caller asked for untyped output; types whose payload is
    /// ambiguous without its tag (sets, tuples) use this.
    ///
    /// Fails with [`ConfigError::NamingConflict`] if an encoder for `T`
    /// exists and `overwrite` is not set.
    #[track_caller]
    pub fn register_encoder<T, F>(
        &mut self,
        func: F,
        boxed: bool,
        overwrite: bool,
    ) -> Result<(), ConfigError>
    where
        T: ConfigValue + TypeTag,
        F: Fn(&T, &Driver<'_>) -> Result<Configuration, ConfigError> + Send + Sync + 'static,
    {
        let erased: EncodeFn = Box::new(move |value, driver| {
            let value = value.downcast_ref::<T>().ok_or_else(|| {
                ConfigError::malformed(format!(
                    "encoder for `{}` received a `{}`",
                    core::any::type_name::<T>(),
                    value.type_name()
                ))
            })?;
            func(value, driver)
        });
        self.register_raw_encoder(TypeId::of::<T>(), TagPair::of::<T>(), erased, boxed, overwrite)
    }

    /// Registers a decoder hook for `T`.
    ///
    /// The hook receives the (already unboxed) payload and an existing
    /// instance when the caller supplied one of matching type.
    #[track_caller]
    pub fn register_decoder<T, F>(&mut self, func: F, overwrite: bool) -> Result<(), ConfigError>
    where
        T: ConfigValue + TypeTag,
        F: Fn(&Configuration, Option<T>, &Driver<'_>) -> Result<T, ConfigError>
            + Send
            + Sync
            + 'static,
    {
        let erased: DecodeFn = Box::new(move |config, existing, driver| {
            let existing = existing.and_then(|value| value.take::<T>().ok());
            let value = func(config, existing, driver)?;
            Ok(Box::new(value) as Value)
        });
        self.register_raw_decoder(TypeId::of::<T>(), TagPair::of::<T>(), erased, overwrite)
    }

    /// Registers a conversion fallback for `T`.
    ///
    /// When decoding under an explicit target type and the decoder's output
    /// is of some other type, the target's conversion hook gets one chance
    /// to build a `T` from the mismatched value before the engine gives up.
    #[track_caller]
    pub fn register_conversion<T, F>(&mut self, func: F, overwrite: bool) -> Result<(), ConfigError>
    where
        T: ConfigValue + TypeTag,
        F: Fn(Value) -> Result<T, ConfigError> + Send + Sync + 'static,
    {
        let location = Location::caller();
        let codec = self.codecs.entry(TypeId::of::<T>()).or_default();
        if let Some(previous) = &codec.converter {
            if !overwrite {
                return Err(ConfigError::conflict(
                    format!("conversion for `{}`", TagPair::of::<T>()),
                    previous.registered_at,
                ));
            }
        }
        let erased: ConvertFn = Box::new(move |value| {
            let value = func(value)?;
            Ok(Box::new(value) as Value)
        });
        codec.converter = Some(Converter {
            func: erased,
            registered_at: location,
        });
        self.namespace.insert(TagPair::of::<T>(), TypeId::of::<T>());
        Ok(())
    }

    /// Installs encode and decode hooks backed by a [`Configurable`]
    /// implementation and marks the entry as configurable, which makes the
    /// engine default to boxed output for it.
    #[track_caller]
    pub fn register_configurable<T: Configurable>(
        &mut self,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        self.register_encoder::<T, _>(|value, driver| value.get_config(driver), false, overwrite)?;
        self.register_decoder::<T, _>(
            |config, existing, driver| T::configure(config, existing, driver),
            overwrite,
        )?;
        if let Some(codec) = self.codecs.get_mut(&TypeId::of::<T>()) {
            codec.configurable = true;
        }
        Ok(())
    }

    /// Registers an already-erased encoder under an explicit identity.
    ///
    /// This is the entry point adapters use for types that cannot carry a
    /// [`TypeTag`](crate::tag::TypeTag) implementation themselves.
    #[track_caller]
    pub fn register_raw_encoder(
        &mut self,
        type_id: TypeId,
        pair: TagPair,
        func: EncodeFn,
        boxed: bool,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        let location = Location::caller();
        let codec = self.codecs.entry(type_id).or_default();
        if let Some(previous) = &codec.encoder {
            if !overwrite {
                return Err(ConfigError::conflict(
                    format!("encoder for `{pair}`"),
                    previous.registered_at,
                ));
            }
            log::debug!(
                "overwriting the encoder for `{pair}` registered at {}",
                previous.registered_at
            );
        }
        codec.encoder = Some(Encoder {
            func,
            boxed,
            registered_at: location,
        });
        log::trace!("registered an encoder for `{pair}`");
        self.namespace.insert(pair, type_id);
        Ok(())
    }

    /// Registers an already-erased decoder under an explicit identity.
    #[track_caller]
    pub fn register_raw_decoder(
        &mut self,
        type_id: TypeId,
        pair: TagPair,
        func: DecodeFn,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        let location = Location::caller();
        let codec = self.codecs.entry(type_id).or_default();
        if let Some(previous) = &codec.decoder {
            if !overwrite {
                return Err(ConfigError::conflict(
                    format!("decoder for `{pair}`"),
                    previous.registered_at,
                ));
            }
            log::debug!(
                "overwriting the decoder for `{pair}` registered at {}",
                previous.registered_at
            );
        }
        codec.decoder = Some(Decoder {
            func,
            registered_at: location,
        });
        log::trace!("registered a decoder for `{pair}`");
        self.namespace.insert(pair, type_id);
        Ok(())
    }

    /// Marks an entry registered through the raw interface as configurable.
    pub(crate) fn mark_configurable(&mut self, type_id: TypeId) {
        if let Some(codec) = self.codecs.get_mut(&type_id) {
            codec.configurable = true;
        }
    }
}

// -----------------------------------------------------------------------------
// Distributed registration

/// A hook set submitted for collection at link time.
///
/// See [`submit_config_hooks!`](crate::submit_config_hooks).
#[cfg(feature = "auto_register")]
pub struct HookSubmission {
    pub install: fn(&mut HookRegistry) -> Result<(), ConfigError>,
}

#[cfg(feature = "auto_register")]
inventory::collect!(HookSubmission);

/// Submits an installer function to run inside every
/// [`HookRegistry::with_builtins`] call, from any crate in the build graph.
///
/// # Examples
///
/// ```ignore
/// fn install(hooks: &mut HookRegistry) -> Result<(), ConfigError> {
///     hooks.register_configurable::<Sensor>(false)
/// }
///
/// cfgbox::submit_config_hooks!(install);
/// ```
#[cfg(feature = "auto_register")]
#[macro_export]
macro_rules! submit_config_hooks {
    ($install:path) => {
        $crate::inventory::submit! {
            $crate::hooks::HookSubmission { install: $install }
        }
    };
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::any::TypeId;

    use super::{HookRegistry, Namespace};
    use crate::config::Configuration;
    use crate::error::ConfigError;
    use crate::impl_type_tag;
    use crate::tag::TagPair;

    #[derive(Debug, PartialEq)]
    struct Celsius(f64);
    impl_type_tag!(Celsius => "units", "Celsius");

    fn encoder(hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError> {
        hooks.register_encoder::<Celsius, _>(
            |value, _| Ok(Configuration::Float(value.0)),
            false,
            overwrite,
        )
    }

    #[test]
    fn duplicate_encoder_is_a_conflict() {
        let mut hooks = HookRegistry::new();
        encoder(&mut hooks, false).unwrap();
        let err = encoder(&mut hooks, false).unwrap_err();
        assert!(matches!(err, ConfigError::NamingConflict { .. }));
        assert!(err.to_string().contains("units::Celsius"));
        encoder(&mut hooks, true).unwrap();
    }

    #[test]
    fn registration_populates_the_namespace() {
        let mut hooks = HookRegistry::new();
        encoder(&mut hooks, false).unwrap();
        let namespace = hooks.namespace();
        assert_eq!(namespace.get("units", "Celsius"), Some(TypeId::of::<Celsius>()));
        assert!(namespace.has_module("units"));
        assert!(!namespace.has_module("no_such_module"));
        assert_eq!(
            namespace.pair_of(TypeId::of::<Celsius>()),
            Some(&TagPair::of::<Celsius>())
        );
    }

    #[test]
    fn namespace_keeps_the_first_binding() {
        let mut namespace = Namespace::new();
        namespace.insert(TagPair::new("units", "Celsius"), TypeId::of::<Celsius>());
        namespace.insert(TagPair::new("units", "Celsius"), TypeId::of::<f64>());
        assert_eq!(namespace.get("units", "Celsius"), Some(TypeId::of::<Celsius>()));
    }
}
