use core::any::{Any, TypeId};
use std::borrow::Cow;
use std::sync::Arc;

use crate::config::ConfigMap;
use crate::configurable::{auto_apply, auto_encode, Property, PropertyTable};
use crate::error::ConfigError;
use crate::hooks::{DecodeFn, EncodeFn, HookRegistry};
use crate::tag::{TagPair, TagTable};
use crate::value::{ConfigValue, Value};

// -----------------------------------------------------------------------------
// ConstructorArgs

/// The decoded constructor arguments of a [`ForeignConfig`] adapter, in
/// parameter declaration order.
pub struct ConstructorArgs {
    values: std::vec::IntoIter<Value>,
}

impl ConstructorArgs {
    /// Takes the next argument, downcast to its expected type.
    pub fn next<A: Any>(&mut self) -> Result<A, ConfigError> {
        let value = self.values.next().ok_or_else(|| {
            ConfigError::malformed("constructor consumed more arguments than were declared")
        })?;
        value.take::<A>().map_err(|value| {
            ConfigError::malformed(format!(
                "constructor argument has unexpected type `{}`",
                (*value).type_name()
            ))
        })
    }
}

// -----------------------------------------------------------------------------
// ForeignConfig

type ConstructFn<T> = Box<dyn Fn(ConstructorArgs) -> Result<T, ConfigError> + Send + Sync>;

/// An adapter making a type participate in encode/decode without a
/// [`Configurable`](crate::configurable::Configurable) implementation, for
/// types whose definition lives in another crate.
///
/// The adapter carries a [`PropertyTable`] describing the type's encoded
/// shape and, optionally, a constructor taking some of those properties as
/// arguments. Decoding first resolves the constructor arguments, builds the
/// instance, then applies the remaining properties one by one. An adapter
/// installed without a constructor is encode-only.
///
/// # Examples
///
/// ```
/// use cfgbox::adapter::ForeignConfig;
/// use cfgbox::configurable::Property;
/// use cfgbox::hooks::HookRegistry;
///
/// // Stands in for a type from another crate.
/// #[derive(Debug, PartialEq)]
/// struct Span {
///     start: i64,
///     len: i64,
/// }
///
/// let mut hooks = HookRegistry::new();
/// ForeignConfig::<Span>::new("spans", "Span")
///     .property(Property::read_only("start", |span: &Span| &span.start))
///     .property(Property::new(
///         "len",
///         |span: &Span| &span.len,
///         |span: &mut Span, value: i64| span.len = value,
///     ))
///     .constructor(["start"], |mut args| {
///         Ok(Span {
///             start: args.next()?,
///             len: 0,
///         })
///     })
///     .install(&mut hooks, false)
///     .unwrap();
/// ```
pub struct ForeignConfig<T: ConfigValue> {
    pair: TagPair,
    table: PropertyTable,
    ctor_params: Vec<Cow<'static, str>>,
    construct: Option<ConstructFn<T>>,
    boxed: bool,
}

impl<T: ConfigValue> ForeignConfig<T> {
    /// Starts an adapter for `T`, to be tagged `(module, class)`.
    pub fn new(
        module: impl Into<Cow<'static, str>>,
        class: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            pair: TagPair::new(module, class),
            table: PropertyTable::new(),
            ctor_params: Vec::new(),
            construct: None,
            boxed: false,
        }
    }

    /// Adds a property to the encoded shape.
    pub fn property(mut self, property: Property) -> Self {
        self.table = self.table.with(property);
        self
    }

    /// Supplies the constructor together with the property names it
    /// consumes, in parameter order.
    pub fn constructor<P, F>(mut self, params: P, construct: F) -> Self
    where
        P: IntoIterator,
        P::Item: Into<Cow<'static, str>>,
        F: Fn(ConstructorArgs) -> Result<T, ConfigError> + Send + Sync + 'static,
    {
        self.ctor_params = params.into_iter().map(Into::into).collect();
        self.construct = Some(Box::new(construct));
        self
    }

    /// Wraps the encoder output in a tag envelope unconditionally, even when
    /// the caller asked for untyped output.
    pub fn boxed(mut self, boxed: bool) -> Self {
        self.boxed = boxed;
        self
    }

    /// Registers the adapter's hooks.
    #[track_caller]
    pub fn install(self, hooks: &mut HookRegistry, overwrite: bool) -> Result<(), ConfigError> {
        let type_id = TypeId::of::<T>();
        let table = Arc::new(self.table);

        let encode_table = Arc::clone(&table);
        let encoder: EncodeFn =
            Box::new(move |value, driver| auto_encode(value, &encode_table, driver));
        hooks.register_raw_encoder(type_id, self.pair.clone(), encoder, self.boxed, overwrite)?;

        if let Some(construct) = self.construct {
            let params = self.ctor_params;
            let decoder: DecodeFn = Box::new(move |config, existing, driver| {
                let entries = config.expect_map()?;
                // Deref: the identity of interest is the boxed value's.
                let mut instance: Value = match existing {
                    Some(existing) if (*existing).value_type_id() == type_id => existing,
                    _ => {
                        let mut values = Vec::with_capacity(params.len());
                        for name in &params {
                            let node = entries.get(name.as_ref()).ok_or_else(|| {
                                ConfigError::malformed(format!(
                                    "constructor argument `{name}` is missing from the payload"
                                ))
                            })?;
                            let target = table
                                .get(name.as_ref())
                                .and_then(Property::declared)
                                .map(TagTable::type_id);
                            values.push(driver.configure_with(node.clone(), None, target)?);
                        }
                        let args = ConstructorArgs {
                            values: values.into_iter(),
                        };
                        Box::new(construct(args)?)
                    }
                };
                let rest: ConfigMap = entries
                    .iter()
                    .filter(|(key, _)| !params.iter().any(|param| param.as_ref() == key.as_str()))
                    .map(|(key, node)| (key.clone(), node.clone()))
                    .collect();
                auto_apply(&mut *instance, &table, &rest, driver)?;
                Ok(instance)
            });
            hooks.register_raw_decoder(type_id, self.pair, decoder, overwrite)?;
        }

        hooks.mark_configurable(type_id);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Tests
