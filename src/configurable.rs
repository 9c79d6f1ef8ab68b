use std::borrow::Cow;

use crate::boxed::is_boxed_shape;
use crate::config::{ConfigMap, Configuration};
use crate::engine::Driver;
use crate::error::ConfigError;
use crate::tag::{TagTable, TypeTag};
use crate::value::{ConfigValue, Value};

// -----------------------------------------------------------------------------
// Configurable

/// The capability to encode `self` into a [`Configuration`] and to rebuild
/// (or update) an instance from one.
///
/// `get_config` and `configure` must be inverses up to [`dyn_eq`]: decoding
/// the output of `get_config` yields a value equal to the original. The
/// payloads they exchange are untagged; the engine handles envelopes.
///
/// Most types get this for free through [`impl_configurable!`] rather than
/// hand-writing the pair.
///
/// [`dyn_eq`]: crate::value::ConfigValue::dyn_eq
/// [`impl_configurable!`]: crate::impl_configurable
pub trait Configurable: ConfigValue + TypeTag + Sized {
    /// Encodes `self` into an untagged configuration payload.
    fn get_config(&self, driver: &Driver<'_>) -> Result<Configuration, ConfigError>;

    /// Builds an instance from an untagged payload, reusing `existing`
    /// where a hook can update in place instead of rebuilding.
    fn configure(
        config: &Configuration,
        existing: Option<Self>,
        driver: &Driver<'_>,
    ) -> Result<Self, ConfigError>;
}

/// A [`Configurable`] whose encoding is derived from an enumerated set of
/// properties, payload shape `{ property name: encoded value }`.
///
/// Decode starts from `existing` (or [`Default::default`]) and assigns only
/// the properties whose decoded value differs from the current one.
pub trait AutoConfigured: Configurable + Default {
    /// The property set, in declaration order.
    fn properties() -> &'static PropertyTable;
}

// -----------------------------------------------------------------------------
// Property

type GetFn =
    Box<dyn for<'a> Fn(&'a dyn ConfigValue) -> Result<&'a dyn ConfigValue, ConfigError> + Send + Sync>;
type SetFn = Box<dyn Fn(&mut dyn ConfigValue, Value) -> Result<(), ConfigError> + Send + Sync>;

/// One named, typed property of an [`AutoConfigured`] type.
pub struct Property {
    name: Cow<'static, str>,
    getter: GetFn,
    setter: Option<SetFn>,
    declared: Option<TagTable>,
}

impl Property {
    /// Creates a read/write property backed by plain accessor functions.
    pub fn new<T, P>(
        name: impl Into<Cow<'static, str>>,
        get: impl for<'a> Fn(&'a T) -> &'a P + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self
    where
        T: ConfigValue,
        P: ConfigValue,
    {
        let name = name.into();
        let mut property = Self::read_only(name.clone(), get);
        let setter: SetFn = Box::new(move |instance, value| {
            let instance = instance.downcast_mut::<T>().ok_or_else(|| {
                ConfigError::malformed(format!(
                    "property `{name}` belongs to `{}`",
                    core::any::type_name::<T>()
                ))
            })?;
            let value = value.take::<P>().map_err(|value| {
                ConfigError::malformed(format!(
                    "property `{name}` expects a `{}`, found a `{}`",
                    core::any::type_name::<P>(),
                    (*value).type_name()
                ))
            })?;
            set(instance, value);
            Ok(())
        });
        property.setter = Some(setter);
        property
    }

    /// Creates a property without a setter. Decoding fails if a document
    /// tries to change its value.
    pub fn read_only<T, P>(
        name: impl Into<Cow<'static, str>>,
        get: impl for<'a> Fn(&'a T) -> &'a P + Send + Sync + 'static,
    ) -> Self
    where
        T: ConfigValue,
        P: ConfigValue,
    {
        let name = name.into();
        let getter_name = name.clone();
        let getter: GetFn = Box::new(move |instance| {
            let instance = instance.downcast_ref::<T>().ok_or_else(|| {
                ConfigError::malformed(format!(
                    "property `{getter_name}` belongs to `{}`",
                    core::any::type_name::<T>()
                ))
            })?;
            Ok(get(instance) as &dyn ConfigValue)
        });
        Self {
            name,
            getter,
            setter: None,
            declared: None,
        }
    }

    /// Declares the property's static type, letting documents omit the tag
    /// envelope for its values: encoding strips it, decoding restores it.
    pub fn with_declared_type<D: TypeTag>(mut self) -> Self {
        self.declared = Some(TagTable::of::<D>());
        self
    }

    /// The property's name, as it appears in the payload map.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn declared(&self) -> Option<&TagTable> {
        self.declared.as_ref()
    }
}

/// The ordered property set of an [`AutoConfigured`] type.
#[derive(Default)]
pub struct PropertyTable {
    properties: Vec<Property>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
        }
    }

    /// Appends a property, builder style.
    pub fn with(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    /// Looks a property up by payload key.
    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|property| property.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter()
    }
}

// -----------------------------------------------------------------------------
// Derived encode / decode

/// Encodes an instance property by property into a payload map.
///
/// Properties whose declared type matches the runtime value are encoded
/// untagged; everything else keeps whatever tagging the engine's defaults
/// produce for it.
pub fn auto_encode(
    instance: &dyn ConfigValue,
    table: &PropertyTable,
    driver: &Driver<'_>,
) -> Result<Configuration, ConfigError> {
    let mut entries = ConfigMap::new();
    for property in table.iter() {
        let value = (property.getter)(instance)?;
        let typed = match &property.declared {
            Some(declared) if declared.type_id() == value.value_type_id() => Some(false),
            _ => None,
        };
        entries.insert(property.name().to_string(), driver.get_config(value, typed)?);
    }
    Ok(Configuration::Map(entries))
}

/// Applies a payload map to an instance property by property.
///
/// Unknown keys are refused. A property is only assigned when its decoded
/// value differs from the current one, so read-only properties tolerate
/// documents that repeat their current value.
pub fn auto_apply(
    instance: &mut dyn ConfigValue,
    table: &PropertyTable,
    entries: &ConfigMap,
    driver: &Driver<'_>,
) -> Result<(), ConfigError> {
    for (key, node) in entries {
        let Some(property) = table.get(key) else {
            return Err(ConfigError::malformed(format!(
                "`{}` has no property named `{key}`",
                (*instance).type_name()
            )));
        };
        let target = property.declared.as_ref().map(TagTable::type_id);
        let value = driver.configure_with(node.clone(), None, target)?;
        let current = (property.getter)(instance)?;
        if current.dyn_eq(&*value) {
            continue;
        }
        match &property.setter {
            Some(setter) => setter(instance, value)?,
            None => {
                return Err(ConfigError::malformed(format!(
                    "property `{key}` of `{}` is read-only",
                    (*instance).type_name()
                )))
            }
        }
    }
    Ok(())
}

/// The [`Configurable::configure`] implementation every [`AutoConfigured`]
/// type shares: start from `existing` or a default instance and apply the
/// payload map.
pub fn auto_configure<T: AutoConfigured>(
    config: &Configuration,
    existing: Option<T>,
    driver: &Driver<'_>,
) -> Result<T, ConfigError> {
    if is_boxed_shape(config) {
        return Err(ConfigError::malformed(
            "property payload is itself a tag envelope; the envelope should \
             have been resolved before decoding",
        ));
    }
    let entries = config.expect_map()?;
    let mut instance = existing.unwrap_or_default();
    auto_apply(&mut instance, T::properties(), entries, driver)?;
    Ok(instance)
}

// -----------------------------------------------------------------------------
// impl_configurable

/// Implements [`TypeTag`], [`Configurable`] and [`AutoConfigured`] for a
/// struct from a list of its fields.
///
/// Each field may name a declared type with `=>`, which keeps tag envelopes
/// out of that field's payload.
///
/// # Examples
///
/// ```
/// use cfgbox::impl_configurable;
///
/// #[derive(Debug, Default, PartialEq)]
/// struct Sensor {
///     label: String,
///     interval: i64,
/// }
///
/// impl_configurable!(Sensor in "sensors" {
///     label: String,
///     interval: i64,
/// });
/// ```
#[macro_export]
macro_rules! impl_configurable {
    ($ty:ident in $module:literal { $($field:ident : $fty:ty $(=> $declared:ty)?),* $(,)? }) => {
        impl $crate::tag::TypeTag for $ty {
            #[inline(always)]
            fn module() -> &'static str {
                $module
            }

            #[inline(always)]
            fn class_name() -> &'static str {
                ::core::stringify!($ty)
            }
        }

        impl $crate::configurable::Configurable for $ty {
            fn get_config(
                &self,
                driver: &$crate::engine::Driver<'_>,
            ) -> ::core::result::Result<$crate::config::Configuration, $crate::error::ConfigError> {
                $crate::configurable::auto_encode(
                    self,
                    <Self as $crate::configurable::AutoConfigured>::properties(),
                    driver,
                )
            }

            fn configure(
                config: &$crate::config::Configuration,
                existing: ::core::option::Option<Self>,
                driver: &$crate::engine::Driver<'_>,
            ) -> ::core::result::Result<Self, $crate::error::ConfigError> {
                $crate::configurable::auto_configure::<Self>(config, existing, driver)
            }
        }

        impl $crate::configurable::AutoConfigured for $ty {
            fn properties() -> &'static $crate::configurable::PropertyTable {
                static TABLE: ::std::sync::OnceLock<$crate::configurable::PropertyTable> =
                    ::std::sync::OnceLock::new();
                TABLE.get_or_init(|| {
                    $crate::configurable::PropertyTable::new()
                        $(.with({
                            let property = $crate::configurable::Property::new(
                                ::core::stringify!($field),
                                |instance: &$ty| &instance.$field,
                                |instance: &mut $ty, value: $fty| instance.$field = value,
                            );
                            $(let property = property.with_declared_type::<$declared>();)?
                            property
                        }))*
                })
            }
        }
    };
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{Property, PropertyTable};
    use crate::value::ConfigValue;

    #[derive(Debug, Default, PartialEq)]
    struct Sensor {
        label: String,
        interval: i64,
    }

    fn table() -> PropertyTable {
        PropertyTable::new()
            .with(Property::new(
                "label",
                |sensor: &Sensor| &sensor.label,
                |sensor: &mut Sensor, value: String| sensor.label = value,
            ))
            .with(Property::read_only("interval", |sensor: &Sensor| {
                &sensor.interval
            }))
    }

    #[test]
    fn getter_reads_through_the_erased_instance() {
        let sensor = Sensor {
            label: "probe".into(),
            interval: 5,
        };
        let table = table();
        let value = (table.get("label").unwrap().getter)(&sensor).unwrap();
        assert!(value.dyn_eq(&"probe".to_string()));
    }

    #[test]
    fn setter_writes_through_the_erased_instance() {
        let mut sensor = Sensor::default();
        let table = table();
        let setter = table.get("label").unwrap().setter.as_ref().unwrap();
        setter(&mut sensor, Box::new("probe".to_string())).unwrap();
        assert_eq!(sensor.label, "probe");
    }

    #[test]
    fn setter_rejects_a_mistyped_value() {
        let mut sensor = Sensor::default();
        let table = table();
        let setter = table.get("label").unwrap().setter.as_ref().unwrap();
        let err = setter(&mut sensor, Box::new(3_i64)).unwrap_err();
        assert!(err.to_string().contains("expects"));
    }

    #[test]
    fn read_only_property_has_no_setter() {
        let table = table();
        assert!(table.get("interval").unwrap().setter.is_none());
    }
}
