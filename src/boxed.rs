use core::any::TypeId;

use crate::config::{ConfigMap, Configuration};
use crate::context::Context;
use crate::error::ConfigError;
use crate::hooks::Namespace;
use crate::tag::TagPair;

/// Key naming the module half of a boxed node's type tag.
pub const MODULE_KEY: &str = "__module__";
/// Key naming the class half of a boxed node's type tag.
pub const CLASS_KEY: &str = "__class__";
/// Key holding a boxed node's payload.
pub const INSTANCE_KEY: &str = "__instance__";

// -----------------------------------------------------------------------------
// Shape

/// Returns `true` if the node is a map with exactly the three envelope keys
/// and string-valued tag halves.
///
/// A map carrying the three keys plus anything else is ordinary data, not an
/// envelope.
pub fn is_boxed_shape(config: &Configuration) -> bool {
    let Configuration::Map(entries) = config else {
        return false;
    };
    entries.len() == 3
        && matches!(entries.get(MODULE_KEY), Some(Configuration::Str(_)))
        && matches!(entries.get(CLASS_KEY), Some(Configuration::Str(_)))
        && entries.contains_key(INSTANCE_KEY)
}

/// Wraps a payload in a tag envelope.
///
/// Wrapping is idempotent: a payload that is already an envelope carrying
/// the same tag is returned unchanged rather than double-wrapped.
pub fn wrap(pair: &TagPair, config: Configuration) -> Configuration {
    if is_boxed_shape(&config) {
        if let Some((existing, _)) = read_tag(&config) {
            if existing == *pair {
                return config;
            }
        }
    }
    let mut entries = ConfigMap::new();
    entries.insert(MODULE_KEY.to_string(), Configuration::Str(pair.module().to_string()));
    entries.insert(CLASS_KEY.to_string(), Configuration::Str(pair.class().to_string()));
    entries.insert(INSTANCE_KEY.to_string(), config);
    Configuration::Map(entries)
}

/// Reads the tag pair and a reference to the payload out of an envelope,
/// without checking any registry. Returns `None` for non-envelope nodes.
pub fn read_tag(config: &Configuration) -> Option<(TagPair, &Configuration)> {
    if !is_boxed_shape(config) {
        return None;
    }
    let entries = config.as_map()?;
    let module = entries.get(MODULE_KEY)?.as_str()?;
    let class = entries.get(CLASS_KEY)?.as_str()?;
    let payload = entries.get(INSTANCE_KEY)?;
    Some((TagPair::new(module.to_string(), class.to_string()), payload))
}

// -----------------------------------------------------------------------------
// Box / unbox

/// Wraps a payload in the envelope naming `type_id`.
///
/// The tag is looked up through the context, which enforces its access
/// policy before the envelope is produced.
pub fn box_config(
    type_id: TypeId,
    config: Configuration,
    context: &Context,
    namespace: &Namespace,
) -> Result<Configuration, ConfigError> {
    let pair = context.locate(type_id, namespace)?;
    Ok(wrap(&pair, config))
}

/// Resolves an envelope back to a type id and its payload.
///
/// Untagged nodes are not an error: they resolve to the shape's native type
/// and are returned whole. Envelope nodes have their tag resolved through
/// the context, which may refuse with [`ConfigError::AccessDenied`].
pub fn unbox_config(
    config: Configuration,
    context: &Context,
    namespace: &Namespace,
) -> Result<(TypeId, Configuration), ConfigError> {
    if !is_boxed_shape(&config) {
        let type_id = config.native_type_id();
        return Ok((type_id, config));
    }
    let Configuration::Map(mut entries) = config else {
        unreachable!("boxed shape is always a map");
    };
    let Some(Configuration::Str(module)) = entries.remove(MODULE_KEY) else {
        unreachable!("boxed shape has a str module");
    };
    let Some(Configuration::Str(class)) = entries.remove(CLASS_KEY) else {
        unreachable!("boxed shape has a str class");
    };
    let Some(payload) = entries.remove(INSTANCE_KEY) else {
        unreachable!("boxed shape has an instance");
    };
    let type_id = context.resolve(&module, &class, namespace)?;
    Ok((type_id, payload))
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{is_boxed_shape, read_tag, wrap, CLASS_KEY, INSTANCE_KEY, MODULE_KEY};
    use crate::config::{ConfigMap, Configuration};
    use crate::tag::TagPair;

    fn pair() -> TagPair {
        TagPair::new("widgets", "Gear")
    }

    #[test]
    fn wrap_produces_the_three_key_shape() {
        let wrapped = wrap(&pair(), Configuration::Int(9));
        assert!(is_boxed_shape(&wrapped));
        let entries = wrapped.as_map().unwrap();
        assert_eq!(entries[MODULE_KEY], Configuration::Str("widgets".into()));
        assert_eq!(entries[CLASS_KEY], Configuration::Str("Gear".into()));
        assert_eq!(entries[INSTANCE_KEY], Configuration::Int(9));
    }

    #[test]
    fn wrap_is_idempotent_for_the_same_tag() {
        let once = wrap(&pair(), Configuration::Int(9));
        let twice = wrap(&pair(), once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn wrap_nests_for_a_different_tag() {
        let inner = wrap(&pair(), Configuration::Int(9));
        let outer = wrap(&TagPair::new("widgets", "Crate"), inner.clone());
        let (tag, payload) = read_tag(&outer).unwrap();
        assert_eq!(tag.class(), "Crate");
        assert_eq!(*payload, inner);
    }

    #[test]
    fn extra_keys_defeat_the_shape() {
        let mut entries = ConfigMap::new();
        entries.insert(MODULE_KEY.into(), Configuration::Str("widgets".into()));
        entries.insert(CLASS_KEY.into(), Configuration::Str("Gear".into()));
        entries.insert(INSTANCE_KEY.into(), Configuration::Null);
        entries.insert("extra".into(), Configuration::Null);
        assert!(!is_boxed_shape(&Configuration::Map(entries)));
    }

    #[test]
    fn non_string_tag_halves_defeat_the_shape() {
        let mut entries = ConfigMap::new();
        entries.insert(MODULE_KEY.into(), Configuration::Int(1));
        entries.insert(CLASS_KEY.into(), Configuration::Str("Gear".into()));
        entries.insert(INSTANCE_KEY.into(), Configuration::Null);
        assert!(!is_boxed_shape(&Configuration::Map(entries)));
    }
}
