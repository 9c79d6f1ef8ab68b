use core::any::{Any, TypeId};
use core::panic::Location;

use crate::error::ConfigError;
use crate::hooks::Namespace;
use crate::tag::{TagPair, TypeTag};
use crate::utils::{new_map, new_set, HashMap, HashSet};

// -----------------------------------------------------------------------------
// Registration

struct Registration {
    type_id: TypeId,
    registered_at: &'static Location<'static>,
}

// -----------------------------------------------------------------------------
// Context

/// A named naming scope with its own type registry and access policy.
///
/// Contexts decide which types a document may *name*. Two documents decoded
/// under different contexts can resolve the same `(module, class)` pair to
/// different types, or one can refuse a pair the other accepts. Hooks are
/// not per-context; they live on the engine.
///
/// # Access policy
///
/// A pair that is explicitly registered always resolves. Otherwise the
/// policy applies, with denial taking precedence over allowance and
/// allowance over the default posture:
///
/// * a denied module or class never resolves;
/// * an explicitly allowed module or class resolves;
/// * otherwise the posture flags decide. By default any module the engine
///   has hooks for is reachable and any class not named with a leading
///   underscore is public.
pub struct Context {
    name: String,
    registry: HashMap<TagPair, Registration>,
    location_map: HashMap<TypeId, TagPair>,
    all_modules_allowed_by_default: bool,
    registered_modules_allowed_by_default: bool,
    public_classes_allowed_by_default: bool,
    allowed_modules: HashSet<String>,
    denied_modules: HashSet<String>,
    allowed_classes: HashSet<TagPair>,
    denied_classes: HashSet<TagPair>,
}

impl Context {
    /// Creates a context with the default posture and nothing registered.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: new_map(),
            location_map: new_map(),
            all_modules_allowed_by_default: false,
            registered_modules_allowed_by_default: true,
            public_classes_allowed_by_default: true,
            allowed_modules: new_set(),
            denied_modules: new_set(),
            allowed_classes: new_set(),
            denied_classes: new_set(),
        }
    }

    /// The context's name, as known to its engine.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    // -------------------------------------------------------------------------
    // Registration

    /// Registers `T` under its intrinsic `(module, class)` pair.
    ///
    /// Fails with [`ConfigError::NamingConflict`] when the pair is already
    /// registered and `overwrite` is not set.
    #[track_caller]
    pub fn register<T: TypeTag>(&mut self, overwrite: bool) -> Result<(), ConfigError> {
        self.register_pair(TagPair::of::<T>(), TypeId::of::<T>(), overwrite)
    }

    /// Registers `T` under an explicit pair, aliasing or replacing its
    /// intrinsic name within this context only.
    #[track_caller]
    pub fn register_as<T: Any>(
        &mut self,
        pair: TagPair,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        self.register_pair(pair, TypeId::of::<T>(), overwrite)
    }

    #[track_caller]
    fn register_pair(
        &mut self,
        pair: TagPair,
        type_id: TypeId,
        overwrite: bool,
    ) -> Result<(), ConfigError> {
        let location = Location::caller();
        if let Some(previous) = self.registry.get(&pair) {
            // Re-registering the same binding is a no-op, not a conflict.
            if previous.type_id == type_id {
                return Ok(());
            }
            if !overwrite {
                return Err(ConfigError::conflict(
                    format!("class named `{pair}` in the `{}` context", self.name),
                    previous.registered_at,
                ));
            }
            log::debug!(
                "overwriting the `{pair}` registration made at {} in the `{}` context",
                previous.registered_at,
                self.name
            );
            // The displaced type's reverse mapping must not keep pointing at
            // a pair that now names someone else.
            if self.location_map.get(&previous.type_id) == Some(&pair) {
                self.location_map.remove(&previous.type_id);
            }
        }
        self.registry.insert(
            pair.clone(),
            Registration {
                type_id,
                registered_at: location,
            },
        );
        self.location_map.insert(type_id, pair);
        Ok(())
    }

    /// Returns `true` if the pair is explicitly registered here.
    pub fn is_registered(&self, pair: &TagPair) -> bool {
        self.registry.contains_key(pair)
    }

    // -------------------------------------------------------------------------
    // Policy

    /// Allows every module regardless of reachability. Off by default.
    pub fn set_all_modules_allowed_by_default(&mut self, allowed: bool) -> &mut Self {
        self.all_modules_allowed_by_default = allowed;
        self
    }

    /// Allows modules the engine has hooks for. On by default.
    pub fn set_registered_modules_allowed_by_default(&mut self, allowed: bool) -> &mut Self {
        self.registered_modules_allowed_by_default = allowed;
        self
    }

    /// Allows classes without a leading underscore. On by default.
    pub fn set_public_classes_allowed_by_default(&mut self, allowed: bool) -> &mut Self {
        self.public_classes_allowed_by_default = allowed;
        self
    }

    /// Allows a module by name, overriding the default posture.
    pub fn allow_module(&mut self, module: impl Into<String>) -> &mut Self {
        self.allowed_modules.insert(module.into());
        self
    }

    /// Denies a module by name. Denial beats every allowance.
    pub fn deny_module(&mut self, module: impl Into<String>) -> &mut Self {
        self.denied_modules.insert(module.into());
        self
    }

    /// Allows a single class, overriding the default posture.
    pub fn allow_class(&mut self, pair: TagPair) -> &mut Self {
        self.allowed_classes.insert(pair);
        self
    }

    /// Denies a single class. Denial beats every allowance.
    pub fn deny_class(&mut self, pair: TagPair) -> &mut Self {
        self.denied_classes.insert(pair);
        self
    }

    fn module_access_allowed(&self, module: &str, namespace: &Namespace) -> bool {
        if self.denied_modules.contains(module) {
            return false;
        }
        if self.allowed_modules.contains(module) {
            return true;
        }
        if self.all_modules_allowed_by_default {
            return true;
        }
        self.registered_modules_allowed_by_default && namespace.has_module(module)
    }

    fn class_access_allowed(&self, pair: &TagPair) -> bool {
        if self.denied_classes.contains(pair) {
            return false;
        }
        if self.allowed_classes.contains(pair) {
            return true;
        }
        self.public_classes_allowed_by_default && !pair.class().starts_with('_')
    }

    // -------------------------------------------------------------------------
    // Resolution

    /// Resolves a `(module, class)` pair to a type id.
    ///
    /// An explicit registration wins unconditionally. Otherwise the pair
    /// must both pass the access policy and be known to the namespace.
    pub fn resolve(
        &self,
        module: &str,
        class: &str,
        namespace: &Namespace,
    ) -> Result<TypeId, ConfigError> {
        let pair = TagPair::new(module.to_string(), class.to_string());
        if let Some(registration) = self.registry.get(&pair) {
            return Ok(registration.type_id);
        }
        if self.module_access_allowed(module, namespace) && self.class_access_allowed(&pair) {
            if let Some(type_id) = namespace.get(module, class) {
                return Ok(type_id);
            }
        }
        Err(ConfigError::AccessDenied {
            pair,
            context: self.name.clone(),
        })
    }

    /// Produces the `(module, class)` pair a type is named by in this
    /// context.
    ///
    /// A registered type returns its registered pair. An unregistered type
    /// falls back to the pair its hooks recorded, provided that pair would
    /// resolve back to the same type here; if it would not, naming the type
    /// in a document produced under this context would be useless or
    /// misleading, so the location is refused.
    pub fn locate(&self, type_id: TypeId, namespace: &Namespace) -> Result<TagPair, ConfigError> {
        if let Some(pair) = self.location_map.get(&type_id) {
            return Ok(pair.clone());
        }
        let Some(pair) = namespace.pair_of(type_id) else {
            return Err(ConfigError::AccessDenied {
                pair: TagPair::new("<unknown>", "<unknown>"),
                context: self.name.clone(),
            });
        };
        match self.resolve(pair.module(), pair.class(), namespace) {
            Ok(resolved) if resolved == type_id => Ok(pair.clone()),
            _ => Err(ConfigError::AccessDenied {
                pair: pair.clone(),
                context: self.name.clone(),
            }),
        }
    }
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::any::TypeId;

    use super::Context;
    use crate::error::ConfigError;
    use crate::hooks::Namespace;
    use crate::impl_type_tag;
    use crate::tag::TagPair;

    #[derive(Debug, PartialEq)]
    struct Gear;
    impl_type_tag!(Gear => "widgets", "Gear");

    #[derive(Debug, PartialEq)]
    struct Hidden;
    impl_type_tag!(Hidden => "widgets", "_Hidden");

    fn namespace() -> Namespace {
        let mut namespace = Namespace::new();
        namespace.insert(TagPair::of::<Gear>(), TypeId::of::<Gear>());
        namespace.insert(TagPair::of::<Hidden>(), TypeId::of::<Hidden>());
        namespace
    }

    #[test]
    fn reachable_public_class_resolves_by_default() {
        let context = Context::new("default");
        let namespace = namespace();
        assert_eq!(
            context.resolve("widgets", "Gear", &namespace).unwrap(),
            TypeId::of::<Gear>()
        );
    }

    #[test]
    fn underscored_class_needs_an_explicit_allowance() {
        let mut context = Context::new("default");
        let namespace = namespace();
        assert!(context.resolve("widgets", "_Hidden", &namespace).is_err());
        context.allow_class(TagPair::of::<Hidden>());
        assert!(context.resolve("widgets", "_Hidden", &namespace).is_ok());
    }

    #[test]
    fn denial_beats_allowance() {
        let mut context = Context::new("default");
        let namespace = namespace();
        context.allow_module("widgets");
        context.deny_class(TagPair::of::<Gear>());
        let err = context.resolve("widgets", "Gear", &namespace).unwrap_err();
        assert!(matches!(err, ConfigError::AccessDenied { .. }));
    }

    #[test]
    fn unreachable_module_needs_all_modules_posture() {
        let mut context = Context::new("default");
        let namespace = Namespace::new();
        assert!(context.resolve("widgets", "Gear", &namespace).is_err());
        context.set_all_modules_allowed_by_default(true);
        // Allowed now, but the empty namespace still cannot produce a type.
        assert!(context.resolve("widgets", "Gear", &namespace).is_err());
    }

    #[test]
    fn registration_wins_over_policy() {
        let mut context = Context::new("default");
        let namespace = namespace();
        context.deny_module("widgets");
        assert!(context.resolve("widgets", "Gear", &namespace).is_err());
        context.register::<Gear>(false).unwrap();
        assert_eq!(
            context.resolve("widgets", "Gear", &namespace).unwrap(),
            TypeId::of::<Gear>()
        );
    }

    #[test]
    fn duplicate_registration_conflicts_without_overwrite() {
        let mut context = Context::new("default");
        let pair = TagPair::new("widgets", "Gear");
        context.register_as::<Gear>(pair.clone(), false).unwrap();
        let err = context.register_as::<Hidden>(pair.clone(), false).unwrap_err();
        assert!(matches!(err, ConfigError::NamingConflict { .. }));
        context.register_as::<Hidden>(pair, true).unwrap();
    }

    #[test]
    fn identical_reregistration_is_tolerated() {
        let mut context = Context::new("default");
        context.register::<Gear>(false).unwrap();
        // Same pair, same type: nothing changed, nothing conflicts.
        context.register::<Gear>(false).unwrap();
        let namespace = namespace();
        assert_eq!(
            context.resolve("widgets", "Gear", &namespace).unwrap(),
            TypeId::of::<Gear>()
        );
    }

    #[test]
    fn locate_prefers_the_registered_pair() {
        let mut context = Context::new("default");
        let namespace = namespace();
        context
            .register_as::<Gear>(TagPair::new("aliases", "Cog"), false)
            .unwrap();
        let pair = context.locate(TypeId::of::<Gear>(), &namespace).unwrap();
        assert_eq!(pair, TagPair::new("aliases", "Cog"));
    }

    #[test]
    fn locate_falls_back_to_the_namespace_pair() {
        let context = Context::new("default");
        let namespace = namespace();
        let pair = context.locate(TypeId::of::<Gear>(), &namespace).unwrap();
        assert_eq!(pair, TagPair::of::<Gear>());
    }

    #[test]
    fn locate_refuses_a_denied_type() {
        let mut context = Context::new("default");
        let namespace = namespace();
        context.deny_module("widgets");
        assert!(context.locate(TypeId::of::<Gear>(), &namespace).is_err());
    }

    #[test]
    fn overwrite_clears_the_displaced_reverse_mapping() {
        let mut context = Context::new("default");
        let namespace = namespace();
        let pair = TagPair::new("aliases", "Cog");
        context.register_as::<Gear>(pair.clone(), false).unwrap();
        context.register_as::<Hidden>(pair, true).unwrap();
        // Gear no longer has a registered pair, so it falls back to its
        // namespace pair.
        let located = context.locate(TypeId::of::<Gear>(), &namespace).unwrap();
        assert_eq!(located, TagPair::of::<Gear>());
    }
}
