use std::borrow::Cow;
use std::sync::{PoisonError, RwLock};

use core::any::{Any, TypeId};
use core::fmt;

use crate::utils::hash::{HashMap, new_map};

// -----------------------------------------------------------------------------
// TypeTag

/// A static accessor to a type's `(module, class)` identity.
///
/// The pair is what a boxed configuration carries in its `__module__` and
/// `__class__` keys, and what a [`Context`](crate::context::Context) keys its
/// registry and access-control policy on. Implementing `TypeTag` is an
/// explicit, deliberate act: it makes no statement about accessibility, it
/// only gives the type a stable name.
///
/// Identity strings are free-form. Use the Rust module path for Rust-native
/// types, or the identifier an external producer writes (e.g. a Python module
/// name) when interoperating with foreign data.
///
/// # Implementation
///
/// Use [`impl_type_tag!`](crate::impl_type_tag) for the common case:
///
/// ```
/// struct Shape;
///
/// cfgbox::impl_type_tag!(Shape => "demo::shapes", "Shape");
///
/// use cfgbox::tag::TypeTag;
/// assert_eq!(Shape::module(), "demo::shapes");
/// assert_eq!(Shape::class_name(), "Shape");
/// ```
///
/// Generic types build their class name once per instantiation through a
/// [`GenericTagCell`], since a `static` inside a generic function is shared
/// by every instantiation:
///
/// ```
/// use cfgbox::tag::{GenericTagCell, TypeTag};
///
/// struct Holder<T>(T);
///
/// impl<T: TypeTag> TypeTag for Holder<T> {
///     fn module() -> &'static str {
///         "demo"
///     }
///     fn class_name() -> &'static str {
///         static CELL: GenericTagCell = GenericTagCell::new();
///         CELL.get_or_insert::<Self>(|| format!("Holder<{}>", T::class_name()))
///     }
/// }
///
/// assert_eq!(<Holder<i64>>::class_name(), "Holder<i64>");
/// ```
pub trait TypeTag: 'static {
    /// The source module identifier of the type.
    fn module() -> &'static str;

    /// The type's name within its module.
    fn class_name() -> &'static str;
}

// -----------------------------------------------------------------------------
// TagPair

/// An owned-or-borrowed `(module, class)` identifier pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagPair {
    module: Cow<'static, str>,
    class: Cow<'static, str>,
}

impl TagPair {
    /// Creates a pair from explicit identifier strings.
    #[inline]
    pub fn new(module: impl Into<Cow<'static, str>>, class: impl Into<Cow<'static, str>>) -> Self {
        Self {
            module: module.into(),
            class: class.into(),
        }
    }

    /// The intrinsic pair of a type implementing [`TypeTag`].
    #[inline]
    pub fn of<T: TypeTag + ?Sized>() -> Self {
        Self {
            module: Cow::Borrowed(T::module()),
            class: Cow::Borrowed(T::class_name()),
        }
    }

    /// The module part of the pair.
    #[inline]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The class part of the pair.
    #[inline]
    pub fn class(&self) -> &str {
        &self.class
    }
}

/// Formats as `module::class`.
impl fmt::Display for TagPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.class)
    }
}

// -----------------------------------------------------------------------------
// TagTable

/// Lightweight vtable providing dynamic access to a type's [`TypeTag`]
/// identity plus its [`TypeId`].
///
/// Stores function pointers rather than resolved strings, keeping
/// construction free for types that are rarely queried.
#[derive(Clone, Copy)]
pub struct TagTable {
    type_id: TypeId,
    module: fn() -> &'static str,
    class_name: fn() -> &'static str,
}

impl TagTable {
    /// Creates a table from a type.
    #[inline]
    pub const fn of<T: TypeTag>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            module: T::module,
            class_name: T::class_name,
        }
    }

    /// Returns the [`TypeId`] of the type.
    #[inline(always)]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// See [`TypeTag::module`].
    #[inline(always)]
    pub fn module(&self) -> &'static str {
        (self.module)()
    }

    /// See [`TypeTag::class_name`].
    #[inline(always)]
    pub fn class_name(&self) -> &'static str {
        (self.class_name)()
    }

    /// Resolves the table into a borrowed [`TagPair`].
    #[inline]
    pub fn pair(&self) -> TagPair {
        TagPair {
            module: Cow::Borrowed(self.module()),
            class: Cow::Borrowed(self.class_name()),
        }
    }
}

impl fmt::Debug for TagTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagTable")
            .field("module", &self.module())
            .field("class_name", &self.class_name())
            .finish()
    }
}

// -----------------------------------------------------------------------------
// GenericTagCell

/// Static storage for the class names of generic types.
///
/// A `static CELL` inside a generic function is shared by every
/// instantiation, so the cell keys entries by [`TypeId`] and leaks each
/// rendered name once.
pub struct GenericTagCell(RwLock<HashMap<TypeId, &'static str>>);

impl GenericTagCell {
    /// Creates an empty cell.
    #[inline]
    pub const fn new() -> Self {
        Self(RwLock::new(new_map()))
    }

    /// Returns the name stored for type `G`, rendering and leaking it from
    /// the given function on first use.
    pub fn get_or_insert<G: Any + ?Sized>(&self, f: impl FnOnce() -> String) -> &'static str {
        let type_id = TypeId::of::<G>();
        if let Some(name) = self
            .0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .copied()
        {
            return name;
        }
        // Render before taking the write lock: `f` recurses into this cell
        // for nested instantiations of the same generic.
        let name: &'static str = String::leak(f());
        let mut table = self.0.write().unwrap_or_else(PoisonError::into_inner);
        *table.entry(type_id).or_insert(name)
    }
}

// -----------------------------------------------------------------------------
// impl_type_tag

/// Implements [`TypeTag`] for a type from two string literals.
///
/// ```
/// struct Circle;
/// cfgbox::impl_type_tag!(Circle => "demo::shapes", "Circle");
/// ```
#[macro_export]
macro_rules! impl_type_tag {
    ($ty:ty => $module:literal, $class:literal) => {
        impl $crate::tag::TypeTag for $ty {
            #[inline(always)]
            fn module() -> &'static str {
                $module
            }

            #[inline(always)]
            fn class_name() -> &'static str {
                $class
            }
        }
    };
}

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use super::{GenericTagCell, TagPair, TagTable, TypeTag};

    struct Point;
    crate::impl_type_tag!(Point => "demo", "Point");

    struct Pair<T>(T, T);

    impl<T: TypeTag> TypeTag for Pair<T> {
        fn module() -> &'static str {
            "demo"
        }
        fn class_name() -> &'static str {
            static CELL: GenericTagCell = GenericTagCell::new();
            CELL.get_or_insert::<Self>(|| format!("Pair<{}>", T::class_name()))
        }
    }

    #[test]
    fn intrinsic_pair() {
        let pair = TagPair::of::<Point>();
        assert_eq!(pair.module(), "demo");
        assert_eq!(pair.class(), "Point");
        assert_eq!(pair.to_string(), "demo::Point");
    }

    #[test]
    fn tag_table_matches_trait() {
        let table = TagTable::of::<Point>();
        assert_eq!(table.module(), Point::module());
        assert_eq!(table.class_name(), Point::class_name());
        assert_eq!(table.pair(), TagPair::of::<Point>());
    }

    #[test]
    fn generic_instantiations_do_not_collide() {
        assert_eq!(<Pair<Point>>::class_name(), "Pair<Point>");
        assert_eq!(<Pair<Pair<Point>>>::class_name(), "Pair<Pair<Point>>");
        // Cached second lookup returns the same leaked string.
        assert_eq!(<Pair<Point>>::class_name(), "Pair<Point>");
    }
}
