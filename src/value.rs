use core::any::{Any, TypeId};
use core::fmt;

// -----------------------------------------------------------------------------
// ConfigValue

/// The dynamic value abstraction the dispatch layer operates on.
///
/// Encoders receive `&dyn ConfigValue`, decoders produce
/// `Box<dyn ConfigValue>`; everything in between (property enumeration,
/// containers of mixed element types, existing-instance reuse) is routed
/// through this trait.
///
/// A blanket implementation covers every `T: Any + PartialEq + Debug`, so
/// participating types rarely implement it by hand. Opting a type into
/// encode/decode happens separately, through the
/// [`HookRegistry`](crate::hooks::HookRegistry) or a
/// [`Configurable`](crate::configurable::Configurable) implementation.
///
/// # Type Identification
///
/// `Box<dyn ConfigValue>` satisfies the blanket implementation itself, so a
/// method call on a `Value` receiver resolves at the box, not the inner
/// value. Deref to the trait object first; `(*x).value_type_id()` reports
/// the inner type where `x.value_type_id()` would report the box's own:
///
/// ```
/// use cfgbox::value::ConfigValue;
/// use core::any::TypeId;
///
/// let x: Box<dyn ConfigValue> = Box::new(32_i64);
/// assert_eq!((*x).value_type_id(), TypeId::of::<i64>());
/// ```
pub trait ConfigValue: Any + fmt::Debug {
    /// Casts to [`Any`] by reference.
    fn as_any(&self) -> &dyn Any;

    /// Casts to [`Any`] by mutable reference.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Casts to a boxed [`Any`], consuming the box.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Returns the [`TypeId`] of the underlying value.
    #[inline]
    fn value_type_id(&self) -> TypeId {
        self.as_any().type_id()
    }

    /// Returns the compiler-rendered name of the underlying type.
    ///
    /// Diagnostic only; registries identify types by
    /// [`TagPair`](crate::tag::TagPair), never by this string.
    fn type_name(&self) -> &'static str;

    /// Structural equality across `dyn ConfigValue` values.
    ///
    /// Returns `false` whenever the underlying types differ.
    fn dyn_eq(&self, other: &dyn ConfigValue) -> bool;
}

impl<T: Any + PartialEq + fmt::Debug> ConfigValue for T {
    #[inline(always)]
    fn as_any(&self) -> &dyn Any {
        self
    }

    #[inline(always)]
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    #[inline(always)]
    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    #[inline]
    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }

    #[inline]
    fn dyn_eq(&self, other: &dyn ConfigValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

impl dyn ConfigValue {
    /// Returns `true` if the underlying value is of type `T`.
    #[inline]
    pub fn is<T: Any>(&self) -> bool {
        self.value_type_id() == TypeId::of::<T>()
    }

    /// Downcasts the value to type `T` by reference.
    #[inline]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    /// Downcasts the value to type `T` by mutable reference.
    #[inline]
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut()
    }

    /// Downcasts the value to type `T`, unboxing and consuming the box.
    ///
    /// If the underlying value is not of type `T`, returns `Err(self)`.
    pub fn take<T: Any>(self: Box<dyn ConfigValue>) -> Result<T, Box<dyn ConfigValue>> {
        if !self.is::<T>() {
            return Err(self);
        }
        match self.into_any().downcast::<T>() {
            Ok(value) => Ok(*value),
            Err(_) => unreachable!("type was checked above"),
        }
    }
}

impl PartialEq for dyn ConfigValue {
    #[inline]
    fn eq(&self, other: &dyn ConfigValue) -> bool {
        self.dyn_eq(other)
    }
}

// -----------------------------------------------------------------------------
// Value

/// An owned, dynamically typed value.
///
/// The native type of untagged sequences is `Vec<Value>`, and of untagged
/// mappings `BTreeMap<String, Value>`.
pub type Value = Box<dyn ConfigValue>;

crate::impl_type_tag!(Value => "cfgbox", "Value");

// -----------------------------------------------------------------------------
// Tests

#[cfg(test)]
mod tests {
    use core::any::TypeId;

    use super::{ConfigValue, Value};

    #[test]
    fn dyn_eq_same_type() {
        let a: Value = Box::new(3_i64);
        let b: Value = Box::new(3_i64);
        let c: Value = Box::new(4_i64);
        assert!((*a).dyn_eq(&*b));
        assert!(!(*a).dyn_eq(&*c));
    }

    #[test]
    fn dyn_eq_mismatched_type() {
        let a: Value = Box::new(3_i64);
        let b: Value = Box::new("3".to_string());
        assert!(!(*a).dyn_eq(&*b));
    }

    #[test]
    fn boxed_receiver_reports_the_inner_type_after_deref() {
        // The blanket impl covers `Value` itself; identity checks must go
        // through the trait object, where dispatch reaches the inner value.
        let a: Value = Box::new(3_i64);
        assert_eq!((*a).value_type_id(), TypeId::of::<i64>());
        assert_ne!((*a).value_type_id(), TypeId::of::<Value>());
        let b: Value = Box::new(3_i64);
        assert!((*a).dyn_eq(&*b));
        // `PartialEq` on `Value` derefs both sides and agrees.
        assert!(a == b);
    }

    #[test]
    fn take_round_trip() {
        let a: Value = Box::new("hello".to_string());
        assert_eq!(a.take::<String>().unwrap(), "hello");

        let b: Value = Box::new(1_i64);
        assert!(b.take::<String>().is_err());
    }

    #[test]
    fn nested_containers_compare_structurally() {
        let a: Vec<Value> = vec![Box::new(1_i64), Box::new("two".to_string())];
        let b: Vec<Value> = vec![Box::new(1_i64), Box::new("two".to_string())];
        assert!(a.dyn_eq(&b));
    }
}
