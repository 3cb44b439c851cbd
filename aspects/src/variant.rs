use std::any::Any;
use std::borrow::Cow;
use std::fmt;

use log::warn;

use crate::document::{NodeMut, NodeRef};
use crate::registry::TypeRegistry;
use crate::types::{Describe, Type};

struct Held {
    ty: Type,
    value: Box<dyn Any>,
}

/// Holds nothing or exactly one value of any described type.
///
/// Typed access compares descriptors exactly: a variant holding an `i32` is
/// not an `i64`.
#[derive(Default)]
pub struct Variant {
    held: Option<Held>,
}

impl Variant {
    pub const fn empty() -> Self {
        Variant { held: None }
    }

    pub fn new<T: Describe>(value: T) -> Self {
        Variant {
            held: Some(Held {
                ty: T::TYPE,
                value: Box::new(value),
            }),
        }
    }

    /// A default value of `ty`.
    pub fn construct(ty: Type) -> Self {
        Variant {
            held: Some(Held {
                ty,
                value: ty.construct(),
            }),
        }
    }

    pub fn set<T: Describe>(&mut self, value: T) {
        *self = Variant::new(value);
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_none()
    }

    pub fn type_info(&self) -> Option<Type> {
        self.held.as_ref().map(|held| held.ty)
    }

    pub fn type_name(&self) -> Cow<'static, str> {
        match &self.held {
            Some(held) => held.ty.name(),
            None => Cow::Borrowed("empty"),
        }
    }

    pub fn is_a<T: Describe>(&self) -> bool {
        self.type_info() == Some(T::TYPE)
    }

    /// A copy of the held value when it is a `T`.
    pub fn get<T: Describe>(&self) -> Option<T> {
        self.get_ref::<T>().cloned()
    }

    pub fn get_ref<T: Describe>(&self) -> Option<&T> {
        self.held
            .as_ref()
            .filter(|held| held.ty == T::TYPE)
            .and_then(|held| held.value.downcast_ref())
    }

    pub fn get_mut<T: Describe>(&mut self) -> Option<&mut T> {
        self.held
            .as_mut()
            .filter(|held| held.ty == T::TYPE)
            .and_then(|held| held.value.downcast_mut())
    }

    /// # Panics
    /// If the variant doesn't hold a `T`.
    pub fn expect<T: Describe>(&self) -> &T {
        match self.get_ref::<T>() {
            Some(value) => value,
            None => panic!(
                "variant holds {}, not {}",
                self.type_name(),
                T::type_name()
            ),
        }
    }

    pub fn into_inner<T: Describe>(self) -> Result<T, Self> {
        match self.held {
            Some(held) if held.ty == T::TYPE => match held.value.downcast::<T>() {
                Ok(value) => Ok(*value),
                Err(value) => Err(Variant {
                    held: Some(Held { ty: held.ty, value }),
                }),
            },
            held => Err(Variant { held }),
        }
    }

    pub(crate) fn as_any(&self) -> Option<&dyn Any> {
        self.held.as_ref().map(|held| held.value.as_ref())
    }

    pub fn clear(&mut self) {
        self.held = None;
    }

    /// Moves the value out, leaving this variant empty.
    pub fn take(&mut self) -> Variant {
        Variant {
            held: self.held.take(),
        }
    }

    /// Starts a type switch: `f` runs if the variant holds a `T`.
    pub fn when<T: Describe>(&self, f: impl FnOnce(&T)) -> Match<'_> {
        Match {
            variant: self,
            matched: false,
        }
        .when(f)
    }
}

/// A type switch over a [`Variant`]. Only the first matching arm runs.
pub struct Match<'a> {
    variant: &'a Variant,
    matched: bool,
}

impl<'a> Match<'a> {
    pub fn when<T: Describe>(mut self, f: impl FnOnce(&T)) -> Self {
        if !self.matched {
            if let Some(value) = self.variant.get_ref::<T>() {
                f(value);
                self.matched = true;
            }
        }
        self
    }

    /// Runs `f` when no arm matched, including for empty variants.
    pub fn otherwise(self, f: impl FnOnce()) {
        if !self.matched {
            f();
        }
    }

    pub fn matched(&self) -> bool {
        self.matched
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        Variant {
            held: self.held.as_ref().map(|held| Held {
                ty: held.ty,
                value: held.ty.clone_value(held.value.as_ref()),
            }),
        }
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.held {
            None => f.write_str("Variant(empty)"),
            Some(held) => {
                let mut doc = crate::Document::new();
                held.ty.serialize(held.value.as_ref(), doc.root_mut());
                write!(f, "Variant({}: {})", held.ty.name(), doc.root().dump())
            }
        }
    }
}

impl Describe for Variant {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("Variant")
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        match &self.held {
            None => node.set_empty(),
            Some(held) => {
                node.entry("type").set_str(held.ty.name());
                held.ty.serialize(held.value.as_ref(), node.entry("value"));
            }
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry) {
        if node.is_empty() {
            self.clear();
            return;
        }
        if !node.expect_map("Variant") {
            return;
        }
        let Some(name) = node.get("type").as_str() else {
            warn!("variant without a type name");
            self.clear();
            return;
        };
        let Some(ty) = registry.type_named(name) else {
            warn!("variant holds unknown type `{name}`");
            self.clear();
            return;
        };
        let mut value = ty.construct();
        ty.deserialize(value.as_mut(), node.get("value"), registry);
        self.held = Some(Held { ty, value });
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::document::Document;

    #[test]
    fn holds_one_value() {
        let mut v = Variant::new(42i32);
        assert!(v.is_a::<i32>());
        assert!(!v.is_a::<i64>());
        assert_eq!(v.get::<i32>(), Some(42));
        assert_eq!(v.get::<i64>(), None);

        v.set(String::from("hello"));
        assert_eq!(v.get_ref::<String>().map(String::as_str), Some("hello"));
        assert_eq!(v.type_name(), "String");

        v.clear();
        assert!(v.is_empty());
        assert_eq!(v.type_name(), "empty");
    }

    #[test]
    fn take_leaves_source_empty() {
        let mut a = Variant::new(vec![1u8, 2, 3]);
        let b = a.take();
        assert!(a.is_empty());
        assert_eq!(b.get::<Vec<u8>>(), Some(vec![1, 2, 3]));
    }

    #[test]
    fn clone_is_deep() {
        let a = Variant::new(String::from("x"));
        let mut b = a.clone();
        b.get_mut::<String>().unwrap().push('y');
        assert_eq!(a.expect::<String>(), "x");
        assert_eq!(b.expect::<String>(), "xy");
    }

    #[test]
    fn shared_payload_refcount() {
        let payload = Arc::new(7i64);
        {
            let mut a = Variant::new(payload.clone());
            assert_eq!(Arc::strong_count(&payload), 2);
            let b = a.clone();
            assert_eq!(Arc::strong_count(&payload), 3);
            let c = a.take();
            assert_eq!(Arc::strong_count(&payload), 3);
            drop(b);
            drop(c);
            a.set(1i32);
        }
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn type_switch_runs_first_match() {
        let v = Variant::new(2.5f64);
        let mut hits = Vec::new();
        v.when::<i32>(|_| hits.push("i32"))
            .when::<f64>(|x| {
                assert_eq!(*x, 2.5);
                hits.push("f64")
            })
            .when::<f64>(|_| hits.push("again"))
            .otherwise(|| hits.push("otherwise"));
        assert_eq!(hits, ["f64"]);

        let mut fell_through = false;
        Variant::empty()
            .when::<i32>(|_| unreachable!())
            .otherwise(|| fell_through = true);
        assert!(fell_through);
    }

    #[test]
    fn into_inner_returns_mismatch() {
        let v = Variant::new(3u16);
        let v = v.into_inner::<u32>().unwrap_err();
        assert_eq!(v.into_inner::<u16>().ok(), Some(3));
    }

    #[test]
    #[should_panic(expected = "variant holds i32, not f32")]
    fn expect_mismatch_panics() {
        Variant::new(1i32).expect::<f32>();
    }

    #[test]
    fn serializes_with_type_name() {
        let registry = TypeRegistry::with_builtins();
        let v = Variant::new(vec![1.5f32]);

        let mut doc = Document::new();
        v.serialize(doc.root_mut());
        assert_eq!(doc.root().get("type").as_str(), Some("Vec<f32>"));

        // Vec<f32> was never registered
        let mut back = Variant::new(0i32);
        back.deserialize(doc.root(), &registry);
        assert!(back.is_empty());

        let mut doc = Document::new();
        Variant::new(9u8).serialize(doc.root_mut());
        back.deserialize(doc.root(), &registry);
        assert_eq!(back.get::<u8>(), Some(9));
    }
}
