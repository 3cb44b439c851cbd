//! Compile-time type descriptors for value types.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::warn;

use crate::document::{NodeMut, NodeRef, Scalar};
use crate::registry::TypeRegistry;

/// A reference to the descriptor of a value type. Descriptors are constants,
/// so every `Type` is valid for the whole process.
pub type Type = &'static TypeInfo;

/// A value type that can be stored in a [`Variant`](crate::Variant), used as an
/// attribute or passed to a slot.
pub trait Describe: Clone + Default + 'static {
    const TYPE: Type = &TypeInfo::of::<Self>();

    fn type_name() -> Cow<'static, str>;

    fn serialize(&self, node: NodeMut<'_>);

    /// Reads `node` into `self`. A value that doesn't fit keeps `self` as it
    /// was and logs a warning.
    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry);
}

pub fn type_of<T: Describe>() -> Type {
    T::TYPE
}

/// How to construct, clone, serialize and deserialize one concrete type
/// without knowing it statically.
pub struct TypeInfo {
    name: fn() -> Cow<'static, str>,
    size: usize,
    align: usize,
    id: fn() -> TypeId,
    construct: fn() -> Box<dyn Any>,
    clone: fn(&dyn Any) -> Box<dyn Any>,
    serialize: fn(&dyn Any, NodeMut<'_>),
    deserialize: fn(&mut dyn Any, NodeRef<'_>, &TypeRegistry),
}

impl TypeInfo {
    pub const fn of<T: Describe>() -> Self {
        TypeInfo {
            name: T::type_name,
            size: size_of::<T>(),
            align: align_of::<T>(),
            id: TypeId::of::<T>,
            construct: construct::<T>,
            clone: clone::<T>,
            serialize: serialize::<T>,
            deserialize: deserialize::<T>,
        }
    }

    pub fn name(&self) -> Cow<'static, str> {
        (self.name)()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn id(&self) -> TypeId {
        (self.id)()
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.id() == TypeId::of::<T>()
    }

    /// A default-constructed value of this type.
    pub fn construct(&self) -> Box<dyn Any> {
        (self.construct)()
    }

    /// # Panics
    /// If `value` is not of this type.
    pub fn clone_value(&self, value: &dyn Any) -> Box<dyn Any> {
        (self.clone)(value)
    }

    /// # Panics
    /// If `value` is not of this type.
    pub fn serialize(&self, value: &dyn Any, node: NodeMut<'_>) {
        (self.serialize)(value, node)
    }

    /// # Panics
    /// If `value` is not of this type.
    pub fn deserialize(&self, value: &mut dyn Any, node: NodeRef<'_>, registry: &TypeRegistry) {
        (self.deserialize)(value, node, registry)
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for TypeInfo {}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name())
            .field("size", &self.size)
            .field("align", &self.align)
            .finish()
    }
}

fn downcast<T: 'static>(value: &dyn Any) -> &T {
    match value.downcast_ref::<T>() {
        Some(value) => value,
        None => panic!("descriptor mismatch: value is not {}", std::any::type_name::<T>()),
    }
}

fn downcast_mut<T: 'static>(value: &mut dyn Any) -> &mut T {
    match value.downcast_mut::<T>() {
        Some(value) => value,
        None => panic!("descriptor mismatch: value is not {}", std::any::type_name::<T>()),
    }
}

fn construct<T: Describe>() -> Box<dyn Any> {
    Box::new(T::default())
}

fn clone<T: Describe>(value: &dyn Any) -> Box<dyn Any> {
    Box::new(downcast::<T>(value).clone())
}

fn serialize<T: Describe>(value: &dyn Any, node: NodeMut<'_>) {
    downcast::<T>(value).serialize(node)
}

fn deserialize<T: Describe>(value: &mut dyn Any, node: NodeRef<'_>, registry: &TypeRegistry) {
    downcast_mut::<T>(value).deserialize(node, registry)
}

/// Shared body of the scalar impls: empty nodes leave the value alone,
/// anything unreadable is reported.
fn load_scalar<T: Describe + Scalar>(value: &mut T, node: NodeRef<'_>) {
    if node.is_empty() {
        return;
    }
    match node.read::<T>() {
        Some(read) => *value = read,
        None => warn!("expected {}, found {:?} node", T::type_name(), node.kind()),
    }
}

macro_rules! scalars {
    ($($t:ty),*) => {$(
        impl Describe for $t {
            fn type_name() -> Cow<'static, str> {
                Cow::Borrowed(stringify!($t))
            }

            fn serialize(&self, mut node: NodeMut<'_>) {
                node.write(self.clone());
            }

            fn deserialize(&mut self, node: NodeRef<'_>, _: &TypeRegistry) {
                load_scalar(self, node);
            }
        }
    )*};
}

scalars!(bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String);

impl<T: Describe> Describe for Vec<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Vec<{}>", T::type_name()))
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        node.make_array();
        for item in self {
            item.serialize(node.push());
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry) {
        if node.is_empty() {
            return;
        }
        if !node.expect_array(&Self::type_name()) {
            return;
        }
        self.clear();
        for child in node.items() {
            let mut item = T::default();
            item.deserialize(child, registry);
            self.push(item);
        }
    }
}

impl<T: Describe> Describe for Option<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Option<{}>", T::type_name()))
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        match self {
            Some(value) => value.serialize(node),
            None => node.set_empty(),
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry) {
        if node.is_empty() {
            *self = None;
            return;
        }
        self.get_or_insert_with(T::default).deserialize(node, registry);
    }
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Map<{}>", T::type_name()))
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        node.make_map();
        for (key, value) in self {
            value.serialize(node.entry(key));
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry) {
        if node.is_empty() {
            return;
        }
        if !node.expect_map(&Self::type_name()) {
            return;
        }
        self.clear();
        for (key, child) in node.entries() {
            let mut value = T::default();
            value.deserialize(child, registry);
            self.insert(key.to_owned(), value);
        }
    }
}

// Shared payloads serialize as their content; cloning shares the allocation.
impl<T: Describe> Describe for Arc<T> {
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Arc<{}>", T::type_name()))
    }

    fn serialize(&self, node: NodeMut<'_>) {
        T::serialize(&**self, node)
    }

    fn deserialize(&mut self, node: NodeRef<'_>, registry: &TypeRegistry) {
        Arc::make_mut(self).deserialize(node, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[test]
    fn descriptors_are_identified_by_type() {
        assert_eq!(type_of::<i32>(), type_of::<i32>());
        assert_ne!(type_of::<i32>(), type_of::<i64>());
        assert!(type_of::<String>().is::<String>());
        assert_eq!(type_of::<u16>().size(), 2);
        assert_eq!(type_of::<Vec<f32>>().name(), "Vec<f32>");
    }

    #[test]
    fn erased_round_trip() {
        let registry = TypeRegistry::with_builtins();
        let ty = type_of::<Vec<String>>();
        let value: Vec<String> = vec!["a".into(), "b".into()];

        let mut doc = Document::new();
        ty.serialize(&value, doc.root_mut());

        let mut back = ty.construct();
        ty.deserialize(back.as_mut(), doc.root(), &registry);
        assert_eq!(back.downcast_ref::<Vec<String>>(), Some(&value));

        let copy = ty.clone_value(back.as_ref());
        assert_eq!(copy.downcast_ref::<Vec<String>>(), Some(&value));
    }

    #[test]
    fn wide_unsigned_survives() {
        let registry = TypeRegistry::with_builtins();
        let mut doc = Document::new();
        u64::MAX.serialize(doc.root_mut());

        let mut back = 0u64;
        back.deserialize(doc.root(), &registry);
        assert_eq!(back, u64::MAX);
    }

    #[test]
    fn mismatched_node_keeps_value() {
        let registry = TypeRegistry::with_builtins();
        let mut doc = Document::new();
        doc.root_mut().set_str("not a number");

        let mut value = 7i32;
        value.deserialize(doc.root(), &registry);
        assert_eq!(value, 7);
    }

    #[test]
    fn option_and_map() {
        let registry = TypeRegistry::with_builtins();
        let mut doc = Document::new();

        let mut scores = BTreeMap::new();
        scores.insert("alice".to_owned(), Some(3i64));
        scores.insert("bob".to_owned(), None);
        scores.serialize(doc.root_mut());

        let mut back = BTreeMap::<String, Option<i64>>::new();
        back.deserialize(doc.root(), &registry);
        assert_eq!(back, scores);
    }

    #[test]
    #[should_panic(expected = "descriptor mismatch")]
    fn dispatch_mismatch_is_fatal() {
        let mut doc = Document::new();
        type_of::<i32>().serialize(&"oops", doc.root_mut());
    }
}
