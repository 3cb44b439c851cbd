//! Name-indexed catalogue of value types and object classes.

use std::any::TypeId;
use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::class::{ClassBuilder, ClassType, Reflect};
use crate::object::ObjectRef;
use crate::types::{Describe, Type};
use crate::variant::Variant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("`{0}` is already registered")]
    AlreadyRegistered(String),
    #[error("`{name}` is already taken by another type")]
    NameConflict { name: String },
    #[error("class `{class}` extends `{parent}`, which is not registered")]
    MissingSuper { class: String, parent: String },
}

/// Every value type and class known to a program.
///
/// The registry is filled during start-up and only read afterwards; the
/// universe and the codecs borrow it.
#[derive(Default)]
pub struct TypeRegistry {
    types: IndexMap<String, Type>,
    by_id: HashMap<TypeId, Type>,
    classes: IndexMap<String, &'static ClassType>,
    class_by_id: HashMap<TypeId, &'static ClassType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that already knows the primitives, `String`, [`Variant`]
    /// and [`ObjectRef`].
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.ensure::<bool>();
        registry.ensure::<i8>();
        registry.ensure::<i16>();
        registry.ensure::<i32>();
        registry.ensure::<i64>();
        registry.ensure::<u8>();
        registry.ensure::<u16>();
        registry.ensure::<u32>();
        registry.ensure::<u64>();
        registry.ensure::<f32>();
        registry.ensure::<f64>();
        registry.ensure::<String>();
        registry.ensure::<Variant>();
        registry.ensure::<ObjectRef>();
        registry
    }

    /// Registers a value type. Registering a type twice is an error.
    pub fn register<T: Describe>(&mut self) -> Result<Type, RegistryError> {
        self.insert_type(T::TYPE)
    }

    /// Registers a value type unless it is already known.
    pub fn ensure<T: Describe>(&mut self) -> Type {
        self.ensure_type(T::TYPE)
    }

    pub fn ensure_type(&mut self, ty: Type) -> Type {
        match self.by_id.get(&ty.id()) {
            Some(known) => known,
            None => {
                let name = ty.name().into_owned();
                self.types.entry(name).or_insert(ty);
                self.by_id.insert(ty.id(), ty);
                ty
            }
        }
    }

    fn insert_type(&mut self, ty: Type) -> Result<Type, RegistryError> {
        let name = ty.name().into_owned();
        if self.by_id.contains_key(&ty.id()) {
            return Err(RegistryError::AlreadyRegistered(name));
        }
        if self.types.contains_key(&name) {
            return Err(RegistryError::NameConflict { name });
        }
        debug!("registered type `{name}`");
        self.types.insert(name, ty);
        self.by_id.insert(ty.id(), ty);
        Ok(ty)
    }

    /// Builds and registers the class of `T`. The class it extends, if any,
    /// must be registered first. Attribute and slot argument types are
    /// registered along the way.
    pub fn register_class<T: Reflect>(&mut self) -> Result<&'static ClassType, RegistryError> {
        let id = TypeId::of::<T>();
        let mut builder = ClassBuilder::<T>::new();
        T::build(&mut builder);

        if self.class_by_id.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(builder.class_name().to_owned()));
        }
        if self.classes.contains_key(builder.class_name()) {
            return Err(RegistryError::NameConflict {
                name: builder.class_name().to_owned(),
            });
        }
        if let Some(parent) = builder.super_type() {
            if !self.class_by_id.contains_key(&parent.id) {
                return Err(RegistryError::MissingSuper {
                    class: builder.class_name().to_owned(),
                    parent: parent.name.to_owned(),
                });
            }
        }

        let class = builder.finish(self);
        for attribute in class.attributes() {
            self.ensure_type(attribute.value_type());
        }
        for slot in class.slots() {
            for &argument in slot.signature() {
                self.ensure_type(argument);
            }
        }

        let class: &'static ClassType = Box::leak(Box::new(class));
        debug!(
            "registered class `{}` ({} attributes, {} slots)",
            class.name(),
            class.attributes().len(),
            class.slots().len()
        );
        self.classes.insert(class.name().to_owned(), class);
        self.class_by_id.insert(id, class);
        Ok(class)
    }

    pub fn type_named(&self, name: &str) -> Option<Type> {
        self.types.get(name).copied()
    }

    pub fn type_of_id(&self, id: TypeId) -> Option<Type> {
        self.by_id.get(&id).copied()
    }

    pub fn class_named(&self, name: &str) -> Option<&'static ClassType> {
        self.classes.get(name).copied()
    }

    pub fn class_of<T: 'static>(&self) -> Option<&'static ClassType> {
        self.class_by_id.get(&TypeId::of::<T>()).copied()
    }

    pub(crate) fn class_by_type_id(&self, id: TypeId) -> Option<&'static ClassType> {
        self.class_by_id.get(&id).copied()
    }

    /// Value types in registration order.
    pub fn types(&self) -> impl Iterator<Item = Type> + '_ {
        self.types.values().copied()
    }

    /// Classes in registration order.
    pub fn classes(&self) -> impl Iterator<Item = &'static ClassType> + '_ {
        self.classes.values().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Object, type_of};

    #[derive(Clone, Default, Debug, PartialEq, crate::Describe)]
    struct Point {
        x: f32,
        y: f32,
    }

    #[derive(Default, crate::Reflect)]
    struct Base {
        hp: i32,
    }
    impl Object for Base {}

    #[derive(Default, crate::Reflect)]
    struct Derived {
        #[reflect(extends)]
        base: Base,
        at: Point,
    }
    impl Object for Derived {}

    #[test]
    fn builtins_are_known() {
        let registry = TypeRegistry::with_builtins();
        assert_eq!(registry.type_named("i32"), Some(type_of::<i32>()));
        assert_eq!(registry.type_named("Variant"), Some(type_of::<Variant>()));
        assert!(registry.type_named("Point").is_none());
    }

    #[test]
    fn double_registration_is_rejected() {
        let mut registry = TypeRegistry::new();
        assert!(registry.register::<Point>().is_ok());
        assert_eq!(
            registry.register::<Point>(),
            Err(RegistryError::AlreadyRegistered("Point".into()))
        );
        assert_eq!(registry.ensure::<Point>(), type_of::<Point>());
    }

    #[test]
    fn classes_need_their_super() {
        let mut registry = TypeRegistry::with_builtins();
        assert!(matches!(
            registry.register_class::<Derived>(),
            Err(RegistryError::MissingSuper { .. })
        ));

        registry.register_class::<Base>().unwrap();
        let derived = registry.register_class::<Derived>().unwrap();
        assert_eq!(derived.name(), "Derived");
        assert!(registry.class_of::<Derived>().is_some());
        assert!(registry.register_class::<Base>().is_err());

        // field types come along
        assert_eq!(registry.type_named("Point"), Some(type_of::<Point>()));
        let names: Vec<_> = registry.classes().map(|c| c.name()).collect();
        assert_eq!(names, ["Base", "Derived"]);
    }
}
