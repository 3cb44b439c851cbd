//! Class descriptors for reflected object types.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;

use log::warn;

use crate::attribute::{Accessor, Attribute, AttributeError, FieldAccess, PropertyAccess};
use crate::document::{NodeMut, NodeRef};
use crate::object::Object;
use crate::registry::TypeRegistry;
use crate::slot::{Slot, SlotFn};
use crate::types::Describe;
use crate::variant::Variant;

/// An object class whose layout is described once, at registration.
///
/// Usually derived:
///
/// ```
/// use aspects::{Object, Reflect};
///
/// #[derive(Default, Reflect)]
/// #[reflect(slots(heal))]
/// struct Health {
///     /// Current hit points.
///     hp: i32,
/// }
///
/// impl Health {
///     fn heal(&mut self, amount: i32) {
///         self.hp += amount;
///     }
/// }
///
/// impl Object for Health {}
/// ```
pub trait Reflect: Object + Default {
    fn build(class: &mut ClassBuilder<Self>);
}

/// Common view of classes and composites.
pub trait StructuredType {
    fn name(&self) -> &str;

    /// Size of the object in bytes, including every aspect for composites.
    fn size(&self) -> usize;

    fn super_class(&self) -> Option<&'static ClassType>;

    /// Whether objects of this type are, or derive from, `class`.
    fn is_a(&self, class: &ClassType) -> bool;

    fn wants_update(&self) -> bool;
}

pub(crate) trait Projection {
    fn project<'a>(&self, object: &'a dyn Any) -> Option<&'a dyn Any>;

    fn project_mut<'a>(&self, object: &'a mut dyn Any) -> Option<&'a mut dyn Any>;
}

struct Embedded<T, U> {
    get: fn(&T) -> &U,
    get_mut: fn(&mut T) -> &mut U,
}

impl<T: 'static, U: 'static> Projection for Embedded<T, U> {
    fn project<'a>(&self, object: &'a dyn Any) -> Option<&'a dyn Any> {
        let object = object.downcast_ref::<T>()?;
        Some((self.get)(object))
    }

    fn project_mut<'a>(&self, object: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        let object = object.downcast_mut::<T>()?;
        Some((self.get_mut)(object))
    }
}

pub(crate) struct PendingSuper {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
    projection: Box<dyn Projection>,
}

struct SuperClass {
    class: &'static ClassType,
    projection: Box<dyn Projection>,
}

/// Collects the members of class `T` for [`Reflect::build`].
pub struct ClassBuilder<T> {
    name: String,
    description: String,
    super_class: Option<PendingSuper>,
    attributes: Vec<Attribute>,
    slots: Vec<Slot>,
    wants_update: bool,
    _marker: PhantomData<fn() -> T>,
}

fn short_name<T>() -> &'static str {
    let full = type_name::<T>();
    let path = full.split('<').next().unwrap_or(full);
    path.rsplit("::").next().unwrap_or(path)
}

fn construct<T: Reflect>() -> Box<dyn Object> {
    Box::new(T::default())
}

impl<T: Reflect> ClassBuilder<T> {
    pub(crate) fn new() -> Self {
        ClassBuilder {
            name: short_name::<T>().to_owned(),
            description: String::new(),
            super_class: None,
            attributes: Vec::new(),
            slots: Vec::new(),
            wants_update: false,
            _marker: PhantomData,
        }
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.description = description.into();
        self
    }

    /// Declares `U` as the super class, stored inline in `T` and reached
    /// through the two projections.
    pub fn extends<U: Reflect>(&mut self, get: fn(&T) -> &U, get_mut: fn(&mut T) -> &mut U) -> &mut Self {
        self.super_class = Some(PendingSuper {
            id: TypeId::of::<U>(),
            name: short_name::<U>(),
            projection: Box::new(Embedded { get, get_mut }),
        });
        self
    }

    fn attribute<F: Describe>(&mut self, name: &str, access: Box<dyn Accessor>) -> &mut Self {
        if self.attributes.iter().any(|attribute| attribute.name() == name) {
            warn!("class `{}` declares attribute `{name}` twice", self.name);
        }
        self.attributes
            .push(Attribute::new(name.to_owned(), String::new(), F::TYPE, access));
        self
    }

    /// An attribute projecting straight onto a field.
    pub fn field<F: Describe>(&mut self, name: &str, get: fn(&T) -> &F, get_mut: fn(&mut T) -> &mut F) -> &mut Self {
        self.attribute::<F>(name, Box::new(FieldAccess { get, get_mut }))
    }

    /// An attribute backed by a getter and a setter.
    pub fn property<F: Describe>(&mut self, name: &str, get: fn(&T) -> F, set: fn(&mut T, F)) -> &mut Self {
        let access = PropertyAccess {
            get: Some(get),
            set: Some(set),
        };
        self.attribute::<F>(name, Box::new(access))
    }

    pub fn read_only<F: Describe>(&mut self, name: &str, get: fn(&T) -> F) -> &mut Self {
        let access = PropertyAccess::<T, F> {
            get: Some(get),
            set: None,
        };
        self.attribute::<F>(name, Box::new(access))
    }

    pub fn write_only<F: Describe>(&mut self, name: &str, set: fn(&mut T, F)) -> &mut Self {
        let access = PropertyAccess::<T, F> {
            get: None,
            set: Some(set),
        };
        self.attribute::<F>(name, Box::new(access))
    }

    /// Documents the attribute declared last.
    pub fn doc(&mut self, text: impl Into<String>) -> &mut Self {
        match self.attributes.last_mut() {
            Some(attribute) => attribute.set_description(text.into()),
            None => warn!("class `{}` documents an attribute before declaring one", self.name),
        }
        self
    }

    pub fn slot<Args: 'static>(&mut self, name: &str, f: impl SlotFn<T, Args>) -> &mut Self {
        self.slots.push(Slot::new(name.to_owned(), f));
        self
    }

    /// Objects of this class get [`Object::update`] calls.
    pub fn wants_update(&mut self) -> &mut Self {
        self.wants_update = true;
        self
    }

    pub(crate) fn class_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn super_type(&self) -> Option<&PendingSuper> {
        self.super_class.as_ref()
    }

    pub(crate) fn finish(self, registry: &TypeRegistry) -> ClassType {
        let super_class = self.super_class.and_then(|pending| {
            registry
                .class_by_type_id(pending.id)
                .map(|class| SuperClass {
                    class,
                    projection: pending.projection,
                })
        });
        let wants_update = self.wants_update
            || super_class
                .as_ref()
                .is_some_and(|parent| parent.class.wants_update);
        ClassType {
            name: self.name,
            description: self.description,
            size: size_of::<T>(),
            align: align_of::<T>(),
            rust_type: TypeId::of::<T>(),
            super_class,
            attributes: self.attributes,
            slots: self.slots,
            wants_update,
            construct: construct::<T>,
        }
    }
}

pub struct ClassType {
    name: String,
    description: String,
    size: usize,
    align: usize,
    rust_type: TypeId,
    super_class: Option<SuperClass>,
    attributes: Vec<Attribute>,
    slots: Vec<Slot>,
    wants_update: bool,
    construct: fn() -> Box<dyn Object>,
}

impl ClassType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn align(&self) -> usize {
        self.align
    }

    pub fn rust_type(&self) -> TypeId {
        self.rust_type
    }

    /// Attributes declared by this class itself.
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// This class followed by its super classes.
    pub fn ancestry(&self) -> impl Iterator<Item = &ClassType> {
        std::iter::successors(Some(self), |class| {
            class.super_class.as_ref().map(|parent| parent.class)
        })
    }

    /// A default-constructed instance.
    pub fn construct(&self) -> Box<dyn Object> {
        (self.construct)()
    }

    /// Views an instance of this class as its ancestor `target`.
    pub fn upcast<'a>(&self, object: &'a dyn Any, target: &ClassType) -> Option<&'a dyn Any> {
        if self.rust_type == target.rust_type {
            return Some(object);
        }
        let parent = self.super_class.as_ref()?;
        let inner = parent.projection.project(object)?;
        parent.class.upcast(inner, target)
    }

    pub fn upcast_mut<'a>(&self, object: &'a mut dyn Any, target: &ClassType) -> Option<&'a mut dyn Any> {
        if self.rust_type == target.rust_type {
            return Some(object);
        }
        let parent = self.super_class.as_ref()?;
        let inner = parent.projection.project_mut(object)?;
        parent.class.upcast_mut(inner, target)
    }

    /// The attribute called `name` and the class declaring it, searching
    /// the most derived class first.
    pub fn find_attribute(&self, name: &str) -> Option<(&ClassType, &Attribute)> {
        self.ancestry().find_map(|class| {
            class
                .attributes
                .iter()
                .find(|attribute| attribute.name() == name)
                .map(|attribute| (class, attribute))
        })
    }

    pub fn find_slot(&self, name: &str) -> Option<(&ClassType, &Slot)> {
        self.ancestry().find_map(|class| {
            class
                .slots
                .iter()
                .find(|slot| slot.name() == name)
                .map(|slot| (class, slot))
        })
    }

    /// Every attribute, super classes first.
    pub fn all_attributes(&self) -> Vec<(&ClassType, &Attribute)> {
        let mut chain: Vec<_> = self.ancestry().collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|class| class.attributes.iter().map(move |attribute| (class, attribute)))
            .collect()
    }

    pub fn get_attribute(&self, object: &dyn Any, name: &str) -> Result<Variant, AttributeError> {
        let (owner, attribute) = self
            .find_attribute(name)
            .ok_or_else(|| AttributeError::Missing(name.to_owned()))?;
        let receiver = self.upcast(object, owner).ok_or_else(|| AttributeError::Receiver {
            name: name.to_owned(),
        })?;
        attribute.get(receiver)
    }

    pub fn set_attribute(&self, object: &mut dyn Any, name: &str, value: &Variant) -> Result<(), AttributeError> {
        let (owner, attribute) = self
            .find_attribute(name)
            .ok_or_else(|| AttributeError::Missing(name.to_owned()))?;
        let receiver = self
            .upcast_mut(object, owner)
            .ok_or_else(|| AttributeError::Receiver {
                name: name.to_owned(),
            })?;
        attribute.set(receiver, value)
    }

    /// Calls the slot `name`. Failures are logged and reported as `false`.
    pub fn invoke(&self, object: &mut dyn Any, name: &str, args: &[Variant]) -> bool {
        let Some((owner, slot)) = self.find_slot(name) else {
            warn!("class `{}` has no slot `{name}`", self.name);
            return false;
        };
        match self.upcast_mut(object, owner) {
            Some(receiver) => slot.invoke(receiver, args),
            None => {
                warn!("slot `{name}` called on an object that is not a `{}`", self.name);
                false
            }
        }
    }

    /// Writes every readable attribute of `object` into `node`.
    pub fn serialize(&self, object: &dyn Any, node: &mut NodeMut<'_>) {
        node.make_map();
        for (owner, attribute) in self.all_attributes() {
            if !attribute.is_readable() {
                continue;
            }
            let result = match self.upcast(object, owner) {
                Some(receiver) => attribute.serialize(receiver, node),
                None => Err(AttributeError::Receiver {
                    name: attribute.name().to_owned(),
                }),
            };
            if let Err(err) = result {
                warn!("{}: {err}", self.name);
            }
        }
    }

    /// Reads every writable attribute present in `node`.
    pub fn deserialize(&self, object: &mut dyn Any, node: NodeRef<'_>, registry: &TypeRegistry) {
        if !node.expect_map(&self.name) {
            return;
        }
        for (owner, attribute) in self.all_attributes() {
            if !attribute.is_writable() {
                continue;
            }
            let result = match self.upcast_mut(object, owner) {
                Some(receiver) => attribute.deserialize(receiver, node, registry),
                None => Err(AttributeError::Receiver {
                    name: attribute.name().to_owned(),
                }),
            };
            if let Err(err) = result {
                warn!("{}: {err}", self.name);
            }
        }
    }
}

impl StructuredType for ClassType {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.size
    }

    fn super_class(&self) -> Option<&'static ClassType> {
        self.super_class.as_ref().map(|parent| parent.class)
    }

    fn is_a(&self, class: &ClassType) -> bool {
        self.ancestry().any(|ancestor| ancestor.rust_type == class.rust_type)
    }

    fn wants_update(&self) -> bool {
        self.wants_update
    }
}

impl PartialEq for ClassType {
    fn eq(&self, other: &Self) -> bool {
        self.rust_type == other.rust_type
    }
}

impl fmt::Debug for ClassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassType")
            .field("name", &self.name)
            .field("super", &self.super_class.as_ref().map(|parent| parent.class.name()))
            .field("attributes", &self.attributes)
            .field("slots", &self.slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;

    #[derive(Default, Debug, PartialEq)]
    struct Shape {
        sides: u32,
        color: String,
    }
    impl Object for Shape {}

    impl Reflect for Shape {
        fn build(class: &mut ClassBuilder<Self>) {
            class
                .description("a polygon")
                .field("sides", |s| &s.sides, |s| &mut s.sides)
                .doc("number of edges")
                .field("color", |s| &s.color, |s| &mut s.color)
                .slot("grow", |s: &mut Shape, by: u32| s.sides += by);
        }
    }

    #[derive(Default, Debug, PartialEq)]
    struct Square {
        shape: Shape,
        side: f32,
    }
    impl Object for Square {}

    impl Reflect for Square {
        fn build(class: &mut ClassBuilder<Self>) {
            class
                .extends(|s| &s.shape, |s| &mut s.shape)
                .field("side", |s| &s.side, |s| &mut s.side)
                .read_only("area", |s| s.side * s.side)
                .wants_update();
        }
    }

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_class::<Shape>().unwrap();
        registry.register_class::<Square>().unwrap();
        registry
    }

    #[test]
    fn builder_collects_members() {
        let registry = registry();
        let shape = registry.class_of::<Shape>().unwrap();
        assert_eq!(shape.name(), "Shape");
        assert_eq!(shape.description(), "a polygon");
        assert_eq!(shape.attributes()[0].description(), "number of edges");
        assert_eq!(shape.slots()[0].name(), "grow");
        assert!(!shape.wants_update());
    }

    #[test]
    fn super_chain() {
        let registry = registry();
        let shape = registry.class_of::<Shape>().unwrap();
        let square = registry.class_of::<Square>().unwrap();

        assert!(square.is_a(shape));
        assert!(!shape.is_a(square));
        assert_eq!(square.super_class(), Some(shape));

        let names: Vec<_> = square
            .all_attributes()
            .into_iter()
            .map(|(_, attribute)| attribute.name())
            .collect();
        assert_eq!(names, ["sides", "color", "side", "area"]);
    }

    #[test]
    fn members_reach_through_super() {
        let registry = registry();
        let square = registry.class_of::<Square>().unwrap();
        let mut object = Square::default();

        square
            .set_attribute(&mut object, "sides", &Variant::new(4u32))
            .unwrap();
        assert_eq!(object.shape.sides, 4);
        assert!(square.invoke(&mut object, "grow", &[Variant::new(1u32)]));
        assert_eq!(object.shape.sides, 5);

        object.side = 3.0;
        let area = square.get_attribute(&object, "area").unwrap();
        assert_eq!(area.get::<f32>(), Some(9.0));
        assert_eq!(
            square.set_attribute(&mut object, "area", &Variant::new(1.0f32)),
            Err(AttributeError::ReadOnly("area".into()))
        );
        assert_eq!(
            square.get_attribute(&object, "mass").unwrap_err(),
            AttributeError::Missing("mass".into())
        );
    }

    #[test]
    fn serialize_round_trip() {
        let registry = registry();
        let square = registry.class_of::<Square>().unwrap();
        let object = Square {
            shape: Shape {
                sides: 4,
                color: "red".into(),
            },
            side: 2.0,
        };

        let mut doc = Document::new();
        square.serialize(&object, &mut doc.root_mut());
        assert_eq!(doc.root().get("area").read::<f32>(), Some(4.0));
        assert_eq!(doc.root().get("color").as_str(), Some("red"));

        let mut back = Square::default();
        square.deserialize(&mut back, doc.root(), &registry);
        assert_eq!(back, object);
    }

    #[test]
    fn update_flag() {
        let registry = registry();
        assert!(registry.class_of::<Square>().unwrap().wants_update());
    }
}
