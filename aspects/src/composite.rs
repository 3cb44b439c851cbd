//! Objects assembled from a base class and a list of aspects.

use std::fmt::{self, Write};

use thiserror::Error;

use crate::attribute::AttributeError;
use crate::class::{ClassType, StructuredType};
use crate::object::{ObjectHandle, ObjectType};
use crate::universe::Universe;
use crate::variant::Variant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositeError {
    #[error("composite is frozen")]
    Frozen,
    #[error("composite must be frozen before use")]
    NotFrozen,
    #[error("aspect index {index} out of range ({count} aspects)")]
    AspectIndex { index: usize, count: usize },
    #[error("aspect {aspect} has no member `{name}`")]
    UnknownMember { aspect: usize, name: String },
    #[error("`{0}` is already exposed")]
    DuplicateExposure(String),
}

/// An attribute of one aspect, visible on the composite under another name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExposedAttribute {
    aspect: usize,
    attribute: String,
    exposed: String,
}

impl ExposedAttribute {
    pub fn aspect(&self) -> usize {
        self.aspect
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn exposed(&self) -> &str {
        &self.exposed
    }

    fn target(&self, universe: &Universe<'_>, composite: ObjectHandle) -> Result<ObjectHandle, AttributeError> {
        let header = universe.header(composite).ok_or(AttributeError::Stale)?;
        assert!(
            header.object_type().as_composite().is_some(),
            "exposed attribute `{}` used on an object that is not a composite",
            self.exposed
        );
        header
            .aspects()
            .get(self.aspect)
            .copied()
            .ok_or(AttributeError::Stale)
    }

    pub fn get(&self, universe: &Universe<'_>, composite: ObjectHandle) -> Result<Variant, AttributeError> {
        let aspect = self.target(universe, composite)?;
        universe.get_attribute(aspect, &self.attribute)
    }

    pub fn set(&self, universe: &mut Universe<'_>, composite: ObjectHandle, value: &Variant) -> Result<(), AttributeError> {
        let aspect = self.target(universe, composite)?;
        universe.set_attribute(aspect, &self.attribute, value)
    }
}

/// A slot of one aspect, callable on the composite under another name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExposedSlot {
    aspect: usize,
    slot: String,
    exposed: String,
}

impl ExposedSlot {
    pub fn aspect(&self) -> usize {
        self.aspect
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn exposed(&self) -> &str {
        &self.exposed
    }

    pub fn invoke(&self, universe: &mut Universe<'_>, composite: ObjectHandle, args: &[Variant]) -> bool {
        let Some(header) = universe.header(composite) else {
            return false;
        };
        assert!(
            header.object_type().as_composite().is_some(),
            "exposed slot `{}` used on an object that is not a composite",
            self.exposed
        );
        match header.aspects().get(self.aspect).copied() {
            Some(aspect) => universe.invoke(aspect, &self.slot, args),
            None => false,
        }
    }
}

/// A base class extended by an ordered list of aspects.
///
/// Built incrementally and then frozen; only frozen composites can be
/// instantiated, and a frozen composite never changes again.
#[derive(Debug)]
pub struct CompositeType {
    name: String,
    base: &'static ClassType,
    aspects: Vec<ObjectType>,
    exposed_attributes: Vec<ExposedAttribute>,
    exposed_slots: Vec<ExposedSlot>,
    frozen: bool,
}

impl CompositeType {
    pub fn new(name: impl Into<String>, base: &'static ClassType) -> Self {
        CompositeType {
            name: name.into(),
            base,
            aspects: Vec::new(),
            exposed_attributes: Vec::new(),
            exposed_slots: Vec::new(),
            frozen: false,
        }
    }

    pub fn base(&self) -> &'static ClassType {
        self.base
    }

    pub fn aspects(&self) -> &[ObjectType] {
        &self.aspects
    }

    pub fn exposed_attributes(&self) -> &[ExposedAttribute] {
        &self.exposed_attributes
    }

    pub fn exposed_slots(&self) -> &[ExposedSlot] {
        &self.exposed_slots
    }

    /// Appends an aspect and returns its index.
    pub fn add_aspect(&mut self, aspect: impl Into<ObjectType>) -> Result<usize, CompositeError> {
        if self.frozen {
            return Err(CompositeError::Frozen);
        }
        let aspect = aspect.into();
        if !aspect.is_frozen() {
            return Err(CompositeError::NotFrozen);
        }
        self.aspects.push(aspect);
        Ok(self.aspects.len() - 1)
    }

    fn aspect(&self, index: usize) -> Result<&ObjectType, CompositeError> {
        self.aspects.get(index).ok_or(CompositeError::AspectIndex {
            index,
            count: self.aspects.len(),
        })
    }

    fn check_exposed_name(&self, exposed: &str) -> Result<(), CompositeError> {
        let taken = self
            .exposed_attributes
            .iter()
            .map(ExposedAttribute::exposed)
            .chain(self.exposed_slots.iter().map(ExposedSlot::exposed))
            .any(|name| name == exposed);
        if taken {
            return Err(CompositeError::DuplicateExposure(exposed.to_owned()));
        }
        Ok(())
    }

    /// Makes attribute `name` of aspect `aspect` reachable as `exposed`.
    pub fn expose_attribute(&mut self, aspect: usize, name: &str, exposed: &str) -> Result<(), CompositeError> {
        if self.frozen {
            return Err(CompositeError::Frozen);
        }
        if !has_attribute(self.aspect(aspect)?, name) {
            return Err(CompositeError::UnknownMember {
                aspect,
                name: name.to_owned(),
            });
        }
        self.check_exposed_name(exposed)?;
        self.exposed_attributes.push(ExposedAttribute {
            aspect,
            attribute: name.to_owned(),
            exposed: exposed.to_owned(),
        });
        Ok(())
    }

    pub fn expose_slot(&mut self, aspect: usize, name: &str, exposed: &str) -> Result<(), CompositeError> {
        if self.frozen {
            return Err(CompositeError::Frozen);
        }
        if !has_slot(self.aspect(aspect)?, name) {
            return Err(CompositeError::UnknownMember {
                aspect,
                name: name.to_owned(),
            });
        }
        self.check_exposed_name(exposed)?;
        self.exposed_slots.push(ExposedSlot {
            aspect,
            slot: name.to_owned(),
            exposed: exposed.to_owned(),
        });
        Ok(())
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Byte offset of aspect `index` inside the composite: the base comes
    /// first, then the aspects in order.
    pub fn aspect_offset(&self, index: usize) -> Option<usize> {
        if index >= self.aspects.len() {
            return None;
        }
        let before: usize = self.aspects[..index].iter().map(ObjectType::size).sum();
        Some(self.base.size() + before)
    }

    pub fn find_exposed_attribute(&self, exposed: &str) -> Option<&ExposedAttribute> {
        self.exposed_attributes
            .iter()
            .find(|attribute| attribute.exposed == exposed)
    }

    pub fn find_exposed_slot(&self, exposed: &str) -> Option<&ExposedSlot> {
        self.exposed_slots.iter().find(|slot| slot.exposed == exposed)
    }

    /// A key identifying the shape of this composite: base, aspects and
    /// exposures. Composites with equal signatures are interchangeable.
    pub fn signature(&self) -> String {
        let mut signature = self.base.name().to_owned();
        signature.push('[');
        for (i, aspect) in self.aspects.iter().enumerate() {
            if i > 0 {
                signature.push(',');
            }
            signature.push_str(&aspect.signature());
        }
        signature.push(']');
        for exposed in &self.exposed_attributes {
            let _ = write!(signature, ";{}.{}={}", exposed.aspect, exposed.attribute, exposed.exposed);
        }
        for exposed in &self.exposed_slots {
            let _ = write!(signature, ";{}.{}()={}", exposed.aspect, exposed.slot, exposed.exposed);
        }
        signature
    }
}

fn has_attribute(ty: &ObjectType, name: &str) -> bool {
    match ty {
        ObjectType::Class(class) => class.find_attribute(name).is_some(),
        ObjectType::Composite(composite) => {
            composite.base.find_attribute(name).is_some()
                || composite.find_exposed_attribute(name).is_some()
        }
    }
}

fn has_slot(ty: &ObjectType, name: &str) -> bool {
    match ty {
        ObjectType::Class(class) => class.find_slot(name).is_some(),
        ObjectType::Composite(composite) => {
            composite.base.find_slot(name).is_some() || composite.find_exposed_slot(name).is_some()
        }
    }
}

impl StructuredType for CompositeType {
    fn name(&self) -> &str {
        &self.name
    }

    fn size(&self) -> usize {
        self.base.size() + self.aspects.iter().map(ObjectType::size).sum::<usize>()
    }

    fn super_class(&self) -> Option<&'static ClassType> {
        Some(self.base)
    }

    fn is_a(&self, class: &ClassType) -> bool {
        self.base.is_a(class)
    }

    fn wants_update(&self) -> bool {
        self.base.wants_update()
    }
}

impl fmt::Display for CompositeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.signature())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TypeRegistry;
    use crate::{Object, Reflect};

    #[derive(Default, Reflect)]
    struct Body {
        mass: f64,
    }
    impl Object for Body {}

    #[derive(Default, Reflect)]
    #[reflect(slots(ping))]
    struct Radio {
        channel: u8,
        pings: u32,
    }
    impl Radio {
        fn ping(&mut self) {
            self.pings += 1;
        }
    }
    impl Object for Radio {}

    #[derive(Default, Reflect)]
    struct Light {
        on: bool,
        level: u16,
    }
    impl Object for Light {}

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_class::<Body>().unwrap();
        registry.register_class::<Radio>().unwrap();
        registry.register_class::<Light>().unwrap();
        registry
    }

    #[test]
    fn layout_is_base_then_aspects() {
        let registry = registry();
        let body = registry.class_of::<Body>().unwrap();
        let radio = registry.class_of::<Radio>().unwrap();
        let light = registry.class_of::<Light>().unwrap();

        let mut car = CompositeType::new("Car", body);
        assert_eq!(car.add_aspect(radio), Ok(0));
        assert_eq!(car.add_aspect(light), Ok(1));
        car.freeze();

        assert_eq!(car.size(), body.size() + radio.size() + light.size());
        assert_eq!(car.aspect_offset(0), Some(body.size()));
        assert_eq!(car.aspect_offset(1), Some(body.size() + radio.size()));
        assert_eq!(car.aspect_offset(2), None);
        assert!(car.is_a(body));
        assert!(!car.is_a(radio));
        assert_eq!(car.signature(), "Body[Radio,Light]");
    }

    #[test]
    fn frozen_composites_reject_changes() {
        let registry = registry();
        let body = registry.class_of::<Body>().unwrap();
        let radio = registry.class_of::<Radio>().unwrap();

        let mut car = CompositeType::new("Car", body);
        car.add_aspect(radio).unwrap();
        car.freeze();
        assert!(car.is_frozen());
        assert_eq!(car.add_aspect(radio), Err(CompositeError::Frozen));
        assert_eq!(
            car.expose_attribute(0, "channel", "channel"),
            Err(CompositeError::Frozen)
        );
        assert_eq!(car.expose_slot(0, "ping", "ping"), Err(CompositeError::Frozen));
    }

    #[test]
    fn nested_composites_must_be_frozen() {
        let registry = registry();
        let body = registry.class_of::<Body>().unwrap();
        let radio = registry.class_of::<Radio>().unwrap();

        let mut inner = CompositeType::new("Inner", radio);
        inner.add_aspect(registry.class_of::<Light>().unwrap()).unwrap();
        assert_eq!(
            ObjectType::composite(inner).unwrap_err(),
            CompositeError::NotFrozen
        );

        let mut inner = CompositeType::new("Inner", radio);
        inner.freeze();
        let inner = ObjectType::composite(inner).unwrap();
        let mut outer = CompositeType::new("Outer", body);
        outer.add_aspect(inner).unwrap();
        outer.freeze();
        assert_eq!(outer.signature(), "Body[Radio[]]");
    }

    #[test]
    fn exposures_are_validated() {
        let registry = registry();
        let body = registry.class_of::<Body>().unwrap();
        let radio = registry.class_of::<Radio>().unwrap();

        let mut car = CompositeType::new("Car", body);
        car.add_aspect(radio).unwrap();
        car.expose_attribute(0, "channel", "station").unwrap();
        car.expose_slot(0, "ping", "honk").unwrap();

        assert_eq!(
            car.expose_attribute(1, "channel", "x"),
            Err(CompositeError::AspectIndex { index: 1, count: 1 })
        );
        assert_eq!(
            car.expose_attribute(0, "volume", "x"),
            Err(CompositeError::UnknownMember {
                aspect: 0,
                name: "volume".into()
            })
        );
        assert_eq!(
            car.expose_slot(0, "ping", "station"),
            Err(CompositeError::DuplicateExposure("station".into()))
        );
        assert_eq!(car.find_exposed_attribute("station").unwrap().attribute(), "channel");
        assert_eq!(car.find_exposed_slot("honk").unwrap().slot(), "ping");
    }
}
