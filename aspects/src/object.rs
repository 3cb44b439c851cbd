//! Reflected object instances and the handles that address them.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::rc::Rc;

use log::warn;

use crate::class::{ClassType, StructuredType};
use crate::composite::{CompositeError, CompositeType};
use crate::document::{NodeMut, NodeRef};
use crate::registry::TypeRegistry;
use crate::types::Describe;
use crate::universe::Universe;

pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Behaviour shared by every reflected class.
pub trait Object: AsAny {
    /// Runs once every object of a freshly loaded universe exists and has been
    /// linked. `universe` lends out this object while the call runs, so
    /// looking `me` up from inside yields nothing.
    fn initialize(&mut self, universe: &Universe<'_>, me: ObjectHandle) {
        let _ = (universe, me);
    }

    /// Per-frame hook for classes that ask for updates.
    fn update(&mut self, dt: f64) {
        let _ = dt;
    }
}

/// A non-owning reference to an object living in a [`Universe`]. Handles go
/// stale when the universe is cleared.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.index, self.generation)
    }
}

/// The type of a live object: a single class or a frozen composite.
#[derive(Clone)]
pub enum ObjectType {
    Class(&'static ClassType),
    Composite(Rc<CompositeType>),
}

impl ObjectType {
    /// Wraps a composite, which must already be frozen.
    pub fn composite(composite: CompositeType) -> Result<Self, CompositeError> {
        if !composite.is_frozen() {
            return Err(CompositeError::NotFrozen);
        }
        Ok(ObjectType::Composite(Rc::new(composite)))
    }

    pub fn structured(&self) -> &dyn StructuredType {
        match self {
            ObjectType::Class(class) => *class,
            ObjectType::Composite(composite) => &**composite,
        }
    }

    /// The class whose instance is stored for the object itself: the class, or
    /// the composite's base.
    pub fn base_class(&self) -> &'static ClassType {
        match self {
            ObjectType::Class(class) => *class,
            ObjectType::Composite(composite) => composite.base(),
        }
    }

    pub fn as_composite(&self) -> Option<&Rc<CompositeType>> {
        match self {
            ObjectType::Composite(composite) => Some(composite),
            ObjectType::Class(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        self.structured().name()
    }

    pub fn size(&self) -> usize {
        self.structured().size()
    }

    pub fn is_a(&self, class: &ClassType) -> bool {
        self.structured().is_a(class)
    }

    pub(crate) fn is_frozen(&self) -> bool {
        match self {
            ObjectType::Class(_) => true,
            ObjectType::Composite(composite) => composite.is_frozen(),
        }
    }

    /// Identity used to cache synthesized composites.
    pub(crate) fn signature(&self) -> String {
        match self {
            ObjectType::Class(class) => class.name().to_owned(),
            ObjectType::Composite(composite) => composite.signature(),
        }
    }
}

impl From<&'static ClassType> for ObjectType {
    fn from(class: &'static ClassType) -> Self {
        ObjectType::Class(class)
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectType::Class(class) => write!(f, "Class({})", class.name()),
            ObjectType::Composite(composite) => write!(f, "Composite({})", composite.signature()),
        }
    }
}

/// Bookkeeping the universe keeps for every sub-object.
#[derive(Debug)]
pub struct ObjectHeader {
    pub(crate) ty: ObjectType,
    pub(crate) parent: Option<ObjectHandle>,
    pub(crate) aspect_index: usize,
    pub(crate) offset: usize,
    pub(crate) aspects: Vec<ObjectHandle>,
}

impl ObjectHeader {
    pub fn object_type(&self) -> &ObjectType {
        &self.ty
    }

    /// The composite this object is an aspect of.
    pub fn parent(&self) -> Option<ObjectHandle> {
        self.parent
    }

    pub fn aspect_index(&self) -> usize {
        self.aspect_index
    }

    /// Byte offset inside the enclosing composite's layout; 0 at top level.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn aspects(&self) -> &[ObjectHandle] {
        &self.aspects
    }
}

/// A field that names another object of the same universe. The id is what
/// gets serialized; the handle is filled in by [`Universe::link`].
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    id: String,
    target: Option<ObjectHandle>,
}

impl ObjectRef {
    pub fn new(id: impl Into<String>) -> Self {
        ObjectRef {
            id: id.into(),
            target: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> Option<ObjectHandle> {
        self.target
    }

    pub fn is_null(&self) -> bool {
        self.id.is_empty()
    }

    /// The linked handle if it is still live, otherwise a fresh lookup by id.
    pub fn resolve(&self, universe: &Universe<'_>) -> Option<ObjectHandle> {
        match self.target {
            Some(handle) if universe.contains(handle) => Some(handle),
            _ => universe.get_object(&self.id),
        }
    }

    pub(crate) fn bind(&mut self, target: Option<ObjectHandle>) {
        self.target = target;
    }
}

impl Describe for ObjectRef {
    fn type_name() -> Cow<'static, str> {
        Cow::Borrowed("ObjectRef")
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        if self.id.is_empty() {
            node.set_empty();
        } else {
            node.set_str(self.id.as_str());
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, _: &TypeRegistry) {
        if node.is_empty() {
            *self = ObjectRef::default();
            return;
        }
        match node.as_str() {
            Some(id) => *self = ObjectRef::new(id),
            None => warn!("object reference must be an id, found {:?} node", node.kind()),
        }
    }
}
