//! Named, typed members of a class.

use std::any::Any;
use std::fmt;

use log::trace;
use thiserror::Error;

use crate::document::{NodeMut, NodeRef};
use crate::registry::TypeRegistry;
use crate::types::{Describe, Type};
use crate::variant::Variant;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AttributeError {
    #[error("attribute `{0}` is read-only")]
    ReadOnly(String),
    #[error("attribute `{0}` cannot be read")]
    Opaque(String),
    #[error("attribute `{name}` holds {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },
    #[error("attribute `{name}` does not belong to the receiver's class")]
    Receiver { name: String },
    #[error("no attribute named `{0}`")]
    Missing(String),
    #[error("the object no longer exists")]
    Stale,
}

/// How an attribute reaches its value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessKind {
    /// Direct projection onto a struct field.
    Field,
    /// A getter and setter pair.
    Property,
    ReadOnly,
    WriteOnly,
}

impl AccessKind {
    pub fn is_readable(self) -> bool {
        self != AccessKind::WriteOnly
    }

    pub fn is_writable(self) -> bool {
        self != AccessKind::ReadOnly
    }
}

pub(crate) enum Denied {
    Receiver,
    Direction,
    Type(String),
}

pub(crate) trait Accessor {
    fn kind(&self) -> AccessKind;

    fn get(&self, receiver: &dyn Any) -> Result<Variant, Denied>;

    fn set(&self, receiver: &mut dyn Any, value: &Variant) -> Result<(), Denied>;

    fn serialize(&self, receiver: &dyn Any, node: NodeMut<'_>) -> Result<(), Denied>;

    fn deserialize(
        &self,
        receiver: &mut dyn Any,
        node: NodeRef<'_>,
        registry: &TypeRegistry,
    ) -> Result<(), Denied>;
}

fn receiver<T: 'static>(any: &dyn Any) -> Result<&T, Denied> {
    any.downcast_ref().ok_or(Denied::Receiver)
}

fn receiver_mut<T: 'static>(any: &mut dyn Any) -> Result<&mut T, Denied> {
    any.downcast_mut().ok_or(Denied::Receiver)
}

fn value<F: Describe>(value: &Variant) -> Result<&F, Denied> {
    value
        .get_ref::<F>()
        .ok_or_else(|| Denied::Type(value.type_name().into_owned()))
}

pub(crate) struct FieldAccess<T, F> {
    pub(crate) get: fn(&T) -> &F,
    pub(crate) get_mut: fn(&mut T) -> &mut F,
}

impl<T: 'static, F: Describe> Accessor for FieldAccess<T, F> {
    fn kind(&self) -> AccessKind {
        AccessKind::Field
    }

    fn get(&self, any: &dyn Any) -> Result<Variant, Denied> {
        Ok(Variant::new((self.get)(receiver(any)?).clone()))
    }

    fn set(&self, any: &mut dyn Any, new: &Variant) -> Result<(), Denied> {
        let new = value::<F>(new)?.clone();
        *(self.get_mut)(receiver_mut(any)?) = new;
        Ok(())
    }

    fn serialize(&self, any: &dyn Any, node: NodeMut<'_>) -> Result<(), Denied> {
        (self.get)(receiver(any)?).serialize(node);
        Ok(())
    }

    fn deserialize(
        &self,
        any: &mut dyn Any,
        node: NodeRef<'_>,
        registry: &TypeRegistry,
    ) -> Result<(), Denied> {
        (self.get_mut)(receiver_mut(any)?).deserialize(node, registry);
        Ok(())
    }
}

pub(crate) struct PropertyAccess<T, F> {
    pub(crate) get: Option<fn(&T) -> F>,
    pub(crate) set: Option<fn(&mut T, F)>,
}

impl<T: 'static, F: Describe> Accessor for PropertyAccess<T, F> {
    fn kind(&self) -> AccessKind {
        match (self.get.is_some(), self.set.is_some()) {
            (true, false) => AccessKind::ReadOnly,
            (false, true) => AccessKind::WriteOnly,
            _ => AccessKind::Property,
        }
    }

    fn get(&self, any: &dyn Any) -> Result<Variant, Denied> {
        let get = self.get.ok_or(Denied::Direction)?;
        Ok(Variant::new(get(receiver(any)?)))
    }

    fn set(&self, any: &mut dyn Any, new: &Variant) -> Result<(), Denied> {
        let set = self.set.ok_or(Denied::Direction)?;
        let new = value::<F>(new)?.clone();
        set(receiver_mut(any)?, new);
        Ok(())
    }

    fn serialize(&self, any: &dyn Any, node: NodeMut<'_>) -> Result<(), Denied> {
        let get = self.get.ok_or(Denied::Direction)?;
        get(receiver(any)?).serialize(node);
        Ok(())
    }

    fn deserialize(
        &self,
        any: &mut dyn Any,
        node: NodeRef<'_>,
        registry: &TypeRegistry,
    ) -> Result<(), Denied> {
        let set = self.set.ok_or(Denied::Direction)?;
        let this = receiver_mut::<T>(any)?;
        // start from the current value so partial nodes keep what they omit
        let mut current = match self.get {
            Some(get) => get(this),
            None => F::default(),
        };
        current.deserialize(node, registry);
        set(this, current);
        Ok(())
    }
}

pub struct Attribute {
    name: String,
    description: String,
    ty: Type,
    access: Box<dyn Accessor>,
}

impl Attribute {
    pub(crate) fn new(name: String, description: String, ty: Type, access: Box<dyn Accessor>) -> Self {
        Attribute {
            name,
            description,
            ty,
            access,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = description;
    }

    pub fn value_type(&self) -> Type {
        self.ty
    }

    pub fn kind(&self) -> AccessKind {
        self.access.kind()
    }

    pub fn is_readable(&self) -> bool {
        self.kind().is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.kind().is_writable()
    }

    fn error(&self, denied: Denied, reading: bool) -> AttributeError {
        match denied {
            Denied::Receiver => AttributeError::Receiver {
                name: self.name.clone(),
            },
            Denied::Direction if reading => AttributeError::Opaque(self.name.clone()),
            Denied::Direction => AttributeError::ReadOnly(self.name.clone()),
            Denied::Type(found) => AttributeError::TypeMismatch {
                name: self.name.clone(),
                expected: self.ty.name().into_owned(),
                found,
            },
        }
    }

    /// The current value of the attribute on `receiver`.
    pub fn get(&self, receiver: &dyn Any) -> Result<Variant, AttributeError> {
        self.access.get(receiver).map_err(|denied| self.error(denied, true))
    }

    pub fn set(&self, receiver: &mut dyn Any, value: &Variant) -> Result<(), AttributeError> {
        trace!("set `{}` to {value:?}", self.name);
        self.access
            .set(receiver, value)
            .map_err(|denied| self.error(denied, false))
    }

    /// Writes the value under `parent[name]`.
    pub fn serialize(&self, receiver: &dyn Any, parent: &mut NodeMut<'_>) -> Result<(), AttributeError> {
        trace!("serialize `{}`", self.name);
        self.access
            .serialize(receiver, parent.entry(&self.name))
            .map_err(|denied| self.error(denied, true))
    }

    /// Reads the value from `parent[name]`. A missing key leaves the value
    /// untouched.
    pub fn deserialize(
        &self,
        receiver: &mut dyn Any,
        parent: NodeRef<'_>,
        registry: &TypeRegistry,
    ) -> Result<(), AttributeError> {
        if !parent.contains_key(&self.name) {
            return Ok(());
        }
        trace!("deserialize `{}`", self.name);
        self.access
            .deserialize(receiver, parent.get(&self.name), registry)
            .map_err(|denied| self.error(denied, false))
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("type", &self.ty.name())
            .field("kind", &self.kind())
            .finish()
    }
}
