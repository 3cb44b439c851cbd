//! Runtime reflection for game objects.
//!
//! Value types describe themselves through [`Describe`], object classes are
//! built once through [`Reflect`] and registered in a [`TypeRegistry`]. Every
//! value travels through the [`Document`] tree on its way to and from bytes,
//! and objects live in a [`Universe`] where independently reflected classes
//! can be glued together as aspects of one [`CompositeType`].

extern crate self as aspects;

pub mod attribute;
pub mod class;
pub mod codec;
pub mod composite;
pub mod document;
pub mod object;
pub mod registry;
pub mod slot;
pub mod template;
pub mod types;
pub mod universe;
pub mod variant;

pub use aspects_derive::{Describe, Reflect};

#[doc(hidden)]
pub mod __private {
    pub use log::warn;
}

pub use attribute::{AccessKind, Attribute, AttributeError};
pub use class::{ClassBuilder, ClassType, Reflect, StructuredType};
pub use codec::{BinaryCodec, Codec, CodecError, JsonCodec, YamlCodec};
pub use composite::{CompositeError, CompositeType, ExposedAttribute, ExposedSlot};
pub use document::{Document, NodeId, NodeKind, NodeMut, NodeRef, Scalar};
pub use object::{AsAny, Object, ObjectHandle, ObjectHeader, ObjectRef, ObjectType};
pub use registry::{RegistryError, TypeRegistry};
pub use slot::{Slot, SlotError, SlotFn};
pub use template::{DirectoryTemplates, MemoryTemplates, NoTemplates, TemplateSource};
pub use types::{Describe, Type, TypeInfo, type_of};
pub use universe::{Universe, UniverseError};
pub use variant::{Match, Variant};
