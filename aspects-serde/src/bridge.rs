use std::any::type_name;
use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

use log::warn;
use serde::de::value::Error as ValueError;
use serde::de::{DeserializeOwned, DeserializeSeed};
use serde::Serialize;

use aspects::{Describe, Document, NodeMut, NodeRef, TypeRegistry};

use crate::de::{Node, NodeSeed};

/// Converts any serializable value into a document.
pub fn to_document<T: Serialize + ?Sized>(value: &T) -> Result<Document, serde_json::Error> {
    let mut document = Document::new();
    write_node(value, document.root_mut())?;
    Ok(document)
}

/// Replaces the content of `node` with `value`.
pub fn write_node<T: Serialize + ?Sized>(value: &T, node: NodeMut<'_>) -> Result<(), serde_json::Error> {
    let value = serde_json::to_value(value)?;
    NodeSeed(node).deserialize(value)
}

/// Reads a value back out of a document node.
pub fn from_node<T: DeserializeOwned>(node: NodeRef<'_>) -> Result<T, ValueError> {
    T::deserialize(Node(node))
}

/// Lets a serde type be used wherever a [`Describe`] value is expected, for
/// example as a reflected attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Serde<T>(pub T);

impl<T> Deref for Serde<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Serde<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> Describe for Serde<T>
where
    T: Serialize + DeserializeOwned + Clone + Default + 'static,
{
    fn type_name() -> Cow<'static, str> {
        Cow::Owned(format!("Serde<{}>", type_name::<T>()))
    }

    fn serialize(&self, mut node: NodeMut<'_>) {
        if let Err(err) = write_node(&self.0, node.reborrow()) {
            warn!("{}: {err}", Self::type_name());
            node.set_empty();
        }
    }

    fn deserialize(&mut self, node: NodeRef<'_>, _: &TypeRegistry) {
        match from_node(node) {
            Ok(value) => self.0 = value,
            Err(err) => warn!("{}: {err}", Self::type_name()),
        }
    }
}
