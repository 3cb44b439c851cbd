use std::fmt::Formatter;

use serde::de::value::{self, MapAccessDeserializer, MapDeserializer, SeqDeserializer};
use serde::de::{DeserializeSeed, Deserializer, Error, IntoDeserializer, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, forward_to_deserialize_any};

use aspects::{Document, NodeKind, NodeMut, NodeRef};

/// A document deserialized from any self-describing format.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree(pub Document);

impl<'de> Deserialize<'de> for Tree {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        let mut document = Document::new();
        NodeSeed(document.root_mut()).deserialize(de)?;
        Ok(Tree(document))
    }
}

/// Deserializes a value into an existing node.
pub struct NodeSeed<'a>(pub NodeMut<'a>);

impl<'de> DeserializeSeed<'de> for NodeSeed<'_> {
    type Value = ();

    fn deserialize<D: Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        de.deserialize_any(Visit(self.0))
    }
}

struct Visit<'a>(NodeMut<'a>);

impl<'de> Visitor<'de> for Visit<'_> {
    type Value = ();

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a document node")
    }

    fn visit_bool<E: Error>(mut self, value: bool) -> Result<(), E> {
        self.0.write(value);
        Ok(())
    }

    fn visit_i64<E: Error>(mut self, value: i64) -> Result<(), E> {
        self.0.set_int(value);
        Ok(())
    }

    fn visit_u64<E: Error>(mut self, value: u64) -> Result<(), E> {
        self.0.write(value);
        Ok(())
    }

    fn visit_f64<E: Error>(mut self, value: f64) -> Result<(), E> {
        self.0.set_float(value);
        Ok(())
    }

    fn visit_str<E: Error>(mut self, value: &str) -> Result<(), E> {
        self.0.set_str(value);
        Ok(())
    }

    fn visit_string<E: Error>(mut self, value: String) -> Result<(), E> {
        self.0.set_str(value);
        Ok(())
    }

    fn visit_unit<E: Error>(mut self) -> Result<(), E> {
        self.0.set_empty();
        Ok(())
    }

    fn visit_none<E: Error>(self) -> Result<(), E> {
        self.visit_unit()
    }

    fn visit_some<D: Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        NodeSeed(self.0).deserialize(de)
    }

    fn visit_newtype_struct<D: Deserializer<'de>>(self, de: D) -> Result<(), D::Error> {
        NodeSeed(self.0).deserialize(de)
    }

    fn visit_seq<A: SeqAccess<'de>>(mut self, mut seq: A) -> Result<(), A::Error> {
        self.0.make_array().clear();
        loop {
            let slot = self.0.document().make();
            let node = self.0.document().node_mut(slot);
            if seq.next_element_seed(NodeSeed(node))?.is_none() {
                self.0.document().unmake(slot);
                break;
            }
            self.0.link_child(slot);
        }
        Ok(())
    }

    fn visit_map<A: MapAccess<'de>>(mut self, mut map: A) -> Result<(), A::Error> {
        self.0.make_map().clear();
        while let Some(key) = map.next_key::<String>()? {
            map.next_value_seed(NodeSeed(self.0.entry(&key)))?;
        }
        Ok(())
    }
}

/// Reads a document node as a serde data source.
///
/// Unlike going through [`ser::Tree`](crate::ser::Tree), this knows how the
/// document stores scalars: integers `0`/`1` read as booleans and `u64`
/// values kept as decimal strings read back as numbers.
#[derive(Clone, Copy)]
pub struct Node<'a>(pub NodeRef<'a>);

impl<'de> Deserializer<'de> for Node<'de> {
    type Error = value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, value::Error> {
        let node = self.0;
        match node.kind() {
            NodeKind::Empty => visitor.visit_unit(),
            NodeKind::Integer => visitor.visit_i64(node.as_int().unwrap_or_default()),
            NodeKind::Float => visitor.visit_f64(node.as_float().unwrap_or_default()),
            NodeKind::String => visitor.visit_borrowed_str(node.as_str().unwrap_or_default()),
            NodeKind::Array => {
                let mut seq = SeqDeserializer::new(node.items().map(Node));
                let value = visitor.visit_seq(&mut seq)?;
                seq.end()?;
                Ok(value)
            }
            NodeKind::Map => {
                let mut map = MapDeserializer::new(node.entries().map(|(key, value)| (key, Node(value))));
                let value = visitor.visit_map(&mut map)?;
                map.end()?;
                Ok(value)
            }
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, value::Error> {
        match self.0.read::<bool>() {
            Some(flag) => visitor.visit_bool(flag),
            None => self.deserialize_any(visitor),
        }
    }

    fn deserialize_u64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, value::Error> {
        match self.0.read::<u64>() {
            Some(number) => visitor.visit_u64(number),
            None => self.deserialize_any(visitor),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, value::Error> {
        if self.0.is_empty() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _: &'static str,
        visitor: V,
    ) -> Result<V::Value, value::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, value::Error> {
        let node = self.0;
        match node.kind() {
            NodeKind::String => visitor.visit_enum(node.as_str().unwrap_or_default().into_deserializer()),
            NodeKind::Map if node.len() == 1 => {
                let map = MapDeserializer::new(node.entries().map(|(key, value)| (key, Node(value))));
                visitor.visit_enum(MapAccessDeserializer::new(map))
            }
            kind => Err(value::Error::custom(format_args!(
                "{name} expects a variant name or a single entry map, found {kind:?} node"
            ))),
        }
    }

    forward_to_deserialize_any! {
        i8 i16 i32 i64 i128 u8 u16 u32 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

impl<'de> IntoDeserializer<'de, value::Error> for Node<'de> {
    type Deserializer = Self;

    fn into_deserializer(self) -> Self {
        self
    }
}
