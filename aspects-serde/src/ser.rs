use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use aspects::{NodeKind, NodeRef};

/// Serializes a document node with any serde serializer. Empty nodes become
/// unit, which most formats write as `null`.
#[derive(Clone, Copy)]
pub struct Tree<'a>(pub NodeRef<'a>);

impl Serialize for Tree<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let node = self.0;
        match node.kind() {
            NodeKind::Empty => serializer.serialize_unit(),
            NodeKind::Integer => serializer.serialize_i64(node.as_int().unwrap_or_default()),
            NodeKind::Float => serializer.serialize_f64(node.as_float().unwrap_or_default()),
            NodeKind::String => serializer.serialize_str(node.as_str().unwrap_or_default()),
            NodeKind::Array => {
                let mut seq = serializer.serialize_seq(Some(node.len()))?;
                for item in node.items() {
                    seq.serialize_element(&Tree(item))?;
                }
                seq.end()
            }
            NodeKind::Map => {
                let mut map = serializer.serialize_map(Some(node.len()))?;
                for (key, value) in node.entries() {
                    map.serialize_entry(key, &Tree(value))?;
                }
                map.end()
            }
        }
    }
}
