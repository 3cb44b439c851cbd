//! The in-memory tree every codec reads from and writes to.
//!
//! A [`Document`] is an arena: nodes are addressed by [`NodeId`] and are only
//! released when the whole document is cleared or dropped. [`NodeRef`] is a
//! read-only cursor that never changes the tree, [`NodeMut`] a mutable cursor
//! whose indexing operations create whatever is missing.

mod dump;
mod scalar;

use std::fmt;

use indexmap::IndexMap;
use log::warn;

pub(crate) use dump::is_inline;
pub use scalar::Scalar;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Shared immutable node returned for lookups that miss.
const EMPTY: NodeId = NodeId(0);
const ROOT: NodeId = NodeId(1);

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Node {
    Empty,
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<NodeId>),
    Map(IndexMap<String, NodeId>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Empty,
    Integer,
    Float,
    String,
    Array,
    Map,
}

#[derive(Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node::Empty, Node::Empty],
        }
    }

    /// Drops every node. The root becomes empty again.
    pub fn clear(&mut self) {
        self.nodes.truncate(2);
        self.nodes[ROOT.index()] = Node::Empty;
    }

    /// Allocates a detached empty node. It becomes part of the tree once it is
    /// linked below the root with [`NodeMut::link_child`] or
    /// [`NodeMut::link_entry`].
    pub fn make(&mut self) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).unwrap_or_else(|_| {
            panic!("document arena exhausted at {} nodes", self.nodes.len())
        }));
        self.nodes.push(Node::Empty);
        id
    }

    /// Gives back the node returned by the latest [`make`](Self::make) if it
    /// is still the newest one. Returns whether it was released.
    pub fn unmake(&mut self, id: NodeId) -> bool {
        if id.index() < 2 || id.index() + 1 != self.nodes.len() {
            return false;
        }
        self.nodes.pop();
        true
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(ROOT)
    }

    pub fn root_mut(&mut self) -> NodeMut<'_> {
        self.node_mut(ROOT)
    }

    pub fn empty(&self) -> NodeRef<'_> {
        self.node(EMPTY)
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        assert!(id.index() < self.nodes.len(), "{id:?} does not belong to this document");
        NodeRef { doc: self, id }
    }

    /// # Panics
    /// If `id` is the shared empty node or belongs to another document.
    pub fn node_mut(&mut self, id: NodeId) -> NodeMut<'_> {
        assert!(id != EMPTY, "the shared empty node is immutable");
        assert!(id.index() < self.nodes.len(), "{id:?} does not belong to this document");
        NodeMut { doc: self, id }
    }

    /// Number of allocated nodes, including detached ones.
    pub fn allocated(&self) -> usize {
        self.nodes.len() - 1
    }

    fn raw(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.root() == other.root()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.root().dump())
    }
}

#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    doc: &'a Document,
    id: NodeId,
}

impl<'a> NodeRef<'a> {
    fn raw(self) -> &'a Node {
        self.doc.raw(self.id)
    }

    fn at_id(self, id: NodeId) -> NodeRef<'a> {
        NodeRef { doc: self.doc, id }
    }

    pub fn id(self) -> NodeId {
        self.id
    }

    pub fn document(self) -> &'a Document {
        self.doc
    }

    pub fn kind(self) -> NodeKind {
        match self.raw() {
            Node::Empty => NodeKind::Empty,
            Node::Integer(_) => NodeKind::Integer,
            Node::Float(_) => NodeKind::Float,
            Node::String(_) => NodeKind::String,
            Node::Array(_) => NodeKind::Array,
            Node::Map(_) => NodeKind::Map,
        }
    }

    pub fn is_empty(self) -> bool {
        matches!(self.raw(), Node::Empty)
    }

    pub fn is_scalar(self) -> bool {
        !matches!(self.raw(), Node::Array(_) | Node::Map(_))
    }

    pub fn is_array(self) -> bool {
        matches!(self.raw(), Node::Array(_))
    }

    pub fn is_map(self) -> bool {
        matches!(self.raw(), Node::Map(_))
    }

    pub fn as_int(self) -> Option<i64> {
        match self.raw() {
            Node::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(self) -> Option<f64> {
        match self.raw() {
            Node::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(self) -> Option<&'a str> {
        match self.raw() {
            Node::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn read<S: Scalar>(self) -> Option<S> {
        S::load(self)
    }

    /// Children of an array or entries of a map; zero for scalars.
    pub fn len(self) -> usize {
        match self.raw() {
            Node::Array(items) => items.len(),
            Node::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    /// The `index`th child, or the shared empty node.
    pub fn at(self, index: usize) -> NodeRef<'a> {
        match self.raw() {
            Node::Array(items) => match items.get(index) {
                Some(&id) => self.at_id(id),
                None => self.at_id(EMPTY),
            },
            _ => self.at_id(EMPTY),
        }
    }

    /// The value under `key`, or the shared empty node.
    pub fn get(self, key: &str) -> NodeRef<'a> {
        match self.raw() {
            Node::Map(entries) => match entries.get(key) {
                Some(&id) => self.at_id(id),
                None => self.at_id(EMPTY),
            },
            _ => self.at_id(EMPTY),
        }
    }

    pub fn contains_key(self, key: &str) -> bool {
        match self.raw() {
            Node::Map(entries) => entries.contains_key(key),
            _ => false,
        }
    }

    pub fn items(self) -> impl Iterator<Item = NodeRef<'a>> {
        let items: &'a [NodeId] = match self.raw() {
            Node::Array(items) => items,
            _ => &[],
        };
        let doc = self.doc;
        items.iter().map(move |&id| NodeRef { doc, id })
    }

    pub fn entries(self) -> impl Iterator<Item = (&'a str, NodeRef<'a>)> {
        let entries = match self.raw() {
            Node::Map(entries) => Some(entries),
            _ => None,
        };
        let doc = self.doc;
        entries
            .into_iter()
            .flatten()
            .map(move |(key, &id)| (key.as_str(), NodeRef { doc, id }))
    }

    /// `true` for maps; otherwise logs that `what` expected a map.
    pub fn expect_map(self, what: &str) -> bool {
        if self.is_map() {
            return true;
        }
        warn!("{what} expects a map, found {:?} node", self.kind());
        false
    }

    /// `true` for arrays; otherwise logs that `what` expected an array.
    pub fn expect_array(self, what: &str) -> bool {
        if self.is_array() {
            return true;
        }
        warn!("{what} expects an array, found {:?} node", self.kind());
        false
    }

    pub fn dump(self) -> String {
        dump::dump(self)
    }
}

/// Arrays compare element-wise, maps by key set regardless of order.
impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self.raw(), other.raw()) {
            (Node::Empty, Node::Empty) => true,
            (Node::Integer(a), Node::Integer(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Node::String(a), Node::String(b)) => a == b,
            (Node::Array(a), Node::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|(&x, &y)| self.at_id(x) == other.at_id(y))
            }
            (Node::Map(a), Node::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, &x)| match b.get(key) {
                        Some(&y) => self.at_id(x) == other.at_id(y),
                        None => false,
                    })
            }
            _ => false,
        }
    }
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

pub struct NodeMut<'a> {
    doc: &'a mut Document,
    id: NodeId,
}

impl<'a> NodeMut<'a> {
    fn raw(&mut self) -> &mut Node {
        &mut self.doc.nodes[self.id.index()]
    }

    fn replace(&mut self, node: Node) {
        *self.raw() = node;
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn as_ref(&self) -> NodeRef<'_> {
        NodeRef {
            doc: &*self.doc,
            id: self.id,
        }
    }

    pub fn reborrow(&mut self) -> NodeMut<'_> {
        NodeMut {
            doc: &mut *self.doc,
            id: self.id,
        }
    }

    pub fn document(&mut self) -> &mut Document {
        &mut *self.doc
    }

    pub fn set_empty(&mut self) {
        self.replace(Node::Empty);
    }

    pub fn set_int(&mut self, value: i64) {
        self.replace(Node::Integer(value));
    }

    pub fn set_float(&mut self, value: f64) {
        self.replace(Node::Float(value));
    }

    pub fn set_str(&mut self, value: impl Into<String>) {
        self.replace(Node::String(value.into()));
    }

    pub fn write<S: Scalar>(&mut self, value: S) {
        value.store(self);
    }

    /// Turns the node into an array unless it already is one.
    pub fn make_array(&mut self) -> &mut Vec<NodeId> {
        let node = self.raw();
        if !matches!(node, Node::Array(_)) {
            *node = Node::Array(Vec::new());
        }
        match node {
            Node::Array(items) => items,
            _ => unreachable!(),
        }
    }

    /// Turns the node into a map unless it already is one.
    pub fn make_map(&mut self) -> &mut IndexMap<String, NodeId> {
        let node = self.raw();
        if !matches!(node, Node::Map(_)) {
            *node = Node::Map(IndexMap::new());
        }
        match node {
            Node::Map(entries) => entries,
            _ => unreachable!(),
        }
    }

    /// The `index`th child. A non-array node becomes an array and missing
    /// children up to `index` are created empty.
    pub fn at(&mut self, index: usize) -> NodeMut<'_> {
        let len = self.make_array().len();
        if index >= len {
            let fresh: Vec<NodeId> = (len..=index).map(|_| self.doc.make()).collect();
            self.make_array().extend(fresh);
        }
        let id = self.make_array()[index];
        NodeMut { doc: &mut *self.doc, id }
    }

    /// The value under `key`. A non-map node becomes a map and a missing key
    /// is inserted with an empty value.
    pub fn entry(&mut self, key: &str) -> NodeMut<'_> {
        let existing = self.make_map().get(key).copied();
        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.doc.make();
                self.make_map().insert(key.to_owned(), id);
                id
            }
        };
        NodeMut { doc: &mut *self.doc, id }
    }

    /// Appends an empty child to the node, coerced to an array.
    pub fn push(&mut self) -> NodeMut<'_> {
        let id = self.doc.make();
        self.make_array().push(id);
        NodeMut { doc: &mut *self.doc, id }
    }

    /// Appends an existing node of the same document. The node is then
    /// reachable from several parents.
    pub fn link_child(&mut self, child: NodeId) {
        assert!(child.index() < self.doc.nodes.len(), "{child:?} does not belong to this document");
        self.make_array().push(child);
    }

    /// Stores an existing node of the same document under `key`.
    pub fn link_entry(&mut self, key: &str, child: NodeId) {
        assert!(child.index() < self.doc.nodes.len(), "{child:?} does not belong to this document");
        self.make_map().insert(key.to_owned(), child);
    }

    pub fn remove(&mut self, key: &str) -> bool {
        match self.raw() {
            Node::Map(entries) => entries.shift_remove(key).is_some(),
            _ => false,
        }
    }

    /// Replaces the node's content with a deep copy of `source`.
    pub fn assign(&mut self, source: NodeRef<'_>) {
        match source.raw() {
            Node::Array(_) => {
                self.make_array().clear();
                for item in source.items() {
                    self.push().assign(item);
                }
            }
            Node::Map(_) => {
                self.make_map().clear();
                for (key, value) in source.entries() {
                    self.entry(key).assign(value);
                }
            }
            scalar => self.replace(scalar.clone()),
        }
    }

    pub fn into_ref(self) -> NodeRef<'a> {
        NodeRef {
            doc: self.doc,
            id: self.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_creates_missing_children() {
        let mut doc = Document::new();
        doc.root_mut().at(3).set_int(9);

        let root = doc.root();
        assert!(root.is_array());
        assert_eq!(root.len(), 4);
        assert!(root.at(0).is_empty());
        assert_eq!(root.at(3).as_int(), Some(9));
    }

    #[test]
    fn only_the_newest_node_can_be_unmade() {
        let mut doc = Document::new();
        let first = doc.make();
        let second = doc.make();
        assert!(!doc.unmake(first));
        assert!(doc.unmake(second));
        assert!(doc.unmake(first));
        assert!(!doc.unmake(doc.root().id()));
        assert_eq!(doc.allocated(), 1);
    }

    #[test]
    fn keys_create_entries() {
        let mut doc = Document::new();
        doc.root_mut().entry("player").entry("name").set_str("Ann");

        assert_eq!(doc.root().get("player").get("name").as_str(), Some("Ann"));
        assert!(doc.root().contains_key("player"));
    }

    #[test]
    fn read_access_never_mutates() {
        let mut doc = Document::new();
        doc.root_mut().set_int(1);
        let before = doc.allocated();

        let root = doc.root();
        assert!(root.get("missing").is_empty());
        assert!(root.at(10).get("deeper").is_empty());
        assert_eq!(root.as_int(), Some(1));
        assert_eq!(doc.allocated(), before);
    }

    #[test]
    fn changing_kind_clears_payload() {
        let mut doc = Document::new();
        let mut root = doc.root_mut();
        root.set_str("scalar");
        root.push().set_int(1);
        assert_eq!(root.as_ref().kind(), NodeKind::Array);
        assert_eq!(root.as_ref().as_str(), None);

        root.entry("k").set_int(2);
        assert_eq!(root.as_ref().kind(), NodeKind::Map);
        assert_eq!(root.as_ref().len(), 1);
    }

    #[test]
    fn push_appends() {
        let mut doc = Document::new();
        let mut root = doc.root_mut();
        root.push().set_int(1);
        root.push().set_str("two");
        assert_eq!(root.as_ref().len(), 2);
        assert_eq!(root.as_ref().at(1).as_str(), Some("two"));
    }

    #[test]
    fn assign_copies_across_documents() {
        let mut source = Document::new();
        {
            let mut root = source.root_mut();
            root.entry("a").set_int(1);
            root.entry("b").push().set_float(2.5);
        }

        let mut copy = Document::new();
        copy.root_mut().entry("nested").assign(source.root());
        assert_eq!(copy.root().get("nested"), source.root());
    }

    #[test]
    fn linked_nodes_are_shared() {
        let mut doc = Document::new();
        let shared = doc.make();
        doc.node_mut(shared).set_str("same");
        let mut root = doc.root_mut();
        root.link_entry("first", shared);
        root.link_entry("second", shared);

        assert_eq!(doc.root().get("first").id(), doc.root().get("second").id());
    }

    #[test]
    fn map_equality_ignores_order() {
        let mut a = Document::new();
        a.root_mut().entry("x").set_int(1);
        a.root_mut().entry("y").set_int(2);

        let mut b = Document::new();
        b.root_mut().entry("y").set_int(2);
        b.root_mut().entry("x").set_int(1);

        assert_eq!(a, b);
    }

    #[test]
    fn clear_resets_root() {
        let mut doc = Document::new();
        doc.root_mut().entry("x").set_int(1);
        doc.clear();
        assert!(doc.root().is_empty());
        assert_eq!(doc.allocated(), 1);
    }

    #[test]
    #[should_panic(expected = "immutable")]
    fn sentinel_is_immutable() {
        let mut doc = Document::new();
        let empty = doc.empty().id();
        doc.node_mut(empty).set_int(1);
    }
}
