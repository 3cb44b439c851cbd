//! YAML reading on top of `saphyr-parser`, and a block-style writer.
//!
//! Nodes reachable from several parents are written once with an anchor
//! (`&a1`) and aliased (`*a1`) afterwards; reading restores the sharing. The
//! string `~` is written as `\~` so that it survives next to YAML's null.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::io::{Read, Write};

use saphyr_parser::{Event, Parser, ScalarStyle};

use super::{Codec, CodecError};
use crate::document::{Document, NodeId, NodeKind, NodeRef, is_inline};

#[derive(Clone, Copy, Debug, Default)]
pub struct YamlCodec;

impl Codec for YamlCodec {
    fn write(&self, document: &Document, writer: &mut dyn Write) -> Result<(), CodecError> {
        let mut emitter = Emitter::new(document.root());
        emitter.out.push_str("---");
        emitter.value(document.root(), 0);
        writer.write_all(emitter.out.as_bytes())?;
        Ok(())
    }

    fn read(&self, reader: &mut dyn Read) -> Result<Document, CodecError> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Builder::default().parse(&text)
    }
}

/// What a plain (unquoted) scalar means.
#[derive(Debug, PartialEq)]
enum Plain {
    Empty,
    Integer(i64),
    Float(f64),
    Text,
}

fn classify(text: &str) -> Plain {
    match text {
        "" | "~" | "null" | "Null" | "NULL" => return Plain::Empty,
        ".inf" | ".Inf" | ".INF" | "+.inf" => return Plain::Float(f64::INFINITY),
        "-.inf" | "-.Inf" | "-.INF" => return Plain::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Plain::Float(f64::NAN),
        _ => {}
    }
    if let Ok(value) = text.parse::<i64>() {
        return Plain::Integer(value);
    }
    if let Ok(value) = text.parse::<f64>() {
        return Plain::Float(value);
    }
    Plain::Text
}

/// Characters that make a scalar unsafe to write unquoted, in block or flow
/// context.
fn needs_quotes(text: &str) -> bool {
    text.is_empty()
        || text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace)
        || text.starts_with([
            '-', '?', '*', '&', '!', '|', '>', '%', '@', '`', '\\', '\'', '"',
        ])
        || text.contains([':', '#', ',', '[', ']', '{', '}', '"'])
        || text.chars().any(char::is_control)
}

fn quoted(out: &mut String, text: &str) {
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn key(out: &mut String, key: &str) {
    if needs_quotes(key) {
        quoted(out, key);
    } else {
        out.push_str(key);
    }
}

fn float(out: &mut String, value: f64) {
    if value.is_nan() {
        out.push_str(".nan");
    } else if value.is_infinite() {
        out.push_str(if value > 0.0 { ".inf" } else { "-.inf" });
    } else {
        let _ = write!(out, "{value:?}");
    }
}

fn string(out: &mut String, text: &str) {
    if text == "~" {
        out.push_str("\\~");
    } else if needs_quotes(text) || classify(text) != Plain::Text {
        quoted(out, text);
    } else {
        out.push_str(text);
    }
}

struct Emitter {
    out: String,
    shared: HashSet<NodeId>,
    anchors: HashMap<NodeId, usize>,
}

impl Emitter {
    fn new(root: NodeRef<'_>) -> Self {
        let mut seen = HashSet::new();
        let mut shared = HashSet::new();
        let mut pending = vec![root];
        while let Some(node) = pending.pop() {
            if !seen.insert(node.id()) {
                shared.insert(node.id());
                continue;
            }
            pending.extend(node.items());
            pending.extend(node.entries().map(|(_, value)| value));
        }
        Emitter {
            out: String::new(),
            shared,
            anchors: HashMap::new(),
        }
    }

    /// Writes ` *aN` and returns true if `node` was already written;
    /// otherwise writes its anchor, if it needs one.
    fn reference(&mut self, node: NodeRef<'_>) -> bool {
        if !self.shared.contains(&node.id()) {
            return false;
        }
        if let Some(anchor) = self.anchors.get(&node.id()) {
            let _ = write!(self.out, " *a{anchor}");
            return true;
        }
        let anchor = self.anchors.len() + 1;
        self.anchors.insert(node.id(), anchor);
        let _ = write!(self.out, " &a{anchor}");
        false
    }

    fn scalar(&mut self, node: NodeRef<'_>) {
        match node.kind() {
            NodeKind::Integer => {
                let _ = write!(self.out, "{}", node.as_int().unwrap_or_default());
            }
            NodeKind::Float => float(&mut self.out, node.as_float().unwrap_or_default()),
            NodeKind::String => string(&mut self.out, node.as_str().unwrap_or_default()),
            _ => self.out.push('~'),
        }
    }

    /// Writes a collection or scalar in flow style, space first.
    fn flow(&mut self, node: NodeRef<'_>) {
        if self.reference(node) {
            return;
        }
        self.out.push(' ');
        if node.is_array() {
            self.out.push('[');
            for (i, item) in node.items().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                self.flow(item);
            }
            self.out.push_str(if node.len() > 0 { " ]" } else { "]" });
        } else if node.is_map() {
            self.out.push('{');
            for (i, (name, value)) in node.entries().enumerate() {
                if i > 0 {
                    self.out.push(',');
                }
                self.out.push(' ');
                key(&mut self.out, name);
                self.out.push(':');
                self.flow(value);
            }
            self.out.push_str(if node.len() > 0 { " }" } else { "}" });
        } else {
            self.scalar(node);
        }
    }

    fn indent(&mut self, depth: usize) {
        self.out.extend(std::iter::repeat_n(' ', depth));
    }

    /// Writes `node` as the value following `key:`, `-` or the document
    /// marker. Nested block content is indented by `depth`.
    fn value(&mut self, node: NodeRef<'_>, depth: usize) {
        if is_inline(node) {
            self.flow(node);
            self.out.push('\n');
            return;
        }
        if self.reference(node) {
            self.out.push('\n');
            return;
        }
        self.out.push('\n');
        if node.is_array() {
            for item in node.items() {
                self.indent(depth);
                self.out.push('-');
                self.value(item, depth + 2);
            }
        } else {
            for (name, value) in node.entries() {
                self.indent(depth);
                key(&mut self.out, name);
                self.out.push(':');
                self.value(value, depth + 2);
            }
        }
    }
}

enum Frame {
    Sequence(NodeId),
    Mapping { node: NodeId, key: Option<String> },
}

impl Frame {
    fn node(&self) -> NodeId {
        match self {
            Frame::Sequence(node) | Frame::Mapping { node, .. } => *node,
        }
    }
}

#[derive(Default)]
struct Builder {
    document: Document,
    stack: Vec<Frame>,
    anchors: HashMap<usize, NodeId>,
    has_root: bool,
}

fn malformed(message: impl Into<String>) -> CodecError {
    CodecError::Malformed(message.into())
}

impl Builder {
    fn parse(mut self, text: &str) -> Result<Document, CodecError> {
        let mut parser = Parser::new_from_str(text);
        while let Some(event) = parser.next_event() {
            let (event, _) = event.map_err(|err| CodecError::Yaml(err.to_string()))?;
            match event {
                Event::StreamStart | Event::DocumentStart(_) | Event::Nothing => {}
                Event::StreamEnd => break,
                // only the first document of a stream is read
                Event::DocumentEnd => break,
                Event::Alias(anchor) => {
                    let target = *self
                        .anchors
                        .get(&anchor)
                        .ok_or_else(|| malformed("alias to an unknown anchor"))?;
                    if self.stack.iter().any(|frame| frame.node() == target) {
                        return Err(malformed("alias to an enclosing collection"));
                    }
                    self.attach(Some(target))?;
                }
                Event::Scalar(value, style, anchor, _) => {
                    if let Some(Frame::Mapping { key: key @ None, .. }) = self.stack.last_mut() {
                        *key = Some(value.into_owned());
                        continue;
                    }
                    let id = self.attach(None)?;
                    self.remember(anchor, id);
                    self.set_scalar(id, &value, style);
                }
                Event::SequenceStart(anchor, _) => {
                    let id = self.attach(None)?;
                    self.remember(anchor, id);
                    self.document.node_mut(id).make_array();
                    self.stack.push(Frame::Sequence(id));
                }
                Event::MappingStart(anchor, _) => {
                    let id = self.attach(None)?;
                    self.remember(anchor, id);
                    self.document.node_mut(id).make_map();
                    self.stack.push(Frame::Mapping { node: id, key: None });
                }
                Event::SequenceEnd | Event::MappingEnd => {
                    self.stack.pop();
                }
            }
        }
        Ok(self.document)
    }

    fn remember(&mut self, anchor: usize, id: NodeId) {
        if anchor != 0 {
            self.anchors.insert(anchor, id);
        }
    }

    /// Places a value at the current position: `existing` for aliases, a
    /// fresh node otherwise.
    fn attach(&mut self, existing: Option<NodeId>) -> Result<NodeId, CodecError> {
        match self.stack.last_mut() {
            None => {
                if self.has_root {
                    return Err(malformed("more than one root value"));
                }
                self.has_root = true;
                match existing {
                    Some(_) => Err(malformed("the root cannot be an alias")),
                    None => Ok(self.document.root().id()),
                }
            }
            Some(Frame::Sequence(parent)) => {
                let parent = *parent;
                let id = match existing {
                    Some(id) => id,
                    None => self.document.make(),
                };
                self.document.node_mut(parent).link_child(id);
                Ok(id)
            }
            Some(Frame::Mapping { node, key }) => {
                let parent = *node;
                let key = key
                    .take()
                    .ok_or_else(|| malformed("map keys must be scalars"))?;
                let id = match existing {
                    Some(id) => id,
                    None => self.document.make(),
                };
                self.document.node_mut(parent).link_entry(&key, id);
                Ok(id)
            }
        }
    }

    fn set_scalar(&mut self, id: NodeId, value: &str, style: ScalarStyle) {
        let mut node = self.document.node_mut(id);
        if !matches!(style, ScalarStyle::Plain) {
            node.set_str(value);
            return;
        }
        if value == "\\~" {
            node.set_str("~");
            return;
        }
        match classify(value) {
            Plain::Empty => node.set_empty(),
            Plain::Integer(value) => node.set_int(value),
            Plain::Float(value) => node.set_float(value),
            Plain::Text => node.set_str(value),
        }
    }
}
