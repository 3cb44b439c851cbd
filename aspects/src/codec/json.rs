use std::io::{Read, Write};

use super::{Codec, CodecError};
use crate::document::{Document, NodeKind, NodeRef, is_inline};

/// Writes documents as JSON. Reading is not supported.
///
/// Collections whose children are all scalars stay on one line; everything
/// else is indented. Empty nodes and non-finite floats become `null`.
#[derive(Clone, Copy, Debug)]
pub struct JsonCodec {
    indent: usize,
}

impl Default for JsonCodec {
    fn default() -> Self {
        JsonCodec { indent: 2 }
    }
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spaces per nesting level.
    pub fn indent(mut self, indent: usize) -> Self {
        self.indent = indent;
        self
    }

    fn newline(&self, out: &mut String, depth: usize) {
        out.push('\n');
        out.extend(std::iter::repeat_n(' ', depth * self.indent));
    }

    fn value(&self, out: &mut String, node: NodeRef<'_>, depth: usize) -> Result<(), CodecError> {
        match node.kind() {
            NodeKind::Empty => out.push_str("null"),
            NodeKind::Integer => out.push_str(&node.as_int().unwrap_or_default().to_string()),
            NodeKind::Float => match node.as_float() {
                Some(value) if value.is_finite() => out.push_str(&format!("{value:?}")),
                _ => out.push_str("null"),
            },
            NodeKind::String => string(out, node.as_str().unwrap_or_default())?,
            NodeKind::Array => {
                let inline = is_inline(node);
                out.push('[');
                for (i, item) in node.items().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if inline {
                            out.push(' ');
                        }
                    }
                    if !inline {
                        self.newline(out, depth + 1);
                    }
                    self.value(out, item, depth + 1)?;
                }
                if !inline {
                    self.newline(out, depth);
                }
                out.push(']');
            }
            NodeKind::Map => {
                let inline = is_inline(node);
                out.push('{');
                for (i, (key, value)) in node.entries().enumerate() {
                    if i > 0 {
                        out.push(',');
                        if inline {
                            out.push(' ');
                        }
                    }
                    if !inline {
                        self.newline(out, depth + 1);
                    }
                    string(out, key)?;
                    out.push_str(": ");
                    self.value(out, value, depth + 1)?;
                }
                if !inline {
                    self.newline(out, depth);
                }
                out.push('}');
            }
        }
        Ok(())
    }
}

fn string(out: &mut String, text: &str) -> Result<(), CodecError> {
    let quoted = serde_json::to_string(text).map_err(|err| CodecError::Malformed(err.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

impl Codec for JsonCodec {
    fn write(&self, document: &Document, writer: &mut dyn Write) -> Result<(), CodecError> {
        let mut out = String::new();
        self.value(&mut out, document.root(), 0)?;
        out.push('\n');
        writer.write_all(out.as_bytes())?;
        Ok(())
    }

    fn read(&self, _: &mut dyn Read) -> Result<Document, CodecError> {
        Err(CodecError::NotImplemented("reading JSON"))
    }
}
