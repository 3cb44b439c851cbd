//! Compact self-describing binary encoding.
//!
//! ```text
//! stream := len:u32 node            len counts the bytes after itself
//! node   := 0                       empty
//!         | 1 count:u32 node*       array
//!         | 2 count:u32 (str node)* map
//!         | 3 i64                   integer
//!         | 4 f64                   float
//!         | 5 str                   string
//! str    := len:u32 utf8*
//! ```
//!
//! Numbers use the byte order of the host, so streams only travel between
//! machines of the same endianness.

use std::io::{self, Read, Write};

use byteorder::{NativeEndian, ReadBytesExt, WriteBytesExt};

use super::{Codec, CodecError};
use crate::document::{Document, NodeKind, NodeMut, NodeRef};

const EMPTY: u8 = 0;
const ARRAY: u8 = 1;
const MAP: u8 = 2;
const INTEGER: u8 = 3;
const FLOAT: u8 = 4;
const STRING: u8 = 5;

const PREFIX: usize = 4;
const MAX_DEPTH: usize = 512;

#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryCodec;

impl BinaryCodec {
    /// Whether `bytes` starts with a complete stream.
    pub fn can_parse(bytes: &[u8]) -> bool {
        match declared_len(bytes) {
            Some(len) => bytes.len() - PREFIX >= len,
            None => false,
        }
    }

    /// Decodes the stream at the start of `bytes`, returning the document
    /// and the number of bytes it occupied. `None` if the stream is still
    /// incomplete.
    pub fn decode_prefix(bytes: &[u8]) -> Result<Option<(Document, usize)>, CodecError> {
        let Some(len) = declared_len(bytes) else {
            return Ok(None);
        };
        let Some(body) = bytes[PREFIX..].get(..len) else {
            return Ok(None);
        };
        Ok(Some((decode_body(body)?, PREFIX + len)))
    }
}

fn declared_len(bytes: &[u8]) -> Option<usize> {
    let mut prefix = bytes.get(..PREFIX)?;
    let len = prefix.read_u32::<NativeEndian>().ok()?;
    usize::try_from(len).ok()
}

fn length(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::Malformed(format!("length {len} exceeds 32 bits")))
}

fn encode(out: &mut Vec<u8>, node: NodeRef<'_>) -> Result<(), CodecError> {
    match node.kind() {
        NodeKind::Empty => out.push(EMPTY),
        NodeKind::Integer => {
            out.push(INTEGER);
            out.write_i64::<NativeEndian>(node.as_int().unwrap_or_default())?;
        }
        NodeKind::Float => {
            out.push(FLOAT);
            out.write_f64::<NativeEndian>(node.as_float().unwrap_or_default())?;
        }
        NodeKind::String => {
            out.push(STRING);
            encode_str(out, node.as_str().unwrap_or_default())?;
        }
        NodeKind::Array => {
            out.push(ARRAY);
            out.write_u32::<NativeEndian>(length(node.len())?)?;
            for item in node.items() {
                encode(out, item)?;
            }
        }
        NodeKind::Map => {
            out.push(MAP);
            out.write_u32::<NativeEndian>(length(node.len())?)?;
            for (key, value) in node.entries() {
                encode_str(out, key)?;
                encode(out, value)?;
            }
        }
    }
    Ok(())
}

fn encode_str(out: &mut Vec<u8>, text: &str) -> Result<(), CodecError> {
    out.write_u32::<NativeEndian>(length(text.len())?)?;
    out.extend_from_slice(text.as_bytes());
    Ok(())
}

struct Decoder<'a> {
    input: &'a [u8],
    depth: usize,
}

fn eof(err: io::Error) -> CodecError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        CodecError::Truncated
    } else {
        CodecError::Io(err)
    }
}

impl Decoder<'_> {
    fn u8(&mut self) -> Result<u8, CodecError> {
        self.input.read_u8().map_err(eof)
    }

    fn count(&mut self, min_size: usize) -> Result<usize, CodecError> {
        let count = self.input.read_u32::<NativeEndian>().map_err(eof)? as usize;
        // every element needs at least `min_size` more bytes
        if count.saturating_mul(min_size) > self.input.len() {
            return Err(CodecError::Truncated);
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.count(1)?;
        let (text, rest) = self.input.split_at(len);
        self.input = rest;
        String::from_utf8(text.to_vec())
            .map_err(|err| CodecError::Malformed(format!("string is not utf-8: {err}")))
    }

    fn node(&mut self, mut node: NodeMut<'_>) -> Result<(), CodecError> {
        match self.u8()? {
            EMPTY => node.set_empty(),
            INTEGER => node.set_int(self.input.read_i64::<NativeEndian>().map_err(eof)?),
            FLOAT => node.set_float(self.input.read_f64::<NativeEndian>().map_err(eof)?),
            STRING => {
                let text = self.string()?;
                node.set_str(text);
            }
            ARRAY => {
                let count = self.count(1)?;
                node.make_array();
                self.nested(|decoder| {
                    for _ in 0..count {
                        decoder.node(node.push())?;
                    }
                    Ok(())
                })?;
            }
            MAP => {
                let count = self.count(PREFIX + 1)?;
                node.make_map();
                self.nested(|decoder| {
                    for _ in 0..count {
                        let key = decoder.string()?;
                        decoder.node(node.entry(&key))?;
                    }
                    Ok(())
                })?;
            }
            tag => return Err(CodecError::Malformed(format!("unknown node tag {tag}"))),
        }
        Ok(())
    }

    fn nested(&mut self, f: impl FnOnce(&mut Self) -> Result<(), CodecError>) -> Result<(), CodecError> {
        if self.depth == MAX_DEPTH {
            return Err(CodecError::Malformed(format!("nesting deeper than {MAX_DEPTH}")));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

fn decode_body(body: &[u8]) -> Result<Document, CodecError> {
    let mut document = Document::new();
    let mut decoder = Decoder {
        input: body,
        depth: 0,
    };
    decoder.node(document.root_mut())?;
    if !decoder.input.is_empty() {
        return Err(CodecError::Malformed(format!(
            "{} bytes after the end of the document",
            decoder.input.len()
        )));
    }
    Ok(document)
}

impl Codec for BinaryCodec {
    fn write(&self, document: &Document, writer: &mut dyn Write) -> Result<(), CodecError> {
        let mut body = Vec::new();
        encode(&mut body, document.root())?;
        writer.write_u32::<NativeEndian>(length(body.len())?)?;
        writer.write_all(&body)?;
        Ok(())
    }

    fn read(&self, reader: &mut dyn Read) -> Result<Document, CodecError> {
        let len = reader.read_u32::<NativeEndian>().map_err(eof)? as usize;
        let mut body = Vec::new();
        reader.take(len as u64).read_to_end(&mut body)?;
        if body.len() < len {
            return Err(CodecError::Truncated);
        }
        decode_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(document: &Document) -> Vec<u8> {
        BinaryCodec.to_bytes(document).unwrap()
    }

    fn prefix(bytes: &[u8]) -> usize {
        declared_len(bytes).unwrap()
    }

    #[test]
    fn scalar_streams() {
        let mut doc = Document::new();
        doc.root_mut().set_int(-5);
        let bytes = encoded(&doc);
        assert_eq!(bytes.len(), PREFIX + 1 + 8);
        assert_eq!(bytes[PREFIX], INTEGER);
        assert_eq!(BinaryCodec.from_bytes(&bytes).unwrap(), doc);

        let empty = encoded(&Document::new());
        assert_eq!(empty.len(), PREFIX + 1);
    }

    #[test]
    fn partial_streams() {
        let mut doc = Document::new();
        doc.root_mut().entry("name").set_str("partial");
        let bytes = encoded(&doc);

        for cut in 0..bytes.len() {
            assert!(!BinaryCodec::can_parse(&bytes[..cut]));
            assert!(BinaryCodec::decode_prefix(&bytes[..cut]).unwrap().is_none());
        }
        assert!(BinaryCodec::can_parse(&bytes));

        let mut two = bytes.clone();
        two.extend_from_slice(&bytes);
        let (first, used) = BinaryCodec::decode_prefix(&two).unwrap().unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(first, doc);
    }

    #[test]
    fn truncated_input_is_an_error() {
        let mut doc = Document::new();
        doc.root_mut().push().set_str("abc");
        let bytes = encoded(&doc);

        assert!(matches!(
            BinaryCodec.from_bytes(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated)
        ));
        assert!(matches!(BinaryCodec.from_bytes(&[1, 0]), Err(CodecError::Truncated)));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut bytes = Vec::new();
        bytes.write_u32::<NativeEndian>(1).unwrap();
        bytes.push(9);
        assert!(matches!(
            BinaryCodec.from_bytes(&bytes),
            Err(CodecError::Malformed(_))
        ));

        // an array claiming far more elements than there are bytes
        let mut bytes = Vec::new();
        bytes.write_u32::<NativeEndian>(5).unwrap();
        bytes.push(ARRAY);
        bytes.write_u32::<NativeEndian>(u32::MAX).unwrap();
        assert!(matches!(BinaryCodec.from_bytes(&bytes), Err(CodecError::Truncated)));
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let mut body = Vec::new();
        for _ in 0..=MAX_DEPTH {
            body.push(ARRAY);
            body.write_u32::<NativeEndian>(1).unwrap();
        }
        body.push(EMPTY);
        let mut bytes = Vec::new();
        bytes.write_u32::<NativeEndian>(body.len() as u32).unwrap();
        bytes.extend_from_slice(&body);
        assert!(matches!(
            BinaryCodec.from_bytes(&bytes),
            Err(CodecError::Malformed(_))
        ));
    }

    #[test]
    fn prefix_counts_the_rest() {
        let mut doc = Document::new();
        doc.root_mut().set_str("x".repeat(300));
        let bytes = encoded(&doc);
        assert_eq!(prefix(&bytes) + PREFIX, bytes.len());
    }
}
