//! Byte representations of a [`Document`].

mod binary;
mod json;
mod yaml;

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::document::Document;

pub use binary::BinaryCodec;
pub use json::JsonCodec;
pub use yaml::YamlCodec;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("input ends in the middle of a document")]
    Truncated,
    #[error("malformed input: {0}")]
    Malformed(String),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("yaml: {0}")]
    Yaml(String),
}

/// Converts whole documents to and from a byte stream.
pub trait Codec {
    fn write(&self, document: &Document, writer: &mut dyn Write) -> Result<(), CodecError>;

    fn read(&self, reader: &mut dyn Read) -> Result<Document, CodecError>;

    fn to_bytes(&self, document: &Document) -> Result<Vec<u8>, CodecError> {
        let mut bytes = Vec::new();
        self.write(document, &mut bytes)?;
        Ok(bytes)
    }

    fn from_bytes(&self, mut bytes: &[u8]) -> Result<Document, CodecError> {
        self.read(&mut bytes)
    }
}
