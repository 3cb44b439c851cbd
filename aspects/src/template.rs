//! Where objects find the templates they name.

use std::collections::HashMap;
use std::fs::File;
use std::io::ErrorKind;
use std::path::PathBuf;

use log::{debug, warn};

use crate::codec::{Codec, YamlCodec};
use crate::document::Document;

/// Supplies the document an object's `template` key refers to.
pub trait TemplateSource {
    fn load_template(&mut self, id: &str) -> Option<Document>;
}

/// Knows no templates.
#[derive(Default, Debug)]
pub struct NoTemplates;

impl TemplateSource for NoTemplates {
    fn load_template(&mut self, _: &str) -> Option<Document> {
        None
    }
}

/// Templates kept in memory.
#[derive(Default, Debug)]
pub struct MemoryTemplates {
    templates: HashMap<String, Document>,
}

impl MemoryTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, template: Document) -> &mut Self {
        self.templates.insert(id.into(), template);
        self
    }
}

impl TemplateSource for MemoryTemplates {
    fn load_template(&mut self, id: &str) -> Option<Document> {
        self.templates.get(id).cloned()
    }
}

/// Templates stored as `<root>/<id>.yaml`.
#[derive(Debug)]
pub struct DirectoryTemplates {
    root: PathBuf,
    codec: YamlCodec,
}

impl DirectoryTemplates {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryTemplates {
            root: root.into(),
            codec: YamlCodec::default(),
        }
    }
}

impl TemplateSource for DirectoryTemplates {
    fn load_template(&mut self, id: &str) -> Option<Document> {
        let path = self.root.join(format!("{id}.yaml"));
        let mut file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return None,
            Err(err) => {
                warn!("cannot open template {}: {err}", path.display());
                return None;
            }
        };
        debug!("loading template {}", path.display());
        match self.codec.read(&mut file) {
            Ok(document) => Some(document),
            Err(err) => {
                warn!("template {}: {err}", path.display());
                None
            }
        }
    }
}
