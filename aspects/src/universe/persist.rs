//! Reading and writing objects as document trees.
//!
//! ```yaml
//! objects:
//!   - class: Body
//!     id: Car
//!     mass: 1200.0
//!     template: vehicle
//!     aspects:
//!       - class: Radio
//!         channel: 3
//!       - Light
//!     __attributes:
//!       - { aspect: 0, attribute: channel, as: station }
//!     __slots:
//!       - { aspect: 0, slot: ping, as: honk }
//! ```

use std::rc::Rc;

use log::{debug, warn};

use crate::class::StructuredType;
use crate::composite::CompositeType;
use crate::document::{Document, NodeMut, NodeRef};
use crate::object::{ObjectHandle, ObjectType};

use super::{Universe, UniverseError, any, any_mut};

const CLASS: &str = "class";
const ID: &str = "id";
const ASPECTS: &str = "aspects";
const TEMPLATE: &str = "template";
const EXPOSED_ATTRIBUTES: &str = "__attributes";
const EXPOSED_SLOTS: &str = "__slots";
const OBJECTS: &str = "objects";

impl Universe<'_> {
    /// Creates the object described by `node` and reads its fields.
    pub fn deserialize_object(&mut self, node: NodeRef<'_>) -> Result<ObjectHandle, UniverseError> {
        if !node.is_map() {
            return Err(UniverseError::NotAMap(node.kind()));
        }
        let expanded = self.expand_templates(node);
        let node = expanded.root();

        let ty = self.resolve_type(node)?;
        let id = match node.get(ID).as_str() {
            Some(id) => id.to_owned(),
            None => {
                warn!("{} object has no id", ty.name());
                String::new()
            }
        };
        let handle = self.create_object(ty, &id)?;
        self.read_fields(handle, node);
        Ok(handle)
    }

    fn resolve_type(&mut self, node: NodeRef<'_>) -> Result<ObjectType, UniverseError> {
        let name = node.get(CLASS).as_str().ok_or(UniverseError::MissingClass)?;
        let aspects = node.get(ASPECTS);
        let Some(base) = self.registry.class_named(name) else {
            let defined = self
                .defined
                .get(name)
                .cloned()
                .ok_or_else(|| UniverseError::UnknownClass(name.to_owned()))?;
            // written aspects only carry field values
            if !aspects.is_empty() && aspects.len() != defined.aspects().len() {
                warn!("`{name}` is a composite already, its `{ASPECTS}` are taken from the definition");
            }
            return Ok(ObjectType::Composite(defined));
        };
        if !aspects.is_array() {
            if !aspects.is_empty() {
                warn!("`{ASPECTS}` of a `{name}` must be an array");
            }
            return Ok(ObjectType::Class(base));
        }

        let mut composite = CompositeType::new(base.name(), base);
        for aspect in aspects.items() {
            let ty = match aspect.as_str() {
                Some(class) => ObjectType::Class(
                    self.registry
                        .class_named(class)
                        .ok_or_else(|| UniverseError::UnknownClass(class.to_owned()))?,
                ),
                None => self.resolve_type(aspect)?,
            };
            composite.add_aspect(ty)?;
        }
        for exposure in node.get(EXPOSED_ATTRIBUTES).items() {
            if let Some((aspect, member, exposed)) = exposure_of(exposure, "attribute") {
                if let Err(err) = composite.expose_attribute(aspect, member, exposed) {
                    warn!("{name}: {err}");
                }
            }
        }
        for exposure in node.get(EXPOSED_SLOTS).items() {
            if let Some((aspect, member, exposed)) = exposure_of(exposure, "slot") {
                if let Err(err) = composite.expose_slot(aspect, member, exposed) {
                    warn!("{name}: {err}");
                }
            }
        }
        composite.freeze();

        let signature = composite.signature();
        if let Some(known) = self.composites.get(&signature) {
            return Ok(ObjectType::Composite(known.clone()));
        }
        debug!("synthesized composite {signature}");
        let composite = Rc::new(composite);
        self.composites.insert(signature, composite.clone());
        Ok(ObjectType::Composite(composite))
    }

    /// A copy of `node` with its template, and those of its aspects, laid
    /// underneath.
    fn expand_templates(&mut self, node: NodeRef<'_>) -> Document {
        let template = node.get(TEMPLATE).as_str();
        let mut document = match template.and_then(|id| self.templates.load_template(id)) {
            Some(template) => merge(template, node),
            None => {
                if let Some(id) = template {
                    warn!("unknown template `{id}`");
                }
                let mut document = Document::new();
                document.root_mut().assign(node);
                document
            }
        };

        let aspects = document.root().get(ASPECTS);
        if !aspects.is_array() {
            return document;
        }
        for i in 0..aspects.len() {
            let aspect = document.root().get(ASPECTS).at(i);
            if !aspect.is_map() {
                continue;
            }
            let expanded = self.expand_templates(aspect);
            document.root_mut().entry(ASPECTS).at(i).assign(expanded.root());
        }
        document
    }

    /// Whether `composite` is the one registered under its name with
    /// [`define_composite`](Self::define_composite).
    fn is_defined(&self, composite: &Rc<CompositeType>) -> bool {
        self.defined
            .get(composite.name())
            .is_some_and(|defined| Rc::ptr_eq(defined, composite))
    }

    fn read_fields(&mut self, handle: ObjectHandle, node: NodeRef<'_>) {
        let registry = self.registry;
        let Some(entry) = self.entry_mut(handle) else {
            return;
        };
        let class = entry.header.ty.base_class();
        let aspects = entry.header.aspects.clone();
        if let Some(body) = entry.body.as_deref_mut() {
            class.deserialize(any_mut(body), node, registry);
        }
        let nodes = node.get(ASPECTS);
        for (i, aspect) in aspects.into_iter().enumerate() {
            let aspect_node = nodes.at(i);
            if aspect_node.is_map() {
                self.read_fields(aspect, aspect_node);
            }
        }
    }

    /// Writes the object behind `handle`, its aspects included, into `node`.
    pub fn serialize_object(&self, handle: ObjectHandle, mut node: NodeMut<'_>) -> Result<(), UniverseError> {
        let entry = self.entry(handle).ok_or(UniverseError::StaleHandle)?;
        let body = entry.body.as_deref().ok_or(UniverseError::StaleHandle)?;
        let class = entry.header.ty.base_class();

        let defined = entry
            .header
            .ty
            .as_composite()
            .filter(|composite| self.is_defined(composite));

        node.make_map();
        node.entry(CLASS).set_str(match defined {
            Some(composite) => composite.name(),
            None => class.name(),
        });
        let id = self.get_id(handle);
        if !id.is_empty() {
            node.entry(ID).set_str(id);
        }
        class.serialize(any(body), &mut node);

        let Some(composite) = entry.header.ty.as_composite() else {
            return Ok(());
        };
        {
            let mut aspects = node.entry(ASPECTS);
            aspects.make_array();
            for &aspect in &entry.header.aspects {
                self.serialize_object(aspect, aspects.push())?;
            }
        }
        if defined.is_some() {
            return Ok(());
        }
        if !composite.exposed_attributes().is_empty() {
            let mut list = node.entry(EXPOSED_ATTRIBUTES);
            list.make_array();
            for exposed in composite.exposed_attributes() {
                let mut item = list.push();
                item.entry("aspect").write(exposed.aspect());
                item.entry("attribute").set_str(exposed.attribute());
                item.entry("as").set_str(exposed.exposed());
            }
        }
        if !composite.exposed_slots().is_empty() {
            let mut list = node.entry(EXPOSED_SLOTS);
            list.make_array();
            for exposed in composite.exposed_slots() {
                let mut item = list.push();
                item.entry("aspect").write(exposed.aspect());
                item.entry("slot").set_str(exposed.slot());
                item.entry("as").set_str(exposed.exposed());
            }
        }
        Ok(())
    }

    /// The whole universe as `{objects: [...]}`.
    pub fn serialize(&self) -> Document {
        let mut document = Document::new();
        let mut root = document.root_mut();
        let mut objects = root.entry(OBJECTS);
        objects.make_array();
        for &handle in &self.roots {
            if let Err(err) = self.serialize_object(handle, objects.push()) {
                warn!("skipping {handle:?}: {err}");
            }
        }
        document
    }

    /// Loads every object of `document`, then links references and runs the
    /// initializers. Returns the new objects in document order.
    pub fn deserialize(&mut self, document: &Document) -> Result<Vec<ObjectHandle>, UniverseError> {
        let objects = document.root().get(OBJECTS);
        if !objects.is_array() {
            return Err(UniverseError::MissingObjects);
        }
        let mut handles = Vec::with_capacity(objects.len());
        for object in objects.items() {
            handles.push(self.deserialize_object(object)?);
        }
        let unresolved = self.link();
        if unresolved > 0 {
            warn!("{unresolved} object references left unresolved");
        }
        self.run_initializers();
        Ok(handles)
    }
}

/// The template with the object's own top-level keys laid over it.
fn merge(mut template: Document, node: NodeRef<'_>) -> Document {
    let mut root = template.root_mut();
    if !root.as_ref().is_map() {
        warn!("template must be a map, found {:?} node", root.as_ref().kind());
        root.make_map().clear();
    }
    for (key, value) in node.entries() {
        if key != TEMPLATE {
            root.entry(key).assign(value);
        }
    }
    template
}

fn exposure_of<'a>(node: NodeRef<'a>, member: &str) -> Option<(usize, &'a str, &'a str)> {
    let aspect = node.get("aspect").as_int().and_then(|index| usize::try_from(index).ok());
    let name = node.get(member).as_str();
    let (Some(aspect), Some(name)) = (aspect, name) else {
        warn!("exposed {member} needs `aspect` and `{member}`, found {node:?}");
        return None;
    };
    Some((aspect, name, node.get("as").as_str().unwrap_or(name)))
}
