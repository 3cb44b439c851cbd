//! The container owning every live object of one scene.
//!
//! Objects are stored in an arena and addressed by generational
//! [`ObjectHandle`]s. A composite object occupies one slot for its base and
//! one for each aspect; the slots are linked through their [`ObjectHeader`]s.

mod cast;
mod persist;

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::attribute::AttributeError;
use crate::class::{Reflect, StructuredType};
use crate::composite::{CompositeError, CompositeType};
use crate::document::NodeKind;
use crate::object::{AsAny, Object, ObjectHandle, ObjectHeader, ObjectRef, ObjectType};
use crate::registry::TypeRegistry;
use crate::template::{NoTemplates, TemplateSource};
use crate::variant::Variant;

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("object must be a map, found {0:?} node")]
    NotAMap(NodeKind),
    #[error("object has no `class`")]
    MissingClass,
    #[error("unknown class `{0}`")]
    UnknownClass(String),
    #[error(transparent)]
    Composite(#[from] CompositeError),
    #[error("handle does not refer to a live object")]
    StaleHandle,
    #[error("document has no `objects` array")]
    MissingObjects,
}

struct Entry {
    header: ObjectHeader,
    // `None` while the object is lent out to its own initializer
    body: Option<Box<dyn Object>>,
}

fn any(object: &dyn Object) -> &dyn Any {
    object.as_any()
}

fn any_mut(object: &mut dyn Object) -> &mut dyn Any {
    object.as_any_mut()
}

pub struct Universe<'r> {
    registry: &'r TypeRegistry,
    generation: u32,
    entries: Vec<Entry>,
    roots: Vec<ObjectHandle>,
    ids: HashMap<ObjectHandle, String>,
    names: HashMap<String, ObjectHandle>,
    /// Synthesized composites by signature.
    composites: HashMap<String, Rc<CompositeType>>,
    /// Composites documents may name in their `class` key.
    defined: HashMap<String, Rc<CompositeType>>,
    templates: Box<dyn TemplateSource + 'r>,
}

impl<'r> Universe<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Universe {
            registry,
            generation: 0,
            entries: Vec::new(),
            roots: Vec::new(),
            ids: HashMap::new(),
            names: HashMap::new(),
            composites: HashMap::new(),
            defined: HashMap::new(),
            templates: Box::new(NoTemplates),
        }
    }

    /// Where `template` keys are looked up during deserialization.
    pub fn with_templates(mut self, templates: impl TemplateSource + 'r) -> Self {
        self.templates = Box::new(templates);
        self
    }

    pub fn registry(&self) -> &'r TypeRegistry {
        self.registry
    }

    /// Makes a frozen composite available under its name, so documents can
    /// use it as their `class`.
    pub fn define_composite(&mut self, composite: CompositeType) -> Result<Rc<CompositeType>, UniverseError> {
        if !composite.is_frozen() {
            return Err(CompositeError::NotFrozen.into());
        }
        let name = composite.name().to_owned();
        let composite = Rc::new(composite);
        if self.defined.insert(name.clone(), composite.clone()).is_some() {
            warn!("composite `{name}` redefined");
        }
        Ok(composite)
    }

    fn entry(&self, handle: ObjectHandle) -> Option<&Entry> {
        if handle.generation != self.generation {
            return None;
        }
        self.entries.get(handle.index as usize)
    }

    fn entry_mut(&mut self, handle: ObjectHandle) -> Option<&mut Entry> {
        if handle.generation != self.generation {
            return None;
        }
        self.entries.get_mut(handle.index as usize)
    }

    fn handle(&self, index: usize) -> ObjectHandle {
        let index = u32::try_from(index).unwrap_or_else(|_| panic!("universe exhausted at {index} objects"));
        ObjectHandle {
            index,
            generation: self.generation,
        }
    }

    /// Builds an object of type `ty` and names it after `desired_id`, made
    /// unique if needed.
    pub fn create_object(&mut self, ty: impl Into<ObjectType>, desired_id: &str) -> Result<ObjectHandle, UniverseError> {
        let ty = ty.into();
        if !ty.is_frozen() {
            return Err(CompositeError::NotFrozen.into());
        }
        let handle = self.construct(ty, None, 0, 0);
        self.roots.push(handle);
        self.rename_object(handle, desired_id);
        debug!("created {:?} `{}` ({handle:?})", self.entries[handle.index as usize].header.ty, self.get_id(handle));
        Ok(handle)
    }

    // The base first, then each aspect in order, depth first.
    fn construct(&mut self, ty: ObjectType, parent: Option<ObjectHandle>, aspect_index: usize, offset: usize) -> ObjectHandle {
        let handle = self.handle(self.entries.len());
        let body = ty.base_class().construct();
        let composite = ty.as_composite().cloned();
        self.entries.push(Entry {
            header: ObjectHeader {
                ty,
                parent,
                aspect_index,
                offset,
                aspects: Vec::new(),
            },
            body: Some(body),
        });
        if let Some(composite) = composite {
            for (i, aspect) in composite.aspects().iter().enumerate() {
                let offset = composite.aspect_offset(i).unwrap_or_default();
                let child = self.construct(aspect.clone(), Some(handle), i, offset);
                self.entries[handle.index as usize].header.aspects.push(child);
            }
        }
        handle
    }

    /// Gives the object the id `id`. When that id is taken or shorter than
    /// two characters a fresh one is made up, and `false` is returned.
    pub fn rename_object(&mut self, handle: ObjectHandle, id: &str) -> bool {
        let Some(entry) = self.entry(handle) else {
            return false;
        };
        let type_name = entry.header.ty.name().to_owned();
        if let Some(old) = self.ids.remove(&handle) {
            self.names.remove(&old);
        }
        let honoured = id.chars().count() >= 2 && !self.names.contains_key(id);
        let name = if honoured {
            id.to_owned()
        } else {
            let name = self.unique_name(id, &type_name);
            if !id.is_empty() {
                warn!("object id `{id}` is unavailable, using `{name}`");
            }
            name
        };
        self.names.insert(name.clone(), handle);
        self.ids.insert(handle, name);
        honoured
    }

    fn unique_name(&self, requested: &str, type_name: &str) -> String {
        let stem = requested.trim_end_matches(|c: char| c.is_ascii_digit());
        let (prefix, mut number) = match requested[stem.len()..].parse::<u64>() {
            Ok(number) => (stem, number),
            Err(_) => (requested, 1),
        };
        let mut base = (if prefix.chars().count() >= 2 { prefix } else { type_name }).to_owned();
        loop {
            if let Some(name) = self.first_free(&base, number) {
                return name;
            }
            // the counter ran out
            base.push('_');
            number = 1;
        }
    }

    fn first_free(&self, base: &str, mut number: u64) -> Option<String> {
        loop {
            let name = format!("{base}{number:02}");
            if !self.names.contains_key(&name) {
                return Some(name);
            }
            number = number.checked_add(1)?;
        }
    }

    pub fn get_object(&self, id: &str) -> Option<ObjectHandle> {
        self.names.get(id).copied()
    }

    /// The id of `handle`, or `""` for aspects and stale handles.
    pub fn get_id(&self, handle: ObjectHandle) -> &str {
        self.ids.get(&handle).map_or("", String::as_str)
    }

    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.entry(handle).is_some()
    }

    pub fn header(&self, handle: ObjectHandle) -> Option<&ObjectHeader> {
        self.entry(handle).map(|entry| &entry.header)
    }

    /// The composite `handle` is an aspect of.
    pub fn find_parent(&self, handle: ObjectHandle) -> Option<ObjectHandle> {
        self.header(handle)?.parent
    }

    pub fn aspects(&self, handle: ObjectHandle) -> &[ObjectHandle] {
        self.header(handle).map_or(&[], |header| &header.aspects)
    }

    pub fn object(&self, handle: ObjectHandle) -> Option<&dyn Object> {
        self.entry(handle)?.body.as_deref()
    }

    pub fn object_mut(&mut self, handle: ObjectHandle) -> Option<&mut dyn Object> {
        let body: &mut dyn Object = self.entry_mut(handle)?.body.as_deref_mut()?;
        Some(body)
    }

    /// The object as a `T`, or one of `T`'s subclasses. Aspects are not
    /// searched; see [`cast`](Self::cast) for that.
    pub fn get<T: Reflect>(&self, handle: ObjectHandle) -> Option<&T> {
        let class = self.registry.class_of::<T>()?;
        let entry = self.entry(handle)?;
        let body = entry.body.as_deref()?;
        entry
            .header
            .ty
            .base_class()
            .upcast(any(body), class)?
            .downcast_ref::<T>()
    }

    pub fn get_mut<T: Reflect>(&mut self, handle: ObjectHandle) -> Option<&mut T> {
        let class = self.registry.class_of::<T>()?;
        let entry = self.entry_mut(handle)?;
        let base = entry.header.ty.base_class();
        let body = entry.body.as_deref_mut()?;
        base.upcast_mut(any_mut(body), class)?.downcast_mut::<T>()
    }

    /// Number of top-level objects.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Top-level objects in creation order.
    pub fn iter(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.roots.iter().copied()
    }

    /// Reads attribute `name`, falling back to the attributes a composite
    /// exposes from its aspects.
    pub fn get_attribute(&self, handle: ObjectHandle, name: &str) -> Result<Variant, AttributeError> {
        let entry = self.entry(handle).ok_or(AttributeError::Stale)?;
        let body = entry.body.as_deref().ok_or(AttributeError::Stale)?;
        match entry.header.ty.base_class().get_attribute(any(body), name) {
            Err(AttributeError::Missing(_)) => {
                let exposed = entry
                    .header
                    .ty
                    .as_composite()
                    .and_then(|composite| composite.find_exposed_attribute(name));
                match exposed {
                    Some(exposed) => exposed.get(self, handle),
                    None => Err(AttributeError::Missing(name.to_owned())),
                }
            }
            result => result,
        }
    }

    pub fn set_attribute(&mut self, handle: ObjectHandle, name: &str, value: &Variant) -> Result<(), AttributeError> {
        let entry = self.entry_mut(handle).ok_or(AttributeError::Stale)?;
        let class = entry.header.ty.base_class();
        let composite = entry.header.ty.as_composite().cloned();
        let body = entry.body.as_deref_mut().ok_or(AttributeError::Stale)?;
        trace!("{handle:?}.{name} = {value:?}");
        match class.set_attribute(any_mut(body), name, value) {
            Err(AttributeError::Missing(_)) => {
                match composite.as_ref().and_then(|composite| composite.find_exposed_attribute(name)) {
                    Some(exposed) => exposed.set(self, handle, value),
                    None => Err(AttributeError::Missing(name.to_owned())),
                }
            }
            result => result,
        }
    }

    /// Calls slot `name`, including slots exposed by a composite. Failures
    /// are logged and reported as `false`.
    pub fn invoke(&mut self, handle: ObjectHandle, name: &str, args: &[Variant]) -> bool {
        let Some(entry) = self.entry_mut(handle) else {
            warn!("slot `{name}` called on stale handle {handle:?}");
            return false;
        };
        let class = entry.header.ty.base_class();
        if class.find_slot(name).is_none() {
            let exposed = entry
                .header
                .ty
                .as_composite()
                .and_then(|composite| composite.find_exposed_slot(name))
                .cloned();
            return match exposed {
                Some(exposed) => exposed.invoke(self, handle, args),
                None => {
                    warn!("`{}` has no slot `{name}`", entry.header.ty.name());
                    false
                }
            };
        }
        match entry.body.as_deref_mut() {
            Some(body) => class.invoke(any_mut(body), name, args),
            None => {
                warn!("slot `{name}` called on {handle:?} during its own initialization");
                false
            }
        }
    }

    /// Points every [`ObjectRef`] attribute at the object carrying its id.
    /// Returns how many references could not be resolved.
    pub fn link(&mut self) -> usize {
        let mut resolved = Vec::new();
        let mut unresolved = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            let Some(body) = entry.body.as_deref() else {
                continue;
            };
            let class = entry.header.ty.base_class();
            for (owner, attribute) in class.all_attributes() {
                if !attribute.value_type().is::<ObjectRef>() || !attribute.is_readable() || !attribute.is_writable() {
                    continue;
                }
                let reference = class
                    .upcast(any(body), owner)
                    .and_then(|receiver| attribute.get(receiver).ok())
                    .and_then(|value| value.into_inner::<ObjectRef>().ok());
                let Some(mut reference) = reference else {
                    continue;
                };
                if reference.is_null() {
                    continue;
                }
                let target = self.get_object(reference.id());
                if target.is_none() {
                    warn!(
                        "{}.{} refers to unknown object `{}`",
                        class.name(),
                        attribute.name(),
                        reference.id()
                    );
                    unresolved += 1;
                }
                reference.bind(target);
                resolved.push((index, owner, attribute, reference));
            }
        }

        for (index, owner, attribute, reference) in resolved {
            let entry = &mut self.entries[index];
            let class = entry.header.ty.base_class();
            let Some(body) = entry.body.as_deref_mut() else {
                continue;
            };
            let result = match class.upcast_mut(any_mut(body), owner) {
                Some(receiver) => attribute.set(receiver, &Variant::new(reference)),
                None => Err(AttributeError::Receiver {
                    name: attribute.name().to_owned(),
                }),
            };
            if let Err(err) = result {
                warn!("linking {}: {err}", class.name());
            }
        }
        unresolved
    }

    /// Calls [`Object::initialize`] on every object, bases before their
    /// aspects.
    pub fn run_initializers(&mut self) {
        for index in 0..self.entries.len() {
            let Some(mut body) = self.entries[index].body.take() else {
                continue;
            };
            let handle = self.handle(index);
            body.initialize(self, handle);
            self.entries[index].body = Some(body);
        }
    }

    /// Advances every object whose type asked for updates.
    pub fn update(&mut self, dt: f64) {
        for entry in &mut self.entries {
            if !entry.header.ty.structured().wants_update() {
                continue;
            }
            if let Some(body) = entry.body.as_deref_mut() {
                body.update(dt);
            }
        }
    }

    /// Destroys every object. Handles handed out so far go stale.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            debug!("destroying {} objects", self.entries.len());
        }
        for root in std::mem::take(&mut self.roots) {
            self.destroy(root.index as usize);
        }
        self.entries.clear();
        self.ids.clear();
        self.names.clear();
        self.generation = self.generation.wrapping_add(1);
    }

    // TODO: aspects are torn down in construction order; decide whether they
    // should go last-built-first instead.
    fn destroy(&mut self, index: usize) {
        let aspects = std::mem::take(&mut self.entries[index].header.aspects);
        for aspect in aspects {
            self.destroy(aspect.index as usize);
        }
        self.entries[index].body = None;
    }
}

impl Drop for Universe<'_> {
    fn drop(&mut self) {
        self.clear();
    }
}
