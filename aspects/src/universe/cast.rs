//! Navigation between the parts of composite objects.

use std::any::Any;

use crate::class::{ClassType, Reflect};
use crate::object::ObjectHandle;

use super::{Universe, any, any_mut};

impl Universe<'_> {
    /// Finds the part of the object graph around `from` that is a `target`.
    ///
    /// `from` itself is tried first. Then its aspects: direct ones breadth
    /// first, then into nested composites. Then the enclosing composites,
    /// each tested itself before its other aspects, until the top level is
    /// reached.
    pub fn aspect_cast(&self, from: ObjectHandle, target: &ClassType) -> Option<ObjectHandle> {
        let header = self.header(from)?;
        if header.ty.is_a(target) {
            return Some(from);
        }

        // every object is visited at most once in a well formed graph
        let mut budget = self.entries.len();
        if let Some(found) = self.search_aspects(from, None, target, &mut budget) {
            return Some(found);
        }

        let mut current = from;
        while let Some(parent) = self.header(current)?.parent {
            if !spend(&mut budget) {
                return None;
            }
            if self.header(parent)?.ty.is_a(target) {
                return Some(parent);
            }
            if let Some(found) = self.search_aspects(parent, Some(current), target, &mut budget) {
                return Some(found);
            }
            current = parent;
        }
        None
    }

    fn search_aspects(
        &self,
        composite: ObjectHandle,
        skip: Option<ObjectHandle>,
        target: &ClassType,
        budget: &mut usize,
    ) -> Option<ObjectHandle> {
        let aspects = self.aspects(composite);
        for &aspect in aspects {
            if Some(aspect) == skip {
                continue;
            }
            if !spend(budget) {
                return None;
            }
            if self.header(aspect).is_some_and(|header| header.ty.is_a(target)) {
                return Some(aspect);
            }
        }
        for &aspect in aspects {
            if Some(aspect) == skip || self.aspects(aspect).is_empty() {
                continue;
            }
            if let Some(found) = self.search_aspects(aspect, None, target, budget) {
                return Some(found);
            }
        }
        None
    }

    /// The `T` reachable from `from` through [`aspect_cast`](Self::aspect_cast).
    pub fn cast<T: Reflect>(&self, from: ObjectHandle) -> Option<&T> {
        let class = self.registry.class_of::<T>()?;
        let found = self.aspect_cast(from, class)?;
        self.get::<T>(found)
    }

    pub fn cast_mut<T: Reflect>(&mut self, from: ObjectHandle) -> Option<&mut T> {
        let class = self.registry.class_of::<T>()?;
        let found = self.aspect_cast(from, class)?;
        self.get_mut::<T>(found)
    }

    /// Like [`cast`](Self::cast), for a class only known at run time.
    pub fn cast_any(&self, from: ObjectHandle, target: &ClassType) -> Option<&dyn Any> {
        let found = self.aspect_cast(from, target)?;
        let entry = self.entry(found)?;
        let body = entry.body.as_deref()?;
        entry.header.ty.base_class().upcast(any(body), target)
    }

    pub fn cast_any_mut(&mut self, from: ObjectHandle, target: &ClassType) -> Option<&mut dyn Any> {
        let found = self.aspect_cast(from, target)?;
        let entry = self.entry_mut(found)?;
        let base = entry.header.ty.base_class();
        let body = entry.body.as_deref_mut()?;
        base.upcast_mut(any_mut(body), target)
    }
}

fn spend(budget: &mut usize) -> bool {
    if *budget == 0 {
        return false;
    }
    *budget -= 1;
    true
}
