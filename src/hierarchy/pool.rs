//! The class pool, the single owner of every parsed class.

use rustc_hash::FxHashMap;

use crate::ir::{ClassDescriptor, ClassId, HierarchyState};

/// Arena of classes addressed by [`ClassId`], with a name index.
///
/// Classes are inserted during parsing and never removed; the first class inserted under a
/// name wins, later duplicates are rejected. Passes address classes by id so they can hold
/// references across mutations of other classes.
#[derive(Debug, Default)]
pub struct ClassPool {
    classes: Vec<ClassDescriptor>,
    index: FxHashMap<String, ClassId>,
}

impl ClassPool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a class. Returns `None` if a class of the same name is already present.
    pub fn insert(&mut self, class: ClassDescriptor) -> Option<ClassId> {
        if self.index.contains_key(&class.name) {
            log::debug!("ignoring duplicate class {}", class.name);
            return None;
        }
        let id = ClassId(self.classes.len());
        self.index.insert(class.name.clone(), id);
        self.classes.push(class);
        Some(id)
    }

    /// Number of classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// `true` if the pool holds no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Id of the class named `name`.
    #[must_use]
    pub fn id(&self, name: &str) -> Option<ClassId> {
        self.index.get(name).copied()
    }

    /// The class named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ClassDescriptor> {
        self.id(name).map(|id| self.class(id))
    }

    /// The class named `name`, if its hierarchy resolved successfully.
    #[must_use]
    pub fn resolved(&self, name: &str) -> Option<&ClassDescriptor> {
        self.get(name)
            .filter(|class| class.state == HierarchyState::Resolved)
    }

    /// The class with the given id. Ids are only handed out by this pool.
    #[must_use]
    pub fn class(&self, id: ClassId) -> &ClassDescriptor {
        &self.classes[id.0]
    }

    /// Mutable access to the class with the given id.
    pub fn class_mut(&mut self, id: ClassId) -> &mut ClassDescriptor {
        &mut self.classes[id.0]
    }

    /// Every id, in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = ClassId> {
        (0..self.classes.len()).map(ClassId)
    }

    /// Every class, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ClassDescriptor> {
        self.classes.iter()
    }

    /// Every class, mutably, in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClassDescriptor> {
        self.classes.iter_mut()
    }

    /// The class and its resolved superclasses, nearest first.
    pub fn super_chain(&self, name: &str) -> impl Iterator<Item = &ClassDescriptor> {
        let mut next = self.get(name);
        std::iter::from_fn(move || {
            let current = next?;
            next = current
                .super_name
                .as_deref()
                .and_then(|super_name| self.get(super_name));
            Some(current)
        })
    }

    /// Every interface the class implements, directly or through superclasses and
    /// superinterfaces, in first-seen order.
    #[must_use]
    pub fn all_interfaces(&self, name: &str) -> Vec<String> {
        let mut seen = Vec::new();
        let mut queue: std::collections::VecDeque<String> = self
            .super_chain(name)
            .flat_map(|class| class.interfaces.iter().cloned())
            .collect();
        while let Some(interface) = queue.pop_front() {
            if seen.contains(&interface) {
                continue;
            }
            if let Some(class) = self.get(&interface) {
                queue.extend(class.interfaces.iter().cloned());
            }
            seen.push(interface);
        }
        seen
    }

    /// `true` if `name` is `ancestor` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        if name == ancestor || ancestor == crate::ir::OBJECT_CLASS {
            return true;
        }
        self.super_chain(name).any(|class| class.name == ancestor)
            || self.all_interfaces(name).iter().any(|interface| interface == ancestor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AccessFlags, OBJECT_CLASS};

    fn class(name: &str, super_name: &str, interfaces: &[&str]) -> ClassDescriptor {
        let mut class = ClassDescriptor::new(name, Some(super_name), AccessFlags::PUBLIC);
        class.interfaces = interfaces.iter().map(|i| i.to_string()).collect();
        class
    }

    #[test]
    fn test_first_insert_wins() {
        let mut pool = ClassPool::new();
        let first = pool.insert(class("pkg/A", OBJECT_CLASS, &[])).unwrap();
        assert!(pool.insert(class("pkg/A", "pkg/B", &[])).is_none());
        assert_eq!(pool.id("pkg/A"), Some(first));
        assert_eq!(pool.get("pkg/A").unwrap().super_name.as_deref(), Some(OBJECT_CLASS));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_chain_and_interfaces() {
        let mut pool = ClassPool::new();
        pool.insert(class("pkg/I", OBJECT_CLASS, &[]));
        pool.insert(class("pkg/J", OBJECT_CLASS, &["pkg/I"]));
        pool.insert(class("pkg/A", OBJECT_CLASS, &["pkg/J"]));
        pool.insert(class("pkg/B", "pkg/A", &["pkg/I"]));

        let chain: Vec<&str> = pool.super_chain("pkg/B").map(|c| c.name.as_str()).collect();
        assert_eq!(chain, vec!["pkg/B", "pkg/A"]);
        assert_eq!(pool.all_interfaces("pkg/B"), vec!["pkg/I", "pkg/J"]);
        assert!(pool.is_subclass_of("pkg/B", "pkg/J"));
        assert!(!pool.is_subclass_of("pkg/A", "pkg/B"));
    }
}
