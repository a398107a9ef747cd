//! Mark phase model of the runtime collector.
//!
//! Generated mark functions recurse into reference fields with a depth counter. Past the
//! depth cap an object is handed to `markDeepObject` instead of being visited, which bounds
//! the native stack. This module reproduces that scheme over the emulated heap and drains the
//! deferred objects iteratively: every deferred object is visited again from depth zero,
//! which may defer further objects, until a round defers nothing.
//!
//! [`reachable`] computes plain reachability so tests can check that the depth-capped
//! marking never leaves a reachable object unmarked.

use std::collections::VecDeque;

use crate::{
    emulation::value::{HeapRef, ManagedHeap},
    hierarchy::ClassPool,
    Result,
};

/// Depth cap used when none is configured.
pub const DEFAULT_MAX_MARK_DEPTH: usize = 64;

/// Result of a mark phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marking {
    marks: Vec<bool>,
    /// Objects handed to the deferred list
    pub deferred: usize,
    /// Drain rounds after the initial pass
    pub rounds: usize,
}

impl Marking {
    /// `true` if the object was marked.
    #[must_use]
    pub fn is_marked(&self, object: HeapRef) -> bool {
        self.marks.get(object.index()).copied().unwrap_or(false)
    }

    /// Number of marked objects.
    #[must_use]
    pub fn marked(&self) -> usize {
        self.marks.iter().filter(|mark| **mark).count()
    }

    /// Objects a sweep would reclaim.
    #[must_use]
    pub fn unmarked(&self, heap: &ManagedHeap) -> Vec<HeapRef> {
        heap.iter()
            .map(|(object, _)| object)
            .filter(|object| !self.is_marked(*object))
            .collect()
    }
}

/// References of `object` that the collector traces. Weak fields are skipped.
fn traced_children(heap: &ManagedHeap, pool: Option<&ClassPool>, object: HeapRef) -> Result<Vec<HeapRef>> {
    Ok(heap
        .references(object)?
        .into_iter()
        .filter(|(field, _)| match (field, pool) {
            (Some((owner, name)), Some(pool)) => pool
                .get(owner)
                .and_then(|class| class.find_field(name))
                .map_or(true, |field| field.is_traced()),
            _ => true,
        })
        .map(|(_, child)| child)
        .collect())
}

struct Marker<'a> {
    heap: &'a ManagedHeap,
    pool: Option<&'a ClassPool>,
    max_depth: usize,
    marks: Vec<bool>,
    deep: Vec<HeapRef>,
    deferred: usize,
}

impl Marker<'_> {
    fn mark(&mut self, object: HeapRef, depth: usize) -> Result<()> {
        if self.marks[object.index()] {
            return Ok(());
        }
        if depth > self.max_depth {
            self.deep.push(object);
            self.deferred += 1;
            return Ok(());
        }
        self.marks[object.index()] = true;
        for child in traced_children(self.heap, self.pool, object)? {
            self.mark(child, depth + 1)?;
        }
        Ok(())
    }
}

/// Marks everything reachable from `roots`, recursing at most `max_depth` levels at a time.
///
/// # Errors
/// Returns [`crate::Error::Emulation`] if a root or field refers to a dangling object.
pub fn mark(
    heap: &ManagedHeap,
    pool: Option<&ClassPool>,
    roots: &[HeapRef],
    max_depth: usize,
) -> Result<Marking> {
    let mut marker = Marker {
        heap,
        pool,
        max_depth,
        marks: vec![false; heap.len()],
        deep: Vec::new(),
        deferred: 0,
    };
    for root in roots {
        heap.get(*root)?;
        marker.mark(*root, 0)?;
    }

    let mut rounds = 0;
    while !marker.deep.is_empty() {
        rounds += 1;
        let pending = std::mem::take(&mut marker.deep);
        for object in pending {
            marker.mark(object, 0)?;
        }
    }
    log::trace!(
        "marked {} of {} objects, {} deferred over {} rounds",
        marker.marks.iter().filter(|mark| **mark).count(),
        heap.len(),
        marker.deferred,
        rounds
    );

    Ok(Marking {
        marks: marker.marks,
        deferred: marker.deferred,
        rounds,
    })
}

/// Objects reachable from `roots` through traced references, by breadth-first search.
///
/// # Errors
/// Returns [`crate::Error::Emulation`] for dangling references.
pub fn reachable(heap: &ManagedHeap, pool: Option<&ClassPool>, roots: &[HeapRef]) -> Result<Vec<HeapRef>> {
    let mut seen = vec![false; heap.len()];
    let mut queue: VecDeque<HeapRef> = roots.iter().copied().collect();
    let mut found = Vec::new();
    while let Some(object) = queue.pop_front() {
        if std::mem::replace(&mut seen[object.index()], true) {
            continue;
        }
        found.push(object);
        queue.extend(traced_children(heap, pool, object)?);
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        emulation::value::EmValue,
        ir::{AccessFlags, ClassDescriptor, FieldDescriptor, JavaType, TypeKind, OBJECT_CLASS},
    };

    const NODE: &str = "pkg/Node";

    fn node(heap: &mut ManagedHeap) -> HeapRef {
        heap.alloc_instance(
            NODE,
            [(NODE, "next", TypeKind::Object), (NODE, "cache", TypeKind::Object)],
        )
    }

    fn link(heap: &mut ManagedHeap, from: HeapRef, field: &str, to: HeapRef) {
        heap.set_field(from, NODE, field, EmValue::Ref(Some(to))).unwrap();
    }

    fn pool_with_weak_cache() -> ClassPool {
        let mut class = ClassDescriptor::new(NODE, Some(OBJECT_CLASS), AccessFlags::PUBLIC);
        for (name, weak) in [("next", false), ("cache", true)] {
            class.fields.push(FieldDescriptor {
                name: name.to_string(),
                ty: JavaType::Class(NODE.to_string()),
                access: AccessFlags::PRIVATE,
                constant: None,
                annotations: Vec::new(),
                weak,
            });
        }
        let mut pool = ClassPool::new();
        pool.insert(class);
        pool
    }

    #[test]
    fn test_long_chain_is_fully_marked() {
        let mut heap = ManagedHeap::new();
        let head = node(&mut heap);
        let mut tail = head;
        for _ in 0..5000 {
            let next = node(&mut heap);
            link(&mut heap, tail, "next", next);
            tail = next;
        }
        let garbage = node(&mut heap);

        let marking = mark(&heap, None, &[head], 8).unwrap();
        assert_eq!(marking.marked(), 5001);
        assert!(marking.rounds > 1);
        assert!(marking.deferred > 0);
        assert_eq!(marking.unmarked(&heap), vec![garbage]);
        assert_eq!(reachable(&heap, None, &[head]).unwrap().len(), 5001);
    }

    #[test]
    fn test_deep_tree_matches_reachability() {
        // a binary tree of depth 12 plus a back edge to the root
        let mut heap = ManagedHeap::new();
        let root = node(&mut heap);
        let mut level = vec![root];
        for _ in 0..12 {
            let mut next_level = Vec::new();
            for parent in level {
                let left = node(&mut heap);
                let right = node(&mut heap);
                link(&mut heap, parent, "next", left);
                link(&mut heap, parent, "cache", right);
                next_level.extend([left, right]);
            }
            level = next_level;
        }
        link(&mut heap, level[0], "next", root);

        for depth in [0, 3, DEFAULT_MAX_MARK_DEPTH] {
            let marking = mark(&heap, None, &[root], depth).unwrap();
            let expected = reachable(&heap, None, &[root]).unwrap();
            assert_eq!(marking.marked(), expected.len());
            assert!(expected.iter().all(|object| marking.is_marked(*object)));
        }
    }

    #[test]
    fn test_weak_fields_are_not_traced() {
        let pool = pool_with_weak_cache();
        let mut heap = ManagedHeap::new();
        let root = node(&mut heap);
        let strong = node(&mut heap);
        let weak = node(&mut heap);
        link(&mut heap, root, "next", strong);
        link(&mut heap, root, "cache", weak);

        let marking = mark(&heap, Some(&pool), &[root], DEFAULT_MAX_MARK_DEPTH).unwrap();
        assert!(marking.is_marked(strong));
        assert!(!marking.is_marked(weak));
        // without class information every reference is strong
        assert!(mark(&heap, None, &[root], 1).unwrap().is_marked(weak));
    }

    #[test]
    fn test_array_elements_are_traced() {
        let mut heap = ManagedHeap::new();
        let array = heap.alloc_array(JavaType::object(), 2);
        let element = node(&mut heap);
        if let crate::emulation::value::ObjectBody::Array { elements, .. } =
            &mut heap.get_mut(array).unwrap().body
        {
            elements[1] = EmValue::Ref(Some(element));
        }
        let marking = mark(&heap, None, &[array], 0).unwrap();
        assert!(marking.is_marked(element));
        assert_eq!(marking.rounds, 1);
    }
}
