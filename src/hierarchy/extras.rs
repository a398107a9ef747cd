//! Configuration driven class adjustments: intrinsics, weak fields, annotation defaults and
//! reflection flags.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::{
    hierarchy::pool::ClassPool,
    ir::{names::sanitize_name, Annotation, AnnotationValue},
};

/// Splits `Class.member` at the last `.` before `stop`, sanitizing the class part.
fn split_member(entry: &str, stop: Option<char>) -> Option<(String, &str)> {
    let head = match stop {
        Some(stop) => &entry[..entry.find(stop)?],
        None => entry,
    };
    let dot = head.rfind('.')?;
    if dot == 0 || dot + 1 == head.len() {
        return None;
    }
    Some((sanitize_name(&entry[..dot]), &entry[dot + 1..]))
}

/// Marks every method named by an `owner.name(descriptor)` entry as intrinsic.
///
/// Intrinsic methods are emitted as declarations only; their bodies come from the runtime.
/// Invalid or unmatched entries are logged and ignored. Returns the classes owning at least
/// one intrinsic, which the dependency collector treats as roots.
pub fn apply_intrinsics(pool: &mut ClassPool, entries: &[String]) -> BTreeSet<String> {
    let mut owners = BTreeSet::new();
    for entry in entries {
        let Some((class, member)) = split_member(entry, Some('(')) else {
            log::warn!("invalid intrinsic {entry}");
            continue;
        };
        let Some(paren) = member.find('(') else {
            log::warn!("invalid intrinsic {entry}");
            continue;
        };
        let (name, descriptor) = member.split_at(paren);

        let method = pool.id(&class).and_then(|id| {
            pool.class_mut(id)
                .methods
                .iter_mut()
                .find(|method| {
                    method.signature.name() == name && method.signature.descriptor() == descriptor
                })
        });
        match method {
            Some(method) => {
                method.intrinsic = true;
                owners.insert(class);
            }
            None => log::warn!("intrinsic {entry} does not match any method"),
        }
    }
    owners
}

/// Marks every field named by an `owner.field` entry as a weak reference.
///
/// Unmatched entries are logged and ignored. Returns the number of fields marked.
pub fn apply_weak_fields(pool: &mut ClassPool, entries: &[String]) -> usize {
    let mut marked = 0;
    for entry in entries {
        let Some((class, name)) = split_member(entry, None) else {
            log::warn!("invalid weak field {entry}");
            continue;
        };
        let field = pool.id(&class).and_then(|id| {
            pool.class_mut(id)
                .fields
                .iter_mut()
                .find(|field| field.name == name)
        });
        match field {
            Some(field) if field.ty.is_reference() => {
                field.weak = true;
                marked += 1;
            }
            Some(_) => log::warn!("weak field {entry} is not a reference"),
            None => log::warn!("weak field {entry} does not match any field"),
        }
    }
    marked
}

/// Completes every annotation in the pool with the default values of its annotation type.
///
/// Defaults are taken from the `AnnotationDefault` attributes of annotation classes present in
/// the pool. Annotations of types outside the pool keep the values they were given.
pub fn apply_annotation_defaults(pool: &mut ClassPool) {
    let mut defaults: FxHashMap<String, Vec<(String, AnnotationValue)>> = FxHashMap::default();
    for class in pool.iter().filter(|class| class.is_annotation()) {
        let members = class
            .methods
            .iter()
            .filter_map(|method| {
                method
                    .annotation_default
                    .clone()
                    .map(|value| (method.signature.name().to_string(), value))
            })
            .collect::<Vec<_>>();
        if !members.is_empty() {
            defaults.insert(class.name.clone(), members);
        }
    }
    if defaults.is_empty() {
        return;
    }

    let lookup = |ty: &str| defaults.get(ty).cloned().unwrap_or_default();
    let complete = |annotations: &mut Vec<Annotation>| {
        for annotation in annotations {
            annotation.apply_defaults(&lookup);
        }
    };
    for class in pool.iter_mut() {
        complete(&mut class.annotations);
        for field in &mut class.fields {
            complete(&mut field.annotations);
        }
        for method in &mut class.methods {
            complete(&mut method.annotations);
        }
    }
}

/// Flags classes that keep reflection metadata: enums, annotations and every class accepted
/// by `matches`. Returns the number of reflective classes.
pub fn mark_reflective<F>(pool: &mut ClassPool, matches: F) -> usize
where
    F: Fn(&str) -> bool,
{
    let mut count = 0;
    for class in pool.iter_mut() {
        class.reflective = class.is_enum() || class.is_annotation() || matches(&class.name);
        if class.reflective {
            count += 1;
        }
    }
    count
}
