//! Superclass links, dispatch tables and interface method tables.

use crate::{
    hierarchy::pool::ClassPool,
    ir::{ClassId, HierarchyState, MethodSignature, VTableEntry, OBJECT_CLASS},
};

/// The methods every class inherits from the root object, in slot order.
pub const OBJECT_METHODS: [(&str, &str); 11] = [
    ("hashCode", "()I"),
    ("equals", "(Ljava/lang/Object;)Z"),
    ("clone", "()Ljava/lang/Object;"),
    ("getClass", "()Ljava/lang/Class;"),
    ("toString", "()Ljava/lang/String;"),
    ("finalize", "()V"),
    ("notify", "()V"),
    ("notifyAll", "()V"),
    ("wait", "()V"),
    ("wait", "(J)V"),
    ("wait", "(JI)V"),
];

/// The dispatch table every class directly below the root object starts from.
#[must_use]
pub fn baseline_vtable() -> Vec<VTableEntry> {
    OBJECT_METHODS
        .iter()
        .filter_map(|(name, descriptor)| MethodSignature::new(name, descriptor).ok())
        .map(|signature| VTableEntry {
            signature,
            owner: OBJECT_CLASS.to_string(),
            is_abstract: false,
        })
        .collect()
}

/// Outcome of resolving every class in a pool.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HierarchySummary {
    /// Classes with a usable hierarchy
    pub resolved: usize,
    /// Classes excluded because an ancestor is missing or unusable
    pub errored: Vec<String>,
}

/// Resolves every class of the pool.
///
/// Resolution never fails as a whole: a class whose superclass or interface is missing, or
/// depends on such a class, is marked [`HierarchyState::Errored`], logged and left out of
/// every later pass.
pub fn resolve_all(pool: &mut ClassPool) -> HierarchySummary {
    let ids: Vec<ClassId> = pool.ids().collect();
    for id in &ids {
        resolve_class(pool, *id);
    }

    let mut summary = HierarchySummary::default();
    for class in pool.iter() {
        match class.state {
            HierarchyState::Resolved => summary.resolved += 1,
            _ => summary.errored.push(class.name.clone()),
        }
    }
    log::info!(
        "resolved hierarchy of {} classes, {} excluded",
        summary.resolved,
        summary.errored.len()
    );
    summary
}

fn fail(pool: &mut ClassPool, id: ClassId, reason: &str) -> bool {
    let class = pool.class_mut(id);
    log::warn!("excluding {}: {}", class.name, reason);
    class.state = HierarchyState::Errored;
    false
}

/// Resolves a dependency of the class being resolved. `None` means "missing".
fn resolve_dependency(pool: &mut ClassPool, name: &str) -> Option<ClassId> {
    let id = pool.id(name)?;
    resolve_class(pool, id).then_some(id)
}

fn merge_entry(vtable: &mut Vec<VTableEntry>, entry: &VTableEntry) {
    match vtable
        .iter_mut()
        .find(|existing| existing.signature == entry.signature)
    {
        Some(existing) => {
            if existing.is_abstract && !entry.is_abstract {
                *existing = entry.clone();
            }
        }
        None => vtable.push(entry.clone()),
    }
}

/// Resolves one class, its ancestors first. Returns `true` if the class is usable.
pub(crate) fn resolve_class(pool: &mut ClassPool, id: ClassId) -> bool {
    match pool.class(id).state {
        HierarchyState::Resolved => return true,
        HierarchyState::Errored => return false,
        HierarchyState::Processing => {
            return fail(pool, id, "circular inheritance");
        }
        HierarchyState::Pending => {}
    }
    pool.class_mut(id).state = HierarchyState::Processing;

    let class = pool.class(id);
    let name = class.name.clone();
    let super_name = class.super_name.clone();
    let interfaces = class.interfaces.clone();

    let mut super_class = None;
    if let Some(super_name) = &super_name {
        match resolve_dependency(pool, super_name) {
            Some(super_id) => super_class = Some(super_id),
            None if super_name == OBJECT_CLASS && pool.id(OBJECT_CLASS).is_none() => {}
            None => return fail(pool, id, &format!("superclass {super_name} is unusable")),
        }
    }

    let mut interface_classes = Vec::with_capacity(interfaces.len());
    for interface in &interfaces {
        match resolve_dependency(pool, interface) {
            Some(interface_id) => interface_classes.push(interface_id),
            None => return fail(pool, id, &format!("interface {interface} is unusable")),
        }
    }

    let mut vtable = match (super_name.as_deref(), super_class) {
        (None, _) | (Some(OBJECT_CLASS), _) | (_, None) => baseline_vtable(),
        (_, Some(super_id)) => pool.class(super_id).vtable.clone(),
    };

    let mut interface_methods: Vec<MethodSignature> = Vec::new();
    for interface_id in &interface_classes {
        let interface = pool.class(*interface_id);
        for entry in &interface.vtable {
            merge_entry(&mut vtable, entry);
        }
        for signature in &interface.interface_methods {
            if !interface_methods.contains(signature) {
                interface_methods.push(signature.clone());
            }
        }
    }

    let class = pool.class(id);
    for method in class.methods.iter().filter(|method| method.is_virtual()) {
        let entry = VTableEntry {
            signature: method.signature.clone(),
            owner: name.clone(),
            is_abstract: method.is_abstract(),
        };
        match vtable
            .iter_mut()
            .find(|existing| existing.signature == entry.signature)
        {
            Some(existing) => *existing = entry,
            None => vtable.push(entry),
        }
    }

    if class.is_interface() {
        for method in class.methods.iter().filter(|method| method.is_virtual()) {
            if !interface_methods.contains(&method.signature) {
                interface_methods.push(method.signature.clone());
            }
        }
    } else {
        interface_methods.clear();
    }

    log::debug!("{}: {} vtable slots", name, vtable.len());
    let class = pool.class_mut(id);
    class.super_class = super_class;
    class.interface_classes = interface_classes;
    class.vtable = vtable;
    class.interface_methods = interface_methods;
    class.state = HierarchyState::Resolved;
    true
}
