//! Dependency edges and the closure over them.

use std::collections::{BTreeSet, VecDeque};

use crate::{
    classfile::synthetic::ANNOTATION_IMPL_SUFFIX,
    dependencies::patterns::ClassPatterns,
    hierarchy::ClassPool,
    ir::{
        names::sanitize_name, Annotation, AnnotationValue, ClassDescriptor, Constant, Dispatch,
        HierarchyState, InstructionKind, JavaType, MethodDescriptor, MethodSignature,
        OBJECT_CLASS, STRING_CLASS,
    },
    Error, Result,
};

/// Classes the native runtime refers to directly. They are retained whatever the program
/// references.
pub const RUNTIME_CLASSES: &[&str] = &[
    "java/lang/ArithmeticException",
    "java/lang/reflect/Array",
    "java/lang/Boolean",
    "java/nio/Buffer",
    "java/lang/Byte",
    "java/lang/Character",
    "java/lang/Class",
    "java/lang/ClassCastException",
    "java/lang/ClassNotFoundException",
    "java/lang/reflect/Constructor",
    "java/lang/reflect/InvocationTargetException",
    "java/lang/Double",
    "java/lang/Enum",
    "java/lang/ExceptionInInitializerError",
    "java/lang/reflect/Field",
    "java/lang/Float",
    "java/lang/IllegalMonitorStateException",
    "java/lang/IndexOutOfBoundsException",
    "java/lang/Integer",
    "java/lang/InterruptedException",
    "java/lang/Long",
    "java/lang/Math",
    "java/lang/NegativeArraySizeException",
    "java/lang/NoSuchMethodError",
    "java/lang/NullPointerException",
    "java/lang/OutOfMemoryError",
    "java/lang/reflect/Method",
    "java/lang/Runtime",
    "java/lang/Short",
    "java/lang/StackOverflowError",
    "java/lang/String",
    "java/lang/StringBuilder",
    "java/lang/System",
    "java/lang/Thread",
    "java/lang/Thread$UncaughtExceptionHandler",
    "java/lang/Throwable",
    "java/lang/ref/WeakReference",
];

/// Classes every annotated class needs for its reflection metadata.
const ANNOTATION_SUPPORT: [&str; 4] = [
    "java/lang/annotation/Annotation",
    "java/lang/reflect/Field",
    "java/lang/reflect/Method",
    "java/lang/reflect/Constructor",
];

/// The signature of a program entry point.
const MAIN_NAME: &str = "main";
const MAIN_DESCRIPTOR: &str = "([Ljava/lang/String;)V";

fn add_type(out: &mut BTreeSet<String>, ty: &JavaType) {
    if let Some(class) = ty.class_reference() {
        out.insert(class.to_string());
    }
}

fn add_signature(out: &mut BTreeSet<String>, signature: &MethodSignature) {
    for param in signature.params() {
        add_type(out, param);
    }
    add_type(out, signature.return_type());
}

/// Annotation instances are materialized as objects of the synthesized implementation class.
fn add_annotation_impls(out: &mut BTreeSet<String>, value: &AnnotationValue) {
    match value {
        AnnotationValue::Annotation(nested) => {
            out.insert(format!("{}{}", nested.ty, ANNOTATION_IMPL_SUFFIX));
            for (_, value) in &nested.values {
                add_annotation_impls(out, value);
            }
        }
        AnnotationValue::Array(values) => {
            for value in values {
                add_annotation_impls(out, value);
            }
        }
        _ => {}
    }
}

fn add_annotations(out: &mut BTreeSet<String>, annotations: &[Annotation]) {
    if annotations.is_empty() {
        return;
    }
    for annotation in annotations {
        annotation.referenced_classes(out);
        out.insert(format!("{}{}", annotation.ty, ANNOTATION_IMPL_SUFFIX));
        for (_, value) in &annotation.values {
            add_annotation_impls(out, value);
        }
    }
    out.extend(ANNOTATION_SUPPORT.iter().map(|name| name.to_string()));
}

fn add_method(out: &mut BTreeSet<String>, method: &MethodDescriptor) {
    add_signature(out, &method.signature);
    add_annotations(out, &method.annotations);
    if let Some(default) = &method.annotation_default {
        default.referenced_classes(out);
    }
    for region in &method.regions {
        if let Some(catch_type) = &region.catch_type {
            out.insert(catch_type.clone());
        }
    }

    for instruction in &method.instructions {
        match &instruction.kind {
            InstructionKind::Constant(Constant::String(_)) => {
                out.insert(STRING_CLASS.to_string());
            }
            InstructionKind::Constant(Constant::Class(ty)) => add_type(out, ty),
            InstructionKind::Type { ty, .. } | InstructionKind::MultiArray { ty, .. } => {
                add_type(out, ty);
            }
            InstructionKind::Field { field, .. } => {
                out.insert(field.owner.clone());
                if let Some(declaring) = &field.declaring {
                    out.insert(declaring.clone());
                }
                add_type(out, &field.ty);
            }
            InstructionKind::Invoke { method, .. } => {
                out.insert(method.owner.clone());
                add_signature(out, &method.signature);
                match &method.dispatch {
                    Some(Dispatch::Direct { owner })
                    | Some(Dispatch::Virtual { owner, .. })
                    | Some(Dispatch::Interface { owner, .. }) => {
                        out.insert(owner.clone());
                    }
                    None => {}
                }
            }
            InstructionKind::Lambda(site) => {
                out.insert(site.proxy.clone());
                out.insert(site.interface.clone());
                for capture in &site.captures {
                    add_type(out, capture);
                }
            }
            InstructionKind::StringConcat { args, .. } => {
                out.insert(STRING_CLASS.to_string());
                for arg in args {
                    add_type(out, arg);
                }
            }
            _ => {}
        }
    }
}

/// Every class `class` refers to, excluding itself.
///
/// Edges are the superclass, the interfaces, the types of fields and method signatures,
/// instruction operands (constructed, cast and tested types, field and method owners,
/// constant class literals), caught exception types, annotation value trees and the classes
/// contributing an implementation to the dispatch table.
#[must_use]
pub fn class_dependencies(class: &ClassDescriptor) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if let Some(super_name) = &class.super_name {
        out.insert(super_name.clone());
    }
    out.extend(class.interfaces.iter().cloned());
    add_annotations(&mut out, &class.annotations);
    for field in &class.fields {
        add_type(&mut out, &field.ty);
        add_annotations(&mut out, &field.annotations);
    }
    for method in &class.methods {
        add_method(&mut out, method);
    }
    for entry in &class.vtable {
        out.insert(entry.owner.clone());
    }
    out.remove(&class.name);
    out
}

/// Finds the class whose static `main(String[])` starts the program.
///
/// A configured name must denote a class declaring such a method. Without one, the single
/// class declaring it is used; no candidate means the program has no entry point.
///
/// # Errors
///
/// Returns [`Error::MissingClass`] if the configured class is absent or has no entry point,
/// and [`Error::Config`] if several classes qualify and none was configured.
pub fn find_main_class(pool: &ClassPool, configured: Option<&str>) -> Result<Option<String>> {
    let has_main = |class: &ClassDescriptor| {
        class
            .find_method_by_name(MAIN_NAME, MAIN_DESCRIPTOR)
            .is_some_and(|method| method.is_static())
    };

    if let Some(configured) = configured {
        let name = sanitize_name(configured);
        return match pool.get(&name) {
            Some(class) if has_main(class) => Ok(Some(name)),
            Some(_) => Err(Error::MissingClass(format!("{name} has no main method"))),
            None => Err(Error::MissingClass(name)),
        };
    }

    let candidates: Vec<&str> = pool
        .iter()
        .filter(|class| class.state == HierarchyState::Resolved && has_main(class))
        .map(|class| class.name.as_str())
        .collect();
    match candidates.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some((*single).to_string())),
        several => Err(Error::Config(format!(
            "multiple main classes found: {}",
            several.join(", ")
        ))),
    }
}

/// The starting points of the dependency closure.
#[derive(Debug, Clone, Default)]
pub struct DependencyRoots {
    /// Classes that must be present, failing the run otherwise
    pub required: Vec<String>,
    /// Classes retained if present
    pub optional: BTreeSet<String>,
    /// Every class matching these patterns is retained
    pub retained: ClassPatterns,
}

impl DependencyRoots {
    /// Roots made of the runtime classes plus `main`.
    #[must_use]
    pub fn runtime(main: Option<&str>) -> Self {
        let mut required: Vec<String> = RUNTIME_CLASSES.iter().map(|name| name.to_string()).collect();
        if let Some(main) = main {
            required.push(main.to_string());
        }
        DependencyRoots {
            required,
            ..DependencyRoots::default()
        }
    }
}

/// Result of a dependency collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    /// Retained classes
    pub classes: BTreeSet<String>,
    /// Referenced classes that are absent from the pool or were excluded
    pub missing: BTreeSet<String>,
}

impl DependencyClosure {
    /// `true` if `name` is retained.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains(name)
    }
}

/// Computes the set of classes reachable from `roots`.
///
/// Every resolved class gets its dependency edges stored in
/// [`ClassDescriptor::dependencies`]. The root object class is retained whenever it is
/// present. References to classes outside the pool are logged and skipped.
///
/// # Errors
///
/// Returns [`Error::MissingClass`] if a required root is absent or excluded.
pub fn collect(pool: &mut ClassPool, roots: &DependencyRoots) -> Result<DependencyClosure> {
    for class in pool.iter_mut() {
        if class.state == HierarchyState::Resolved {
            class.dependencies = class_dependencies(class);
        }
    }

    for name in &roots.required {
        if pool.resolved(name).is_none() {
            return Err(Error::MissingClass(name.clone()));
        }
    }

    let mut queue: VecDeque<String> = roots.required.iter().cloned().collect();
    queue.extend(roots.optional.iter().cloned());
    queue.push_back(OBJECT_CLASS.to_string());
    if !roots.retained.is_empty() {
        queue.extend(
            pool.iter()
                .filter(|class| roots.retained.matches(&class.name))
                .map(|class| class.name.clone()),
        );
    }

    let mut closure = DependencyClosure::default();
    while let Some(name) = queue.pop_front() {
        if closure.classes.contains(&name) || closure.missing.contains(&name) {
            continue;
        }
        match pool.resolved(&name) {
            Some(class) => {
                log::trace!("retaining {name}");
                queue.extend(
                    class
                        .dependencies
                        .iter()
                        .filter(|dependency| !closure.classes.contains(*dependency))
                        .cloned(),
                );
                closure.classes.insert(name);
            }
            None => {
                if name != OBJECT_CLASS {
                    log::warn!("failed to find class dependency {name}");
                }
                closure.missing.insert(name);
            }
        }
    }

    log::info!(
        "retained {} of {} classes, {} references unresolved",
        closure.classes.len(),
        pool.len(),
        closure.missing.len()
    );
    Ok(closure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hierarchy::resolve_all,
        ir::{AccessFlags, FieldDescriptor, Instruction, Opcode},
    };

    fn class(name: &str, super_name: &str) -> ClassDescriptor {
        ClassDescriptor::new(name, Some(super_name), AccessFlags::PUBLIC)
    }

    fn field(name: &str, ty: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            ty: JavaType::Class(ty.into()),
            access: AccessFlags::PRIVATE,
            constant: None,
            annotations: Vec::new(),
            weak: false,
        }
    }

    fn program() -> ClassPool {
        let mut pool = ClassPool::new();
        pool.insert(ClassDescriptor::new(OBJECT_CLASS, None, AccessFlags::PUBLIC));
        let mut main = class("app/Main", OBJECT_CLASS);
        main.fields.push(field("foo", "app/Foo"));
        let mut entry = MethodDescriptor::new(
            "app/Main",
            MethodSignature::new(MAIN_NAME, MAIN_DESCRIPTOR).unwrap(),
            AccessFlags::PUBLIC | AccessFlags::STATIC,
        );
        entry.instructions.push(Instruction::new(InstructionKind::Simple(Opcode::Return)));
        main.methods.push(entry);
        pool.insert(main);
        pool.insert(class("app/Foo", "app/Bar"));
        pool.insert(class("app/Bar", OBJECT_CLASS));
        pool.insert(class("app/Unused", OBJECT_CLASS));
        pool.insert(class("app/Orphan", "app/Gone"));
        resolve_all(&mut pool);
        pool
    }

    fn roots(required: &[&str]) -> DependencyRoots {
        DependencyRoots {
            required: required.iter().map(|name| name.to_string()).collect(),
            ..DependencyRoots::default()
        }
    }

    #[test]
    fn test_closure_drops_unreferenced() {
        let mut pool = program();
        let closure = collect(&mut pool, &roots(&["app/Main"])).unwrap();
        assert_eq!(
            closure.classes.iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["app/Bar", "app/Foo", "app/Main", OBJECT_CLASS]
        );
        assert!(closure.missing.contains(STRING_CLASS));
        assert!(pool.get("app/Foo").unwrap().dependencies.contains("app/Bar"));
    }

    #[test]
    fn test_closure_is_idempotent() {
        let mut pool = program();
        let first = collect(&mut pool, &roots(&["app/Main"])).unwrap();
        let again = DependencyRoots {
            optional: first.classes.clone(),
            ..DependencyRoots::default()
        };
        let second = collect(&mut pool, &again).unwrap();
        assert_eq!(first.classes, second.classes);
    }

    #[test]
    fn test_patterns_and_missing_roots() {
        let mut pool = program();
        let retained = DependencyRoots {
            retained: ClassPatterns::compile(&["app.Un*"]).unwrap(),
            ..DependencyRoots::default()
        };
        let closure = collect(&mut pool, &retained).unwrap();
        assert!(closure.contains("app/Unused"));
        assert!(!closure.contains("app/Main"));

        let error = collect(&mut pool, &roots(&["app/Orphan"])).unwrap_err();
        assert!(matches!(error, Error::MissingClass(name) if name == "app/Orphan"));
    }

    #[test]
    fn test_main_class_detection() {
        let pool = program();
        assert_eq!(find_main_class(&pool, None).unwrap().as_deref(), Some("app/Main"));
        assert_eq!(
            find_main_class(&pool, Some("app.Main")).unwrap().as_deref(),
            Some("app/Main")
        );
        assert!(matches!(
            find_main_class(&pool, Some("app.Foo")),
            Err(Error::MissingClass(_))
        ));
    }
}
