//! Implementation files.
//!
//! One `<name>.cpp` per class holds, in this order: static field storage, the dispatch table,
//! the tables the runtime reads for dispatch and reflection, the collector trace function,
//! every method body (a `<clinit>` body as `clinitBody_<class>`), the static initializer, the
//! optional annotation initializer and finally the class object with its registration.
//!
//! The runtime resolves interface calls by matching the interface's method table against the
//! receiver's vtable entries by name and descriptor, so interfaces always carry a method table
//! and every class carries its vtable entries, reflective or not.

use std::fmt::Write;

use crate::{
    emit::{
        annotations,
        body::{render_method, write_clinit, INITIALIZER_ERROR, WRAPPED_EXCEPTION},
        header::field_storage,
        header_path,
        literal::{constant_expression, string_literal},
        Emitter,
    },
    ir::{
        names::{class_object_symbol, field_symbol, method_symbol},
        AccessFlags, ClassDescriptor, Constant, FieldDescriptor, JavaType, MethodDescriptor,
        MethodSignature, OBJECT_CLASS,
    },
    Result,
};

/// One row of a class's method table.
pub(crate) struct MethodEntry<'c> {
    /// Name and descriptor
    pub signature: &'c MethodSignature,
    /// Interface index, vtable slot or function address, depending on the method kind
    pub offset: String,
    /// Access flags
    pub access: AccessFlags,
    /// The declaring method, absent for interface methods inherited from super interfaces
    pub method: Option<&'c MethodDescriptor>,
}

/// Rows of the method table.
///
/// Interfaces list their dispatch methods first, at their interface index. Reflective
/// classes add every other method that can be reached: static methods and constructors by
/// address, virtual methods by vtable slot.
pub(crate) fn method_entries(class: &ClassDescriptor) -> Vec<MethodEntry<'_>> {
    let mut entries = Vec::new();
    if class.is_interface() {
        for (index, signature) in class.interface_methods.iter().enumerate() {
            let method = class.find_method(signature);
            entries.push(MethodEntry {
                signature,
                offset: index.to_string(),
                access: method.map_or(AccessFlags::PUBLIC | AccessFlags::ABSTRACT, |m| m.access),
                method,
            });
        }
    }
    if !class.reflective {
        return entries;
    }

    for method in &class.methods {
        if method.signature.is_static_initializer()
            || entries.iter().any(|entry| *entry.signature == method.signature)
        {
            continue;
        }
        let offset = if method.is_static() || method.signature.is_constructor() {
            if method.is_abstract() {
                continue;
            }
            format!("(intptr_t) {}", method.symbol())
        } else {
            match class.vtable_slot(&method.signature) {
                Some(slot) => slot.to_string(),
                None => continue,
            }
        };
        entries.push(MethodEntry {
            signature: &method.signature,
            offset,
            access: method.access,
            method: Some(method),
        });
    }
    entries
}

/// Rows of the field table, empty unless the class is reflective.
pub(crate) fn field_entries(class: &ClassDescriptor) -> Vec<&FieldDescriptor> {
    if class.reflective {
        class.fields.iter().collect()
    } else {
        Vec::new()
    }
}

fn static_definition(class: &ClassDescriptor, field: &FieldDescriptor) -> String {
    let initializer = match &field.constant {
        Some(constant @ (Constant::Int(_) | Constant::Long(_) | Constant::Float(_) | Constant::Double(_))) => {
            format!(" = {}", constant_expression(constant))
        }
        _ => " {}".to_string(),
    };
    format!(
        "{} {}{};",
        field_storage(field),
        field_symbol(&class.name, &field.name, true),
        initializer
    )
}

fn trace_call(child: &str, depth: &str) -> String {
    format!(
        "if ({child}) ((gc_mark_ptr) ((jclass) {child}->clazz)->markFunction)({child}, mark, {depth});"
    )
}

/// The collector trace function.
///
/// Called with a null object it marks the class's static references. Otherwise the super
/// class trace runs first and the root object class sets the mark, then the own reference
/// fields are traced one level deeper. Past `MAX_GC_MARK_DEPTH` the object is handed to the
/// runtime's deferred worklist instead of recursing further.
fn write_mark_function(out: &mut String, class: &ClassDescriptor) -> Result<()> {
    let name = class.qualified_name();
    writeln!(out, "void mark_{name}(jobject object, jint mark, int depth) {{")?;
    writeln!(out, "    if (!object) {{")?;
    for field in class.static_fields().filter(|field| field.is_traced()) {
        let symbol = field_symbol(&class.name, &field.name, true);
        writeln!(out, "        {}", trace_call(&symbol, "0"))?;
    }
    writeln!(out, "        return;")?;
    writeln!(out, "    }}")?;
    writeln!(
        out,
        "    if (depth > GC_DEPTH_ALWAYS && (object->gcMark < GC_MARK_START || object->gcMark == mark))"
    )?;
    writeln!(out, "        return;")?;
    writeln!(out, "    if (depth > MAX_GC_MARK_DEPTH) {{")?;
    writeln!(out, "        markDeepObject(object);")?;
    writeln!(out, "        return;")?;
    writeln!(out, "    }}")?;
    match class.super_name.as_deref() {
        Some(parent) if parent != OBJECT_CLASS && !class.is_interface() => {
            writeln!(out, "    mark_{}(object, mark, depth);", crate::ir::names::qualified_name(parent))?;
        }
        _ => {
            writeln!(out, "    if (object->gcMark >= GC_MARK_START)")?;
            writeln!(out, "        object->gcMark = mark;")?;
        }
    }
    for field in class.instance_fields().filter(|field| field.is_traced()) {
        writeln!(out, "    {{")?;
        writeln!(
            out,
            "        auto child = (jobject) (({name} *) object)->{};",
            field_symbol(&class.name, &field.name, false)
        )?;
        writeln!(out, "        {}", trace_call("child", "depth + 1"))?;
        writeln!(out, "    }}")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}

/// Class object expression of a field type for the reflection tables.
///
/// The tables are constant initialized, so array classes and classes without generated
/// code are described by the root object class.
fn field_type_object(emitter: &Emitter<'_>, ty: &JavaType) -> String {
    match ty {
        JavaType::Primitive(_) => ty.class_fetch(),
        JavaType::Class(name) if emitter.is_available(name) => ty.class_fetch(),
        _ => format!("&{}", class_object_symbol(OBJECT_CLASS)),
    }
}

fn pointer_or_null(present: bool, symbol: &str) -> String {
    if present {
        format!("(intptr_t) {symbol}")
    } else {
        "(intptr_t) nullptr".to_string()
    }
}

pub(super) fn render(emitter: &Emitter<'_>, class: &ClassDescriptor) -> Result<String> {
    let name = class.qualified_name();
    let config = emitter.config();
    let fields = field_entries(class);
    let methods = method_entries(class);
    let annotated = annotations::has_annotations(class, &fields, &methods);
    let mut out = String::new();

    writeln!(out, "#include \"{}\"", header_path(&class.name))?;
    writeln!(out)?;
    writeln!(out, "#include <cmath>")?;
    writeln!(out, "#include <cstddef>")?;
    writeln!(out, "#include <limits>")?;
    let mut includes: Vec<&str> = class
        .dependencies
        .iter()
        .map(String::as_str)
        .filter(|dependency| *dependency != class.name && emitter.is_available(dependency))
        .collect();
    if annotated {
        includes.extend(annotations::required_classes(&fields, &methods));
    }
    let has_initializer = class
        .static_initializer()
        .is_some_and(MethodDescriptor::has_code);
    if has_initializer {
        includes.extend([INITIALIZER_ERROR, WRAPPED_EXCEPTION]);
    }
    includes.sort_unstable();
    includes.dedup();
    for dependency in includes {
        writeln!(out, "#include \"{}\"", header_path(dependency))?;
    }
    writeln!(out)?;
    writeln!(out, "extern \"C\" {{")?;
    writeln!(out)?;

    for field in class.static_fields() {
        writeln!(out, "{}", static_definition(class, field))?;
    }
    writeln!(out)?;

    if !class.vtable.is_empty() {
        writeln!(out, "static void *vtable_{name}[] {{")?;
        for entry in &class.vtable {
            if entry.is_abstract {
                writeln!(out, "    nullptr,")?;
            } else {
                writeln!(
                    out,
                    "    (void *) {},",
                    method_symbol(&entry.owner, &entry.signature, false)
                )?;
            }
        }
        writeln!(out, "}};")?;
        writeln!(out)?;

        writeln!(out, "static VtableEntry vtableEntries_{name}[] {{")?;
        for entry in &class.vtable {
            writeln!(
                out,
                "    {{ {}, {} }},",
                string_literal(entry.signature.name()),
                string_literal(entry.signature.descriptor())
            )?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    let interfaces: Vec<&String> = class
        .interfaces
        .iter()
        .filter(|interface| emitter.is_available(interface))
        .collect();
    if !interfaces.is_empty() {
        writeln!(out, "static jclass interfaces_{name}[] {{")?;
        for interface in &interfaces {
            writeln!(out, "    &{},", class_object_symbol(interface))?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    let inner_classes: Vec<&str> = class
        .inner_classes
        .iter()
        .filter(|info| {
            info.outer.as_deref() == Some(class.name.as_str())
                && info.inner != class.name
                && emitter.is_available(&info.inner)
        })
        .map(|info| info.inner.as_str())
        .collect();
    if !inner_classes.is_empty() {
        writeln!(out, "static jclass innerClasses_{name}[] {{")?;
        for inner in &inner_classes {
            writeln!(out, "    &{},", class_object_symbol(inner))?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    if !fields.is_empty() {
        writeln!(out, "static FieldMetadata fields_{name}[] {{")?;
        for field in &fields {
            let offset = if field.is_static() {
                format!("(intptr_t) &{}", field_symbol(&class.name, &field.name, true))
            } else {
                format!("offsetof({name}, {})", field_symbol(&class.name, &field.name, false))
            };
            writeln!(
                out,
                "    {{ {}, {}, {offset}, {}, 0x{:x} }},",
                string_literal(&field.name),
                field_type_object(emitter, &field.ty),
                string_literal(&field.ty.descriptor()),
                field.access.bits()
            )?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    if !methods.is_empty() {
        writeln!(out, "static MethodMetadata methods_{name}[] {{")?;
        for entry in &methods {
            writeln!(
                out,
                "    {{ {}, {}, {}, 0x{:x} }},",
                string_literal(entry.signature.name()),
                entry.offset,
                string_literal(entry.signature.descriptor()),
                entry.access.bits()
            )?;
        }
        writeln!(out, "}};")?;
        writeln!(out)?;
    }

    write_mark_function(&mut out, class)?;

    for method in class.methods.iter().filter(|method| method.has_code()) {
        render_method(&mut out, config, class, method)?;
    }
    write_clinit(&mut out, class, has_initializer)?;

    if annotated {
        annotations::render(&mut out, emitter, class, &fields, &methods)?;
    }

    let parent = match class.super_name.as_deref() {
        Some(parent) if !class.is_interface() && emitter.is_available(parent) => {
            format!("(intptr_t) &{}", class_object_symbol(parent))
        }
        _ => "(intptr_t) nullptr".to_string(),
    };
    let outer = match class.outer_class.as_deref() {
        Some(outer) if emitter.is_available(outer) => {
            format!("(intptr_t) &{}", class_object_symbol(outer))
        }
        _ => "(intptr_t) nullptr".to_string(),
    };

    writeln!(out, "Class {} {{", class_object_symbol(&class.name))?;
    writeln!(out, "    .nativeName = (intptr_t) {},", string_literal(&class.name))?;
    writeln!(out, "    .parentClass = {parent},")?;
    writeln!(out, "    .size = sizeof({name}),")?;
    writeln!(
        out,
        "    .classVtable = {},",
        pointer_or_null(!class.vtable.is_empty(), &format!("vtable_{name}"))
    )?;
    writeln!(out, "    .staticInitializer = (intptr_t) clinit_{name},")?;
    writeln!(
        out,
        "    .annotationInitializer = {},",
        pointer_or_null(annotated, &annotations::initializer_symbol(class))
    )?;
    writeln!(out, "    .markFunction = (intptr_t) mark_{name},")?;
    writeln!(out, "    .primitive = false,")?;
    writeln!(out, "    .arrayDimensions = 0,")?;
    writeln!(out, "    .componentClass = (intptr_t) nullptr,")?;
    writeln!(out, "    .outerClass = {outer},")?;
    writeln!(out, "    .innerClassCount = {},", inner_classes.len())?;
    writeln!(
        out,
        "    .nativeInnerClasses = {},",
        pointer_or_null(!inner_classes.is_empty(), &format!("innerClasses_{name}"))
    )?;
    writeln!(out, "    .access = 0x{:x},", class.access.bits())?;
    writeln!(out, "    .interfaceCount = {},", interfaces.len())?;
    writeln!(
        out,
        "    .nativeInterfaces = {},",
        pointer_or_null(!interfaces.is_empty(), &format!("interfaces_{name}"))
    )?;
    writeln!(out, "    .fieldCount = {},", fields.len())?;
    writeln!(
        out,
        "    .nativeFields = {},",
        pointer_or_null(!fields.is_empty(), &format!("fields_{name}"))
    )?;
    writeln!(out, "    .methodCount = {},", methods.len())?;
    writeln!(
        out,
        "    .nativeMethods = {},",
        pointer_or_null(!methods.is_empty(), &format!("methods_{name}"))
    )?;
    writeln!(out, "    .vtableSize = {},", class.vtable.len())?;
    writeln!(
        out,
        "    .vtableEntries = {},",
        pointer_or_null(!class.vtable.is_empty(), &format!("vtableEntries_{name}"))
    )?;
    writeln!(out, "    .anonymous = {},", class.anonymous)?;
    writeln!(
        out,
        "    .synthetic = {},",
        class.access.contains(AccessFlags::SYNTHETIC)
    )?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(
        out,
        "static bool registered_{name} = registerClass(&{});",
        class_object_symbol(&class.name)
    )?;
    writeln!(out)?;
    writeln!(out, "}}")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alloc::raw_plan,
        config::CompilerConfig,
        dependencies::DependencyClosure,
        hierarchy::{resolve_all, ClassPool},
        ir::{Annotation, AnnotationValue, Instruction, InstructionIo, InstructionKind, Opcode, TypeKind},
    };

    fn field(name: &str, ty: JavaType, access: AccessFlags, constant: Option<Constant>) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            ty,
            access,
            constant,
            annotations: Vec::new(),
            weak: false,
        }
    }

    fn answer_method() -> MethodDescriptor {
        let signature = MethodSignature::new("answer", "()I").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        let mut constant = Instruction::new(InstructionKind::Simple(Opcode::Iconst5));
        constant
            .resolve(InstructionIo {
                below: Vec::new(),
                inputs: Vec::new(),
                outputs: vec![JavaType::int()],
            })
            .unwrap();
        let mut ret = Instruction::new(InstructionKind::Simple(Opcode::Ireturn));
        ret.resolve(InstructionIo {
            below: Vec::new(),
            inputs: vec![JavaType::int()],
            outputs: Vec::new(),
        })
        .unwrap();
        method.instructions = vec![constant, ret];
        method.max_stack = 1;
        method.plan = Some(raw_plan(&method).unwrap());
        method
    }

    fn pool(reflective: bool) -> ClassPool {
        let mut pool = ClassPool::new();
        pool.insert(ClassDescriptor::new(OBJECT_CLASS, None, AccessFlags::PUBLIC));

        let mut class = ClassDescriptor::new(
            "pkg/A",
            Some(OBJECT_CLASS),
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
        );
        class.fields.push(field("next", JavaType::Class("pkg/A".into()), AccessFlags::PRIVATE, None));
        class.fields.push(field(
            "LIMIT",
            JavaType::int(),
            AccessFlags::STATIC | AccessFlags::FINAL,
            Some(Constant::Int(3)),
        ));
        class.fields.push(field(
            "cache",
            JavaType::Class("pkg/A".into()),
            AccessFlags::STATIC,
            None,
        ));
        class.methods.push(MethodDescriptor::new(
            "pkg/A",
            MethodSignature::new("get", "(I)J").unwrap(),
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
        ));
        class.methods.push(answer_method());
        class.reflective = reflective;
        if reflective {
            let mut tag = Annotation::new("pkg/Tag");
            tag.values.push(("value".into(), AnnotationValue::Int(4)));
            class.annotations.push(tag);

            let mut implementation = ClassDescriptor::new("pkg/TagImpl", Some(OBJECT_CLASS), AccessFlags::FINAL);
            implementation
                .fields
                .push(field("value", JavaType::Primitive(TypeKind::Int), AccessFlags::PRIVATE, None));
            pool.insert(implementation);
        }
        pool.insert(class);
        resolve_all(&mut pool);
        pool
    }

    fn render_class(pool: &ClassPool) -> String {
        let closure = DependencyClosure {
            classes: pool.iter().map(|class| class.name.clone()).collect(),
            ..DependencyClosure::default()
        };
        let config = CompilerConfig::default();
        let emitter = Emitter::new(pool, &closure, &config);
        render(&emitter, pool.get("pkg/A").unwrap()).unwrap()
    }

    #[test]
    fn test_class_file_layout() {
        let pool = pool(false);
        let text = render_class(&pool);

        assert!(text.starts_with("#include \"pkg_A.h\"\n"));
        assert!(text.contains("jint SF_pkg_A_LIMIT = 3;\n"));
        assert!(text.contains("jobject SF_pkg_A_cache {};\n"));
        assert!(text.contains("static void *vtable_pkg_A[] {\n    (void *) M_java_lang_Object_hashCode_R_int,\n"));
        assert!(text.contains("    nullptr,\n};"));
        assert!(text.contains("    { \"get\", \"(I)J\" },\n"));
        assert!(text.contains("void clinit_pkg_A(jcontext ctx) {\n    static bool initialized;\n"));
        assert!(text.contains("jint SM_pkg_A_answer_R_int(jcontext ctx) {\n"));
        assert!(text.contains("    .parentClass = (intptr_t) &class_java_lang_Object,\n"));
        assert!(text.contains("    .annotationInitializer = (intptr_t) nullptr,\n"));
        assert!(text.contains("    .nativeFields = (intptr_t) nullptr,\n"));
        assert!(text.contains("    .access = 0x401,\n"));
        assert!(text.contains("static bool registered_pkg_A = registerClass(&class_pkg_A);"));
        assert!(text.trim_end().ends_with('}'));
    }

    #[test]
    fn test_static_initializer_is_wrapped() {
        let mut pool = pool(false);
        let id = pool.id("pkg/A").unwrap();
        let mut clinit = MethodDescriptor::new(
            "pkg/A",
            MethodSignature::new("<clinit>", "()V").unwrap(),
            AccessFlags::STATIC,
        );
        let mut ret = Instruction::new(InstructionKind::Simple(Opcode::Return));
        ret.resolve(InstructionIo {
            below: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        })
        .unwrap();
        clinit.instructions = vec![ret];
        clinit.plan = Some(raw_plan(&clinit).unwrap());
        pool.class_mut(id).methods.push(clinit);
        let text = render_class(&pool);

        assert!(text.contains("#include \"java_lang_ExceptionInInitializerError.h\"\n"));
        assert!(text.contains("static void clinitBody_pkg_A(jcontext ctx) {\n"));
        let wrapper_at = text.find("void clinit_pkg_A(jcontext ctx) {").unwrap();
        assert!(text.find("static void clinitBody_pkg_A").unwrap() < wrapper_at);
        let clinit = &text[wrapper_at..];
        assert!(clinit.contains(
            "    initialized = true;\n    volatile jtype frame[2] {};\n"
        ));
        assert!(clinit.contains(
            "    if (setjmp(*pushExceptionFrame(frameRef, &class_java_lang_Exception))) {\n        frame[0].o = popExceptionFrame(frameRef);\n"
        ));
        assert!(clinit.contains(
            "        init_java_lang_ExceptionInInitializerError_java_lang_Throwable(ctx, frame[1].o, frame[0].o);\n        throwException(ctx, frame[1].o);\n    }\n"
        ));
        assert!(clinit.contains(
            "    clinitBody_pkg_A(ctx);\n    popExceptionFrame(frameRef);\n    popStackFrame(ctx);\n}\n"
        ));
    }

    #[test]
    fn test_static_initializer_without_body_is_plain() {
        let pool = pool(false);
        let text = render_class(&pool);
        let clinit = &text[text.find("void clinit_pkg_A(jcontext ctx) {").unwrap()..];
        let clinit = &clinit[..clinit.find("\n}\n").unwrap()];
        assert!(!clinit.contains("pushExceptionFrame"));
        assert!(!text.contains("clinitBody_pkg_A"));
        assert!(!text.contains("java_lang_ExceptionInInitializerError.h"));
    }

    #[test]
    fn test_mark_function() {
        let pool = pool(false);
        let text = render_class(&pool);

        assert!(text.contains("void mark_pkg_A(jobject object, jint mark, int depth) {\n    if (!object) {\n"));
        assert!(text.contains(
            "        if (SF_pkg_A_cache) ((gc_mark_ptr) ((jclass) SF_pkg_A_cache->clazz)->markFunction)(SF_pkg_A_cache, mark, 0);\n"
        ));
        assert!(text.contains("        markDeepObject(object);\n"));
        assert!(text.contains("        object->gcMark = mark;\n"));
        assert!(text.contains("        auto child = (jobject) ((pkg_A *) object)->F_next;\n"));
        assert!(text.contains("(child, mark, depth + 1);"));
    }

    #[test]
    fn test_weak_field_is_not_marked() {
        let mut pool = pool(false);
        let id = pool.id("pkg/A").unwrap();
        pool.class_mut(id).fields[0].weak = true;
        let text = render_class(&pool);

        let mark_at = text.find("void mark_pkg_A(jobject object, jint mark, int depth) {").unwrap();
        let mark_end = mark_at + text[mark_at..].find("\n}\n").unwrap();
        let mark = &text[mark_at..mark_end];
        assert!(mark.contains("SF_pkg_A_cache"));
        assert!(!mark.contains("F_next"));
    }

    #[test]
    fn test_reflective_class() {
        let pool = pool(true);
        let text = render_class(&pool);

        assert!(text.contains("static FieldMetadata fields_pkg_A[] {\n"));
        assert!(text.contains("    { \"next\", &class_pkg_A, offsetof(pkg_A, F_next), \"Lpkg/A;\", 0x2 },\n"));
        assert!(text.contains("    { \"LIMIT\", &class_int, (intptr_t) &SF_pkg_A_LIMIT, \"I\", 0x18 },\n"));
        assert!(text.contains("    { \"answer\", (intptr_t) SM_pkg_A_answer_R_int, \"()I\", 0x8 },\n"));
        assert!(text.contains("    { \"get\", 11, \"(I)J\", 0x401 },\n"));
        assert!(text.contains("    .annotationInitializer = (intptr_t) annotations_pkg_A,\n"));
        assert!(text.contains("    roots[1].o = (clinit_pkg_TagImpl(ctx), gcAlloc(ctx, &class_pkg_TagImpl));\n"));
        assert!(text.contains("    ((pkg_TagImpl *) roots[1].o)->F_value = 4;\n"));
        assert!(text.contains("    class_pkg_A.annotations = (jref) roots[0].o;\n"));
    }

    #[test]
    fn test_interface_method_table() {
        let mut class = ClassDescriptor::new(
            "pkg/I",
            Some(OBJECT_CLASS),
            AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
        );
        class.interface_methods.push(MethodSignature::new("run", "()V").unwrap());
        let entries = method_entries(&class);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, "0");
        assert!(entries[0].method.is_none());
        assert!(field_entries(&class).is_empty());
    }
}
