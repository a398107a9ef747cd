//! Annotation initializers of reflective classes.
//!
//! Annotation instances are objects of the synthesized `<Type>Impl` classes. The initializer
//! of a class builds every instance once, fills in the member values (defaults were merged
//! into the trees during hierarchy resolution) and stores the resulting arrays on the class
//! object and on the reflection objects of its fields, methods and constructors. The runtime
//! calls it through `annotationInitializer` after it has built those reflection arrays.
//!
//! Objects under construction are kept in a rooted `jtype` array registered as a stack frame,
//! so a collection triggered by a later allocation cannot reclaim them.

use std::fmt::Write;

use crate::{
    classfile::synthetic::ANNOTATION_IMPL_SUFFIX,
    emit::{
        literal::{double_literal, float_literal, int_literal, long_literal, string_literal, string_object},
        source::MethodEntry,
        Emitter,
    },
    ir::{
        names::{class_object_symbol, field_symbol, qualified_name},
        Annotation, AnnotationValue, ClassDescriptor, FieldDescriptor, JavaType,
    },
    Result,
};

const FIELD_CLASS: &str = "java/lang/reflect/Field";
const METHOD_CLASS: &str = "java/lang/reflect/Method";
const CONSTRUCTOR_CLASS: &str = "java/lang/reflect/Constructor";

/// Name of the annotation initializer of a class.
pub(super) fn initializer_symbol(class: &ClassDescriptor) -> String {
    format!("annotations_{}", class.qualified_name())
}

/// `true` if the class needs an annotation initializer.
pub(super) fn has_annotations(
    class: &ClassDescriptor,
    fields: &[&FieldDescriptor],
    methods: &[MethodEntry<'_>],
) -> bool {
    class.reflective
        && (!class.annotations.is_empty()
            || fields.iter().any(|field| !field.annotations.is_empty())
            || methods.iter().any(|entry| {
                entry
                    .method
                    .is_some_and(|method| !method.annotations.is_empty())
            }))
}

/// Reflection classes whose declarations the initializer needs.
pub(super) fn required_classes(
    fields: &[&FieldDescriptor],
    methods: &[MethodEntry<'_>],
) -> Vec<&'static str> {
    let mut classes = Vec::new();
    if fields.iter().any(|field| !field.annotations.is_empty()) {
        classes.push(FIELD_CLASS);
    }
    let annotated = |constructor: bool| {
        methods.iter().any(|entry| {
            entry.method.is_some_and(|method| {
                method.signature.is_constructor() == constructor && !method.annotations.is_empty()
            })
        })
    };
    if annotated(false) || annotated(true) {
        classes.push(METHOD_CLASS);
    }
    if annotated(true) {
        classes.push(CONSTRUCTOR_CLASS);
    }
    classes
}

/// Collects the statements building annotation objects.
struct TreeWriter<'e> {
    emitter: &'e Emitter<'e>,
    lines: Vec<String>,
    roots: usize,
}

impl TreeWriter<'_> {
    fn root(&mut self) -> String {
        let root = format!("roots[{}].o", self.roots);
        self.roots += 1;
        root
    }

    fn annotation_array(&mut self, annotations: &[Annotation]) -> String {
        let array = self.root();
        self.lines.push(format!(
            "{array} = (jobject) createArray(ctx, &class_java_lang_annotation_Annotation, {});",
            annotations.len()
        ));
        for (index, annotation) in annotations.iter().enumerate() {
            let value = self.annotation(annotation);
            self.lines
                .push(format!("((jobject *) ((jarray) {array})->data)[{index}] = {value};"));
        }
        array
    }

    fn annotation(&mut self, annotation: &Annotation) -> String {
        let implementation = format!("{}{}", annotation.ty, ANNOTATION_IMPL_SUFFIX);
        let Some(class) = self
            .emitter
            .is_emitted(&implementation)
            .then(|| self.emitter.pool().resolved(&implementation))
            .flatten()
        else {
            log::warn!("no implementation class for annotation {}", annotation.ty);
            return "nullptr".to_string();
        };

        let object = self.root();
        let name = qualified_name(&implementation);
        self.lines.push(format!(
            "{object} = (clinit_{name}(ctx), gcAlloc(ctx, &class_{name}));"
        ));
        for (member, value) in &annotation.values {
            let Some(field) = class.find_field(member) else {
                log::warn!("annotation {} has no member {}", annotation.ty, member);
                continue;
            };
            let value = self.value(value, &field.ty);
            let value = if field.ty.is_reference() {
                format!("(jref) {value}")
            } else {
                value
            };
            self.lines.push(format!(
                "(({name} *) {object})->{} = {value};",
                field_symbol(&implementation, member, false)
            ));
        }
        object
    }

    fn value(&mut self, value: &AnnotationValue, ty: &JavaType) -> String {
        match value {
            AnnotationValue::Byte(value) => int_literal(i32::from(*value)),
            AnnotationValue::Char(value) => int_literal(i32::from(*value)),
            AnnotationValue::Short(value) => int_literal(i32::from(*value)),
            AnnotationValue::Int(value) => int_literal(*value),
            AnnotationValue::Long(value) => long_literal(*value),
            AnnotationValue::Float(value) => float_literal(*value),
            AnnotationValue::Double(value) => double_literal(*value),
            AnnotationValue::Boolean(value) => value.to_string(),
            AnnotationValue::String(text) => string_object(text),
            AnnotationValue::Enum { ty, constant } => {
                if self.emitter.is_available(ty) {
                    format!(
                        "(clinit_{}(ctx), {})",
                        qualified_name(ty),
                        field_symbol(ty, constant, true)
                    )
                } else {
                    "nullptr".to_string()
                }
            }
            AnnotationValue::Class(class) => match class.class_reference() {
                Some(name) if !self.emitter.is_available(name) => "nullptr".to_string(),
                _ => format!("(jobject) {}", class.class_fetch()),
            },
            AnnotationValue::Annotation(nested) => self.annotation(nested),
            AnnotationValue::Array(values) => {
                let component = ty.element().unwrap_or_else(JavaType::object);
                let array = self.root();
                self.lines.push(format!(
                    "{array} = (jobject) createArray(ctx, {}, {});",
                    component.class_fetch(),
                    values.len()
                ));
                for (index, value) in values.iter().enumerate() {
                    let value = self.value(value, &component);
                    self.lines.push(format!(
                        "(({} *) ((jarray) {array})->data)[{index}] = {value};",
                        component.c_type()
                    ));
                }
                array
            }
        }
    }
}

/// Writes the annotation initializer of a class.
///
/// `fields` and `methods` are the entries of the class's reflection tables, in table order.
pub(super) fn render(
    out: &mut String,
    emitter: &Emitter<'_>,
    class: &ClassDescriptor,
    fields: &[&FieldDescriptor],
    methods: &[MethodEntry<'_>],
) -> Result<()> {
    let class_object = class_object_symbol(&class.name);
    let mut writer = TreeWriter {
        emitter,
        lines: Vec::new(),
        roots: 0,
    };

    if !class.annotations.is_empty() {
        let array = writer.annotation_array(&class.annotations);
        writer
            .lines
            .push(format!("{class_object}.annotations = (jref) {array};"));
    }

    for (index, field) in fields.iter().enumerate() {
        if field.annotations.is_empty() {
            continue;
        }
        let array = writer.annotation_array(&field.annotations);
        writer.lines.push(format!(
            "((java_lang_reflect_Field *) ((jobject *) ((jarray) {class_object}.fields)->data)[{index}])->F_annotations = (jref) {array};"
        ));
    }

    // the runtime splits the method table into methods and constructors, keeping the order
    let mut method_index = 0usize;
    let mut constructor_index = 0usize;
    for entry in methods {
        let constructor = entry.signature.is_constructor();
        let index = if constructor {
            constructor_index += 1;
            constructor_index - 1
        } else {
            method_index += 1;
            method_index - 1
        };
        let Some(method) = entry.method.filter(|method| !method.annotations.is_empty()) else {
            continue;
        };
        let array = writer.annotation_array(&method.annotations);
        let target = if constructor {
            format!(
                "((java_lang_reflect_Method *) ((java_lang_reflect_Constructor *) ((jobject *) ((jarray) {class_object}.constructors)->data)[{index}])->F_method)"
            )
        } else {
            format!(
                "((java_lang_reflect_Method *) ((jobject *) ((jarray) {class_object}.methods)->data)[{index}])"
            )
        };
        writer
            .lines
            .push(format!("{target}->F_annotations = (jref) {array};"));
    }

    let roots = writer.roots.max(1);
    let name = format!("{}.<annotations>", class.name.replace('/', "."));
    writeln!(out, "static void {}(jcontext ctx) {{", initializer_symbol(class))?;
    writeln!(out, "    static bool initialized;")?;
    writeln!(out, "    if (initialized) return;")?;
    writeln!(out, "    initialized = true;")?;
    writeln!(out, "    volatile jtype roots[{roots}] {{}};")?;
    writeln!(
        out,
        "    pushStackFrame(ctx, {roots}, (const jtype *) roots, {}, nullptr);",
        string_literal(&name)
    )?;
    for line in &writer.lines {
        writeln!(out, "    {line}")?;
    }
    writeln!(out, "    popStackFrame(ctx);")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    Ok(())
}
