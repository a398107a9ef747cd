//! Declaration files.

use std::fmt::Write;

use crate::{
    emit::header_path,
    ir::{
        names::{
            field_symbol, function_type_symbol, interface_index_symbol, qualified_name,
            vtable_index_symbol,
        },
        ClassDescriptor, FieldDescriptor, MethodDescriptor, MethodSignature, OBJECT_CLASS,
    },
    Result,
};

/// Storage type of a field inside an object or as a global.
///
/// Instance references are stored as `jref` so the struct layout does not depend on the
/// native pointer size.
pub(super) fn field_storage(field: &FieldDescriptor) -> &'static str {
    if field.ty.is_reference() && !field.is_static() {
        "jref"
    } else {
        field.ty.c_type()
    }
}

/// Parameter list of a method, starting with the context argument.
pub(super) fn parameter_list(signature: &MethodSignature, is_static: bool) -> String {
    let mut params = String::from("jcontext ctx");
    if !is_static {
        params.push_str(", jobject self");
    }
    for (index, param) in signature.params().iter().enumerate() {
        let _ = write!(params, ", {} p{}", param.c_type(), index);
    }
    params
}

/// The full prototype of a method's native function, without the trailing semicolon.
pub(super) fn prototype(method: &MethodDescriptor) -> String {
    format!(
        "{} {}({})",
        method.signature.return_type().c_type(),
        method.symbol(),
        parameter_list(&method.signature, method.is_static())
    )
}

fn function_typedef(owner: &str, signature: &MethodSignature) -> String {
    format!(
        "typedef {} (*{})({});",
        signature.return_type().c_type(),
        function_type_symbol(owner, signature),
        parameter_list(signature, false)
    )
}

pub(super) fn render(class: &ClassDescriptor) -> Result<String> {
    let name = class.qualified_name();
    let mut out = String::new();

    writeln!(out, "#ifndef HEADER_{name}")?;
    writeln!(out, "#define HEADER_{name}")?;
    writeln!(out)?;
    writeln!(out, "#include \"Clearwing.h\"")?;
    let parent = class.super_name.as_deref().unwrap_or(OBJECT_CLASS);
    writeln!(out, "#include \"{}\"", header_path(parent))?;
    writeln!(out)?;
    writeln!(out, "#ifdef __cplusplus")?;
    writeln!(out, "extern \"C\" {{")?;
    writeln!(out, "#endif")?;
    writeln!(out)?;

    writeln!(out, "typedef struct {name} {{")?;
    writeln!(out, "    {} parent;", qualified_name(parent))?;
    for field in class.instance_fields() {
        writeln!(
            out,
            "    {} {};",
            field_storage(field),
            field_symbol(&class.name, &field.name, false)
        )?;
    }
    writeln!(out, "}} {name};")?;
    writeln!(out)?;

    writeln!(out, "extern Class class_{name};")?;
    for field in class.static_fields() {
        writeln!(
            out,
            "extern {} {};",
            field_storage(field),
            field_symbol(&class.name, &field.name, true)
        )?;
    }
    writeln!(out)?;

    for (slot, entry) in class.vtable.iter().enumerate() {
        writeln!(
            out,
            "#define {} {}",
            vtable_index_symbol(&class.name, &entry.signature),
            slot
        )?;
    }
    for (index, signature) in class.interface_methods.iter().enumerate() {
        writeln!(
            out,
            "#define {} {}",
            interface_index_symbol(&class.name, signature),
            index
        )?;
    }
    writeln!(out)?;

    for entry in &class.vtable {
        writeln!(out, "{}", function_typedef(&class.name, &entry.signature))?;
    }
    for signature in &class.interface_methods {
        if class.vtable_slot(signature).is_none() {
            writeln!(out, "{}", function_typedef(&class.name, signature))?;
        }
    }
    writeln!(out)?;

    writeln!(out, "void clinit_{name}(jcontext ctx);")?;
    writeln!(out, "void mark_{name}(jobject object, jint mark, int depth);")?;
    for method in class
        .methods
        .iter()
        .filter(|method| !method.is_abstract() && !method.signature.is_static_initializer())
    {
        writeln!(out, "{};", prototype(method))?;
    }
    writeln!(out)?;

    writeln!(out, "#ifdef __cplusplus")?;
    writeln!(out, "}}")?;
    writeln!(out, "#endif")?;
    writeln!(out)?;
    writeln!(out, "#endif")?;
    Ok(out)
}
