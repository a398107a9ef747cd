//! Native symbol naming.
//!
//! Java names may contain characters that are not valid in native identifiers, and overloaded
//! methods share a name. Every symbol the emitter produces is derived here so that the
//! declaration file, the implementation file and every call site agree on one spelling.
//!
//! | Java element              | Native symbol                                  |
//! |---------------------------|------------------------------------------------|
//! | class `a/b/C`             | `a_b_C`, class object `class_a_b_C`            |
//! | instance method           | `M_a_b_C_name_<params>[_R_<ret>]`             |
//! | static method             | `SM_a_b_C_name_<params>[_R_<ret>]`            |
//! | constructor               | `init_a_b_C[_<params>]`                        |
//! | static initializer        | `clinit_a_b_C`                                 |
//! | instance / static field   | `F_name` / `SF_a_b_C_name`                     |
//! | vtable slot macro         | `VTABLE_a_b_C_<method suffix>`                 |
//! | interface index macro     | `INDEX_a_b_C_<method suffix>`                  |
//! | function pointer typedef  | `func_a_b_C_<method suffix>`                   |

use crate::ir::signature::MethodSignature;

/// Normalizes a class name: `.` separators become `/` and `-` becomes `_`.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.replace('.', "/").replace('-', "_")
}

/// The native identifier of a class (`java/lang/String` becomes `java_lang_String`).
#[must_use]
pub fn qualified_name(name: &str) -> String {
    sanitize_name(name).replace('/', "_")
}

/// Base file name (without extension) for a class's generated sources.
#[must_use]
pub fn file_name(name: &str) -> String {
    qualified_name(name).replace('$', "_")
}

/// The simple name of a class, the part after the last `/`.
#[must_use]
pub fn simple_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// The package part of a class name, empty for the default package.
#[must_use]
pub fn package_name(name: &str) -> &str {
    name.rfind('/').map_or("", |index| &name[..index])
}

fn member_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '$' { c } else { '_' })
        .collect()
}

/// The part of a method symbol that follows the owner, unique per signature within a class.
///
/// Constructors and static initializers have no name part.
#[must_use]
pub fn method_suffix(signature: &MethodSignature) -> String {
    let mut suffix = String::new();
    if !signature.is_constructor() && !signature.is_static_initializer() {
        suffix.push_str(&member_name(signature.name()));
    }
    for param in signature.params() {
        if !suffix.is_empty() {
            suffix.push('_');
        }
        suffix.push_str(&param.suffix());
    }
    if !signature.return_type().is_void() {
        suffix.push_str("_R_");
        suffix.push_str(&signature.return_type().suffix());
    }
    suffix
}

/// The native function implementing a method.
///
/// # Arguments
/// * `owner` - Internal name of the declaring class
/// * `signature` - The method signature
/// * `is_static` - Whether the method is static
#[must_use]
pub fn method_symbol(owner: &str, signature: &MethodSignature, is_static: bool) -> String {
    let class = qualified_name(owner);
    let suffix = method_suffix(signature);
    let prefix = if signature.is_constructor() {
        format!("init_{class}")
    } else if signature.is_static_initializer() {
        return format!("clinit_{class}");
    } else if is_static {
        format!("SM_{class}")
    } else {
        format!("M_{class}")
    };

    if suffix.is_empty() {
        prefix
    } else {
        format!("{prefix}_{suffix}")
    }
}

/// The native name of a field.
///
/// Instance fields are struct members and only need to be unique within the class layout;
/// static fields are globals and carry the owner.
#[must_use]
pub fn field_symbol(owner: &str, name: &str, is_static: bool) -> String {
    if is_static {
        format!("SF_{}_{}", qualified_name(owner), member_name(name))
    } else {
        format!("F_{}", member_name(name))
    }
}

/// Macro naming the vtable slot of a virtual method.
#[must_use]
pub fn vtable_index_symbol(owner: &str, signature: &MethodSignature) -> String {
    format!("VTABLE_{}_{}", qualified_name(owner), method_suffix(signature))
}

/// Macro naming the index of an interface method in the interface's method table.
#[must_use]
pub fn interface_index_symbol(owner: &str, signature: &MethodSignature) -> String {
    format!("INDEX_{}_{}", qualified_name(owner), method_suffix(signature))
}

/// Typedef of the function pointer type used to call a virtual or interface method.
#[must_use]
pub fn function_type_symbol(owner: &str, signature: &MethodSignature) -> String {
    format!("func_{}_{}", qualified_name(owner), method_suffix(signature))
}

/// The runtime class object of a class.
#[must_use]
pub fn class_object_symbol(name: &str) -> String {
    format!("class_{}", qualified_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(name: &str, desc: &str) -> MethodSignature {
        MethodSignature::new(name, desc).unwrap()
    }

    #[test]
    fn test_class_names() {
        assert_eq!(sanitize_name("java.lang.String"), "java/lang/String");
        assert_eq!(qualified_name("com/my-app/Main$Inner"), "com_my_app_Main$Inner");
        assert_eq!(file_name("com/app/Main$Inner"), "com_app_Main_Inner");
        assert_eq!(simple_name("com/app/Main"), "Main");
        assert_eq!(package_name("com/app/Main"), "com/app");
        assert_eq!(package_name("Main"), "");
    }

    #[test]
    fn test_method_symbols() {
        assert_eq!(
            method_symbol("pkg/Calc", &sig("add", "(II)I"), false),
            "M_pkg_Calc_add_int_int_R_int"
        );
        assert_eq!(
            method_symbol("Main", &sig("main", "([Ljava/lang/String;)V"), true),
            "SM_Main_main_Array1_java_lang_String"
        );
        assert_eq!(method_symbol("pkg/A", &sig("<init>", "()V"), false), "init_pkg_A");
        assert_eq!(
            method_symbol("pkg/A", &sig("<init>", "(JLjava/lang/Object;)V"), false),
            "init_pkg_A_long_java_lang_Object"
        );
        assert_eq!(method_symbol("pkg/A", &sig("<clinit>", "()V"), true), "clinit_pkg_A");
        assert_eq!(
            method_symbol("pkg/A", &sig("lambda$run$0", "()V"), true),
            "SM_pkg_A_lambda$run$0"
        );
    }

    #[test]
    fn test_member_symbols() {
        let to_string = sig("toString", "()Ljava/lang/String;");
        assert_eq!(field_symbol("pkg/A", "count", false), "F_count");
        assert_eq!(field_symbol("pkg/A", "count", true), "SF_pkg_A_count");
        assert_eq!(
            vtable_index_symbol("java/lang/Object", &to_string),
            "VTABLE_java_lang_Object_toString_R_java_lang_String"
        );
        assert_eq!(
            interface_index_symbol("java/lang/Runnable", &sig("run", "()V")),
            "INDEX_java_lang_Runnable_run"
        );
        assert_eq!(
            function_type_symbol("pkg/A", &sig("get", "(I)J")),
            "func_pkg_A_get_int_R_long"
        );
    }
}
