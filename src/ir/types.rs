//! Java value types and their native representations.
//!
//! Every value the compiler reasons about is described by a [`JavaType`]. The operand stack and
//! the local variable frame only distinguish five storage kinds (`int`, `long`, `float`,
//! `double` and references), which is what [`JavaType::stack_kind`] collapses a type to. Sub-int
//! primitives (`boolean`, `byte`, `char`, `short`) live on the stack as `int`, exactly like the
//! JVM treats them.
//!
//! # Descriptor grammar
//!
//! ```text
//! FieldType  := BaseType | 'L' ClassName ';' | '[' FieldType
//! BaseType   := 'Z' | 'B' | 'C' | 'S' | 'I' | 'J' | 'F' | 'D'
//! ReturnType := FieldType | 'V'
//! ```
//!
//! # Examples
//!
//! ```rust
//! use jvmaot::ir::{JavaType, TypeKind};
//!
//! let ty = JavaType::parse("[[Ljava/lang/String;")?;
//! assert_eq!(ty.stack_kind(), TypeKind::Object);
//! assert_eq!(ty.suffix(), "Array2_java_lang_String");
//! assert_eq!(ty.class_reference(), Some("java/lang/String"));
//! # Ok::<(), jvmaot::Error>(())
//! ```

use std::fmt;

use strum::{EnumCount, EnumIter, IntoStaticStr};

use crate::{ir::names::qualified_name, Result};

/// Internal name of the root object class.
pub const OBJECT_CLASS: &str = "java/lang/Object";
/// Internal name of the string class.
pub const STRING_CLASS: &str = "java/lang/String";
/// Internal name of the throwable root class.
pub const THROWABLE_CLASS: &str = "java/lang/Throwable";
/// Internal name of the class object class.
pub const CLASS_CLASS: &str = "java/lang/Class";

/// The basic kinds of Java values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum TypeKind {
    /// `boolean` (`Z`)
    Boolean,
    /// `byte` (`B`)
    Byte,
    /// `char` (`C`)
    Char,
    /// `short` (`S`)
    Short,
    /// `int` (`I`)
    Int,
    /// `long` (`J`)
    Long,
    /// `float` (`F`)
    Float,
    /// `double` (`D`)
    Double,
    /// `void` (`V`), only valid as a return type
    Void,
    /// Any reference (class instance or array)
    Object,
}

impl TypeKind {
    /// Maps a base type descriptor character to its kind.
    #[must_use]
    pub fn from_descriptor(c: char) -> Option<Self> {
        Some(match c {
            'Z' => TypeKind::Boolean,
            'B' => TypeKind::Byte,
            'C' => TypeKind::Char,
            'S' => TypeKind::Short,
            'I' => TypeKind::Int,
            'J' => TypeKind::Long,
            'F' => TypeKind::Float,
            'D' => TypeKind::Double,
            'V' => TypeKind::Void,
            _ => return None,
        })
    }

    /// Maps a `newarray` type code (JVMS 6.5) to the component kind.
    #[must_use]
    pub fn from_array_code(code: i32) -> Option<Self> {
        Some(match code {
            4 => TypeKind::Boolean,
            5 => TypeKind::Char,
            6 => TypeKind::Float,
            7 => TypeKind::Double,
            8 => TypeKind::Byte,
            9 => TypeKind::Short,
            10 => TypeKind::Int,
            11 => TypeKind::Long,
            _ => return None,
        })
    }

    /// The descriptor character, `L` for references.
    #[must_use]
    pub fn descriptor(self) -> char {
        match self {
            TypeKind::Boolean => 'Z',
            TypeKind::Byte => 'B',
            TypeKind::Char => 'C',
            TypeKind::Short => 'S',
            TypeKind::Int => 'I',
            TypeKind::Long => 'J',
            TypeKind::Float => 'F',
            TypeKind::Double => 'D',
            TypeKind::Void => 'V',
            TypeKind::Object => 'L',
        }
    }

    /// Java source name of the kind (`int`, `boolean`, ...).
    #[must_use]
    pub fn java_name(self) -> &'static str {
        self.into()
    }

    /// Native type used for values of this kind.
    #[must_use]
    pub fn c_type(self) -> &'static str {
        match self {
            TypeKind::Boolean => "jbool",
            TypeKind::Byte => "jbyte",
            TypeKind::Char => "jchar",
            TypeKind::Short => "jshort",
            TypeKind::Int => "jint",
            TypeKind::Long => "jlong",
            TypeKind::Float => "jfloat",
            TypeKind::Double => "jdouble",
            TypeKind::Void => "void",
            TypeKind::Object => "jobject",
        }
    }

    /// Member of the `jtype` union holding values of this kind.
    #[must_use]
    pub fn union_member(self) -> &'static str {
        match self.stack_kind() {
            TypeKind::Long => "l",
            TypeKind::Float => "f",
            TypeKind::Double => "d",
            TypeKind::Object => "o",
            _ => "i",
        }
    }

    /// The kind a value of this type occupies on the operand stack.
    #[must_use]
    pub fn stack_kind(self) -> TypeKind {
        match self {
            TypeKind::Boolean | TypeKind::Byte | TypeKind::Char | TypeKind::Short => TypeKind::Int,
            other => other,
        }
    }

    /// `true` for `long` and `double`, the JVM's category 2 types.
    #[must_use]
    pub fn is_wide(self) -> bool {
        matches!(self, TypeKind::Long | TypeKind::Double)
    }

    /// Number of local variable indices a value of this kind occupies.
    #[must_use]
    pub fn local_size(self) -> u16 {
        if self.is_wide() {
            2
        } else {
            1
        }
    }
}

/// A fully described Java type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JavaType {
    /// A primitive or `void`
    Primitive(TypeKind),
    /// A class or interface, by internal name (`java/lang/String`)
    Class(String),
    /// An array; the component is never itself an array
    Array {
        /// Innermost component type
        component: Box<JavaType>,
        /// Number of dimensions, at least 1
        dimensions: u8,
    },
}

impl JavaType {
    /// `int`
    #[must_use]
    pub fn int() -> Self {
        JavaType::Primitive(TypeKind::Int)
    }

    /// `void`
    #[must_use]
    pub fn void() -> Self {
        JavaType::Primitive(TypeKind::Void)
    }

    /// `java.lang.Object`
    #[must_use]
    pub fn object() -> Self {
        JavaType::Class(OBJECT_CLASS.to_string())
    }

    /// `java.lang.Throwable`
    #[must_use]
    pub fn throwable() -> Self {
        JavaType::Class(THROWABLE_CLASS.to_string())
    }

    /// `java.lang.String`
    #[must_use]
    pub fn string() -> Self {
        JavaType::Class(STRING_CLASS.to_string())
    }

    /// Wraps `component` into an array type with `dimensions` additional dimensions.
    #[must_use]
    pub fn array_of(component: JavaType, dimensions: u8) -> Self {
        match component {
            JavaType::Array {
                component,
                dimensions: inner,
            } => JavaType::Array {
                component,
                dimensions: inner.saturating_add(dimensions),
            },
            other => JavaType::Array {
                component: Box::new(other),
                dimensions,
            },
        }
    }

    /// Parses a complete field or return type descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when the descriptor is invalid or has trailing data.
    pub fn parse(descriptor: &str) -> Result<Self> {
        let (ty, rest) = Self::parse_prefix(descriptor)?;
        if !rest.is_empty() {
            return Err(malformed_error!("Trailing data in type descriptor '{}'", descriptor));
        }
        Ok(ty)
    }

    /// Parses the leading type of `descriptor` and returns it together with the remainder.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] when no valid type starts the input.
    pub fn parse_prefix(descriptor: &str) -> Result<(Self, &str)> {
        let dimensions = descriptor.bytes().take_while(|b| *b == b'[').count();
        let rest = &descriptor[dimensions..];

        let (component, rest) = match rest.chars().next() {
            Some('L') => {
                let end = rest
                    .find(';')
                    .ok_or_else(|| malformed_error!("Unterminated class type in '{}'", descriptor))?;
                if end == 1 {
                    return Err(malformed_error!("Empty class name in '{}'", descriptor));
                }
                (JavaType::Class(rest[1..end].to_string()), &rest[end + 1..])
            }
            Some(c) => match TypeKind::from_descriptor(c) {
                Some(kind) => (JavaType::Primitive(kind), &rest[1..]),
                None => return Err(malformed_error!("Invalid type descriptor '{}'", descriptor)),
            },
            None => return Err(malformed_error!("Empty type descriptor")),
        };

        if dimensions == 0 {
            return Ok((component, rest));
        }
        if component == JavaType::void() || dimensions > 255 {
            return Err(malformed_error!("Invalid array descriptor '{}'", descriptor));
        }

        Ok((
            JavaType::Array {
                component: Box::new(component),
                dimensions: dimensions as u8,
            },
            rest,
        ))
    }

    /// Interprets a `CONSTANT_Class` name, which is either an internal class name or, for
    /// arrays, a full descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for an invalid array descriptor.
    pub fn from_class_constant(name: &str) -> Result<Self> {
        if name.starts_with('[') {
            Self::parse(name)
        } else {
            Ok(JavaType::Class(name.to_string()))
        }
    }

    /// The JVM descriptor of this type.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match self {
            JavaType::Primitive(kind) => kind.descriptor().to_string(),
            JavaType::Class(name) => format!("L{name};"),
            JavaType::Array {
                component,
                dimensions,
            } => format!("{}{}", "[".repeat(usize::from(*dimensions)), component.descriptor()),
        }
    }

    /// The basic kind, with arrays reported as [`TypeKind::Object`].
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            JavaType::Primitive(kind) => *kind,
            _ => TypeKind::Object,
        }
    }

    /// The kind this value occupies on the operand stack.
    #[must_use]
    pub fn stack_kind(&self) -> TypeKind {
        self.kind().stack_kind()
    }

    /// `true` for class and array types.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !matches!(self, JavaType::Primitive(_))
    }

    /// `true` for `void`.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self, JavaType::Primitive(TypeKind::Void))
    }

    /// `true` for `long` and `double`.
    #[must_use]
    pub fn is_wide(&self) -> bool {
        self.kind().is_wide()
    }

    /// Native type name.
    #[must_use]
    pub fn c_type(&self) -> &'static str {
        self.kind().c_type()
    }

    /// The array dimension count, 0 for non-arrays.
    #[must_use]
    pub fn dimensions(&self) -> u8 {
        match self {
            JavaType::Array { dimensions, .. } => *dimensions,
            _ => 0,
        }
    }

    /// The element type of an array, one dimension removed.
    #[must_use]
    pub fn element(&self) -> Option<JavaType> {
        match self {
            JavaType::Array {
                component,
                dimensions: 1,
            } => Some((**component).clone()),
            JavaType::Array {
                component,
                dimensions,
            } => Some(JavaType::Array {
                component: component.clone(),
                dimensions: dimensions - 1,
            }),
            _ => None,
        }
    }

    /// The class this type refers to, looking through array dimensions.
    #[must_use]
    pub fn class_reference(&self) -> Option<&str> {
        match self {
            JavaType::Class(name) => Some(name),
            JavaType::Array { component, .. } => component.class_reference(),
            JavaType::Primitive(_) => None,
        }
    }

    /// Name fragment used when this type appears in a mangled method symbol.
    #[must_use]
    pub fn suffix(&self) -> String {
        match self {
            JavaType::Primitive(kind) => kind.java_name().to_string(),
            JavaType::Class(name) => qualified_name(name),
            JavaType::Array {
                component,
                dimensions,
            } => format!("Array{}_{}", dimensions, component.suffix()),
        }
    }

    /// Native expression evaluating to the runtime class object of this type.
    #[must_use]
    pub fn class_fetch(&self) -> String {
        match self {
            JavaType::Primitive(kind) => format!("&class_{}", kind.java_name()),
            JavaType::Class(name) => format!("&class_{}", qualified_name(name)),
            JavaType::Array {
                component,
                dimensions,
            } => format!("getArrayClass({}, {})", component.class_fetch(), dimensions),
        }
    }
}

impl fmt::Display for JavaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

impl From<TypeKind> for JavaType {
    fn from(kind: TypeKind) -> Self {
        match kind {
            TypeKind::Object => JavaType::object(),
            other => JavaType::Primitive(other),
        }
    }
}
