//! Attribute decoding (JVMS 4.7).
//!
//! Only the attributes the compiler needs are decoded; [`read_attributes`] hands back every
//! attribute by name so the caller can pick, and skips the rest without looking at them.

use crate::{
    classfile::constpool::{ConstantPool, MethodHandle},
    file::parser::Parser,
    ir::{AccessFlags, Annotation, AnnotationValue, InnerClassInfo, JavaType},
    Result,
};

/// `Code`
pub const CODE: &str = "Code";
/// `ConstantValue`
pub const CONSTANT_VALUE: &str = "ConstantValue";
/// `RuntimeVisibleAnnotations`
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";
/// `AnnotationDefault`
pub const ANNOTATION_DEFAULT: &str = "AnnotationDefault";
/// `BootstrapMethods`
pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
/// `LineNumberTable`
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
/// `InnerClasses`
pub const INNER_CLASSES: &str = "InnerClasses";

/// A named attribute and its undecoded payload.
#[derive(Debug, Clone, Copy)]
pub struct RawAttribute<'a> {
    /// Attribute name
    pub name: &'a str,
    /// Attribute payload
    pub data: &'a [u8],
}

/// Reads an `attributes_count` prefixed attribute table.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] for damaged tables.
pub fn read_attributes<'d: 'a, 'p: 'a, 'a>(
    parser: &mut Parser<'d>,
    pool: &'p ConstantPool,
) -> Result<Vec<RawAttribute<'a>>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?;
        let length = parser.read_be::<u32>()? as usize;
        let data = parser.read_bytes(length)?;
        attributes.push(RawAttribute { name, data });
    }
    Ok(attributes)
}

/// Finds an attribute by name.
#[must_use]
pub fn find<'a>(attributes: &[RawAttribute<'a>], name: &str) -> Option<RawAttribute<'a>> {
    attributes.iter().find(|attribute| attribute.name == name).copied()
}

/// A raw exception table entry, by bytecode offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// First protected offset
    pub start: u32,
    /// Offset after the last protected instruction
    pub end: u32,
    /// Handler offset
    pub handler: u32,
    /// Constant pool index of the caught class, 0 for any
    pub catch_type: u16,
}

/// A decoded `Code` attribute, bytecode still undecoded.
#[derive(Debug, Clone)]
pub struct CodeAttribute<'a> {
    /// Declared maximum stack depth
    pub max_stack: u16,
    /// Declared local variable count
    pub max_locals: u16,
    /// The bytecode
    pub code: &'a [u8],
    /// Exception table in declaration order
    pub exceptions: Vec<ExceptionEntry>,
    /// `(offset, line)` pairs from every `LineNumberTable`
    pub lines: Vec<(u32, u16)>,
}

impl<'a> CodeAttribute<'a> {
    /// Decodes a `Code` attribute payload.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or [`crate::Error::Malformed`] for damaged input.
    pub fn parse(data: &'a [u8], pool: &'a ConstantPool) -> Result<Self> {
        let mut parser = Parser::new(data);
        let max_stack = parser.read_be::<u16>()?;
        let max_locals = parser.read_be::<u16>()?;
        let length = parser.read_be::<u32>()? as usize;
        if length == 0 {
            return Err(malformed_error!("Empty Code attribute"));
        }
        let code = parser.read_bytes(length)?;

        let count = parser.read_be::<u16>()?;
        let mut exceptions = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            exceptions.push(ExceptionEntry {
                start: u32::from(parser.read_be::<u16>()?),
                end: u32::from(parser.read_be::<u16>()?),
                handler: u32::from(parser.read_be::<u16>()?),
                catch_type: parser.read_be::<u16>()?,
            });
        }

        let mut lines = Vec::new();
        for attribute in read_attributes(&mut parser, pool)? {
            if attribute.name != LINE_NUMBER_TABLE {
                continue;
            }
            let mut table = Parser::new(attribute.data);
            let entries = table.read_be::<u16>()?;
            for _ in 0..entries {
                let offset = u32::from(table.read_be::<u16>()?);
                let line = table.read_be::<u16>()?;
                lines.push((offset, line));
            }
        }

        Ok(CodeAttribute {
            max_stack,
            max_locals,
            code,
            exceptions,
            lines,
        })
    }
}

/// A `BootstrapMethods` entry.
#[derive(Debug, Clone)]
pub struct BootstrapMethod {
    /// The bootstrap method handle
    pub handle: MethodHandle,
    /// Constant pool indices of the static arguments
    pub arguments: Vec<u16>,
}

/// Decodes a `BootstrapMethods` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an entry does not name a method handle.
pub fn bootstrap_methods(data: &[u8], pool: &ConstantPool) -> Result<Vec<BootstrapMethod>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let handle = pool.method_handle(parser.read_be::<u16>()?)?;
        let argument_count = parser.read_be::<u16>()?;
        let mut arguments = Vec::with_capacity(usize::from(argument_count));
        for _ in 0..argument_count {
            arguments.push(parser.read_be::<u16>()?);
        }
        methods.push(BootstrapMethod { handle, arguments });
    }
    Ok(methods)
}

/// Decodes an `InnerClasses` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid constant pool references.
pub fn inner_classes(data: &[u8], pool: &ConstantPool) -> Result<Vec<InnerClassInfo>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut classes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let inner = pool.class_name(parser.read_be::<u16>()?)?.to_string();
        let outer = pool
            .optional_class_name(parser.read_be::<u16>()?)?
            .map(str::to_string);
        let name_index = parser.read_be::<u16>()?;
        let name = if name_index == 0 {
            None
        } else {
            Some(pool.utf8(name_index)?.to_string())
        };
        let access = AccessFlags::from_bits_truncate(parser.read_be::<u16>()?);
        classes.push(InnerClassInfo {
            inner,
            outer,
            name,
            access,
        });
    }
    Ok(classes)
}

fn class_from_descriptor(descriptor: &str) -> Result<String> {
    match JavaType::parse(descriptor)? {
        JavaType::Class(name) => Ok(name),
        other => Err(malformed_error!(
            "Expected a class descriptor, found {}",
            other
        )),
    }
}

/// Decodes a `RuntimeVisibleAnnotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown element tags or invalid references.
pub fn annotations(data: &[u8], pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(annotation(&mut parser, pool)?);
    }
    Ok(annotations)
}

/// Decodes an `AnnotationDefault` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown element tags or invalid references.
pub fn annotation_default(data: &[u8], pool: &ConstantPool) -> Result<AnnotationValue> {
    let mut parser = Parser::new(data);
    element_value(&mut parser, pool)
}

fn annotation(parser: &mut Parser, pool: &ConstantPool) -> Result<Annotation> {
    let ty = class_from_descriptor(pool.utf8(parser.read_be::<u16>()?)?)?;
    let count = parser.read_be::<u16>()?;
    let mut values = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        values.push((name, element_value(parser, pool)?));
    }
    Ok(Annotation { ty, values })
}

fn int_constant(pool: &ConstantPool, index: u16) -> Result<i32> {
    match pool.get(index)? {
        crate::classfile::constpool::ConstantPoolEntry::Integer(value) => Ok(*value),
        other => Err(malformed_error!(
            "Expected Integer annotation constant at {}, found {:?}",
            index,
            other
        )),
    }
}

fn element_value(parser: &mut Parser, pool: &ConstantPool) -> Result<AnnotationValue> {
    use crate::classfile::constpool::ConstantPoolEntry;

    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        b'B' => AnnotationValue::Byte(int_constant(pool, parser.read_be::<u16>()?)? as i8),
        b'C' => AnnotationValue::Char(int_constant(pool, parser.read_be::<u16>()?)? as u16),
        b'S' => AnnotationValue::Short(int_constant(pool, parser.read_be::<u16>()?)? as i16),
        b'Z' => AnnotationValue::Boolean(int_constant(pool, parser.read_be::<u16>()?)? != 0),
        b'I' => AnnotationValue::Int(int_constant(pool, parser.read_be::<u16>()?)?),
        b'J' | b'F' | b'D' => {
            let index = parser.read_be::<u16>()?;
            match (tag, pool.get(index)?) {
                (b'J', ConstantPoolEntry::Long(value)) => AnnotationValue::Long(*value),
                (b'F', ConstantPoolEntry::Float(value)) => AnnotationValue::Float(*value),
                (b'D', ConstantPoolEntry::Double(value)) => AnnotationValue::Double(*value),
                (_, other) => {
                    return Err(malformed_error!(
                        "Annotation constant {} does not match tag {}: {:?}",
                        index,
                        char::from(tag),
                        other
                    ))
                }
            }
        }
        b's' => AnnotationValue::String(pool.utf8(parser.read_be::<u16>()?)?.to_string()),
        b'e' => {
            let ty = class_from_descriptor(pool.utf8(parser.read_be::<u16>()?)?)?;
            let constant = pool.utf8(parser.read_be::<u16>()?)?.to_string();
            AnnotationValue::Enum { ty, constant }
        }
        b'c' => AnnotationValue::Class(JavaType::parse(pool.utf8(parser.read_be::<u16>()?)?)?),
        b'@' => AnnotationValue::Annotation(annotation(parser, pool)?),
        b'[' => {
            let count = parser.read_be::<u16>()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(element_value(parser, pool)?);
            }
            AnnotationValue::Array(values)
        }
        other => {
            return Err(malformed_error!(
                "Unknown annotation element tag {:#04x}",
                other
            ))
        }
    })
}
