//! Constant pool decoding (JVMS 4.4).
//!
//! The pool is parsed eagerly into a vector of [`ConstantPoolEntry`] values indexed exactly like
//! the class file indexes them: index 0 is unused, and `long` / `double` entries occupy two
//! indices, the second of which is [`ConstantPoolEntry::Unused`].
//!
//! Accessors resolve the symbolic references the decoder needs (class names, member
//! references, loadable constants) and report malformed indices as
//! [`crate::Error::Malformed`].

use crate::{
    file::parser::Parser,
    ir::{Constant, JavaType},
    Result,
};

/// `CONSTANT_Utf8`
pub const TAG_UTF8: u8 = 1;
/// `CONSTANT_Integer`
pub const TAG_INTEGER: u8 = 3;
/// `CONSTANT_Float`
pub const TAG_FLOAT: u8 = 4;
/// `CONSTANT_Long`
pub const TAG_LONG: u8 = 5;
/// `CONSTANT_Double`
pub const TAG_DOUBLE: u8 = 6;
/// `CONSTANT_Class`
pub const TAG_CLASS: u8 = 7;
/// `CONSTANT_String`
pub const TAG_STRING: u8 = 8;
/// `CONSTANT_Fieldref`
pub const TAG_FIELDREF: u8 = 9;
/// `CONSTANT_Methodref`
pub const TAG_METHODREF: u8 = 10;
/// `CONSTANT_InterfaceMethodref`
pub const TAG_INTERFACE_METHODREF: u8 = 11;
/// `CONSTANT_NameAndType`
pub const TAG_NAME_AND_TYPE: u8 = 12;
/// `CONSTANT_MethodHandle`
pub const TAG_METHOD_HANDLE: u8 = 15;
/// `CONSTANT_MethodType`
pub const TAG_METHOD_TYPE: u8 = 16;
/// `CONSTANT_Dynamic`
pub const TAG_DYNAMIC: u8 = 17;
/// `CONSTANT_InvokeDynamic`
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
/// `CONSTANT_Module`
pub const TAG_MODULE: u8 = 19;
/// `CONSTANT_Package`
pub const TAG_PACKAGE: u8 = 20;

/// A raw constant pool entry.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantPoolEntry {
    /// Index 0 and the upper half of `long` / `double` entries
    Unused,
    /// Modified UTF-8 string
    Utf8(String),
    /// `int` constant
    Integer(i32),
    /// `float` constant
    Float(f32),
    /// `long` constant
    Long(i64),
    /// `double` constant
    Double(f64),
    /// Class reference, index of the name
    Class(u16),
    /// String literal, index of the UTF-8 entry
    String(u16),
    /// Field reference
    FieldRef {
        /// Index of the owning class entry
        class: u16,
        /// Index of the name-and-type entry
        name_and_type: u16,
    },
    /// Class method reference
    MethodRef {
        /// Index of the owning class entry
        class: u16,
        /// Index of the name-and-type entry
        name_and_type: u16,
    },
    /// Interface method reference
    InterfaceMethodRef {
        /// Index of the owning class entry
        class: u16,
        /// Index of the name-and-type entry
        name_and_type: u16,
    },
    /// Member name and descriptor
    NameAndType {
        /// Index of the name
        name: u16,
        /// Index of the descriptor
        descriptor: u16,
    },
    /// Method handle
    MethodHandle {
        /// Reference kind (JVMS 5.4.3.5)
        kind: u8,
        /// Index of the referenced member
        reference: u16,
    },
    /// Method type, index of the descriptor
    MethodType(u16),
    /// Dynamically computed constant
    Dynamic {
        /// Index into the bootstrap method table
        bootstrap: u16,
        /// Index of the name-and-type entry
        name_and_type: u16,
    },
    /// Dynamically computed call site
    InvokeDynamic {
        /// Index into the bootstrap method table
        bootstrap: u16,
        /// Index of the name-and-type entry
        name_and_type: u16,
    },
    /// Module name
    Module(u16),
    /// Package name
    Package(u16),
}

/// A resolved field, method or interface method reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    /// Internal name of the owning class
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor
    pub descriptor: String,
    /// `true` for interface method references
    pub interface: bool,
}

/// A resolved method handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodHandle {
    /// Reference kind (JVMS 5.4.3.5)
    pub kind: u8,
    /// Referenced member
    pub member: MemberRef,
}

/// The parsed constant pool of one class.
#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<ConstantPoolEntry>,
}

impl ConstantPool {
    /// Reads `constant_pool_count` and the entries following it.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for unknown tags and [`crate::Error::Malformed`]
    /// or [`crate::Error::OutOfBounds`] for damaged input.
    pub fn parse(parser: &mut Parser) -> Result<Self> {
        let count = parser.read_be::<u16>()?;
        if count == 0 {
            return Err(malformed_error!("Constant pool count is zero"));
        }

        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(ConstantPoolEntry::Unused);
        while entries.len() < usize::from(count) {
            let tag = parser.read_be::<u8>()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = parser.read_be::<u16>()?;
                    ConstantPoolEntry::Utf8(parser.read_modified_utf8(usize::from(len))?)
                }
                TAG_INTEGER => ConstantPoolEntry::Integer(parser.read_be::<i32>()?),
                TAG_FLOAT => ConstantPoolEntry::Float(parser.read_be::<f32>()?),
                TAG_LONG => ConstantPoolEntry::Long(parser.read_be::<i64>()?),
                TAG_DOUBLE => ConstantPoolEntry::Double(parser.read_be::<f64>()?),
                TAG_CLASS => ConstantPoolEntry::Class(parser.read_be::<u16>()?),
                TAG_STRING => ConstantPoolEntry::String(parser.read_be::<u16>()?),
                TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF => {
                    let class = parser.read_be::<u16>()?;
                    let name_and_type = parser.read_be::<u16>()?;
                    match tag {
                        TAG_FIELDREF => ConstantPoolEntry::FieldRef {
                            class,
                            name_and_type,
                        },
                        TAG_METHODREF => ConstantPoolEntry::MethodRef {
                            class,
                            name_and_type,
                        },
                        _ => ConstantPoolEntry::InterfaceMethodRef {
                            class,
                            name_and_type,
                        },
                    }
                }
                TAG_NAME_AND_TYPE => ConstantPoolEntry::NameAndType {
                    name: parser.read_be::<u16>()?,
                    descriptor: parser.read_be::<u16>()?,
                },
                TAG_METHOD_HANDLE => ConstantPoolEntry::MethodHandle {
                    kind: parser.read_be::<u8>()?,
                    reference: parser.read_be::<u16>()?,
                },
                TAG_METHOD_TYPE => ConstantPoolEntry::MethodType(parser.read_be::<u16>()?),
                TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => {
                    let bootstrap = parser.read_be::<u16>()?;
                    let name_and_type = parser.read_be::<u16>()?;
                    if tag == TAG_DYNAMIC {
                        ConstantPoolEntry::Dynamic {
                            bootstrap,
                            name_and_type,
                        }
                    } else {
                        ConstantPoolEntry::InvokeDynamic {
                            bootstrap,
                            name_and_type,
                        }
                    }
                }
                TAG_MODULE => ConstantPoolEntry::Module(parser.read_be::<u16>()?),
                TAG_PACKAGE => ConstantPoolEntry::Package(parser.read_be::<u16>()?),
                other => {
                    return Err(unsupported_error!(
                        "constant pool tag {} at index {}",
                        other,
                        entries.len()
                    ))
                }
            };

            let wide = matches!(
                entry,
                ConstantPoolEntry::Long(_) | ConstantPoolEntry::Double(_)
            );
            entries.push(entry);
            if wide {
                entries.push(ConstantPoolEntry::Unused);
            }
        }

        if entries.len() != usize::from(count) {
            return Err(malformed_error!(
                "Wide constant overruns constant pool of size {}",
                count
            ));
        }

        Ok(ConstantPool { entries })
    }

    /// Number of indices, including the unused index 0.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the pool has no usable entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    /// Raw access to an entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for index 0, unused indices and indices past the end.
    pub fn get(&self, index: u16) -> Result<&ConstantPoolEntry> {
        match self.entries.get(usize::from(index)) {
            Some(ConstantPoolEntry::Unused) | None => {
                Err(malformed_error!("Invalid constant pool index {}", index))
            }
            Some(entry) => Ok(entry),
        }
    }

    /// Resolves a `CONSTANT_Utf8` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Utf8(value) => Ok(value),
            other => Err(malformed_error!("Expected Utf8 at {}, found {:?}", index, other)),
        }
    }

    /// Resolves a `CONSTANT_Class` entry to its internal name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::Class(name) => self.utf8(*name),
            other => Err(malformed_error!("Expected Class at {}, found {:?}", index, other)),
        }
    }

    /// Like [`ConstantPool::class_name`], but index 0 yields `None`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a non-zero index is invalid.
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>> {
        if index == 0 {
            Ok(None)
        } else {
            self.class_name(index).map(Some)
        }
    }

    /// Resolves a `CONSTANT_NameAndType` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(malformed_error!(
                "Expected NameAndType at {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a field, method or interface method reference.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn member_ref(&self, index: u16) -> Result<MemberRef> {
        let (class, name_and_type, interface) = match self.get(index)? {
            ConstantPoolEntry::FieldRef {
                class,
                name_and_type,
            }
            | ConstantPoolEntry::MethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, false),
            ConstantPoolEntry::InterfaceMethodRef {
                class,
                name_and_type,
            } => (*class, *name_and_type, true),
            other => {
                return Err(malformed_error!(
                    "Expected member reference at {}, found {:?}",
                    index,
                    other
                ))
            }
        };

        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            interface,
        })
    }

    /// Resolves a `CONSTANT_MethodHandle` entry.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn method_handle(&self, index: u16) -> Result<MethodHandle> {
        match self.get(index)? {
            ConstantPoolEntry::MethodHandle { kind, reference } => Ok(MethodHandle {
                kind: *kind,
                member: self.member_ref(*reference)?,
            }),
            other => Err(malformed_error!(
                "Expected MethodHandle at {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves a `CONSTANT_MethodType` entry to its descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn method_type(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            ConstantPoolEntry::MethodType(descriptor) => self.utf8(*descriptor),
            other => Err(malformed_error!(
                "Expected MethodType at {}, found {:?}",
                index,
                other
            )),
        }
    }

    /// Resolves an entry loadable by `ldc`, `ldc_w` or `ldc2_w`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for method handles, method types and dynamic
    /// constants, and [`crate::Error::Malformed`] for entries that are not loadable at all.
    pub fn loadable(&self, index: u16) -> Result<Constant> {
        Ok(match self.get(index)? {
            ConstantPoolEntry::Integer(value) => Constant::Int(*value),
            ConstantPoolEntry::Float(value) => Constant::Float(*value),
            ConstantPoolEntry::Long(value) => Constant::Long(*value),
            ConstantPoolEntry::Double(value) => Constant::Double(*value),
            ConstantPoolEntry::String(value) => Constant::String(self.utf8(*value)?.to_string()),
            ConstantPoolEntry::Class(name) => {
                Constant::Class(JavaType::from_class_constant(self.utf8(*name)?)?)
            }
            ConstantPoolEntry::MethodHandle { .. }
            | ConstantPoolEntry::MethodType(_)
            | ConstantPoolEntry::Dynamic { .. } => {
                return Err(unsupported_error!("loadable constant kind at index {}", index))
            }
            other => {
                return Err(malformed_error!(
                    "Constant at {} is not loadable: {:?}",
                    index,
                    other
                ))
            }
        })
    }

    /// Resolves a `ConstantValue` attribute's constant for a field.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is not a primitive or string constant.
    pub fn field_constant(&self, index: u16) -> Result<Constant> {
        match self.loadable(index)? {
            Constant::Class(_) => Err(malformed_error!(
                "Class literal used as field constant at {}",
                index
            )),
            constant => Ok(constant),
        }
    }

    /// Resolves a `CONSTANT_InvokeDynamic` entry to its bootstrap index, name and descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the entry is missing or of another kind.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(u16, &str, &str)> {
        match self.get(index)? {
            ConstantPoolEntry::InvokeDynamic {
                bootstrap,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((*bootstrap, name, descriptor))
            }
            other => Err(malformed_error!(
                "Expected InvokeDynamic at {}, found {:?}",
                index,
                other
            )),
        }
    }
}
