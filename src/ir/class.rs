//! Class and field descriptors.

use std::collections::BTreeSet;

use bitflags::bitflags;

use crate::ir::{
    annotation::Annotation,
    instruction::Constant,
    method::MethodDescriptor,
    names::qualified_name,
    signature::MethodSignature,
    types::JavaType,
};

bitflags! {
    /// Access and property flags shared by classes, fields and methods (JVMS 4.1, 4.5, 4.6).
    ///
    /// Some bits mean different things depending on where they appear, those have one
    /// constant per meaning.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccessFlags: u16 {
        /// Visible everywhere
        const PUBLIC = 0x0001;
        /// Visible in the declaring class only
        const PRIVATE = 0x0002;
        /// Visible to subclasses and the package
        const PROTECTED = 0x0004;
        /// Class member rather than instance member
        const STATIC = 0x0008;
        /// No subclassing / overriding / reassignment
        const FINAL = 0x0010;
        /// Method holds the receiver's monitor while running
        const SYNCHRONIZED = 0x0020;
        /// Class uses modern `invokespecial` semantics
        const SUPER = 0x0020;
        /// Field is volatile
        const VOLATILE = 0x0040;
        /// Method is a compiler-generated bridge
        const BRIDGE = 0x0040;
        /// Field is not serialized
        const TRANSIENT = 0x0080;
        /// Method takes a variable number of arguments
        const VARARGS = 0x0080;
        /// Method is implemented natively
        const NATIVE = 0x0100;
        /// Class is an interface
        const INTERFACE = 0x0200;
        /// Class or method is abstract
        const ABSTRACT = 0x0400;
        /// Method uses strict floating point
        const STRICT = 0x0800;
        /// Not present in source code
        const SYNTHETIC = 0x1000;
        /// Class is an annotation interface
        const ANNOTATION = 0x2000;
        /// Class or field is an enum (constant)
        const ENUM = 0x4000;
    }
}

/// Index of a class inside the class pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub usize);

/// Progress of hierarchy resolution for one class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HierarchyState {
    /// Not visited yet
    #[default]
    Pending,
    /// Currently being resolved further up the call chain
    Processing,
    /// Links and vtable are final
    Resolved,
    /// A super class or interface is missing, the class is excluded
    Errored,
}

/// An entry of the `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InnerClassInfo {
    /// Internal name of the inner class
    pub inner: String,
    /// Internal name of the enclosing class, absent for local and anonymous classes
    pub outer: Option<String>,
    /// Simple source name, absent for anonymous classes
    pub name: Option<String>,
    /// Access flags as declared in source
    pub access: AccessFlags,
}

/// One slot of a class's virtual dispatch table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VTableEntry {
    /// Signature the slot dispatches on
    pub signature: MethodSignature,
    /// Class whose body fills the slot
    pub owner: String,
    /// `true` while no concrete body exists for the slot
    pub is_abstract: bool,
}

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name
    pub name: String,
    /// Field type
    pub ty: JavaType,
    /// Access flags
    pub access: AccessFlags,
    /// Compile time constant initializer of a static field
    pub constant: Option<Constant>,
    /// Runtime visible annotations
    pub annotations: Vec<Annotation>,
    /// Weak reference field.
    ///
    /// The field keeps its ordinary `jref` slot and offset in the object layout. The only effect
    /// is that [`FieldDescriptor::is_traced`] returns `false`, so neither the emitted mark function
    /// nor the emulator's collector keep the referent alive through it.
    pub weak: bool,
}

impl FieldDescriptor {
    /// `true` for static fields.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// `true` if the collector has to trace this field.
    #[must_use]
    pub fn is_traced(&self) -> bool {
        self.ty.is_reference() && !self.weak
    }
}

/// A parsed class together with everything later passes compute for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDescriptor {
    /// Internal name
    pub name: String,
    /// Internal name of the super class, absent only for the root object class
    pub super_name: Option<String>,
    /// Internal names of directly implemented interfaces
    pub interfaces: Vec<String>,
    /// Access flags
    pub access: AccessFlags,
    /// Fields in declaration order
    pub fields: Vec<FieldDescriptor>,
    /// Methods in declaration order
    pub methods: Vec<MethodDescriptor>,
    /// Runtime visible annotations
    pub annotations: Vec<Annotation>,
    /// Entries of the `InnerClasses` attribute
    pub inner_classes: Vec<InnerClassInfo>,
    /// Enclosing class, if this class is nested
    pub outer_class: Option<String>,
    /// `true` for anonymous classes
    pub anonymous: bool,
    /// Resolved super class
    pub super_class: Option<ClassId>,
    /// Resolved interfaces, parallel to `interfaces`
    pub interface_classes: Vec<ClassId>,
    /// Virtual dispatch table; the slot index is the position
    pub vtable: Vec<VTableEntry>,
    /// Ordered method table of an interface, indexed by interface dispatch
    pub interface_methods: Vec<MethodSignature>,
    /// Classes this class needs at runtime
    pub dependencies: BTreeSet<String>,
    /// Hierarchy resolution progress
    pub state: HierarchyState,
    /// Emit reflection metadata for this class
    pub reflective: bool,
}

impl ClassDescriptor {
    /// Creates an empty class with the given name and super class.
    #[must_use]
    pub fn new(name: &str, super_name: Option<&str>, access: AccessFlags) -> Self {
        ClassDescriptor {
            name: name.to_string(),
            super_name: super_name.map(str::to_string),
            interfaces: Vec::new(),
            access,
            fields: Vec::new(),
            methods: Vec::new(),
            annotations: Vec::new(),
            inner_classes: Vec::new(),
            outer_class: None,
            anonymous: false,
            super_class: None,
            interface_classes: Vec::new(),
            vtable: Vec::new(),
            interface_methods: Vec::new(),
            dependencies: BTreeSet::new(),
            state: HierarchyState::Pending,
            reflective: false,
        }
    }

    /// The native identifier of the class.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        qualified_name(&self.name)
    }

    /// `true` for interfaces, annotation interfaces included.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.access.contains(AccessFlags::INTERFACE)
    }

    /// `true` for abstract classes and interfaces.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// `true` for annotation interfaces.
    #[must_use]
    pub fn is_annotation(&self) -> bool {
        self.access.contains(AccessFlags::ANNOTATION)
    }

    /// `true` for enum classes.
    #[must_use]
    pub fn is_enum(&self) -> bool {
        self.access.contains(AccessFlags::ENUM)
    }

    /// Finds a declared method by signature.
    #[must_use]
    pub fn find_method(&self, signature: &MethodSignature) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| &m.signature == signature)
    }

    /// Finds a declared method by name and descriptor.
    #[must_use]
    pub fn find_method_by_name(&self, name: &str, descriptor: &str) -> Option<&MethodDescriptor> {
        self.methods
            .iter()
            .find(|m| m.signature.name() == name && m.signature.descriptor() == descriptor)
    }

    /// Finds a declared field by name.
    #[must_use]
    pub fn find_field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Finds the vtable slot of a signature.
    #[must_use]
    pub fn vtable_slot(&self, signature: &MethodSignature) -> Option<usize> {
        self.vtable.iter().position(|e| &e.signature == signature)
    }

    /// The static initializer, if declared.
    #[must_use]
    pub fn static_initializer(&self) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.signature.is_static_initializer())
    }

    /// Instance fields in declaration order.
    pub fn instance_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.is_static())
    }

    /// Static fields in declaration order.
    pub fn static_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| f.is_static())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_aliases() {
        let flags = AccessFlags::from_bits_truncate(0x0021);
        assert!(flags.contains(AccessFlags::SUPER));
        assert!(flags.contains(AccessFlags::SYNCHRONIZED));
        assert!(flags.contains(AccessFlags::PUBLIC));
    }

    #[test]
    fn test_field_queries() {
        let mut class = ClassDescriptor::new("pkg/A", Some("java/lang/Object"), AccessFlags::PUBLIC);
        class.fields.push(FieldDescriptor {
            name: "next".into(),
            ty: JavaType::Class("pkg/A".into()),
            access: AccessFlags::PRIVATE,
            constant: None,
            annotations: Vec::new(),
            weak: false,
        });
        class.fields.push(FieldDescriptor {
            name: "COUNT".into(),
            ty: JavaType::int(),
            access: AccessFlags::STATIC,
            constant: Some(Constant::Int(3)),
            annotations: Vec::new(),
            weak: false,
        });
        assert_eq!(class.instance_fields().count(), 1);
        assert_eq!(class.static_fields().count(), 1);
        assert!(class.find_field("next").unwrap().is_traced());
        assert!(!class.find_field("COUNT").unwrap().is_traced());
        assert_eq!(class.qualified_name(), "pkg_A");
    }
}
