//! Intermediate representation shared by every compiler pass.
//!
//! The IR mirrors the class file closely: a [`ClassDescriptor`] owns its fields and methods, a
//! [`MethodDescriptor`] owns a flat list of [`Instruction`]s and its exception table. Passes
//! never build a separate graph; they annotate the instructions in place (resolved I/O, bypass
//! routes, bound call targets) and store per-method results such as the slot allocation plan
//! back onto the method.
//!
//! # Architecture
//!
//! ```text
//! ClassDescriptor
//!  ├── FieldDescriptor*            name, JavaType, flags, constant, annotations
//!  ├── MethodDescriptor*
//!  │    ├── Instruction*           kind + Option<InstructionIo>
//!  │    ├── TryCatchRegion*        labels, catch type, bypass hops
//!  │    └── MethodPlan?            slot allocation result
//!  ├── Annotation*                 value trees
//!  └── VTableEntry*                slot index = position
//! ```
//!
//! # Key Components
//!
//! - [`crate::ir::JavaType`] / [`crate::ir::TypeKind`] - Value types
//! - [`crate::ir::MethodSignature`] - Parsed method descriptors
//! - [`crate::ir::Opcode`] - JVM opcodes and their arity categories
//! - [`crate::ir::Instruction`] - Instructions and pseudo-instructions
//! - [`crate::ir::names`] - Native symbol mangling

mod annotation;
mod class;
mod instruction;
mod method;
pub mod names;
mod opcode;
mod signature;
mod types;

pub use annotation::{Annotation, AnnotationValue};
pub use class::{
    AccessFlags, ClassDescriptor, ClassId, FieldDescriptor, HierarchyState, InnerClassInfo,
    VTableEntry,
};
pub use instruction::{
    Constant, Destination, Dispatch, FieldRef, Instruction, InstructionIo, InstructionKind,
    JumpTarget, LabelId, LambdaSite, MethodRef, Route, ScopeId,
};
pub use method::{Bypass, MethodDescriptor, TryCatchRegion};
pub use opcode::{Category, Opcode};
pub use signature::{MethodSignature, CONSTRUCTOR_NAME, STATIC_INITIALIZER_NAME};
pub use types::{JavaType, TypeKind, CLASS_CLASS, OBJECT_CLASS, STRING_CLASS, THROWABLE_CLASS};
