//! # jvmaot Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! of the jvmaot library. Import it to drive a compilation or to inspect the intermediate
//! representation between passes.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all jvmaot operations
pub use crate::Error;

/// The result type used throughout jvmaot
pub use crate::Result;

/// Run configuration
pub use crate::CompilerConfig;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Whole-run driver and its results
pub use crate::compiler::{CompileReport, Compilation, Compiler};

/// Class inputs and the byte cursor
pub use crate::{ClassSource, Parser};

/// Rendered output
pub use crate::emit::EmittedFile;

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Classes, methods and instructions
pub use crate::ir::{
    ClassDescriptor, Instruction, InstructionKind, JavaType, MethodDescriptor, MethodSignature,
    Opcode, TryCatchRegion, TypeKind,
};

/// The class pool
pub use crate::hierarchy::ClassPool;

// ================================================================================================
// Passes
// ================================================================================================

/// Per-method pass infrastructure
pub use crate::compiler::{CompilerContext, MethodPass, PassScheduler};

/// Reference interpreter
pub use crate::emulation::{compare_plans, EmValue, EmulationConfig, Interpreter, PlanMode};
