//! Class file decoding into the IR.
//!
//! A class file is read in one pass over its structure: constant pool, header, fields,
//! methods and class attributes. Method bodies are decoded last, because `invokedynamic`
//! call sites need the class level `BootstrapMethods` attribute. Decoding a class may
//! synthesize further classes (lambda proxies, annotation implementations) that are returned
//! alongside it.
//!
//! # Architecture
//!
//! ```text
//!  bytes ─▶ reader ─▶ ConstantPool
//!             │
//!             ├─▶ fields / methods / attributes ─▶ annotation trees
//!             │
//!             └─▶ code::decode ──┬─▶ Instruction stream (labels, line numbers)
//!                                └─▶ DynamicContext ─▶ lambda proxies, concat recipes
//! ```
//!
//! Parsing is all-or-nothing per class: any malformed or unsupported construct fails the class
//! and with it the compilation run.
//!
//! # Key Components
//!
//! - [`parse_class`] - Entry point, bytes to [`ParsedClass`]
//! - [`constpool::ConstantPool`] - Constant pool and symbolic reference resolution
//! - [`attributes`] - Attribute and annotation decoding
//! - [`code::decode`] - Bytecode to instruction stream
//! - [`dynamic::DynamicContext`] - `invokedynamic` lowering

pub mod attributes;
pub mod code;
pub mod constpool;
pub mod dynamic;
mod reader;
pub mod synthetic;

pub use reader::{parse_class, ParsedClass, MAGIC, MAX_MAJOR_VERSION};
