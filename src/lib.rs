// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # jvmaot
//!
//! An ahead-of-time compiler that translates JVM class files into C/C++ sources for a small
//! native runtime. Every retained class becomes a declaration file and an implementation file;
//! methods become plain functions operating on an explicit frame, virtual calls go through
//! slot-indexed dispatch tables, and exceptions are modelled with a stack of `setjmp` frames.
//!
//! ## Features
//!
//! - **📦 Class file input** - Directories, single classes, `.jar`/`.zip` archives and in-memory buffers
//! - **🔍 Stack flow analysis** - Typed inputs and outputs for every instruction, over all control paths
//! - **🧭 Structured exception exits** - Bypass flags route jumps out of nested protected regions
//! - **⚡ Slot allocation** - Abstract stack traffic lowered into reusable slots and temporaries
//! - **✂️ Whole-class elimination** - Only the dependency closure of the configured roots is emitted
//! - **🛡️ Memory safe** - No panics on malformed input; every failure is an [`Error`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jvmaot::prelude::*;
//! use std::path::Path;
//!
//! let mut config = CompilerConfig::default();
//! config.main_class = Some("app/Main".into());
//!
//! let mut compiler = Compiler::new(config);
//! compiler.add_source(ClassSource::from_path(Path::new("build/classes")));
//! let report = compiler.run(Path::new("native"))?;
//! println!("emitted {} classes", report.classes);
//! # Ok::<(), jvmaot::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  ClassSource ─▶ classfile ─▶ hierarchy ─▶ per-method passes ─────────────▶ dependencies ─▶ emit
//!                 (IR model)   (vtables)    analysis → rewrite → alloc       (closure)        (C/C++)
//! ```
//!
//! - [`file`] - Class sources and the byte cursor every decoder uses
//! - [`classfile`] - Constant pool, attributes, bytecode decoding, synthesized classes
//! - [`ir`] - The intermediate representation shared by all passes
//! - [`hierarchy`] - Class pool, superclass links and dispatch tables
//! - [`analysis`] - Stack flow analysis
//! - [`rewrite`] - Exception region markers and bypass routing
//! - [`alloc`] - Stack slot allocation
//! - [`dependencies`] - Dependency closure and class name patterns
//! - [`emit`] - Native source rendering
//! - [`emulation`] - Reference interpreter used to check the passes against each other
//! - [`compiler`] - Pass scheduling and the whole-run driver
//! - [`config`] - Run configuration
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Fatal problems (malformed input,
//! unsupported bytecode, unresolved instructions, a required class missing from the output)
//! abort the run; recoverable ones (a class with a missing superclass, an unmatched intrinsic)
//! are logged through the `log` facade and skipped.

#[macro_use]
pub(crate) mod error;

pub mod alloc;
pub mod analysis;
pub mod classfile;
pub mod compiler;
pub mod config;
pub mod dependencies;
pub mod emit;
pub mod emulation;
pub mod file;
pub mod hierarchy;
pub mod ir;
pub mod prelude;
pub mod rewrite;

/// `jvmaot` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
/// This is used consistently throughout the crate for all fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// `jvmaot` Error type
///
/// The main error type for all operations in this crate. Each variant documents the
/// failure it stands for and whether the compiler treats it as fatal.
pub use error::Error;

pub use compiler::{Compiler, CompileReport};
pub use config::CompilerConfig;
pub use file::{parser::Parser, ClassSource};
