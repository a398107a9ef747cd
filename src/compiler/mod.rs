//! Pass scheduling and the whole-run driver.
//!
//! This module ties the phases together:
//!
//! - [`crate::classfile`] and [`crate::hierarchy`] - input to a resolved class pool
//! - [`compiler`](self) - per-method passes and the run itself
//! - [`crate::dependencies`] and [`crate::emit`] - closure and native sources
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      Compiler::prepare                           │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  load                        sources → ClassPool, config merge   │
//! │  resolve_all                 links, vtables, interface indices   │
//! │  extras + bind_symbols       intrinsics, weak fields, reflection │
//! │                                                                  │
//! │  PassScheduler               one pass at a time, methods in      │
//! │    ├─ FlowAnalysisPass        parallel                           │
//! │    ├─ ExceptionRewritePass                                       │
//! │    ├─ LabelTrimPass                                              │
//! │    └─ SlotAllocationPass                                         │
//! │                                                                  │
//! │  find_main_class + collect   entry point and closure             │
//! │                                                                  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  Compilation::emit           closure → EmittedFile list          │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Components
//!
//! - [`Compiler`] - Collects sources and runs every phase
//! - [`MethodPass`] - Interface of all per-method passes
//! - [`PassScheduler`] - Runs passes over a pool
//! - [`CompilerContext`] - Configuration and counters shared by the passes

mod context;
mod driver;
mod pass;
mod passes;
mod scheduler;

pub use context::{CompilerContext, Counter, PassStats};
pub use driver::{CompileReport, Compilation, Compiler};
pub use pass::MethodPass;
pub use passes::{ExceptionRewritePass, FlowAnalysisPass, LabelTrimPass, SlotAllocationPass};
pub use scheduler::{PassOutcome, PassScheduler};
