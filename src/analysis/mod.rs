//! Stack flow analysis.
//!
//! Bytecode leaves the operand stack implicit: an `iadd` knows it takes two `int`s, but not
//! where they came from, and a `dup2` does not even know how many entries it copies until the
//! types underneath are known. This module simulates the stack symbolically over every
//! control path and records, per instruction, the stack beneath it and its typed inputs and
//! outputs. Every later pass works from those records.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────┐
//!  index 0 ─▶│   worklist   │◀──────── handler seeds (once a protected
//!  []        └──────┬───────┘          instruction is resolved)
//!                   │ (index, SymbolicStack)
//!                   ▼
//!            ┌──────────────┐  transfer()   ┌────────────────────┐
//!            │    visit     │──────────────▶│ io: arity + types  │
//!            └──────┬───────┘               └────────────────────┘
//!                   │ resolve(InstructionIo)   fallthrough / targets
//!                   ▼
//!             MethodDescriptor.instructions
//! ```
//!
//! # Key Components
//!
//! - [`analyze`] - Resolves a whole method
//! - [`transfer`] - Consumed count and produced types of one instruction
//! - [`stack_shuffle`] - Output-to-input mapping of `dup*`, `swap` and `pop*`
//! - [`SymbolicStack`] / [`StackEntry`] - The simulated stack

mod flow;
mod io;
mod stack;

pub use flow::{analyze, FlowSummary};
pub use io::{stack_shuffle, transfer, Transfer};
pub use stack::{Producer, StackEntry, SymbolicStack};
