//! Exception flow rewriting.
//!
//! The generated code models protected regions with a runtime stack of exception frames:
//! entering a region pushes a frame with a `setjmp` landing pad, leaving it pops the frame.
//! That only works if every path into or out of a region passes its markers. This module
//! makes the markers explicit instructions and reroutes jumps that would skip them.
//!
//! # Architecture
//!
//! ```text
//!   L_start:                     goto L_far        (from inside two regions)
//!   try_1: (enter outer)              │ bypasses[f] = true
//!   try_0: (enter inner)              ▼
//!     ...                        exit_0: pop frame, bypasses[f] ? goto exit_1
//!   L_end0:                      exit_1: pop frame, bypasses[f] ? clear, goto L_far
//!   exit_0: (exit inner)
//! ```
//!
//! # Key Components
//!
//! - [`rewrite`] - Marker insertion and bypass routing
//! - [`trim_labels`] - Removes labels the rewritten method no longer needs

mod exceptions;
mod labels;

pub use exceptions::{rewrite, RewriteSummary};
pub use labels::trim_labels;
