//! Whole-class dead code elimination.
//!
//! Only classes reachable from the roots are emitted. Roots are the classes the runtime
//! needs ([`RUNTIME_CLASSES`]), the entry point class, classes owning intrinsics and every
//! class matching a retention pattern. From there [`collect`] follows the dependency edges
//! computed by [`class_dependencies`] until nothing new is reached.
//!
//! # Key Components
//!
//! - [`ClassPatterns`] - Glob patterns over class names
//! - [`collect`] - Closure computation
//! - [`find_main_class`] - Entry point lookup

mod collector;
mod patterns;

pub use collector::{
    class_dependencies, collect, find_main_class, DependencyClosure, DependencyRoots,
    RUNTIME_CLASSES,
};
pub use patterns::ClassPatterns;
