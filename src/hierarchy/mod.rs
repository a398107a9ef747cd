//! Class pool and hierarchy resolution.
//!
//! Every parsed class lives in one [`ClassPool`]. Resolution walks each class's ancestors
//! first (recursively, memoized through [`crate::ir::HierarchyState`]) so the result does not
//! depend on input order, and computes:
//!
//! - links to the superclass and interface classes,
//! - the dispatch table, where an overriding method keeps the slot of the method it overrides,
//! - for interfaces, the ordered interface method table.
//!
//! Classes with a missing or cyclic ancestor are excluded with a warning. After resolution
//! [`bind_symbols`] attaches the declaring class to every field reference and a dispatch kind
//! to every call site.
//!
//! # Architecture
//!
//! ```text
//!  ClassPool ─▶ resolve_all ─▶ vtables / interface tables
//!                    │
//!                    ├─▶ extras (intrinsics, weak fields, annotation defaults, reflection)
//!                    └─▶ bind_symbols ─▶ FieldRef::declaring, MethodRef::dispatch
//! ```
//!
//! # Key Components
//!
//! - [`ClassPool`] - Arena of classes with a name index
//! - [`resolve_all`] - Hierarchy resolution for the whole pool
//! - [`bind_symbols`] - Call site and field reference binding
//! - [`extras`] - Configuration driven class adjustments

mod binding;
pub mod extras;
mod pool;
mod resolver;

pub use binding::{bind_symbols, field_owner, method_owner};
pub use pool::ClassPool;
pub use resolver::{baseline_vtable, resolve_all, HierarchySummary, OBJECT_METHODS};
