//! The symbolic operand stack.

use crate::ir::{JavaType, TypeKind};

/// Who pushed a stack entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Producer {
    /// The instruction at this index
    Instruction(usize),
    /// The runtime, delivering a caught exception to the handler at this index
    Handler(usize),
}

/// A symbolic operand stack value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackEntry {
    /// Static type of the value
    pub ty: JavaType,
    /// Where the value came from
    pub producer: Producer,
}

/// The analyzer's model of the operand stack along one control path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolicStack {
    entries: Vec<StackEntry>,
}

impl SymbolicStack {
    /// An empty stack, as found at method entry.
    #[must_use]
    pub fn new() -> Self {
        SymbolicStack::default()
    }

    /// The stack a handler starts with: only the caught exception.
    #[must_use]
    pub fn handler(handler: usize, caught: JavaType) -> Self {
        SymbolicStack {
            entries: vec![StackEntry {
                ty: caught,
                producer: Producer::Handler(handler),
            }],
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry types, bottom-most first.
    #[must_use]
    pub fn types(&self) -> Vec<JavaType> {
        self.entries.iter().map(|entry| entry.ty.clone()).collect()
    }

    /// Stack kinds, bottom-most first.
    #[must_use]
    pub fn kinds(&self) -> Vec<TypeKind> {
        self.entries.iter().map(|entry| entry.ty.stack_kind()).collect()
    }

    /// Removes the top `count` entries and returns them bottom-most first, or `None` if the
    /// stack holds fewer entries.
    pub fn pop(&mut self, count: usize) -> Option<Vec<StackEntry>> {
        let start = self.entries.len().checked_sub(count)?;
        Some(self.entries.split_off(start))
    }

    /// Pushes values produced by `producer`.
    pub fn push(&mut self, producer: usize, types: &[JavaType]) {
        self.entries.extend(types.iter().map(|ty| StackEntry {
            ty: ty.clone(),
            producer: Producer::Instruction(producer),
        }));
    }

    /// Pushes values copied from existing entries, keeping their producers.
    pub fn push_entries(&mut self, entries: impl IntoIterator<Item = StackEntry>) {
        self.entries.extend(entries);
    }
}
