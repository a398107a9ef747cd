//! Observable effects of an emulated execution.

use std::fmt;

use crate::{
    emulation::value::{EmValue, HeapRef},
    ir::ScopeId,
};

/// One externally observable step of an execution.
///
/// Two storage plans of the same method are equivalent exactly when they produce the same
/// effect sequence and the same [`Outcome`] for every input.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Instance field read
    FieldRead {
        /// Declaring class
        owner: String,
        /// Field name
        name: String,
        /// The receiver
        object: HeapRef,
        /// Value read
        value: EmValue,
    },
    /// Instance field write
    FieldWrite {
        /// Declaring class
        owner: String,
        /// Field name
        name: String,
        /// The receiver
        object: HeapRef,
        /// Value written
        value: EmValue,
    },
    /// Static field read
    StaticRead {
        /// Declaring class
        owner: String,
        /// Field name
        name: String,
        /// Value read
        value: EmValue,
    },
    /// Static field write
    StaticWrite {
        /// Declaring class
        owner: String,
        /// Field name
        name: String,
        /// Value written
        value: EmValue,
    },
    /// Array element read
    ArrayRead {
        /// The array
        array: HeapRef,
        /// Element index
        index: i32,
        /// Value read
        value: EmValue,
    },
    /// Array element write
    ArrayWrite {
        /// The array
        array: HeapRef,
        /// Element index
        index: i32,
        /// Value written
        value: EmValue,
    },
    /// Method call, after dispatch
    Call {
        /// `owner.name(descriptor)` of the called body
        method: String,
        /// Arguments, receiver first
        args: Vec<EmValue>,
    },
    /// A protected region's entry marker was passed
    Enter(ScopeId),
    /// A protected region's exit marker was passed
    Exit(ScopeId),
    /// An exception was raised
    Throw {
        /// Class of the exception
        class: String,
    },
    /// A method returned normally
    Return(Option<EmValue>),
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::FieldRead { owner, name, object, value } => {
                write!(f, "read {object}.{owner}.{name} = {value}")
            }
            Effect::FieldWrite { owner, name, object, value } => {
                write!(f, "write {object}.{owner}.{name} = {value}")
            }
            Effect::StaticRead { owner, name, value } => write!(f, "read {owner}.{name} = {value}"),
            Effect::StaticWrite { owner, name, value } => write!(f, "write {owner}.{name} = {value}"),
            Effect::ArrayRead { array, index, value } => write!(f, "read {array}[{index}] = {value}"),
            Effect::ArrayWrite { array, index, value } => {
                write!(f, "write {array}[{index}] = {value}")
            }
            Effect::Call { method, args } => {
                write!(f, "call {method}(")?;
                for (position, arg) in args.iter().enumerate() {
                    if position > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Effect::Enter(scope) => write!(f, "enter {scope}"),
            Effect::Exit(scope) => write!(f, "exit {scope}"),
            Effect::Throw { class } => write!(f, "throw {class}"),
            Effect::Return(Some(value)) => write!(f, "return {value}"),
            Effect::Return(None) => write!(f, "return"),
        }
    }
}

/// How a call ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Outcome {
    /// Normal completion with the returned value, `None` for `void`
    Returned(Option<EmValue>),
    /// Completion by an uncaught exception
    Threw(HeapRef),
}

impl Outcome {
    /// The returned value, if the call completed normally with one.
    #[must_use]
    pub fn value(&self) -> Option<EmValue> {
        match self {
            Outcome::Returned(value) => *value,
            Outcome::Threw(_) => None,
        }
    }
}

/// The result of one top-level emulated call.
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    /// How the call ended
    pub outcome: Outcome,
    /// Every effect in order, including those of nested calls
    pub effects: Vec<Effect>,
}

impl Execution {
    /// Scope markers passed, in order.
    #[must_use]
    pub fn scopes(&self) -> Vec<&Effect> {
        self.effects
            .iter()
            .filter(|effect| matches!(effect, Effect::Enter(_) | Effect::Exit(_)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_display() {
        let call = Effect::Call {
            method: "pkg/A.add(II)I".to_string(),
            args: vec![EmValue::Int(2), EmValue::Int(3)],
        };
        assert_eq!(call.to_string(), "call pkg/A.add(II)I(2, 3)");
        assert_eq!(Effect::Return(None).to_string(), "return");
        assert_eq!(Effect::Exit(1).to_string(), "exit 1");
    }

    #[test]
    fn test_scope_filter() {
        let execution = Execution {
            outcome: Outcome::Returned(Some(EmValue::Int(1))),
            effects: vec![Effect::Enter(0), Effect::Return(None), Effect::Exit(0)],
        };
        assert_eq!(execution.scopes().len(), 2);
        assert_eq!(execution.outcome.value(), Some(EmValue::Int(1)));
    }
}
