//! Reference interpreter over the analyzed intermediate representation.
//!
//! The compiler never runs code, but every pass after flow analysis changes how a method's
//! values are stored or how control reaches its labels. This module executes methods the way
//! the generated functions will, so those passes can be checked against each other: the raw
//! positional plan and the allocated plan of the same method must produce the same
//! observable effects for every input, and the bypass routing synthesized for protected
//! regions must pass exactly the markers that structured unwinding would.
//!
//! # Architecture
//!
//! - Value representation and the heap ([`EmValue`], [`HeapRef`], [`ManagedHeap`])
//! - Java arithmetic and branch conditions
//! - Frame storage mirroring the generated `frame` / `stack` / temporaries layout
//! - The interpreter proper, including dispatch and exception unwinding
//! - A model of the collector's depth-capped mark phase ([`gc`])
//!
//! # Key Components
//!
//! - [`Interpreter`] - Executes methods of a [`ClassPool`] with one storage plan
//! - [`EmulationConfig`] / [`PlanMode`] - Plan selection and execution limits
//! - [`Effect`] / [`Execution`] - The observable trace of a call
//! - [`compare_plans`] - Runs a method under the raw and the allocated plan
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use jvmaot::emulation::{compare_plans, EmValue};
//!
//! let comparison = compare_plans(&pool, "pkg/Calc", "add", "(II)I", &[EmValue::Int(2), EmValue::Int(3)])?;
//! assert!(comparison.is_equivalent());
//! ```

mod arith;
mod effects;
mod frame;
pub mod gc;
mod interpreter;
mod value;

pub use effects::{Effect, Execution, Outcome};
pub use interpreter::{EmulationConfig, Interpreter, PlanMode};
pub use value::{EmValue, HeapObject, HeapRef, ManagedHeap, ObjectBody};

use crate::{hierarchy::ClassPool, Result};

/// The executions of one call under both storage plans.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanComparison {
    /// Execution with every operand in its positional slot
    pub raw: Execution,
    /// Execution with lowered runs
    pub allocated: Execution,
}

impl PlanComparison {
    /// `true` if both plans produced the same effects and the same outcome.
    #[must_use]
    pub fn is_equivalent(&self) -> bool {
        self.raw == self.allocated
    }

    /// Index of the first effect on which the executions disagree.
    #[must_use]
    pub fn first_difference(&self) -> Option<usize> {
        let raw = &self.raw.effects;
        let allocated = &self.allocated.effects;
        raw.iter()
            .zip(allocated)
            .position(|(a, b)| a != b)
            .or_else(|| (raw.len() != allocated.len()).then(|| raw.len().min(allocated.len())))
    }
}

/// Calls a method once with the raw plan and once with the allocated plan, each in a fresh
/// interpreter.
///
/// # Errors
/// Propagates the errors of [`Interpreter::call`] from either execution.
pub fn compare_plans(
    pool: &ClassPool,
    owner: &str,
    name: &str,
    descriptor: &str,
    args: &[EmValue],
) -> Result<PlanComparison> {
    let mut raw = Interpreter::new(pool, EmulationConfig::with_mode(PlanMode::Raw));
    let raw = raw.call(owner, name, descriptor, args)?;
    let mut allocated = Interpreter::new(pool, EmulationConfig::with_mode(PlanMode::Allocated));
    let allocated = allocated.call(owner, name, descriptor, args)?;

    let comparison = PlanComparison { raw, allocated };
    if let Some(index) = comparison.first_difference() {
        log::debug!("{owner}.{name}{descriptor}: plans diverge at effect {index}");
    }
    Ok(comparison)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_difference() {
        let execution = |effects: Vec<Effect>| Execution {
            outcome: Outcome::Returned(None),
            effects,
        };
        let same = PlanComparison {
            raw: execution(vec![Effect::Enter(0)]),
            allocated: execution(vec![Effect::Enter(0)]),
        };
        assert!(same.is_equivalent());
        assert_eq!(same.first_difference(), None);

        let shorter = PlanComparison {
            raw: execution(vec![Effect::Enter(0), Effect::Exit(0)]),
            allocated: execution(vec![Effect::Enter(0)]),
        };
        assert!(!shorter.is_equivalent());
        assert_eq!(shorter.first_difference(), Some(1));
    }
}
