//! Stack slot allocation.
//!
//! The flow analyzer leaves every instruction with typed inputs and outputs addressed by stack
//! depth. Rendering that directly means every push and pop goes through the method's frame.
//! This module replaces the abstract stack, run by run, with cheaper storage:
//!
//! ```text
//! ┌──────────────┐   raw_plan    ┌────────────────────────┐  allocate   ┌──────────────────┐
//! │ Resolved IR  │ ─────────────▶│ positional operands    │ ───────────▶│ slots, temps,    │
//! │ (depth, I/O) │               │ stack[depth - n + i]   │  per run    │ literals, moves  │
//! └──────────────┘               └────────────────────────┘             └──────────────────┘
//! ```
//!
//! A run is a maximal straight-line range of resolved instructions. It ends before a label or
//! region marker and after a control transfer, so control only enters a run at its first
//! instruction. On entry and exit the stack is in the positional layout, which is what lets
//! runs, unallocated instructions and exception handlers meet at any label.
//!
//! # Key Components
//!
//! - [`MethodPlan`] - Per-instruction operands plus the run bookkeeping
//! - [`raw_plan`] - Positional operands only, also used when optimizations are disabled
//! - [`allocate`] - Raw plan with every eligible run lowered

mod operand;
mod slots;

pub use operand::{Capture, Literal, Lowered, MethodPlan, Move, Operand, RunPlan};

use crate::{
    ir::{InstructionKind, MethodDescriptor},
    Error, Result,
};

/// Runs shorter than this stay positional.
const MIN_RUN_LENGTH: usize = 2;

/// Builds a plan that addresses every operand by its stack depth.
///
/// # Errors
/// Returns [`crate::Error::Error`] if a stack depth does not fit a slot index.
pub fn raw_plan(method: &MethodDescriptor) -> Result<MethodPlan> {
    let mut plan = MethodPlan {
        lowered: Vec::with_capacity(method.instructions.len()),
        ..MethodPlan::default()
    };

    for instruction in &method.instructions {
        let Some(io) = instruction.io() else {
            plan.lowered.push(if instruction.is_pseudo() {
                Some(Lowered::default())
            } else {
                None
            });
            continue;
        };

        let base = io.base();
        let inputs = (0..io.inputs.len())
            .map(|i| slot(base + i).map(Operand::Slot))
            .collect::<Result<Vec<_>>>()?;
        let outputs = (0..io.outputs.len())
            .map(|j| slot(base + j).map(Operand::Slot))
            .collect::<Result<Vec<_>>>()?;

        plan.max_depth = plan.max_depth.max(slot(io.depth())?).max(slot(io.depth_after())?);
        plan.lowered.push(Some(Lowered {
            inputs,
            outputs,
            elided: false,
        }));
    }

    Ok(plan)
}

/// Splits the method into runs eligible for lowering.
#[must_use]
pub fn find_runs(method: &MethodDescriptor) -> Vec<(usize, usize)> {
    let instructions = &method.instructions;
    let mut runs = Vec::new();
    let mut index = 0;

    while index < instructions.len() {
        let first = &instructions[index];
        if first.is_pseudo() || !first.is_resolved() {
            index += 1;
            continue;
        }

        let start = index;
        let mut end = index;
        while end < instructions.len() {
            let instruction = &instructions[end];
            let boundary = matches!(
                instruction.kind,
                InstructionKind::Label(_)
                    | InstructionKind::ScopeEnter(_)
                    | InstructionKind::ScopeExit(_)
            );
            let usable = instruction.is_resolved()
                || matches!(instruction.kind, InstructionKind::LineNumber(_));
            if boundary || !usable {
                break;
            }
            end += 1;
            if instruction.is_control_transfer() {
                break;
            }
        }

        let length = instructions[start..end]
            .iter()
            .filter(|instruction| !instruction.is_pseudo())
            .count();
        if length >= MIN_RUN_LENGTH {
            runs.push((start, end));
        }
        index = end.max(start + 1);
    }

    runs
}

/// Builds the raw plan and lowers every run of the method.
///
/// # Errors
/// Returns [`crate::Error::Unresolved`] or [`crate::Error::StackUnderflow`] if the method was
/// not fully analyzed.
pub fn allocate(method: &MethodDescriptor) -> Result<MethodPlan> {
    let mut plan = raw_plan(method)?;
    for (start, end) in find_runs(method) {
        let run = slots::lower_run(method, &mut plan, start, end)?;
        plan.runs.push(run);
    }
    log::trace!(
        "{}: {} runs, {} temporaries",
        method.display_name(),
        plan.runs.len(),
        plan.temps.len()
    );
    Ok(plan)
}

fn slot(depth: usize) -> Result<u16> {
    u16::try_from(depth).map_err(|_| Error::Error(format!("Stack depth {depth} exceeds frame")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        AccessFlags, FieldRef, Instruction, InstructionIo, JavaType, MethodSignature, Opcode,
        TypeKind,
    };

    fn resolved(kind: InstructionKind, below: Vec<TypeKind>, inputs: Vec<JavaType>, outputs: Vec<JavaType>) -> Instruction {
        let mut instruction = Instruction::new(kind);
        instruction
            .resolve(InstructionIo {
                below,
                inputs,
                outputs,
            })
            .unwrap();
        instruction
    }

    /// `return a + b + 1` on two int locals
    fn add_method() -> MethodDescriptor {
        let signature = MethodSignature::new("add", "(II)I").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        let int = JavaType::int;
        method.instructions = vec![
            resolved(
                InstructionKind::Variable { opcode: Opcode::Iload, local: 0 },
                vec![],
                vec![],
                vec![int()],
            ),
            resolved(
                InstructionKind::Variable { opcode: Opcode::Iload, local: 1 },
                vec![TypeKind::Int],
                vec![],
                vec![int()],
            ),
            resolved(InstructionKind::Simple(Opcode::Iadd), vec![], vec![int(), int()], vec![int()]),
            resolved(InstructionKind::Simple(Opcode::Iconst1), vec![TypeKind::Int], vec![], vec![int()]),
            resolved(InstructionKind::Simple(Opcode::Iadd), vec![], vec![int(), int()], vec![int()]),
            resolved(InstructionKind::Simple(Opcode::Ireturn), vec![], vec![int()], vec![]),
        ];
        method.max_locals = 2;
        method.max_stack = 2;
        method
    }

    #[test]
    fn test_raw_plan_is_positional() {
        let plan = raw_plan(&add_method()).unwrap();
        let add = plan.lowered[2].as_ref().unwrap();
        assert_eq!(add.inputs, vec![Operand::Slot(0), Operand::Slot(1)]);
        assert_eq!(add.outputs, vec![Operand::Slot(0)]);
        assert_eq!(plan.max_depth, 2);
        assert!(plan.runs.is_empty());
    }

    #[test]
    fn test_allocate_uses_temps_and_literals() {
        let method = add_method();
        let plan = allocate(&method).unwrap();
        assert_eq!(plan.runs.len(), 1);
        let run = &plan.runs[0];
        assert_eq!((run.start, run.end), (0, 6));
        assert!(!run.flush_before_last);
        assert!(run.moves.is_empty());

        let constant = plan.lowered[3].as_ref().unwrap();
        assert!(constant.elided);
        assert_eq!(constant.outputs, vec![Operand::Literal(Literal::Int(1))]);

        let second_add = plan.lowered[4].as_ref().unwrap();
        assert!(matches!(second_add.inputs[0], Operand::Temp(_)));
        assert_eq!(second_add.inputs[1], Operand::Literal(Literal::Int(1)));
        assert!(plan.temps.iter().all(|kind| *kind == TypeKind::Int));
    }

    #[test]
    fn test_branch_flushes_before_transfer() {
        let signature = MethodSignature::new("f", "(Lpkg/A;)V").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        let a = || JavaType::Class("pkg/A".into());
        let field = FieldRef {
            owner: "pkg/A".into(),
            name: "next".into(),
            ty: a(),
            declaring: None,
        };
        method.instructions = vec![
            resolved(
                InstructionKind::Variable { opcode: Opcode::Aload, local: 0 },
                vec![],
                vec![],
                vec![a()],
            ),
            resolved(
                InstructionKind::Variable { opcode: Opcode::Iload, local: 1 },
                vec![TypeKind::Object],
                vec![],
                vec![JavaType::int()],
            ),
            resolved(
                InstructionKind::Jump {
                    opcode: Opcode::Ifeq,
                    target: crate::ir::JumpTarget::new(0),
                },
                vec![TypeKind::Object],
                vec![JavaType::int()],
                vec![],
            ),
            resolved(
                InstructionKind::Field { opcode: Opcode::Getfield, field },
                vec![],
                vec![a()],
                vec![a()],
            ),
        ];

        let plan = allocate(&method).unwrap();
        assert_eq!(plan.runs.len(), 1);
        let run = &plan.runs[0];
        assert_eq!((run.start, run.end), (0, 3));
        assert!(run.flush_before_last);
        // the loaded object already sits in its positional slot
        assert!(run.moves.is_empty());
        let branch = plan.lowered[2].as_ref().unwrap();
        assert!(matches!(branch.inputs[0], Operand::Temp(_)));
        // the trailing single instruction stays positional
        assert_eq!(
            plan.lowered[3].as_ref().unwrap().inputs,
            vec![Operand::Slot(0)]
        );
    }

    #[test]
    fn test_runs_stop_at_labels() {
        let mut method = add_method();
        method
            .instructions
            .insert(3, Instruction::new(InstructionKind::Label(7)));
        let runs = find_runs(&method);
        assert_eq!(runs, vec![(0, 3), (4, 7)]);
    }
}
