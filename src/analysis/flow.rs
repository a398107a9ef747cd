//! Worklist stack simulation over one method.

use rustc_hash::FxHashMap;

use crate::{
    analysis::{
        io::{stack_shuffle, transfer},
        stack::{Producer, SymbolicStack},
    },
    ir::{Category, InstructionIo, InstructionKind, JavaType, MethodDescriptor},
    Error, Result,
};

/// Side results of a flow analysis run.
#[derive(Debug, Clone, Default)]
pub struct FlowSummary {
    /// Instructions resolved by this run
    pub resolved: usize,
    /// Handlers reached
    pub handlers: usize,
    /// Deepest stack seen
    pub max_depth: usize,
    /// For each producer, the instructions that consumed its values along the first path that
    /// reached them
    pub consumers: FxHashMap<Producer, Vec<usize>>,
}

struct Region {
    start: usize,
    end: usize,
    handler: usize,
    caught: JavaType,
}

/// Resolves the inputs and outputs of every instruction of `method`.
///
/// Simulation starts at the first instruction with an empty stack and follows fallthrough,
/// branch and switch edges. Each instruction is resolved the first time a path reaches it;
/// later paths only check that they agree on the stack depth. A handler becomes reachable
/// once any instruction of its protected range is resolved, and starts with exactly the
/// caught exception on the stack. The process repeats until no new handler becomes reachable.
///
/// # Errors
/// Returns [`crate::Error::Unresolved`] if an instruction stays unreachable,
/// [`crate::Error::StackUnderflow`] if a path pops more than it pushed, and
/// [`crate::Error::Malformed`] for inconsistent stack depths or code falling off the end.
pub fn analyze(method: &mut MethodDescriptor) -> Result<FlowSummary> {
    let mut summary = FlowSummary::default();
    if method.instructions.is_empty() {
        return Ok(summary);
    }

    let positions = method.label_positions();
    let mut regions = Vec::with_capacity(method.regions.len());
    for region in &method.regions {
        regions.push(Region {
            start: method.position_of(&positions, region.start)?,
            end: method.position_of(&positions, region.end)?,
            handler: method.position_of(&positions, region.handler)?,
            caught: JavaType::Class(region.caught_class().to_string()),
        });
    }

    let mut seeded = vec![false; regions.len()];
    let mut worklist = vec![(0usize, SymbolicStack::new())];
    loop {
        while let Some((index, stack)) = worklist.pop() {
            visit(method, &positions, index, stack, &mut worklist, &mut summary)?;
        }

        for (region, done) in regions.iter().zip(seeded.iter_mut()) {
            if *done {
                continue;
            }
            let protected_reached = method.instructions[region.start..region.end]
                .iter()
                .any(|instruction| instruction.is_resolved() && !instruction.is_pseudo());
            if protected_reached {
                *done = true;
                summary.handlers += 1;
                worklist.push((
                    region.handler,
                    SymbolicStack::handler(region.handler, region.caught.clone()),
                ));
            }
        }

        if worklist.is_empty() {
            break;
        }
    }

    for (index, instruction) in method.instructions.iter().enumerate() {
        if !instruction.is_resolved() && !instruction.is_pseudo() {
            return Err(Error::Unresolved {
                method: method.display_name(),
                index,
                instruction: instruction.to_string(),
            });
        }
    }

    log::debug!(
        "{}: resolved {} instructions, {} handlers, max depth {}",
        method.display_name(),
        summary.resolved,
        summary.handlers,
        summary.max_depth
    );
    Ok(summary)
}

fn visit(
    method: &mut MethodDescriptor,
    positions: &FxHashMap<u32, usize>,
    start: usize,
    mut stack: SymbolicStack,
    worklist: &mut Vec<(usize, SymbolicStack)>,
    summary: &mut FlowSummary,
) -> Result<()> {
    let mut index = start;
    loop {
        let Some(instruction) = method.instructions.get(index) else {
            return Err(malformed_error!(
                "Control falls off the end of {}",
                method.display_name()
            ));
        };

        if let Some(io) = instruction.io() {
            if io.depth() != stack.len() {
                return Err(malformed_error!(
                    "Inconsistent stack depth at {} in {}: {} and {}",
                    index,
                    method.display_name(),
                    io.depth(),
                    stack.len()
                ));
            }
            return Ok(());
        }

        let effect = transfer(&instruction.kind, &stack.types())?;
        let available = stack.len();
        let Some(consumed) = stack.pop(effect.consumed) else {
            return Err(Error::StackUnderflow {
                method: method.display_name(),
                index,
                needed: effect.consumed,
                available,
            });
        };

        for entry in &consumed {
            summary
                .consumers
                .entry(entry.producer)
                .or_default()
                .push(index);
        }

        let below = stack.kinds();
        let inputs: Vec<JavaType> = consumed.iter().map(|entry| entry.ty.clone()).collect();
        match &instruction.kind {
            InstructionKind::Simple(opcode) if opcode.category() == Category::Stack => {
                let shuffle = stack_shuffle(*opcode, &inputs);
                stack.push_entries(shuffle.into_iter().map(|source| consumed[source].clone()));
            }
            _ => stack.push(index, &effect.produced),
        }
        summary.max_depth = summary.max_depth.max(available).max(stack.len());

        let successors: Vec<u32> = instruction.targets().iter().map(|t| t.label).collect();
        let falls_through = instruction.falls_through();
        log::trace!("{:>4} [{}] {}", index, available, instruction);

        method.instructions[index].resolve(InstructionIo {
            below,
            inputs,
            outputs: effect.produced,
        })?;
        summary.resolved += 1;

        for label in successors {
            let target = method.position_of(positions, label)?;
            worklist.push((target, stack.clone()));
        }

        if !falls_through {
            return Ok(());
        }
        index += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{
        AccessFlags, Instruction, JumpTarget, MethodSignature, Opcode, TryCatchRegion, TypeKind,
    };

    fn method(descriptor: &str, kinds: Vec<InstructionKind>) -> MethodDescriptor {
        let signature = MethodSignature::new("m", descriptor).unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        method.instructions = kinds.into_iter().map(Instruction::new).collect();
        method.reserve_label(16);
        method
    }

    fn load(local: u16) -> InstructionKind {
        InstructionKind::Variable {
            opcode: Opcode::Iload,
            local,
        }
    }

    #[test]
    fn test_add_resolves() {
        let mut method = method(
            "(II)I",
            vec![
                load(0),
                load(1),
                InstructionKind::Simple(Opcode::Iadd),
                InstructionKind::Simple(Opcode::Ireturn),
            ],
        );
        let summary = analyze(&mut method).unwrap();
        assert_eq!(summary.resolved, 4);
        assert_eq!(summary.max_depth, 2);

        let add = method.instructions[2].io().unwrap();
        assert_eq!(add.inputs.len(), 2);
        assert_eq!(add.outputs, vec![JavaType::int()]);
        assert_eq!(
            summary.consumers[&Producer::Instruction(0)],
            vec![2]
        );
        assert_eq!(method.instructions[3].io().unwrap().inputs.len(), 1);
    }

    #[test]
    fn test_loop_terminates() {
        // L0: iinc 0 1; goto L0
        let mut method = method(
            "(I)V",
            vec![
                InstructionKind::Label(0),
                InstructionKind::Increment {
                    local: 0,
                    amount: 1,
                },
                InstructionKind::Jump {
                    opcode: Opcode::Goto,
                    target: JumpTarget::new(0),
                },
            ],
        );
        analyze(&mut method).unwrap();
        assert!(method.instructions.iter().all(Instruction::is_resolved));
    }

    #[test]
    fn test_handler_starts_with_exception_only() {
        // L0: iconst_1; L1-protected: aconst_null; athrow; L2: goto L3; L4 handler: astore 1; pop; L3: return
        let mut method = method(
            "()V",
            vec![
                InstructionKind::Simple(Opcode::Iconst1),
                InstructionKind::Label(1),
                InstructionKind::Simple(Opcode::AconstNull),
                InstructionKind::Simple(Opcode::Athrow),
                InstructionKind::Label(2),
                InstructionKind::Label(4),
                InstructionKind::Variable {
                    opcode: Opcode::Astore,
                    local: 1,
                },
                InstructionKind::Label(3),
                InstructionKind::Simple(Opcode::Return),
            ],
        );
        method.regions.push(TryCatchRegion::new(1, 2, 4, None));
        let summary = analyze(&mut method).unwrap();
        assert_eq!(summary.handlers, 1);

        let store = method.instructions[6].io().unwrap();
        assert!(store.below.is_empty());
        assert_eq!(store.inputs, vec![JavaType::throwable()]);
        // the throw site had an extra int underneath
        assert_eq!(
            method.instructions[3].io().unwrap().below,
            vec![TypeKind::Int]
        );
    }

    #[test]
    fn test_dead_code_is_fatal() {
        let mut method = method(
            "()V",
            vec![
                InstructionKind::Simple(Opcode::Return),
                InstructionKind::Simple(Opcode::Nop),
            ],
        );
        assert!(matches!(
            analyze(&mut method),
            Err(Error::Unresolved { index: 1, .. })
        ));
    }

    #[test]
    fn test_underflow_is_reported() {
        let mut method = method("()V", vec![InstructionKind::Simple(Opcode::Iadd)]);
        assert!(matches!(
            analyze(&mut method),
            Err(Error::StackUnderflow { needed: 2, .. })
        ));
    }
}
