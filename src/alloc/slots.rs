//! Slot assignment inside one run.

use crate::{
    alloc::operand::{Capture, Literal, Lowered, MethodPlan, Move, Operand, RunPlan},
    analysis::stack_shuffle,
    ir::{Category, InstructionKind, JavaType, MethodDescriptor, TypeKind},
    Error, Result,
};

/// Reference counts of the frame slots above the locals.
///
/// A slot is free while no stack entry refers to it. Duplicated entries share a slot, so the
/// count only drops to zero once every copy has been consumed.
#[derive(Debug, Default)]
pub(crate) struct SlotPool {
    counts: Vec<u16>,
}

impl SlotPool {
    pub(crate) fn retain(&mut self, slot: u16) {
        let index = usize::from(slot);
        if self.counts.len() <= index {
            self.counts.resize(index + 1, 0);
        }
        self.counts[index] += 1;
    }

    pub(crate) fn release(&mut self, slot: u16) {
        if let Some(count) = self.counts.get_mut(usize::from(slot)) {
            *count = count.saturating_sub(1);
        }
    }

    pub(crate) fn lowest_free(&self) -> u16 {
        let free = self
            .counts
            .iter()
            .position(|count| *count == 0)
            .unwrap_or(self.counts.len());
        u16::try_from(free).unwrap_or(u16::MAX)
    }

    #[cfg(test)]
    pub(crate) fn is_live(&self, slot: u16) -> bool {
        self.counts
            .get(usize::from(slot))
            .is_some_and(|count| *count > 0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Value {
    operand: Operand,
    kind: TypeKind,
}

/// Lowers the instructions in `start..end` into slots and temporaries.
///
/// Values present on entry stay where the positional layout put them. Objects produced inside
/// the run go to the lowest free slot, primitives to fresh temporaries, and pure stack
/// shuffles and constant pushes only rename values. The run ends with the stack written back
/// to positional slots, right before its final instruction when that instruction transfers
/// control.
pub(crate) fn lower_run(
    method: &MethodDescriptor,
    plan: &mut MethodPlan,
    start: usize,
    end: usize,
) -> Result<RunPlan> {
    let entry = method.instructions[start]
        .io()
        .map(|io| io.stack_before())
        .ok_or_else(|| unresolved(method, start))?;

    let mut pool = SlotPool::default();
    let mut stack: Vec<Value> = Vec::with_capacity(entry.len());
    for (depth, kind) in entry.into_iter().enumerate() {
        let slot = to_slot(depth)?;
        pool.retain(slot);
        stack.push(Value {
            operand: Operand::Slot(slot),
            kind,
        });
    }

    let mut run = RunPlan {
        start,
        end,
        ..RunPlan::default()
    };
    let mut remaining: Vec<Value> = Vec::new();

    for index in start..end {
        let instruction = &method.instructions[index];
        if instruction.is_pseudo() {
            plan.lowered[index] = Some(Lowered::default());
            continue;
        }
        let io = instruction.io().ok_or_else(|| unresolved(method, index))?;

        let count = io.inputs.len();
        if stack.len() < count {
            return Err(Error::StackUnderflow {
                method: method.display_name(),
                index,
                needed: count,
                available: stack.len(),
            });
        }
        let inputs = stack.split_off(stack.len() - count);
        let mut lowered = Lowered {
            inputs: inputs.iter().map(|value| value.operand).collect(),
            ..Lowered::default()
        };

        let is_last = index + 1 == end;
        if is_last && instruction.is_control_transfer() {
            // Nothing leaves a run past its final transfer, so its inputs stay retained.
            remaining = stack.clone();
            if !matches!(category(&instruction.kind), Category::Return | Category::Throw) {
                run.flush_before_last = true;
                for (position, value) in inputs.iter().enumerate() {
                    if let Operand::Slot(slot) = value.operand {
                        let temp = plan.new_temp(value.kind);
                        run.captures.push(Capture {
                            temp,
                            slot,
                            kind: value.kind,
                        });
                        lowered.inputs[position] = Operand::Temp(temp);
                    }
                }
            }
            plan.lowered[index] = Some(lowered);
            break;
        }

        let outputs: Vec<Value> = if let InstructionKind::Simple(opcode) = &instruction.kind {
            if opcode.category() == Category::Stack {
                lowered.elided = true;
                let shuffle = stack_shuffle(*opcode, &io.inputs);
                let outputs: Vec<Value> = shuffle.iter().map(|&source| inputs[source]).collect();
                for value in &outputs {
                    if let Operand::Slot(slot) = value.operand {
                        pool.retain(slot);
                    }
                }
                release(&mut pool, &inputs);
                outputs
            } else {
                release(&mut pool, &inputs);
                fresh_outputs(&instruction.kind, &io.outputs, &mut pool, plan, &mut lowered)
            }
        } else {
            release(&mut pool, &inputs);
            fresh_outputs(&instruction.kind, &io.outputs, &mut pool, plan, &mut lowered)
        };

        lowered.outputs = outputs.iter().map(|value| value.operand).collect();
        stack.extend(outputs);
        plan.lowered[index] = Some(lowered);

        if is_last {
            remaining = stack.clone();
        }
    }

    flush(&mut run, plan, &remaining)?;
    Ok(run)
}

fn fresh_outputs(
    kind: &InstructionKind,
    types: &[JavaType],
    pool: &mut SlotPool,
    plan: &mut MethodPlan,
    lowered: &mut Lowered,
) -> Vec<Value> {
    if let Some(literal) = Literal::of(kind) {
        lowered.elided = true;
        return vec![Value {
            operand: Operand::Literal(literal),
            kind: literal.kind(),
        }];
    }

    types
        .iter()
        .map(|ty| {
            let kind = ty.stack_kind();
            let operand = if kind == TypeKind::Object {
                let slot = pool.lowest_free();
                pool.retain(slot);
                Operand::Slot(slot)
            } else {
                Operand::Temp(plan.new_temp(kind))
            };
            Value { operand, kind }
        })
        .collect()
}

fn release(pool: &mut SlotPool, values: &[Value]) {
    for value in values {
        if let Operand::Slot(slot) = value.operand {
            pool.release(slot);
        }
    }
}

/// Computes the writes that put every remaining value into its positional slot.
///
/// Moves behave as if performed in parallel: a slot that is read by one move and overwritten
/// by another is first captured into a temporary.
fn flush(run: &mut RunPlan, plan: &mut MethodPlan, remaining: &[Value]) -> Result<()> {
    let mut moves = Vec::new();
    for (depth, value) in remaining.iter().enumerate() {
        let dest = to_slot(depth)?;
        if value.operand == Operand::Slot(dest) {
            continue;
        }
        moves.push(Move {
            dest,
            source: value.operand,
            kind: value.kind,
        });
    }

    let destinations: Vec<u16> = moves.iter().map(|m| m.dest).collect();
    let mut captured: Vec<(u16, u32)> = Vec::new();
    for mv in &mut moves {
        let Operand::Slot(source) = mv.source else {
            continue;
        };
        if !destinations.contains(&source) {
            continue;
        }
        let temp = match captured.iter().find(|(slot, _)| *slot == source) {
            Some((_, temp)) => *temp,
            None => {
                let temp = plan.new_temp(mv.kind);
                run.captures.push(Capture {
                    temp,
                    slot: source,
                    kind: mv.kind,
                });
                captured.push((source, temp));
                temp
            }
        };
        mv.source = Operand::Temp(temp);
    }

    run.moves = moves;
    Ok(())
}

fn category(kind: &InstructionKind) -> Category {
    match kind {
        InstructionKind::Simple(opcode) | InstructionKind::Jump { opcode, .. } => {
            opcode.category()
        }
        InstructionKind::Switch { .. } => Category::Switch,
        _ => Category::Nop,
    }
}

fn to_slot(depth: usize) -> Result<u16> {
    u16::try_from(depth).map_err(|_| Error::Error(format!("Stack depth {depth} exceeds frame")))
}

fn unresolved(method: &MethodDescriptor, index: usize) -> Error {
    Error::Unresolved {
        method: method.display_name(),
        index,
        instruction: method.instructions[index].to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_lowest_slot() {
        let mut pool = SlotPool::default();
        pool.retain(0);
        pool.retain(1);
        pool.retain(1);
        assert_eq!(pool.lowest_free(), 2);
        pool.release(0);
        assert_eq!(pool.lowest_free(), 0);
        pool.release(1);
        assert!(pool.is_live(1));
        pool.release(1);
        assert!(!pool.is_live(1));
    }

    #[test]
    fn test_flush_breaks_cycles() {
        let mut plan = MethodPlan::default();
        let mut run = RunPlan::default();
        // swapped objects: depth 0 lives in slot 1, depth 1 in slot 0
        let remaining = [
            Value {
                operand: Operand::Slot(1),
                kind: TypeKind::Object,
            },
            Value {
                operand: Operand::Slot(0),
                kind: TypeKind::Object,
            },
        ];
        flush(&mut run, &mut plan, &remaining).unwrap();
        assert_eq!(run.moves.len(), 2);
        assert_eq!(run.captures.len(), 2);
        assert!(run
            .moves
            .iter()
            .all(|mv| matches!(mv.source, Operand::Temp(_))));
    }

    #[test]
    fn test_flush_skips_positional_values() {
        let mut plan = MethodPlan::default();
        let mut run = RunPlan::default();
        let remaining = [
            Value {
                operand: Operand::Slot(0),
                kind: TypeKind::Object,
            },
            Value {
                operand: Operand::Literal(Literal::Int(4)),
                kind: TypeKind::Int,
            },
        ];
        flush(&mut run, &mut plan, &remaining).unwrap();
        assert_eq!(
            run.moves,
            vec![Move {
                dest: 1,
                source: Operand::Literal(Literal::Int(4)),
                kind: TypeKind::Int
            }]
        );
        assert!(run.captures.is_empty());
    }
}
