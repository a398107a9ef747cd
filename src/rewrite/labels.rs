//! Removal of labels nothing jumps to.

use rustc_hash::FxHashSet;

use crate::ir::{Destination, InstructionKind, LabelId, MethodDescriptor};

/// Labels still referenced after the exception rewrite.
fn referenced_labels(method: &MethodDescriptor) -> FxHashSet<LabelId> {
    let mut labels = FxHashSet::default();
    for instruction in &method.instructions {
        for target in instruction.targets() {
            labels.insert(target.label);
        }
    }

    let scopes: FxHashSet<u32> = method
        .instructions
        .iter()
        .filter_map(|instruction| match instruction.kind {
            InstructionKind::ScopeEnter(scope) => Some(scope),
            _ => None,
        })
        .collect();

    for (id, region) in method.regions.iter().enumerate() {
        if !scopes.contains(&(id as u32)) {
            continue;
        }
        labels.insert(region.handler);
        for bypass in region.enter_bypasses.iter().chain(&region.exit_bypasses) {
            if let Destination::Label(label) = bypass.next {
                labels.insert(label);
            }
        }
    }
    labels
}

/// Removes every label that no jump, switch, handler dispatch or bypass hop targets.
///
/// Region start and end labels are only positions for the markers; once those are inserted,
/// the labels would needlessly split allocation runs. Returns the number of removed labels.
pub fn trim_labels(method: &mut MethodDescriptor) -> usize {
    let keep = referenced_labels(method);
    let before = method.instructions.len();
    method.instructions.retain(|instruction| match instruction.kind {
        InstructionKind::Label(label) => keep.contains(&label),
        _ => true,
    });
    let removed = before - method.instructions.len();
    if removed > 0 {
        log::trace!("{}: trimmed {} labels", method.display_name(), removed);
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ir::{AccessFlags, Instruction, JumpTarget, MethodSignature, Opcode, TryCatchRegion},
        rewrite::rewrite,
    };

    #[test]
    fn test_trims_region_boundaries_only() {
        let signature = MethodSignature::new("m", "()V").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        method.instructions = vec![
            InstructionKind::Label(0),
            InstructionKind::Simple(Opcode::Nop),
            InstructionKind::Label(1),
            InstructionKind::Jump {
                opcode: Opcode::Goto,
                target: JumpTarget::new(3),
            },
            InstructionKind::Label(2),
            InstructionKind::Simple(Opcode::Pop),
            InstructionKind::Label(3),
            InstructionKind::Simple(Opcode::Return),
            InstructionKind::Label(9),
        ]
        .into_iter()
        .map(Instruction::new)
        .collect();
        method.regions.push(TryCatchRegion::new(0, 1, 2, None));
        method.reserve_label(9);

        rewrite(&mut method).unwrap();
        assert_eq!(trim_labels(&mut method), 3);
        let labels: Vec<LabelId> = method
            .instructions
            .iter()
            .filter_map(|instruction| match instruction.kind {
                InstructionKind::Label(label) => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec![2, 3]);
    }
}
