//! Bytecode decoding.
//!
//! Decoding runs in two passes. The first walks the code array and produces one
//! [`InstructionKind`] per opcode, with jump targets temporarily holding absolute bytecode
//! offsets. The second gives every offset something refers to (branch targets, exception table
//! boundaries, line number starts) a fresh label, rewrites the jump targets to those labels, and
//! interleaves `Label` and `LineNumber` pseudo-instructions with the decoded instructions.

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashMap;

use crate::{
    classfile::{
        attributes::CodeAttribute, constpool::ConstantPool, dynamic::DynamicContext,
    },
    file::parser::Parser,
    ir::{
        Category, FieldRef, Instruction, InstructionKind, JavaType, JumpTarget, LabelId,
        MethodDescriptor, MethodRef, MethodSignature, Opcode, TryCatchRegion, OBJECT_CLASS,
    },
    Result,
};

/// A decoded instruction at its bytecode offset.
struct Decoded {
    offset: u32,
    kind: InstructionKind,
}

fn jump_offset(pc: usize, relative: i32, length: usize) -> Result<LabelId> {
    let target = pc as i64 + i64::from(relative);
    if target < 0 || target >= length as i64 {
        return Err(malformed_error!(
            "Branch at {} targets offset {} outside the code array",
            pc,
            target
        ));
    }
    Ok(target as LabelId)
}

fn field_ref(pool: &ConstantPool, index: u16) -> Result<FieldRef> {
    let member = pool.member_ref(index)?;
    Ok(FieldRef {
        owner: member.owner,
        ty: JavaType::parse(&member.descriptor)?,
        name: member.name,
        declaring: None,
    })
}

fn method_ref(pool: &ConstantPool, index: u16) -> Result<MethodRef> {
    let member = pool.member_ref(index)?;
    // Array receivers (`[I.clone()`) dispatch through the root object's methods.
    let owner = if member.owner.starts_with('[') {
        OBJECT_CLASS.to_string()
    } else {
        member.owner
    };
    Ok(MethodRef {
        owner,
        signature: MethodSignature::new(&member.name, &member.descriptor)?,
        interface: member.interface,
        dispatch: None,
    })
}

fn decode_one(
    parser: &mut Parser,
    pool: &ConstantPool,
    dynamic: &mut DynamicContext,
) -> Result<InstructionKind> {
    let pc = parser.pos();
    let length = parser.len();
    let byte = parser.read_be::<u8>()?;
    let opcode = Opcode::from_byte(byte)
        .ok_or_else(|| malformed_error!("Invalid opcode {:#04x} at offset {}", byte, pc))?;

    Ok(match opcode.category() {
        Category::Constant => match opcode {
            Opcode::Bipush => InstructionKind::Integer {
                opcode,
                value: i32::from(parser.read_be::<i8>()?),
            },
            Opcode::Sipush => InstructionKind::Integer {
                opcode,
                value: i32::from(parser.read_be::<i16>()?),
            },
            Opcode::Ldc => InstructionKind::Constant(pool.loadable(u16::from(parser.read_be::<u8>()?))?),
            Opcode::LdcW | Opcode::Ldc2W => {
                InstructionKind::Constant(pool.loadable(parser.read_be::<u16>()?)?)
            }
            _ => InstructionKind::Simple(opcode),
        },
        Category::Load | Category::Store => match opcode.implied_local() {
            Some(local) => InstructionKind::Variable {
                opcode: opcode.canonical_variable(),
                local,
            },
            None => InstructionKind::Variable {
                opcode,
                local: u16::from(parser.read_be::<u8>()?),
            },
        },
        Category::Increment => InstructionKind::Increment {
            local: u16::from(parser.read_be::<u8>()?),
            amount: i16::from(parser.read_be::<i8>()?),
        },
        Category::BranchUnary | Category::BranchBinary | Category::Goto => {
            let relative = if opcode == Opcode::GotoW {
                parser.read_be::<i32>()?
            } else {
                i32::from(parser.read_be::<i16>()?)
            };
            InstructionKind::Jump {
                opcode: if opcode == Opcode::GotoW {
                    Opcode::Goto
                } else {
                    opcode
                },
                target: JumpTarget::new(jump_offset(pc, relative, length)?),
            }
        }
        Category::Switch => {
            parser.align(0, 4)?;
            let default = JumpTarget::new(jump_offset(pc, parser.read_be::<i32>()?, length)?);
            let mut keys = Vec::new();
            let mut targets = Vec::new();
            if opcode == Opcode::Tableswitch {
                let low = parser.read_be::<i32>()?;
                let high = parser.read_be::<i32>()?;
                if high < low {
                    return Err(malformed_error!("tableswitch at {} has high < low", pc));
                }
                for key in low..=high {
                    keys.push(key);
                    targets.push(JumpTarget::new(jump_offset(pc, parser.read_be::<i32>()?, length)?));
                }
            } else {
                let pairs = parser.read_be::<i32>()?;
                if pairs < 0 {
                    return Err(malformed_error!("lookupswitch at {} has negative pair count", pc));
                }
                for _ in 0..pairs {
                    keys.push(parser.read_be::<i32>()?);
                    targets.push(JumpTarget::new(jump_offset(pc, parser.read_be::<i32>()?, length)?));
                }
            }
            InstructionKind::Switch {
                keys,
                targets,
                default,
            }
        }
        Category::Field => InstructionKind::Field {
            opcode,
            field: field_ref(pool, parser.read_be::<u16>()?)?,
        },
        Category::Invoke => {
            let method = method_ref(pool, parser.read_be::<u16>()?)?;
            if opcode == Opcode::Invokeinterface {
                parser.advance_by(2)?;
            }
            InstructionKind::Invoke { opcode, method }
        }
        Category::InvokeDynamic => {
            let index = parser.read_be::<u16>()?;
            parser.advance_by(2)?;
            dynamic.lower(index)?
        }
        Category::New => InstructionKind::Type {
            opcode,
            ty: JavaType::Class(pool.class_name(parser.read_be::<u16>()?)?.to_string()),
        },
        Category::MultiArray => {
            let ty = JavaType::from_class_constant(pool.class_name(parser.read_be::<u16>()?)?)?;
            let dimensions = parser.read_be::<u8>()?;
            if dimensions == 0 || dimensions > ty.dimensions() {
                return Err(malformed_error!(
                    "multianewarray at {} has invalid dimension count {}",
                    pc,
                    dimensions
                ));
            }
            InstructionKind::MultiArray { ty, dimensions }
        }
        Category::Unary => match opcode {
            Opcode::Newarray => InstructionKind::Integer {
                opcode,
                value: i32::from(parser.read_be::<u8>()?),
            },
            Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof => InstructionKind::Type {
                opcode,
                ty: JavaType::from_class_constant(pool.class_name(parser.read_be::<u16>()?)?)?,
            },
            _ => InstructionKind::Simple(opcode),
        },
        Category::Wide => {
            let byte = parser.read_be::<u8>()?;
            let widened = Opcode::from_byte(byte).ok_or_else(|| {
                malformed_error!("Invalid opcode {:#04x} after wide at {}", byte, pc)
            })?;
            match widened.category() {
                Category::Load | Category::Store if widened.implied_local().is_none() => {
                    InstructionKind::Variable {
                        opcode: widened,
                        local: parser.read_be::<u16>()?,
                    }
                }
                Category::Increment => InstructionKind::Increment {
                    local: parser.read_be::<u16>()?,
                    amount: parser.read_be::<i16>()?,
                },
                Category::Unsupported => {
                    return Err(unsupported_error!("wide {} at offset {}", widened.mnemonic(), pc))
                }
                _ => {
                    return Err(malformed_error!(
                        "{} cannot follow wide at {}",
                        widened.mnemonic(),
                        pc
                    ))
                }
            }
        }
        Category::Unsupported => {
            return Err(unsupported_error!("{} at offset {}", opcode.mnemonic(), pc))
        }
        Category::Nop
        | Category::ArrayLoad
        | Category::ArrayStore
        | Category::Stack
        | Category::Binary
        | Category::Return
        | Category::Throw
        | Category::Monitor => InstructionKind::Simple(opcode),
    })
}

/// Decodes a method's `Code` attribute into its instruction stream and exception table.
///
/// Local variable indices are kept exactly as in the bytecode. Exception table entries keep
/// their declaration order, which is also their handler priority.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for invalid opcodes, operands or offsets and
/// [`crate::Error::NotSupported`] for subroutines and unsupported dynamic call sites.
pub fn decode(
    method: &mut MethodDescriptor,
    code: &CodeAttribute,
    pool: &ConstantPool,
    dynamic: &mut DynamicContext,
) -> Result<()> {
    method.max_stack = code.max_stack;
    method.max_locals = code.max_locals;

    let mut parser = Parser::new(code.code);
    let mut decoded = Vec::new();
    while parser.has_more_data() {
        let offset = parser.pos() as u32;
        let kind = decode_one(&mut parser, pool, dynamic)?;
        decoded.push(Decoded { offset, kind });
    }

    let length = code.code.len() as u32;
    let boundaries: BTreeSet<u32> = decoded.iter().map(|entry| entry.offset).collect();

    let mut referenced = BTreeSet::new();
    for entry in &decoded {
        let instruction = Instruction::new(entry.kind.clone());
        referenced.extend(instruction.targets().iter().map(|target| target.label));
    }
    for handler in &code.exceptions {
        if handler.start >= handler.end || handler.end > length {
            return Err(malformed_error!(
                "Invalid exception range [{}, {}) in {}",
                handler.start,
                handler.end,
                method.display_name()
            ));
        }
        referenced.extend([handler.start, handler.end, handler.handler]);
    }

    let lines: BTreeMap<u32, u16> = code.lines.iter().copied().collect();
    referenced.extend(lines.keys().copied().filter(|offset| *offset < length));

    let mut labels: FxHashMap<u32, LabelId> = FxHashMap::default();
    for offset in referenced {
        if offset != length && !boundaries.contains(&offset) {
            return Err(malformed_error!(
                "Offset {} in {} is not an instruction boundary",
                offset,
                method.display_name()
            ));
        }
        labels.insert(offset, method.new_label());
    }

    let mut instructions = Vec::with_capacity(decoded.len() * 2);
    for entry in decoded {
        if let Some(label) = labels.get(&entry.offset) {
            instructions.push(Instruction::new(InstructionKind::Label(*label)));
        }
        if let Some(line) = lines.get(&entry.offset) {
            instructions.push(Instruction::new(InstructionKind::LineNumber(*line)));
        }
        let mut instruction = Instruction::new(entry.kind);
        for target in instruction.targets_mut() {
            target.label = labels[&target.label];
        }
        instructions.push(instruction);
    }
    if let Some(label) = labels.get(&length) {
        instructions.push(Instruction::new(InstructionKind::Label(*label)));
    }
    method.instructions = instructions;

    for handler in &code.exceptions {
        let catch_type = pool
            .optional_class_name(handler.catch_type)?
            .map(str::to_string);
        method.regions.push(TryCatchRegion::new(
            labels[&handler.start],
            labels[&handler.end],
            labels[&handler.handler],
            catch_type,
        ));
    }

    log::trace!(
        "{}: decoded {} instructions, {} regions",
        method.display_name(),
        method.instructions.len(),
        method.regions.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        classfile::attributes::ExceptionEntry,
        ir::AccessFlags,
    };

    fn method(descriptor: &str) -> MethodDescriptor {
        let signature = MethodSignature::new("m", descriptor).unwrap();
        MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC)
    }

    fn empty_pool() -> ConstantPool {
        ConstantPool::parse(&mut Parser::new(&[0x00, 0x01])).unwrap()
    }

    fn decode_bytes(bytes: &[u8], exceptions: Vec<ExceptionEntry>, lines: Vec<(u32, u16)>) -> Result<MethodDescriptor> {
        let pool = empty_pool();
        let mut dynamic = DynamicContext::new("pkg/A", &pool, &[]);
        let code = CodeAttribute {
            max_stack: 2,
            max_locals: 2,
            code: bytes,
            exceptions,
            lines,
        };
        let mut method = method("(II)I");
        decode(&mut method, &code, &pool, &mut dynamic)?;
        Ok(method)
    }

    fn kinds(method: &MethodDescriptor) -> Vec<InstructionKind> {
        method
            .instructions
            .iter()
            .map(|instruction| instruction.kind.clone())
            .collect()
    }

    #[test]
    fn test_add_method() {
        // iload_0 iload_1 iadd ireturn
        let method = decode_bytes(&[0x1a, 0x1b, 0x60, 0xac], vec![], vec![(0, 7)]).unwrap();
        assert_eq!(
            kinds(&method),
            vec![
                InstructionKind::Label(0),
                InstructionKind::LineNumber(7),
                InstructionKind::Variable {
                    opcode: Opcode::Iload,
                    local: 0
                },
                InstructionKind::Variable {
                    opcode: Opcode::Iload,
                    local: 1
                },
                InstructionKind::Simple(Opcode::Iadd),
                InstructionKind::Simple(Opcode::Ireturn),
            ]
        );
        assert_eq!(method.max_locals, 2);
    }

    #[test]
    fn test_branch_labels() {
        // 0: iload_0  1: ifeq +5 (-> 6)  4: iconst_1  5: ireturn  6: iconst_0  7: ireturn
        let method =
            decode_bytes(&[0x1a, 0x99, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac], vec![], vec![])
                .unwrap();
        let kinds = kinds(&method);
        assert_eq!(
            kinds[1],
            InstructionKind::Jump {
                opcode: Opcode::Ifeq,
                target: JumpTarget::new(0)
            }
        );
        assert_eq!(kinds[4], InstructionKind::Label(0));
        assert_eq!(kinds[5], InstructionKind::Simple(Opcode::Iconst0));
    }

    #[test]
    fn test_wide_and_tableswitch() {
        // 0: wide iinc 300 -2   6: iload_0   7: tableswitch (pad to 8)
        let mut code = vec![0xc4, 0x84, 0x01, 0x2c, 0xff, 0xfe, 0x1a, 0xaa];
        code.extend_from_slice(&21i32.to_be_bytes()); // default -> 28
        code.extend_from_slice(&1i32.to_be_bytes()); // low
        code.extend_from_slice(&2i32.to_be_bytes()); // high
        code.extend_from_slice(&21i32.to_be_bytes()); // 1 -> 28
        code.extend_from_slice(&22i32.to_be_bytes()); // 2 -> 29
        code.extend_from_slice(&[0x04, 0xac]); // 28: iconst_1  29: ireturn
        let method = decode_bytes(&code, vec![], vec![]).unwrap();
        let kinds = kinds(&method);
        assert_eq!(
            kinds[0],
            InstructionKind::Increment {
                local: 300,
                amount: -2
            }
        );
        match &kinds[2] {
            InstructionKind::Switch {
                keys,
                targets,
                default,
            } => {
                assert_eq!(keys, &vec![1, 2]);
                assert_eq!(targets[0].label, default.label);
                assert_ne!(targets[1].label, default.label);
            }
            other => panic!("expected switch, found {other:?}"),
        }
    }

    #[test]
    fn test_exception_table_labels() {
        // 0: nop 1: return 2: astore_1 3: return
        let method = decode_bytes(
            &[0x00, 0xb1, 0x4c, 0xb1],
            vec![ExceptionEntry {
                start: 0,
                end: 1,
                handler: 2,
                catch_type: 0,
            }],
            vec![],
        )
        .unwrap();
        assert_eq!(method.regions.len(), 1);
        let region = &method.regions[0];
        assert_eq!(region.catch_type, None);
        let positions = method.label_positions();
        assert!(positions[&region.start] < positions[&region.end]);
        assert!(positions[&region.end] < positions[&region.handler]);
    }

    #[test]
    fn test_rejects_subroutines_and_bad_targets() {
        assert!(matches!(
            decode_bytes(&[0xa8, 0x00, 0x03, 0xb1], vec![], vec![]),
            Err(crate::Error::NotSupported(_))
        ));
        assert!(matches!(
            decode_bytes(&[0xa7, 0x00, 0x40], vec![], vec![]),
            Err(crate::Error::Malformed { .. })
        ));
        assert!(decode_bytes(&[0xca], vec![], vec![]).is_err());
    }
}
