//! Arity and result typing of single instructions.

use crate::{
    ir::{Category, InstructionKind, JavaType, Opcode, TypeKind},
    Result,
};

/// What an instruction does to the symbolic stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Number of entries consumed from the top
    pub consumed: usize,
    /// Types pushed, bottom-most first
    pub produced: Vec<JavaType>,
}

impl Transfer {
    fn new(consumed: usize, produced: Vec<JavaType>) -> Self {
        Transfer { consumed, produced }
    }

    fn none() -> Self {
        Transfer::new(0, Vec::new())
    }
}

/// For a stack shuffle, the input index each output copies.
///
/// `inputs` are the values the shuffle consumed, bottom-most first, as decided by
/// [`transfer`]. The `dup2` family duplicates one entry when the top entry is a `long` or
/// `double` and two entries otherwise.
#[must_use]
pub fn stack_shuffle(opcode: Opcode, inputs: &[JavaType]) -> Vec<usize> {
    let count = inputs.len();
    let top_wide = inputs.last().is_some_and(JavaType::is_wide);
    let copied = match opcode {
        Opcode::Pop | Opcode::Pop2 => return Vec::new(),
        Opcode::Swap => return vec![1, 0],
        Opcode::Dup | Opcode::DupX1 | Opcode::DupX2 => 1,
        Opcode::Dup2 | Opcode::Dup2X1 | Opcode::Dup2X2 => {
            if top_wide {
                1
            } else {
                2
            }
        }
        _ => return (0..count).collect(),
    }
    .min(count);

    (count - copied..count).chain(0..count).collect()
}

fn wide_at(stack: &[JavaType], from_top: usize) -> bool {
    stack
        .len()
        .checked_sub(from_top + 1)
        .and_then(|index| stack.get(index))
        .is_some_and(JavaType::is_wide)
}

/// Number of entries a stack shuffle consumes given the current stack.
fn shuffle_inputs(opcode: Opcode, stack: &[JavaType]) -> usize {
    let top = wide_at(stack, 0);
    match opcode {
        Opcode::Pop | Opcode::Dup => 1,
        Opcode::Pop2 | Opcode::Dup2 => {
            if top {
                1
            } else {
                2
            }
        }
        Opcode::Swap | Opcode::DupX1 => 2,
        Opcode::DupX2 => {
            if wide_at(stack, 1) {
                2
            } else {
                3
            }
        }
        Opcode::Dup2X1 => {
            if top {
                2
            } else {
                3
            }
        }
        Opcode::Dup2X2 => match (top, wide_at(stack, 1)) {
            (true, true) => 2,
            (true, false) => 3,
            (false, _) if wide_at(stack, 2) => 3,
            (false, _) => 4,
        },
        _ => 0,
    }
}

fn primitive(kind: TypeKind) -> JavaType {
    JavaType::Primitive(kind)
}

/// Result kind of the typed arithmetic, conversion and constant opcodes.
fn result_kind(opcode: Opcode) -> TypeKind {
    use Opcode::*;
    match opcode {
        Lconst0 | Lconst1 | Ladd | Lsub | Lmul | Ldiv | Lrem | Lneg | Lshl | Lshr | Lushr
        | Land | Lor | Lxor | I2l | F2l | D2l | Laload => TypeKind::Long,
        Fconst0 | Fconst1 | Fconst2 | Fadd | Fsub | Fmul | Fdiv | Frem | Fneg | I2f | L2f
        | D2f | Faload => TypeKind::Float,
        Dconst0 | Dconst1 | Dadd | Dsub | Dmul | Ddiv | Drem | Dneg | I2d | L2d | F2d
        | Daload => TypeKind::Double,
        AconstNull | Aaload => TypeKind::Object,
        _ => TypeKind::Int,
    }
}

fn load_kind(opcode: Opcode) -> TypeKind {
    match opcode.canonical_variable() {
        Opcode::Lload => TypeKind::Long,
        Opcode::Fload => TypeKind::Float,
        Opcode::Dload => TypeKind::Double,
        Opcode::Aload => TypeKind::Object,
        _ => TypeKind::Int,
    }
}

/// Computes how `kind` transforms the stack, which holds `stack` bottom-most first.
///
/// Stack shuffles look at the categories of the top entries to pick their form. Everything
/// else has a fixed arity.
///
/// # Errors
/// Returns [`crate::Error::NotSupported`] for `jsr`, `ret` and stray `wide` / `invokedynamic`
/// opcodes, which the decoder never produces.
pub fn transfer(kind: &InstructionKind, stack: &[JavaType]) -> Result<Transfer> {
    Ok(match kind {
        InstructionKind::Label(_)
        | InstructionKind::LineNumber(_)
        | InstructionKind::ScopeEnter(_)
        | InstructionKind::ScopeExit(_)
        | InstructionKind::Increment { .. } => Transfer::none(),
        InstructionKind::Constant(constant) => Transfer::new(0, vec![constant.java_type()]),
        InstructionKind::Integer { opcode, value } => match opcode {
            Opcode::Newarray => {
                let element = TypeKind::from_array_code(*value)
                    .ok_or_else(|| malformed_error!("Invalid newarray type code {}", value))?;
                Transfer::new(1, vec![JavaType::array_of(primitive(element), 1)])
            }
            _ => Transfer::new(0, vec![JavaType::int()]),
        },
        InstructionKind::Variable { opcode, .. } => match opcode.category() {
            Category::Load => {
                let kind = load_kind(*opcode);
                Transfer::new(0, vec![JavaType::from(kind)])
            }
            _ => Transfer::new(1, Vec::new()),
        },
        InstructionKind::Type { opcode, ty } => match opcode {
            Opcode::New => Transfer::new(0, vec![ty.clone()]),
            Opcode::Anewarray => Transfer::new(1, vec![JavaType::array_of(ty.clone(), 1)]),
            Opcode::Checkcast => Transfer::new(1, vec![ty.clone()]),
            Opcode::Instanceof => Transfer::new(1, vec![JavaType::int()]),
            other => return Err(unsupported_error!("type operand on {}", other.mnemonic())),
        },
        InstructionKind::Field { opcode, field } => match opcode {
            Opcode::Getstatic => Transfer::new(0, vec![field.ty.clone()]),
            Opcode::Putstatic => Transfer::new(1, Vec::new()),
            Opcode::Getfield => Transfer::new(1, vec![field.ty.clone()]),
            _ => Transfer::new(2, Vec::new()),
        },
        InstructionKind::Invoke { opcode, method } => {
            let receiver = usize::from(*opcode != Opcode::Invokestatic);
            let returned = method.signature.return_type();
            Transfer::new(
                receiver + method.signature.params().len(),
                if returned.is_void() {
                    Vec::new()
                } else {
                    vec![returned.clone()]
                },
            )
        }
        InstructionKind::Lambda(site) => Transfer::new(
            site.captures.len(),
            vec![JavaType::Class(site.proxy.clone())],
        ),
        InstructionKind::StringConcat { args, .. } => {
            Transfer::new(args.len(), vec![JavaType::string()])
        }
        InstructionKind::MultiArray { ty, dimensions } => {
            Transfer::new(usize::from(*dimensions), vec![ty.clone()])
        }
        InstructionKind::Jump { opcode, .. } => match opcode.category() {
            Category::BranchUnary => Transfer::new(1, Vec::new()),
            Category::BranchBinary => Transfer::new(2, Vec::new()),
            _ => Transfer::none(),
        },
        InstructionKind::Switch { .. } => Transfer::new(1, Vec::new()),
        InstructionKind::Simple(opcode) => simple(*opcode, stack)?,
    })
}

fn simple(opcode: Opcode, stack: &[JavaType]) -> Result<Transfer> {
    Ok(match opcode.category() {
        Category::Nop => Transfer::none(),
        Category::Constant => {
            let kind = result_kind(opcode);
            let ty = if kind == TypeKind::Object {
                JavaType::object()
            } else {
                primitive(kind)
            };
            Transfer::new(0, vec![ty])
        }
        Category::ArrayLoad => {
            let element = match opcode {
                Opcode::Aaload => stack
                    .len()
                    .checked_sub(2)
                    .and_then(|index| stack[index].element())
                    .filter(JavaType::is_reference)
                    .unwrap_or_else(JavaType::object),
                other => primitive(result_kind(other)),
            };
            Transfer::new(2, vec![element])
        }
        Category::ArrayStore => Transfer::new(3, Vec::new()),
        Category::Stack => {
            let consumed = shuffle_inputs(opcode, stack);
            if consumed > stack.len() {
                // the caller reports the underflow
                return Ok(Transfer::new(consumed, Vec::new()));
            }
            let inputs = &stack[stack.len() - consumed..];
            let produced = stack_shuffle(opcode, inputs)
                .into_iter()
                .map(|index| inputs[index].clone())
                .collect();
            Transfer::new(consumed, produced)
        }
        Category::Binary => match opcode {
            Opcode::Lcmp | Opcode::Fcmpl | Opcode::Fcmpg | Opcode::Dcmpl | Opcode::Dcmpg => {
                Transfer::new(2, vec![JavaType::int()])
            }
            other => Transfer::new(2, vec![primitive(result_kind(other))]),
        },
        Category::Unary => match opcode {
            Opcode::Arraylength => Transfer::new(1, vec![JavaType::int()]),
            other => Transfer::new(1, vec![primitive(result_kind(other))]),
        },
        Category::Return => {
            if opcode == Opcode::Return {
                Transfer::none()
            } else {
                Transfer::new(1, Vec::new())
            }
        }
        Category::Throw | Category::Monitor => Transfer::new(1, Vec::new()),
        other => {
            return Err(unsupported_error!(
                "opcode {} in category {:?}",
                opcode.mnemonic(),
                other
            ))
        }
    })
}
