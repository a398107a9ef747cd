//! Storage locations of lowered operands and the per-method allocation plan.

use std::fmt;

use crate::ir::{Constant, InstructionKind, Opcode, TypeKind};

/// An immediate value that needs no storage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    /// `int` and its narrow relatives
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// The null reference
    Null,
}

impl Literal {
    /// The literal an instruction pushes, if it only pushes a primitive constant or null.
    #[must_use]
    pub fn of(kind: &InstructionKind) -> Option<Literal> {
        match kind {
            InstructionKind::Simple(opcode) => match opcode {
                Opcode::AconstNull => Some(Literal::Null),
                Opcode::IconstM1 => Some(Literal::Int(-1)),
                Opcode::Iconst0 => Some(Literal::Int(0)),
                Opcode::Iconst1 => Some(Literal::Int(1)),
                Opcode::Iconst2 => Some(Literal::Int(2)),
                Opcode::Iconst3 => Some(Literal::Int(3)),
                Opcode::Iconst4 => Some(Literal::Int(4)),
                Opcode::Iconst5 => Some(Literal::Int(5)),
                Opcode::Lconst0 => Some(Literal::Long(0)),
                Opcode::Lconst1 => Some(Literal::Long(1)),
                Opcode::Fconst0 => Some(Literal::Float(0.0)),
                Opcode::Fconst1 => Some(Literal::Float(1.0)),
                Opcode::Fconst2 => Some(Literal::Float(2.0)),
                Opcode::Dconst0 => Some(Literal::Double(0.0)),
                Opcode::Dconst1 => Some(Literal::Double(1.0)),
                _ => None,
            },
            InstructionKind::Integer { opcode, value }
                if matches!(opcode, Opcode::Bipush | Opcode::Sipush) =>
            {
                Some(Literal::Int(*value))
            }
            InstructionKind::Constant(constant) => match constant {
                Constant::Int(value) => Some(Literal::Int(*value)),
                Constant::Long(value) => Some(Literal::Long(*value)),
                Constant::Float(value) => Some(Literal::Float(*value)),
                Constant::Double(value) => Some(Literal::Double(*value)),
                Constant::String(_) | Constant::Class(_) => None,
            },
            _ => None,
        }
    }

    /// The stack kind of the literal.
    #[must_use]
    pub fn kind(self) -> TypeKind {
        match self {
            Literal::Int(_) => TypeKind::Int,
            Literal::Long(_) => TypeKind::Long,
            Literal::Float(_) => TypeKind::Float,
            Literal::Double(_) => TypeKind::Double,
            Literal::Null => TypeKind::Object,
        }
    }
}

/// Where a lowered instruction reads an input from or writes an output to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    /// A frame slot above the locals, `stack[n]` in the generated code
    Slot(u16),
    /// A single-assignment native local, scoped to one run
    Temp(u32),
    /// An immediate
    Literal(Literal),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Slot(slot) => write!(f, "s{slot}"),
            Operand::Temp(temp) => write!(f, "t{temp}"),
            Operand::Literal(literal) => write!(f, "{literal:?}"),
        }
    }
}

/// Storage assignment of one instruction.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Lowered {
    /// Input locations, parallel to the resolved inputs
    pub inputs: Vec<Operand>,
    /// Output locations, parallel to the resolved outputs
    pub outputs: Vec<Operand>,
    /// The instruction only renames values and produces no code
    pub elided: bool,
}

/// A copy of a slot into a temporary, performed before a run's final moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    /// Destination temporary
    pub temp: u32,
    /// Source slot
    pub slot: u16,
    /// Stack kind of the value
    pub kind: TypeKind,
}

/// A write of a value into its positional slot at the end of a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Move {
    /// Positional slot, equal to the value's stack depth
    pub dest: u16,
    /// Where the value currently lives
    pub source: Operand,
    /// Stack kind of the value
    pub kind: TypeKind,
}

/// A maximal straight-line range of instructions lowered together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunPlan {
    /// First instruction
    pub start: usize,
    /// One past the last instruction
    pub end: usize,
    /// Slot copies performed before `moves`
    pub captures: Vec<Capture>,
    /// Writes restoring the positional layout
    pub moves: Vec<Move>,
    /// The final instruction is a control transfer and the moves precede it
    pub flush_before_last: bool,
}

impl RunPlan {
    /// `true` if the run's final moves and captures go right before instruction `index`.
    #[must_use]
    pub fn flushes_before(&self, index: usize) -> bool {
        self.flush_before_last && index + 1 == self.end
    }

    /// `true` if the run's final moves and captures go right after instruction `index`.
    #[must_use]
    pub fn flushes_after(&self, index: usize) -> bool {
        !self.flush_before_last && index + 1 == self.end
    }
}

/// Storage assignment of a whole method.
///
/// Instructions outside every run use positional operands: input `i` of an instruction at
/// stack depth `d` with `n` inputs lives in slot `d - n + i`, and outputs are written from the
/// same base upwards. Inside a run, objects occupy the lowest free slot and primitives get
/// temporaries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodPlan {
    /// Per instruction, `None` for instructions the flow analyzer never reached
    pub lowered: Vec<Option<Lowered>>,
    /// Lowered runs in instruction order
    pub runs: Vec<RunPlan>,
    /// Kind of every temporary, indexed by temporary id
    pub temps: Vec<TypeKind>,
    /// Deepest stack the method reaches
    pub max_depth: u16,
}

impl MethodPlan {
    /// The run starting at instruction `index`.
    #[must_use]
    pub fn run_starting_at(&self, index: usize) -> Option<&RunPlan> {
        self.runs.iter().find(|run| run.start == index)
    }

    /// The run containing instruction `index`.
    #[must_use]
    pub fn run_containing(&self, index: usize) -> Option<&RunPlan> {
        self.runs
            .iter()
            .find(|run| run.start <= index && index < run.end)
    }

    /// Allocates a new temporary.
    pub fn new_temp(&mut self, kind: TypeKind) -> u32 {
        self.temps.push(kind);
        u32::try_from(self.temps.len() - 1).unwrap_or(u32::MAX)
    }

    /// Kind of a temporary.
    #[must_use]
    pub fn temp_kind(&self, temp: u32) -> Option<TypeKind> {
        self.temps.get(temp as usize).copied()
    }
}
