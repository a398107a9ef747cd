//! Instructions of the intermediate representation.
//!
//! The decoder produces one [`Instruction`] per bytecode instruction plus pseudo-instructions
//! for labels and line numbers. Branches refer to labels by a method-unique [`LabelId`], never
//! by bytecode offset, so passes can insert and remove instructions freely.
//!
//! The exception flow rewriter later adds [`InstructionKind::ScopeEnter`] and
//! [`InstructionKind::ScopeExit`] markers and attaches bypass [`Route`]s to jump targets that
//! leave or enter protected regions.

use std::fmt;

use crate::{
    ir::{
        opcode::Opcode,
        signature::MethodSignature,
        types::{JavaType, TypeKind},
    },
    Error, Result,
};

/// Method-unique identifier of a jump target.
pub type LabelId = u32;

/// Identifier of a protected region, the region's index in the method's region list.
pub type ScopeId = u32;

/// A value pushed by `ldc` and friends.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// `int` (also used for `boolean`, `byte`, `char`, `short`)
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Interned string literal
    String(String),
    /// Class literal
    Class(JavaType),
}

impl Constant {
    /// The type of the pushed value.
    #[must_use]
    pub fn java_type(&self) -> JavaType {
        match self {
            Constant::Int(_) => JavaType::int(),
            Constant::Long(_) => JavaType::Primitive(TypeKind::Long),
            Constant::Float(_) => JavaType::Primitive(TypeKind::Float),
            Constant::Double(_) => JavaType::Primitive(TypeKind::Double),
            Constant::String(_) => JavaType::string(),
            Constant::Class(_) => JavaType::Class(crate::ir::CLASS_CLASS.to_string()),
        }
    }
}

/// Where a bypass hop continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Destination {
    /// An ordinary label inside the method
    Label(LabelId),
    /// The entry marker of a protected region, re-establishing its handler
    Enter(ScopeId),
    /// The exit marker of a protected region, releasing its handler
    Exit(ScopeId),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Label(label) => write!(f, "L{label}"),
            Destination::Enter(scope) => write!(f, "try_{scope}"),
            Destination::Exit(scope) => write!(f, "exit_{scope}"),
        }
    }
}

/// A control transfer that has to pass region markers before reaching its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Bypass flag raised before the first hop
    pub flag: u16,
    /// First marker to jump to
    pub via: Destination,
}

/// The target of a branch or switch case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JumpTarget {
    /// The label control eventually reaches
    pub label: LabelId,
    /// Set by the exception rewriter when the transfer crosses region boundaries
    pub route: Option<Route>,
}

impl JumpTarget {
    /// A direct jump to `label`.
    #[must_use]
    pub fn new(label: LabelId) -> Self {
        JumpTarget { label, route: None }
    }
}

/// A field reference as it appears in `getfield` / `putfield` / `getstatic` / `putstatic`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRef {
    /// Class named by the instruction
    pub owner: String,
    /// Field name
    pub name: String,
    /// Field type
    pub ty: JavaType,
    /// Class that actually declares the field, bound during hierarchy resolution
    pub declaring: Option<String>,
}

/// How a call site reaches its target, bound during hierarchy resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Direct call of the implementation declared by `owner`
    Direct {
        /// Class declaring the called body
        owner: String,
    },
    /// Call through the receiver's vtable
    Virtual {
        /// Class whose vtable layout names the slot
        owner: String,
        /// Slot index
        slot: usize,
    },
    /// Call through the runtime's interface method lookup
    Interface {
        /// Interface declaring the method
        owner: String,
        /// Index of the method in the interface's method table
        index: usize,
    },
}

/// A method reference from one of the `invoke*` instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodRef {
    /// Class or interface named by the instruction
    pub owner: String,
    /// Called signature
    pub signature: MethodSignature,
    /// `true` if the constant pool entry is an interface method reference
    pub interface: bool,
    /// Binding, set during hierarchy resolution
    pub dispatch: Option<Dispatch>,
}

/// A lambda or method reference call site, lowered to the construction of a proxy object.
#[derive(Debug, Clone, PartialEq)]
pub struct LambdaSite {
    /// Synthesized proxy class implementing the functional interface
    pub proxy: String,
    /// The functional interface
    pub interface: String,
    /// Types of the captured values, stored into the proxy's fields
    pub captures: Vec<JavaType>,
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    /// Jump target pseudo-instruction
    Label(LabelId),
    /// Source line pseudo-instruction
    LineNumber(u16),
    /// Any opcode without operands
    Simple(Opcode),
    /// `bipush`, `sipush` and `newarray` (whose operand is the array type code)
    Integer {
        /// The opcode
        opcode: Opcode,
        /// Immediate operand
        value: i32,
    },
    /// `ldc`, `ldc_w`, `ldc2_w`
    Constant(Constant),
    /// Local variable load or store, always in the long form (`iload`, not `iload_0`)
    Variable {
        /// The canonical opcode
        opcode: Opcode,
        /// Local variable index
        local: u16,
    },
    /// `iinc`
    Increment {
        /// Local variable index
        local: u16,
        /// Signed increment
        amount: i16,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`
    Type {
        /// The opcode
        opcode: Opcode,
        /// The referenced type
        ty: JavaType,
    },
    /// Field access
    Field {
        /// The opcode
        opcode: Opcode,
        /// The field
        field: FieldRef,
    },
    /// Method invocation
    Invoke {
        /// The opcode
        opcode: Opcode,
        /// The method
        method: MethodRef,
    },
    /// Lambda proxy construction
    Lambda(LambdaSite),
    /// String concatenation through a recipe
    StringConcat {
        /// Recipe with `\u{1}` marking each argument, constants already inlined
        recipe: String,
        /// Argument types in recipe order
        args: Vec<JavaType>,
    },
    /// `multianewarray`
    MultiArray {
        /// The full array type
        ty: JavaType,
        /// Number of dimension operands
        dimensions: u8,
    },
    /// Conditional and unconditional branches
    Jump {
        /// The opcode
        opcode: Opcode,
        /// Branch target
        target: JumpTarget,
    },
    /// `tableswitch` and `lookupswitch`, normalized to key/target pairs
    Switch {
        /// Case keys
        keys: Vec<i32>,
        /// Case targets, parallel to `keys`
        targets: Vec<JumpTarget>,
        /// Default target
        default: JumpTarget,
    },
    /// Entry marker of a protected region
    ScopeEnter(ScopeId),
    /// Exit marker of a protected region
    ScopeExit(ScopeId),
}

/// Typed inputs and outputs of an instruction, as resolved by the stack flow analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionIo {
    /// Stack kinds underneath the inputs, bottom-most first
    pub below: Vec<TypeKind>,
    /// Consumed values, bottom-most first
    pub inputs: Vec<JavaType>,
    /// Produced values, bottom-most first
    pub outputs: Vec<JavaType>,
}

impl InstructionIo {
    /// Operand stack depth before the instruction executes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.below.len() + self.inputs.len()
    }

    /// Stack depth after the instruction executes.
    #[must_use]
    pub fn depth_after(&self) -> usize {
        self.below.len() + self.outputs.len()
    }

    /// Stack position of the first input (and of the first output).
    #[must_use]
    pub fn base(&self) -> usize {
        self.below.len()
    }

    /// Stack kinds before the instruction executes.
    #[must_use]
    pub fn stack_before(&self) -> Vec<TypeKind> {
        let mut stack = self.below.clone();
        stack.extend(self.inputs.iter().map(JavaType::stack_kind));
        stack
    }

    /// Stack kinds after the instruction executes.
    #[must_use]
    pub fn stack_after(&self) -> Vec<TypeKind> {
        let mut stack = self.below.clone();
        stack.extend(self.outputs.iter().map(JavaType::stack_kind));
        stack
    }
}

/// One instruction with its resolution state.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// What the instruction does
    pub kind: InstructionKind,
    io: Option<InstructionIo>,
}

impl Instruction {
    /// Creates an unresolved instruction.
    #[must_use]
    pub fn new(kind: InstructionKind) -> Self {
        Instruction { kind, io: None }
    }

    /// Resolved inputs and outputs, if the flow analyzer reached this instruction.
    #[must_use]
    pub fn io(&self) -> Option<&InstructionIo> {
        self.io.as_ref()
    }

    /// `true` once inputs and outputs are bound.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.io.is_some()
    }

    /// Binds inputs and outputs. Resolution happens exactly once per instruction.
    ///
    /// # Errors
    /// Returns [`crate::Error::Error`] if the instruction was already resolved.
    pub fn resolve(&mut self, io: InstructionIo) -> Result<()> {
        if self.io.is_some() {
            return Err(Error::Error(format!("Instruction resolved twice: {self}")));
        }
        self.io = Some(io);
        Ok(())
    }

    /// `true` for labels.
    #[must_use]
    pub fn is_label(&self) -> bool {
        matches!(self.kind, InstructionKind::Label(_))
    }

    /// `true` for labels, line numbers and region markers.
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        matches!(
            self.kind,
            InstructionKind::Label(_)
                | InstructionKind::LineNumber(_)
                | InstructionKind::ScopeEnter(_)
                | InstructionKind::ScopeExit(_)
        )
    }

    /// `true` if execution can continue with the next instruction.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        match &self.kind {
            InstructionKind::Simple(opcode) | InstructionKind::Jump { opcode, .. } => {
                !opcode.is_terminal()
            }
            InstructionKind::Switch { .. } => false,
            _ => true,
        }
    }

    /// `true` for branches, switches, returns and throws.
    #[must_use]
    pub fn is_control_transfer(&self) -> bool {
        match &self.kind {
            InstructionKind::Simple(opcode) | InstructionKind::Jump { opcode, .. } => {
                opcode.is_control_transfer()
            }
            InstructionKind::Switch { .. } => true,
            _ => false,
        }
    }

    /// Every jump target of a branch or switch.
    #[must_use]
    pub fn targets(&self) -> Vec<&JumpTarget> {
        match &self.kind {
            InstructionKind::Jump { target, .. } => vec![target],
            InstructionKind::Switch {
                targets, default, ..
            } => targets.iter().chain(std::iter::once(default)).collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable access to every jump target of a branch or switch.
    pub fn targets_mut(&mut self) -> Vec<&mut JumpTarget> {
        match &mut self.kind {
            InstructionKind::Jump { target, .. } => vec![target],
            InstructionKind::Switch {
                targets, default, ..
            } => targets.iter_mut().chain(std::iter::once(default)).collect(),
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            InstructionKind::Label(label) => write!(f, "L{label}:"),
            InstructionKind::LineNumber(line) => write!(f, "line {line}"),
            InstructionKind::Simple(opcode) => write!(f, "{}", opcode.mnemonic()),
            InstructionKind::Integer { opcode, value } => {
                write!(f, "{} {}", opcode.mnemonic(), value)
            }
            InstructionKind::Constant(constant) => write!(f, "ldc {constant:?}"),
            InstructionKind::Variable { opcode, local } => {
                write!(f, "{} {}", opcode.mnemonic(), local)
            }
            InstructionKind::Increment { local, amount } => write!(f, "iinc {local} {amount}"),
            InstructionKind::Type { opcode, ty } => write!(f, "{} {}", opcode.mnemonic(), ty),
            InstructionKind::Field { opcode, field } => write!(
                f,
                "{} {}.{}:{}",
                opcode.mnemonic(),
                field.owner,
                field.name,
                field.ty
            ),
            InstructionKind::Invoke { opcode, method } => write!(
                f,
                "{} {}.{}",
                opcode.mnemonic(),
                method.owner,
                method.signature
            ),
            InstructionKind::Lambda(site) => write!(f, "lambda {}", site.proxy),
            InstructionKind::StringConcat { args, .. } => write!(f, "concat/{}", args.len()),
            InstructionKind::MultiArray { ty, dimensions } => {
                write!(f, "multianewarray {ty} {dimensions}")
            }
            InstructionKind::Jump { opcode, target } => {
                write!(f, "{} L{}", opcode.mnemonic(), target.label)
            }
            InstructionKind::Switch { keys, .. } => write!(f, "switch/{}", keys.len()),
            InstructionKind::ScopeEnter(scope) => write!(f, "enter {scope}"),
            InstructionKind::ScopeExit(scope) => write!(f, "exit {scope}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        let mut instruction = Instruction::new(InstructionKind::Simple(Opcode::Iadd));
        let io = InstructionIo {
            below: vec![TypeKind::Object],
            inputs: vec![JavaType::int(), JavaType::int()],
            outputs: vec![JavaType::int()],
        };
        instruction.resolve(io.clone()).unwrap();
        let resolved = instruction.io().unwrap();
        assert_eq!(resolved.depth(), 3);
        assert_eq!(resolved.depth_after(), 2);
        assert_eq!(resolved.base(), 1);
        assert_eq!(resolved.stack_after(), vec![TypeKind::Object, TypeKind::Int]);
        assert!(instruction.resolve(io).is_err());
    }

    #[test]
    fn test_fallthrough() {
        let goto = Instruction::new(InstructionKind::Jump {
            opcode: Opcode::Goto,
            target: JumpTarget::new(1),
        });
        let ifeq = Instruction::new(InstructionKind::Jump {
            opcode: Opcode::Ifeq,
            target: JumpTarget::new(1),
        });
        assert!(!goto.falls_through());
        assert!(ifeq.falls_through());
        assert!(!Instruction::new(InstructionKind::Simple(Opcode::Athrow)).falls_through());
        assert!(Instruction::new(InstructionKind::Label(3)).falls_through());
    }

    #[test]
    fn test_switch_targets() {
        let mut switch = Instruction::new(InstructionKind::Switch {
            keys: vec![1, 2],
            targets: vec![JumpTarget::new(10), JumpTarget::new(11)],
            default: JumpTarget::new(12),
        });
        let labels: Vec<_> = switch.targets().iter().map(|t| t.label).collect();
        assert_eq!(labels, vec![10, 11, 12]);
        for target in switch.targets_mut() {
            target.route = Some(Route {
                flag: 0,
                via: Destination::Exit(0),
            });
        }
        assert!(switch.targets().iter().all(|t| t.route.is_some()));
        assert_eq!(Destination::Exit(2).to_string(), "exit_2");
    }
}
