//! JVM opcodes and their categories.
//!
//! Every opcode belongs to exactly one [`Category`]; the category decides how many operand
//! stack entries the instruction consumes and produces, which the stack flow analyzer uses to
//! bind typed inputs and outputs.
#![allow(missing_docs)]

use strum::{EnumCount, EnumIter};

macro_rules! opcodes {
    ($($variant:ident = $byte:literal => $mnemonic:literal, $category:ident;)*) => {
        /// A JVM opcode (JVMS chapter 6).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount)]
        #[repr(u8)]
        pub enum Opcode {
            $($variant = $byte,)*
        }

        impl Opcode {
            /// Decodes an opcode byte.
            #[must_use]
            pub fn from_byte(byte: u8) -> Option<Opcode> {
                match byte {
                    $($byte => Some(Opcode::$variant),)*
                    _ => None,
                }
            }

            /// The assembler mnemonic.
            #[must_use]
            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $mnemonic,)*
                }
            }

            /// The arity class of the opcode.
            #[must_use]
            pub fn category(self) -> Category {
                match self {
                    $(Opcode::$variant => Category::$category,)*
                }
            }
        }
    };
}

/// Arity classes shared by groups of opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// No stack effect
    Nop,
    /// Pushes a constant
    Constant,
    /// Pushes a local variable
    Load,
    /// Pops into a local variable
    Store,
    /// Array element read (array, index -> value)
    ArrayLoad,
    /// Array element write (array, index, value ->)
    ArrayStore,
    /// Stack shuffling; arity depends on the categories of the values involved
    Stack,
    /// Two operands, one result
    Binary,
    /// One operand, one result
    Unary,
    /// Local variable increment, no stack effect
    Increment,
    /// Conditional branch on one operand
    BranchUnary,
    /// Conditional branch comparing two operands
    BranchBinary,
    /// Unconditional branch
    Goto,
    /// Multi-way branch on one operand
    Switch,
    /// Method return, optional value
    Return,
    /// Throws the operand
    Throw,
    /// Field access; arity depends on static-ness and direction
    Field,
    /// Method invocation; arity depends on the descriptor
    Invoke,
    /// Dynamic call site
    InvokeDynamic,
    /// Object allocation
    New,
    /// Multi-dimensional array allocation
    MultiArray,
    /// Monitor enter/exit
    Monitor,
    /// Operand prefix, consumed by the decoder
    Wide,
    /// Subroutines, which the compiler does not handle
    Unsupported,
}

opcodes! {
    Nop = 0x00 => "nop", Nop;
    AconstNull = 0x01 => "aconst_null", Constant;
    IconstM1 = 0x02 => "iconst_m1", Constant;
    Iconst0 = 0x03 => "iconst_0", Constant;
    Iconst1 = 0x04 => "iconst_1", Constant;
    Iconst2 = 0x05 => "iconst_2", Constant;
    Iconst3 = 0x06 => "iconst_3", Constant;
    Iconst4 = 0x07 => "iconst_4", Constant;
    Iconst5 = 0x08 => "iconst_5", Constant;
    Lconst0 = 0x09 => "lconst_0", Constant;
    Lconst1 = 0x0a => "lconst_1", Constant;
    Fconst0 = 0x0b => "fconst_0", Constant;
    Fconst1 = 0x0c => "fconst_1", Constant;
    Fconst2 = 0x0d => "fconst_2", Constant;
    Dconst0 = 0x0e => "dconst_0", Constant;
    Dconst1 = 0x0f => "dconst_1", Constant;
    Bipush = 0x10 => "bipush", Constant;
    Sipush = 0x11 => "sipush", Constant;
    Ldc = 0x12 => "ldc", Constant;
    LdcW = 0x13 => "ldc_w", Constant;
    Ldc2W = 0x14 => "ldc2_w", Constant;
    Iload = 0x15 => "iload", Load;
    Lload = 0x16 => "lload", Load;
    Fload = 0x17 => "fload", Load;
    Dload = 0x18 => "dload", Load;
    Aload = 0x19 => "aload", Load;
    Iload0 = 0x1a => "iload_0", Load;
    Iload1 = 0x1b => "iload_1", Load;
    Iload2 = 0x1c => "iload_2", Load;
    Iload3 = 0x1d => "iload_3", Load;
    Lload0 = 0x1e => "lload_0", Load;
    Lload1 = 0x1f => "lload_1", Load;
    Lload2 = 0x20 => "lload_2", Load;
    Lload3 = 0x21 => "lload_3", Load;
    Fload0 = 0x22 => "fload_0", Load;
    Fload1 = 0x23 => "fload_1", Load;
    Fload2 = 0x24 => "fload_2", Load;
    Fload3 = 0x25 => "fload_3", Load;
    Dload0 = 0x26 => "dload_0", Load;
    Dload1 = 0x27 => "dload_1", Load;
    Dload2 = 0x28 => "dload_2", Load;
    Dload3 = 0x29 => "dload_3", Load;
    Aload0 = 0x2a => "aload_0", Load;
    Aload1 = 0x2b => "aload_1", Load;
    Aload2 = 0x2c => "aload_2", Load;
    Aload3 = 0x2d => "aload_3", Load;
    Iaload = 0x2e => "iaload", ArrayLoad;
    Laload = 0x2f => "laload", ArrayLoad;
    Faload = 0x30 => "faload", ArrayLoad;
    Daload = 0x31 => "daload", ArrayLoad;
    Aaload = 0x32 => "aaload", ArrayLoad;
    Baload = 0x33 => "baload", ArrayLoad;
    Caload = 0x34 => "caload", ArrayLoad;
    Saload = 0x35 => "saload", ArrayLoad;
    Istore = 0x36 => "istore", Store;
    Lstore = 0x37 => "lstore", Store;
    Fstore = 0x38 => "fstore", Store;
    Dstore = 0x39 => "dstore", Store;
    Astore = 0x3a => "astore", Store;
    Istore0 = 0x3b => "istore_0", Store;
    Istore1 = 0x3c => "istore_1", Store;
    Istore2 = 0x3d => "istore_2", Store;
    Istore3 = 0x3e => "istore_3", Store;
    Lstore0 = 0x3f => "lstore_0", Store;
    Lstore1 = 0x40 => "lstore_1", Store;
    Lstore2 = 0x41 => "lstore_2", Store;
    Lstore3 = 0x42 => "lstore_3", Store;
    Fstore0 = 0x43 => "fstore_0", Store;
    Fstore1 = 0x44 => "fstore_1", Store;
    Fstore2 = 0x45 => "fstore_2", Store;
    Fstore3 = 0x46 => "fstore_3", Store;
    Dstore0 = 0x47 => "dstore_0", Store;
    Dstore1 = 0x48 => "dstore_1", Store;
    Dstore2 = 0x49 => "dstore_2", Store;
    Dstore3 = 0x4a => "dstore_3", Store;
    Astore0 = 0x4b => "astore_0", Store;
    Astore1 = 0x4c => "astore_1", Store;
    Astore2 = 0x4d => "astore_2", Store;
    Astore3 = 0x4e => "astore_3", Store;
    Iastore = 0x4f => "iastore", ArrayStore;
    Lastore = 0x50 => "lastore", ArrayStore;
    Fastore = 0x51 => "fastore", ArrayStore;
    Dastore = 0x52 => "dastore", ArrayStore;
    Aastore = 0x53 => "aastore", ArrayStore;
    Bastore = 0x54 => "bastore", ArrayStore;
    Castore = 0x55 => "castore", ArrayStore;
    Sastore = 0x56 => "sastore", ArrayStore;
    Pop = 0x57 => "pop", Stack;
    Pop2 = 0x58 => "pop2", Stack;
    Dup = 0x59 => "dup", Stack;
    DupX1 = 0x5a => "dup_x1", Stack;
    DupX2 = 0x5b => "dup_x2", Stack;
    Dup2 = 0x5c => "dup2", Stack;
    Dup2X1 = 0x5d => "dup2_x1", Stack;
    Dup2X2 = 0x5e => "dup2_x2", Stack;
    Swap = 0x5f => "swap", Stack;
    Iadd = 0x60 => "iadd", Binary;
    Ladd = 0x61 => "ladd", Binary;
    Fadd = 0x62 => "fadd", Binary;
    Dadd = 0x63 => "dadd", Binary;
    Isub = 0x64 => "isub", Binary;
    Lsub = 0x65 => "lsub", Binary;
    Fsub = 0x66 => "fsub", Binary;
    Dsub = 0x67 => "dsub", Binary;
    Imul = 0x68 => "imul", Binary;
    Lmul = 0x69 => "lmul", Binary;
    Fmul = 0x6a => "fmul", Binary;
    Dmul = 0x6b => "dmul", Binary;
    Idiv = 0x6c => "idiv", Binary;
    Ldiv = 0x6d => "ldiv", Binary;
    Fdiv = 0x6e => "fdiv", Binary;
    Ddiv = 0x6f => "ddiv", Binary;
    Irem = 0x70 => "irem", Binary;
    Lrem = 0x71 => "lrem", Binary;
    Frem = 0x72 => "frem", Binary;
    Drem = 0x73 => "drem", Binary;
    Ineg = 0x74 => "ineg", Unary;
    Lneg = 0x75 => "lneg", Unary;
    Fneg = 0x76 => "fneg", Unary;
    Dneg = 0x77 => "dneg", Unary;
    Ishl = 0x78 => "ishl", Binary;
    Lshl = 0x79 => "lshl", Binary;
    Ishr = 0x7a => "ishr", Binary;
    Lshr = 0x7b => "lshr", Binary;
    Iushr = 0x7c => "iushr", Binary;
    Lushr = 0x7d => "lushr", Binary;
    Iand = 0x7e => "iand", Binary;
    Land = 0x7f => "land", Binary;
    Ior = 0x80 => "ior", Binary;
    Lor = 0x81 => "lor", Binary;
    Ixor = 0x82 => "ixor", Binary;
    Lxor = 0x83 => "lxor", Binary;
    Iinc = 0x84 => "iinc", Increment;
    I2l = 0x85 => "i2l", Unary;
    I2f = 0x86 => "i2f", Unary;
    I2d = 0x87 => "i2d", Unary;
    L2i = 0x88 => "l2i", Unary;
    L2f = 0x89 => "l2f", Unary;
    L2d = 0x8a => "l2d", Unary;
    F2i = 0x8b => "f2i", Unary;
    F2l = 0x8c => "f2l", Unary;
    F2d = 0x8d => "f2d", Unary;
    D2i = 0x8e => "d2i", Unary;
    D2l = 0x8f => "d2l", Unary;
    D2f = 0x90 => "d2f", Unary;
    I2b = 0x91 => "i2b", Unary;
    I2c = 0x92 => "i2c", Unary;
    I2s = 0x93 => "i2s", Unary;
    Lcmp = 0x94 => "lcmp", Binary;
    Fcmpl = 0x95 => "fcmpl", Binary;
    Fcmpg = 0x96 => "fcmpg", Binary;
    Dcmpl = 0x97 => "dcmpl", Binary;
    Dcmpg = 0x98 => "dcmpg", Binary;
    Ifeq = 0x99 => "ifeq", BranchUnary;
    Ifne = 0x9a => "ifne", BranchUnary;
    Iflt = 0x9b => "iflt", BranchUnary;
    Ifge = 0x9c => "ifge", BranchUnary;
    Ifgt = 0x9d => "ifgt", BranchUnary;
    Ifle = 0x9e => "ifle", BranchUnary;
    IfIcmpeq = 0x9f => "if_icmpeq", BranchBinary;
    IfIcmpne = 0xa0 => "if_icmpne", BranchBinary;
    IfIcmplt = 0xa1 => "if_icmplt", BranchBinary;
    IfIcmpge = 0xa2 => "if_icmpge", BranchBinary;
    IfIcmpgt = 0xa3 => "if_icmpgt", BranchBinary;
    IfIcmple = 0xa4 => "if_icmple", BranchBinary;
    IfAcmpeq = 0xa5 => "if_acmpeq", BranchBinary;
    IfAcmpne = 0xa6 => "if_acmpne", BranchBinary;
    Goto = 0xa7 => "goto", Goto;
    Jsr = 0xa8 => "jsr", Unsupported;
    Ret = 0xa9 => "ret", Unsupported;
    Tableswitch = 0xaa => "tableswitch", Switch;
    Lookupswitch = 0xab => "lookupswitch", Switch;
    Ireturn = 0xac => "ireturn", Return;
    Lreturn = 0xad => "lreturn", Return;
    Freturn = 0xae => "freturn", Return;
    Dreturn = 0xaf => "dreturn", Return;
    Areturn = 0xb0 => "areturn", Return;
    Return = 0xb1 => "return", Return;
    Getstatic = 0xb2 => "getstatic", Field;
    Putstatic = 0xb3 => "putstatic", Field;
    Getfield = 0xb4 => "getfield", Field;
    Putfield = 0xb5 => "putfield", Field;
    Invokevirtual = 0xb6 => "invokevirtual", Invoke;
    Invokespecial = 0xb7 => "invokespecial", Invoke;
    Invokestatic = 0xb8 => "invokestatic", Invoke;
    Invokeinterface = 0xb9 => "invokeinterface", Invoke;
    Invokedynamic = 0xba => "invokedynamic", InvokeDynamic;
    New = 0xbb => "new", New;
    Newarray = 0xbc => "newarray", Unary;
    Anewarray = 0xbd => "anewarray", Unary;
    Arraylength = 0xbe => "arraylength", Unary;
    Athrow = 0xbf => "athrow", Throw;
    Checkcast = 0xc0 => "checkcast", Unary;
    Instanceof = 0xc1 => "instanceof", Unary;
    Monitorenter = 0xc2 => "monitorenter", Monitor;
    Monitorexit = 0xc3 => "monitorexit", Monitor;
    Wide = 0xc4 => "wide", Wide;
    Multianewarray = 0xc5 => "multianewarray", MultiArray;
    Ifnull = 0xc6 => "ifnull", BranchUnary;
    Ifnonnull = 0xc7 => "ifnonnull", BranchUnary;
    GotoW = 0xc8 => "goto_w", Goto;
    JsrW = 0xc9 => "jsr_w", Unsupported;
}

impl Opcode {
    /// `true` if control never continues with the next instruction.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self.category(),
            Category::Goto | Category::Switch | Category::Return | Category::Throw
        )
    }

    /// `true` for every branch, switch, return and throw.
    #[must_use]
    pub fn is_control_transfer(self) -> bool {
        matches!(
            self.category(),
            Category::Goto
                | Category::BranchUnary
                | Category::BranchBinary
                | Category::Switch
                | Category::Return
                | Category::Throw
        )
    }

    /// For the short `xload_n` / `xstore_n` forms, the implied local index.
    #[must_use]
    pub fn implied_local(self) -> Option<u16> {
        let byte = self as u8;
        match byte {
            0x1a..=0x2d => Some(u16::from((byte - 0x1a) % 4)),
            0x3b..=0x4e => Some(u16::from((byte - 0x3b) % 4)),
            _ => None,
        }
    }

    /// The long form (`iload`, `astore`, ...) of a load or store opcode.
    #[must_use]
    pub fn canonical_variable(self) -> Opcode {
        let byte = self as u8;
        let canonical = match byte {
            0x1a..=0x2d => 0x15 + (byte - 0x1a) / 4,
            0x3b..=0x4e => 0x36 + (byte - 0x3b) / 4,
            _ => byte,
        };
        Opcode::from_byte(canonical).unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_from_byte_round_trips_every_opcode() {
        for opcode in Opcode::iter() {
            assert_eq!(Opcode::from_byte(opcode as u8), Some(opcode));
        }
        assert_eq!(Opcode::COUNT, 202);
        assert_eq!(Opcode::from_byte(0xca), None);
    }

    #[test]
    fn test_short_forms() {
        assert_eq!(Opcode::Aload3.implied_local(), Some(3));
        assert_eq!(Opcode::Aload3.canonical_variable(), Opcode::Aload);
        assert_eq!(Opcode::Dstore1.implied_local(), Some(1));
        assert_eq!(Opcode::Dstore1.canonical_variable(), Opcode::Dstore);
        assert_eq!(Opcode::Iload.implied_local(), None);
        assert_eq!(Opcode::Iadd.canonical_variable(), Opcode::Iadd);
    }

    #[test]
    fn test_categories() {
        assert_eq!(Opcode::Iadd.category(), Category::Binary);
        assert_eq!(Opcode::Lcmp.category(), Category::Binary);
        assert_eq!(Opcode::Jsr.category(), Category::Unsupported);
        assert!(Opcode::Athrow.is_terminal());
        assert!(!Opcode::Ifeq.is_terminal());
        assert!(Opcode::Ifeq.is_control_transfer());
        assert_eq!(Opcode::Return.mnemonic(), "return");
    }
}
