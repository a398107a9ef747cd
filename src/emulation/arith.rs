//! Java arithmetic, conversions and comparisons on emulated values.

use std::cmp::Ordering;

use crate::{emulation::value::EmValue, ir::Opcode, Error, Result};

/// Result of an arithmetic instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Arith {
    /// The computed value
    Value(EmValue),
    /// Integer division or remainder by zero
    DivideByZero,
}

fn not_arithmetic(opcode: Opcode) -> Error {
    Error::Emulation(format!("{} is not an arithmetic instruction", opcode.mnemonic()))
}

fn compare<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan,
    }
}

/// Applies a two-operand opcode.
///
/// # Errors
/// Returns [`Error::Emulation`] if the opcode is not binary or the operands have the wrong
/// kinds.
pub(crate) fn binary(opcode: Opcode, a: EmValue, b: EmValue) -> Result<Arith> {
    use Opcode::*;

    let value = match opcode {
        Iadd | Isub | Imul | Iand | Ior | Ixor | Ishl | Ishr | Iushr => {
            let (a, b) = (a.as_int()?, b.as_int()?);
            EmValue::Int(match opcode {
                Iadd => a.wrapping_add(b),
                Isub => a.wrapping_sub(b),
                Imul => a.wrapping_mul(b),
                Iand => a & b,
                Ior => a | b,
                Ixor => a ^ b,
                Ishl => a.wrapping_shl((b & 31) as u32),
                Ishr => a.wrapping_shr((b & 31) as u32),
                _ => ((a as u32) >> (b & 31)) as i32,
            })
        }
        Idiv | Irem => {
            let (a, b) = (a.as_int()?, b.as_int()?);
            if b == 0 {
                return Ok(Arith::DivideByZero);
            }
            EmValue::Int(if opcode == Idiv {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            })
        }
        Ladd | Lsub | Lmul | Land | Lor | Lxor => {
            let (a, b) = (a.as_long()?, b.as_long()?);
            EmValue::Long(match opcode {
                Ladd => a.wrapping_add(b),
                Lsub => a.wrapping_sub(b),
                Lmul => a.wrapping_mul(b),
                Land => a & b,
                Lor => a | b,
                _ => a ^ b,
            })
        }
        Lshl | Lshr | Lushr => {
            let (a, b) = (a.as_long()?, b.as_int()?);
            let shift = (b & 63) as u32;
            EmValue::Long(match opcode {
                Lshl => a.wrapping_shl(shift),
                Lshr => a.wrapping_shr(shift),
                _ => ((a as u64) >> shift) as i64,
            })
        }
        Ldiv | Lrem => {
            let (a, b) = (a.as_long()?, b.as_long()?);
            if b == 0 {
                return Ok(Arith::DivideByZero);
            }
            EmValue::Long(if opcode == Ldiv {
                a.wrapping_div(b)
            } else {
                a.wrapping_rem(b)
            })
        }
        Fadd | Fsub | Fmul | Fdiv | Frem => {
            let (a, b) = (a.as_float()?, b.as_float()?);
            EmValue::Float(match opcode {
                Fadd => a + b,
                Fsub => a - b,
                Fmul => a * b,
                Fdiv => a / b,
                _ => a % b,
            })
        }
        Dadd | Dsub | Dmul | Ddiv | Drem => {
            let (a, b) = (a.as_double()?, b.as_double()?);
            EmValue::Double(match opcode {
                Dadd => a + b,
                Dsub => a - b,
                Dmul => a * b,
                Ddiv => a / b,
                _ => a % b,
            })
        }
        Lcmp => EmValue::Int(compare(a.as_long()?, b.as_long()?, 0)),
        Fcmpl => EmValue::Int(compare(a.as_float()?, b.as_float()?, -1)),
        Fcmpg => EmValue::Int(compare(a.as_float()?, b.as_float()?, 1)),
        Dcmpl => EmValue::Int(compare(a.as_double()?, b.as_double()?, -1)),
        Dcmpg => EmValue::Int(compare(a.as_double()?, b.as_double()?, 1)),
        other => return Err(not_arithmetic(other)),
    };
    Ok(Arith::Value(value))
}

/// Applies a negation or primitive conversion.
///
/// Float to integer conversions saturate and map NaN to zero, which is what Rust's `as`
/// does as well.
///
/// # Errors
/// Returns [`Error::Emulation`] for other opcodes or mismatched operand kinds.
pub(crate) fn unary(opcode: Opcode, a: EmValue) -> Result<EmValue> {
    use Opcode::*;

    Ok(match opcode {
        Ineg => EmValue::Int(a.as_int()?.wrapping_neg()),
        Lneg => EmValue::Long(a.as_long()?.wrapping_neg()),
        Fneg => EmValue::Float(-a.as_float()?),
        Dneg => EmValue::Double(-a.as_double()?),
        I2l => EmValue::Long(i64::from(a.as_int()?)),
        I2f => EmValue::Float(a.as_int()? as f32),
        I2d => EmValue::Double(f64::from(a.as_int()?)),
        L2i => EmValue::Int(a.as_long()? as i32),
        L2f => EmValue::Float(a.as_long()? as f32),
        L2d => EmValue::Double(a.as_long()? as f64),
        F2i => EmValue::Int(a.as_float()? as i32),
        F2l => EmValue::Long(a.as_float()? as i64),
        F2d => EmValue::Double(f64::from(a.as_float()?)),
        D2i => EmValue::Int(a.as_double()? as i32),
        D2l => EmValue::Long(a.as_double()? as i64),
        D2f => EmValue::Float(a.as_double()? as f32),
        I2b => EmValue::Int(i32::from(a.as_int()? as i8)),
        I2c => EmValue::Int(i32::from(a.as_int()? as u16)),
        I2s => EmValue::Int(i32::from(a.as_int()? as i16)),
        other => return Err(not_arithmetic(other)),
    })
}

/// Evaluates the condition of a conditional branch.
///
/// # Errors
/// Returns [`Error::Emulation`] for opcodes that are not conditional branches.
pub(crate) fn condition(opcode: Opcode, inputs: &[EmValue]) -> Result<bool> {
    use Opcode::*;

    let operand = |position: usize| {
        inputs
            .get(position)
            .copied()
            .ok_or_else(|| Error::Emulation(format!("{} is missing an operand", opcode.mnemonic())))
    };

    Ok(match opcode {
        Ifeq => operand(0)?.as_int()? == 0,
        Ifne => operand(0)?.as_int()? != 0,
        Iflt => operand(0)?.as_int()? < 0,
        Ifge => operand(0)?.as_int()? >= 0,
        Ifgt => operand(0)?.as_int()? > 0,
        Ifle => operand(0)?.as_int()? <= 0,
        Ifnull => operand(0)?.as_ref()?.is_none(),
        Ifnonnull => operand(0)?.as_ref()?.is_some(),
        IfIcmpeq | IfIcmpne | IfIcmplt | IfIcmpge | IfIcmpgt | IfIcmple => {
            let (a, b) = (operand(0)?.as_int()?, operand(1)?.as_int()?);
            match opcode {
                IfIcmpeq => a == b,
                IfIcmpne => a != b,
                IfIcmplt => a < b,
                IfIcmpge => a >= b,
                IfIcmpgt => a > b,
                _ => a <= b,
            }
        }
        IfAcmpeq => operand(0)?.as_ref()? == operand(1)?.as_ref()?,
        IfAcmpne => operand(0)?.as_ref()? != operand(1)?.as_ref()?,
        other => {
            return Err(Error::Emulation(format!(
                "{} is not a conditional branch",
                other.mnemonic()
            )))
        }
    })
}
