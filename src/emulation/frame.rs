//! Storage of one emulated method activation.
//!
//! Mirrors the generated function: a zeroed frame array holding the locals followed by the
//! positional stack slots, the run-local temporaries, the bypass flags and the stack of
//! exception frames pushed by region entry markers.

use crate::{
    alloc::{Operand, RunPlan},
    emulation::value::EmValue,
    ir::{MethodDescriptor, ScopeId, TypeKind},
    Error, Result,
};

#[derive(Debug)]
pub(crate) struct Frame {
    locals: usize,
    storage: Vec<Option<EmValue>>,
    temps: Vec<Option<EmValue>>,
    pub(crate) bypasses: Vec<bool>,
    pub(crate) handlers: Vec<ScopeId>,
}

impl Frame {
    pub(crate) fn new(method: &MethodDescriptor, stack_size: u16, temps: usize) -> Self {
        let locals = usize::from(method.max_locals);
        Frame {
            locals,
            storage: vec![None; locals + usize::from(stack_size.max(1))],
            temps: vec![None; temps],
            bypasses: vec![false; usize::from(method.bypass_count)],
            handlers: Vec::new(),
        }
    }

    fn checked(value: Option<EmValue>, kind: TypeKind, what: &str) -> Result<EmValue> {
        match value {
            None => Ok(EmValue::zero(kind)),
            Some(value) if value.kind() == kind.stack_kind() => Ok(value),
            Some(value) => Err(Error::Emulation(format!(
                "{what} holds {value}, read as {}",
                <&'static str>::from(kind)
            ))),
        }
    }

    pub(crate) fn local(&self, index: u16, kind: TypeKind) -> Result<EmValue> {
        let value = self
            .storage
            .get(usize::from(index))
            .filter(|_| usize::from(index) < self.locals)
            .ok_or_else(|| Error::Emulation(format!("local {index} out of range")))?;
        Self::checked(*value, kind, &format!("local {index}"))
    }

    pub(crate) fn set_local(&mut self, index: u16, value: EmValue) -> Result<()> {
        if usize::from(index) >= self.locals {
            return Err(Error::Emulation(format!("local {index} out of range")));
        }
        self.storage[usize::from(index)] = Some(value);
        Ok(())
    }

    fn slot_index(&self, slot: u16) -> Result<usize> {
        let index = self.locals + usize::from(slot);
        if index < self.storage.len() {
            Ok(index)
        } else {
            Err(Error::Emulation(format!("stack slot {slot} out of range")))
        }
    }

    pub(crate) fn read(&self, operand: Operand, kind: TypeKind) -> Result<EmValue> {
        match operand {
            Operand::Slot(slot) => {
                let index = self.slot_index(slot)?;
                Self::checked(self.storage[index], kind, &format!("stack slot {slot}"))
            }
            Operand::Temp(temp) => {
                let value = self
                    .temps
                    .get(temp as usize)
                    .copied()
                    .flatten()
                    .ok_or_else(|| Error::Emulation(format!("temporary t{temp} read before write")))?;
                Self::checked(Some(value), kind, &format!("temporary t{temp}"))
            }
            Operand::Literal(literal) => Ok(literal.into()),
        }
    }

    pub(crate) fn write(&mut self, operand: Operand, value: EmValue) -> Result<()> {
        match operand {
            Operand::Slot(slot) => {
                let index = self.slot_index(slot)?;
                self.storage[index] = Some(value);
            }
            Operand::Temp(temp) => {
                let entry = self
                    .temps
                    .get_mut(temp as usize)
                    .ok_or_else(|| Error::Emulation(format!("temporary t{temp} out of range")))?;
                *entry = Some(value);
            }
            Operand::Literal(literal) => {
                return Err(Error::Emulation(format!("write to literal {literal:?}")))
            }
        }
        Ok(())
    }

    /// Performs a run's captures, then its moves.
    pub(crate) fn flush(&mut self, run: &RunPlan) -> Result<()> {
        for capture in &run.captures {
            let value = self.read(Operand::Slot(capture.slot), capture.kind)?;
            self.write(Operand::Temp(capture.temp), value)?;
        }
        for move_ in &run.moves {
            let value = self.read(move_.source, move_.kind)?;
            self.write(Operand::Slot(move_.dest), value)?;
        }
        Ok(())
    }

    pub(crate) fn raise_bypass(&mut self, flag: u16) -> Result<()> {
        let entry = self
            .bypasses
            .get_mut(usize::from(flag))
            .ok_or_else(|| Error::Emulation(format!("bypass flag {flag} out of range")))?;
        *entry = true;
        Ok(())
    }

    /// Reads a bypass flag, clearing it if `clear` is set.
    pub(crate) fn take_bypass(&mut self, flag: u16, clear: bool) -> Result<bool> {
        let entry = self
            .bypasses
            .get_mut(usize::from(flag))
            .ok_or_else(|| Error::Emulation(format!("bypass flag {flag} out of range")))?;
        let raised = *entry;
        if raised && clear {
            *entry = false;
        }
        Ok(raised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        alloc::{Capture, Literal, Move},
        ir::{AccessFlags, MethodSignature},
    };

    fn frame() -> Frame {
        let signature = MethodSignature::new("f", "()V").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", signature, AccessFlags::STATIC);
        method.max_locals = 1;
        method.bypass_count = 1;
        Frame::new(&method, 2, 1)
    }

    #[test]
    fn test_zeroed_reads() {
        let frame = frame();
        assert_eq!(frame.read(Operand::Slot(1), TypeKind::Object).unwrap(), EmValue::NULL);
        assert_eq!(frame.local(0, TypeKind::Long).unwrap(), EmValue::Long(0));
        assert!(frame.read(Operand::Temp(0), TypeKind::Int).is_err());
        assert!(frame.read(Operand::Slot(2), TypeKind::Int).is_err());
        assert_eq!(
            frame.read(Operand::Literal(Literal::Int(4)), TypeKind::Int).unwrap(),
            EmValue::Int(4)
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let mut frame = frame();
        frame.write(Operand::Slot(0), EmValue::Int(1)).unwrap();
        assert!(frame.read(Operand::Slot(0), TypeKind::Object).is_err());
        // narrow kinds share the int slot
        assert_eq!(frame.read(Operand::Slot(0), TypeKind::Char).unwrap(), EmValue::Int(1));
    }

    #[test]
    fn test_flush_captures_before_moves() {
        let mut frame = frame();
        frame.write(Operand::Slot(0), EmValue::Int(1)).unwrap();
        let run = RunPlan {
            captures: vec![Capture { temp: 0, slot: 0, kind: TypeKind::Int }],
            moves: vec![
                Move { dest: 0, source: Operand::Literal(Literal::Int(7)), kind: TypeKind::Int },
                Move { dest: 1, source: Operand::Temp(0), kind: TypeKind::Int },
            ],
            ..RunPlan::default()
        };
        frame.flush(&run).unwrap();
        assert_eq!(frame.read(Operand::Slot(0), TypeKind::Int).unwrap(), EmValue::Int(7));
        assert_eq!(frame.read(Operand::Slot(1), TypeKind::Int).unwrap(), EmValue::Int(1));
    }

    #[test]
    fn test_bypass_flags() {
        let mut frame = frame();
        assert!(!frame.take_bypass(0, true).unwrap());
        frame.raise_bypass(0).unwrap();
        assert!(frame.take_bypass(0, false).unwrap());
        assert!(frame.take_bypass(0, true).unwrap());
        assert!(!frame.take_bypass(0, true).unwrap());
        assert!(frame.raise_bypass(3).is_err());
    }
}
