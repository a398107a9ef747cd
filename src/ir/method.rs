//! Method descriptors and protected regions.

use rustc_hash::FxHashMap;

use crate::{
    alloc::MethodPlan,
    ir::{
        annotation::{Annotation, AnnotationValue},
        class::AccessFlags,
        instruction::{Destination, Instruction, InstructionKind, LabelId, Route},
        names::method_symbol,
        signature::MethodSignature,
    },
    Error, Result,
};

/// One hop of a bypass chain, attached to a region marker.
///
/// When control reaches the marker with `flag` raised, it continues at `next`. The final hop
/// (`last`) clears the flag before jumping to the original target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bypass {
    /// Bypass flag index
    pub flag: u16,
    /// Label the chain eventually reaches
    pub target: LabelId,
    /// Where this hop continues
    pub next: Destination,
    /// `true` if `next` is the original target
    pub last: bool,
}

/// An exception table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TryCatchRegion {
    /// Label at the first protected instruction
    pub start: LabelId,
    /// Label after the last protected instruction
    pub end: LabelId,
    /// Label of the handler code
    pub handler: LabelId,
    /// Caught class, `None` catches everything
    pub catch_type: Option<String>,
    /// Bypass hops performed by the region's entry marker
    pub enter_bypasses: Vec<Bypass>,
    /// Bypass hops performed by the region's exit marker
    pub exit_bypasses: Vec<Bypass>,
    /// Route from the entry marker to the handler, when the handler lies in other regions
    pub handler_route: Option<Route>,
}

impl TryCatchRegion {
    /// Creates a region without bypass information.
    #[must_use]
    pub fn new(start: LabelId, end: LabelId, handler: LabelId, catch_type: Option<String>) -> Self {
        TryCatchRegion {
            start,
            end,
            handler,
            catch_type,
            enter_bypasses: Vec::new(),
            exit_bypasses: Vec::new(),
            handler_route: None,
        }
    }

    /// The class whose instances the handler receives.
    #[must_use]
    pub fn caught_class(&self) -> &str {
        self.catch_type
            .as_deref()
            .unwrap_or(crate::ir::THROWABLE_CLASS)
    }
}

/// A method with its code and everything later passes compute for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDescriptor {
    /// Internal name of the declaring class
    pub owner: String,
    /// Name and descriptor
    pub signature: MethodSignature,
    /// Access flags
    pub access: AccessFlags,
    /// Instruction stream, empty for abstract and native methods
    pub instructions: Vec<Instruction>,
    /// Exception table in declaration order
    pub regions: Vec<TryCatchRegion>,
    /// Declared maximum operand stack depth
    pub max_stack: u16,
    /// Declared number of local variable indices
    pub max_locals: u16,
    /// Runtime visible annotations
    pub annotations: Vec<Annotation>,
    /// Default value of an annotation interface member
    pub annotation_default: Option<AnnotationValue>,
    /// Number of bypass flags the exception rewriter allocated
    pub bypass_count: u16,
    /// Marked as implemented natively by configuration
    pub intrinsic: bool,
    /// Slot allocation result
    pub plan: Option<MethodPlan>,
    next_label: LabelId,
}

impl MethodDescriptor {
    /// Creates a method without code.
    #[must_use]
    pub fn new(owner: &str, signature: MethodSignature, access: AccessFlags) -> Self {
        MethodDescriptor {
            owner: owner.to_string(),
            signature,
            access,
            instructions: Vec::new(),
            regions: Vec::new(),
            max_stack: 0,
            max_locals: 0,
            annotations: Vec::new(),
            annotation_default: None,
            bypass_count: 0,
            intrinsic: false,
            plan: None,
            next_label: 0,
        }
    }

    /// `true` for static methods.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.access.contains(AccessFlags::STATIC)
    }

    /// `true` for abstract methods.
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.access.contains(AccessFlags::ABSTRACT)
    }

    /// `true` for methods without a bytecode body that the runtime has to provide.
    #[must_use]
    pub fn is_native(&self) -> bool {
        self.intrinsic || self.access.contains(AccessFlags::NATIVE)
    }

    /// `true` for synchronized methods.
    #[must_use]
    pub fn is_synchronized(&self) -> bool {
        self.access.contains(AccessFlags::SYNCHRONIZED)
    }

    /// `true` if the method has a body the compiler translates.
    #[must_use]
    pub fn has_code(&self) -> bool {
        !self.is_native() && !self.instructions.is_empty()
    }

    /// `true` for methods that take part in virtual dispatch.
    #[must_use]
    pub fn is_virtual(&self) -> bool {
        !self.is_static()
            && !self.signature.is_constructor()
            && !self.signature.is_static_initializer()
    }

    /// The native function name of this method.
    #[must_use]
    pub fn symbol(&self) -> String {
        method_symbol(&self.owner, &self.signature, self.is_static())
    }

    /// `owner.name(descriptor)`, used in diagnostics.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.owner, self.signature)
    }

    /// Allocates a fresh label id.
    pub fn new_label(&mut self) -> LabelId {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Makes sure labels allocated later do not collide with `label`.
    pub fn reserve_label(&mut self, label: LabelId) {
        self.next_label = self.next_label.max(label + 1);
    }

    /// Allocates a fresh bypass flag.
    pub fn new_bypass_flag(&mut self) -> u16 {
        let flag = self.bypass_count;
        self.bypass_count += 1;
        flag
    }

    /// Maps every label to its position in the instruction stream.
    #[must_use]
    pub fn label_positions(&self) -> FxHashMap<LabelId, usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter_map(|(index, instruction)| match instruction.kind {
                InstructionKind::Label(label) => Some((label, index)),
                _ => None,
            })
            .collect()
    }

    /// Resolves a label through a position map built by [`MethodDescriptor::label_positions`].
    ///
    /// # Errors
    /// Returns [`crate::Error::UnknownLabel`] if the label is not part of the method.
    pub fn position_of(&self, positions: &FxHashMap<LabelId, usize>, label: LabelId) -> Result<usize> {
        positions.get(&label).copied().ok_or_else(|| Error::UnknownLabel {
            method: self.display_name(),
            label,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::instruction::InstructionKind;

    #[test]
    fn test_labels() {
        let sig = MethodSignature::new("run", "()V").unwrap();
        let mut method = MethodDescriptor::new("pkg/A", sig, AccessFlags::PUBLIC);
        method.reserve_label(4);
        assert_eq!(method.new_label(), 5);
        method
            .instructions
            .push(Instruction::new(InstructionKind::Label(5)));
        let positions = method.label_positions();
        assert_eq!(method.position_of(&positions, 5).unwrap(), 0);
        assert!(matches!(
            method.position_of(&positions, 9),
            Err(Error::UnknownLabel { label: 9, .. })
        ));
        assert_eq!(method.symbol(), "M_pkg_A_run");
        assert!(method.is_virtual());
    }
}
