//! Classes and methods the compiler synthesizes instead of reading them from a class file.

use crate::{
    ir::{
        AccessFlags, ClassDescriptor, Constant, FieldDescriptor, FieldRef, Instruction,
        InstructionKind, JavaType, MethodDescriptor, MethodRef, MethodSignature, Opcode,
        TypeKind, OBJECT_CLASS,
    },
    Result,
};

/// Suffix of synthesized annotation implementation classes.
pub const ANNOTATION_IMPL_SUFFIX: &str = "Impl";

/// The interface every annotation interface extends.
pub const ANNOTATION_INTERFACE: &str = "java/lang/annotation/Annotation";

/// Load opcode for a value of the given type.
#[must_use]
pub fn load_opcode(ty: &JavaType) -> Opcode {
    match ty.stack_kind() {
        TypeKind::Long => Opcode::Lload,
        TypeKind::Float => Opcode::Fload,
        TypeKind::Double => Opcode::Dload,
        TypeKind::Object => Opcode::Aload,
        _ => Opcode::Iload,
    }
}

/// Return opcode for a method returning the given type.
#[must_use]
pub fn return_opcode(ty: &JavaType) -> Opcode {
    if ty.is_void() {
        return Opcode::Return;
    }
    match ty.stack_kind() {
        TypeKind::Long => Opcode::Lreturn,
        TypeKind::Float => Opcode::Freturn,
        TypeKind::Double => Opcode::Dreturn,
        TypeKind::Object => Opcode::Areturn,
        _ => Opcode::Ireturn,
    }
}

fn slots(ty: &JavaType) -> usize {
    if ty.is_wide() {
        2
    } else {
        1
    }
}

/// Assembles a straight-line method body, tracking the operand stack depth.
pub(crate) struct CodeBuilder {
    method: MethodDescriptor,
    depth: usize,
    max_depth: usize,
}

impl CodeBuilder {
    pub(crate) fn new(owner: &str, signature: MethodSignature, access: AccessFlags) -> Self {
        CodeBuilder {
            method: MethodDescriptor::new(owner, signature, access),
            depth: 0,
            max_depth: 0,
        }
    }

    fn push(&mut self, kind: InstructionKind, popped: usize, pushed: usize) {
        self.depth = self.depth.saturating_sub(popped) + pushed;
        self.max_depth = self.max_depth.max(self.depth);
        self.method.instructions.push(Instruction::new(kind));
    }

    pub(crate) fn load(&mut self, ty: &JavaType, local: u16) {
        let opcode = load_opcode(ty);
        self.push(InstructionKind::Variable { opcode, local }, 0, slots(ty));
    }

    pub(crate) fn simple(&mut self, opcode: Opcode, popped: usize, pushed: usize) {
        self.push(InstructionKind::Simple(opcode), popped, pushed);
    }

    pub(crate) fn constant(&mut self, constant: Constant) {
        let pushed = slots(&constant.java_type());
        self.push(InstructionKind::Constant(constant), 0, pushed);
    }

    pub(crate) fn type_op(&mut self, opcode: Opcode, ty: JavaType) {
        let (popped, pushed) = match opcode {
            Opcode::New => (0, 1),
            _ => (1, 1),
        };
        self.push(InstructionKind::Type { opcode, ty }, popped, pushed);
    }

    pub(crate) fn get_field(&mut self, owner: &str, name: &str, ty: &JavaType) {
        let field = FieldRef {
            owner: owner.to_string(),
            name: name.to_string(),
            ty: ty.clone(),
            declaring: None,
        };
        self.push(
            InstructionKind::Field {
                opcode: Opcode::Getfield,
                field,
            },
            1,
            slots(ty),
        );
    }

    pub(crate) fn invoke(&mut self, opcode: Opcode, method: MethodRef) {
        let receiver = usize::from(opcode != Opcode::Invokestatic);
        let popped = receiver + method.signature.params().iter().map(slots).sum::<usize>();
        let result = method.signature.return_type();
        let pushed = if result.is_void() { 0 } else { slots(result) };
        self.push(InstructionKind::Invoke { opcode, method }, popped, pushed);
    }

    pub(crate) fn ret(&mut self, ty: &JavaType) {
        let popped = if ty.is_void() { 0 } else { slots(ty) };
        self.push(InstructionKind::Simple(return_opcode(ty)), popped, 0);
    }

    /// Finishes the body; locals cover the receiver and the parameters.
    pub(crate) fn finish(mut self) -> MethodDescriptor {
        let receiver = u16::from(!self.method.is_static());
        self.method.max_locals = receiver + self.method.signature.param_slots();
        self.method.max_stack = u16::try_from(self.max_depth).unwrap_or(u16::MAX);
        self.method
    }
}

/// Synthesizes the implementation class `<Name>Impl` of an annotation interface.
///
/// The class stores one field per annotation member, implements each member as an accessor
/// of that field and answers `annotationType()` with the annotation interface's class object.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `annotation` is not an annotation interface or a
/// member signature cannot be rebuilt.
pub fn annotation_impl(annotation: &ClassDescriptor) -> Result<ClassDescriptor> {
    if !annotation.is_annotation() {
        return Err(malformed_error!(
            "{} is not an annotation interface",
            annotation.name
        ));
    }

    let name = format!("{}{}", annotation.name, ANNOTATION_IMPL_SUFFIX);
    let mut class = ClassDescriptor::new(
        &name,
        Some(OBJECT_CLASS),
        AccessFlags::PUBLIC | AccessFlags::FINAL | AccessFlags::SYNTHETIC | AccessFlags::SUPER,
    );
    class.interfaces.push(annotation.name.clone());

    for member in annotation
        .methods
        .iter()
        .filter(|method| method.is_abstract() && !method.is_static())
    {
        let ty = member.signature.return_type().clone();
        let field_name = member.signature.name().to_string();
        class.fields.push(FieldDescriptor {
            name: field_name.clone(),
            ty: ty.clone(),
            access: AccessFlags::PRIVATE,
            constant: None,
            annotations: Vec::new(),
            weak: false,
        });

        let mut accessor = CodeBuilder::new(&name, member.signature.clone(), AccessFlags::PUBLIC);
        accessor.load(&JavaType::Class(name.clone()), 0);
        accessor.get_field(&name, &field_name, &ty);
        accessor.ret(&ty);
        class.methods.push(accessor.finish());
    }

    let class_type = JavaType::Class(crate::ir::CLASS_CLASS.to_string());
    let signature = MethodSignature::new("annotationType", &format!("(){}", class_type))?;
    let mut annotation_type = CodeBuilder::new(&name, signature, AccessFlags::PUBLIC);
    annotation_type.constant(Constant::Class(JavaType::Class(annotation.name.clone())));
    annotation_type.ret(&class_type);
    class.methods.push(annotation_type.finish());

    log::debug!("synthesized annotation implementation {}", name);
    Ok(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_impl() {
        let mut marker = ClassDescriptor::new(
            "pkg/Marker",
            Some(OBJECT_CLASS),
            AccessFlags::INTERFACE | AccessFlags::ABSTRACT | AccessFlags::ANNOTATION,
        );
        marker.interfaces.push(ANNOTATION_INTERFACE.to_string());
        marker.methods.push(MethodDescriptor::new(
            "pkg/Marker",
            MethodSignature::new("value", "()J").unwrap(),
            AccessFlags::PUBLIC | AccessFlags::ABSTRACT,
        ));

        let class = annotation_impl(&marker).unwrap();
        assert_eq!(class.name, "pkg/MarkerImpl");
        assert_eq!(class.interfaces, vec!["pkg/Marker".to_string()]);
        assert_eq!(class.fields.len(), 1);
        assert_eq!(class.fields[0].ty, JavaType::Primitive(TypeKind::Long));

        let value = class.find_method_by_name("value", "()J").unwrap();
        assert_eq!(value.max_locals, 1);
        assert_eq!(value.max_stack, 2);
        assert_eq!(
            value.instructions.last().unwrap().kind,
            InstructionKind::Simple(Opcode::Lreturn)
        );
        assert!(class
            .find_method_by_name("annotationType", "()Ljava/lang/Class;")
            .is_some());
    }

    #[test]
    fn test_rejects_plain_interface() {
        let plain = ClassDescriptor::new("pkg/I", Some(OBJECT_CLASS), AccessFlags::INTERFACE);
        assert!(annotation_impl(&plain).is_err());
    }
}
