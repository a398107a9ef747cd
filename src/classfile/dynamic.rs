//! Lowering of `invokedynamic` call sites.
//!
//! Only two bootstrap families are understood:
//!
//! - `LambdaMetafactory.metafactory` / `altMetafactory`: the call site becomes a
//!   [`InstructionKind::Lambda`] that allocates a synthesized proxy class. The proxy stores the
//!   captured arguments in fields and implements the functional interface method by loading
//!   them, adapting the interface arguments to the target's parameter types and invoking the
//!   target method handle.
//! - `StringConcatFactory.makeConcatWithConstants` / `makeConcat`: the call site becomes a
//!   [`InstructionKind::StringConcat`] with the constants inlined into the recipe.
//!
//! Every other bootstrap method is rejected.

use crate::{
    classfile::{
        attributes::BootstrapMethod,
        constpool::{ConstantPool, ConstantPoolEntry, MethodHandle},
        synthetic::CodeBuilder,
    },
    ir::{
        names::qualified_name, AccessFlags, ClassDescriptor, FieldDescriptor, InstructionKind,
        JavaType, LambdaSite, MethodRef, MethodSignature, Opcode, TypeKind, OBJECT_CLASS,
    },
    Result,
};

const LAMBDA_METAFACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const STRING_CONCAT_FACTORY: &str = "java/lang/invoke/StringConcatFactory";

const FLAG_SERIALIZABLE: i32 = 1;
const FLAG_MARKERS: i32 = 2;
const FLAG_BRIDGES: i32 = 4;

/// Recipe tag standing for one call site argument.
pub const RECIPE_ARGUMENT: char = '\u{1}';
/// Recipe tag standing for the next bootstrap constant.
pub const RECIPE_CONSTANT: char = '\u{2}';

const REF_INVOKE_VIRTUAL: u8 = 5;
const REF_INVOKE_STATIC: u8 = 6;
const REF_INVOKE_SPECIAL: u8 = 7;
const REF_NEW_INVOKE_SPECIAL: u8 = 8;
const REF_INVOKE_INTERFACE: u8 = 9;

/// `(box class, primitive, unboxing method)` for every primitive kind.
const BOXES: [(&str, TypeKind, &str); 8] = [
    ("java/lang/Boolean", TypeKind::Boolean, "booleanValue"),
    ("java/lang/Byte", TypeKind::Byte, "byteValue"),
    ("java/lang/Character", TypeKind::Char, "charValue"),
    ("java/lang/Short", TypeKind::Short, "shortValue"),
    ("java/lang/Integer", TypeKind::Int, "intValue"),
    ("java/lang/Long", TypeKind::Long, "longValue"),
    ("java/lang/Float", TypeKind::Float, "floatValue"),
    ("java/lang/Double", TypeKind::Double, "doubleValue"),
];

fn box_of(kind: TypeKind) -> Option<(&'static str, TypeKind, &'static str)> {
    BOXES.iter().copied().find(|(_, primitive, _)| *primitive == kind)
}

fn box_named(name: &str) -> Option<(&'static str, TypeKind, &'static str)> {
    BOXES.iter().copied().find(|(class, _, _)| *class == name)
}

fn widening(from: TypeKind, to: TypeKind) -> Option<Opcode> {
    let from = from.stack_kind();
    Some(match (from, to) {
        (TypeKind::Int, TypeKind::Long) => Opcode::I2l,
        (TypeKind::Int, TypeKind::Float) => Opcode::I2f,
        (TypeKind::Int, TypeKind::Double) => Opcode::I2d,
        (TypeKind::Long, TypeKind::Float) => Opcode::L2f,
        (TypeKind::Long, TypeKind::Double) => Opcode::L2d,
        (TypeKind::Float, TypeKind::Double) => Opcode::F2d,
        _ => return None,
    })
}

/// Emits the conversion of the value on top of the stack from `from` to `to`.
fn adapt(code: &mut CodeBuilder, from: &JavaType, to: &JavaType) -> Result<()> {
    if from == to {
        return Ok(());
    }
    match (from, to) {
        (JavaType::Primitive(from), JavaType::Primitive(to)) => {
            if let Some(opcode) = widening(*from, *to) {
                let wide = |kind: TypeKind| if kind.is_wide() { 2 } else { 1 };
                code.simple(opcode, wide(*from), wide(*to));
            }
        }
        (JavaType::Primitive(from), _) => {
            let (class, _, _) = box_of(*from)
                .ok_or_else(|| malformed_error!("Cannot box {}", from.java_name()))?;
            let descriptor = format!("({})L{};", from.descriptor(), class);
            code.invoke(
                Opcode::Invokestatic,
                MethodRef {
                    owner: class.to_string(),
                    signature: MethodSignature::new("valueOf", &descriptor)?,
                    interface: false,
                    dispatch: None,
                },
            );
        }
        (_, JavaType::Primitive(to)) => {
            let source = from.class_reference().and_then(box_named);
            let (class, primitive, method) = match source {
                Some(known) => known,
                None => box_of(*to)
                    .ok_or_else(|| malformed_error!("Cannot unbox to {}", to.java_name()))?,
            };
            if source.is_none() {
                code.type_op(Opcode::Checkcast, JavaType::Class(class.to_string()));
            }
            let descriptor = format!("(){}", primitive.descriptor());
            code.invoke(
                Opcode::Invokevirtual,
                MethodRef {
                    owner: class.to_string(),
                    signature: MethodSignature::new(method, &descriptor)?,
                    interface: false,
                    dispatch: None,
                },
            );
            adapt(code, &JavaType::Primitive(primitive), &JavaType::Primitive(*to))?;
        }
        (_, to) => {
            if to.class_reference() != Some(OBJECT_CLASS) || to.dimensions() > 0 {
                code.type_op(Opcode::Checkcast, to.clone());
            }
        }
    }
    Ok(())
}

/// Per-class state for lowering dynamic call sites.
pub struct DynamicContext<'a> {
    owner: &'a str,
    pool: &'a ConstantPool,
    bootstraps: &'a [BootstrapMethod],
    proxies: Vec<ClassDescriptor>,
}

impl<'a> DynamicContext<'a> {
    /// Creates the context for the class `owner`.
    #[must_use]
    pub fn new(owner: &'a str, pool: &'a ConstantPool, bootstraps: &'a [BootstrapMethod]) -> Self {
        DynamicContext {
            owner,
            pool,
            bootstraps,
            proxies: Vec::new(),
        }
    }

    /// Proxy classes synthesized so far, in call site order.
    #[must_use]
    pub fn into_proxies(self) -> Vec<ClassDescriptor> {
        self.proxies
    }

    /// Lowers the `invokedynamic` referring to constant pool entry `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for unknown bootstrap methods, serializable
    /// lambdas and lambdas that need bridge methods, and [`crate::Error::Malformed`] for
    /// inconsistent bootstrap arguments.
    pub fn lower(&mut self, index: u16) -> Result<InstructionKind> {
        let (bootstrap, name, descriptor) = self.pool.invoke_dynamic(index)?;
        let entry = self.bootstraps.get(usize::from(bootstrap)).ok_or_else(|| {
            malformed_error!("Bootstrap method {} missing in {}", bootstrap, self.owner)
        })?;
        let site = MethodSignature::new(name, descriptor)?;

        match (entry.handle.member.owner.as_str(), entry.handle.member.name.as_str()) {
            (LAMBDA_METAFACTORY, "metafactory") => self.lambda(&site, &entry.arguments, false),
            (LAMBDA_METAFACTORY, "altMetafactory") => self.lambda(&site, &entry.arguments, true),
            (STRING_CONCAT_FACTORY, "makeConcatWithConstants") => {
                self.concat(&site, &entry.arguments, true)
            }
            (STRING_CONCAT_FACTORY, "makeConcat") => self.concat(&site, &entry.arguments, false),
            (owner, method) => Err(unsupported_error!(
                "invokedynamic bootstrap {}.{} in {}",
                owner,
                method,
                self.owner
            )),
        }
    }

    fn argument(&self, arguments: &[u16], position: usize) -> Result<u16> {
        arguments.get(position).copied().ok_or_else(|| {
            malformed_error!(
                "Bootstrap argument {} missing in {}",
                position,
                self.owner
            )
        })
    }

    fn int_argument(&self, arguments: &[u16], position: usize) -> Result<i32> {
        match self.pool.get(self.argument(arguments, position)?)? {
            ConstantPoolEntry::Integer(value) => Ok(*value),
            other => Err(malformed_error!(
                "Expected int bootstrap argument, found {:?}",
                other
            )),
        }
    }

    fn concat(
        &self,
        site: &MethodSignature,
        arguments: &[u16],
        with_constants: bool,
    ) -> Result<InstructionKind> {
        let args = site.params().to_vec();
        let recipe = if with_constants {
            let template = match self.pool.get(self.argument(arguments, 0)?)? {
                ConstantPoolEntry::String(index) => self.pool.utf8(*index)?,
                other => {
                    return Err(malformed_error!(
                        "Concat recipe is not a string: {:?}",
                        other
                    ))
                }
            };
            let mut recipe = String::with_capacity(template.len());
            let mut constants = arguments.iter().skip(1);
            for c in template.chars() {
                if c != RECIPE_CONSTANT {
                    recipe.push(c);
                    continue;
                }
                let index = constants.next().ok_or_else(|| {
                    malformed_error!("Concat recipe in {} runs out of constants", self.owner)
                })?;
                match self.pool.loadable(*index)? {
                    crate::ir::Constant::String(text) => recipe.push_str(&text),
                    crate::ir::Constant::Int(value) => recipe.push_str(&value.to_string()),
                    crate::ir::Constant::Long(value) => recipe.push_str(&value.to_string()),
                    crate::ir::Constant::Float(value) => recipe.push_str(&value.to_string()),
                    crate::ir::Constant::Double(value) => recipe.push_str(&value.to_string()),
                    crate::ir::Constant::Class(ty) => {
                        return Err(unsupported_error!("class constant {} in concat recipe", ty))
                    }
                }
            }
            recipe
        } else {
            std::iter::repeat(RECIPE_ARGUMENT).take(args.len()).collect()
        };

        let placeholders = recipe.chars().filter(|c| *c == RECIPE_ARGUMENT).count();
        if placeholders != args.len() {
            return Err(malformed_error!(
                "Concat recipe in {} has {} arguments, call site passes {}",
                self.owner,
                placeholders,
                args.len()
            ));
        }
        Ok(InstructionKind::StringConcat { recipe, args })
    }

    fn lambda(
        &mut self,
        site: &MethodSignature,
        arguments: &[u16],
        alternate: bool,
    ) -> Result<InstructionKind> {
        let interface = site
            .return_type()
            .class_reference()
            .filter(|_| site.return_type().dimensions() == 0)
            .ok_or_else(|| malformed_error!("Lambda call site does not return an interface"))?
            .to_string();
        let sam = MethodSignature::new(
            site.name(),
            self.pool.method_type(self.argument(arguments, 0)?)?,
        )?;
        let handle = self.pool.method_handle(self.argument(arguments, 1)?)?;

        let mut markers = Vec::new();
        if alternate {
            let flags = self.int_argument(arguments, 3)?;
            if flags & FLAG_SERIALIZABLE != 0 {
                return Err(unsupported_error!("serializable lambda in {}", self.owner));
            }
            if flags & FLAG_BRIDGES != 0 {
                return Err(unsupported_error!("lambda bridges in {}", self.owner));
            }
            if flags & FLAG_MARKERS != 0 {
                let count = self.int_argument(arguments, 4)?;
                for position in 0..usize::try_from(count).unwrap_or(0) {
                    let index = self.argument(arguments, 5 + position)?;
                    markers.push(self.pool.class_name(index)?.to_string());
                }
            }
        }

        let proxy = format!(
            "{}_lambda_{}_{}",
            self.owner,
            qualified_name(&interface),
            self.proxies.len()
        );
        let captures = site.params().to_vec();

        let mut class = ClassDescriptor::new(
            &proxy,
            Some(OBJECT_CLASS),
            AccessFlags::FINAL | AccessFlags::SYNTHETIC | AccessFlags::SUPER,
        );
        class.interfaces.push(interface.clone());
        class.interfaces.extend(markers);
        class.outer_class = Some(self.owner.to_string());
        class.anonymous = true;
        for (position, ty) in captures.iter().enumerate() {
            class.fields.push(FieldDescriptor {
                name: format!("field{position}"),
                ty: ty.clone(),
                access: AccessFlags::PRIVATE | AccessFlags::FINAL,
                constant: None,
                annotations: Vec::new(),
                weak: false,
            });
        }
        class
            .methods
            .push(Self::delegate(&proxy, &sam, &captures, &handle)?);

        log::debug!(
            "{}: lambda proxy {} for {}.{}",
            self.owner,
            proxy,
            handle.member.owner,
            handle.member.name
        );
        self.proxies.push(class);

        Ok(InstructionKind::Lambda(LambdaSite {
            proxy,
            interface,
            captures,
        }))
    }

    /// Builds the proxy's implementation of the functional interface method.
    fn delegate(
        proxy: &str,
        sam: &MethodSignature,
        captures: &[JavaType],
        handle: &MethodHandle,
    ) -> Result<crate::ir::MethodDescriptor> {
        let target = MethodSignature::new(&handle.member.name, &handle.member.descriptor)?;
        let owner = JavaType::Class(handle.member.owner.clone());

        let (opcode, mut parameters, result) = match handle.kind {
            REF_INVOKE_STATIC => (
                Opcode::Invokestatic,
                Vec::new(),
                target.return_type().clone(),
            ),
            REF_INVOKE_VIRTUAL | REF_INVOKE_INTERFACE | REF_INVOKE_SPECIAL => (
                match handle.kind {
                    REF_INVOKE_VIRTUAL => Opcode::Invokevirtual,
                    REF_INVOKE_INTERFACE => Opcode::Invokeinterface,
                    _ => Opcode::Invokespecial,
                },
                vec![owner.clone()],
                target.return_type().clone(),
            ),
            REF_NEW_INVOKE_SPECIAL if target.is_constructor() => {
                (Opcode::Invokespecial, Vec::new(), owner.clone())
            }
            kind => {
                return Err(unsupported_error!(
                    "method handle kind {} for lambda target {}",
                    kind,
                    handle.member.name
                ))
            }
        };
        parameters.extend(target.params().iter().cloned());

        let supplied: Vec<&JavaType> = captures.iter().chain(sam.params()).collect();
        if supplied.len() != parameters.len() {
            return Err(malformed_error!(
                "Lambda {} supplies {} arguments to {} expecting {}",
                proxy,
                supplied.len(),
                handle.member.name,
                parameters.len()
            ));
        }

        let mut code = CodeBuilder::new(proxy, sam.clone(), AccessFlags::PUBLIC | AccessFlags::FINAL);
        if handle.kind == REF_NEW_INVOKE_SPECIAL {
            code.type_op(Opcode::New, owner.clone());
            code.simple(Opcode::Dup, 1, 2);
        }

        let this = JavaType::Class(proxy.to_string());
        for (position, ty) in captures.iter().enumerate() {
            code.load(&this, 0);
            code.get_field(proxy, &format!("field{position}"), ty);
            adapt(&mut code, ty, &parameters[position])?;
        }
        let mut local = 1u16;
        for (offset, ty) in sam.params().iter().enumerate() {
            code.load(ty, local);
            local += ty.kind().local_size();
            adapt(&mut code, ty, &parameters[captures.len() + offset])?;
        }

        code.invoke(
            opcode,
            MethodRef {
                owner: handle.member.owner.clone(),
                signature: target,
                interface: handle.member.interface,
                dispatch: None,
            },
        );

        let expected = sam.return_type();
        if expected.is_void() {
            if !result.is_void() {
                let pop = if result.is_wide() { Opcode::Pop2 } else { Opcode::Pop };
                code.simple(pop, if result.is_wide() { 2 } else { 1 }, 0);
            }
        } else {
            adapt(&mut code, &result, expected)?;
        }
        code.ret(expected);
        Ok(code.finish())
    }
}
