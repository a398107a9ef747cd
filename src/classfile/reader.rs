//! Class file structure (JVMS 4.1).

use crate::{
    classfile::{
        attributes::{
            self, find, read_attributes, CodeAttribute, RawAttribute, ANNOTATION_DEFAULT,
            BOOTSTRAP_METHODS, CODE, CONSTANT_VALUE, INNER_CLASSES, RUNTIME_VISIBLE_ANNOTATIONS,
        },
        code,
        constpool::ConstantPool,
        dynamic::DynamicContext,
        synthetic::annotation_impl,
    },
    file::parser::Parser,
    ir::{
        AccessFlags, ClassDescriptor, FieldDescriptor, JavaType, MethodDescriptor,
        MethodSignature,
    },
    Result,
};

/// Class file magic number.
pub const MAGIC: u32 = 0xCAFE_BABE;

/// Newest class file major version the decoder accepts (Java 21).
pub const MAX_MAJOR_VERSION: u16 = 65;

/// A parsed class file: the class itself and the classes synthesized for it.
#[derive(Debug, Clone)]
pub struct ParsedClass {
    /// The class the file declares
    pub class: ClassDescriptor,
    /// Lambda proxies and annotation implementations
    pub generated: Vec<ClassDescriptor>,
}

impl ParsedClass {
    /// The declared class followed by every generated class.
    #[must_use]
    pub fn into_classes(self) -> Vec<ClassDescriptor> {
        let mut classes = Vec::with_capacity(1 + self.generated.len());
        classes.push(self.class);
        classes.extend(self.generated);
        classes
    }
}

/// A method whose code is decoded once the class attributes are known.
struct PendingMethod<'a> {
    method: MethodDescriptor,
    code: Option<&'a [u8]>,
}

fn annotations_of(list: &[RawAttribute], pool: &ConstantPool) -> Result<Vec<crate::ir::Annotation>> {
    match find(list, RUNTIME_VISIBLE_ANNOTATIONS) {
        Some(attribute) => attributes::annotations(attribute.data, pool),
        None => Ok(Vec::new()),
    }
}

/// Parses a complete class file.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a bad magic number or damaged structure,
/// [`crate::Error::NotSupported`] for class file versions newer than [`MAX_MAJOR_VERSION`] and for
/// unsupported bytecode, and [`crate::Error::Empty`] for empty input.
pub fn parse_class(data: &[u8]) -> Result<ParsedClass> {
    if data.is_empty() {
        return Err(crate::Error::Empty);
    }

    let mut parser = Parser::new(data);
    let magic = parser.read_be::<u32>()?;
    if magic != MAGIC {
        return Err(malformed_error!("Invalid class file magic {:#010x}", magic));
    }
    let _minor = parser.read_be::<u16>()?;
    let major = parser.read_be::<u16>()?;
    if major > MAX_MAJOR_VERSION {
        return Err(unsupported_error!("class file version {}", major));
    }

    let pool = ConstantPool::parse(&mut parser)?;
    let access = AccessFlags::from_bits_truncate(parser.read_be::<u16>()?);
    let name = pool.class_name(parser.read_be::<u16>()?)?.to_string();
    let super_name = pool.optional_class_name(parser.read_be::<u16>()?)?;
    let mut class = ClassDescriptor::new(&name, super_name, access);

    let interface_count = parser.read_be::<u16>()?;
    for _ in 0..interface_count {
        class
            .interfaces
            .push(pool.class_name(parser.read_be::<u16>()?)?.to_string());
    }

    let field_count = parser.read_be::<u16>()?;
    for _ in 0..field_count {
        let access = AccessFlags::from_bits_truncate(parser.read_be::<u16>()?);
        let field_name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        let ty = JavaType::parse(pool.utf8(parser.read_be::<u16>()?)?)?;
        let list = read_attributes(&mut parser, &pool)?;

        let constant = match find(&list, CONSTANT_VALUE) {
            Some(attribute) if access.contains(AccessFlags::STATIC) => {
                let index = Parser::new(attribute.data).read_be::<u16>()?;
                Some(pool.field_constant(index)?)
            }
            _ => None,
        };

        class.fields.push(FieldDescriptor {
            name: field_name,
            ty,
            access,
            constant,
            annotations: annotations_of(&list, &pool)?,
            weak: false,
        });
    }

    let method_count = parser.read_be::<u16>()?;
    let mut pending = Vec::with_capacity(usize::from(method_count));
    for _ in 0..method_count {
        let access = AccessFlags::from_bits_truncate(parser.read_be::<u16>()?);
        let method_name = pool.utf8(parser.read_be::<u16>()?)?;
        let descriptor = pool.utf8(parser.read_be::<u16>()?)?;
        let signature = MethodSignature::new(method_name, descriptor)?;
        let list = read_attributes(&mut parser, &pool)?;

        let mut method = MethodDescriptor::new(&name, signature, access);
        method.annotations = annotations_of(&list, &pool)?;
        if let Some(attribute) = find(&list, ANNOTATION_DEFAULT) {
            method.annotation_default = Some(attributes::annotation_default(attribute.data, &pool)?);
        }

        let code = find(&list, CODE).map(|attribute| attribute.data);
        if code.is_none() && !method.is_abstract() && !method.is_native() {
            return Err(malformed_error!(
                "{} has neither code nor an abstract or native flag",
                method.display_name()
            ));
        }
        pending.push(PendingMethod { method, code });
    }

    let list = read_attributes(&mut parser, &pool)?;
    class.annotations = annotations_of(&list, &pool)?;
    if let Some(attribute) = find(&list, INNER_CLASSES) {
        class.inner_classes = attributes::inner_classes(attribute.data, &pool)?;
        if let Some(own) = class.inner_classes.iter().find(|info| info.inner == name) {
            class.outer_class = own.outer.clone();
            class.anonymous = own.name.is_none();
        }
    }
    let bootstraps = match find(&list, BOOTSTRAP_METHODS) {
        Some(attribute) => attributes::bootstrap_methods(attribute.data, &pool)?,
        None => Vec::new(),
    };

    let mut dynamic = DynamicContext::new(&name, &pool, &bootstraps);
    for PendingMethod { mut method, code } in pending {
        if let Some(data) = code {
            let attribute = CodeAttribute::parse(data, &pool)?;
            code::decode(&mut method, &attribute, &pool, &mut dynamic)?;
        }
        class.methods.push(method);
    }
    let mut generated = dynamic.into_proxies();

    if class.is_annotation() {
        generated.push(annotation_impl(&class)?);
    }

    log::debug!(
        "parsed {} ({} fields, {} methods, {} generated)",
        name,
        class.fields.len(),
        class.methods.len(),
        generated.len()
    );
    Ok(ParsedClass { class, generated })
}
