//! Method signatures.

use std::fmt;

use crate::{ir::types::JavaType, Result};

/// Name of instance constructors.
pub const CONSTRUCTOR_NAME: &str = "<init>";
/// Name of static initializers.
pub const STATIC_INITIALIZER_NAME: &str = "<clinit>";

/// A method name plus its parsed descriptor.
///
/// Two signatures are equal when name and descriptor are equal, which is also how the JVM
/// matches overriding methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodSignature {
    name: String,
    descriptor: String,
    params: Vec<JavaType>,
    return_type: JavaType,
}

impl MethodSignature {
    /// Parses a method descriptor such as `(ILjava/lang/String;)V`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not a valid method descriptor.
    pub fn new(name: &str, descriptor: &str) -> Result<Self> {
        let Some(body) = descriptor.strip_prefix('(') else {
            return Err(malformed_error!("Method descriptor '{}' lacks '('", descriptor));
        };
        let close = body
            .find(')')
            .ok_or_else(|| malformed_error!("Method descriptor '{}' lacks ')'", descriptor))?;

        let mut params = Vec::new();
        let mut rest = &body[..close];
        while !rest.is_empty() {
            let (param, tail) = JavaType::parse_prefix(rest)?;
            if param.is_void() {
                return Err(malformed_error!("void parameter in '{}'", descriptor));
            }
            params.push(param);
            rest = tail;
        }

        Ok(MethodSignature {
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            params,
            return_type: JavaType::parse(&body[close + 1..])?,
        })
    }

    /// The unmangled method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw descriptor.
    #[must_use]
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Parameter types in declaration order, excluding the receiver.
    #[must_use]
    pub fn params(&self) -> &[JavaType] {
        &self.params
    }

    /// The return type, `void` included.
    #[must_use]
    pub fn return_type(&self) -> &JavaType {
        &self.return_type
    }

    /// `true` for `<init>`.
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CONSTRUCTOR_NAME
    }

    /// `true` for `<clinit>`.
    #[must_use]
    pub fn is_static_initializer(&self) -> bool {
        self.name == STATIC_INITIALIZER_NAME
    }

    /// Number of local variable indices the parameters occupy, receiver excluded.
    #[must_use]
    pub fn param_slots(&self) -> u16 {
        self.params.iter().map(|p| p.kind().local_size()).sum()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}
