//! Runtime values and the object heap of the emulator.
//!
//! Values on the emulated stack are untagged in generated code (`jtype` unions). Here they
//! carry their stack kind so that a plan reading a slot with the wrong kind is caught instead
//! of silently reinterpreting bits.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::{
    alloc::Literal,
    ir::{JavaType, TypeKind},
    Error, Result,
};

/// Opaque handle of a heap object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapRef(usize);

impl HeapRef {
    /// Index of the object in allocation order.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for HeapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A value of one of the JVM's stack kinds.
///
/// `boolean`, `byte`, `char` and `short` are widened to [`EmValue::Int`] as on the operand
/// stack; array stores narrow them again.
#[derive(Debug, Clone, Copy)]
pub enum EmValue {
    /// `int` and its narrow relatives
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// A reference, `None` is null
    Ref(Option<HeapRef>),
}

// Floats compare by bit pattern so two executions producing NaN agree.
impl PartialEq for EmValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EmValue::Int(a), EmValue::Int(b)) => a == b,
            (EmValue::Long(a), EmValue::Long(b)) => a == b,
            (EmValue::Float(a), EmValue::Float(b)) => a.to_bits() == b.to_bits(),
            (EmValue::Double(a), EmValue::Double(b)) => a.to_bits() == b.to_bits(),
            (EmValue::Ref(a), EmValue::Ref(b)) => a == b,
            _ => false,
        }
    }
}

impl EmValue {
    /// The null reference.
    pub const NULL: EmValue = EmValue::Ref(None);

    /// The zero value of a stack kind, what a freshly zeroed frame entry reads as.
    #[must_use]
    pub fn zero(kind: TypeKind) -> Self {
        match kind.stack_kind() {
            TypeKind::Long => EmValue::Long(0),
            TypeKind::Float => EmValue::Float(0.0),
            TypeKind::Double => EmValue::Double(0.0),
            TypeKind::Object => EmValue::NULL,
            _ => EmValue::Int(0),
        }
    }

    /// The stack kind of the value.
    #[must_use]
    pub fn kind(&self) -> TypeKind {
        match self {
            EmValue::Int(_) => TypeKind::Int,
            EmValue::Long(_) => TypeKind::Long,
            EmValue::Float(_) => TypeKind::Float,
            EmValue::Double(_) => TypeKind::Double,
            EmValue::Ref(_) => TypeKind::Object,
        }
    }

    /// The `int` payload.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for any other kind.
    pub fn as_int(&self) -> Result<i32> {
        match self {
            EmValue::Int(value) => Ok(*value),
            other => Err(mismatch("int", other)),
        }
    }

    /// The `long` payload.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for any other kind.
    pub fn as_long(&self) -> Result<i64> {
        match self {
            EmValue::Long(value) => Ok(*value),
            other => Err(mismatch("long", other)),
        }
    }

    /// The `float` payload.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for any other kind.
    pub fn as_float(&self) -> Result<f32> {
        match self {
            EmValue::Float(value) => Ok(*value),
            other => Err(mismatch("float", other)),
        }
    }

    /// The `double` payload.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for any other kind.
    pub fn as_double(&self) -> Result<f64> {
        match self {
            EmValue::Double(value) => Ok(*value),
            other => Err(mismatch("double", other)),
        }
    }

    /// The reference payload.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for primitives.
    pub fn as_ref(&self) -> Result<Option<HeapRef>> {
        match self {
            EmValue::Ref(value) => Ok(*value),
            other => Err(mismatch("reference", other)),
        }
    }

    /// Narrows an `int` to the range of a field or array element type.
    #[must_use]
    pub fn narrow(self, kind: TypeKind) -> Self {
        match (self, kind) {
            (EmValue::Int(value), TypeKind::Boolean) => EmValue::Int(value & 1),
            (EmValue::Int(value), TypeKind::Byte) => EmValue::Int(i32::from(value as i8)),
            (EmValue::Int(value), TypeKind::Char) => EmValue::Int(i32::from(value as u16)),
            (EmValue::Int(value), TypeKind::Short) => EmValue::Int(i32::from(value as i16)),
            (value, _) => value,
        }
    }
}

impl From<Literal> for EmValue {
    fn from(literal: Literal) -> Self {
        match literal {
            Literal::Int(value) => EmValue::Int(value),
            Literal::Long(value) => EmValue::Long(value),
            Literal::Float(value) => EmValue::Float(value),
            Literal::Double(value) => EmValue::Double(value),
            Literal::Null => EmValue::NULL,
        }
    }
}

impl fmt::Display for EmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmValue::Int(value) => write!(f, "{value}"),
            EmValue::Long(value) => write!(f, "{value}L"),
            EmValue::Float(value) => write!(f, "{value}f"),
            EmValue::Double(value) => write!(f, "{value}d"),
            EmValue::Ref(Some(object)) => write!(f, "{object}"),
            EmValue::Ref(None) => write!(f, "null"),
        }
    }
}

fn mismatch(expected: &str, found: &EmValue) -> Error {
    Error::Emulation(format!("expected {expected}, found {found}"))
}

/// Contents of a heap object.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    /// Instance fields keyed by declaring class and field name
    Fields(FxHashMap<(String, String), EmValue>),
    /// Array elements
    Array {
        /// Element type
        element: JavaType,
        /// Elements, narrowed to the element type
        elements: Vec<EmValue>,
    },
    /// A string instance, kept as text
    String(String),
}

/// An object on the emulated heap.
#[derive(Debug, Clone, PartialEq)]
pub struct HeapObject {
    /// Internal class name, or the descriptor for arrays
    pub class: String,
    /// Contents
    pub body: ObjectBody,
}

/// The emulated heap.
///
/// Objects are never freed; the mark model in [`crate::emulation::gc`] only computes
/// reachability. Allocation order is deterministic, so two executions of the same program
/// hand out the same references.
#[derive(Debug, Default)]
pub struct ManagedHeap {
    objects: Vec<HeapObject>,
    strings: FxHashMap<String, HeapRef>,
}

impl ManagedHeap {
    /// Creates an empty heap.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of allocated objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// `true` if nothing was allocated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Allocates an object.
    pub fn alloc(&mut self, object: HeapObject) -> HeapRef {
        self.objects.push(object);
        HeapRef(self.objects.len() - 1)
    }

    /// Allocates an instance with the given fields set to their zero values.
    pub fn alloc_instance<'f>(
        &mut self,
        class: &str,
        fields: impl IntoIterator<Item = (&'f str, &'f str, TypeKind)>,
    ) -> HeapRef {
        let fields = fields
            .into_iter()
            .map(|(owner, name, kind)| ((owner.to_string(), name.to_string()), EmValue::zero(kind)))
            .collect();
        self.alloc(HeapObject {
            class: class.to_string(),
            body: ObjectBody::Fields(fields),
        })
    }

    /// Allocates a zeroed array.
    pub fn alloc_array(&mut self, element: JavaType, length: usize) -> HeapRef {
        let class = JavaType::array_of(element.clone(), 1).descriptor();
        let elements = vec![EmValue::zero(element.kind()); length];
        self.alloc(HeapObject {
            class,
            body: ObjectBody::Array { element, elements },
        })
    }

    /// The interned string object holding `text`.
    pub fn intern(&mut self, text: &str) -> HeapRef {
        if let Some(object) = self.strings.get(text) {
            return *object;
        }
        let object = self.alloc(HeapObject {
            class: crate::ir::STRING_CLASS.to_string(),
            body: ObjectBody::String(text.to_string()),
        });
        self.strings.insert(text.to_string(), object);
        object
    }

    /// Allocates a fresh, non-interned string.
    pub fn alloc_string(&mut self, text: String) -> HeapRef {
        self.alloc(HeapObject {
            class: crate::ir::STRING_CLASS.to_string(),
            body: ObjectBody::String(text),
        })
    }

    /// The object behind a reference.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for a dangling reference.
    pub fn get(&self, object: HeapRef) -> Result<&HeapObject> {
        self.objects
            .get(object.0)
            .ok_or_else(|| Error::Emulation(format!("dangling reference {object}")))
    }

    /// Mutable access to the object behind a reference.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] for a dangling reference.
    pub fn get_mut(&mut self, object: HeapRef) -> Result<&mut HeapObject> {
        self.objects
            .get_mut(object.0)
            .ok_or_else(|| Error::Emulation(format!("dangling reference {object}")))
    }

    /// Every object with its reference, in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = (HeapRef, &HeapObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(index, object)| (HeapRef(index), object))
    }

    /// Reads an instance field. Fields the object was not allocated with read as zero.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the object is not a plain instance.
    pub fn field(&self, object: HeapRef, owner: &str, name: &str, kind: TypeKind) -> Result<EmValue> {
        match &self.get(object)?.body {
            ObjectBody::Fields(fields) => Ok(fields
                .get(&(owner.to_string(), name.to_string()))
                .copied()
                .unwrap_or_else(|| EmValue::zero(kind))),
            _ => Err(Error::Emulation(format!("{owner}.{name} read from {object}, which has no fields"))),
        }
    }

    /// Writes an instance field.
    ///
    /// # Errors
    /// Returns [`Error::Emulation`] if the object is not a plain instance.
    pub fn set_field(&mut self, object: HeapRef, owner: &str, name: &str, value: EmValue) -> Result<()> {
        match &mut self.get_mut(object)?.body {
            ObjectBody::Fields(fields) => {
                fields.insert((owner.to_string(), name.to_string()), value);
                Ok(())
            }
            _ => Err(Error::Emulation(format!("{owner}.{name} written to {object}, which has no fields"))),
        }
    }

    /// Text of a string object.
    #[must_use]
    pub fn text(&self, object: HeapRef) -> Option<&str> {
        match &self.objects.get(object.0)?.body {
            ObjectBody::String(text) => Some(text),
            _ => None,
        }
    }

    /// References held by an object, in field then element order.
    pub fn references(&self, object: HeapRef) -> Result<Vec<(Option<&(String, String)>, HeapRef)>> {
        let mut references = Vec::new();
        match &self.get(object)?.body {
            ObjectBody::Fields(fields) => {
                let mut entries: Vec<_> = fields.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                for (key, value) in entries {
                    if let EmValue::Ref(Some(child)) = value {
                        references.push((Some(key), *child));
                    }
                }
            }
            ObjectBody::Array { elements, .. } => {
                for value in elements {
                    if let EmValue::Ref(Some(child)) = value {
                        references.push((None, *child));
                    }
                }
            }
            ObjectBody::String(_) => {}
        }
        Ok(references)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values() {
        assert_eq!(EmValue::zero(TypeKind::Boolean), EmValue::Int(0));
        assert_eq!(EmValue::zero(TypeKind::Double), EmValue::Double(0.0));
        assert_eq!(EmValue::zero(TypeKind::Object), EmValue::NULL);
        assert_ne!(EmValue::Int(0), EmValue::Long(0));
    }

    #[test]
    fn test_nan_equality() {
        assert_eq!(EmValue::Float(f32::NAN), EmValue::Float(f32::NAN));
        assert_ne!(EmValue::Double(0.0), EmValue::Double(-0.0));
    }

    #[test]
    fn test_narrowing() {
        assert_eq!(EmValue::Int(0x1ff).narrow(TypeKind::Byte), EmValue::Int(-1));
        assert_eq!(EmValue::Int(-1).narrow(TypeKind::Char), EmValue::Int(0xffff));
        assert_eq!(EmValue::Int(3).narrow(TypeKind::Boolean), EmValue::Int(1));
        assert_eq!(EmValue::Long(-1).narrow(TypeKind::Byte), EmValue::Long(-1));
    }

    #[test]
    fn test_heap_strings_are_interned() {
        let mut heap = ManagedHeap::new();
        let a = heap.intern("x");
        let b = heap.intern("x");
        let c = heap.alloc_string("x".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(heap.text(c), Some("x"));
        assert_eq!(heap.len(), 2);
    }

    #[test]
    fn test_fields_and_references() {
        let mut heap = ManagedHeap::new();
        let node = heap.alloc_instance("pkg/Node", [("pkg/Node", "next", TypeKind::Object)]);
        let other = heap.alloc_instance("pkg/Node", [("pkg/Node", "next", TypeKind::Object)]);
        assert_eq!(heap.field(node, "pkg/Node", "next", TypeKind::Object).unwrap(), EmValue::NULL);
        heap.set_field(node, "pkg/Node", "next", EmValue::Ref(Some(other))).unwrap();
        let references = heap.references(node).unwrap();
        assert_eq!(references.len(), 1);
        assert_eq!(references[0].1, other);

        let array = heap.alloc_array(JavaType::int(), 3);
        assert!(heap.set_field(array, "pkg/Node", "next", EmValue::NULL).is_err());
        assert_eq!(heap.get(array).unwrap().class, "[I");
    }
}
