//! Annotation instances and their value trees.

use std::collections::BTreeSet;

use crate::ir::types::JavaType;

/// A single annotation element value (JVMS 4.7.16.1).
#[derive(Debug, Clone, PartialEq)]
pub enum AnnotationValue {
    /// `B`
    Byte(i8),
    /// `C`
    Char(u16),
    /// `D`
    Double(f64),
    /// `F`
    Float(f32),
    /// `I`
    Int(i32),
    /// `J`
    Long(i64),
    /// `S`
    Short(i16),
    /// `Z`
    Boolean(bool),
    /// `s`
    String(String),
    /// `e`, an enum constant
    Enum {
        /// Internal name of the enum class
        ty: String,
        /// Constant name
        constant: String,
    },
    /// `c`, a class literal
    Class(JavaType),
    /// `@`, a nested annotation
    Annotation(Annotation),
    /// `[`, an array of values
    Array(Vec<AnnotationValue>),
}

impl AnnotationValue {
    /// Adds every class the value tree mentions to `out`.
    pub fn referenced_classes(&self, out: &mut BTreeSet<String>) {
        match self {
            AnnotationValue::Enum { ty, .. } => {
                out.insert(ty.clone());
            }
            AnnotationValue::Class(ty) => {
                if let Some(class) = ty.class_reference() {
                    out.insert(class.to_string());
                }
            }
            AnnotationValue::Annotation(nested) => nested.referenced_classes(out),
            AnnotationValue::Array(values) => {
                for value in values {
                    value.referenced_classes(out);
                }
            }
            _ => {}
        }
    }
}

/// An annotation instance: its type and the explicitly or default-provided member values.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Internal name of the annotation interface
    pub ty: String,
    /// Member values in declaration order
    pub values: Vec<(String, AnnotationValue)>,
}

impl Annotation {
    /// Creates an annotation without values.
    #[must_use]
    pub fn new(ty: &str) -> Self {
        Annotation {
            ty: ty.to_string(),
            values: Vec::new(),
        }
    }

    /// Looks up a member value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&AnnotationValue> {
        self.values
            .iter()
            .find_map(|(member, value)| (member == name).then_some(value))
    }

    /// Adds every class the annotation mentions, its own type included, to `out`.
    pub fn referenced_classes(&self, out: &mut BTreeSet<String>) {
        out.insert(self.ty.clone());
        for (_, value) in &self.values {
            value.referenced_classes(out);
        }
    }

    /// Fills in members the annotation does not set from the annotation type's defaults.
    ///
    /// `defaults` returns the default member values of an annotation type. Nested annotation
    /// values, both explicit and defaulted, are completed against their own type member by
    /// member, so an explicitly given nested annotation still receives defaults for the members
    /// it leaves out.
    pub fn apply_defaults<F>(&mut self, defaults: &F)
    where
        F: Fn(&str) -> Vec<(String, AnnotationValue)>,
    {
        for (name, value) in defaults(&self.ty) {
            if self.get(&name).is_none() {
                self.values.push((name, value));
            }
        }
        for (_, value) in &mut self.values {
            complete_value(value, defaults);
        }
    }
}

fn complete_value<F>(value: &mut AnnotationValue, defaults: &F)
where
    F: Fn(&str) -> Vec<(String, AnnotationValue)>,
{
    match value {
        AnnotationValue::Annotation(nested) => nested.apply_defaults(defaults),
        AnnotationValue::Array(values) => {
            for value in values {
                complete_value(value, defaults);
            }
        }
        _ => {}
    }
}
