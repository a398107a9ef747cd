//! Native spellings of constants.
//!
//! Every constant is rendered as an expression that means the same value on any conforming
//! compiler: the most negative integers go through the `<cstdint>` limits because their
//! decimal form is a negated out-of-range literal, and non-finite floating point values use
//! `std::numeric_limits`.

use crate::{alloc::Literal, ir::Constant};

/// Escapes text for a C string literal.
///
/// Printable ASCII passes through. Quotes, backslashes and question marks (trigraphs) are
/// escaped, every other byte of the UTF-8 encoding becomes a three digit octal escape, which
/// unlike `\x` can never swallow a following character.
#[must_use]
pub fn escape_c_string(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for byte in text.bytes() {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            b'?' => escaped.push_str("\\?"),
            b'\n' => escaped.push_str("\\n"),
            b'\t' => escaped.push_str("\\t"),
            0x20..=0x7e => escaped.push(char::from(byte)),
            other => escaped.push_str(&format!("\\{other:03o}")),
        }
    }
    escaped
}

/// A quoted C string literal.
#[must_use]
pub fn string_literal(text: &str) -> String {
    format!("\"{}\"", escape_c_string(text))
}

/// A `jint` constant.
#[must_use]
pub fn int_literal(value: i32) -> String {
    if value == i32::MIN {
        "INT32_MIN".to_string()
    } else {
        value.to_string()
    }
}

/// A `jlong` constant.
#[must_use]
pub fn long_literal(value: i64) -> String {
    if value == i64::MIN {
        "INT64_MIN".to_string()
    } else {
        format!("{value}LL")
    }
}

/// A `jfloat` constant.
#[must_use]
pub fn float_literal(value: f32) -> String {
    if value.is_nan() {
        "std::numeric_limits<jfloat>::quiet_NaN()".to_string()
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("{sign}std::numeric_limits<jfloat>::infinity()")
    } else {
        // Debug output is the shortest text that reads back to the same value
        format!("{value:?}f")
    }
}

/// A `jdouble` constant.
#[must_use]
pub fn double_literal(value: f64) -> String {
    if value.is_nan() {
        "std::numeric_limits<jdouble>::quiet_NaN()".to_string()
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("{sign}std::numeric_limits<jdouble>::infinity()")
    } else {
        format!("{value:?}")
    }
}

/// An immediate operand.
#[must_use]
pub fn render_literal(literal: Literal) -> String {
    match literal {
        Literal::Int(value) => int_literal(value),
        Literal::Long(value) => long_literal(value),
        Literal::Float(value) => float_literal(value),
        Literal::Double(value) => double_literal(value),
        Literal::Null => "nullptr".to_string(),
    }
}

/// A runtime string literal object.
#[must_use]
pub fn string_object(text: &str) -> String {
    format!(
        "(jobject) createStringLiteral(ctx, StringLiteral{{{}, {}}})",
        string_literal(text),
        text.len()
    )
}

/// Any `ldc` constant as an expression of its stack type.
#[must_use]
pub fn constant_expression(constant: &Constant) -> String {
    match constant {
        Constant::Int(value) => int_literal(*value),
        Constant::Long(value) => long_literal(*value),
        Constant::Float(value) => float_literal(*value),
        Constant::Double(value) => double_literal(*value),
        Constant::String(text) => string_object(text),
        Constant::Class(ty) => format!("(jobject) {}", ty.class_fetch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::JavaType;

    #[test]
    fn test_escape_c_string() {
        assert_eq!(escape_c_string("plain text"), "plain text");
        assert_eq!(escape_c_string("say \"hi\"\n"), "say \\\"hi\\\"\\n");
        assert_eq!(escape_c_string("a\\b??="), "a\\\\b\\?\\?=");
        assert_eq!(escape_c_string("é"), "\\303\\251");
        assert_eq!(escape_c_string("\u{1}7"), "\\0017");
    }

    #[test]
    fn test_extreme_values() {
        assert_eq!(int_literal(i32::MIN), "INT32_MIN");
        assert_eq!(int_literal(-5), "-5");
        assert_eq!(long_literal(i64::MIN), "INT64_MIN");
        assert_eq!(long_literal(7), "7LL");
        assert_eq!(float_literal(1.0), "1.0f");
        assert_eq!(float_literal(f32::NEG_INFINITY), "-std::numeric_limits<jfloat>::infinity()");
        assert_eq!(double_literal(f64::NAN), "std::numeric_limits<jdouble>::quiet_NaN()");
        assert_eq!(double_literal(0.1), "0.1");
        assert_eq!(render_literal(Literal::Null), "nullptr");
    }

    #[test]
    fn test_constants() {
        assert_eq!(
            constant_expression(&Constant::String("ab".into())),
            "(jobject) createStringLiteral(ctx, StringLiteral{\"ab\", 2})"
        );
        assert_eq!(
            constant_expression(&Constant::Class(JavaType::Class("pkg/A".into()))),
            "(jobject) &class_pkg_A"
        );
    }
}
