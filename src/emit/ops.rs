//! Native expressions for individual opcodes.
//!
//! Every function here takes its operands already rendered and returns either an expression
//! or, for operations with a guard, the statements to emit. Integer arithmetic is computed on
//! unsigned types so overflow wraps the way the JVM defines it instead of being undefined.

use crate::ir::{JavaType, Opcode, TypeKind};

/// The `uint*_t` type an integer kind wraps through.
fn unsigned(kind: TypeKind) -> &'static str {
    if kind == TypeKind::Long {
        "uint64_t"
    } else {
        "uint32_t"
    }
}

fn wrapping(kind: TypeKind, a: &str, op: &str, b: &str) -> String {
    let native = kind.c_type();
    let unsigned = unsigned(kind);
    format!("({native}) (({unsigned}) {a} {op} ({unsigned}) {b})")
}

/// Result kind of an arithmetic opcode.
#[must_use]
pub fn result_kind(opcode: Opcode) -> TypeKind {
    match opcode {
        Opcode::Ladd
        | Opcode::Lsub
        | Opcode::Lmul
        | Opcode::Ldiv
        | Opcode::Lrem
        | Opcode::Lneg
        | Opcode::Lshl
        | Opcode::Lshr
        | Opcode::Lushr
        | Opcode::Land
        | Opcode::Lor
        | Opcode::Lxor
        | Opcode::I2l
        | Opcode::F2l
        | Opcode::D2l => TypeKind::Long,
        Opcode::Fadd
        | Opcode::Fsub
        | Opcode::Fmul
        | Opcode::Fdiv
        | Opcode::Frem
        | Opcode::Fneg
        | Opcode::I2f
        | Opcode::L2f
        | Opcode::D2f => TypeKind::Float,
        Opcode::Dadd
        | Opcode::Dsub
        | Opcode::Dmul
        | Opcode::Ddiv
        | Opcode::Drem
        | Opcode::Dneg
        | Opcode::I2d
        | Opcode::L2d
        | Opcode::F2d => TypeKind::Double,
        _ => TypeKind::Int,
    }
}

/// `true` for `idiv`, `ldiv`, `irem` and `lrem`, which need a zero divisor check.
#[must_use]
pub fn is_checked_division(opcode: Opcode) -> bool {
    matches!(opcode, Opcode::Idiv | Opcode::Ldiv | Opcode::Irem | Opcode::Lrem)
}

/// Statements performing an integer division or remainder into `dest`.
///
/// Division by zero throws; dividing the minimum value by -1 is computed without trapping.
#[must_use]
pub fn checked_division(opcode: Opcode, dest: &str, a: &str, b: &str) -> String {
    let kind = result_kind(opcode);
    let unsigned = unsigned(kind);
    let native = kind.c_type();
    let result = match opcode {
        Opcode::Idiv | Opcode::Ldiv => format!(
            "{b} == -1 ? ({native}) (({unsigned}) 0 - ({unsigned}) {a}) : {a} / {b}"
        ),
        _ => format!("{b} == -1 ? 0 : {a} % {b}"),
    };
    format!("    if ({b} == 0) throwDivisionByZero(ctx);\n    {dest} = {result};\n")
}

/// Expression for a two operand arithmetic, bitwise or comparison opcode.
#[must_use]
pub fn binary(opcode: Opcode, a: &str, b: &str) -> Option<String> {
    let kind = result_kind(opcode);
    Some(match opcode {
        Opcode::Iadd | Opcode::Ladd => wrapping(kind, a, "+", b),
        Opcode::Isub | Opcode::Lsub => wrapping(kind, a, "-", b),
        Opcode::Imul | Opcode::Lmul => wrapping(kind, a, "*", b),
        Opcode::Fadd | Opcode::Dadd => format!("{a} + {b}"),
        Opcode::Fsub | Opcode::Dsub => format!("{a} - {b}"),
        Opcode::Fmul | Opcode::Dmul => format!("{a} * {b}"),
        Opcode::Fdiv | Opcode::Ddiv => format!("{a} / {b}"),
        Opcode::Frem => format!("fmodf({a}, {b})"),
        Opcode::Drem => format!("fmod({a}, {b})"),
        Opcode::Ishl => format!("(jint) ((uint32_t) {a} << ({b} & 31))"),
        Opcode::Lshl => format!("(jlong) ((uint64_t) {a} << ({b} & 63))"),
        Opcode::Ishr => format!("{a} >> ({b} & 31)"),
        Opcode::Lshr => format!("{a} >> ({b} & 63)"),
        Opcode::Iushr => format!("(jint) ((uint32_t) {a} >> ({b} & 31))"),
        Opcode::Lushr => format!("(jlong) ((uint64_t) {a} >> ({b} & 63))"),
        Opcode::Iand | Opcode::Land => format!("{a} & {b}"),
        Opcode::Ior | Opcode::Lor => format!("{a} | {b}"),
        Opcode::Ixor | Opcode::Lxor => format!("{a} ^ {b}"),
        Opcode::Lcmp => format!("longCompare({a}, {b})"),
        Opcode::Fcmpl => format!("floatCompare({a}, {b}, -1)"),
        Opcode::Fcmpg => format!("floatCompare({a}, {b}, 1)"),
        Opcode::Dcmpl => format!("doubleCompare({a}, {b}, -1)"),
        Opcode::Dcmpg => format!("doubleCompare({a}, {b}, 1)"),
        _ => return None,
    })
}

/// Floating point to integer conversion, saturating at the bounds with NaN mapped to zero.
fn saturating(value: &str, target: TypeKind, suffix: &str) -> String {
    let (max, min, upper, lower) = if target == TypeKind::Long {
        (
            "INT64_MAX",
            "INT64_MIN",
            "9223372036854775807.0",
            "-9223372036854775808.0",
        )
    } else {
        ("INT32_MAX", "INT32_MIN", "2147483647.0", "-2147483648.0")
    };
    format!(
        "std::isnan({value}) ? 0 : {value} >= {upper}{suffix} ? {max} : {value} <= {lower}{suffix} ? {min} : ({}) {value}",
        target.c_type()
    )
}

/// Expression for a one operand arithmetic or conversion opcode.
#[must_use]
pub fn unary(opcode: Opcode, a: &str) -> Option<String> {
    Some(match opcode {
        Opcode::Ineg => format!("(jint) ((uint32_t) 0 - (uint32_t) {a})"),
        Opcode::Lneg => format!("(jlong) ((uint64_t) 0 - (uint64_t) {a})"),
        Opcode::Fneg | Opcode::Dneg => format!("-{a}"),
        Opcode::I2l | Opcode::F2d | Opcode::L2d | Opcode::I2d | Opcode::I2f | Opcode::L2f
        | Opcode::D2f | Opcode::L2i => format!("({}) {a}", result_kind(opcode).c_type()),
        Opcode::F2i => saturating(a, TypeKind::Int, "f"),
        Opcode::F2l => saturating(a, TypeKind::Long, "f"),
        Opcode::D2i => saturating(a, TypeKind::Int, ""),
        Opcode::D2l => saturating(a, TypeKind::Long, ""),
        Opcode::I2b => format!("(jint) (jbyte) {a}"),
        Opcode::I2c => format!("(jint) (jchar) {a}"),
        Opcode::I2s => format!("(jint) (jshort) {a}"),
        _ => return None,
    })
}

/// Native element type of an array load or store.
///
/// `baload` and `bastore` serve both `byte[]` and `boolean[]`, the array operand's type
/// decides which one.
#[must_use]
pub fn element_type(opcode: Opcode, array: &JavaType) -> &'static str {
    match opcode {
        Opcode::Iaload | Opcode::Iastore => "jint",
        Opcode::Laload | Opcode::Lastore => "jlong",
        Opcode::Faload | Opcode::Fastore => "jfloat",
        Opcode::Daload | Opcode::Dastore => "jdouble",
        Opcode::Caload | Opcode::Castore => "jchar",
        Opcode::Saload | Opcode::Sastore => "jshort",
        Opcode::Baload | Opcode::Bastore => {
            if array.element() == Some(JavaType::Primitive(TypeKind::Boolean)) {
                "jbool"
            } else {
                "jbyte"
            }
        }
        _ => "jobject",
    }
}

/// Lvalue of an array element, bounds and null checked when `checked`.
#[must_use]
pub fn array_element(element: &str, array: &str, index: &str, checked: bool) -> String {
    if checked {
        format!("ARRAY_ACCESS({array}, {element}, {index})")
    } else {
        format!("(({element} *) ((jarray) {array})->data)[{index}]")
    }
}

/// Condition of a conditional branch.
#[must_use]
pub fn condition(opcode: Opcode, operands: &[String]) -> Option<String> {
    let a = operands.first()?;
    let compare = |op: &str| operands.get(1).map(|b| format!("{a} {op} {b}"));
    match opcode {
        Opcode::Ifeq => Some(format!("{a} == 0")),
        Opcode::Ifne => Some(format!("{a} != 0")),
        Opcode::Iflt => Some(format!("{a} < 0")),
        Opcode::Ifge => Some(format!("{a} >= 0")),
        Opcode::Ifgt => Some(format!("{a} > 0")),
        Opcode::Ifle => Some(format!("{a} <= 0")),
        Opcode::Ifnull => Some(format!("{a} == nullptr")),
        Opcode::Ifnonnull => Some(format!("{a} != nullptr")),
        Opcode::IfIcmpeq | Opcode::IfAcmpeq => compare("=="),
        Opcode::IfIcmpne | Opcode::IfAcmpne => compare("!="),
        Opcode::IfIcmplt => compare("<"),
        Opcode::IfIcmpge => compare(">="),
        Opcode::IfIcmpgt => compare(">"),
        Opcode::IfIcmple => compare("<="),
        _ => None,
    }
}

/// A string concatenation argument, boxed if primitive.
#[must_use]
pub fn concat_argument(ty: &JavaType, value: &str) -> String {
    let boxing = match ty.kind() {
        TypeKind::Boolean => "boxBoolean",
        TypeKind::Byte => "boxByte",
        TypeKind::Char => "boxCharacter",
        TypeKind::Short => "boxShort",
        TypeKind::Int => "boxInteger",
        TypeKind::Long => "boxLong",
        TypeKind::Float => "boxFloat",
        TypeKind::Double => "boxDouble",
        TypeKind::Void | TypeKind::Object => return value.to_string(),
    };
    format!("{boxing}(ctx, {value})")
}
