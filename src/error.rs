use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! unsupported_error {
    ($msg:expr) => {
        crate::Error::NotSupported($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::NotSupported(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Every failure raised inside a compiler pass is a value of this enum. Passes never catch each
/// other's errors: they propagate with `?` up to [`crate::Compiler::run`], which hands them to the
/// caller unchanged. A compilation is deterministic, so re-running with the same inputs
/// reproduces the same error.
///
/// Conditions the compiler treats as recoverable (a class whose superclass is missing, an
/// intrinsic entry that matches no method) are not represented here; they are reported through
/// the `log` facade and the affected unit is skipped.
///
/// # Error Categories
///
/// ## Input Errors
/// - [`Error::Malformed`] - Corrupted or invalid classfile / archive structure
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of an input buffer
/// - [`Error::NotSupported`] - Unsupported opcode, constant kind or dynamic call site
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Archive`] - Damaged or unsupported `.jar` / `.zip` container
///
/// ## Analysis Errors
/// - [`Error::StackUnderflow`] - An instruction needs more operands than the symbolic stack holds
/// - [`Error::Unresolved`] - Instruction left without resolved I/O after flow analysis
/// - [`Error::UnknownLabel`] - A branch refers to a label that is not part of the method
/// - [`Error::Hierarchy`] - Inconsistent class hierarchy
///
/// ## Output Errors
/// - [`Error::MissingClass`] - A required class is absent from the final class set
///
/// ## Configuration Errors
/// - [`Error::Config`], [`Error::Json`], [`Error::Pattern`]
///
/// # Examples
///
/// ```rust,no_run
/// use jvmaot::{Compiler, CompilerConfig, Error};
///
/// let mut compiler = Compiler::new(CompilerConfig::default());
/// match compiler.run(std::path::Path::new("out")) {
///     Ok(report) => println!("emitted {} classes", report.classes),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed input: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Compilation failed: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// This error indicates that a classfile or archive does not conform to the expected
    /// structure. The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the input.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The input uses a feature the compiler has no handling for.
    ///
    /// Raised for opcodes such as `jsr`/`ret`, unknown constant pool tags, and dynamic call
    /// sites whose bootstrap method is neither the lambda metafactory nor the string concat
    /// factory.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// An instruction required more operands than the symbolic stack held.
    ///
    /// The flow analyzer checks every instruction's declared arity against the current stack
    /// depth before binding inputs.
    #[error("Stack underflow in {method} at instruction {index}: needs {needed}, has {available}")]
    StackUnderflow {
        /// Qualified method name
        method: String,
        /// Position of the instruction within the method
        index: usize,
        /// Operands required by the instruction
        needed: usize,
        /// Operands available on the symbolic stack
        available: usize,
    },

    /// An instruction was left without typed inputs and outputs after flow analysis.
    #[error("Failed to resolve instruction I/O in {method} at instruction {index}: {instruction}")]
    Unresolved {
        /// Qualified method name
        method: String,
        /// Position of the instruction within the method
        index: usize,
        /// Textual form of the offending instruction
        instruction: String,
    },

    /// A branch or exception region refers to a label that does not exist in the method.
    #[error("Unknown label L{label} in {method}")]
    UnknownLabel {
        /// Qualified method name
        method: String,
        /// The label id
        label: u32,
    },

    /// The class hierarchy is inconsistent in a way that cannot be skipped.
    #[error("Hierarchy error: {0}")]
    Hierarchy(String),

    /// A class required for the emitted program is not part of the class set.
    #[error("Required class is missing: {0}")]
    MissingClass(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A configuration fragment could not be decoded.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// A `.jar` / `.zip` container could not be read.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// A glob pattern could not be compiled.
    #[error("{0}")]
    Pattern(#[from] regex::Error),

    /// Rendering native source text failed.
    #[error("{0}")]
    Format(#[from] std::fmt::Error),

    /// The reference interpreter hit an unsupported or invalid state.
    #[error("Emulation error: {0}")]
    Emulation(String),
}
