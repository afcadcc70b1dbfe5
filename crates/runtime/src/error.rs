//! Runtime (VM dispatch-loop) errors.
//!
//! Hand-rolled enum + manual `Display`, matching the teacher's
//! `codegen/error.rs` idiom rather than reaching for `thiserror`.

use std::fmt;

#[derive(Debug)]
pub enum RuntimeError {
    /// Element-wise op on vectors of unequal length.
    MismatchArrayLengths { left: usize, right: usize },
    /// Duplicate key in the right side of an equality join.
    DuplicateJoinKey,
    /// Index out of bounds for a vector/Dataframe access.
    IndexOutOfBounds { index: i64, len: usize },
    /// Wrong number of function arguments at call time.
    ArityMismatch { expected: usize, got: usize },
    /// An opcode was applied to operand(s) of a type it does not support.
    InvalidOpcodeForType { opcode: &'static str, type_name: String },
    /// A `Type` operand was expected but a different operand kind was found.
    ExpectedTypeOperand,
    /// I/O error surfaced from CSV load/store.
    Io(String),
    /// A CSV file's header row doesn't match the Dataframe type's field names.
    CsvSchemaMismatch { expected: Vec<String>, found: Vec<String> },
    /// A CSV cell couldn't be parsed as its column's element kind.
    CsvParse { row: usize, column: String, value: String },
    /// `exit(n)` was invoked; unwinds the dispatch loop with this code.
    Exit(i32),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::MismatchArrayLengths { left, right } => {
                write!(f, "Mismatch array lengths ({left} vs {right})")
            }
            RuntimeError::DuplicateJoinKey => {
                write!(f, "duplicate key in right side of equality join")
            }
            RuntimeError::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for length {len}")
            }
            RuntimeError::ArityMismatch { expected, got } => {
                write!(f, "expected {expected} arguments, got {got}")
            }
            RuntimeError::InvalidOpcodeForType { opcode, type_name } => {
                write!(f, "invalid opcode '{opcode}' for type {type_name}")
            }
            RuntimeError::ExpectedTypeOperand => {
                write!(f, "expected a Type operand, found a different operand kind")
            }
            RuntimeError::Io(msg) => write!(f, "I/O error: {msg}"),
            RuntimeError::CsvSchemaMismatch { expected, found } => {
                write!(f, "CSV header {found:?} does not match expected fields {expected:?}")
            }
            RuntimeError::CsvParse { row, column, value } => {
                write!(f, "row {row}: cannot parse {value:?} as column '{column}'")
            }
            RuntimeError::Exit(code) => write!(f, "exit({code})"),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// `spec.md` §7: runtime errors are reported to the caller prefixed
/// `Error:`. `Exit` is handled separately by the driver/evaluate boundary
/// and never rendered this way.
impl RuntimeError {
    pub fn user_message(&self) -> String {
        format!("Error: {self}")
    }
}
