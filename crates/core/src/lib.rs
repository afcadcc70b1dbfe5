//! Vector VM core: tagged type system, tagged operands and register values.
//!
//! This crate is the shared foundation underneath the Vector VM interpreter
//! ([`vvm_runtime`](../vvm_runtime)) and the semantic analyzer / code
//! generator ([`vvm_compiler`](../vvm_compiler)) — pure data types with no
//! evaluation logic, in the same role the teacher repo's `crates/core`
//! plays for its stack-based `Value`/`StackValue` model.
//!
//! # Modules
//!
//! - `type_code`: `TypeCode`, `BuiltinKind`, the builtin element-kind table.
//! - `user_type`: `UserDefinedType`, structural interning, Dataframe
//!   derivation/validation.
//! - `operand`: the tagged `Operand` wire format.
//! - `value`: `Scalar`, `VectorData`, `Dataframe`, `Value` — register
//!   contents.
//! - `error`: `TypeError`.

pub mod error;
pub mod operand;
pub mod type_code;
pub mod user_type;
pub mod value;

pub use error::TypeError;
pub use operand::{Operand, OperandKind};
pub use type_code::{BuiltinKind, Shape, TypeCode};
pub use user_type::{array_of, TypeDefError, TypeInterner, UserDefinedType};
pub use value::{Dataframe, Scalar, Value, VectorData, NIL_INT};
