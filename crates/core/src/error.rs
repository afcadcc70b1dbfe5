//! Shared type-system error, hand-rolled rather than pulled from
//! `thiserror`/`anyhow` — matching the teacher's `codegen/error.rs` style of
//! a small enum with a manual `Display`/`Error` impl.

use crate::type_code::TypeCode;
use std::fmt;

#[derive(Debug)]
pub enum TypeError {
    FieldNotFound { type_name: String, field: String },
    NotArrayable(TypeCode),
    DataframeShapeMismatch { dataframe: String, parent: String },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::FieldNotFound { type_name, field } => {
                write!(f, "type '{type_name}' has no field '{field}'")
            }
            TypeError::NotArrayable(tc) => {
                write!(f, "type {tc:?} cannot be array-ised into a Dataframe column")
            }
            TypeError::DataframeShapeMismatch { dataframe, parent } => write!(
                f,
                "Dataframe type '{dataframe}' does not match its scalar parent '{parent}'"
            ),
        }
    }
}

impl std::error::Error for TypeError {}

impl From<crate::user_type::TypeDefError> for TypeError {
    fn from(e: crate::user_type::TypeDefError) -> Self {
        match e {
            crate::user_type::TypeDefError::InvalidDataframeShape { dataframe, parent } => {
                TypeError::DataframeShapeMismatch { dataframe, parent }
            }
            crate::user_type::TypeDefError::NotArrayable(tc) => TypeError::NotArrayable(tc),
        }
    }
}
