//! User-defined record types and their interner.

use crate::type_code::{Shape, TypeCode};
use std::collections::HashMap;
use std::fmt;

/// An ordered list of named fields, the payload of a `data` definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserDefinedType {
    pub name: String,
    pub fields: Vec<(String, TypeCode)>,
}

impl UserDefinedType {
    pub fn field_type(&self, name: &str) -> Option<TypeCode> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    /// The signature used for structural interning: field list only, the
    /// name never participates (two differently-named types with the same
    /// fields are still the same `TypeCode` — uniqueness is structural).
    fn signature(&self) -> &[(String, TypeCode)] {
        &self.fields
    }

    pub fn is_dataframe(&self) -> bool {
        self.name.starts_with('!')
    }
}

#[derive(Debug)]
pub enum TypeDefError {
    /// A Dataframe type's fields don't match `array(parent field)` for some
    /// parent field, or the field names/arity differ from the parent.
    InvalidDataframeShape { dataframe: String, parent: String },
    /// Attempted to array-ise a field whose type has no vector form.
    NotArrayable(TypeCode),
}

impl fmt::Display for TypeDefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDefError::InvalidDataframeShape { dataframe, parent } => write!(
                f,
                "Dataframe type '{dataframe}' is not a valid array-ised form of '{parent}'"
            ),
            TypeDefError::NotArrayable(tc) => {
                write!(f, "type {tc:?} has no vector form to build a Dataframe column from")
            }
        }
    }
}

impl std::error::Error for TypeDefError {}

/// Process-local (here: per-[`Session`](crate::Session)) interner for
/// user-defined types, keyed structurally on field signature so that two
/// `data` definitions with identical ordered fields resolve to the same
/// [`TypeCode`]. Interning never retracts entries.
#[derive(Debug, Default)]
pub struct TypeInterner {
    defs: Vec<UserDefinedType>,
    by_signature: HashMap<Vec<(String, TypeCode)>, u32>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a user-defined type, returning its `TypeCode`. If a type with
    /// the same ordered field signature already exists, its code is reused
    /// (even if `name` differs — re-declaring under a new name does not
    /// mint a new code).
    pub fn intern(&mut self, def: UserDefinedType) -> TypeCode {
        if let Some(&idx) = self.by_signature.get(def.signature()) {
            return TypeCode::user_defined(idx);
        }
        let idx = self.defs.len() as u32;
        self.by_signature.insert(def.signature().to_vec(), idx);
        self.defs.push(def);
        TypeCode::user_defined(idx)
    }

    pub fn get(&self, code: TypeCode) -> Option<&UserDefinedType> {
        let idx = code.as_user_defined_index()?;
        self.defs.get(idx as usize)
    }

    /// Build and intern the Dataframe type for a scalar record type: every
    /// field is array-ised, the name is prefixed with `!`.
    pub fn intern_dataframe_of(&mut self, scalar: TypeCode) -> Result<TypeCode, TypeDefError> {
        let scalar_def = self
            .get(scalar)
            .expect("scalar record type must already be interned")
            .clone();
        let mut fields = Vec::with_capacity(scalar_def.fields.len());
        for (name, field_ty) in &scalar_def.fields {
            fields.push((name.clone(), array_of(*field_ty)?));
        }
        let df = UserDefinedType {
            name: format!("!{}", scalar_def.name),
            fields,
        };
        Ok(self.intern(df))
    }

    /// Verify that `dataframe` is a structurally valid array-ised form of
    /// `scalar`: same field names, same arity, each Dataframe field type
    /// equals the array-of-parent-field type.
    pub fn validate_dataframe(
        &self,
        dataframe: TypeCode,
        scalar: TypeCode,
    ) -> Result<(), TypeDefError> {
        let df = self.get(dataframe).expect("dataframe type must be interned");
        let sc = self.get(scalar).expect("scalar type must be interned");
        if df.fields.len() != sc.fields.len() {
            return Err(TypeDefError::InvalidDataframeShape {
                dataframe: df.name.clone(),
                parent: sc.name.clone(),
            });
        }
        for ((df_name, df_ty), (sc_name, sc_ty)) in df.fields.iter().zip(sc.fields.iter()) {
            if df_name != sc_name {
                return Err(TypeDefError::InvalidDataframeShape {
                    dataframe: df.name.clone(),
                    parent: sc.name.clone(),
                });
            }
            let expected = array_of(*sc_ty).map_err(|_| TypeDefError::InvalidDataframeShape {
                dataframe: df.name.clone(),
                parent: sc.name.clone(),
            })?;
            if expected != *df_ty {
                return Err(TypeDefError::InvalidDataframeShape {
                    dataframe: df.name.clone(),
                    parent: sc.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The vector form of a builtin type code. User-defined field types have no
/// vector form in this data model (Dataframe columns are always builtin
/// vectors).
pub fn array_of(ty: TypeCode) -> Result<TypeCode, TypeDefError> {
    match ty.as_builtin() {
        Some((kind, Shape::Scalar)) => Ok(TypeCode::builtin(kind, Shape::Vector)),
        Some((kind, Shape::Vector)) => Ok(TypeCode::builtin(kind, Shape::Vector)),
        None => Err(TypeDefError::NotArrayable(ty)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::type_code::BuiltinKind;

    fn person() -> UserDefinedType {
        UserDefinedType {
            name: "Person".to_string(),
            fields: vec![
                ("name".to_string(), TypeCode::builtin(BuiltinKind::String, Shape::Scalar)),
                ("age".to_string(), TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar)),
            ],
        }
    }

    #[test]
    fn identical_fields_intern_to_same_code() {
        let mut interner = TypeInterner::new();
        let a = interner.intern(person());
        let mut renamed = person();
        renamed.name = "Human".to_string();
        let b = interner.intern(renamed);
        assert_eq!(a, b);
    }

    #[test]
    fn dataframe_name_and_shape() {
        let mut interner = TypeInterner::new();
        let scalar = interner.intern(person());
        let df = interner.intern_dataframe_of(scalar).unwrap();
        let df_def = interner.get(df).unwrap();
        assert_eq!(df_def.name, "!Person");
        assert!(df_def.is_dataframe());
        for (_, ty) in &df_def.fields {
            assert!(ty.is_vector());
        }
        interner.validate_dataframe(df, scalar).unwrap();
    }

    #[test]
    fn reordered_fields_are_a_distinct_type() {
        let mut interner = TypeInterner::new();
        let a = interner.intern(person());
        let mut reordered = person();
        reordered.fields.swap(0, 1);
        let b = interner.intern(reordered);
        assert_ne!(a, b);
    }
}
