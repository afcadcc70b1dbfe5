//! Tagged type codes.
//!
//! A [`TypeCode`] is a tagged non-negative integer: the low bit distinguishes
//! `BuiltIn` from `UserDefined`, the remaining bits index either the fixed
//! builtin table (this module) or a process-local definition map
//! ([`crate::interner::TypeInterner`]).

use std::fmt;

/// The nine builtin element kinds, each with a scalar and a vector form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinKind {
    Bool,
    Char,
    String,
    Int64,
    Float64,
    Date,
    Time,
    Timestamp,
    Timedelta,
}

impl BuiltinKind {
    pub const ALL: [BuiltinKind; 9] = [
        BuiltinKind::Bool,
        BuiltinKind::Char,
        BuiltinKind::String,
        BuiltinKind::Int64,
        BuiltinKind::Float64,
        BuiltinKind::Date,
        BuiltinKind::Time,
        BuiltinKind::Timestamp,
        BuiltinKind::Timedelta,
    ];

    fn index(self) -> u32 {
        match self {
            BuiltinKind::Bool => 0,
            BuiltinKind::Char => 1,
            BuiltinKind::String => 2,
            BuiltinKind::Int64 => 3,
            BuiltinKind::Float64 => 4,
            BuiltinKind::Date => 5,
            BuiltinKind::Time => 6,
            BuiltinKind::Timestamp => 7,
            BuiltinKind::Timedelta => 8,
        }
    }

    fn from_index(idx: u32) -> Option<BuiltinKind> {
        Self::ALL.get(idx as usize).copied()
    }

    /// Display name, as used in diagnostics and `type_of`.
    pub fn name(self) -> &'static str {
        match self {
            BuiltinKind::Bool => "Bool",
            BuiltinKind::Char => "Char",
            BuiltinKind::String => "String",
            BuiltinKind::Int64 => "Int64",
            BuiltinKind::Float64 => "Float64",
            BuiltinKind::Date => "Date",
            BuiltinKind::Time => "Time",
            BuiltinKind::Timestamp => "Timestamp",
            BuiltinKind::Timedelta => "Timedelta",
        }
    }

    /// Whether the element kind is `Int64`-backed (nil = `i64::MIN`) rather
    /// than using its own sentinel.
    pub fn nil_is_min_int64(self) -> bool {
        matches!(
            self,
            BuiltinKind::Int64
                | BuiltinKind::Date
                | BuiltinKind::Time
                | BuiltinKind::Timestamp
                | BuiltinKind::Timedelta
        )
    }

    /// Whether the element kind's nil is `NaN`.
    pub fn nil_is_nan(self) -> bool {
        matches!(self, BuiltinKind::Float64)
    }
}

/// Whether a [`TypeCode`] denotes the scalar or the vector form of an
/// element kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Vector,
}

/// A tagged non-negative integer naming a type: either a builtin
/// (kind, shape) pair or an index into a [`crate::interner::TypeInterner`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode(u32);

impl TypeCode {
    pub fn builtin(kind: BuiltinKind, shape: Shape) -> TypeCode {
        let shape_bit = match shape {
            Shape::Scalar => 0,
            Shape::Vector => 1,
        };
        let payload = kind.index() * 2 + shape_bit;
        TypeCode(payload << 1)
    }

    pub fn user_defined(index: u32) -> TypeCode {
        TypeCode((index << 1) | 1)
    }

    pub fn is_builtin(self) -> bool {
        self.0 & 1 == 0
    }

    pub fn is_user_defined(self) -> bool {
        !self.is_builtin()
    }

    /// Decode as `(kind, shape)` if this is a builtin type code.
    pub fn as_builtin(self) -> Option<(BuiltinKind, Shape)> {
        if !self.is_builtin() {
            return None;
        }
        let payload = self.0 >> 1;
        let shape = if payload & 1 == 0 {
            Shape::Scalar
        } else {
            Shape::Vector
        };
        BuiltinKind::from_index(payload >> 1).map(|k| (k, shape))
    }

    /// Decode as an index into the user-defined definition map.
    pub fn as_user_defined_index(self) -> Option<u32> {
        if self.is_user_defined() {
            Some(self.0 >> 1)
        } else {
            None
        }
    }

    /// Raw wire representation, for embedding in a `Type` [`crate::operand::Operand`].
    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> TypeCode {
        TypeCode(raw)
    }

    pub fn shape(self) -> Shape {
        match self.as_builtin() {
            Some((_, shape)) => shape,
            None => Shape::Scalar,
        }
    }

    pub fn is_vector(self) -> bool {
        matches!(self.shape(), Shape::Vector)
    }
}

impl fmt::Debug for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_builtin() {
            Some((kind, Shape::Scalar)) => write!(f, "TypeCode({})", kind.name()),
            Some((kind, Shape::Vector)) => write!(f, "TypeCode([{}])", kind.name()),
            None => write!(f, "TypeCode(user#{})", self.as_user_defined_index().unwrap()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_round_trips() {
        for kind in BuiltinKind::ALL {
            for shape in [Shape::Scalar, Shape::Vector] {
                let tc = TypeCode::builtin(kind, shape);
                assert!(tc.is_builtin());
                assert_eq!(tc.as_builtin(), Some((kind, shape)));
            }
        }
    }

    #[test]
    fn user_defined_round_trips() {
        let tc = TypeCode::user_defined(42);
        assert!(tc.is_user_defined());
        assert_eq!(tc.as_user_defined_index(), Some(42));
    }

    #[test]
    fn distinct_shapes_are_distinct_codes() {
        let scalar = TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar);
        let vector = TypeCode::builtin(BuiltinKind::Int64, Shape::Vector);
        assert_ne!(scalar, vector);
    }
}
