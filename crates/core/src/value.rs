//! Register values: scalars, columnar vectors, and Dataframes.
//!
//! Every register holds one of: a scalar of any builtin element kind, a
//! vector of a builtin element kind, or a Dataframe (a fixed-length ordered
//! list of column registers). `Date`/`Time`/`Timestamp`/`Timedelta` are all
//! stored as `i64` (days-since-epoch, nanoseconds-since-midnight,
//! nanoseconds-since-epoch, nanoseconds respectively) and share the
//! `i64::MIN` nil sentinel with plain `Int64`.

use crate::type_code::{BuiltinKind, Shape, TypeCode};
use std::fmt;

/// `i64::MIN` is the nil sentinel for every integer-backed element kind
/// (`Int64`, `Date`, `Time`, `Timestamp`, `Timedelta`).
pub const NIL_INT: i64 = i64::MIN;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(u8),
    String(String),
    Int64(i64),
    Float64(f64),
    Date(i64),
    Time(i64),
    Timestamp(i64),
    Timedelta(i64),
}

impl Scalar {
    pub fn kind(&self) -> BuiltinKind {
        match self {
            Scalar::Bool(_) => BuiltinKind::Bool,
            Scalar::Char(_) => BuiltinKind::Char,
            Scalar::String(_) => BuiltinKind::String,
            Scalar::Int64(_) => BuiltinKind::Int64,
            Scalar::Float64(_) => BuiltinKind::Float64,
            Scalar::Date(_) => BuiltinKind::Date,
            Scalar::Time(_) => BuiltinKind::Time,
            Scalar::Timestamp(_) => BuiltinKind::Timestamp,
            Scalar::Timedelta(_) => BuiltinKind::Timedelta,
        }
    }

    pub fn type_code(&self) -> TypeCode {
        TypeCode::builtin(self.kind(), Shape::Scalar)
    }

    /// The nil value for `kind`. `Bool`'s nil is `false` and `Char`'s nil is
    /// the NUL byte — neither kind has a bit pattern left over for a
    /// distinct sentinel, so (per `spec.md` §9 open questions) nil is
    /// defined as the kind's zero value. `String`'s nil is the empty
    /// string, matching the CSV format's "missing cell -> empty string"
    /// rule in `spec.md` §6.
    pub fn nil(kind: BuiltinKind) -> Scalar {
        match kind {
            BuiltinKind::Bool => Scalar::Bool(false),
            BuiltinKind::Char => Scalar::Char(0),
            BuiltinKind::String => Scalar::String(String::new()),
            BuiltinKind::Int64 => Scalar::Int64(NIL_INT),
            BuiltinKind::Float64 => Scalar::Float64(f64::NAN),
            BuiltinKind::Date => Scalar::Date(NIL_INT),
            BuiltinKind::Time => Scalar::Time(NIL_INT),
            BuiltinKind::Timestamp => Scalar::Timestamp(NIL_INT),
            BuiltinKind::Timedelta => Scalar::Timedelta(NIL_INT),
        }
    }

    pub fn is_nil(&self) -> bool {
        match self {
            Scalar::Bool(b) => !*b,
            Scalar::Char(c) => *c == 0,
            Scalar::String(s) => s.is_empty(),
            Scalar::Int64(n) => *n == NIL_INT,
            Scalar::Float64(f) => f.is_nan(),
            Scalar::Date(n) | Scalar::Time(n) | Scalar::Timestamp(n) | Scalar::Timedelta(n) => {
                *n == NIL_INT
            }
        }
    }
}

/// A column: a homogeneous, flat vector of one builtin element kind.
#[derive(Debug, Clone, PartialEq)]
pub enum VectorData {
    Bool(Vec<bool>),
    Char(Vec<u8>),
    String(Vec<String>),
    Int64(Vec<i64>),
    Float64(Vec<f64>),
    Date(Vec<i64>),
    Time(Vec<i64>),
    Timestamp(Vec<i64>),
    Timedelta(Vec<i64>),
}

impl VectorData {
    pub fn kind(&self) -> BuiltinKind {
        match self {
            VectorData::Bool(_) => BuiltinKind::Bool,
            VectorData::Char(_) => BuiltinKind::Char,
            VectorData::String(_) => BuiltinKind::String,
            VectorData::Int64(_) => BuiltinKind::Int64,
            VectorData::Float64(_) => BuiltinKind::Float64,
            VectorData::Date(_) => BuiltinKind::Date,
            VectorData::Time(_) => BuiltinKind::Time,
            VectorData::Timestamp(_) => BuiltinKind::Timestamp,
            VectorData::Timedelta(_) => BuiltinKind::Timedelta,
        }
    }

    pub fn type_code(&self) -> TypeCode {
        TypeCode::builtin(self.kind(), Shape::Vector)
    }

    pub fn len(&self) -> usize {
        match self {
            VectorData::Bool(v) => v.len(),
            VectorData::Char(v) => v.len(),
            VectorData::String(v) => v.len(),
            VectorData::Int64(v) => v.len(),
            VectorData::Float64(v) => v.len(),
            VectorData::Date(v) => v.len(),
            VectorData::Time(v) => v.len(),
            VectorData::Timestamp(v) => v.len(),
            VectorData::Timedelta(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn empty_like(&self) -> VectorData {
        match self {
            VectorData::Bool(_) => VectorData::Bool(Vec::new()),
            VectorData::Char(_) => VectorData::Char(Vec::new()),
            VectorData::String(_) => VectorData::String(Vec::new()),
            VectorData::Int64(_) => VectorData::Int64(Vec::new()),
            VectorData::Float64(_) => VectorData::Float64(Vec::new()),
            VectorData::Date(_) => VectorData::Date(Vec::new()),
            VectorData::Time(_) => VectorData::Time(Vec::new()),
            VectorData::Timestamp(_) => VectorData::Timestamp(Vec::new()),
            VectorData::Timedelta(_) => VectorData::Timedelta(Vec::new()),
        }
    }

    pub fn get(&self, i: usize) -> Scalar {
        match self {
            VectorData::Bool(v) => Scalar::Bool(v[i]),
            VectorData::Char(v) => Scalar::Char(v[i]),
            VectorData::String(v) => Scalar::String(v[i].clone()),
            VectorData::Int64(v) => Scalar::Int64(v[i]),
            VectorData::Float64(v) => Scalar::Float64(v[i]),
            VectorData::Date(v) => Scalar::Date(v[i]),
            VectorData::Time(v) => Scalar::Time(v[i]),
            VectorData::Timestamp(v) => Scalar::Timestamp(v[i]),
            VectorData::Timedelta(v) => Scalar::Timedelta(v[i]),
        }
    }

    pub fn push(&mut self, value: Scalar) {
        match (self, value) {
            (VectorData::Bool(v), Scalar::Bool(b)) => v.push(b),
            (VectorData::Char(v), Scalar::Char(c)) => v.push(c),
            (VectorData::String(v), Scalar::String(s)) => v.push(s),
            (VectorData::Int64(v), Scalar::Int64(n)) => v.push(n),
            (VectorData::Float64(v), Scalar::Float64(f)) => v.push(f),
            (VectorData::Date(v), Scalar::Date(n)) => v.push(n),
            (VectorData::Time(v), Scalar::Time(n)) => v.push(n),
            (VectorData::Timestamp(v), Scalar::Timestamp(n)) => v.push(n),
            (VectorData::Timedelta(v), Scalar::Timedelta(n)) => v.push(n),
            (v, s) => panic!("push: element kind mismatch ({:?} into {:?})", s.kind(), v.kind()),
        }
    }

    /// Narrow by an index vector; `-1` at a position yields nil for that
    /// row (used by `multidx`/unmatched-join results).
    pub fn take_indices(&self, indices: &[i64]) -> VectorData {
        let mut out = self.empty_like();
        for &i in indices {
            if i < 0 {
                out.push(Scalar::nil(self.kind()));
            } else {
                out.push(self.get(i as usize));
            }
        }
        out
    }

    /// Narrow by a boolean mask of equal length (`where`).
    pub fn take_mask(&self, mask: &[bool]) -> VectorData {
        let mut out = self.empty_like();
        for (i, keep) in mask.iter().enumerate() {
            if *keep {
                out.push(self.get(i));
            }
        }
        out
    }

    pub fn concat(&self, other: &VectorData) -> VectorData {
        let mut out = self.clone();
        for i in 0..other.len() {
            out.push(other.get(i));
        }
        out
    }
}

/// A Dataframe value: an ordered list of equal-length columns, matching the
/// field order of its (interned, `!`-prefixed) user-defined type.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataframe {
    pub type_code: TypeCode,
    pub columns: Vec<VectorData>,
}

impl Dataframe {
    pub fn row_count(&self) -> usize {
        self.columns.first().map(VectorData::len).unwrap_or(0)
    }

    pub fn column(&self, index: usize) -> &VectorData {
        &self.columns[index]
    }
}

/// The contents of a register: a scalar, a vector, or a Dataframe.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    Vector(VectorData),
    Dataframe(Dataframe),
}

impl Value {
    pub fn type_code(&self) -> TypeCode {
        match self {
            Value::Scalar(s) => s.type_code(),
            Value::Vector(v) => v.type_code(),
            Value::Dataframe(df) => df.type_code,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&VectorData> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dataframe(&self) -> Option<&Dataframe> {
        match self {
            Value::Dataframe(df) => Some(df),
            _ => None,
        }
    }
}

impl fmt::Display for BuiltinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_sentinels_round_trip_is_nil() {
        for kind in BuiltinKind::ALL {
            assert!(Scalar::nil(kind).is_nil(), "{kind:?} nil should report is_nil");
        }
        assert!(!Scalar::Int64(5).is_nil());
        assert!(!Scalar::Float64(1.5).is_nil());
    }

    #[test]
    fn take_indices_maps_negative_to_nil() {
        let v = VectorData::Int64(vec![10, 20, 30]);
        let taken = v.take_indices(&[2, -1, 0]);
        assert_eq!(taken, VectorData::Int64(vec![30, NIL_INT, 10]));
    }

    #[test]
    fn take_mask_filters() {
        let v = VectorData::String(vec!["a".into(), "b".into(), "c".into()]);
        let taken = v.take_mask(&[true, false, true]);
        assert_eq!(taken, VectorData::String(vec!["a".into(), "c".into()]));
    }
}
