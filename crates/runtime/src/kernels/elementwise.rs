//! Element-wise and reduction kernels.
//!
//! Every unary/binary element-wise kernel treats the integer nil sentinel
//! or `NaN` as missing and propagates it: the output slot is nil whenever
//! any input slot is nil (`spec.md` §4.3, §8).

use crate::error::RuntimeError;
use crate::program::{ArithOp, CmpOp, ReduceOp};
use vvm_core::{Scalar, VectorData, NIL_INT};

fn int_binop(op: ArithOp, a: i64, b: i64) -> i64 {
    match op {
        ArithOp::Add => a.wrapping_add(b),
        ArithOp::Sub => a.wrapping_sub(b),
        ArithOp::Mul => a.wrapping_mul(b),
        ArithOp::Div => {
            if b == 0 {
                NIL_INT
            } else {
                a.wrapping_div(b)
            }
        }
        ArithOp::Mod => {
            if b == 0 {
                NIL_INT
            } else {
                a.wrapping_rem(b)
            }
        }
    }
}

fn float_binop(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => a % b,
    }
}

/// Binary arithmetic on two scalars. Nil propagates (nil sentinel/NaN on
/// either side yields nil).
pub fn scalar_arith(op: ArithOp, a: &Scalar, b: &Scalar) -> Result<Scalar, RuntimeError> {
    match (a, b) {
        (Scalar::Int64(x), Scalar::Int64(y)) => {
            if *x == NIL_INT || *y == NIL_INT {
                Ok(Scalar::Int64(NIL_INT))
            } else {
                Ok(Scalar::Int64(int_binop(op, *x, *y)))
            }
        }
        (Scalar::Float64(x), Scalar::Float64(y)) => Ok(Scalar::Float64(float_binop(op, *x, *y))),
        (Scalar::Timedelta(x), Scalar::Timedelta(y)) if op == ArithOp::Add || op == ArithOp::Sub => {
            if *x == NIL_INT || *y == NIL_INT {
                Ok(Scalar::Timedelta(NIL_INT))
            } else {
                Ok(Scalar::Timedelta(int_binop(op, *x, *y)))
            }
        }
        (Scalar::Timestamp(x), Scalar::Timedelta(y)) if op == ArithOp::Add || op == ArithOp::Sub => {
            if *x == NIL_INT || *y == NIL_INT {
                Ok(Scalar::Timestamp(NIL_INT))
            } else {
                Ok(Scalar::Timestamp(int_binop(op, *x, *y)))
            }
        }
        (Scalar::Timestamp(x), Scalar::Timestamp(y)) if op == ArithOp::Sub => {
            if *x == NIL_INT || *y == NIL_INT {
                Ok(Scalar::Timedelta(NIL_INT))
            } else {
                Ok(Scalar::Timedelta(x.wrapping_sub(*y)))
            }
        }
        (Scalar::String(x), Scalar::String(y)) if op == ArithOp::Add => {
            Ok(Scalar::String(format!("{x}{y}")))
        }
        _ => Err(RuntimeError::InvalidOpcodeForType {
            opcode: "arith",
            type_name: format!("{:?}/{:?}", a.kind(), b.kind()),
        }),
    }
}

/// Element-wise binary arithmetic over two equal-length vectors.
pub fn vector_arith(op: ArithOp, a: &VectorData, b: &VectorData) -> Result<VectorData, RuntimeError> {
    require_equal_len(a.len(), b.len())?;
    let mut out = Vec::with_capacity(a.len());
    for i in 0..a.len() {
        out.push(scalar_arith(op, &a.get(i), &b.get(i))?);
    }
    Ok(pack(out))
}

/// Broadcast a scalar against every element of a vector.
pub fn vector_scalar_arith(op: ArithOp, a: &VectorData, b: &Scalar) -> Result<VectorData, RuntimeError> {
    let mut out = Vec::with_capacity(a.len());
    for i in 0..a.len() {
        out.push(scalar_arith(op, &a.get(i), b)?);
    }
    Ok(pack(out))
}

pub fn scalar_vector_arith(op: ArithOp, a: &Scalar, b: &VectorData) -> Result<VectorData, RuntimeError> {
    let mut out = Vec::with_capacity(b.len());
    for i in 0..b.len() {
        out.push(scalar_arith(op, a, &b.get(i))?);
    }
    Ok(pack(out))
}

fn pack(values: Vec<Scalar>) -> VectorData {
    let kind = values.first().map(|s| s.kind());
    let mut out = match kind {
        Some(k) => VectorData::empty_of(k),
        None => VectorData::Int64(Vec::new()),
    };
    for v in values {
        out.push(v);
    }
    out
}

fn require_equal_len(left: usize, right: usize) -> Result<(), RuntimeError> {
    if left != right {
        Err(RuntimeError::MismatchArrayLengths { left, right })
    } else {
        Ok(())
    }
}

fn cmp_result(op: CmpOp, ord: std::cmp::Ordering, eq: bool) -> bool {
    use std::cmp::Ordering::*;
    match op {
        CmpOp::Lt => ord == Less,
        CmpOp::Le => ord == Less || eq,
        CmpOp::Gt => ord == Greater,
        CmpOp::Ge => ord == Greater || eq,
        CmpOp::Eq => eq,
        CmpOp::Ne => !eq,
    }
}

/// Scalar comparison. Returns `None` (propagated as nil-bool = `false`,
/// per `spec.md` §9's Bool-has-no-sentinel resolution) when either side is
/// nil, except `Eq`/`Ne` which compare nil-ness directly.
pub fn scalar_compare(op: CmpOp, a: &Scalar, b: &Scalar) -> Result<bool, RuntimeError> {
    if matches!(op, CmpOp::Eq | CmpOp::Ne) {
        let eq = scalar_eq(a, b)?;
        return Ok(if op == CmpOp::Eq { eq } else { !eq });
    }
    if a.is_nil() || b.is_nil() {
        return Ok(false);
    }
    let ord = scalar_ord(a, b)?;
    Ok(cmp_result(op, ord, false))
}

fn scalar_eq(a: &Scalar, b: &Scalar) -> Result<bool, RuntimeError> {
    use Scalar::*;
    Ok(match (a, b) {
        (Bool(x), Bool(y)) => x == y,
        (Char(x), Char(y)) => x == y,
        (String(x), String(y)) => x == y,
        (Int64(x), Int64(y)) => x == y,
        (Float64(x), Float64(y)) => (x.is_nan() && y.is_nan()) || x == y,
        (Date(x), Date(y)) => x == y,
        (Time(x), Time(y)) => x == y,
        (Timestamp(x), Timestamp(y)) => x == y,
        (Timedelta(x), Timedelta(y)) => x == y,
        _ => {
            return Err(RuntimeError::InvalidOpcodeForType {
                opcode: "eq",
                type_name: format!("{:?}/{:?}", a.kind(), b.kind()),
            })
        }
    })
}

fn scalar_ord(a: &Scalar, b: &Scalar) -> Result<std::cmp::Ordering, RuntimeError> {
    use Scalar::*;
    match (a, b) {
        (Int64(x), Int64(y)) => Ok(x.cmp(y)),
        (Date(x), Date(y)) => Ok(x.cmp(y)),
        (Time(x), Time(y)) => Ok(x.cmp(y)),
        (Timestamp(x), Timestamp(y)) => Ok(x.cmp(y)),
        (Timedelta(x), Timedelta(y)) => Ok(x.cmp(y)),
        (Float64(x), Float64(y)) => x.partial_cmp(y).ok_or(RuntimeError::InvalidOpcodeForType {
            opcode: "cmp",
            type_name: "Float64".to_string(),
        }),
        (String(x), String(y)) => Ok(x.cmp(y)),
        (Char(x), Char(y)) => Ok(x.cmp(y)),
        (Bool(x), Bool(y)) => Ok(x.cmp(y)),
        _ => Err(RuntimeError::InvalidOpcodeForType {
            opcode: "cmp",
            type_name: format!("{:?}/{:?}", a.kind(), b.kind()),
        }),
    }
}

pub fn vector_compare(op: CmpOp, a: &VectorData, b: &VectorData) -> Result<Vec<bool>, RuntimeError> {
    require_equal_len(a.len(), b.len())?;
    (0..a.len()).map(|i| scalar_compare(op, &a.get(i), &b.get(i))).collect()
}

pub fn vector_scalar_compare(op: CmpOp, a: &VectorData, b: &Scalar) -> Result<Vec<bool>, RuntimeError> {
    (0..a.len()).map(|i| scalar_compare(op, &a.get(i), b)).collect()
}

pub fn scalar_vector_compare(op: CmpOp, a: &Scalar, b: &VectorData) -> Result<Vec<bool>, RuntimeError> {
    (0..b.len()).map(|i| scalar_compare(op, a, &b.get(i))).collect()
}

/// Reductions (`sum`/`prod`/`count`/`min`/`max`) skip nil inputs.
/// Identity: `sum([]) == 0`, `prod([]) == 1` (`spec.md` §8).
pub fn reduce(op: ReduceOp, v: &VectorData) -> Result<Scalar, RuntimeError> {
    match v {
        VectorData::Int64(xs) => {
            let present: Vec<i64> = xs.iter().copied().filter(|x| *x != NIL_INT).collect();
            Ok(Scalar::Int64(match op {
                ReduceOp::Sum => present.iter().sum(),
                ReduceOp::Prod => present.iter().product(),
                ReduceOp::Count => present.len() as i64,
                ReduceOp::Min => present.iter().copied().min().unwrap_or(NIL_INT),
                ReduceOp::Max => present.iter().copied().max().unwrap_or(NIL_INT),
            }))
        }
        VectorData::Float64(xs) => {
            let present: Vec<f64> = xs.iter().copied().filter(|x| !x.is_nan()).collect();
            Ok(Scalar::Float64(match op {
                ReduceOp::Sum => present.iter().sum(),
                ReduceOp::Prod => present.iter().product(),
                ReduceOp::Count => present.len() as f64,
                ReduceOp::Min => present.iter().copied().fold(f64::INFINITY, f64::min),
                ReduceOp::Max => present.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            }))
        }
        other => Err(RuntimeError::InvalidOpcodeForType {
            opcode: "reduce",
            type_name: format!("{:?}", other.kind()),
        }),
    }
}

trait EmptyOf {
    fn empty_of(kind: vvm_core::BuiltinKind) -> VectorData;
}

impl EmptyOf for VectorData {
    fn empty_of(kind: vvm_core::BuiltinKind) -> VectorData {
        use vvm_core::BuiltinKind::*;
        match kind {
            Bool => VectorData::Bool(Vec::new()),
            Char => VectorData::Char(Vec::new()),
            String => VectorData::String(Vec::new()),
            Int64 => VectorData::Int64(Vec::new()),
            Float64 => VectorData::Float64(Vec::new()),
            Date => VectorData::Date(Vec::new()),
            Time => VectorData::Time(Vec::new()),
            Timestamp => VectorData::Timestamp(Vec::new()),
            Timedelta => VectorData::Timedelta(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_identity_on_empty() {
        let empty = VectorData::Int64(vec![]);
        assert_eq!(reduce(ReduceOp::Sum, &empty).unwrap(), Scalar::Int64(0));
        assert_eq!(reduce(ReduceOp::Prod, &empty).unwrap(), Scalar::Int64(1));
    }

    #[test]
    fn arithmetic_propagates_nil() {
        let r = scalar_arith(ArithOp::Add, &Scalar::Int64(NIL_INT), &Scalar::Int64(3)).unwrap();
        assert_eq!(r, Scalar::Int64(NIL_INT));
    }

    #[test]
    fn vector_arith_requires_equal_length() {
        let xs = VectorData::Float64(vec![1.0, 2.0, 3.0]);
        let ys = VectorData::Float64(vec![2.0, 4.0]);
        let err = vector_arith(ArithOp::Mul, &xs, &ys).unwrap_err();
        assert!(matches!(err, RuntimeError::MismatchArrayLengths { .. }));
    }

    #[test]
    fn vector_scalar_broadcast_multiplies_every_element() {
        let xs = VectorData::Float64(vec![1.0, 2.0, 3.0]);
        let out = vector_scalar_arith(ArithOp::Mul, &xs, &Scalar::Float64(3.0)).unwrap();
        assert_eq!(out, VectorData::Float64(vec![3.0, 6.0, 9.0]));
    }

    #[test]
    fn reduce_skips_nil() {
        let xs = VectorData::Int64(vec![1, NIL_INT, 3]);
        assert_eq!(reduce(ReduceOp::Sum, &xs).unwrap(), Scalar::Int64(4));
        assert_eq!(reduce(ReduceOp::Count, &xs).unwrap(), Scalar::Int64(2));
    }
}
