//! Hand-rolled CSV load/store (`spec.md` §6). The format is deliberately
//! simple — comma-separated, no quoting, one header row of field names —
//! so this is not delegated to the `csv` crate; none of this pack's
//! examples reach for it either.

use crate::error::RuntimeError;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::fs;
use vvm_core::{BuiltinKind, Dataframe, Scalar, UserDefinedType, VectorData};

const EPOCH_DATE: fn() -> NaiveDate = || NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
const EPOCH_DATETIME: fn() -> NaiveDateTime = || EPOCH_DATE().and_hms_opt(0, 0, 0).unwrap();

fn field_kind(ty: &UserDefinedType, name: &str, idx: usize) -> Result<BuiltinKind, RuntimeError> {
    let (_, tc) = ty.fields.get(idx).ok_or_else(|| RuntimeError::Io(format!("no such column {name}")))?;
    tc.as_builtin()
        .map(|(kind, _)| kind)
        .ok_or_else(|| RuntimeError::Io(format!("column '{name}' is not a builtin-typed column")))
}

fn parse_cell(kind: BuiltinKind, row: usize, column: &str, cell: &str) -> Result<Scalar, RuntimeError> {
    if cell.is_empty() {
        return Ok(Scalar::nil(kind));
    }
    let bad = || RuntimeError::CsvParse { row, column: column.to_string(), value: cell.to_string() };
    Ok(match kind {
        BuiltinKind::Bool => Scalar::Bool(match cell {
            "true" => true,
            "false" => false,
            _ => return Err(bad()),
        }),
        BuiltinKind::Char => Scalar::Char(*cell.as_bytes().first().ok_or_else(bad)?),
        BuiltinKind::String => Scalar::String(cell.to_string()),
        BuiltinKind::Int64 => Scalar::Int64(cell.parse().map_err(|_| bad())?),
        BuiltinKind::Float64 => Scalar::Float64(cell.parse().map_err(|_| bad())?),
        BuiltinKind::Timedelta => Scalar::Timedelta(cell.parse().map_err(|_| bad())?),
        BuiltinKind::Date => {
            let d = NaiveDate::parse_from_str(cell, "%Y-%m-%d").map_err(|_| bad())?;
            Scalar::Date((d - EPOCH_DATE()).num_days())
        }
        BuiltinKind::Time => {
            let t = NaiveTime::parse_from_str(cell, "%H:%M:%S%.f").map_err(|_| bad())?;
            let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
            Scalar::Time((t - midnight).num_nanoseconds().ok_or_else(bad)?)
        }
        BuiltinKind::Timestamp => {
            let ts = NaiveDateTime::parse_from_str(cell, "%Y-%m-%dT%H:%M:%S%.f").map_err(|_| bad())?;
            Scalar::Timestamp((ts - EPOCH_DATETIME()).num_nanoseconds().ok_or_else(bad)?)
        }
    })
}

pub(crate) fn format_cell(s: &Scalar) -> String {
    if s.is_nil() {
        return String::new();
    }
    match s {
        Scalar::Bool(b) => b.to_string(),
        Scalar::Char(c) => (*c as char).to_string(),
        Scalar::String(v) => v.clone(),
        Scalar::Int64(n) => n.to_string(),
        Scalar::Float64(f) => f.to_string(),
        Scalar::Timedelta(n) => n.to_string(),
        Scalar::Date(days) => (EPOCH_DATE() + chrono::Duration::days(*days)).format("%Y-%m-%d").to_string(),
        Scalar::Time(ns) => {
            let midnight = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
            (midnight + chrono::Duration::nanoseconds(*ns)).format("%H:%M:%S%.9f").to_string()
        }
        Scalar::Timestamp(ns) => {
            (EPOCH_DATETIME() + chrono::Duration::nanoseconds(*ns)).format("%Y-%m-%dT%H:%M:%S%.9f").to_string()
        }
    }
}

pub fn load_csv(path: &str, ty: &UserDefinedType, df_type: vvm_core::TypeCode) -> Result<Dataframe, RuntimeError> {
    let text = fs::read_to_string(path).map_err(|e| RuntimeError::Io(e.to_string()))?;
    let mut lines = text.lines();
    let header = lines.next().unwrap_or("");
    let found: Vec<String> = header.split(',').map(|s| s.to_string()).collect();
    let expected: Vec<String> = ty.fields.iter().map(|(n, _)| n.clone()).collect();
    if found != expected {
        return Err(RuntimeError::CsvSchemaMismatch { expected, found });
    }

    let kinds: Vec<BuiltinKind> = (0..expected.len())
        .map(|i| field_kind(ty, &expected[i], i))
        .collect::<Result<_, _>>()?;
    let mut columns: Vec<VectorData> = kinds.iter().map(|k| vector_seed(Scalar::nil(*k).type_code())).collect();

    for (row, line) in lines.enumerate() {
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() != expected.len() {
            return Err(RuntimeError::CsvParse {
                row,
                column: "<row>".to_string(),
                value: line.to_string(),
            });
        }
        for (i, cell) in cells.iter().enumerate() {
            let scalar = parse_cell(kinds[i], row, &expected[i], cell)?;
            columns[i].push(scalar);
        }
    }

    Ok(Dataframe { type_code: df_type, columns })
}

fn vector_seed(tc: vvm_core::TypeCode) -> VectorData {
    match tc.as_builtin().map(|(k, _)| k) {
        Some(BuiltinKind::Bool) => VectorData::Bool(Vec::new()),
        Some(BuiltinKind::Char) => VectorData::Char(Vec::new()),
        Some(BuiltinKind::String) => VectorData::String(Vec::new()),
        Some(BuiltinKind::Int64) => VectorData::Int64(Vec::new()),
        Some(BuiltinKind::Float64) => VectorData::Float64(Vec::new()),
        Some(BuiltinKind::Date) => VectorData::Date(Vec::new()),
        Some(BuiltinKind::Time) => VectorData::Time(Vec::new()),
        Some(BuiltinKind::Timestamp) => VectorData::Timestamp(Vec::new()),
        Some(BuiltinKind::Timedelta) => VectorData::Timedelta(Vec::new()),
        None => unreachable!("scalar type codes are always builtin"),
    }
}

pub fn store_csv(path: &str, df: &Dataframe, ty: &UserDefinedType) -> Result<(), RuntimeError> {
    let mut out = ty.fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(",");
    out.push('\n');
    for row in 0..df.row_count() {
        let cells: Vec<String> = df.columns.iter().map(|c| format_cell(&c.get(row))).collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    fs::write(path, out).map_err(|e| RuntimeError::Io(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;
    use vvm_core::{Shape, TypeCode};

    fn ty() -> UserDefinedType {
        UserDefinedType {
            name: "!Trade".to_string(),
            fields: vec![
                ("sym".to_string(), TypeCode::builtin(BuiltinKind::String, Shape::Vector)),
                ("price".to_string(), TypeCode::builtin(BuiltinKind::Float64, Shape::Vector)),
            ],
        }
    }

    #[test]
    fn round_trips_through_store_and_load() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        let df = Dataframe {
            type_code: TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar),
            columns: vec![
                VectorData::String(vec!["AAPL".to_string(), "".to_string()]),
                VectorData::Float64(vec![1.5, f64::NAN]),
            ],
        };
        store_csv(path, &df, &ty()).unwrap();
        let loaded = load_csv(path, &ty(), TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar)).unwrap();
        assert_eq!(loaded.columns[0], VectorData::String(vec!["AAPL".to_string(), "".to_string()]));
        match &loaded.columns[1] {
            VectorData::Float64(xs) => {
                assert_eq!(xs[0], 1.5);
                assert!(xs[1].is_nan());
            }
            other => panic!("expected Float64, got {other:?}"),
        }
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();
        fs::write(path, "nope,price\nAAPL,1.0\n").unwrap();
        let err = load_csv(path, &ty(), TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar)).unwrap_err();
        assert!(matches!(err, RuntimeError::CsvSchemaMismatch { .. }));
    }
}
