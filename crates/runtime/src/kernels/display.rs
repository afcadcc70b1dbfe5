//! Row-wise `repr`/`print` rendering (`spec.md` §6): scalars print their
//! literal, vectors cap at 25 elements with numeric columns right-justified,
//! Dataframes print row-wise and truncate to the console height.

use super::csv::format_cell;
use vvm_core::{BuiltinKind, Dataframe, Scalar, UserDefinedType, Value, VectorData};

const MAX_VECTOR_ELEMENTS: usize = 25;

fn is_numeric(kind: BuiltinKind) -> bool {
    matches!(
        kind,
        BuiltinKind::Int64 | BuiltinKind::Float64 | BuiltinKind::Date | BuiltinKind::Time | BuiltinKind::Timestamp | BuiltinKind::Timedelta
    )
}

fn justify(cells: &[String], numeric: bool) -> Vec<String> {
    let width = cells.iter().map(|c| c.len()).max().unwrap_or(0);
    cells
        .iter()
        .map(|c| if numeric { format!("{c:>width$}") } else { c.clone() })
        .collect()
}

pub fn format_scalar(s: &Scalar) -> String {
    format_cell(s)
}

/// Renders up to [`MAX_VECTOR_ELEMENTS`] entries, space-separated, numeric
/// columns right-justified to their widest rendered element; longer vectors
/// are truncated with a trailing `...`.
pub fn format_vector(v: &VectorData) -> String {
    let shown = v.len().min(MAX_VECTOR_ELEMENTS);
    let cells: Vec<String> = (0..shown).map(|i| format_cell(&v.get(i))).collect();
    let justified = justify(&cells, is_numeric(v.kind()));
    let mut out = justified.join(" ");
    if v.len() > MAX_VECTOR_ELEMENTS {
        out.push_str(" ...");
    }
    out
}

/// Row-wise table rendering: a header of field names, one line per row (up
/// to `console_height` rows total including the header), with each numeric
/// column independently right-justified.
pub fn format_dataframe(df: &Dataframe, ty: &UserDefinedType, console_height: usize) -> String {
    let visible_rows = console_height.saturating_sub(1).max(1);
    let rows_shown = df.row_count().min(visible_rows);

    let columns: Vec<Vec<String>> = df
        .columns
        .iter()
        .map(|col| {
            let cells: Vec<String> = (0..rows_shown).map(|r| format_cell(&col.get(r))).collect();
            justify(&cells, is_numeric(col.kind()))
        })
        .collect();

    let mut lines = Vec::with_capacity(rows_shown + 2);
    lines.push(ty.fields.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>().join(" "));
    for row in 0..rows_shown {
        let cells: Vec<&str> = columns.iter().map(|c| c[row].as_str()).collect();
        lines.push(cells.join(" "));
    }
    if df.row_count() > rows_shown {
        lines.push("...".to_string());
    }
    lines.join("\n")
}

/// `repr` for any register value; Dataframes need their type resolved
/// through the interner to label columns, so the caller passes it in.
pub fn format_value(value: &Value, df_type: Option<&UserDefinedType>, console_height: usize) -> String {
    match value {
        Value::Scalar(s) => format_scalar(s),
        Value::Vector(v) => format_vector(v),
        Value::Dataframe(df) => {
            let ty = df_type.expect("Dataframe repr requires its resolved UserDefinedType");
            format_dataframe(df, ty, console_height)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vvm_core::{Shape, TypeCode, NIL_INT};

    #[test]
    fn float_display_trims_trailing_zeros() {
        assert_eq!(format_scalar(&Scalar::Float64(2.0)), "2");
        assert_eq!(format_scalar(&Scalar::Float64(1.5)), "1.5");
    }

    #[test]
    fn nil_scalars_render_empty() {
        assert_eq!(format_scalar(&Scalar::Int64(NIL_INT)), "");
        assert_eq!(format_scalar(&Scalar::Float64(f64::NAN)), "");
    }

    #[test]
    fn vector_truncates_past_cap() {
        let v = VectorData::Int64((0..30).collect());
        let rendered = format_vector(&v);
        assert!(rendered.ends_with("..."));
        assert_eq!(rendered.split_whitespace().count(), MAX_VECTOR_ELEMENTS + 1);
    }

    #[test]
    fn dataframe_truncates_to_console_height() {
        let ty = UserDefinedType {
            name: "!Row".to_string(),
            fields: vec![("n".to_string(), TypeCode::builtin(BuiltinKind::Int64, Shape::Vector))],
        };
        let df = Dataframe {
            type_code: TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar),
            columns: vec![VectorData::Int64(vec![1, 2, 3, 4, 5])],
        };
        let rendered = format_dataframe(&df, &ty, 3);
        assert_eq!(rendered.lines().count(), 4); // header + 2 rows + "..."
    }
}
