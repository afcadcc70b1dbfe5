//! Table kernels: categorise, group, equality match, the asof family,
//! multidx, where, stable multi-key sort, take and concat (`spec.md` §4.3).

use crate::error::RuntimeError;
use crate::program::AsofDirection;
use std::cmp::Ordering;
use std::collections::HashMap;
use vvm_core::{Dataframe, Scalar, TypeCode, UserDefinedType, VectorData, NIL_INT};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum KeyPart {
    Bool(bool),
    Char(u8),
    Str(String),
    Int(i64),
    FloatBits(u64),
}

fn key_part(s: Scalar) -> KeyPart {
    match s {
        Scalar::Bool(b) => KeyPart::Bool(b),
        Scalar::Char(c) => KeyPart::Char(c),
        Scalar::String(s) => KeyPart::Str(s),
        Scalar::Int64(n) => KeyPart::Int(n),
        Scalar::Float64(f) => KeyPart::FloatBits(f.to_bits()),
        Scalar::Date(n) | Scalar::Time(n) | Scalar::Timestamp(n) | Scalar::Timedelta(n) => {
            KeyPart::Int(n)
        }
    }
}

fn column_keys(col: &VectorData) -> Vec<KeyPart> {
    (0..col.len()).map(|i| key_part(col.get(i))).collect()
}

/// Assign dense, first-seen-order label ids to a single column of keys.
fn dense_labels_single(keys: Vec<KeyPart>) -> (Vec<i64>, usize) {
    let mut map: HashMap<KeyPart, i64> = HashMap::new();
    let mut labels = Vec::with_capacity(keys.len());
    for k in keys {
        let next = map.len() as i64;
        let id = *map.entry(k).or_insert(next);
        labels.push(id);
    }
    (labels, map.len())
}

/// Same, but assigning ids across `left` then `right` from one shared map
/// (`spec.md` §4.3 "two-table form returns labels for both sides against a
/// shared id space").
fn dense_labels_joint(left: Vec<KeyPart>, right: Vec<KeyPart>) -> (Vec<i64>, Vec<i64>, usize) {
    let mut map: HashMap<KeyPart, i64> = HashMap::new();
    let mut left_labels = Vec::with_capacity(left.len());
    for k in left {
        let next = map.len() as i64;
        left_labels.push(*map.entry(k).or_insert(next));
    }
    let mut right_labels = Vec::with_capacity(right.len());
    for k in right {
        let next = map.len() as i64;
        right_labels.push(*map.entry(k).or_insert(next));
    }
    (left_labels, right_labels, map.len())
}

fn recompact_single(combined: &[i64]) -> (Vec<i64>, usize) {
    dense_labels_single(combined.iter().map(|&x| KeyPart::Int(x)).collect())
}

fn recompact_joint(left: &[i64], right: &[i64]) -> (Vec<i64>, Vec<i64>, usize) {
    dense_labels_joint(
        left.iter().map(|&x| KeyPart::Int(x)).collect(),
        right.iter().map(|&x| KeyPart::Int(x)).collect(),
    )
}

/// Categorise a (possibly multi-column) key table: combine per-column dense
/// labels with an accumulating stride, re-compacting after every column so
/// the combined id space never grows past the table's actual distinct-row
/// count (`spec.md` §4.3 "Categorise").
pub fn categorise_table(by: &Dataframe) -> (Vec<i64>, usize) {
    assert!(!by.columns.is_empty(), "categorise requires at least one column");
    let (mut labels, mut count) = dense_labels_single(column_keys(&by.columns[0]));
    for col in &by.columns[1..] {
        let (col_labels, col_count) = dense_labels_single(column_keys(col));
        let combined: Vec<i64> = labels
            .iter()
            .zip(col_labels.iter())
            .map(|(&a, &b)| a * col_count as i64 + b)
            .collect();
        let (new_labels, new_count) = recompact_single(&combined);
        labels = new_labels;
        count = new_count;
    }
    (labels, count)
}

pub fn categorise_tables_joint(left: &Dataframe, right: &Dataframe) -> (Vec<i64>, Vec<i64>, usize) {
    assert!(!left.columns.is_empty(), "categorise requires at least one column");
    let (mut l_labels, mut r_labels, mut count) =
        dense_labels_joint(column_keys(&left.columns[0]), column_keys(&right.columns[0]));
    for j in 1..left.columns.len() {
        let (cl, cr, col_count) =
            dense_labels_joint(column_keys(&left.columns[j]), column_keys(&right.columns[j]));
        let combined_l: Vec<i64> = l_labels.iter().zip(cl.iter()).map(|(&a, &b)| a * col_count as i64 + b).collect();
        let combined_r: Vec<i64> = r_labels.iter().zip(cr.iter()).map(|(&a, &b)| a * col_count as i64 + b).collect();
        let (nl, nr, nc) = recompact_joint(&combined_l, &combined_r);
        l_labels = nl;
        r_labels = nr;
        count = nc;
    }
    (l_labels, r_labels, count)
}

/// `group`: bucket `filtered`'s rows by `by`'s categorisation, producing the
/// pre-populated by-columns and one sub-Dataframe per distinct label.
pub fn group(filtered: &Dataframe, by: &Dataframe) -> (Dataframe, Vec<Dataframe>) {
    let (labels, count) = categorise_table(by);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (row, &label) in labels.iter().enumerate() {
        buckets[label as usize].push(row);
    }
    let mut by_cols: Vec<VectorData> = by.columns.iter().map(VectorData::empty_like).collect();
    for bucket in &buckets {
        let first_row = bucket[0];
        for (ci, col) in by.columns.iter().enumerate() {
            by_cols[ci].push(col.get(first_row));
        }
    }
    let by_result = Dataframe { type_code: by.type_code, columns: by_cols };

    let sub_tables = buckets
        .iter()
        .map(|bucket| {
            let idx: Vec<i64> = bucket.iter().map(|&r| r as i64).collect();
            let cols = filtered.columns.iter().map(|c| c.take_indices(&idx)).collect();
            Dataframe { type_code: filtered.type_code, columns: cols }
        })
        .collect();

    (by_result, sub_tables)
}

/// Equality match: left keeps every row (identity index), right rows map by
/// categorised label; duplicate right labels are a runtime error
/// (`spec.md` §8 "equality join uniqueness").
pub fn eq_match(left: &Dataframe, right: &Dataframe) -> Result<(Vec<i64>, Vec<i64>), RuntimeError> {
    let (left_labels, right_labels, _count) = categorise_tables_joint(left, right);
    let mut right_of_label: HashMap<i64, usize> = HashMap::new();
    for (row, &label) in right_labels.iter().enumerate() {
        if right_of_label.insert(label, row).is_some() {
            return Err(RuntimeError::DuplicateJoinKey);
        }
    }
    let left_idx: Vec<i64> = (0..left_labels.len() as i64).collect();
    let right_idx: Vec<i64> = left_labels
        .iter()
        .map(|label| right_of_label.get(label).map(|&r| r as i64).unwrap_or(-1))
        .collect();
    Ok((left_idx, right_idx))
}

fn vec_i64(v: &VectorData, i: usize) -> i64 {
    match v {
        VectorData::Int64(xs) => xs[i],
        VectorData::Date(xs) => xs[i],
        VectorData::Time(xs) => xs[i],
        VectorData::Timestamp(xs) => xs[i],
        VectorData::Timedelta(xs) => xs[i],
        other => panic!("asof column must be an i64-backed kind, got {:?}", other.kind()),
    }
}

fn vec_i64_all(v: &VectorData) -> Vec<i64> {
    (0..v.len()).map(|i| vec_i64(v, i)).collect()
}

/// Plain (keyless) backward asof: for each left position, the last right
/// position with `right <= left` (`< left` if `strict`); `-1` if none.
pub fn asof_backward(left: &[i64], right: &[i64], strict: bool) -> Vec<i64> {
    let mut out = Vec::with_capacity(left.len());
    let mut j = 0usize;
    for &lv in left {
        while j < right.len() && (if strict { right[j] < lv } else { right[j] <= lv }) {
            j += 1;
        }
        out.push(if j == 0 { -1 } else { (j - 1) as i64 });
    }
    out
}

/// Forward asof: for each left position, the first right position with
/// `right >= left` (`> left` if `strict`); `-1` if none.
pub fn asof_forward(left: &[i64], right: &[i64], strict: bool) -> Vec<i64> {
    let mut out = Vec::with_capacity(left.len());
    let mut j = 0usize;
    for &lv in left {
        while j < right.len() && (if strict { right[j] <= lv } else { right[j] < lv }) {
            j += 1;
        }
        out.push(if j < right.len() { j as i64 } else { -1 });
    }
    out
}

/// Nearest: the right position minimising `|right - left|` among the
/// surrounding `{j_prev, j_next}`; ties go to the backward side.
pub fn asof_nearest(left: &[i64], right: &[i64]) -> Vec<i64> {
    left.iter()
        .map(|&lv| {
            let next = right.partition_point(|&r| r <= lv);
            let prev = next.checked_sub(1);
            let cand_next = if next < right.len() { Some(next) } else { None };
            match (prev, cand_next) {
                (Some(p), Some(n)) => {
                    let dp = (lv - right[p]).abs();
                    let dn = (right[n] - lv).abs();
                    if dp <= dn { p as i64 } else { n as i64 }
                }
                (Some(p), None) => p as i64,
                (None, Some(n)) => n as i64,
                (None, None) => -1,
            }
        })
        .collect()
}

fn within_filter(left: &[i64], right: &[i64], idx: Vec<i64>, within: i64) -> Vec<i64> {
    idx.into_iter()
        .enumerate()
        .map(|(i, j)| {
            if j < 0 {
                return -1;
            }
            if (left[i] - right[j as usize]).abs() <= within {
                j
            } else {
                -1
            }
        })
        .collect()
}

pub fn asof_match(left: &VectorData, right: &VectorData, direction: AsofDirection, strict: bool) -> Vec<i64> {
    let left = vec_i64_all(left);
    let right = vec_i64_all(right);
    match direction {
        AsofDirection::Backward => asof_backward(&left, &right, strict),
        AsofDirection::Forward => asof_forward(&left, &right, strict),
        AsofDirection::Nearest => asof_nearest(&left, &right),
    }
}

pub fn asof_within(left: &VectorData, right: &VectorData, direction: AsofDirection, within: &Scalar) -> Vec<i64> {
    let left = vec_i64_all(left);
    let right = vec_i64_all(right);
    let w = match within {
        Scalar::Timedelta(n) | Scalar::Int64(n) => *n,
        other => panic!("within tolerance must be Timedelta/Int64, got {:?}", other.kind()),
    };
    let idx = match direction {
        AsofDirection::Backward => asof_backward(&left, &right, false),
        AsofDirection::Forward => asof_forward(&left, &right, false),
        AsofDirection::Nearest => asof_nearest(&left, &right),
    };
    within_filter(&left, &right, idx, w)
}

/// Equality-keyed asof: categorise jointly, group rows of both sides by
/// label, then run the plain asof kernel within each label's subsequence
/// (which remains ordered, since filtering by label preserves relative
/// order of an already asof-sorted table).
#[allow(clippy::too_many_arguments)]
pub fn eq_asof(
    left_key: &Dataframe,
    right_key: &Dataframe,
    left_asof: &VectorData,
    right_asof: &VectorData,
    direction: AsofDirection,
    strict: bool,
    within: Option<i64>,
) -> (Vec<i64>, Vec<i64>) {
    let (left_labels, right_labels, _count) = categorise_tables_joint(left_key, right_key);

    let mut right_by_label: HashMap<i64, Vec<usize>> = HashMap::new();
    for (row, &label) in right_labels.iter().enumerate() {
        right_by_label.entry(label).or_default().push(row);
    }
    let mut left_by_label: HashMap<i64, Vec<usize>> = HashMap::new();
    for (row, &label) in left_labels.iter().enumerate() {
        left_by_label.entry(label).or_default().push(row);
    }

    let mut right_idx = vec![-1i64; left_labels.len()];
    for (label, left_rows) in &left_by_label {
        let empty = Vec::new();
        let right_rows = right_by_label.get(label).unwrap_or(&empty);
        let left_vals: Vec<i64> = left_rows.iter().map(|&r| vec_i64(left_asof, r)).collect();
        let right_vals: Vec<i64> = right_rows.iter().map(|&r| vec_i64(right_asof, r)).collect();
        let local = match direction {
            AsofDirection::Backward => asof_backward(&left_vals, &right_vals, strict),
            AsofDirection::Forward => asof_forward(&left_vals, &right_vals, strict),
            AsofDirection::Nearest => asof_nearest(&left_vals, &right_vals),
        };
        for (li, &loc) in local.iter().enumerate() {
            if loc < 0 {
                continue;
            }
            let mut global_right = right_rows[loc as usize] as i64;
            if let Some(w) = within {
                if (left_vals[li] - right_vals[loc as usize]).abs() > w {
                    global_right = -1;
                }
            }
            right_idx[left_rows[li]] = global_right;
        }
    }
    let left_idx: Vec<i64> = (0..left_labels.len() as i64).collect();
    (left_idx, right_idx)
}

pub fn multidx(df: &Dataframe, idx: &[i64]) -> Dataframe {
    Dataframe {
        type_code: df.type_code,
        columns: df.columns.iter().map(|c| c.take_indices(idx)).collect(),
    }
}

pub fn where_filter(df: &Dataframe, mask: &[bool]) -> Dataframe {
    Dataframe {
        type_code: df.type_code,
        columns: df.columns.iter().map(|c| c.take_mask(mask)).collect(),
    }
}

fn scalar_cmp_for_sort(a: Scalar, b: Scalar) -> Ordering {
    match (a, b) {
        (Scalar::Int64(x), Scalar::Int64(y)) => x.cmp(&y),
        (Scalar::Date(x), Scalar::Date(y)) => x.cmp(&y),
        (Scalar::Time(x), Scalar::Time(y)) => x.cmp(&y),
        (Scalar::Timestamp(x), Scalar::Timestamp(y)) => x.cmp(&y),
        (Scalar::Timedelta(x), Scalar::Timedelta(y)) => x.cmp(&y),
        (Scalar::Float64(x), Scalar::Float64(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Scalar::String(x), Scalar::String(y)) => x.cmp(&y),
        (Scalar::Char(x), Scalar::Char(y)) => x.cmp(&y),
        (Scalar::Bool(x), Scalar::Bool(y)) => x.cmp(&y),
        _ => Ordering::Equal,
    }
}

/// Stable sort of row indices `0..n`, comparing columns in reverse order so
/// the first `by` column is the primary key (`spec.md` §4.3 "Sort").
pub fn isort(by: &Dataframe) -> Vec<i64> {
    let n = by.row_count();
    let mut perm: Vec<usize> = (0..n).collect();
    perm.sort_by(|&a, &b| {
        for col in by.columns.iter().rev() {
            let ord = scalar_cmp_for_sort(col.get(a), col.get(b));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    perm.into_iter().map(|x| x as i64).collect()
}

/// Reassemble a Dataframe of a new type by picking columns from `src` by
/// field name.
pub fn take(src: &Dataframe, src_type: &UserDefinedType, field_names: &[String], dst_type: TypeCode) -> Dataframe {
    let columns = field_names
        .iter()
        .map(|name| {
            let idx = src_type
                .fields
                .iter()
                .position(|(n, _)| n == name)
                .expect("take: field must exist (checked by the semantic analyzer)");
            src.columns[idx].clone()
        })
        .collect();
    Dataframe { type_code: dst_type, columns }
}

pub fn concat(left: &Dataframe, right: &Dataframe, result_type: TypeCode) -> Result<Dataframe, RuntimeError> {
    if left.row_count() != right.row_count() {
        return Err(RuntimeError::MismatchArrayLengths { left: left.row_count(), right: right.row_count() });
    }
    let mut columns = left.columns.clone();
    columns.extend(right.columns.clone());
    Ok(Dataframe { type_code: result_type, columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vvm_core::{BuiltinKind, Shape};

    fn int_vec(xs: &[i64]) -> VectorData {
        VectorData::Int64(xs.to_vec())
    }

    fn sym_table(syms: &[&str]) -> Dataframe {
        Dataframe {
            type_code: TypeCode::builtin(BuiltinKind::String, Shape::Vector),
            columns: vec![VectorData::String(syms.iter().map(|s| s.to_string()).collect())],
        }
    }

    #[test]
    fn categorise_assigns_dense_first_seen_labels() {
        let table = sym_table(&["b", "a", "b", "c"]);
        let (labels, count) = categorise_table(&table);
        assert_eq!(labels, vec![0, 1, 0, 2]);
        assert_eq!(count, 3);
    }

    #[test]
    fn eq_match_rejects_duplicate_right_keys() {
        let left = sym_table(&["a", "b"]);
        let right = sym_table(&["a", "a"]);
        let err = eq_match(&left, &right).unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateJoinKey));
    }

    #[test]
    fn eq_match_unmatched_left_is_negative_one() {
        let left = sym_table(&["a", "z"]);
        let right = sym_table(&["a"]);
        let (_, right_idx) = eq_match(&left, &right).unwrap();
        assert_eq!(right_idx, vec![0, -1]);
    }

    #[test]
    fn asof_backward_matches_last_le() {
        let left = [5, 10, 12];
        let right = [0, 5, 11];
        let idx = asof_backward(&left, &right, false);
        assert_eq!(idx, vec![1, 1, 2]);
    }

    #[test]
    fn asof_backward_strict_excludes_equal() {
        let left = [5];
        let right = [0, 5];
        let idx = asof_backward(&left, &right, true);
        assert_eq!(idx, vec![0]);
    }

    #[test]
    fn asof_nearest_ties_go_backward() {
        let left = [5];
        let right = [3, 7];
        let idx = asof_nearest(&left, &right);
        assert_eq!(idx, vec![0]);
    }

    #[test]
    fn isort_is_stable_and_reverse_priority() {
        // primary key = column 0, so equal-column0 rows keep original order
        let col0 = int_vec(&[1, 1, 0]);
        let col1 = int_vec(&[9, 8, 7]);
        let by = Dataframe {
            type_code: TypeCode::builtin(BuiltinKind::Int64, Shape::Vector),
            columns: vec![col0, col1],
        };
        let perm = isort(&by);
        assert_eq!(perm, vec![2, 0, 1]);
    }

    #[test]
    fn multidx_maps_negative_to_nil() {
        let df = Dataframe {
            type_code: TypeCode::builtin(BuiltinKind::Int64, Shape::Vector),
            columns: vec![int_vec(&[10, 20, 30])],
        };
        let out = multidx(&df, &[2, -1]);
        assert_eq!(out.columns[0], VectorData::Int64(vec![30, NIL_INT]));
    }
}
