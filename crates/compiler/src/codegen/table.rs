//! Lowering for the three table-clause expressions (`spec.md` §5 "Query",
//! "Sort", "Join"), grounded directly in the runtime kernels they target:
//! `vvm_runtime::kernels::table::{group, eq_match, eq_asof, isort, take,
//! concat}`.

use super::{Codegen, Ctx};
use crate::types::{TypedJoin, TypedQuery, TypedSort};
use vvm_core::{Operand, TypeCode, UserDefinedType};
use vvm_runtime::{AsofDirection, CmpOp, Instruction, Program, Shape2};

pub(super) fn lower_query(cg: &mut Codegen, program: &mut Program, ctx: &Ctx, q: &TypedQuery) -> Operand {
    let src = cg.lower_expr(program, ctx, &q.source);
    let filtered = match &q.filter {
        Some(f) => {
            let src_ctx = Ctx::with_table(src);
            let mask = cg.lower_expr(program, &src_ctx, f);
            let dst = cg.fresh();
            program.instructions.push(Instruction::Where { src, mask, dst });
            dst
        }
        None => src,
    };

    if q.by.is_empty() && q.select.is_empty() {
        return filtered;
    }

    let table_ctx = Ctx::with_table(filtered);

    if q.by.is_empty() {
        let out = cg.fresh();
        program.instructions.push(Instruction::Alloc { ty: Operand::ty(q.result_ty), dst: out });
        for (i, sel) in q.select.iter().enumerate() {
            let v = cg.lower_expr(program, &table_ctx, sel);
            program.instructions.push(Instruction::AssignMember { target: out, field: i as u32, value: v });
        }
        return out;
    }

    // Grouped aggregate: categorise `filtered` by a dedicated Dataframe
    // holding only the `by` columns (`group` treats every column of its
    // `by` argument as part of the key, so row-wise select columns can
    // never ride along in the same Dataframe), then append one row per
    // group's reduced `select` values onto the pre-populated output.
    let by_fields: Vec<(String, TypeCode)> = q.by.iter().enumerate().map(|(i, e)| (format!("k{i}"), e.ty)).collect();
    let by_ty = program.types.intern(UserDefinedType { name: "!group_by".to_string(), fields: by_fields });
    let by_reg = cg.fresh();
    program.instructions.push(Instruction::Alloc { ty: Operand::ty(by_ty), dst: by_reg });
    for (i, e) in q.by.iter().enumerate() {
        let v = cg.lower_expr(program, &table_ctx, e);
        program.instructions.push(Instruction::AssignMember { target: by_reg, field: i as u32, value: v });
    }

    let out = cg.fresh();
    program.instructions.push(Instruction::Alloc { ty: Operand::ty(q.result_ty), dst: out });
    let count = cg.fresh();
    let subtables = cg.fresh();
    program.instructions.push(Instruction::Group { filtered, by: by_reg, output: out, count_dst: count, subtables_dst: subtables });

    let counter = cg.fresh();
    let zero = cg.int_operand(program, 0);
    program.instructions.push(Instruction::Move { dst: counter, src: zero });

    let loop_start = program.instructions.len();
    let cond = cg.fresh();
    program.instructions.push(Instruction::Compare { op: CmpOp::Lt, shape: Shape2::ScalarScalar, a: counter, b: count, dst: cond });
    let bfalse_idx = program.instructions.len();
    program.instructions.push(Instruction::BFalse { cond, target: usize::MAX });

    let group_reg = cg.fresh();
    program.instructions.push(Instruction::SubTable { handle: subtables, index: counter, dst: group_reg });
    let group_ctx = Ctx::with_table(group_reg);
    for (i, sel) in q.select.iter().enumerate() {
        let v = cg.lower_expr(program, &group_ctx, sel);
        program.instructions.push(Instruction::AppendMember { target: out, field: (q.by.len() + i) as u32, value: v });
    }

    let one = cg.int_operand(program, 1);
    program.instructions.push(Instruction::BinArith { op: vvm_runtime::ArithOp::Add, shape: Shape2::ScalarScalar, a: counter, b: one, dst: counter });
    program.instructions.push(Instruction::Br { target: loop_start });
    let loop_end = program.instructions.len();
    Codegen::patch_target(program, bfalse_idx, loop_end);

    out
}

pub(super) fn lower_sort(cg: &mut Codegen, program: &mut Program, ctx: &Ctx, s: &TypedSort) -> Operand {
    let src = cg.lower_expr(program, ctx, &s.source);
    let table_ctx = Ctx::with_table(src);

    let by_fields: Vec<(String, TypeCode)> = s.by.iter().enumerate().map(|(i, e)| (format!("k{i}"), e.ty)).collect();
    let by_ty = program.types.intern(UserDefinedType { name: "!sort_key".to_string(), fields: by_fields });
    let by_reg = cg.fresh();
    program.instructions.push(Instruction::Alloc { ty: Operand::ty(by_ty), dst: by_reg });
    for (i, e) in s.by.iter().enumerate() {
        let v = cg.lower_expr(program, &table_ctx, e);
        program.instructions.push(Instruction::AssignMember { target: by_reg, field: i as u32, value: v });
    }

    let perm = cg.fresh();
    program.instructions.push(Instruction::ISort { by: by_reg, perm_dst: perm });
    let dst = cg.fresh();
    program.instructions.push(Instruction::MultiDx { src, idx: perm, dst });
    dst
}

pub(super) fn lower_join(cg: &mut Codegen, program: &mut Program, ctx: &Ctx, j: &TypedJoin) -> Operand {
    let left = cg.lower_expr(program, ctx, &j.left);
    let right = cg.lower_expr(program, ctx, &j.right);
    let left_ctx = Ctx::with_table(left);
    let right_ctx = Ctx::with_table(right);

    let key_fields: Vec<(String, TypeCode)> = j.on.iter().enumerate().map(|(i, (l, _))| (format!("k{i}"), l.ty)).collect();
    let (left_key, right_key) = if j.on.is_empty() {
        (None, None)
    } else {
        let key_ty = program.types.intern(UserDefinedType { name: "!join_key".to_string(), fields: key_fields });
        let lk = cg.fresh();
        program.instructions.push(Instruction::Alloc { ty: Operand::ty(key_ty), dst: lk });
        let rk = cg.fresh();
        program.instructions.push(Instruction::Alloc { ty: Operand::ty(key_ty), dst: rk });
        for (i, (l, r)) in j.on.iter().enumerate() {
            let lv = cg.lower_expr(program, &left_ctx, l);
            program.instructions.push(Instruction::AssignMember { target: lk, field: i as u32, value: lv });
            let rv = cg.lower_expr(program, &right_ctx, r);
            program.instructions.push(Instruction::AssignMember { target: rk, field: i as u32, value: rv });
        }
        (Some(lk), Some(rk))
    };

    let asof_vecs = j.asof.as_ref().map(|(l, r)| {
        let lv = cg.lower_expr(program, &left_ctx, l);
        let rv = cg.lower_expr(program, &right_ctx, r);
        (lv, rv)
    });
    let within_op = j.within.as_ref().map(|w| cg.lower_expr(program, &right_ctx, w));
    let direction = j.direction.map(asof_direction).unwrap_or(AsofDirection::Backward);

    // `eq_match`/`eq_asof` always return the identity permutation for the
    // left side (every left row is kept, in order), so only the right
    // side ever needs reordering via the returned index vector.
    let right_idx = match (left_key, right_key, asof_vecs) {
        (Some(left_key), Some(right_key), None) => {
            let left_idx = cg.fresh();
            let right_idx = cg.fresh();
            program.instructions.push(Instruction::EqMatch { left_key, right_key, left_idx_dst: left_idx, right_idx_dst: right_idx });
            right_idx
        }
        (Some(left_key), Some(right_key), Some((left_asof, right_asof))) => {
            let left_idx = cg.fresh();
            let right_idx = cg.fresh();
            match within_op {
                Some(within) => {
                    program.instructions.push(Instruction::EqAsofWithin {
                        left_key,
                        right_key,
                        left_asof,
                        right_asof,
                        direction,
                        within,
                        left_idx_dst: left_idx,
                        right_idx_dst: right_idx,
                    });
                }
                None if j.direction == Some(crate::ast::AsofDir::Nearest) => {
                    program.instructions.push(Instruction::EqAsofNear { left_key, right_key, left_asof, right_asof, left_idx_dst: left_idx, right_idx_dst: right_idx });
                }
                None => {
                    program.instructions.push(Instruction::EqAsofMatch {
                        left_key,
                        right_key,
                        left_asof,
                        right_asof,
                        direction,
                        strict: j.strict,
                        left_idx_dst: left_idx,
                        right_idx_dst: right_idx,
                    });
                }
            }
            right_idx
        }
        (None, None, Some((left_asof, right_asof))) => {
            let idx = cg.fresh();
            match within_op {
                Some(within) => {
                    program.instructions.push(Instruction::AsofWithin { left: left_asof, right: right_asof, direction, within, idx_dst: idx });
                }
                None if j.direction == Some(crate::ast::AsofDir::Nearest) => {
                    program.instructions.push(Instruction::AsofNear { left: left_asof, right: right_asof, idx_dst: idx });
                }
                None => {
                    program.instructions.push(Instruction::AsofMatch { left: left_asof, right: right_asof, direction, strict: j.strict, idx_dst: idx });
                }
            }
            idx
        }
        _ => unreachable!("join requires 'on' and/or 'asof' (checked by the analyzer)"),
    };

    let right_reordered = cg.fresh();
    program.instructions.push(Instruction::MultiDx { src: right, idx: right_idx, dst: right_reordered });

    let right_take_ty = {
        let right_ty = j.right.ty;
        let def = program.types.get(right_ty).expect("join right operand must be an interned Dataframe type").clone();
        let fields: Vec<(String, TypeCode)> = j
            .right_take_fields
            .iter()
            .map(|name| (name.clone(), def.field_type(name).expect("right_take_fields drawn from right's own fields")))
            .collect();
        program.types.intern(UserDefinedType { name: "!join_right_take".to_string(), fields })
    };
    let field_names_const = {
        let idx = program.constants.len() as u32;
        program.constants.push(vvm_runtime::ConstantValue::StringList(j.right_take_fields.clone()));
        idx
    };
    let right_taken = cg.fresh();
    program.instructions.push(Instruction::Take { src: right_reordered, field_names_const, ty: Operand::ty(right_take_ty), dst: right_taken });

    let dst = cg.fresh();
    program.instructions.push(Instruction::Concat { left, right: right_taken, ty: Operand::ty(j.result_ty), dst });
    dst
}

fn asof_direction(d: crate::ast::AsofDir) -> AsofDirection {
    match d {
        crate::ast::AsofDir::Backward => AsofDirection::Backward,
        crate::ast::AsofDir::Forward => AsofDirection::Forward,
        crate::ast::AsofDir::Nearest => AsofDirection::Nearest,
    }
}
