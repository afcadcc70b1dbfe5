//! Lowers a [`TypedModule`] into a `vvm_runtime::Program` (`spec.md` §3
//! "Typed IR -> bytecode"). The analyzer has already resolved every name,
//! type and overload; codegen's only remaining job is picking concrete
//! registers and opcodes.

mod table;

use crate::ast::BinOp;
use crate::types::{
    Binding, Builtin, TypedExpr, TypedExprKind, TypedJoin, TypedModule, TypedQuery, TypedSort,
    TypedStmt,
};
use std::collections::HashMap;
use vvm_core::{Operand, Shape, TypeCode, UserDefinedType};
use vvm_runtime::{ArithOp, CmpOp, ConstantValue, FunctionDef, Instruction, LogicOp, Program, Shape2};

/// Lowers `module` onto the end of `program`, appending its functions and
/// top-level statements (a [`crate::session::Session`] calls this once per
/// REPL turn, growing the same `Program` across turns).
pub fn lower_module(module: &TypedModule, program: &mut Program) {
    let mut cg = Codegen::new(module);
    cg.reserve_function_slots(program);
    cg.lower_functions(program);
    cg.lower_top_level(program);
}

/// Where a table-clause expression reads its "current row"/"current group"
/// from. `None` outside any table clause (a `FieldRef` there is an analyzer
/// bug, not a codegen-time possibility).
#[derive(Clone, Copy, Default)]
struct Ctx {
    table: Option<Operand>,
}

impl Ctx {
    fn with_table(table: Operand) -> Ctx {
        Ctx { table: Some(table) }
    }
}

struct Codegen<'m> {
    module: &'m TypedModule,
    fn_by_id: HashMap<u32, usize>,
    func_slots: HashMap<u32, u32>,
    next_local: u32,
}

impl<'m> Codegen<'m> {
    fn new(module: &'m TypedModule) -> Self {
        let fn_by_id = module.functions.iter().enumerate().map(|(i, f)| (f.func_id, i)).collect();
        Codegen { module, fn_by_id, func_slots: HashMap::new(), next_local: 0 }
    }

    /// Reserves a placeholder `FunctionDef` constant for every function up
    /// front, so a `Call` lowered before its callee's body is lowered (self-
    /// and mutual recursion) still has a constant-pool slot to reference.
    fn reserve_function_slots(&mut self, program: &mut Program) {
        for f in &self.module.functions {
            let idx = program.constants.len() as u32;
            program.constants.push(ConstantValue::FunctionDef(FunctionDef {
                name: f.name.clone(),
                arity: f.param_types.len(),
                entry: 0,
                end: 0,
                local_count: 0,
            }));
            self.func_slots.insert(f.func_id, idx);
        }
    }

    fn lower_functions(&mut self, program: &mut Program) {
        // Copying the module reference out of `self` (it's `Copy`) lets the
        // loop body freely call `&mut self` methods without the borrow
        // checker tying the function list to `self`'s own borrow.
        let module = self.module;
        for f in &module.functions {
            let const_idx = self.func_slots[&f.func_id];
            self.next_local = f.local_count;
            let ctx = Ctx::default();
            let entry = program.instructions.len();
            for s in &f.body {
                self.lower_stmt(program, &ctx, s);
            }
            let ret = match &f.tail {
                Some(t) => self.lower_expr(program, &ctx, t),
                None => self.int_operand(program, 0),
            };
            program.instructions.push(Instruction::Ret { value: ret });
            let end = program.instructions.len();
            let local_count = self.next_local;
            if let ConstantValue::FunctionDef(fd) = &mut program.constants[const_idx as usize] {
                fd.entry = entry;
                fd.end = end;
                fd.local_count = local_count;
            }
        }
    }

    fn lower_top_level(&mut self, program: &mut Program) {
        let module = self.module;
        self.next_local = 0;
        let ctx = Ctx::default();
        for s in &module.top_level {
            self.lower_stmt(program, &ctx, s);
        }
        if let Some(result) = &module.result {
            let op = self.lower_expr(program, &ctx, result);
            program.instructions.push(Instruction::Ret { value: op });
        }
        program.top_level_locals = program.top_level_locals.max(self.next_local);
    }

    fn fresh(&mut self) -> Operand {
        let slot = self.next_local;
        self.next_local += 1;
        Operand::local(slot)
    }

    fn operand_of_binding(b: Binding) -> Operand {
        match b {
            Binding::Local(i) => Operand::local(i),
            Binding::State(i) => Operand::state(i),
        }
    }

    fn int_operand(&mut self, program: &mut Program, n: i64) -> Operand {
        if (0..=vvm_core::operand::IMMEDIATE_MAX as i64).contains(&n) {
            Operand::immediate(n as u32)
        } else {
            self.const_operand(program, ConstantValue::Int64(n))
        }
    }

    fn const_operand(&mut self, program: &mut Program, cv: ConstantValue) -> Operand {
        let idx = program.constants.len() as u32;
        program.constants.push(cv);
        Operand::global(idx)
    }

    fn patch_target(program: &mut Program, idx: usize, target: usize) {
        match &mut program.instructions[idx] {
            Instruction::BFalse { target: t, .. } => *t = target,
            Instruction::Br { target: t } => *t = target,
            other => unreachable!("patch_target called on {other:?}"),
        }
    }

    fn lower_stmt(&mut self, program: &mut Program, ctx: &Ctx, s: &TypedStmt) {
        match s {
            TypedStmt::Let(binding, e) => {
                let v = self.lower_expr(program, ctx, e);
                let dst = Self::operand_of_binding(*binding);
                program.instructions.push(Instruction::Move { dst, src: v });
            }
            TypedStmt::Expr(e) => {
                self.lower_expr(program, ctx, e);
            }
            TypedStmt::While(cond, body) => {
                let start = program.instructions.len();
                let c = self.lower_expr(program, ctx, cond);
                let bfalse_idx = program.instructions.len();
                program.instructions.push(Instruction::BFalse { cond: c, target: usize::MAX });
                for s in body {
                    self.lower_stmt(program, ctx, s);
                }
                program.instructions.push(Instruction::Br { target: start });
                let end = program.instructions.len();
                Self::patch_target(program, bfalse_idx, end);
            }
            TypedStmt::Return(e) => {
                let op = match e {
                    Some(e) => self.lower_expr(program, ctx, e),
                    None => self.int_operand(program, 0),
                };
                program.instructions.push(Instruction::Ret { value: op });
            }
            TypedStmt::Print(e) => {
                let op = self.lower_expr(program, ctx, e);
                program.instructions.push(Instruction::Print { value: op });
            }
            TypedStmt::Save(e) => {
                let op = self.lower_expr(program, ctx, e);
                program.instructions.push(Instruction::Save { value: op });
            }
            TypedStmt::Exit(e) => {
                let op = self.lower_expr(program, ctx, e);
                program.instructions.push(Instruction::Exit { code: op });
            }
        }
    }

    fn lower_expr(&mut self, program: &mut Program, ctx: &Ctx, e: &TypedExpr) -> Operand {
        match &e.kind {
            TypedExprKind::IntLit(n) => self.int_operand(program, *n),
            TypedExprKind::FloatLit(f) => self.const_operand(program, ConstantValue::Float64(*f)),
            TypedExprKind::StringLit(s) => self.const_operand(program, ConstantValue::String(s.clone())),
            TypedExprKind::CharLit(c) => self.const_operand(program, ConstantValue::Char(*c)),
            TypedExprKind::BoolLit(b) => self.const_operand(program, ConstantValue::Bool(*b)),
            TypedExprKind::Load(b) => Self::operand_of_binding(*b),
            TypedExprKind::FieldRef(field) => {
                let src = ctx.table.expect("FieldRef lowered outside a table clause context");
                let dst = self.fresh();
                program.instructions.push(Instruction::ReadMember { src, field: *field, dst });
                dst
            }
            TypedExprKind::VectorLit(items) => self.lower_vector_lit(program, ctx, items, e.ty),
            TypedExprKind::Assign(b, value) => {
                let v = self.lower_expr(program, ctx, value);
                let dst = Self::operand_of_binding(*b);
                program.instructions.push(Instruction::Move { dst, src: v });
                dst
            }
            TypedExprKind::Binary(op, l, r) => self.lower_binary(program, ctx, *op, l, r),
            TypedExprKind::Neg(inner) => self.lower_neg(program, ctx, inner),
            TypedExprKind::Not(inner) => {
                let a = self.lower_expr(program, ctx, inner);
                let dst = self.fresh();
                program.instructions.push(Instruction::Not { a, dst });
                dst
            }
            TypedExprKind::Member(recv, field) => {
                let src = self.lower_expr(program, ctx, recv);
                let dst = self.fresh();
                program.instructions.push(Instruction::ReadMember { src, field: *field, dst });
                dst
            }
            TypedExprKind::Call(func_id, args) => self.lower_call(program, ctx, *func_id, args),
            TypedExprKind::Inline(inner) => self.lower_inline(program, ctx, inner),
            TypedExprKind::Construct(tc, args) => self.lower_construct(program, ctx, *tc, args),
            TypedExprKind::Block(stmts, tail) => {
                for s in stmts {
                    self.lower_stmt(program, ctx, s);
                }
                match tail {
                    Some(t) => self.lower_expr(program, ctx, t),
                    None => self.int_operand(program, 0),
                }
            }
            TypedExprKind::If(arms, else_arm) => self.lower_if(program, ctx, arms, else_arm),
            TypedExprKind::Query(q) => table::lower_query(self, program, ctx, q),
            TypedExprKind::Sort(s) => table::lower_sort(self, program, ctx, s),
            TypedExprKind::Join(j) => table::lower_join(self, program, ctx, j),
            TypedExprKind::LoadCsv(tc, path) => {
                let path_op = self.lower_expr(program, ctx, path);
                let dst = self.fresh();
                program.instructions.push(Instruction::LoadCsv { path: path_op, ty: Operand::ty(*tc), dst });
                dst
            }
            TypedExprKind::StoreCsv(df, path) => {
                let df_op = self.lower_expr(program, ctx, df);
                let path_op = self.lower_expr(program, ctx, path);
                program.instructions.push(Instruction::StoreCsv { path: path_op, df: df_op });
                df_op
            }
        }
    }

    fn lower_vector_lit(&mut self, program: &mut Program, ctx: &Ctx, items: &[TypedExpr], ty: TypeCode) -> Operand {
        // There is no opcode that builds a standalone vector from scalar
        // operands directly, so a literal is built the same way a Dataframe
        // column is: allocate a one-field wrapper record and append each
        // element, then read the column back out.
        let wrapper = program.types.intern(UserDefinedType { name: "!vector_lit".to_string(), fields: vec![("v".to_string(), ty)] });
        let df = self.fresh();
        program.instructions.push(Instruction::Alloc { ty: Operand::ty(wrapper), dst: df });
        for item in items {
            let v = self.lower_expr(program, ctx, item);
            program.instructions.push(Instruction::AppendMember { target: df, field: 0, value: v });
        }
        let dst = self.fresh();
        program.instructions.push(Instruction::ReadMember { src: df, field: 0, dst });
        dst
    }

    fn lower_binary(&mut self, program: &mut Program, ctx: &Ctx, op: BinOp, l: &TypedExpr, r: &TypedExpr) -> Operand {
        let l_shape = l.ty.as_builtin().map(|(_, s)| s).unwrap_or(Shape::Scalar);
        let r_shape = r.ty.as_builtin().map(|(_, s)| s).unwrap_or(Shape::Scalar);
        let a = self.lower_expr(program, ctx, l);
        let b = self.lower_expr(program, ctx, r);
        let dst = self.fresh();
        let shape = shape2(l_shape, r_shape);
        let instr = match op {
            BinOp::Add => Instruction::BinArith { op: ArithOp::Add, shape, a, b, dst },
            BinOp::Sub => Instruction::BinArith { op: ArithOp::Sub, shape, a, b, dst },
            BinOp::Mul => Instruction::BinArith { op: ArithOp::Mul, shape, a, b, dst },
            BinOp::Div => Instruction::BinArith { op: ArithOp::Div, shape, a, b, dst },
            BinOp::Mod => Instruction::BinArith { op: ArithOp::Mod, shape, a, b, dst },
            BinOp::Lt => Instruction::Compare { op: CmpOp::Lt, shape, a, b, dst },
            BinOp::Le => Instruction::Compare { op: CmpOp::Le, shape, a, b, dst },
            BinOp::Gt => Instruction::Compare { op: CmpOp::Gt, shape, a, b, dst },
            BinOp::Ge => Instruction::Compare { op: CmpOp::Ge, shape, a, b, dst },
            BinOp::Eq => Instruction::Compare { op: CmpOp::Eq, shape, a, b, dst },
            BinOp::Ne => Instruction::Compare { op: CmpOp::Ne, shape, a, b, dst },
            BinOp::And => Instruction::LogicalBin { op: LogicOp::And, a, b, dst },
            BinOp::Or => Instruction::LogicalBin { op: LogicOp::Or, a, b, dst },
        };
        program.instructions.push(instr);
        dst
    }

    fn lower_neg(&mut self, program: &mut Program, ctx: &Ctx, inner: &TypedExpr) -> Operand {
        let shape = inner.ty.as_builtin().map(|(_, s)| s).unwrap_or(Shape::Scalar);
        let a = self.lower_expr(program, ctx, inner);
        let dst = self.fresh();
        // `Neg`'s runtime dispatch branches on the register's own
        // `Value` variant, not this field, but every instruction still
        // carries a `Shape2` for uniformity with `BinArith`/`Compare`.
        let neg_shape = match shape {
            Shape::Scalar => Shape2::ScalarScalar,
            Shape::Vector => Shape2::VectorVector,
        };
        program.instructions.push(Instruction::Neg { shape: neg_shape, a, dst });
        dst
    }

    fn lower_call(&mut self, program: &mut Program, ctx: &Ctx, func_id: u32, args: &[TypedExpr]) -> Operand {
        if let Some(Builtin::Reduce(op)) = self.module.builtins.get(&func_id) {
            let a = self.lower_expr(program, ctx, &args[0]);
            let dst = self.fresh();
            program.instructions.push(Instruction::Reduce { op: *op, a, dst });
            return dst;
        }
        let arg_ops: Vec<Operand> = args.iter().map(|a| self.lower_expr(program, ctx, a)).collect();
        let func_const = *self.func_slots.get(&func_id).expect("call to a function id with no reserved slot (codegen bug)");
        let dst = self.fresh();
        program.instructions.push(Instruction::Call { func_const, args: arg_ops, dst });
        dst
    }

    fn lower_inline(&mut self, program: &mut Program, ctx: &Ctx, inner: &TypedExpr) -> Operand {
        let (func_id, args) = match &inner.kind {
            TypedExprKind::Call(func_id, args) => (*func_id, args),
            other => unreachable!("Inline always wraps a Call, found {other:?}"),
        };
        let def_idx = *self.fn_by_id.get(&func_id).expect("inline target must be an analyzed function");
        let def = &self.module.functions[def_idx];
        let offset = self.next_local;
        self.next_local += def.local_count;
        for (i, a) in args.iter().enumerate() {
            let v = self.lower_expr(program, ctx, a);
            program.instructions.push(Instruction::Move { dst: Operand::local(offset + i as u32), src: v });
        }
        for s in &def.body {
            let remapped = remap_stmt(s, offset);
            self.lower_stmt(program, ctx, &remapped);
        }
        match &def.tail {
            Some(t) => {
                let remapped = remap_expr(t, offset);
                self.lower_expr(program, ctx, &remapped)
            }
            None => self.int_operand(program, 0),
        }
    }

    fn lower_construct(&mut self, program: &mut Program, ctx: &Ctx, tc: TypeCode, args: &[TypedExpr]) -> Operand {
        let def = program.types.get(tc).expect("construct target must already be interned").clone();
        let dst = self.fresh();
        program.instructions.push(Instruction::Alloc { ty: Operand::ty(tc), dst });
        for (i, (arg, (_, field_ty))) in args.iter().zip(def.fields.iter()).enumerate() {
            let v = self.lower_expr(program, ctx, arg);
            // A `!Name(...)` Dataframe literal supplies whole columns
            // (`AssignMember`); a plain `Name(...)` record supplies one
            // row's worth of scalars (`AppendMember`) onto the same
            // Dataframe-shaped register — there is no separate "record"
            // runtime value, only the Dataframe it builds up.
            let instr = match field_ty.as_builtin() {
                Some((_, Shape::Vector)) => Instruction::AssignMember { target: dst, field: i as u32, value: v },
                _ => Instruction::AppendMember { target: dst, field: i as u32, value: v },
            };
            program.instructions.push(instr);
        }
        dst
    }

    #[allow(clippy::type_complexity)]
    fn lower_if(
        &mut self,
        program: &mut Program,
        ctx: &Ctx,
        arms: &[(TypedExpr, Vec<TypedStmt>, Option<Box<TypedExpr>>)],
        else_arm: &Option<(Vec<TypedStmt>, Option<Box<TypedExpr>>)>,
    ) -> Operand {
        let result = self.fresh();
        let mut end_jumps = Vec::new();
        for (cond, body, tail) in arms {
            let c = self.lower_expr(program, ctx, cond);
            let bfalse_idx = program.instructions.len();
            program.instructions.push(Instruction::BFalse { cond: c, target: usize::MAX });
            for s in body {
                self.lower_stmt(program, ctx, s);
            }
            let v = match tail {
                Some(t) => self.lower_expr(program, ctx, t),
                None => self.int_operand(program, 0),
            };
            program.instructions.push(Instruction::Move { dst: result, src: v });
            let br_idx = program.instructions.len();
            program.instructions.push(Instruction::Br { target: usize::MAX });
            end_jumps.push(br_idx);
            let next = program.instructions.len();
            Self::patch_target(program, bfalse_idx, next);
        }
        match else_arm {
            Some((body, tail)) => {
                for s in body {
                    self.lower_stmt(program, ctx, s);
                }
                let v = match tail {
                    Some(t) => self.lower_expr(program, ctx, t),
                    None => self.int_operand(program, 0),
                };
                program.instructions.push(Instruction::Move { dst: result, src: v });
            }
            None => {
                let z = self.int_operand(program, 0);
                program.instructions.push(Instruction::Move { dst: result, src: z });
            }
        }
        let end = program.instructions.len();
        for idx in end_jumps {
            Self::patch_target(program, idx, end);
        }
        result
    }
}

fn shape2(l: Shape, r: Shape) -> Shape2 {
    match (l, r) {
        (Shape::Scalar, Shape::Scalar) => Shape2::ScalarScalar,
        (Shape::Scalar, Shape::Vector) => Shape2::ScalarVector,
        (Shape::Vector, Shape::Scalar) => Shape2::VectorScalar,
        (Shape::Vector, Shape::Vector) => Shape2::VectorVector,
    }
}

fn remap_binding(b: Binding, offset: u32) -> Binding {
    match b {
        Binding::Local(i) => Binding::Local(i + offset),
        Binding::State(i) => Binding::State(i),
    }
}

/// Re-targets every `Local` binding in an inlined function's body by
/// `offset`, so it doesn't collide with the caller's live locals. `State`
/// bindings and table-clause `FieldRef`s carry no local index and pass
/// through untouched.
fn remap_expr(e: &TypedExpr, offset: u32) -> TypedExpr {
    let kind = match &e.kind {
        TypedExprKind::Load(b) => TypedExprKind::Load(remap_binding(*b, offset)),
        TypedExprKind::Assign(b, v) => TypedExprKind::Assign(remap_binding(*b, offset), Box::new(remap_expr(v, offset))),
        TypedExprKind::Binary(op, l, r) => TypedExprKind::Binary(*op, Box::new(remap_expr(l, offset)), Box::new(remap_expr(r, offset))),
        TypedExprKind::Neg(i) => TypedExprKind::Neg(Box::new(remap_expr(i, offset))),
        TypedExprKind::Not(i) => TypedExprKind::Not(Box::new(remap_expr(i, offset))),
        TypedExprKind::Member(r, f) => TypedExprKind::Member(Box::new(remap_expr(r, offset)), *f),
        TypedExprKind::Call(id, args) => TypedExprKind::Call(*id, args.iter().map(|a| remap_expr(a, offset)).collect()),
        TypedExprKind::Inline(inner) => TypedExprKind::Inline(Box::new(remap_expr(inner, offset))),
        TypedExprKind::Construct(tc, args) => TypedExprKind::Construct(*tc, args.iter().map(|a| remap_expr(a, offset)).collect()),
        TypedExprKind::VectorLit(items) => TypedExprKind::VectorLit(items.iter().map(|a| remap_expr(a, offset)).collect()),
        TypedExprKind::Block(stmts, tail) => TypedExprKind::Block(
            stmts.iter().map(|s| remap_stmt(s, offset)).collect(),
            tail.as_ref().map(|t| Box::new(remap_expr(t, offset))),
        ),
        TypedExprKind::If(arms, else_arm) => TypedExprKind::If(
            arms.iter()
                .map(|(c, b, t)| {
                    (remap_expr(c, offset), b.iter().map(|s| remap_stmt(s, offset)).collect(), t.as_ref().map(|t| Box::new(remap_expr(t, offset))))
                })
                .collect(),
            else_arm.as_ref().map(|(b, t)| (b.iter().map(|s| remap_stmt(s, offset)).collect(), t.as_ref().map(|t| Box::new(remap_expr(t, offset))))),
        ),
        TypedExprKind::Query(q) => TypedExprKind::Query(TypedQuery {
            source: Box::new(remap_expr(&q.source, offset)),
            select: q.select.iter().map(|e| remap_expr(e, offset)).collect(),
            by: q.by.iter().map(|e| remap_expr(e, offset)).collect(),
            filter: q.filter.as_ref().map(|f| Box::new(remap_expr(f, offset))),
            result_ty: q.result_ty,
        }),
        TypedExprKind::Sort(s) => TypedExprKind::Sort(TypedSort {
            source: Box::new(remap_expr(&s.source, offset)),
            by: s.by.iter().map(|e| remap_expr(e, offset)).collect(),
        }),
        TypedExprKind::Join(j) => TypedExprKind::Join(TypedJoin {
            left: Box::new(remap_expr(&j.left, offset)),
            right: Box::new(remap_expr(&j.right, offset)),
            on: j.on.iter().map(|(l, r)| (remap_expr(l, offset), remap_expr(r, offset))).collect(),
            asof: j.asof.as_ref().map(|(l, r)| (remap_expr(l, offset), remap_expr(r, offset))),
            strict: j.strict,
            direction: j.direction,
            within: j.within.as_ref().map(|w| Box::new(remap_expr(w, offset))),
            result_ty: j.result_ty,
            right_take_fields: j.right_take_fields.clone(),
        }),
        TypedExprKind::LoadCsv(tc, path) => TypedExprKind::LoadCsv(*tc, Box::new(remap_expr(path, offset))),
        TypedExprKind::StoreCsv(df, path) => TypedExprKind::StoreCsv(Box::new(remap_expr(df, offset)), Box::new(remap_expr(path, offset))),
        literal => literal.clone(),
    };
    TypedExpr { kind, ty: e.ty, traits: e.traits, mode: e.mode, literal: e.literal.clone() }
}

fn remap_stmt(s: &TypedStmt, offset: u32) -> TypedStmt {
    match s {
        TypedStmt::Let(b, e) => TypedStmt::Let(remap_binding(*b, offset), remap_expr(e, offset)),
        TypedStmt::Expr(e) => TypedStmt::Expr(remap_expr(e, offset)),
        TypedStmt::While(c, body) => TypedStmt::While(remap_expr(c, offset), body.iter().map(|s| remap_stmt(s, offset)).collect()),
        TypedStmt::Return(e) => TypedStmt::Return(e.as_ref().map(|e| remap_expr(e, offset))),
        TypedStmt::Print(e) => TypedStmt::Print(remap_expr(e, offset)),
        TypedStmt::Save(e) => TypedStmt::Save(remap_expr(e, offset)),
        TypedStmt::Exit(e) => TypedStmt::Exit(remap_expr(e, offset)),
    }
}
