//! The Vector VM dispatch loop (`spec.md` §3, §5).
//!
//! `call`/`ret` are implemented as native Rust recursion: [`Vm::run_range`]
//! calls itself for a callee's instruction range and its `Ret` becomes the
//! Rust return value, so the host call stack does the frame push/pop and
//! there is no hand-rolled frame stack or instruction-pointer restore.

use crate::config::VmConfig;
use crate::error::RuntimeError;
use crate::kernels::{csv, display, elementwise, table};
use crate::program::{ArithOp, CmpOp, ConstantValue, Instruction, LogicOp, Program, ReduceOp, Shape2};
use crate::registers::{Frame, RegisterSlot, StateBank};
use std::io::Write as _;
use vvm_core::{Dataframe, Operand, OperandKind, Scalar, TypeCode, Value, VectorData};

pub struct Vm<'p> {
    program: &'p Program,
    state: StateBank,
    config: VmConfig,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program, config: VmConfig) -> Self {
        Vm::with_state(program, config, StateBank::default())
    }

    /// Rebuilds a `Vm` against a (possibly longer) `program`, carrying over
    /// `state` from a previous run. `Session` uses this to keep `var`
    /// bindings alive across `evaluate()` calls even though each call
    /// re-borrows a freshly grown [`Program`] with a new lifetime.
    pub fn with_state(program: &'p Program, config: VmConfig, state: StateBank) -> Self {
        Vm { program, state, config }
    }

    pub fn into_state(self) -> StateBank {
        self.state
    }

    /// Runs the program's top-level instructions (index `0`), in a frame
    /// sized for `top_level_locals`. Returns the value of the last `Ret`
    /// encountered, if any (used by `Session` to surface a REPL result).
    pub fn run(&mut self) -> Result<Option<Value>, RuntimeError> {
        self.run_from(0)
    }

    /// Runs top-level instructions starting at `start` rather than `0` — for
    /// a REPL session whose `Program` only grows, re-running everything
    /// before the newest statement would re-execute completed side effects
    /// (prints, appends to `var`s), so `Session` passes the offset where the
    /// previous call left off.
    pub fn run_from(&mut self, start: usize) -> Result<Option<Value>, RuntimeError> {
        let mut frame = Frame::new(self.program.top_level_locals);
        self.run_range(&mut frame, start, self.program.instructions.len())
    }

    fn run_range(&mut self, frame: &mut Frame, start: usize, end: usize) -> Result<Option<Value>, RuntimeError> {
        let mut ip = start;
        while ip < end {
            match &self.program.instructions[ip] {
                Instruction::Halt => return Ok(None),
                Instruction::Ret { value } => return Ok(Some(self.read_value(frame, *value))),
                Instruction::Exit { code } => {
                    let n = match self.read_value(frame, *code) {
                        Value::Scalar(Scalar::Int64(n)) => n as i32,
                        other => panic!("exit code must be Int64, got {other:?}"),
                    };
                    return Err(RuntimeError::Exit(n));
                }
                Instruction::Br { target } => {
                    ip = *target;
                    continue;
                }
                Instruction::BFalse { cond, target } => {
                    if !as_bool(&self.read_value(frame, *cond)) {
                        ip = *target;
                        continue;
                    }
                }
                other => self.step(frame, other)?,
            }
            ip += 1;
        }
        Ok(None)
    }

    fn step(&mut self, frame: &mut Frame, instr: &Instruction) -> Result<(), RuntimeError> {
        match instr {
            Instruction::LoadConst { dst, const_idx } => {
                let v = self.constant_value(*const_idx);
                self.write(frame, *dst, RegisterSlot::Value(v));
            }
            Instruction::Move { dst, src } => {
                let v = self.read_value(frame, *src);
                self.write(frame, *dst, RegisterSlot::Value(v));
            }
            Instruction::BinArith { op, shape, a, b, dst } => {
                let result = self.bin_arith(frame, *op, *shape, *a, *b)?;
                self.write(frame, *dst, RegisterSlot::Value(result));
            }
            Instruction::Compare { op, shape, a, b, dst } => {
                let result = self.compare(frame, *op, *shape, *a, *b)?;
                self.write(frame, *dst, RegisterSlot::Value(result));
            }
            Instruction::LogicalBin { op, a, b, dst } => {
                let av = as_bool(&self.read_value(frame, *a));
                let bv = as_bool(&self.read_value(frame, *b));
                let r = match op {
                    LogicOp::And => av && bv,
                    LogicOp::Or => av || bv,
                };
                self.write(frame, *dst, RegisterSlot::Value(Value::Scalar(Scalar::Bool(r))));
            }
            Instruction::Not { a, dst } => {
                let av = as_bool(&self.read_value(frame, *a));
                self.write(frame, *dst, RegisterSlot::Value(Value::Scalar(Scalar::Bool(!av))));
            }
            Instruction::Neg { a, dst, .. } => {
                let result = self.negate(frame, *a)?;
                self.write(frame, *dst, RegisterSlot::Value(result));
            }
            Instruction::Reduce { op, a, dst } => {
                let v = self.read_value(frame, *a);
                let vector = expect_vector(&v)?;
                let result = elementwise::reduce(*op, vector)?;
                self.write(frame, *dst, RegisterSlot::Value(Value::Scalar(result)));
            }
            Instruction::Alloc { ty, dst } => {
                let tc = self.type_operand(*ty)?;
                let value = self.alloc(tc);
                self.write(frame, *dst, RegisterSlot::Value(value));
            }
            Instruction::AssignMember { target, field, value } => {
                let v = self.read_value(frame, *value);
                let vector = expect_vector(&v)?.clone();
                self.dataframe_mut(frame, *target).columns[*field as usize] = vector;
            }
            Instruction::ReadMember { src, field, dst } => {
                let v = self.read_value(frame, *src);
                let df = expect_dataframe(&v)?;
                let column = df.columns[*field as usize].clone();
                self.write(frame, *dst, RegisterSlot::Value(Value::Vector(column)));
            }
            Instruction::AppendMember { target, field, value } => {
                let v = self.read_value(frame, *value);
                let scalar = expect_scalar(&v)?.clone();
                self.dataframe_mut(frame, *target).columns[*field as usize].push(scalar);
            }
            Instruction::Where { src, mask, dst } => {
                let src_v = self.read_value(frame, *src);
                let df = expect_dataframe(&src_v)?;
                let mask_v = self.read_value(frame, *mask);
                let mask_bits = bool_vec(expect_vector(&mask_v)?);
                let result = table::where_filter(df, &mask_bits);
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(result)));
            }
            Instruction::MultiDx { src, idx, dst } => {
                let src_v = self.read_value(frame, *src);
                let df = expect_dataframe(&src_v)?;
                let idx_v = self.read_value(frame, *idx);
                let idx_vals = int_vec(expect_vector(&idx_v)?);
                let result = table::multidx(df, &idx_vals);
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(result)));
            }
            Instruction::Categorise1 { key, labels_dst, count_dst } => {
                let key_v = self.read_value(frame, *key);
                let df = expect_dataframe(&key_v)?;
                let (labels, count) = table::categorise_table(df);
                self.write(frame, *labels_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(labels))));
                self.write(frame, *count_dst, RegisterSlot::Value(Value::Scalar(Scalar::Int64(count as i64))));
            }
            Instruction::Categorise2 { left_key, right_key, left_labels_dst, right_labels_dst, count_dst } => {
                let lv = self.read_value(frame, *left_key);
                let rv = self.read_value(frame, *right_key);
                let (left_labels, right_labels, count) =
                    table::categorise_tables_joint(expect_dataframe(&lv)?, expect_dataframe(&rv)?);
                self.write(frame, *left_labels_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(left_labels))));
                self.write(frame, *right_labels_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(right_labels))));
                self.write(frame, *count_dst, RegisterSlot::Value(Value::Scalar(Scalar::Int64(count as i64))));
            }
            Instruction::Group { filtered, by, output, count_dst, subtables_dst } => {
                let fv = self.read_value(frame, *filtered);
                let bv = self.read_value(frame, *by);
                let (by_result, sub_tables) = table::group(expect_dataframe(&fv)?, expect_dataframe(&bv)?);
                let count = sub_tables.len();
                {
                    let out = self.dataframe_mut(frame, *output);
                    for (i, col) in by_result.columns.into_iter().enumerate() {
                        out.columns[i] = col;
                    }
                }
                self.write(frame, *count_dst, RegisterSlot::Value(Value::Scalar(Scalar::Int64(count as i64))));
                self.write(frame, *subtables_dst, RegisterSlot::SubTables(sub_tables));
            }
            Instruction::SubTable { handle, index, dst } => {
                let idx = match self.read_value(frame, *index) {
                    Value::Scalar(Scalar::Int64(n)) => n as usize,
                    other => panic!("subtable index must be Int64, got {other:?}"),
                };
                let df = self.slot_ref(frame, *handle).as_sub_tables()[idx].clone();
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(df)));
            }
            Instruction::EqMatch { left_key, right_key, left_idx_dst, right_idx_dst } => {
                let lv = self.read_value(frame, *left_key);
                let rv = self.read_value(frame, *right_key);
                let (left_idx, right_idx) = table::eq_match(expect_dataframe(&lv)?, expect_dataframe(&rv)?)?;
                self.write(frame, *left_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(left_idx))));
                self.write(frame, *right_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(right_idx))));
            }
            Instruction::AsofMatch { left, right, direction, strict, idx_dst } => {
                let lv = self.read_value(frame, *left);
                let rv = self.read_value(frame, *right);
                let idx = table::asof_match(expect_vector(&lv)?, expect_vector(&rv)?, *direction, *strict);
                self.write(frame, *idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(idx))));
            }
            Instruction::AsofNear { left, right, idx_dst } => {
                let lv = self.read_value(frame, *left);
                let rv = self.read_value(frame, *right);
                let idx = table::asof_nearest(&int_vec(expect_vector(&lv)?), &int_vec(expect_vector(&rv)?));
                self.write(frame, *idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(idx))));
            }
            Instruction::AsofWithin { left, right, direction, within, idx_dst } => {
                let lv = self.read_value(frame, *left);
                let rv = self.read_value(frame, *right);
                let wv = self.read_value(frame, *within);
                let idx = table::asof_within(expect_vector(&lv)?, expect_vector(&rv)?, *direction, expect_scalar(&wv)?);
                self.write(frame, *idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(idx))));
            }
            Instruction::EqAsofMatch { left_key, right_key, left_asof, right_asof, direction, strict, left_idx_dst, right_idx_dst } => {
                let (l, r) = self.eq_asof(frame, *left_key, *right_key, *left_asof, *right_asof, *direction, *strict, None)?;
                self.write(frame, *left_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(l))));
                self.write(frame, *right_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(r))));
            }
            Instruction::EqAsofNear { left_key, right_key, left_asof, right_asof, left_idx_dst, right_idx_dst } => {
                let (l, r) = self.eq_asof(
                    frame,
                    *left_key,
                    *right_key,
                    *left_asof,
                    *right_asof,
                    crate::program::AsofDirection::Nearest,
                    false,
                    None,
                )?;
                self.write(frame, *left_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(l))));
                self.write(frame, *right_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(r))));
            }
            Instruction::EqAsofWithin { left_key, right_key, left_asof, right_asof, direction, within, left_idx_dst, right_idx_dst } => {
                let w = match self.read_value(frame, *within) {
                    Value::Scalar(Scalar::Timedelta(n)) | Value::Scalar(Scalar::Int64(n)) => n,
                    other => panic!("within tolerance must be Timedelta/Int64, got {other:?}"),
                };
                let (l, r) = self.eq_asof(frame, *left_key, *right_key, *left_asof, *right_asof, *direction, false, Some(w))?;
                self.write(frame, *left_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(l))));
                self.write(frame, *right_idx_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(r))));
            }
            Instruction::ISort { by, perm_dst } => {
                let bv = self.read_value(frame, *by);
                let perm = table::isort(expect_dataframe(&bv)?);
                self.write(frame, *perm_dst, RegisterSlot::Value(Value::Vector(VectorData::Int64(perm))));
            }
            Instruction::Take { src, field_names_const, ty, dst } => {
                let src_v = self.read_value(frame, *src);
                let src_df = expect_dataframe(&src_v)?;
                let src_ty = self
                    .program
                    .types
                    .get(src_df.type_code)
                    .expect("take: source Dataframe type must be interned");
                let names = match &self.program.constants[*field_names_const as usize] {
                    ConstantValue::StringList(names) => names,
                    other => panic!("take: expected a StringList constant, found {other:?}"),
                };
                let dst_ty = self.type_operand(*ty)?;
                let result = table::take(src_df, src_ty, names, dst_ty);
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(result)));
            }
            Instruction::Concat { left, right, ty, dst } => {
                let lv = self.read_value(frame, *left);
                let rv = self.read_value(frame, *right);
                let dst_ty = self.type_operand(*ty)?;
                let result = table::concat(expect_dataframe(&lv)?, expect_dataframe(&rv)?, dst_ty)?;
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(result)));
            }
            Instruction::Call { func_const, args, dst } => {
                let result = self.call(frame, *func_const, args)?;
                self.write(frame, *dst, RegisterSlot::Value(result));
            }
            Instruction::Repr { value, dst } => {
                let v = self.read_value(frame, *value);
                let rendered = self.repr(&v);
                self.write(frame, *dst, RegisterSlot::Value(Value::Scalar(Scalar::String(rendered))));
            }
            Instruction::Save { value } => {
                let v = self.read_value(frame, *value);
                let rendered = self.repr(&v);
                println!("{rendered}");
            }
            Instruction::Print { value } => {
                let v = self.read_value(frame, *value);
                let rendered = self.repr(&v);
                let mut out = std::io::stdout();
                let _ = writeln!(out, "{rendered}");
            }
            Instruction::LoadCsv { path, ty, dst } => {
                let path_v = self.read_value(frame, *path);
                let path_str = match expect_scalar(&path_v)? {
                    Scalar::String(s) => s.clone(),
                    other => panic!("CSV path must be a String, got {other:?}"),
                };
                let tc = self.type_operand(*ty)?;
                let user_ty = self.program.types.get(tc).expect("load: unresolved Dataframe type").clone();
                let df = csv::load_csv(&path_str, &user_ty, tc)?;
                self.write(frame, *dst, RegisterSlot::Value(Value::Dataframe(df)));
            }
            Instruction::StoreCsv { path, df } => {
                let path_v = self.read_value(frame, *path);
                let path_str = match expect_scalar(&path_v)? {
                    Scalar::String(s) => s.clone(),
                    other => panic!("CSV path must be a String, got {other:?}"),
                };
                let df_v = self.read_value(frame, *df);
                let dataframe = expect_dataframe(&df_v)?;
                let user_ty = self
                    .program
                    .types
                    .get(dataframe.type_code)
                    .expect("store: unresolved Dataframe type");
                csv::store_csv(&path_str, dataframe, user_ty)?;
            }
            Instruction::Del { target } => {
                // Explicit register release; the owning bank already drops
                // the previous slot's contents on overwrite, so this is a
                // bookkeeping no-op read (kept so codegen can always emit
                // `del` without special-casing "never read again").
                let _ = self.slot_ref(frame, *target);
            }
            Instruction::Halt | Instruction::Ret { .. } | Instruction::Exit { .. } | Instruction::Br { .. } | Instruction::BFalse { .. } => {
                unreachable!("control-flow instructions are handled in run_range")
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn eq_asof(
        &mut self,
        frame: &mut Frame,
        left_key: Operand,
        right_key: Operand,
        left_asof: Operand,
        right_asof: Operand,
        direction: crate::program::AsofDirection,
        strict: bool,
        within: Option<i64>,
    ) -> Result<(Vec<i64>, Vec<i64>), RuntimeError> {
        let lk = self.read_value(frame, left_key);
        let rk = self.read_value(frame, right_key);
        let la = self.read_value(frame, left_asof);
        let ra = self.read_value(frame, right_asof);
        Ok(table::eq_asof(
            expect_dataframe(&lk)?,
            expect_dataframe(&rk)?,
            expect_vector(&la)?,
            expect_vector(&ra)?,
            direction,
            strict,
            within,
        ))
    }

    fn call(&mut self, frame: &mut Frame, func_const: u32, args: &[Operand]) -> Result<Value, RuntimeError> {
        let fd = match &self.program.constants[func_const as usize] {
            ConstantValue::FunctionDef(fd) => fd.clone(),
            other => panic!("call: expected a FunctionDef constant, found {other:?}"),
        };
        if args.len() != fd.arity {
            return Err(RuntimeError::ArityMismatch { expected: fd.arity, got: args.len() });
        }
        let mut callee = Frame::new(fd.local_count);
        for (i, arg) in args.iter().enumerate() {
            let v = self.read_value(frame, *arg);
            callee.set(i as u32, RegisterSlot::Value(v));
        }
        let result = self.run_range(&mut callee, fd.entry, fd.end)?;
        Ok(result.unwrap_or_else(|| panic!("function '{}' fell through without a `ret`", fd.name)))
    }

    fn repr(&self, value: &Value) -> String {
        let df_ty = match value {
            Value::Dataframe(df) => self.program.types.get(df.type_code),
            _ => None,
        };
        display::format_value(value, df_ty, self.config.console_height)
    }

    fn alloc(&self, ty: TypeCode) -> Value {
        let def = self.program.types.get(ty).expect("alloc: unresolved user-defined type");
        let columns = def
            .fields
            .iter()
            .map(|(_, field_ty)| {
                let (kind, _) = field_ty.as_builtin().expect("Dataframe fields are builtin-typed");
                empty_vector(kind)
            })
            .collect();
        Value::Dataframe(Dataframe { type_code: ty, columns })
    }

    fn bin_arith(&mut self, frame: &mut Frame, op: ArithOp, shape: Shape2, a: Operand, b: Operand) -> Result<Value, RuntimeError> {
        let av = self.read_value(frame, a);
        let bv = self.read_value(frame, b);
        Ok(match shape {
            Shape2::ScalarScalar => Value::Scalar(elementwise::scalar_arith(op, expect_scalar(&av)?, expect_scalar(&bv)?)?),
            Shape2::VectorVector => Value::Vector(elementwise::vector_arith(op, expect_vector(&av)?, expect_vector(&bv)?)?),
            Shape2::VectorScalar => Value::Vector(elementwise::vector_scalar_arith(op, expect_vector(&av)?, expect_scalar(&bv)?)?),
            Shape2::ScalarVector => Value::Vector(elementwise::scalar_vector_arith(op, expect_scalar(&av)?, expect_vector(&bv)?)?),
        })
    }

    fn compare(&mut self, frame: &mut Frame, op: CmpOp, shape: Shape2, a: Operand, b: Operand) -> Result<Value, RuntimeError> {
        let av = self.read_value(frame, a);
        let bv = self.read_value(frame, b);
        Ok(match shape {
            Shape2::ScalarScalar => Value::Scalar(Scalar::Bool(elementwise::scalar_compare(op, expect_scalar(&av)?, expect_scalar(&bv)?)?)),
            Shape2::VectorVector => {
                Value::Vector(VectorData::Bool(elementwise::vector_compare(op, expect_vector(&av)?, expect_vector(&bv)?)?))
            }
            Shape2::VectorScalar => {
                Value::Vector(VectorData::Bool(elementwise::vector_scalar_compare(op, expect_vector(&av)?, expect_scalar(&bv)?)?))
            }
            Shape2::ScalarVector => {
                Value::Vector(VectorData::Bool(elementwise::scalar_vector_compare(op, expect_scalar(&av)?, expect_vector(&bv)?)?))
            }
        })
    }

    fn negate(&mut self, frame: &mut Frame, a: Operand) -> Result<Value, RuntimeError> {
        let av = self.read_value(frame, a);
        match &av {
            Value::Scalar(s) => Ok(Value::Scalar(negate_scalar(s)?)),
            Value::Vector(v) => Ok(Value::Vector(negate_vector(v)?)),
            other => Err(RuntimeError::InvalidOpcodeForType { opcode: "neg", type_name: format!("{:?}", other.type_code()) }),
        }
    }

    fn read_value(&self, frame: &Frame, op: Operand) -> Value {
        match op.kind() {
            OperandKind::Immediate => Value::Scalar(Scalar::Int64(op.payload() as i64)),
            OperandKind::Local => frame.get(op.payload()).as_value().clone(),
            OperandKind::Global => self.constant_value(op.payload()),
            OperandKind::State => self.state.get(op.payload()).as_value().clone(),
            OperandKind::Type => panic!("a Type operand was read as a Value"),
        }
    }

    fn slot_ref<'a>(&'a self, frame: &'a Frame, op: Operand) -> &'a RegisterSlot {
        match op.kind() {
            OperandKind::Local => frame.get(op.payload()),
            OperandKind::State => self.state.get(op.payload()),
            other => panic!("expected a Local/State operand, found {other:?}"),
        }
    }

    fn dataframe_mut<'a>(&'a mut self, frame: &'a mut Frame, op: Operand) -> &'a mut Dataframe {
        match op.kind() {
            OperandKind::Local => frame.get_mut(op.payload()).as_dataframe_mut(),
            OperandKind::State => self.state.get_mut(op.payload()).as_dataframe_mut(),
            other => panic!("expected a Local/State operand, found {other:?}"),
        }
    }

    fn constant_value(&self, idx: u32) -> Value {
        match &self.program.constants[idx as usize] {
            ConstantValue::Int64(n) => Value::Scalar(Scalar::Int64(*n)),
            ConstantValue::Float64(f) => Value::Scalar(Scalar::Float64(*f)),
            ConstantValue::Bool(b) => Value::Scalar(Scalar::Bool(*b)),
            ConstantValue::Char(c) => Value::Scalar(Scalar::Char(*c)),
            ConstantValue::String(s) => Value::Scalar(Scalar::String(s.clone())),
            ConstantValue::StringList(_) => panic!("a StringList constant is not a Value (read via `take`)"),
            ConstantValue::FunctionDef(_) => panic!("a FunctionDef constant is not a Value (read via `call`)"),
        }
    }

    fn write(&mut self, frame: &mut Frame, dst: Operand, slot: RegisterSlot) {
        match dst.kind() {
            OperandKind::Local => frame.set(dst.payload(), slot),
            OperandKind::State => self.state.set(dst.payload(), slot),
            other => panic!("invalid destination operand kind {other:?}"),
        }
    }

    fn type_operand(&self, op: Operand) -> Result<TypeCode, RuntimeError> {
        op.as_type_code().ok_or(RuntimeError::ExpectedTypeOperand)
    }
}

fn as_bool(v: &Value) -> bool {
    match v {
        Value::Scalar(Scalar::Bool(b)) => *b,
        other => panic!("expected a Bool scalar, found {other:?}"),
    }
}

fn expect_scalar(v: &Value) -> Result<&Scalar, RuntimeError> {
    v.as_scalar().ok_or_else(|| RuntimeError::InvalidOpcodeForType { opcode: "expected scalar", type_name: format!("{:?}", v.type_code()) })
}

fn expect_vector(v: &Value) -> Result<&VectorData, RuntimeError> {
    v.as_vector().ok_or_else(|| RuntimeError::InvalidOpcodeForType { opcode: "expected vector", type_name: format!("{:?}", v.type_code()) })
}

fn expect_dataframe(v: &Value) -> Result<&Dataframe, RuntimeError> {
    v.as_dataframe().ok_or_else(|| RuntimeError::InvalidOpcodeForType { opcode: "expected dataframe", type_name: format!("{:?}", v.type_code()) })
}

fn bool_vec(v: &VectorData) -> Vec<bool> {
    match v {
        VectorData::Bool(bits) => bits.clone(),
        other => panic!("mask must be a Bool vector, got {:?}", other.kind()),
    }
}

fn int_vec(v: &VectorData) -> Vec<i64> {
    match v {
        VectorData::Int64(xs) => xs.clone(),
        other => panic!("index vector must be Int64, got {:?}", other.kind()),
    }
}

fn negate_scalar(s: &Scalar) -> Result<Scalar, RuntimeError> {
    Ok(match s {
        Scalar::Int64(n) => Scalar::Int64(if *n == vvm_core::NIL_INT { *n } else { -n }),
        Scalar::Float64(f) => Scalar::Float64(-f),
        Scalar::Timedelta(n) => Scalar::Timedelta(if *n == vvm_core::NIL_INT { *n } else { -n }),
        other => {
            return Err(RuntimeError::InvalidOpcodeForType { opcode: "neg", type_name: format!("{:?}", other.kind()) })
        }
    })
}

fn negate_vector(v: &VectorData) -> Result<VectorData, RuntimeError> {
    match v {
        VectorData::Int64(xs) => Ok(VectorData::Int64(xs.iter().map(|&n| if n == vvm_core::NIL_INT { n } else { -n }).collect())),
        VectorData::Float64(xs) => Ok(VectorData::Float64(xs.iter().map(|&f| -f).collect())),
        VectorData::Timedelta(xs) => {
            Ok(VectorData::Timedelta(xs.iter().map(|&n| if n == vvm_core::NIL_INT { n } else { -n }).collect()))
        }
        other => Err(RuntimeError::InvalidOpcodeForType { opcode: "neg", type_name: format!("{:?}", other.kind()) }),
    }
}

fn empty_vector(kind: vvm_core::BuiltinKind) -> VectorData {
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
