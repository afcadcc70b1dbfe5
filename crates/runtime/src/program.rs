//! The bytecode program model: opcodes, instructions, the constant pool and
//! the user-defined type map a [`Program`] bundles together.

use std::fmt;
use vvm_core::{Operand, TypeInterner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithOp {
    fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Mod => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Prod,
    Count,
    Min,
    Max,
}

/// Operand-shape specialisation: whether each side of a binary element-wise
/// op is a scalar or a vector (`spec.md` §4.2's `<op>_<left>_<right>`
/// naming, collapsed to the shape axis — element-kind dispatch happens
/// inside the kernel, matching on the runtime `Value`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape2 {
    ScalarScalar,
    ScalarVector,
    VectorScalar,
    VectorVector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsofDirection {
    Backward,
    Forward,
    Nearest,
}

/// One VM instruction. Field order/names are the "operands" of `spec.md`
/// §6's `[opcode, operand…]` flat sequence; arity is fixed per variant by
/// construction rather than read from a side table.
#[derive(Debug, Clone)]
pub enum Instruction {
    LoadConst { dst: Operand, const_idx: u32 },
    Move { dst: Operand, src: Operand },
    BinArith { op: ArithOp, shape: Shape2, a: Operand, b: Operand, dst: Operand },
    Compare { op: CmpOp, shape: Shape2, a: Operand, b: Operand, dst: Operand },
    LogicalBin { op: LogicOp, a: Operand, b: Operand, dst: Operand },
    Not { a: Operand, dst: Operand },
    Neg { shape: Shape2, a: Operand, dst: Operand },
    Reduce { op: ReduceOp, a: Operand, dst: Operand },
    Alloc { ty: Operand, dst: Operand },
    AssignMember { target: Operand, field: u32, value: Operand },
    ReadMember { src: Operand, field: u32, dst: Operand },
    AppendMember { target: Operand, field: u32, value: Operand },
    Where { src: Operand, mask: Operand, dst: Operand },
    MultiDx { src: Operand, idx: Operand, dst: Operand },
    Categorise1 { key: Operand, labels_dst: Operand, count_dst: Operand },
    Categorise2 {
        left_key: Operand,
        right_key: Operand,
        left_labels_dst: Operand,
        right_labels_dst: Operand,
        count_dst: Operand,
    },
    /// Categorise `filtered` by `by`, pre-populate `output`'s leading
    /// by-columns, and stash the per-label sub-tables under `subtables_dst`
    /// (a `RegisterSlot::SubTables`, read back via `SubTable`).
    Group { filtered: Operand, by: Operand, output: Operand, count_dst: Operand, subtables_dst: Operand },
    SubTable { handle: Operand, index: Operand, dst: Operand },
    EqMatch { left_key: Operand, right_key: Operand, left_idx_dst: Operand, right_idx_dst: Operand },
    AsofMatch { left: Operand, right: Operand, direction: AsofDirection, strict: bool, idx_dst: Operand },
    AsofNear { left: Operand, right: Operand, idx_dst: Operand },
    AsofWithin { left: Operand, right: Operand, direction: AsofDirection, within: Operand, idx_dst: Operand },
    EqAsofMatch {
        left_key: Operand,
        right_key: Operand,
        left_asof: Operand,
        right_asof: Operand,
        direction: AsofDirection,
        strict: bool,
        left_idx_dst: Operand,
        right_idx_dst: Operand,
    },
    EqAsofNear {
        left_key: Operand,
        right_key: Operand,
        left_asof: Operand,
        right_asof: Operand,
        left_idx_dst: Operand,
        right_idx_dst: Operand,
    },
    EqAsofWithin {
        left_key: Operand,
        right_key: Operand,
        left_asof: Operand,
        right_asof: Operand,
        direction: AsofDirection,
        within: Operand,
        left_idx_dst: Operand,
        right_idx_dst: Operand,
    },
    ISort { by: Operand, perm_dst: Operand },
    Take { src: Operand, field_names_const: u32, ty: Operand, dst: Operand },
    Concat { left: Operand, right: Operand, ty: Operand, dst: Operand },
    Call { func_const: u32, args: Vec<Operand>, dst: Operand },
    Ret { value: Operand },
    Br { target: usize },
    BFalse { cond: Operand, target: usize },
    Repr { value: Operand, dst: Operand },
    Save { value: Operand },
    Print { value: Operand },
    LoadCsv { path: Operand, ty: Operand, dst: Operand },
    StoreCsv { path: Operand, df: Operand },
    Del { target: Operand },
    Exit { code: Operand },
    Halt,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadConst { dst, const_idx } => write!(f, "loadconst {dst:?} @{const_idx}"),
            Instruction::Move { dst, src } => write!(f, "move {dst:?} {src:?}"),
            Instruction::BinArith { op, shape, a, b, dst } => {
                write!(f, "{}_{} {a:?} {b:?} {dst:?}", op.symbol(), shape_suffix(*shape))
            }
            Instruction::Compare { op, shape, a, b, dst } => {
                write!(f, "{}_{} {a:?} {b:?} {dst:?}", op.symbol(), shape_suffix(*shape))
            }
            Instruction::LogicalBin { op, a, b, dst } => {
                write!(f, "{} {a:?} {b:?} {dst:?}", if *op == LogicOp::And { "and" } else { "or" })
            }
            Instruction::Not { a, dst } => write!(f, "not {a:?} {dst:?}"),
            Instruction::Neg { a, dst, .. } => write!(f, "neg {a:?} {dst:?}"),
            Instruction::Reduce { op, a, dst } => write!(f, "reduce_{:?} {a:?} {dst:?}", op),
            Instruction::Alloc { ty, dst } => write!(f, "alloc {ty:?} {dst:?}"),
            Instruction::AssignMember { target, field, value } => {
                write!(f, "assign {target:?} .{field} {value:?}")
            }
            Instruction::ReadMember { src, field, dst } => write!(f, "member {src:?} .{field} {dst:?}"),
            Instruction::AppendMember { target, field, value } => {
                write!(f, "append {target:?} .{field} {value:?}")
            }
            Instruction::Where { src, mask, dst } => write!(f, "where {src:?} {mask:?} {dst:?}"),
            Instruction::MultiDx { src, idx, dst } => write!(f, "multidx {src:?} {idx:?} {dst:?}"),
            Instruction::Categorise1 { key, labels_dst, count_dst } => {
                write!(f, "categorise1 {key:?} {labels_dst:?} {count_dst:?}")
            }
            Instruction::Categorise2 { left_key, right_key, left_labels_dst, right_labels_dst, count_dst } => {
                write!(
                    f,
                    "categorise2 {left_key:?} {right_key:?} {left_labels_dst:?} {right_labels_dst:?} {count_dst:?}"
                )
            }
            Instruction::Group { filtered, by, output, count_dst, subtables_dst } => {
                write!(f, "group {filtered:?} {by:?} {output:?} {count_dst:?} {subtables_dst:?}")
            }
            Instruction::SubTable { handle, index, dst } => write!(f, "subtable {handle:?} {index:?} {dst:?}"),
            Instruction::EqMatch { left_key, right_key, left_idx_dst, right_idx_dst } => {
                write!(f, "eqmatch {left_key:?} {right_key:?} {left_idx_dst:?} {right_idx_dst:?}")
            }
            Instruction::AsofMatch { left, right, direction, strict, idx_dst } => {
                write!(f, "asofmatch_{:?}{} {left:?} {right:?} {idx_dst:?}", direction, if *strict { "_strict" } else { "" })
            }
            Instruction::AsofNear { left, right, idx_dst } => write!(f, "asofnear {left:?} {right:?} {idx_dst:?}"),
            Instruction::AsofWithin { left, right, direction, within, idx_dst } => {
                write!(f, "asofwithin_{:?} {left:?} {right:?} {within:?} {idx_dst:?}", direction)
            }
            Instruction::EqAsofMatch { left_key, right_key, left_asof, right_asof, direction, strict, left_idx_dst, right_idx_dst } => {
                write!(
                    f,
                    "eqasofmatch_{:?}{} {left_key:?} {right_key:?} {left_asof:?} {right_asof:?} {left_idx_dst:?} {right_idx_dst:?}",
                    direction, if *strict { "_strict" } else { "" }
                )
            }
            Instruction::EqAsofNear { left_key, right_key, left_asof, right_asof, left_idx_dst, right_idx_dst } => {
                write!(
                    f,
                    "eqasofnear {left_key:?} {right_key:?} {left_asof:?} {right_asof:?} {left_idx_dst:?} {right_idx_dst:?}"
                )
            }
            Instruction::EqAsofWithin { left_key, right_key, left_asof, right_asof, direction, within, left_idx_dst, right_idx_dst } => {
                write!(
                    f,
                    "eqasofwithin_{:?} {left_key:?} {right_key:?} {left_asof:?} {right_asof:?} {within:?} {left_idx_dst:?} {right_idx_dst:?}",
                    direction
                )
            }
            Instruction::ISort { by, perm_dst } => write!(f, "isort {by:?} {perm_dst:?}"),
            Instruction::Take { src, field_names_const, ty, dst } => {
                write!(f, "take {src:?} @{field_names_const} {ty:?} {dst:?}")
            }
            Instruction::Concat { left, right, ty, dst } => write!(f, "concat {left:?} {right:?} {ty:?} {dst:?}"),
            Instruction::Call { func_const, args, dst } => {
                write!(f, "call @{func_const} {}", args.len() + 1)?;
                for a in args {
                    write!(f, " {a:?}")?;
                }
                write!(f, " {dst:?}")
            }
            Instruction::Ret { value } => write!(f, "ret {value:?}"),
            Instruction::Br { target } => write!(f, "br {target}"),
            Instruction::BFalse { cond, target } => write!(f, "bfalse {cond:?} {target}"),
            Instruction::Repr { value, dst } => write!(f, "repr {value:?} {dst:?}"),
            Instruction::Save { value } => write!(f, "save {value:?}"),
            Instruction::Print { value } => write!(f, "print {value:?}"),
            Instruction::LoadCsv { path, ty, dst } => write!(f, "load {path:?} {ty:?} {dst:?}"),
            Instruction::StoreCsv { path, df } => write!(f, "store {path:?} {df:?}"),
            Instruction::Del { target } => write!(f, "del {target:?}"),
            Instruction::Exit { code } => write!(f, "exit {code:?}"),
            Instruction::Halt => write!(f, "halt"),
        }
    }
}

fn shape_suffix(shape: Shape2) -> &'static str {
    match shape {
        Shape2::ScalarScalar => "s_s",
        Shape2::ScalarVector => "s_v",
        Shape2::VectorScalar => "v_s",
        Shape2::VectorVector => "v_v",
    }
}

/// A constant-pool entry: `spec.md` §3 "A constant pool maps `Global`
/// operand -> tagged pointer (`Int64`, `Float64`, `String`, or
/// `FunctionDef`)". `StringList` is this implementation's addition for
/// `take`'s field-name list (there is no other way to embed a `Vec<String>`
/// operand in a flat instruction).
#[derive(Debug, Clone)]
pub enum ConstantValue {
    Int64(i64),
    Float64(f64),
    Bool(bool),
    Char(u8),
    String(String),
    StringList(Vec<String>),
    FunctionDef(FunctionDef),
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub arity: usize,
    pub entry: usize,
    pub end: usize,
    pub local_count: u32,
}

/// A bundle of instructions, constant pool and user-defined type map —
/// `spec.md` §3 "Programs".
#[derive(Debug, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
    pub constants: Vec<ConstantValue>,
    pub types: TypeInterner,
    pub top_level_locals: u32,
}

impl Program {
    pub fn new() -> Self {
        Program {
            instructions: Vec::new(),
            constants: Vec::new(),
            types: TypeInterner::new(),
            top_level_locals: 0,
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.constants.iter().enumerate() {
            match c {
                ConstantValue::Int64(n) => writeln!(f, "@{i} = {n}")?,
                ConstantValue::Float64(x) => writeln!(f, "@{i} = {x}")?,
                ConstantValue::Bool(b) => writeln!(f, "@{i} = {b}")?,
                ConstantValue::Char(c) => writeln!(f, "@{i} = '{}'", *c as char)?,
                ConstantValue::String(s) => writeln!(f, "@{i} = {s:?}")?,
                ConstantValue::StringList(items) => writeln!(f, "@{i} = {items:?}")?,
                ConstantValue::FunctionDef(fd) => {
                    writeln!(f, "@{i} = def {}({}) [{}..{}]:", fd.name, fd.arity, fd.entry, fd.end)?;
                }
            }
        }
        for (i, instr) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:>4}: {instr}")?;
        }
        Ok(())
    }
}
