//! Typed IR: the output of the semantic analyzer and the input to code
//! generation (`spec.md` §3 "Typed IR entities").

use vvm_core::TypeCode;

/// A bitset over `{Pure, Transform, Linear, Autostream}` (`spec.md` §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Traits(u8);

impl Traits {
    pub const PURE: Traits = Traits(1 << 0);
    pub const TRANSFORM: Traits = Traits(1 << 1);
    pub const LINEAR: Traits = Traits(1 << 2);
    pub const AUTOSTREAM: Traits = Traits(1 << 3);
    pub const NONE: Traits = Traits(0);
    pub const ALL: Traits = Traits(0b1111);

    pub fn contains(self, other: Traits) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersect(self, other: Traits) -> Traits {
        Traits(self.0 & other.0)
    }

    pub fn union(self, other: Traits) -> Traits {
        Traits(self.0 | other.0)
    }
}

/// `spec.md` §4.1: `Comptime` (knowable at compile time), `Stream` (flows
/// lazily through a pipeline), `Normal` (everything else).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Comptime,
    Normal,
    Stream,
}

impl Mode {
    /// Combines a function's own mode behaviour with its arguments' modes
    /// per the rule in `spec.md` §4.1.
    pub fn of_call(func_traits: Traits, arg_modes: &[Mode]) -> Mode {
        if arg_modes.iter().any(|m| *m == Mode::Stream) {
            return Mode::Stream;
        }
        if func_traits.contains(Traits::AUTOSTREAM) {
            return Mode::Stream;
        }
        if func_traits.contains(Traits::LINEAR) && arg_modes.iter().any(|m| *m == Mode::Stream) {
            return Mode::Stream;
        }
        if func_traits.contains(Traits::PURE) && arg_modes.iter().all(|m| *m == Mode::Comptime) {
            return Mode::Comptime;
        }
        Mode::Normal
    }
}

/// A folded compile-time literal value, used for template/macro parameters
/// and to short-circuit code generation (`spec.md` §4.1 CTFE).
#[derive(Debug, Clone, PartialEq)]
pub enum ComptimeLit {
    Int(i64),
    Float(f64),
    Str(String),
    Char(u8),
    Bool(bool),
}

/// Where a resolved binding lives. `Local` slots are per-function-call
/// frame registers; `State` slots are the persistent bank that survives
/// across a [`crate::session::Session`]'s `evaluate()` calls (so `let`/`var`
/// bindings at module scope outlive the turn that created them, per
/// `spec.md` §3 "Typed IR from a REPL turn is retained as history").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Local(u32),
    State(u32),
}

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: TypeCode,
    pub traits: Traits,
    pub mode: Mode,
    pub literal: Option<ComptimeLit>,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    CharLit(u8),
    BoolLit(bool),
    VectorLit(Vec<TypedExpr>),
    Load(Binding),
    /// A bare identifier resolved via a table clause's preferred scope —
    /// equivalent to `<table>.<name>` (`spec.md` §4.1 "Implied member").
    /// Codegen supplies the table register from context (the filtered
    /// input for a row-wise clause, the current sub-table for a grouped
    /// aggregate).
    FieldRef(u32),
    Assign(Binding, Box<TypedExpr>),
    Binary(crate::ast::BinOp, Box<TypedExpr>, Box<TypedExpr>),
    Neg(Box<TypedExpr>),
    Not(Box<TypedExpr>),
    Member(Box<TypedExpr>, u32),
    /// A fully resolved call to a user function, by its analyzer-assigned
    /// function id (codegen maps this to a constant-pool slot).
    Call(u32, Vec<TypedExpr>),
    /// A call whose callee was force-inlined: the body has already been
    /// substituted with the caller's argument expressions.
    Inline(Box<TypedExpr>),
    /// A constructor call on a Dataframe or record type.
    Construct(TypeCode, Vec<TypedExpr>),
    Block(Vec<TypedStmt>, Option<Box<TypedExpr>>),
    If(Vec<(TypedExpr, Vec<TypedStmt>, Option<Box<TypedExpr>>)>, Option<(Vec<TypedStmt>, Option<Box<TypedExpr>>)>),
    Query(TypedQuery),
    Sort(TypedSort),
    Join(TypedJoin),
    /// `load{!Name}(path)`: reads a CSV file into a Dataframe of the given
    /// Dataframe type (`spec.md` "CSV load/store").
    LoadCsv(TypeCode, Box<TypedExpr>),
    /// `store(df, path)`: writes a Dataframe to a CSV file, evaluating to
    /// the same Dataframe it wrote (this language has no unit type).
    StoreCsv(Box<TypedExpr>, Box<TypedExpr>),
}

#[derive(Debug, Clone)]
pub struct TypedQuery {
    pub source: Box<TypedExpr>,
    /// Evaluated per-row (no `by`) or per-group (with `by`).
    pub select: Vec<TypedExpr>,
    pub by: Vec<TypedExpr>,
    pub filter: Option<Box<TypedExpr>>,
    pub result_ty: TypeCode,
}

#[derive(Debug, Clone)]
pub struct TypedSort {
    pub source: Box<TypedExpr>,
    pub by: Vec<TypedExpr>,
}

#[derive(Debug, Clone)]
pub struct TypedJoin {
    pub left: Box<TypedExpr>,
    pub right: Box<TypedExpr>,
    pub on: Vec<(TypedExpr, TypedExpr)>,
    pub asof: Option<(TypedExpr, TypedExpr)>,
    pub strict: bool,
    pub direction: Option<crate::ast::AsofDir>,
    pub within: Option<Box<TypedExpr>>,
    pub result_ty: TypeCode,
    pub right_take_fields: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum TypedStmt {
    Let(Binding, TypedExpr),
    Expr(TypedExpr),
    While(TypedExpr, Vec<TypedStmt>),
    Return(Option<TypedExpr>),
    Print(TypedExpr),
    Save(TypedExpr),
    Exit(TypedExpr),
}

#[derive(Debug, Clone)]
pub struct TypedFunctionDef {
    pub func_id: u32,
    pub name: String,
    pub param_types: Vec<TypeCode>,
    pub ret: TypeCode,
    pub body: Vec<TypedStmt>,
    pub tail: Option<TypedExpr>,
    pub local_count: u32,
}

/// A standard-library function the analyzer wires up as an ordinary
/// overload (so normal call resolution finds it) but that codegen lowers
/// directly to a VM opcode instead of a `call` (`spec.md` §4.2 "sum/count/
/// min/max/prod lower to `reduce`, not a function call").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Reduce(vvm_runtime::ReduceOp),
}

#[derive(Debug, Default)]
pub struct TypedModule {
    pub functions: Vec<TypedFunctionDef>,
    pub top_level: Vec<TypedStmt>,
    pub result: Option<TypedExpr>,
    /// Maps a builtin's `func_id` (registered into scope like any other
    /// overload) to the opcode codegen should emit in place of a `call`.
    pub builtins: std::collections::HashMap<u32, Builtin>,
}
