//! The untyped syntax tree the analyzer consumes. `spec.md` treats concrete
//! parsing as an external collaborator ("produces an untyped syntax tree");
//! this crate's `parser` module is that collaborator, kept deliberately
//! thin so the interesting work stays in `analyzer`/`codegen`.

#[derive(Debug, Clone)]
pub enum TypeExpr {
    Named(String),
    /// `!Name` — Dataframe of the record type `Name`.
    Dataframe(String),
    /// `Name{args}` — a template instantiation used as a type.
    Template(String, Vec<TemplateArg>),
}

#[derive(Debug, Clone)]
pub enum TemplateArg {
    Type(TypeExpr),
    Value(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

#[derive(Debug, Clone)]
pub enum Expr {
    IntLit(i64),
    FloatLit(f64),
    StringLit(String),
    CharLit(u8),
    BoolLit(bool),
    Ident(String),
    /// `Name{args}` used as a callee — a template instantiation.
    TemplateIdent(String, Vec<TemplateArg>),
    /// `[e0, e1, ...]` — a vector literal.
    VectorLit(Vec<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    Assign(Box<Expr>, Box<Expr>),
    /// `recv.field`
    Member(Box<Expr>, String),
    /// `callee(args)` — covers function calls and type-constructor calls.
    Call(Box<Expr>, Vec<Expr>),
    Query(QueryExpr),
    Sort(SortExpr),
    Join(JoinExpr),
    Block(Vec<Stmt>),
    If(Vec<(Expr, Vec<Stmt>)>, Option<Vec<Stmt>>),
}

#[derive(Debug, Clone)]
pub struct QueryExpr {
    pub source: Box<Expr>,
    pub select: Vec<(String, Expr)>,
    pub by: Vec<(String, Expr)>,
    pub filter: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub struct SortExpr {
    pub source: Box<Expr>,
    pub by: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsofDir {
    Backward,
    Forward,
    Nearest,
}

#[derive(Debug, Clone)]
pub struct JoinExpr {
    pub left: Box<Expr>,
    pub right: Box<Expr>,
    pub on: Vec<Expr>,
    pub asof: Option<(Expr, Expr)>,
    pub strict: bool,
    pub direction: Option<AsofDir>,
    pub within: Option<Box<Expr>>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Let { name: String, ty: Option<TypeExpr>, value: Expr },
    Var { name: String, ty: Option<TypeExpr>, value: Expr },
    Expr(Expr),
    While { cond: Expr, body: Vec<Stmt> },
    Return(Option<Expr>),
    Print(Expr),
    Save(Expr),
    Exit(Expr),
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Vec<Stmt>,
    pub inline: bool,
    /// Non-empty for `generic`: placeholder type names inferred from args.
    pub generic_params: Vec<String>,
    /// Non-empty for `macro`: these parameter names must be comptime.
    pub macro_params: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
}

#[derive(Debug, Clone)]
pub struct DataDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    /// Non-empty for `template data Name{T}: ...`.
    pub template_params: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Item {
    Data(DataDecl),
    Function(FunctionDecl),
    Stmt(Stmt),
}

#[derive(Debug, Clone, Default)]
pub struct Module {
    pub items: Vec<Item>,
}
