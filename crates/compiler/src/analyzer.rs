//! The semantic analyzer (`spec.md` §4.1): untyped AST → typed IR.

use crate::ast::*;
use crate::error::{Candidate, Diagnostics, SemaError};
use crate::scope::{FunctionSig, GenericDef, MacroDef, Resolved, ScopeStack, TemplateDataDef};
use crate::types::*;
use vvm_core::{BuiltinKind, Shape, TypeCode, TypeInterner, UserDefinedType};

fn builtin_kind(name: &str) -> Option<BuiltinKind> {
    Some(match name {
        "Bool" => BuiltinKind::Bool,
        "Char" => BuiltinKind::Char,
        "String" => BuiltinKind::String,
        "Int64" => BuiltinKind::Int64,
        "Float64" => BuiltinKind::Float64,
        "Date" => BuiltinKind::Date,
        "Time" => BuiltinKind::Time,
        "Timestamp" => BuiltinKind::Timestamp,
        "Timedelta" => BuiltinKind::Timedelta,
        _ => return None,
    })
}

pub fn type_display(tc: TypeCode, types: &TypeInterner) -> String {
    match tc.as_builtin() {
        Some((kind, Shape::Scalar)) => kind.name().to_string(),
        Some((kind, Shape::Vector)) => format!("[{}]", kind.name()),
        None => types.get(tc).map(|d| d.name.clone()).unwrap_or_else(|| "<unknown>".to_string()),
    }
}

fn lit_int(n: i64) -> TypedExpr {
    TypedExpr { kind: TypedExprKind::IntLit(n), ty: TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar), traits: Traits::PURE, mode: Mode::Comptime, literal: Some(ComptimeLit::Int(n)) }
}

/// Float literals are comptime-*knowable* but never comptime-*folded*:
/// floating point is excluded from CTFE for cross-platform reproducibility
/// (`spec.md` §4.1), so a float literal carries `Mode::Normal` and no
/// `literal` payload, which keeps `fold_binary` from ever seeing one.
fn lit_float(f: f64) -> TypedExpr {
    TypedExpr { kind: TypedExprKind::FloatLit(f), ty: TypeCode::builtin(BuiltinKind::Float64, Shape::Scalar), traits: Traits::PURE, mode: Mode::Normal, literal: None }
}

fn lit_string(s: String) -> TypedExpr {
    TypedExpr { kind: TypedExprKind::StringLit(s.clone()), ty: TypeCode::builtin(BuiltinKind::String, Shape::Scalar), traits: Traits::PURE, mode: Mode::Comptime, literal: Some(ComptimeLit::Str(s)) }
}

fn lit_char(c: u8) -> TypedExpr {
    TypedExpr { kind: TypedExprKind::CharLit(c), ty: TypeCode::builtin(BuiltinKind::Char, Shape::Scalar), traits: Traits::PURE, mode: Mode::Comptime, literal: Some(ComptimeLit::Char(c)) }
}

fn lit_bool(b: bool) -> TypedExpr {
    TypedExpr { kind: TypedExprKind::BoolLit(b), ty: TypeCode::builtin(BuiltinKind::Bool, Shape::Scalar), traits: Traits::PURE, mode: Mode::Comptime, literal: Some(ComptimeLit::Bool(b)) }
}

fn literal_kind(lit: ComptimeLit) -> TypedExprKind {
    match lit {
        ComptimeLit::Int(n) => TypedExprKind::IntLit(n),
        ComptimeLit::Float(f) => TypedExprKind::FloatLit(f),
        ComptimeLit::Str(s) => TypedExprKind::StringLit(s),
        ComptimeLit::Char(c) => TypedExprKind::CharLit(c),
        ComptimeLit::Bool(b) => TypedExprKind::BoolLit(b),
    }
}

fn literal_expr(lit: ComptimeLit, ty: TypeCode) -> TypedExpr {
    let kind = literal_kind(lit.clone());
    TypedExpr { kind, ty, traits: Traits::PURE, mode: Mode::Comptime, literal: Some(lit) }
}

/// Direct-IR-evaluation CTFE (`spec.md` §4.1): folds a binary operator over
/// two already-literal operands, restricted to `Int64`/`Bool`/`String`/`Char`
/// — `Float64` is excluded for reproducibility. Division/modulo by zero are
/// left unfolded so the runtime's nil semantics apply instead of a panic.
fn fold_binary(op: BinOp, lt: &TypedExpr, rt: &TypedExpr, kind: BuiltinKind) -> Option<ComptimeLit> {
    let (ll, rl) = (lt.literal.as_ref()?, rt.literal.as_ref()?);
    match (kind, ll, rl) {
        (BuiltinKind::Int64, ComptimeLit::Int(a), ComptimeLit::Int(b)) => match op {
            BinOp::Add => Some(ComptimeLit::Int(a.wrapping_add(*b))),
            BinOp::Sub => Some(ComptimeLit::Int(a.wrapping_sub(*b))),
            BinOp::Mul => Some(ComptimeLit::Int(a.wrapping_mul(*b))),
            BinOp::Div if *b != 0 => Some(ComptimeLit::Int(a / b)),
            BinOp::Mod if *b != 0 => Some(ComptimeLit::Int(a % b)),
            BinOp::Lt => Some(ComptimeLit::Bool(a < b)),
            BinOp::Le => Some(ComptimeLit::Bool(a <= b)),
            BinOp::Gt => Some(ComptimeLit::Bool(a > b)),
            BinOp::Ge => Some(ComptimeLit::Bool(a >= b)),
            BinOp::Eq => Some(ComptimeLit::Bool(a == b)),
            BinOp::Ne => Some(ComptimeLit::Bool(a != b)),
            _ => None,
        },
        (BuiltinKind::Bool, ComptimeLit::Bool(a), ComptimeLit::Bool(b)) => match op {
            BinOp::And => Some(ComptimeLit::Bool(*a && *b)),
            BinOp::Or => Some(ComptimeLit::Bool(*a || *b)),
            BinOp::Eq => Some(ComptimeLit::Bool(a == b)),
            BinOp::Ne => Some(ComptimeLit::Bool(a != b)),
            _ => None,
        },
        (BuiltinKind::String, ComptimeLit::Str(a), ComptimeLit::Str(b)) => match op {
            BinOp::Eq => Some(ComptimeLit::Bool(a == b)),
            BinOp::Ne => Some(ComptimeLit::Bool(a != b)),
            _ => None,
        },
        (BuiltinKind::Char, ComptimeLit::Char(a), ComptimeLit::Char(b)) => match op {
            BinOp::Eq => Some(ComptimeLit::Bool(a == b)),
            BinOp::Ne => Some(ComptimeLit::Bool(a != b)),
            BinOp::Lt => Some(ComptimeLit::Bool(a < b)),
            BinOp::Le => Some(ComptimeLit::Bool(a <= b)),
            BinOp::Gt => Some(ComptimeLit::Bool(a > b)),
            BinOp::Ge => Some(ComptimeLit::Bool(a >= b)),
            _ => None,
        },
        _ => None,
    }
}

pub struct Analyzer {
    scopes: ScopeStack,
    next_func_id: u32,
    next_state_slot: u32,
    local_counter: u32,
    in_function: bool,
    /// Bodies of generic/macro specializations, analyzed lazily at their
    /// first call site and spliced into the module's function list once
    /// `analyze_module` finishes walking top-level items.
    pending_functions: Vec<TypedFunctionDef>,
    /// `func_id` -> opcode for the reduction builtins registered by
    /// `register_builtins` (`sum`/`prod`/`count`/`min`/`max`).
    builtins: std::collections::HashMap<u32, Builtin>,
}

impl Analyzer {
    pub fn new(interactive: bool) -> Self {
        let mut a = Analyzer {
            scopes: ScopeStack::new(interactive),
            next_func_id: 0,
            next_state_slot: 0,
            local_counter: 0,
            in_function: false,
            pending_functions: Vec::new(),
            builtins: std::collections::HashMap::new(),
        };
        a.register_builtins();
        a
    }

    /// Registers `sum`/`prod`/`min`/`max`/`count` as ordinary overloaded
    /// functions, one per element kind, so normal call resolution finds
    /// them; each is tagged in `builtins` so codegen emits a `Reduce`
    /// instruction in place of a `call` (`spec.md` §4.2).
    fn register_builtins(&mut self) {
        use vvm_runtime::ReduceOp;
        let numeric = [BuiltinKind::Int64, BuiltinKind::Float64];
        for kind in numeric {
            let vector = TypeCode::builtin(kind, Shape::Vector);
            let scalar = TypeCode::builtin(kind, Shape::Scalar);
            for (name, op) in [("sum", ReduceOp::Sum), ("prod", ReduceOp::Prod), ("min", ReduceOp::Min), ("max", ReduceOp::Max)] {
                self.declare_reduce_builtin(name, vector, scalar, op);
            }
        }
        for kind in [BuiltinKind::Bool, BuiltinKind::Char, BuiltinKind::String, BuiltinKind::Int64, BuiltinKind::Float64, BuiltinKind::Date, BuiltinKind::Time, BuiltinKind::Timestamp, BuiltinKind::Timedelta] {
            let vector = TypeCode::builtin(kind, Shape::Vector);
            self.declare_reduce_builtin("count", vector, TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar), ReduceOp::Count);
        }
    }

    fn declare_reduce_builtin(&mut self, name: &str, param: TypeCode, ret: TypeCode, op: vvm_runtime::ReduceOp) {
        let func_id = self.next_func_id();
        let sig = FunctionSig { func_id, param_types: vec![param], ret, traits: Traits::NONE, force_inline: false };
        let _ = self.scopes.store_symbol(name, Resolved::Function(sig));
        self.builtins.insert(func_id, Builtin::Reduce(op));
    }

    fn next_local(&mut self) -> u32 {
        let s = self.local_counter;
        self.local_counter += 1;
        s
    }

    fn next_state(&mut self) -> u32 {
        let s = self.next_state_slot;
        self.next_state_slot += 1;
        s
    }

    fn next_func_id(&mut self) -> u32 {
        let id = self.next_func_id;
        self.next_func_id += 1;
        id
    }

    pub fn analyze_module(&mut self, module: &Module, types: &mut TypeInterner) -> Result<TypedModule, Diagnostics> {
        let mut diags = Diagnostics::default();
        let mut out = TypedModule::default();
        for item in &module.items {
            match item {
                Item::Data(d) => self.declare_data(d, types, &mut diags),
                Item::Function(f) => {
                    if let Some(tf) = self.declare_and_analyze_function(f, types, &mut diags) {
                        out.functions.push(tf);
                    }
                }
                Item::Stmt(s) => {
                    if let Some(ts) = self.analyze_stmt(s, types, &mut diags) {
                        out.top_level.push(ts);
                    }
                }
            }
        }
        out.functions.append(&mut self.pending_functions);
        out.builtins = self.builtins.clone();
        if !diags.is_empty() {
            return Err(diags);
        }
        // Interactive top-level result: a trailing bare expression statement
        // (not an assignment) is surfaced for the REPL to `repr`/`save`
        // (`spec.md` §4.2 "Interactive top-level").
        if let Some(TypedStmt::Expr(e)) = out.top_level.last() {
            if !matches!(e.kind, TypedExprKind::Assign(..)) {
                let result = e.clone();
                out.top_level.pop();
                out.result = Some(result);
            }
        }
        Ok(out)
    }

    // ---- Data declarations ----------------------------------------------

    fn declare_data(&mut self, d: &DataDecl, types: &mut TypeInterner, diags: &mut Diagnostics) {
        if !d.template_params.is_empty() {
            let idx = self.scopes.template_data.len();
            self.scopes.template_data.push(TemplateDataDef { decl: d.clone(), instantiated: Vec::new() });
            if self.scopes.store_symbol(&d.name, Resolved::TemplateData(idx)).is_err() {
                diags.push(SemaError::DuplicateDefinition(d.name.clone()));
            }
            return;
        }
        let mut fields = Vec::with_capacity(d.fields.len());
        for f in &d.fields {
            match self.resolve_type(&f.ty, types, diags) {
                Some(tc) => fields.push((f.name.clone(), tc)),
                None => return,
            }
        }
        let tc = types.intern(UserDefinedType { name: d.name.clone(), fields });
        if self.scopes.store_symbol(&d.name, Resolved::DataType(tc)).is_err() {
            diags.push(SemaError::DuplicateDefinition(d.name.clone()));
            return;
        }
        // Auto-intern the Dataframe form and register it under `!Name` so a
        // `!Name(cols...)` call resolves as a Dataframe literal constructor,
        // distinct from a bare `Name(...)` scalar-field record (`spec.md`
        // §3, §8 "`!Person(["A","B"],[1,2])` is a 2-row table").
        if let Ok(df_tc) = types.intern_dataframe_of(tc) {
            let _ = self.scopes.store_symbol(&format!("!{}", d.name), Resolved::DataType(df_tc));
        }
    }

    fn instantiate_template_data(
        &mut self,
        name: &str,
        args: &[TemplateArg],
        types: &mut TypeInterner,
        diags: &mut Diagnostics,
    ) -> Option<TypeCode> {
        let idx = match self.scopes.lookup(name) {
            Some([Resolved::TemplateData(i), ..]) => *i,
            _ => {
                diags.push(SemaError::UnresolvedSymbol(name.to_string()));
                return None;
            }
        };
        let params = self.scopes.template_data[idx].decl.template_params.clone();
        let mut mangled_parts = Vec::new();
        let mut bound_types = Vec::new();
        // A template parameter may be bound to a type or to a folded
        // compile-time value (`data Name{T, N}: ...` — SPEC_FULL.md
        // Templates: "type OR comptime-value parameters, for both `data`
        // and `fn`"), mirroring how `analyze_macro_call` binds its own
        // literal parameters as `Resolved::ComptimeValue`.
        let mut bound_values = Vec::new();
        for (p, arg) in params.iter().zip(args.iter()) {
            match arg {
                TemplateArg::Type(te) => {
                    let tc = self.resolve_type(te, types, diags)?;
                    mangled_parts.push(type_display(tc, types));
                    bound_types.push((p.clone(), tc));
                }
                TemplateArg::Value(e) => {
                    let at = self.analyze_expr(e, types, diags)?;
                    let Some(lit) = at.literal.clone() else {
                        diags.push(SemaError::InvalidMacroTemplateGenericUsage(format!(
                            "template value parameter '{p}' of '{name}' requires a compile-time literal argument"
                        )));
                        return None;
                    };
                    mangled_parts.push(format!("{lit:?}"));
                    bound_values.push((p.clone(), lit, at.ty));
                }
            }
        }
        let mangled = format!("{name}{{{}}}", mangled_parts.join(", "));
        if let Some((_, tc)) = self.scopes.template_data[idx].instantiated.iter().find(|(m, _)| *m == mangled) {
            return Some(*tc);
        }
        let decl = self.scopes.template_data[idx].decl.clone();
        let saved = self.scopes.push_scope();
        for (p, tc) in &bound_types {
            let _ = self.scopes.store_symbol(p, Resolved::DataType(*tc));
        }
        for (p, lit, ty) in &bound_values {
            let _ = self.scopes.store_symbol(p, Resolved::ComptimeValue(lit.clone(), *ty));
        }
        let mut fields = Vec::with_capacity(decl.fields.len());
        let mut ok = true;
        for f in &decl.fields {
            match self.resolve_type(&f.ty, types, diags) {
                Some(tc) => fields.push((f.name.clone(), tc)),
                None => {
                    ok = false;
                    break;
                }
            }
        }
        self.scopes.pop_scope(saved);
        if !ok {
            return None;
        }
        let tc = types.intern(UserDefinedType { name: mangled.clone(), fields });
        let _ = types.intern_dataframe_of(tc);
        self.scopes.template_data[idx].instantiated.push((mangled, tc));
        Some(tc)
    }

    fn resolve_type(&mut self, te: &TypeExpr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypeCode> {
        match te {
            TypeExpr::Named(name) => {
                if let Some(kind) = builtin_kind(name) {
                    return Some(TypeCode::builtin(kind, Shape::Scalar));
                }
                match self.scopes.lookup(name) {
                    Some(list) => {
                        for r in list {
                            if let Resolved::DataType(tc) = r {
                                return Some(*tc);
                            }
                        }
                        diags.push(SemaError::UnresolvedSymbol(name.clone()));
                        None
                    }
                    None => {
                        diags.push(SemaError::UnresolvedSymbol(name.clone()));
                        None
                    }
                }
            }
            TypeExpr::Dataframe(name) => {
                let scalar = self.resolve_type(&TypeExpr::Named(name.clone()), types, diags)?;
                types.intern_dataframe_of(scalar).ok().or_else(|| {
                    diags.push(SemaError::InvalidTableClauseShape(format!("'{name}' cannot be array-ised into a Dataframe")));
                    None
                })
            }
            TypeExpr::Template(name, args) => self.instantiate_template_data(name, args, types, diags),
        }
    }

    // ---- Functions --------------------------------------------------------

    fn declare_and_analyze_function(
        &mut self,
        f: &FunctionDecl,
        types: &mut TypeInterner,
        diags: &mut Diagnostics,
    ) -> Option<TypedFunctionDef> {
        if !f.generic_params.is_empty() {
            let idx = self.scopes.generics.len();
            self.scopes.generics.push(GenericDef { decl: f.clone(), instantiated: Vec::new() });
            if self.scopes.store_symbol(&f.name, Resolved::Generic(idx)).is_err() {
                diags.push(SemaError::DuplicateDefinition(f.name.clone()));
            }
            return None;
        }
        if !f.macro_params.is_empty() {
            let idx = self.scopes.macros.len();
            self.scopes.macros.push(MacroDef { decl: f.clone(), instantiated: Vec::new() });
            if self.scopes.store_symbol(&f.name, Resolved::Macro(idx)).is_err() {
                diags.push(SemaError::DuplicateDefinition(f.name.clone()));
            }
            return None;
        }
        self.analyze_function_decl(f, types, diags)
    }

    /// Analyzes one concrete (non-generic, non-macro) function body,
    /// reserving its `func_id` before lowering so recursive self-calls
    /// resolve (`spec.md` §4.2 "a map from function definitions to their
    /// global operand, so recursion is possible").
    fn analyze_function_decl(
        &mut self,
        f: &FunctionDecl,
        types: &mut TypeInterner,
        diags: &mut Diagnostics,
    ) -> Option<TypedFunctionDef> {
        let mut param_types = Vec::with_capacity(f.params.len());
        for p in &f.params {
            param_types.push(self.resolve_type(&p.ty, types, diags)?);
        }
        let ret = match &f.ret {
            Some(t) => self.resolve_type(t, types, diags)?,
            None => TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar),
        };
        let func_id = self.next_func_id();
        let sig = FunctionSig { func_id, param_types: param_types.clone(), ret, traits: Traits::NONE, force_inline: f.inline };
        if self.scopes.store_symbol(&f.name, Resolved::Function(sig)).is_err() {
            diags.push(SemaError::DuplicateDefinition(f.name.clone()));
            return None;
        }

        let saved_locals = self.local_counter;
        let saved_in_function = self.in_function;
        self.local_counter = 0;
        self.in_function = true;
        let saved_scope = self.scopes.push_scope();
        for (p, ty) in f.params.iter().zip(param_types.iter()) {
            let binding = Binding::Local(self.next_local());
            let _ = self.scopes.store_symbol(
                &p.name,
                Resolved::Variable { binding, ty: *ty, mutable: false, mode: Mode::Normal, traits: Traits::NONE, literal: None },
            );
        }
        let (body, tail) = self.analyze_stmt_list(&f.body, types, diags);
        self.scopes.pop_scope(saved_scope);
        let local_count = self.local_counter;
        self.local_counter = saved_locals;
        self.in_function = saved_in_function;

        Some(TypedFunctionDef { func_id, name: f.name.clone(), param_types, ret, body, tail, local_count })
    }

    /// Analyzes a statement list, treating a trailing bare-expression
    /// statement as the block's tail value (used for function bodies and
    /// `if`/`else` arms).
    fn analyze_stmt_list(&mut self, stmts: &[Stmt], types: &mut TypeInterner, diags: &mut Diagnostics) -> (Vec<TypedStmt>, Option<TypedExpr>) {
        let mut out = Vec::with_capacity(stmts.len());
        for s in stmts {
            if let Some(ts) = self.analyze_stmt(s, types, diags) {
                out.push(ts);
            }
        }
        if let Some(TypedStmt::Expr(_)) = out.last() {
            if let Some(TypedStmt::Expr(e)) = out.pop() {
                if !matches!(e.kind, TypedExprKind::Assign(..)) {
                    return (out, Some(e));
                }
                out.push(TypedStmt::Expr(e));
            }
        }
        (out, None)
    }

    fn analyze_stmt(&mut self, s: &Stmt, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedStmt> {
        match s {
            Stmt::Let { name, ty, value } => {
                let te = self.analyze_expr(value, types, diags)?;
                let declared = match ty {
                    Some(t) => self.resolve_type(t, types, diags)?,
                    None => te.ty,
                };
                if declared != te.ty {
                    diags.push(SemaError::TypeMismatch {
                        expected: type_display(declared, types),
                        found: type_display(te.ty, types),
                        context: format!("let {name}"),
                    });
                    return None;
                }
                let binding = if self.in_function { Binding::Local(self.next_local()) } else { Binding::State(self.next_state()) };
                // A `let` binding forwards the initializer's own mode/traits/
                // literal, so `let x = 3` still reads back as a comptime
                // literal usable as a macro argument or CTFE operand.
                let _ = self.scopes.store_symbol(
                    name,
                    Resolved::Variable { binding, ty: declared, mutable: false, mode: te.mode, traits: te.traits, literal: te.literal.clone() },
                );
                Some(TypedStmt::Let(binding, te))
            }
            Stmt::Var { name, ty, value } => {
                let te = self.analyze_expr(value, types, diags)?;
                let declared = match ty {
                    Some(t) => self.resolve_type(t, types, diags)?,
                    None => te.ty,
                };
                if declared != te.ty {
                    diags.push(SemaError::TypeMismatch {
                        expected: type_display(declared, types),
                        found: type_display(te.ty, types),
                        context: format!("var {name}"),
                    });
                    return None;
                }
                let binding = if self.in_function { Binding::Local(self.next_local()) } else { Binding::State(self.next_state()) };
                // `var` forces Normal mode and clears traits (`spec.md` §4.1):
                // a mutable binding can change after this point, so it can
                // never be forwarded as a comptime literal.
                let _ = self.scopes.store_symbol(
                    name,
                    Resolved::Variable { binding, ty: declared, mutable: true, mode: Mode::Normal, traits: Traits::NONE, literal: None },
                );
                let mut forced = te;
                forced.mode = Mode::Normal;
                forced.traits = Traits::NONE;
                forced.literal = None;
                Some(TypedStmt::Let(binding, forced))
            }
            Stmt::Expr(e) => Some(TypedStmt::Expr(self.analyze_expr(e, types, diags)?)),
            Stmt::While { cond, body } => {
                let cond_t = self.analyze_expr(cond, types, diags)?;
                if cond_t.ty != TypeCode::builtin(BuiltinKind::Bool, Shape::Scalar) {
                    diags.push(SemaError::TypeMismatch {
                        expected: "Bool".to_string(),
                        found: type_display(cond_t.ty, types),
                        context: "while condition".to_string(),
                    });
                    return None;
                }
                let saved = self.scopes.push_scope();
                let (body_t, _) = self.analyze_stmt_list(body, types, diags);
                self.scopes.pop_scope(saved);
                Some(TypedStmt::While(cond_t, body_t))
            }
            Stmt::Return(e) => {
                if !self.in_function {
                    diags.push(SemaError::InvalidReturnContext("'return' used outside a function body".to_string()));
                    return None;
                }
                let te = match e {
                    Some(e) => Some(self.analyze_expr(e, types, diags)?),
                    None => None,
                };
                Some(TypedStmt::Return(te))
            }
            Stmt::Print(e) => Some(TypedStmt::Print(self.analyze_expr(e, types, diags)?)),
            Stmt::Save(e) => Some(TypedStmt::Save(self.analyze_expr(e, types, diags)?)),
            Stmt::Exit(e) => {
                let te = self.analyze_expr(e, types, diags)?;
                if te.ty != TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar) {
                    diags.push(SemaError::TypeMismatch {
                        expected: "Int64".to_string(),
                        found: type_display(te.ty, types),
                        context: "exit code".to_string(),
                    });
                    return None;
                }
                Some(TypedStmt::Exit(te))
            }
        }
    }

    // ---- Expressions --------------------------------------------------

    fn analyze_expr(&mut self, e: &Expr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        match e {
            Expr::IntLit(n) => Some(lit_int(*n)),
            Expr::FloatLit(f) => Some(lit_float(*f)),
            Expr::StringLit(s) => Some(lit_string(s.clone())),
            Expr::CharLit(c) => Some(lit_char(*c)),
            Expr::BoolLit(b) => Some(lit_bool(*b)),
            Expr::Ident(name) => self.analyze_ident(name, types, diags),
            Expr::TemplateIdent(..) => {
                diags.push(SemaError::InvalidMacroTemplateGenericUsage(
                    "a template name is only valid as a call target".to_string(),
                ));
                None
            }
            Expr::VectorLit(items) => self.analyze_vector_lit(items, types, diags),
            Expr::Binary(op, l, r) => self.analyze_binary(*op, l, r, types, diags),
            Expr::Neg(inner) => self.analyze_neg(inner, types, diags),
            Expr::Not(inner) => self.analyze_not(inner, types, diags),
            Expr::Assign(target, value) => self.analyze_assign(target, value, types, diags),
            Expr::Member(recv, field) => self.analyze_member(recv, field, types, diags),
            Expr::Call(callee, args) => self.analyze_call(callee, args, types, diags),
            Expr::Block(stmts) => {
                let saved = self.scopes.push_scope();
                let (body, tail) = self.analyze_stmt_list(stmts, types, diags);
                self.scopes.pop_scope(saved);
                let ty = tail.as_ref().map(|t| t.ty).unwrap_or(TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar));
                Some(TypedExpr { kind: TypedExprKind::Block(body, tail.map(Box::new)), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
            }
            Expr::If(arms, else_body) => self.analyze_if(arms, else_body, types, diags),
            Expr::Query(q) => self.analyze_query(q, types, diags),
            Expr::Sort(s) => self.analyze_sort(s, types, diags),
            Expr::Join(j) => self.analyze_join(j, types, diags),
        }
    }

    fn analyze_ident(&mut self, name: &str, _types: &TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        match self.scopes.lookup(name) {
            Some(list) => match &list[0] {
                Resolved::Variable { binding, ty, mode, traits, literal, .. } => {
                    Some(TypedExpr { kind: TypedExprKind::Load(*binding), ty: *ty, traits: *traits, mode: *mode, literal: literal.clone() })
                }
                Resolved::ComptimeValue(lit, ty) => Some(literal_expr(lit.clone(), *ty)),
                Resolved::ImpliedMember(field, ty) => {
                    Some(TypedExpr { kind: TypedExprKind::FieldRef(*field), ty: *ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
                }
                _ => {
                    diags.push(SemaError::UnresolvedSymbol(name.to_string()));
                    None
                }
            },
            None => {
                diags.push(SemaError::UnresolvedSymbol(name.to_string()));
                None
            }
        }
    }

    fn analyze_vector_lit(&mut self, items: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let mut typed_items = Vec::with_capacity(items.len());
        for it in items {
            typed_items.push(self.analyze_expr(it, types, diags)?);
        }
        let kind = match typed_items.first() {
            Some(first) => match first.ty.as_builtin() {
                Some((k, Shape::Scalar)) => k,
                _ => {
                    diags.push(SemaError::TypeMismatch {
                        expected: "scalar builtin element".to_string(),
                        found: type_display(first.ty, types),
                        context: "vector literal".to_string(),
                    });
                    return None;
                }
            },
            None => BuiltinKind::Int64,
        };
        for it in &typed_items {
            if it.ty != TypeCode::builtin(kind, Shape::Scalar) {
                diags.push(SemaError::TypeMismatch {
                    expected: kind.name().to_string(),
                    found: type_display(it.ty, types),
                    context: "vector literal element".to_string(),
                });
                return None;
            }
        }
        let ty = TypeCode::builtin(kind, Shape::Vector);
        Some(TypedExpr { kind: TypedExprKind::VectorLit(typed_items), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_binary(&mut self, op: BinOp, l: &Expr, r: &Expr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let lt = self.analyze_expr(l, types, diags)?;
        let rt = self.analyze_expr(r, types, diags)?;
        let (lkind, lshape) = lt.ty.as_builtin().or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "builtin scalar/vector".to_string(), found: type_display(lt.ty, types), context: "binary operand".to_string() });
            None
        })?;
        let (rkind, rshape) = rt.ty.as_builtin().or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "builtin scalar/vector".to_string(), found: type_display(rt.ty, types), context: "binary operand".to_string() });
            None
        })?;
        let out_shape = if lshape == Shape::Vector || rshape == Shape::Vector { Shape::Vector } else { Shape::Scalar };
        let is_logical = matches!(op, BinOp::And | BinOp::Or);
        let is_compare = matches!(op, BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge | BinOp::Eq | BinOp::Ne);
        if is_logical {
            let bool_scalar = TypeCode::builtin(BuiltinKind::Bool, Shape::Scalar);
            if lt.ty != bool_scalar || rt.ty != bool_scalar {
                diags.push(SemaError::TypeMismatch { expected: "Bool".to_string(), found: type_display(lt.ty, types), context: "logical operator".to_string() });
                return None;
            }
        } else if lkind != rkind {
            diags.push(SemaError::TypeMismatch { expected: lkind.name().to_string(), found: rkind.name().to_string(), context: "binary operator".to_string() });
            return None;
        }
        let ty = if is_compare || is_logical {
            TypeCode::builtin(BuiltinKind::Bool, out_shape)
        } else {
            TypeCode::builtin(lkind, out_shape)
        };
        let mode = Mode::of_call(Traits::PURE, &[lt.mode, rt.mode]);
        let literal = fold_binary(op, &lt, &rt, lkind);
        let kind = match &literal {
            Some(lit) => literal_kind(lit.clone()),
            None => TypedExprKind::Binary(op, Box::new(lt), Box::new(rt)),
        };
        Some(TypedExpr { kind, ty, traits: Traits::PURE, mode, literal })
    }

    fn analyze_neg(&mut self, inner: &Expr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let it = self.analyze_expr(inner, types, diags)?;
        let (kind, _) = it.ty.as_builtin().or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "numeric".to_string(), found: type_display(it.ty, types), context: "unary '-'".to_string() });
            None
        })?;
        if !matches!(kind, BuiltinKind::Int64 | BuiltinKind::Float64 | BuiltinKind::Timedelta) {
            diags.push(SemaError::TypeMismatch { expected: "numeric".to_string(), found: kind.name().to_string(), context: "unary '-'".to_string() });
            return None;
        }
        let ty = it.ty;
        let mode = it.mode;
        let literal = match (&it.literal, kind) {
            (Some(ComptimeLit::Int(n)), BuiltinKind::Int64) => Some(ComptimeLit::Int(-n)),
            _ => None,
        };
        let kind_node = match &literal {
            Some(ComptimeLit::Int(n)) => TypedExprKind::IntLit(*n),
            _ => TypedExprKind::Neg(Box::new(it)),
        };
        Some(TypedExpr { kind: kind_node, ty, traits: Traits::PURE, mode, literal })
    }

    fn analyze_not(&mut self, inner: &Expr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let it = self.analyze_expr(inner, types, diags)?;
        let bool_scalar = TypeCode::builtin(BuiltinKind::Bool, Shape::Scalar);
        if it.ty != bool_scalar {
            diags.push(SemaError::TypeMismatch { expected: "Bool".to_string(), found: type_display(it.ty, types), context: "unary '!'".to_string() });
            return None;
        }
        let literal = match &it.literal {
            Some(ComptimeLit::Bool(b)) => Some(ComptimeLit::Bool(!b)),
            _ => None,
        };
        let kind = match &literal {
            Some(ComptimeLit::Bool(b)) => TypedExprKind::BoolLit(*b),
            _ => TypedExprKind::Not(Box::new(it)),
        };
        Some(TypedExpr { kind, ty: bool_scalar, traits: Traits::PURE, mode: Mode::Normal, literal })
    }

    fn analyze_assign(&mut self, target: &Expr, value: &Expr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let Expr::Ident(name) = target else {
            diags.push(SemaError::InvalidAssignmentTarget("only a plain variable name can be assigned".to_string()));
            return None;
        };
        let (binding, ty, mutable) = match self.scopes.lookup(name) {
            Some(list) => match &list[0] {
                Resolved::Variable { binding, ty, mutable, .. } => (*binding, *ty, *mutable),
                _ => {
                    diags.push(SemaError::InvalidAssignmentTarget(format!("'{name}' is not a variable")));
                    return None;
                }
            },
            None => {
                diags.push(SemaError::UnresolvedSymbol(name.clone()));
                return None;
            }
        };
        if !mutable {
            diags.push(SemaError::InvalidAssignmentTarget(format!("'{name}' is a read-only 'let' binding")));
            return None;
        }
        let vt = self.analyze_expr(value, types, diags)?;
        if vt.ty != ty {
            diags.push(SemaError::TypeMismatch { expected: type_display(ty, types), found: type_display(vt.ty, types), context: format!("assignment to {name}") });
            return None;
        }
        Some(TypedExpr { kind: TypedExprKind::Assign(binding, Box::new(vt)), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_member(&mut self, recv: &Expr, field: &str, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let rt = self.analyze_expr(recv, types, diags)?;
        let def = types.get(rt.ty).or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "record/Dataframe".to_string(), found: type_display(rt.ty, types), context: format!(".{field}") });
            None
        })?;
        let idx = def.fields.iter().position(|(n, _)| n == field).or_else(|| {
            diags.push(SemaError::UnresolvedSymbol(format!("{field} (field of {})", def.name)));
            None
        })?;
        let fty = def.fields[idx].1;
        Some(TypedExpr { kind: TypedExprKind::Member(Box::new(rt), idx as u32), ty: fty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_if(
        &mut self,
        arms: &[(Expr, Vec<Stmt>)],
        else_body: &Option<Vec<Stmt>>,
        types: &mut TypeInterner,
        diags: &mut Diagnostics,
    ) -> Option<TypedExpr> {
        let mut typed_arms = Vec::with_capacity(arms.len());
        let mut result_ty = None;
        for (cond, body) in arms {
            let ct = self.analyze_expr(cond, types, diags)?;
            if ct.ty != TypeCode::builtin(BuiltinKind::Bool, Shape::Scalar) {
                diags.push(SemaError::TypeMismatch { expected: "Bool".to_string(), found: type_display(ct.ty, types), context: "if condition".to_string() });
                return None;
            }
            let saved = self.scopes.push_scope();
            let (stmts, tail) = self.analyze_stmt_list(body, types, diags);
            self.scopes.pop_scope(saved);
            if let Some(t) = &tail {
                result_ty.get_or_insert(t.ty);
            }
            typed_arms.push((ct, stmts, tail.map(Box::new)));
        }
        let typed_else = match else_body {
            Some(body) => {
                let saved = self.scopes.push_scope();
                let (stmts, tail) = self.analyze_stmt_list(body, types, diags);
                self.scopes.pop_scope(saved);
                if let Some(t) = &tail {
                    result_ty.get_or_insert(t.ty);
                }
                Some((stmts, tail.map(Box::new)))
            }
            None => None,
        };
        let ty = result_ty.unwrap_or(TypeCode::builtin(BuiltinKind::Int64, Shape::Scalar));
        Some(TypedExpr { kind: TypedExprKind::If(typed_arms, typed_else), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    // ---- Calls: overloads, generics, macros, templates, constructors ------

    fn analyze_call(&mut self, callee: &Expr, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        match callee {
            Expr::Ident(name) => self.analyze_named_call(name, args, types, diags),
            Expr::TemplateIdent(name, targs) if name == "load" => self.analyze_load_call(targs, args, types, diags),
            Expr::TemplateIdent(name, targs) => {
                let tc = self.instantiate_template_data(name, targs, types, diags)?;
                self.analyze_construct(tc, args, types, diags)
            }
            _ => {
                diags.push(SemaError::InvalidMacroTemplateGenericUsage("call target must be a name".to_string()));
                None
            }
        }
    }

    /// `load{!Name}(path)`: `!Name` is the Dataframe type to read into,
    /// reusing the same `TypeExpr::Dataframe` resolution a `data` field
    /// declaration would use.
    fn analyze_load_call(&mut self, targs: &[TemplateArg], args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let [TemplateArg::Type(te)] = targs else {
            diags.push(SemaError::InvalidMacroTemplateGenericUsage("'load' takes a single Dataframe type argument, e.g. load{!Name}(path)".to_string()));
            return None;
        };
        let tc = self.resolve_type(te, types, diags)?;
        let def = types.get(tc).cloned().or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "Dataframe type".to_string(), found: "unresolved type".to_string(), context: "load".to_string() });
            None
        })?;
        if !def.is_dataframe() {
            diags.push(SemaError::TypeMismatch { expected: "Dataframe type".to_string(), found: def.name.clone(), context: "load".to_string() });
            return None;
        }
        let [path_expr] = args else {
            diags.push(SemaError::InvalidMacroTemplateGenericUsage("'load' takes exactly one argument: the file path".to_string()));
            return None;
        };
        let path = self.analyze_expr(path_expr, types, diags)?;
        let string_scalar = TypeCode::builtin(BuiltinKind::String, Shape::Scalar);
        if path.ty != string_scalar {
            diags.push(SemaError::TypeMismatch { expected: "String".to_string(), found: type_display(path.ty, types), context: "load path".to_string() });
            return None;
        }
        Some(TypedExpr { kind: TypedExprKind::LoadCsv(tc, Box::new(path)), ty: tc, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    /// `store(df, path)`: writes `df` to a CSV file and evaluates to `df`
    /// itself, since this language has no unit type.
    fn analyze_store_call(&mut self, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let [df_expr, path_expr] = args else {
            diags.push(SemaError::InvalidMacroTemplateGenericUsage("'store' takes exactly two arguments: the Dataframe and the file path".to_string()));
            return None;
        };
        let df = self.analyze_expr(df_expr, types, diags)?;
        let def = types.get(df.ty).cloned().or_else(|| {
            diags.push(SemaError::TypeMismatch { expected: "Dataframe".to_string(), found: type_display(df.ty, types), context: "store".to_string() });
            None
        })?;
        if !def.is_dataframe() {
            diags.push(SemaError::TypeMismatch { expected: "Dataframe".to_string(), found: def.name.clone(), context: "store".to_string() });
            return None;
        }
        let path = self.analyze_expr(path_expr, types, diags)?;
        let string_scalar = TypeCode::builtin(BuiltinKind::String, Shape::Scalar);
        if path.ty != string_scalar {
            diags.push(SemaError::TypeMismatch { expected: "String".to_string(), found: type_display(path.ty, types), context: "store path".to_string() });
            return None;
        }
        let ty = df.ty;
        Some(TypedExpr { kind: TypedExprKind::StoreCsv(Box::new(df), Box::new(path)), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_named_call(&mut self, name: &str, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        if name == "store" {
            return self.analyze_store_call(args, types, diags);
        }
        let list = self.scopes.lookup(name)?.to_vec();
        if list.iter().any(|r| matches!(r, Resolved::DataType(_))) {
            let tc = list.iter().find_map(|r| if let Resolved::DataType(tc) = r { Some(*tc) } else { None })?;
            return self.analyze_construct(tc, args, types, diags);
        }
        if let Some(Resolved::Generic(idx)) = list.iter().find(|r| matches!(r, Resolved::Generic(_))) {
            return self.analyze_generic_call(name, *idx, args, types, diags);
        }
        if let Some(Resolved::Macro(idx)) = list.iter().find(|r| matches!(r, Resolved::Macro(_))) {
            return self.analyze_macro_call(name, *idx, args, types, diags);
        }
        let candidates: Vec<&FunctionSig> = list.iter().filter_map(|r| if let Resolved::Function(sig) = r { Some(sig) } else { None }).collect();
        if candidates.is_empty() {
            diags.push(SemaError::UnresolvedSymbol(name.to_string()));
            return None;
        }
        let mut typed_args = Vec::with_capacity(args.len());
        for a in args {
            typed_args.push(self.analyze_expr(a, types, diags)?);
        }
        let arg_types: Vec<TypeCode> = typed_args.iter().map(|a| a.ty).collect();
        for sig in &candidates {
            if sig.param_types == arg_types {
                let func_id = sig.func_id;
                let ret = sig.ret;
                let force_inline = sig.force_inline;
                let kind = TypedExprKind::Call(func_id, typed_args);
                let kind = if force_inline { TypedExprKind::Inline(Box::new(TypedExpr { kind, ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None })) } else { kind };
                return Some(TypedExpr { kind, ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None });
            }
        }
        let mut cands = Vec::new();
        for sig in candidates.iter().take(3) {
            let sig_str = format!("{name}({})", sig.param_types.iter().map(|t| type_display(*t, types)).collect::<Vec<_>>().join(", "));
            let mismatch = if sig.param_types.len() != arg_types.len() {
                format!("arity {} vs {}", sig.param_types.len(), arg_types.len())
            } else {
                let i = sig.param_types.iter().zip(arg_types.iter()).position(|(a, b)| a != b).unwrap_or(0);
                format!("arg {i}: expected {}, found {}", type_display(sig.param_types[i], types), type_display(arg_types[i], types))
            };
            cands.push(Candidate { signature: sig_str, mismatch });
        }
        diags.push(SemaError::OverloadResolutionFailure { name: name.to_string(), candidates: cands, more: candidates.len().saturating_sub(3) });
        None
    }

    fn analyze_construct(&mut self, tc: TypeCode, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let def = types.get(tc)?.clone();
        if def.fields.len() != args.len() {
            diags.push(SemaError::ArityMismatch { name: def.name.clone(), expected: def.fields.len(), found: args.len() });
            return None;
        }
        let mut typed_args = Vec::with_capacity(args.len());
        for (a, (fname, fty)) in args.iter().zip(def.fields.iter()) {
            let at = self.analyze_expr(a, types, diags)?;
            if at.ty != *fty {
                diags.push(SemaError::TypeMismatch {
                    expected: type_display(*fty, types),
                    found: type_display(at.ty, types),
                    context: format!("{}.{fname}", def.name),
                });
                return None;
            }
            typed_args.push(at);
        }
        Some(TypedExpr { kind: TypedExprKind::Construct(tc, typed_args), ty: tc, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_generic_call(&mut self, name: &str, idx: usize, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let mut typed_args = Vec::with_capacity(args.len());
        for a in args {
            typed_args.push(self.analyze_expr(a, types, diags)?);
        }
        let arg_types: Vec<TypeCode> = typed_args.iter().map(|a| a.ty).collect();
        if let Some((_, sig)) = self.scopes.generics[idx].instantiated.iter().find(|(t, _)| *t == arg_types) {
            let func_id = sig.func_id;
            let ret = sig.ret;
            return Some(TypedExpr { kind: TypedExprKind::Call(func_id, typed_args), ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None });
        }
        let decl = self.scopes.generics[idx].decl.clone();
        if decl.params.len() != arg_types.len() {
            diags.push(SemaError::ArityMismatch { name: name.to_string(), expected: decl.params.len(), found: arg_types.len() });
            return None;
        }
        let mangled = format!("{name}({})", arg_types.iter().map(|t| type_display(*t, types)).collect::<Vec<_>>().join(", "));
        // Every parameter declared with the same placeholder name must agree
        // on the concrete type the caller supplied (`spec.md` §4.1:
        // "subsequent equality checks against the same placeholder require
        // the same concrete type"); `identity_pair(a: T, b: T)` called with
        // mismatched argument types is rejected here rather than silently
        // binding `T` to whichever parameter happens to come first.
        for placeholder in &decl.generic_params {
            let mut occurrences = decl
                .params
                .iter()
                .zip(arg_types.iter())
                .filter(|(p, _)| matches!(&p.ty, TypeExpr::Named(n) if n == placeholder));
            if let Some((first_param, first_ty)) = occurrences.next() {
                for (param, ty) in occurrences {
                    if ty != first_ty {
                        diags.push(SemaError::TypeMismatch {
                            expected: type_display(*first_ty, types),
                            found: type_display(*ty, types),
                            context: format!("{name}: placeholder '{placeholder}' ('{}' vs '{}')", first_param.name, param.name),
                        });
                        return None;
                    }
                }
            }
        }
        let saved = self.scopes.push_scope();
        // Bind each placeholder to the type of the first param declared
        // with that placeholder name (`spec.md` §4.1 "Generic instantiation"
        // infers placeholders from argument types).
        for placeholder in &decl.generic_params {
            if let Some(pos) = decl.params.iter().position(|p| matches!(&p.ty, TypeExpr::Named(n) if n == placeholder)) {
                let _ = self.scopes.store_symbol(placeholder, Resolved::DataType(arg_types[pos]));
            }
        }
        let mut concrete = decl.clone();
        concrete.name = mangled.clone();
        concrete.generic_params.clear();
        let result = self.analyze_function_decl(&concrete, types, diags);
        self.scopes.pop_scope(saved);
        let tf = result?;
        let sig = FunctionSig { func_id: tf.func_id, param_types: tf.param_types.clone(), ret: tf.ret, traits: Traits::NONE, force_inline: decl.inline };
        self.scopes.generics[idx].instantiated.push((arg_types, sig));
        // The instantiation's own `analyze_function_decl` already pushed a
        // `Resolved::Function` for the mangled name; nothing further to
        // register here.
        let ret = tf.ret;
        let func_id = tf.func_id;
        self.pending_functions.push(tf);
        Some(TypedExpr { kind: TypedExprKind::Call(func_id, typed_args), ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_macro_call(&mut self, name: &str, idx: usize, args: &[Expr], types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let decl = self.scopes.macros[idx].decl.clone();
        if decl.params.len() != args.len() {
            diags.push(SemaError::ArityMismatch { name: name.to_string(), expected: decl.params.len(), found: args.len() });
            return None;
        }
        let mut runtime_args = Vec::new();
        let mut literal_parts = Vec::new();
        let mut bound_literals = Vec::new();
        for (p, a) in decl.params.iter().zip(args.iter()) {
            let at = self.analyze_expr(a, types, diags)?;
            if decl.macro_params.contains(&p.name) {
                let Some(lit) = at.literal.clone() else {
                    diags.push(SemaError::InvalidMacroTemplateGenericUsage(format!("macro parameter '{}' of '{name}' requires a compile-time literal argument", p.name)));
                    return None;
                };
                literal_parts.push(format!("{lit:?}"));
                bound_literals.push((p.name.clone(), lit, at.ty));
            } else {
                runtime_args.push(at);
            }
        }
        let mangled = format!("{name}{{{}}}", literal_parts.join(", "));
        if let Some((_, sig)) = self.scopes.macros[idx].instantiated.iter().find(|(m, _)| *m == mangled) {
            let func_id = sig.func_id;
            let ret = sig.ret;
            return Some(TypedExpr { kind: TypedExprKind::Call(func_id, runtime_args), ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None });
        }
        let saved = self.scopes.push_scope();
        for (pname, lit, ty) in &bound_literals {
            let _ = self.scopes.store_symbol(pname, Resolved::ComptimeValue(lit.clone(), *ty));
        }
        let mut concrete = decl.clone();
        concrete.name = mangled.clone();
        concrete.macro_params.clear();
        concrete.params.retain(|p| !decl.macro_params.contains(&p.name));
        let result = self.analyze_function_decl(&concrete, types, diags);
        self.scopes.pop_scope(saved);
        let tf = result?;
        let sig = FunctionSig { func_id: tf.func_id, param_types: tf.param_types.clone(), ret: tf.ret, traits: Traits::NONE, force_inline: decl.inline };
        self.scopes.macros[idx].instantiated.push((mangled, sig));
        let ret = tf.ret;
        let func_id = tf.func_id;
        self.pending_functions.push(tf);
        Some(TypedExpr { kind: TypedExprKind::Call(func_id, runtime_args), ty: ret, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    // ---- Table expressions ------------------------------------------------

    fn analyze_query(&mut self, q: &QueryExpr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let source = self.analyze_expr(&q.source, types, diags)?;
        let df_def = types.get(source.ty)?.clone();
        if !df_def.is_dataframe() {
            diags.push(SemaError::InvalidTableClauseShape(format!("'{}' is not a Dataframe", df_def.name)));
            return None;
        }
        if !q.by.is_empty() && q.select.is_empty() {
            diags.push(SemaError::InvalidTableClauseShape("'by' without 'cols' is invalid".to_string()));
            return None;
        }
        let saved = self.scopes.push_scope();
        for (i, (fname, fty)) in df_def.fields.iter().enumerate() {
            let _ = self.scopes.store_symbol(fname, Resolved::ImpliedMember(i as u32, *fty));
        }
        let filter = match &q.filter {
            Some(w) => {
                let wt = self.analyze_expr(w, types, diags)?;
                if wt.ty != TypeCode::builtin(BuiltinKind::Bool, Shape::Vector) {
                    diags.push(SemaError::TypeMismatch { expected: "[Bool]".to_string(), found: type_display(wt.ty, types), context: "query where".to_string() });
                    self.scopes.pop_scope(saved);
                    return None;
                }
                Some(Box::new(wt))
            }
            None => None,
        };
        let mut by = Vec::with_capacity(q.by.len());
        let mut by_names = Vec::with_capacity(q.by.len());
        for (name, e) in &q.by {
            by.push(self.analyze_expr(e, types, diags)?);
            by_names.push(name.clone());
        }
        // Aggregate `select` columns see the per-group sub-table under the
        // same implied-member scope (field types are already per-row
        // scalars when read through a reduction builtin such as `sum`).
        let mut select = Vec::with_capacity(q.select.len());
        let mut select_names = Vec::with_capacity(q.select.len());
        for (name, e) in &q.select {
            select.push(self.analyze_expr(e, types, diags)?);
            select_names.push(name.clone());
        }
        self.scopes.pop_scope(saved);

        if q.by.is_empty() && q.select.is_empty() {
            let ty = source.ty;
            return Some(TypedExpr {
                kind: TypedExprKind::Query(TypedQuery { source: Box::new(source), select: Vec::new(), by: Vec::new(), filter, result_ty: ty }),
                ty,
                traits: Traits::NONE,
                mode: Mode::Normal,
                literal: None,
            });
        }

        if select_names.iter().chain(by_names.iter()).collect::<std::collections::HashSet<_>>().len() != select_names.len() + by_names.len() {
            diags.push(SemaError::InvalidTableClauseShape("duplicate output name across 'by' and 'cols'".to_string()));
            return None;
        }

        let mut fields = Vec::with_capacity(by.len() + select.len());
        for (name, e) in by_names.iter().zip(by.iter()) {
            fields.push((name.clone(), e.ty));
        }
        for (name, e) in select_names.iter().zip(select.iter()) {
            let col_ty = if q.by.is_empty() {
                e.ty // row-wise: already a vector expression
            } else {
                // Grouped aggregate: scalar per group, array-ised for the
                // output Dataframe column.
                match e.ty.as_builtin() {
                    Some((k, _)) => TypeCode::builtin(k, Shape::Vector),
                    None => e.ty,
                }
            };
            fields.push((name.clone(), col_ty));
        }
        let result_ty = types.intern(UserDefinedType { name: "!query_result".to_string(), fields });
        Some(TypedExpr {
            kind: TypedExprKind::Query(TypedQuery { source: Box::new(source), select, by, filter, result_ty }),
            ty: result_ty,
            traits: Traits::NONE,
            mode: Mode::Normal,
            literal: None,
        })
    }

    fn analyze_sort(&mut self, s: &SortExpr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        let source = self.analyze_expr(&s.source, types, diags)?;
        let df_def = types.get(source.ty)?.clone();
        if !df_def.is_dataframe() {
            diags.push(SemaError::InvalidTableClauseShape(format!("'{}' is not a Dataframe", df_def.name)));
            return None;
        }
        let saved = self.scopes.push_scope();
        for (i, (fname, fty)) in df_def.fields.iter().enumerate() {
            let _ = self.scopes.store_symbol(fname, Resolved::ImpliedMember(i as u32, *fty));
        }
        let mut by = Vec::with_capacity(s.by.len());
        for e in &s.by {
            by.push(self.analyze_expr(e, types, diags)?);
        }
        self.scopes.pop_scope(saved);
        let ty = source.ty;
        Some(TypedExpr { kind: TypedExprKind::Sort(TypedSort { source: Box::new(source), by }), ty, traits: Traits::NONE, mode: Mode::Normal, literal: None })
    }

    fn analyze_join(&mut self, j: &JoinExpr, types: &mut TypeInterner, diags: &mut Diagnostics) -> Option<TypedExpr> {
        if j.on.is_empty() && j.asof.is_none() {
            diags.push(SemaError::InvalidTableClauseShape("join requires 'on' and/or 'asof'".to_string()));
            return None;
        }
        if j.asof.is_none() && (j.strict || j.direction.is_some() || j.within.is_some()) {
            diags.push(SemaError::InvalidTableClauseShape("'strict'/direction/'within' require 'asof'".to_string()));
            return None;
        }
        if j.strict && j.direction == Some(AsofDir::Nearest) {
            diags.push(SemaError::InvalidTableClauseShape("'strict' is invalid with 'nearest'".to_string()));
            return None;
        }
        let left = self.analyze_expr(&j.left, types, diags)?;
        let right = self.analyze_expr(&j.right, types, diags)?;
        let left_def = types.get(left.ty)?.clone();
        let right_def = types.get(right.ty)?.clone();
        if !left_def.is_dataframe() || !right_def.is_dataframe() {
            diags.push(SemaError::InvalidTableClauseShape("join operands must be Dataframes".to_string()));
            return None;
        }

        let saved_l = self.scopes.push_scope();
        for (i, (fname, fty)) in left_def.fields.iter().enumerate() {
            let _ = self.scopes.store_symbol(fname, Resolved::ImpliedMember(i as u32, *fty));
        }
        let mut on = Vec::new();
        for e in &j.on {
            let lt = self.analyze_expr(e, types, diags)?;
            on.push(lt);
        }
        let asof_left = match &j.asof {
            Some((l, _)) => Some(self.analyze_expr(l, types, diags)?),
            None => None,
        };
        self.scopes.pop_scope(saved_l);

        let saved_r = self.scopes.push_scope();
        for (i, (fname, fty)) in right_def.fields.iter().enumerate() {
            let _ = self.scopes.store_symbol(fname, Resolved::ImpliedMember(i as u32, *fty));
        }
        let mut on_pairs = Vec::new();
        for (le, e) in on.into_iter().zip(j.on.iter()) {
            let rt = self.analyze_expr(e, types, diags)?;
            if le.ty != rt.ty {
                diags.push(SemaError::InvalidTableClauseShape("join 'on' expressions must have equal types on both sides".to_string()));
                return None;
            }
            on_pairs.push((le, rt));
        }
        let asof_pair = match (&j.asof, &asof_left) {
            (Some((_, r)), Some(lt)) => {
                let rt = self.analyze_expr(r, types, diags)?;
                if lt.ty != rt.ty {
                    diags.push(SemaError::InvalidTableClauseShape("asof expressions must have equal types on both sides".to_string()));
                    return None;
                }
                Some((lt.clone(), rt))
            }
            _ => None,
        };
        let within = match &j.within {
            Some(w) => Some(Box::new(self.analyze_expr(w, types, diags)?)),
            None => None,
        };
        self.scopes.pop_scope(saved_r);

        let on_field_names: Vec<String> = j.on.iter().filter_map(|e| if let Expr::Ident(n) = e { Some(n.clone()) } else { None }).collect();
        let asof_field_name = j.asof.as_ref().and_then(|(l, _)| if let Expr::Ident(n) = l { Some(n.clone()) } else { None });
        let mut right_take_fields: Vec<String> = right_def
            .fields
            .iter()
            .map(|(n, _)| n.clone())
            .filter(|n| !on_field_names.contains(n) && Some(n) != asof_field_name.as_ref())
            .collect();
        right_take_fields.sort();
        let mut fields = left_def.fields.clone();
        for name in &right_take_fields {
            let fty = right_def.field_type(name).expect("right_take_fields drawn from right_def");
            fields.push((name.clone(), fty));
        }
        let result_ty = types.intern(UserDefinedType { name: format!("!{}_join_{}", left_def.name.trim_start_matches('!'), right_def.name.trim_start_matches('!')), fields });

        Some(TypedExpr {
            kind: TypedExprKind::Join(TypedJoin {
                left: Box::new(left),
                right: Box::new(right),
                on: on_pairs,
                asof: asof_pair,
                strict: j.strict,
                direction: j.direction,
                within,
                result_ty,
                right_take_fields,
            }),
            ty: result_ty,
            traits: Traits::NONE,
            mode: Mode::Normal,
            literal: None,
        })
    }
}
