//! Scope stack and symbol table (`spec.md` §4.1 "Scopes and symbol table").
//!
//! A scope is a map from name to a non-empty ordered list of [`Resolved`]
//! references, supporting overloading; scopes form a tree via parent ids.

use crate::error::SemaError;
use crate::types::{Binding, ComptimeLit, Mode, Traits};
use std::collections::HashMap;
use vvm_core::TypeCode;

#[derive(Debug, Clone)]
pub struct FunctionSig {
    /// Analyzer-assigned identity, stable across a [`crate::session::Session`]'s
    /// turns. Codegen maps this to the constant-pool slot holding the
    /// lowered `FunctionDef`, reserving it before the body is lowered so
    /// recursive self-calls resolve.
    pub func_id: u32,
    pub param_types: Vec<TypeCode>,
    pub ret: TypeCode,
    pub traits: Traits,
    /// Set for `inline fn`: the un-instantiated body, substituted fresh at
    /// every call site instead of emitted once and `call`ed.
    pub force_inline: bool,
}

impl FunctionSig {
    fn signature_eq(&self, other: &FunctionSig) -> bool {
        self.param_types == other.param_types
    }
}

/// One generic function definition and its already-instantiated
/// specialisations, keyed by argument types (`spec.md` §4.1 "Generic
/// instantiation").
#[derive(Debug, Clone, Default)]
pub struct GenericDef {
    pub decl: crate::ast::FunctionDecl,
    pub instantiated: Vec<(Vec<TypeCode>, FunctionSig)>,
}

/// A macro definition: a function where selected parameters must be
/// comptime literals at the call site (`spec.md` §4.1 "Macro expansion").
#[derive(Debug, Clone)]
pub struct MacroDef {
    pub decl: crate::ast::FunctionDecl,
    pub instantiated: Vec<(String, FunctionSig)>,
}

/// A template definition — a `data` or `fn` parameterised by compile-time
/// types or values, instantiated by mangled name (`spec.md` §4.1 "Template
/// instantiation").
#[derive(Debug, Clone)]
pub struct TemplateDataDef {
    pub decl: crate::ast::DataDecl,
    pub instantiated: Vec<(String, TypeCode)>,
}

#[derive(Debug, Clone)]
pub enum Resolved {
    /// `mode`/`traits`/`literal` mirror the initializer's own `TypedExpr`
    /// fields at the point of the `let`/`var` (`spec.md` §4.1 mode
    /// derivation) so a later load of the same name forwards them instead
    /// of resetting to `Normal` — needed for a `let`-bound comptime literal
    /// to still qualify as a macro argument or CTFE operand.
    Variable { binding: Binding, ty: TypeCode, mutable: bool, mode: Mode, traits: Traits, literal: Option<ComptimeLit> },
    Function(FunctionSig),
    DataType(TypeCode),
    Generic(usize),
    Macro(usize),
    TemplateData(usize),
    /// A template/macro parameter bound to a folded compile-time value
    /// rather than a register (`spec.md` §4.1 "Template instantiation").
    ComptimeValue(ComptimeLit, TypeCode),
    /// A name resolved via a table clause's preferred scope, by field index
    /// and type into the enclosing table expression's source type.
    ImpliedMember(u32, TypeCode),
}

#[derive(Debug, Default)]
struct ScopeNode {
    parent: Option<usize>,
    symbols: HashMap<String, Vec<Resolved>>,
}

/// Tree of lexical scopes plus the generic/macro/template-data definition
/// stores (kept here, not per-scope, since instantiation caches are global
/// to the module).
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<ScopeNode>,
    current: usize,
    pub generics: Vec<GenericDef>,
    pub macros: Vec<MacroDef>,
    pub template_data: Vec<TemplateDataDef>,
    /// REPL turns may redefine non-builtin names in place (`spec.md` §4.1).
    pub interactive: bool,
}

impl ScopeStack {
    pub fn new(interactive: bool) -> Self {
        ScopeStack {
            scopes: vec![ScopeNode::default()],
            current: 0,
            generics: Vec::new(),
            macros: Vec::new(),
            template_data: Vec::new(),
            interactive,
        }
    }

    pub fn push_scope(&mut self) -> usize {
        let saved = self.current;
        self.scopes.push(ScopeNode { parent: Some(saved), symbols: HashMap::new() });
        self.current = self.scopes.len() - 1;
        saved
    }

    pub fn pop_scope(&mut self, saved: usize) {
        self.current = saved;
    }

    /// `store_symbol` (`spec.md` §4.1): overload-append for distinct
    /// function/generic/macro signatures, specialisation-record for
    /// generics, interactive overwrite for plain redefinitions, and a
    /// redefinition error otherwise.
    pub fn store_symbol(&mut self, name: &str, resolved: Resolved) -> Result<(), SemaError> {
        let interactive = self.interactive;
        let node = &mut self.scopes[self.current];
        let entry = node.symbols.entry(name.to_string()).or_default();
        if entry.is_empty() {
            entry.push(resolved);
            return Ok(());
        }
        if let Resolved::Function(ref new_sig) = resolved {
            let distinct = entry.iter().all(|r| match r {
                Resolved::Function(existing) => !existing.signature_eq(new_sig),
                _ => true,
            });
            if distinct {
                entry.push(resolved);
                return Ok(());
            }
        }
        if interactive {
            let is_builtin_slot = false; // builtins are never stored as user symbols here
            if !is_builtin_slot {
                *entry = vec![resolved];
                return Ok(());
            }
        }
        Err(SemaError::DuplicateDefinition(name.to_string()))
    }

    pub fn lookup(&self, name: &str) -> Option<&[Resolved]> {
        let mut scope = Some(self.current);
        while let Some(idx) = scope {
            let node = &self.scopes[idx];
            if let Some(list) = node.symbols.get(name) {
                return Some(list);
            }
            scope = node.parent;
        }
        None
    }
}
