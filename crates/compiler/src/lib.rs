//! Semantic analyzer and code generator for the Vector VM language
//! (`spec.md` §3 "Pipeline: source -> AST -> Typed IR -> bytecode").
//!
//! # Modules
//!
//! - `lexer` / `parser` / `ast`: source text to [`ast::Module`].
//! - `scope` / `analyzer` / `types`: name resolution, type checking and
//!   lowering to the Typed IR ([`types::TypedModule`]).
//! - `codegen`: Typed IR to `vvm_runtime::Program`.
//! - `config` / `session`: ambient evaluation state for a script run or a
//!   REPL loop.
//! - `error`: `SemaError` and `Diagnostics`.

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod scope;
pub mod session;
pub mod types;

pub use config::{CompilerConfig, EvaluationMode};
pub use session::{EvalError, Session};

/// One-shot convenience wrapper for callers that don't need a [`Session`]'s
/// history across turns, e.g. `vvm <file>` running a whole script at once.
pub fn evaluate(source: &str, mode: EvaluationMode) -> Result<Option<String>, EvalError> {
    Session::new(CompilerConfig::new(mode)).evaluate(source)
}
