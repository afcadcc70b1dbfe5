//! A growing, stateful evaluation session (`spec.md` §3 "Typed IR from a
//! REPL turn is retained as history"). One `Session` owns a [`Program`] that
//! only ever grows, a persistent [`Analyzer`] (so later turns see earlier
//! `let`/`var`/`data`/`fn` declarations) and a persistent `StateBank` (so
//! `var` bindings keep their values across turns).

use crate::analyzer::Analyzer;
use crate::codegen;
use crate::config::CompilerConfig;
use crate::parser::parse_module;
use std::fmt;
use vvm_core::Value;
use vvm_runtime::{Program, RuntimeError, StateBank, Vm, VmConfig};

#[derive(Debug, Clone)]
pub enum EvalError {
    Parse(String),
    Sema(String),
    Runtime(String),
    /// `exit(n)` was evaluated; the host should stop feeding the session
    /// further input (`spec.md` §7 treats this separately from an error).
    Exit(i32),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Parse(msg) => write!(f, "Error: {msg}"),
            EvalError::Sema(msg) => write!(f, "Error: {msg}"),
            EvalError::Runtime(msg) => write!(f, "{msg}"),
            EvalError::Exit(code) => write!(f, "exit({code})"),
        }
    }
}

impl std::error::Error for EvalError {}

pub struct Session {
    config: CompilerConfig,
    analyzer: Analyzer,
    program: Program,
    state: Option<StateBank>,
}

impl Session {
    pub fn new(config: CompilerConfig) -> Self {
        let interactive = config.interactive();
        Session {
            analyzer: Analyzer::new(interactive),
            program: Program::new(),
            state: Some(StateBank::default()),
            config,
        }
    }

    /// Parses, analyzes, lowers and runs only the newly added code, leaving
    /// everything from prior turns untouched in `self.program` (`Vm::run_from`
    /// takes the pre-turn instruction count so earlier side effects are not
    /// replayed).
    pub fn evaluate(&mut self, source: &str) -> Result<Option<String>, EvalError> {
        let module = parse_module(source).map_err(|e| EvalError::Parse(e.to_string()))?;

        let typed = self
            .analyzer
            .analyze_module(&module, &mut self.program.types)
            .map_err(|diags| EvalError::Sema(diags.first_message().unwrap_or_else(|| "unknown error".to_string())))?;

        let start = self.program.instructions.len();
        codegen::lower_module(&typed, &mut self.program);

        let vm_config = VmConfig::new().with_console_height(self.config.console_height);
        let state = self.state.take().unwrap_or_default();
        let mut vm = Vm::with_state(&self.program, vm_config, state);
        let result = vm.run_from(start);
        self.state = Some(vm.into_state());

        let value = match result {
            Ok(v) => v,
            Err(RuntimeError::Exit(code)) => return Err(EvalError::Exit(code)),
            Err(e) => return Err(EvalError::Runtime(e.user_message())),
        };

        Ok(value.map(|v| self.render(&v)))
    }

    fn render(&self, value: &Value) -> String {
        let df_type = self.program.types.get(value.type_code());
        vvm_runtime::kernels::display::format_value(value, df_type, self.config.console_height)
    }
}
