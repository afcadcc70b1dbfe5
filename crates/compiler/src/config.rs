//! Compiler-facing configuration, builder-style like `vvm_runtime::VmConfig`.

/// `spec.md` §4.1 CTFE: a folded constant expression is evaluated directly
/// against the typed IR rather than by lowering and running bytecode, but
/// still needs a ceiling so a pathological `while` loop in a `const`
/// initializer can't hang analysis.
const DEFAULT_CTFE_STEP_LIMIT: usize = 1_000_000;

/// Whether a [`crate::session::Session`] behaves like a one-shot script
/// runner or an interactive REPL (`spec.md` §4.1 "Interactive redefinition").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    Script,
    Repl,
}

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    pub mode: EvaluationMode,
    /// Forwarded to `vvm_runtime::VmConfig::console_height`.
    pub console_height: usize,
    pub ctfe_step_limit: usize,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            mode: EvaluationMode::Script,
            console_height: 25,
            ctfe_step_limit: DEFAULT_CTFE_STEP_LIMIT,
        }
    }
}

impl CompilerConfig {
    pub fn new(mode: EvaluationMode) -> Self {
        CompilerConfig { mode, ..Self::default() }
    }

    pub fn with_console_height(mut self, height: usize) -> Self {
        self.console_height = height;
        self
    }

    pub fn with_ctfe_step_limit(mut self, limit: usize) -> Self {
        self.ctfe_step_limit = limit;
        self
    }

    pub fn interactive(&self) -> bool {
        self.mode == EvaluationMode::Repl
    }
}
