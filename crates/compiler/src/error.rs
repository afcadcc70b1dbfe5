//! Semantic-analysis errors (`spec.md` §7 `SemaError`). Hand-rolled enum +
//! manual `Display`, matching `vvm_runtime::RuntimeError`'s idiom rather
//! than reaching for `thiserror`.

use std::fmt;

#[derive(Debug, Clone)]
pub struct Candidate {
    pub signature: String,
    pub mismatch: String,
}

#[derive(Debug, Clone)]
pub enum SemaError {
    UnresolvedSymbol(String),
    DuplicateDefinition(String),
    TypeMismatch { expected: String, found: String, context: String },
    OverloadResolutionFailure { name: String, candidates: Vec<Candidate>, more: usize },
    InvalidTableClauseShape(String),
    InvalidAssignmentTarget(String),
    InvalidMacroTemplateGenericUsage(String),
    InvalidReturnContext(String),
    ArityMismatch { name: String, expected: usize, found: usize },
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaError::UnresolvedSymbol(name) => write!(f, "unresolved symbol '{name}'"),
            SemaError::DuplicateDefinition(name) => write!(f, "'{name}' is already defined in this scope"),
            SemaError::TypeMismatch { expected, found, context } => {
                write!(f, "type mismatch in {context}: expected {expected}, found {found}")
            }
            SemaError::OverloadResolutionFailure { name, candidates, more } => {
                write!(f, "no overload of '{name}' matches the call; candidates:")?;
                for c in candidates.iter().take(3) {
                    write!(f, "\n  {} ({})", c.signature, c.mismatch)?;
                }
                if *more > 0 {
                    write!(f, "\n  <{more} others>")?;
                }
                Ok(())
            }
            SemaError::InvalidTableClauseShape(msg) => write!(f, "invalid table clause: {msg}"),
            SemaError::InvalidAssignmentTarget(msg) => write!(f, "invalid assignment target: {msg}"),
            SemaError::InvalidMacroTemplateGenericUsage(msg) => write!(f, "{msg}"),
            SemaError::InvalidReturnContext(msg) => write!(f, "invalid return: {msg}"),
            SemaError::ArityMismatch { name, expected, found } => {
                write!(f, "'{name}' expects {expected} argument(s), found {found}")
            }
        }
    }
}

impl std::error::Error for SemaError {}

/// A module is rejected once any error is recorded; the buffer is still
/// accumulated (rather than stopping at the first error) so a caller can
/// report everything wrong with one turn (`spec.md` §4.1 Diagnostics).
#[derive(Debug, Default)]
pub struct Diagnostics {
    errors: Vec<SemaError>,
}

impl Diagnostics {
    pub fn push(&mut self, e: SemaError) {
        self.errors.push(e);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<SemaError> {
        self.errors
    }

    pub fn first_message(&self) -> Option<String> {
        self.errors.first().map(|e| e.to_string())
    }
}
