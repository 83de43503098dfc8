//! Structural boolean expressions over JSON entries.
//!
//! ```text
//! $.code >= 500 && !$.ok
//! $.user.roles[0] == "admin" || $.latency_ms / 1000 > 2
//! ```
//!
//! Paths (`$`, `$.a.b`, `$.items[3]`) resolve against the entry root; a path that does not resolve
//! yields `null`. Arithmetic and comparisons run on numbers when both operands are numbers or
//! booleans, and on display strings otherwise.

mod compile;
mod eval;
mod lexer;

use thiserror::Error;

use crate::tree::JsonNode;

pub use compile::Program;
pub use eval::Value;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExprError {
  #[error("empty expression")]
  Empty,
  #[error("syntax error at offset {position}: {message}")]
  Syntax { position: usize, message: String },
  #[error("unbalanced parentheses")]
  UnbalancedParens,
  #[error("operator `{0}` is missing an operand")]
  StackUnderflow(&'static str),
  #[error("operator `{op}` is not defined for {operands}")]
  Type { op: &'static str, operands: String },
}

/// Check that `source` compiles.
pub fn validate(source: &str) -> Result<(), ExprError> {
  Program::compile(source).map(|_| ())
}

/// Compile and evaluate in one go. Any error counts as false.
pub fn evaluate_bool(source: &str, root: &JsonNode) -> bool {
  match Program::compile(source) {
    Ok(program) => program.matches(root),
    Err(e) => {
      tracing::trace!(error = %e, "expression does not compile");
      false
    }
  }
}
