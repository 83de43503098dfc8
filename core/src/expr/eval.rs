use std::{borrow::Cow, fmt};

use super::{
  compile::Program,
  lexer::{Op, Token},
  ExprError,
};
use crate::tree::JsonNode;

/// Intermediate value on the evaluation stack.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
  Null,
  Bool(bool),
  Number(f64),
  Str(Cow<'a, str>),
  /// An array or object reached through a path.
  Node(&'a JsonNode),
}

impl<'a> Value<'a> {
  fn from_node(node: Option<&'a JsonNode>) -> Self {
    match node {
      None | Some(JsonNode::Null) => Value::Null,
      Some(JsonNode::Bool(b)) => Value::Bool(*b),
      Some(JsonNode::Number(n)) => n.as_f64().map_or(Value::Null, Value::Number),
      Some(JsonNode::String(s)) => Value::Str(Cow::Borrowed(s)),
      Some(node) => Value::Node(node),
    }
  }

  fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(n) => Some(*n),
      Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
      _ => None,
    }
  }

  pub fn is_truthy(&self) -> bool {
    match self {
      Value::Null => false,
      Value::Bool(b) => *b,
      Value::Number(n) => *n != 0.0,
      Value::Str(s) => !s.is_empty(),
      Value::Node(node) => node.is_truthy(),
    }
  }

  /// Form used when operands are compared as strings.
  pub fn display(&self) -> Cow<'_, str> {
    match self {
      Value::Null => Cow::Borrowed("null"),
      Value::Bool(b) => Cow::Owned(b.to_string()),
      Value::Number(n) => Cow::Owned(format_number(*n)),
      Value::Str(s) => Cow::Borrowed(s),
      Value::Node(node) => Cow::Owned(node.to_compact_json()),
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      Value::Null => "null",
      Value::Bool(_) => "boolean",
      Value::Number(_) => "number",
      Value::Str(_) => "string",
      Value::Node(JsonNode::Array(_)) => "array",
      Value::Node(_) => "object",
    }
  }
}

impl fmt::Display for Value<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display())
  }
}

fn format_number(n: f64) -> String {
  if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
    format!("{}", n as i64)
  } else {
    n.to_string()
  }
}

impl Program {
  pub fn eval<'a>(&'a self, root: &'a JsonNode) -> Result<Value<'a>, ExprError> {
    let mut stack: Vec<Value<'a>> = Vec::with_capacity(self.postfix.len());

    for token in &self.postfix {
      let value = match token {
        Token::Number(n) => Value::Number(*n),
        Token::Str(s) => Value::Str(Cow::Borrowed(s)),
        Token::Bool(b) => Value::Bool(*b),
        Token::Null => Value::Null,
        Token::Path(path) => Value::from_node(root.resolve(path)),
        Token::Op(Op::Not) => {
          let a = stack.pop().ok_or(ExprError::StackUnderflow("!"))?;
          Value::Bool(!a.is_truthy())
        }
        Token::Op(op) => {
          let b = stack.pop().ok_or(ExprError::StackUnderflow(op.symbol()))?;
          let a = stack.pop().ok_or(ExprError::StackUnderflow(op.symbol()))?;
          apply(*op, &a, &b)?
        }
        Token::LParen | Token::RParen => {
          return Err(ExprError::Syntax {
            position: 0,
            message: "parenthesis in compiled program".to_string(),
          })
        }
      };
      stack.push(value);
    }

    match (stack.pop(), stack.is_empty()) {
      (Some(v), true) => Ok(v),
      _ => Err(ExprError::Syntax {
        position: 0,
        message: "expression does not reduce to a single value".to_string(),
      }),
    }
  }

  /// Truthiness of the result; evaluation errors count as false.
  pub fn matches(&self, root: &JsonNode) -> bool {
    match self.eval(root) {
      Ok(v) => v.is_truthy(),
      Err(e) => {
        tracing::trace!(expression = %self.source(), error = %e, "expression evaluation failed");
        false
      }
    }
  }
}

fn apply<'a>(op: Op, a: &Value<'_>, b: &Value<'_>) -> Result<Value<'a>, ExprError> {
  match op {
    Op::And => return Ok(Value::Bool(a.is_truthy() && b.is_truthy())),
    Op::Or => return Ok(Value::Bool(a.is_truthy() || b.is_truthy())),
    _ => {}
  }

  if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
    return Ok(match op {
      Op::Add => Value::Number(x + y),
      Op::Sub => Value::Number(x - y),
      Op::Mul => Value::Number(x * y),
      Op::Div => Value::Number(x / y),
      Op::Rem => Value::Number(x % y),
      Op::Eq => Value::Bool(x == y),
      Op::Ne => Value::Bool(x != y),
      Op::Lt => Value::Bool(x < y),
      Op::Le => Value::Bool(x <= y),
      Op::Gt => Value::Bool(x > y),
      Op::Ge => Value::Bool(x >= y),
      Op::And | Op::Or | Op::Not => {
        return Err(ExprError::Type {
          op: op.symbol(),
          operands: "two operands".to_string(),
        })
      }
    });
  }

  let (x, y) = (a.display(), b.display());
  Ok(Value::Bool(match op {
    Op::Eq => x == y,
    Op::Ne => x != y,
    Op::Lt => x < y,
    Op::Le => x <= y,
    Op::Gt => x > y,
    Op::Ge => x >= y,
    _ => {
      return Err(ExprError::Type {
        op: op.symbol(),
        operands: format!("{} and {}", a.kind(), b.kind()),
      })
    }
  }))
}
