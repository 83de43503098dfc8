use std::sync::LazyLock;

use regex::Regex;

use super::ExprError;
use crate::models::JsonPathSegment;

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
  Regex::new(
    r#"^\s*(?:(?P<num>[0-9]+(?:\.[0-9]+)?)|(?P<str>"[^"]*")|(?P<path>\$(?:\.[A-Za-z0-9_@]+|\[[0-9]+\])*)|(?P<op>==|!=|<=|>=|&&|\|\||[-!+*/%<>()])|(?P<kw>(?:true|false|null)\b))"#,
  )
  .unwrap_or_else(|_| unreachable!())
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
  Not,
  Mul,
  Div,
  Rem,
  Add,
  Sub,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  And,
  Or,
}

impl Op {
  fn from_symbol(s: &str) -> Option<Op> {
    Some(match s {
      "!" => Op::Not,
      "*" => Op::Mul,
      "/" => Op::Div,
      "%" => Op::Rem,
      "+" => Op::Add,
      "-" => Op::Sub,
      "==" => Op::Eq,
      "!=" => Op::Ne,
      "<" => Op::Lt,
      "<=" => Op::Le,
      ">" => Op::Gt,
      ">=" => Op::Ge,
      "&&" => Op::And,
      "||" => Op::Or,
      _ => return None,
    })
  }

  pub(crate) fn symbol(self) -> &'static str {
    match self {
      Op::Not => "!",
      Op::Mul => "*",
      Op::Div => "/",
      Op::Rem => "%",
      Op::Add => "+",
      Op::Sub => "-",
      Op::Eq => "==",
      Op::Ne => "!=",
      Op::Lt => "<",
      Op::Le => "<=",
      Op::Gt => ">",
      Op::Ge => ">=",
      Op::And => "&&",
      Op::Or => "||",
    }
  }

  /// `&&` binds tighter than `||`; everything else follows the usual C ordering.
  pub(crate) fn precedence(self) -> u8 {
    match self {
      Op::Not => 5,
      Op::Mul | Op::Div | Op::Rem => 4,
      Op::Add | Op::Sub => 3,
      Op::Eq | Op::Ne | Op::Lt | Op::Le | Op::Gt | Op::Ge => 2,
      Op::And => 1,
      Op::Or => 0,
    }
  }

  pub(crate) fn is_unary(self) -> bool {
    self == Op::Not
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
  Number(f64),
  /// String literal without its quotes. Backslashes are kept as written.
  Str(String),
  Bool(bool),
  Null,
  Path(Vec<JsonPathSegment>),
  Op(Op),
  LParen,
  RParen,
}

impl Token {
  pub(crate) fn is_operand(&self) -> bool {
    matches!(
      self,
      Token::Number(_) | Token::Str(_) | Token::Bool(_) | Token::Null | Token::Path(_)
    )
  }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
  pub(crate) token: Token,
  pub(crate) position: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ExprError> {
  let mut out = Vec::new();
  let mut pos = 0;

  loop {
    let rest = &source[pos..];
    if rest.trim().is_empty() {
      return Ok(out);
    }
    let Some(caps) = TOKEN.captures(rest) else {
      let position = pos + (rest.len() - rest.trim_start().len());
      return Err(ExprError::Syntax {
        position,
        message: format!("unexpected input {:?}", rest.trim_start().chars().next().unwrap_or(' ')),
      });
    };
    let whole = caps.get(0).map_or(0, |m| m.end());

    let (token, start) = if let Some(m) = caps.name("num") {
      let n: f64 = m.as_str().parse().map_err(|_| ExprError::Syntax {
        position: pos + m.start(),
        message: format!("bad number {:?}", m.as_str()),
      })?;
      (Token::Number(n), m.start())
    } else if let Some(m) = caps.name("str") {
      let s = m.as_str();
      (Token::Str(s[1..s.len() - 1].to_string()), m.start())
    } else if let Some(m) = caps.name("path") {
      (Token::Path(parse_path(m.as_str(), pos + m.start())?), m.start())
    } else if let Some(m) = caps.name("op") {
      let token = match m.as_str() {
        "(" => Token::LParen,
        ")" => Token::RParen,
        s => Token::Op(Op::from_symbol(s).ok_or_else(|| ExprError::Syntax {
          position: pos + m.start(),
          message: format!("unknown operator {s:?}"),
        })?),
      };
      (token, m.start())
    } else if let Some(m) = caps.name("kw") {
      let token = match m.as_str() {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        _ => Token::Null,
      };
      (token, m.start())
    } else {
      return Err(ExprError::Syntax {
        position: pos,
        message: "unrecognized token".to_string(),
      });
    };

    out.push(Spanned {
      token,
      position: pos + start,
    });
    pos += whole;
  }
}

/// `$`, then any run of `.ident` and `[index]`.
fn parse_path(text: &str, position: usize) -> Result<Vec<JsonPathSegment>, ExprError> {
  let mut segments = Vec::new();
  let mut rest = &text[1..];
  while !rest.is_empty() {
    if let Some(after) = rest.strip_prefix('.') {
      let end = after.find(['.', '[']).unwrap_or(after.len());
      segments.push(JsonPathSegment::Key(after[..end].to_string()));
      rest = &after[end..];
    } else if let Some(after) = rest.strip_prefix('[') {
      let end = after.find(']').unwrap_or(after.len());
      let index: u64 = after[..end].parse().map_err(|_| ExprError::Syntax {
        position,
        message: format!("bad array index in {text:?}"),
      })?;
      segments.push(JsonPathSegment::Index(index));
      rest = after.get(end + 1..).unwrap_or("");
    } else {
      return Err(ExprError::Syntax {
        position,
        message: format!("bad path {text:?}"),
      });
    }
  }
  Ok(segments)
}
