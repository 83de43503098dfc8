use super::{
  lexer::{self, Op, Spanned, Token},
  ExprError,
};

/// A compiled expression in postfix order.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
  source: String,
  pub(crate) postfix: Vec<Token>,
}

impl Program {
  /// Tokenize and reorder with the shunting-yard algorithm.
  ///
  /// Operand/operator adjacency, parenthesis balance and operator arity are all checked here,
  /// so a compiled program can only fail at evaluation time on a type mismatch.
  pub fn compile(source: &str) -> Result<Program, ExprError> {
    let tokens = lexer::tokenize(source)?;
    if tokens.is_empty() {
      return Err(ExprError::Empty);
    }
    let postfix = to_postfix(tokens, source.len())?;
    check_arity(&postfix)?;
    Ok(Program {
      source: source.to_string(),
      postfix,
    })
  }

  pub fn source(&self) -> &str {
    &self.source
  }
}

fn syntax(position: usize, message: &str) -> ExprError {
  ExprError::Syntax {
    position,
    message: message.to_string(),
  }
}

fn to_postfix(tokens: Vec<Spanned>, end: usize) -> Result<Vec<Token>, ExprError> {
  let mut output: Vec<Token> = Vec::with_capacity(tokens.len());
  let mut stack: Vec<Token> = Vec::new();
  let mut expect_operand = true;

  for Spanned { token, position } in tokens {
    match token {
      t if t.is_operand() => {
        if !expect_operand {
          return Err(syntax(position, "expected an operator"));
        }
        output.push(t);
        expect_operand = false;
      }
      Token::Op(op) if op.is_unary() => {
        if !expect_operand {
          return Err(syntax(position, "`!` cannot follow an operand"));
        }
        // Right-associative: nothing of higher precedence can sit above a unary operator.
        stack.push(Token::Op(op));
      }
      Token::Op(op) => {
        if expect_operand {
          return Err(syntax(position, &format!("`{}` is missing its left operand", op.symbol())));
        }
        while let Some(Token::Op(top)) = stack.last() {
          if top.precedence() < op.precedence() {
            break;
          }
          output.extend(stack.pop());
        }
        stack.push(Token::Op(op));
        expect_operand = true;
      }
      Token::LParen => {
        if !expect_operand {
          return Err(syntax(position, "`(` cannot follow an operand"));
        }
        stack.push(Token::LParen);
      }
      Token::RParen => {
        if expect_operand {
          return Err(syntax(position, "unexpected `)`"));
        }
        loop {
          match stack.pop() {
            Some(Token::LParen) => break,
            Some(t) => output.push(t),
            None => return Err(ExprError::UnbalancedParens),
          }
        }
      }
      _ => return Err(syntax(position, "unexpected token")),
    }
  }

  if expect_operand {
    return Err(syntax(end, "unexpected end of expression"));
  }
  while let Some(t) = stack.pop() {
    if t == Token::LParen {
      return Err(ExprError::UnbalancedParens);
    }
    output.push(t);
  }
  Ok(output)
}

fn check_arity(postfix: &[Token]) -> Result<(), ExprError> {
  let mut depth: usize = 0;
  for t in postfix {
    match t {
      Token::Op(op) => {
        let need = if op.is_unary() { 1 } else { 2 };
        if depth < need {
          return Err(ExprError::StackUnderflow(op.symbol()));
        }
        depth -= need - 1;
      }
      _ => depth += 1,
    }
  }
  if depth != 1 {
    return Err(syntax(0, "expression does not reduce to a single value"));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn symbols(p: &Program) -> Vec<String> {
    p.postfix
      .iter()
      .map(|t| match t {
        Token::Op(op) => op.symbol().to_string(),
        Token::Number(n) => n.to_string(),
        Token::Path(_) => "$".to_string(),
        other => format!("{other:?}"),
      })
      .collect()
  }

  #[test]
  fn and_binds_tighter_than_or() {
    let p = Program::compile("1 || 0 && 0").unwrap();
    assert_eq!(symbols(&p), ["1", "0", "0", "&&", "||"]);
  }

  #[test]
  fn not_applies_to_the_next_operand() {
    let p = Program::compile("!$.ok && $.x").unwrap();
    assert_eq!(symbols(&p), ["$", "!", "$", "&&"]);
  }

  #[test]
  fn left_associative_arithmetic() {
    let p = Program::compile("8 - 2 - 1").unwrap();
    assert_eq!(symbols(&p), ["8", "2", "-", "1", "-"]);
  }

  #[test]
  fn rejects_malformed_input() {
    assert_eq!(Program::compile("   "), Err(ExprError::Empty));
    assert_eq!(Program::compile("(1 + 2"), Err(ExprError::UnbalancedParens));
    assert_eq!(Program::compile("1 + 2)"), Err(ExprError::UnbalancedParens));
    assert!(matches!(Program::compile("1 +"), Err(ExprError::Syntax { .. })));
    assert!(matches!(Program::compile("&& 1"), Err(ExprError::Syntax { .. })));
    assert!(matches!(Program::compile("1 2"), Err(ExprError::Syntax { .. })));
    assert!(matches!(Program::compile("()"), Err(ExprError::Syntax { .. })));
    assert!(matches!(Program::compile("$.a = 1"), Err(ExprError::Syntax { .. })));
  }
}
