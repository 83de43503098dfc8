use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use jl_core::{Action, FilterRule, MatchKind, Rgba};

/// Browse, filter and search JSONL logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "jlens")]
#[command(version, about, long_about = None)]
pub struct Cli {
  /// Files to open. With none, the files of the previous session are reopened.
  pub paths: Vec<String>,

  /// Preferences database (defaults to ~/.jsonl-lens/preferences.sqlite).
  #[arg(long, env = "JLENS_PREFS")]
  pub prefs: Option<PathBuf>,

  /// Filter rule `ACTION[@COLOR]:[TYPE:]EXPRESSION`, e.g. `exclude:debug`,
  /// `highlight@red:regex:time(d|out)` or `include:expr:$.status >= 500`.
  /// Replaces the saved rules when given; repeat for several rules (last match wins).
  #[arg(short, long = "rule", value_name = "RULE", value_parser = parse_rule)]
  pub rules: Vec<FilterRule>,

  /// Mark rows containing this text and report the first match.
  #[arg(short, long)]
  pub search: Option<String>,

  /// Rows to print.
  #[arg(short = 'n', long, default_value_t = 50)]
  pub limit: usize,

  /// Print the inferred column names instead of rows.
  #[arg(long)]
  pub columns: bool,

  /// Check an expression and exit.
  #[arg(long, value_name = "EXPR")]
  pub validate: Option<String>,

  /// Do not write rules, open files and layout back to the preferences.
  #[arg(long)]
  pub no_save: bool,

  /// Output format.
  #[arg(short, long, value_enum, default_value_t = Format::Table)]
  pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
  /// Aligned columns; highlighted rows are colored on a terminal.
  #[default]
  Table,
  /// One JSON object per row.
  Jsonl,
}

pub fn parse_rule(input: &str) -> Result<FilterRule, String> {
  let (head, rest) = input
    .split_once(':')
    .ok_or_else(|| format!("expected ACTION:EXPRESSION, got {input:?}"))?;

  let (action, color) = match head.split_once('@') {
    Some((a, c)) => (a, Some(Rgba::parse(c).map_err(|e| e.to_string())?)),
    None => (head, None),
  };
  let action: Action = action.parse()?;

  // The type segment is optional; anything that is not a known type is part of the expression.
  let (kind, expression) = match rest.split_once(':') {
    Some((k, e)) => match k.parse::<MatchKind>() {
      Ok(kind) => (kind, e),
      Err(_) => (MatchKind::PlainCaseInsensitive, rest),
    },
    None => (MatchKind::PlainCaseInsensitive, rest),
  };
  if expression.is_empty() {
    return Err("rule expression is empty".into());
  }

  let rule = FilterRule::new(action, kind, expression);
  Ok(match color {
    Some(c) => rule.with_color(c),
    None => rule,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn plain_rule_defaults_to_case_insensitive() {
    let r = parse_rule("exclude:debug").unwrap();
    assert_eq!(r.action, Action::Exclude);
    assert_eq!(r.kind, MatchKind::PlainCaseInsensitive);
    assert_eq!(r.expression, "debug");
  }

  #[test]
  fn typed_rule_with_color() {
    let r = parse_rule("highlight@#ff0000:regex:time(d|out)").unwrap();
    assert_eq!(r.action, Action::Highlight);
    assert_eq!(r.kind, MatchKind::Regex);
    assert_eq!(r.color, Rgba::RED);
    assert_eq!(r.expression, "time(d|out)");
  }

  #[test]
  fn colon_inside_expression_is_kept() {
    let r = parse_rule("include:level:error").unwrap();
    assert_eq!(r.kind, MatchKind::PlainCaseInsensitive);
    assert_eq!(r.expression, "level:error");
  }

  #[test]
  fn bad_rules_are_rejected() {
    assert!(parse_rule("nothing").is_err());
    assert!(parse_rule("drop:x").is_err());
    assert!(parse_rule("include:regex:").is_err());
  }
}
