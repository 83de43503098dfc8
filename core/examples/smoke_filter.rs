use std::path::PathBuf;

use jl_core::{Action, CoreEngine, CoreOptions, FilterRule, MatchKind, MemoryStore};

fn main() -> Result<(), String> {
  let mut args = std::env::args().skip(1);
  let usage = "usage: cargo run -p jl_core --example smoke_filter -- <path-to-jsonl> <expression>";
  let path = PathBuf::from(args.next().ok_or(usage)?);
  let expression = args.next().ok_or(usage)?;

  let eng = CoreEngine::with_store(CoreOptions::default(), std::sync::Arc::new(MemoryStore::new()));
  eng.validate_expression(&expression).map_err(|e| e.to_string())?;
  eng.open(&path).map_err(|e| e.to_string())?;
  let total = eng.visible_count();

  eng
    .set_rules(vec![FilterRule::new(Action::Include, MatchKind::Expression, expression)])
    .map_err(|e| e.to_string())?;
  println!("visible={} of {}", eng.visible_count(), total);

  if let Some(loc) = eng.visible_at(0) {
    println!("first={}", eng.text(loc.ordinal).map_err(|e| e.to_string())?);
  }
  Ok(())
}
