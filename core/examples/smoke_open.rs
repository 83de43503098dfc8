use std::path::PathBuf;

use jl_core::{CoreEngine, CoreOptions, StorageOptions};

fn main() -> Result<(), String> {
  let path = std::env::args()
    .nth(1)
    .ok_or_else(|| "usage: cargo run -p jl_core --example smoke_open -- <path-to-jsonl>".to_string())?;
  let path = PathBuf::from(path);

  let dir = tempfile::tempdir().map_err(|e| e.to_string())?;
  let sqlite = dir.path().join("smoke.sqlite");

  let eng = CoreEngine::new(CoreOptions {
    page_size: 5,
    cell_max_chars: 120,
    max_concurrent_tasks: 1,
    storage: StorageOptions {
      sqlite_path: Some(sqlite),
    },
    ..CoreOptions::default()
  })
  .map_err(|e| e.to_string())?;

  let info = eng.open(&path).map_err(|e| e.to_string())?;
  println!("entries={} chunks={} truncated_tail={}", info.entries, info.chunks, info.truncated_tail);
  println!("columns={:?}", eng.columns());

  let page = eng.visible_page(None, 0).map_err(|e| e.to_string())?;
  for row in &page.rows {
    println!("{}", row.cells.join(" | "));
  }
  if let Some(first) = page.rows.first() {
    for line in eng.outline(first.ordinal).map_err(|e| e.to_string())? {
      println!("{}{}", "  ".repeat(line.depth), line.label);
    }
  }
  Ok(())
}
