use std::{fs, path::Path, sync::Arc};

use jl_core::{
  index_file, CoreEngine, CoreError, CoreOptions, Generation, GenerationToken, IndexedFile, Indexer,
  IndexerOptions, MemoryStore, OpenOutcome,
};

fn small_window(max_chunk_bytes: u64) -> IndexerOptions {
  IndexerOptions {
    max_chunk_bytes,
    page_bytes: 16,
    cancel_check_every: 1,
  }
}

fn index(path: &Path, opts: &IndexerOptions) -> IndexedFile {
  index_file(path, 0, 0, opts, &GenerationToken::detached(), &mut |_, _| {}).unwrap()
}

/// Absolute byte ranges and texts of every entry.
fn entries(indexed: &IndexedFile) -> Vec<(u64, u64, String)> {
  indexed
    .locators
    .iter()
    .map(|l| {
      let chunk = indexed.file.chunk(l.chunk_id).unwrap();
      let text = std::str::from_utf8(&chunk.bytes()[l.start..l.end]).unwrap().to_string();
      (chunk.file_offset() + l.start as u64, chunk.file_offset() + l.end as u64, text)
    })
    .collect()
}

/// A mix of compact objects, pretty-printed objects, arrays and bare primitives.
fn mixed_fixture(n: usize) -> (String, Vec<String>) {
  let mut file = String::new();
  let mut values = Vec::new();
  for i in 0..n {
    let v = match i % 4 {
      0 => format!("{{\"i\":{i},\"m\":\"{}\"}}", "a".repeat(i % 17)),
      1 => format!("[{i}, \"x\"]"),
      2 => format!("{{\n  \"i\": {i}\n}}"),
      _ => format!("{i}"),
    };
    file.push_str(&v);
    file.push_str(if i % 5 == 0 { "\r\n" } else { "\n" });
    values.push(v);
  }
  (file, values)
}

fn engine() -> CoreEngine {
  CoreEngine::with_store(CoreOptions::default(), Arc::new(MemoryStore::new()))
}

#[test]
fn basic_jsonl_two_entries() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("a.jsonl");
  fs::write(
    &file,
    "{\"level\":\"INFO\",\"msg\":\"a\"}\n{\"level\":\"ERROR\",\"msg\":\"b\"}\n",
  )
  .unwrap();

  let eng = engine();
  let info = eng.open(&file).unwrap();
  assert_eq!(info.entries, 2);
  assert_eq!(info.file_id, 0);
  assert!(!info.truncated_tail);

  assert_eq!(eng.visible_at(0).unwrap().ordinal, 0);
  assert_eq!(eng.visible_at(1).unwrap().ordinal, 1);
  assert_eq!(eng.parsed(0).unwrap().get("level").unwrap().display_text(), "INFO");
  assert_eq!(eng.field(1, "msg").unwrap().as_deref(), Some("b"));
  assert_eq!(eng.columns(), vec!["level".to_string(), "msg".to_string()]);
}

#[test]
fn every_value_is_found_once() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("mixed.jsonl");
  let (content, values) = mixed_fixture(200);
  fs::write(&file, content).unwrap();

  let indexed = index(&file, &small_window(1 << 20));
  let texts: Vec<String> = entries(&indexed).into_iter().map(|(_, _, t)| t).collect();
  assert_eq!(texts, values);
  assert_eq!(indexed.file.chunks.len(), 1);
}

#[test]
fn window_size_does_not_change_the_result() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("mixed.jsonl");
  let (content, values) = mixed_fixture(300);
  fs::write(&file, content).unwrap();

  let reference = entries(&index(&file, &small_window(1 << 20)));
  assert_eq!(reference.len(), values.len());

  // Longest value is well under 48 bytes, so every window from 64 up must agree.
  for max_chunk in [64, 70, 80, 96, 100, 128, 255, 1000] {
    let indexed = index(&file, &small_window(max_chunk));
    assert!(indexed.file.chunks.len() > 1, "max_chunk={max_chunk}");
    assert!(!indexed.file.truncated_tail, "max_chunk={max_chunk}");
    assert_eq!(entries(&indexed), reference, "max_chunk={max_chunk}");
  }
}

#[test]
fn ordinals_are_dense_across_files() {
  let dir = tempfile::tempdir().unwrap();
  let eng = engine();
  let mut total = 0;
  for (name, n) in [("a.jsonl", 5), ("b.jsonl", 0), ("c.jsonl", 7)] {
    let (content, _) = mixed_fixture(n);
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    total += eng.open(&path).unwrap().entries;
  }

  assert_eq!(total, 12);
  assert_eq!(eng.entries().len(), 12);
  for ordinal in 0..12 {
    assert_eq!(eng.entries().bounds(ordinal).unwrap().ordinal, ordinal);
  }
  assert!(eng.entries().bounds(12).is_none());
}

#[test]
fn pretty_printed_object_straddling_a_window_boundary() {
  const MIB: usize = 1024 * 1024;
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("big.jsonl");

  let mut content = String::new();
  let mut small = 0;
  while content.len() < 3 * MIB / 2 {
    content.push_str(&format!("{{\"n\":{small},\"pad\":\"{}\"}}\n", "p".repeat(100)));
    small += 1;
  }

  let mut big = String::from("{\n");
  let mut k = 0;
  while big.len() < MIB {
    big.push_str(&format!("  \"key{k}\": {{\n    \"text\": \"{}\"\n  }},\n", "q".repeat(200)));
    k += 1;
  }
  big.push_str("  \"last\": true\n}");
  let big_start = content.len();
  content.push_str(&big);
  content.push('\n');
  let big_end = big_start + big.len();
  assert!(big_start < 2 * MIB && big_end > 2 * MIB);

  while content.len() < 3 * MIB {
    content.push_str("{\"tail\":1}\n");
  }
  fs::write(&file, &content).unwrap();

  let two_mib = IndexerOptions {
    max_chunk_bytes: 2 * MIB as u64,
    page_bytes: 64 * 1024,
    cancel_check_every: 1024,
  };
  let whole = IndexerOptions {
    max_chunk_bytes: 8 * MIB as u64,
    ..two_mib.clone()
  };

  let split = index(&file, &two_mib);
  let reference = index(&file, &whole);
  assert!(split.file.chunks.len() >= 2);
  assert_eq!(reference.file.chunks.len(), 1);

  let split_entries = entries(&split);
  assert_eq!(split_entries, entries(&reference));

  let (begin, end, text) = &split_entries[small];
  assert_eq!((*begin, *end), (big_start as u64, big_end as u64));
  assert_eq!(text, &big);
}

#[test]
fn truncated_tail_keeps_preceding_entries() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("cut.jsonl");
  fs::write(&file, "{\"a\":1}\n{\"b\":2}\n{\"c\":[1,2").unwrap();

  let indexed = index(&file, &small_window(1 << 20));
  assert_eq!(indexed.locators.len(), 2);
  assert!(indexed.file.truncated_tail);
}

#[test]
fn oversize_value_stops_indexing() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("huge.jsonl");
  let huge = format!("{{\"blob\":\"{}\"}}", "z".repeat(500));
  fs::write(&file, format!("{{\"a\":1}}\n{huge}\n{{\"b\":2}}\n")).unwrap();

  let indexed = index(&file, &small_window(64));
  assert_eq!(indexed.locators.len(), 1);
  assert!(indexed.file.truncated_tail);
}

#[test]
fn empty_file_has_no_entries_or_chunks() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("empty.jsonl");
  fs::write(&file, "").unwrap();

  let indexed = index(&file, &small_window(64));
  assert!(indexed.locators.is_empty());
  assert!(indexed.file.chunks.is_empty());
  assert_eq!(indexed.file.len, 0);

  let blank = dir.path().join("blank.jsonl");
  fs::write(&blank, "\n\n   \n").unwrap();
  let indexed = index(&blank, &small_window(64));
  assert!(indexed.locators.is_empty());
  assert!(indexed.file.chunks.is_empty());
}

#[test]
fn reopening_a_path_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("a.jsonl");
  fs::write(&file, "1\n2\n3\n").unwrap();

  let mut indexer = Indexer::new(small_window(64));
  let token = GenerationToken::detached();
  let first = match indexer.open(&file, 0, &token, &mut |_, _| {}).unwrap() {
    OpenOutcome::Indexed(f) => f,
    OpenOutcome::AlreadyOpen(_) => panic!("first open must index"),
  };
  assert_eq!(first.locators.len(), 3);

  // Same file through a different spelling of the path.
  let dotted = dir.path().join(".").join("a.jsonl");
  match indexer.open(&dotted, 3, &token, &mut |_, _| {}).unwrap() {
    OpenOutcome::AlreadyOpen(id) => assert_eq!(id, first.file.id),
    OpenOutcome::Indexed(_) => panic!("second open must not re-index"),
  }
  assert_eq!(indexer.files().len(), 1);

  let eng = engine();
  eng.open(&file).unwrap();
  let again = eng.open(&dotted).unwrap();
  assert_eq!(again.file_id, 0);
  assert_eq!(eng.entries().len(), 3);
}

#[test]
fn missing_file_is_an_io_error_and_consumes_no_id() {
  let dir = tempfile::tempdir().unwrap();
  let eng = engine();
  let err = eng.open(dir.path().join("nope.jsonl")).unwrap_err();
  assert!(matches!(err, CoreError::Io(_)));

  let file = dir.path().join("a.jsonl");
  fs::write(&file, "{}").unwrap();
  assert_eq!(eng.open(&file).unwrap().file_id, 0);
}

#[test]
fn cancelled_sweep_leaves_nothing_behind() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("a.jsonl");
  let (content, _) = mixed_fixture(50);
  fs::write(&file, content).unwrap();

  let generation = Generation::new();
  let token = generation.token();
  generation.bump();
  assert!(!token.is_current());

  let mut indexer = Indexer::new(small_window(64));
  let err = indexer.open(&file, 0, &token, &mut |_, _| {}).unwrap_err();
  assert!(matches!(err, CoreError::Cancelled));
  assert!(indexer.files().is_empty());
  assert!(indexer.lookup(&file).is_none());

  // A fresh token indexes normally and gets the first id.
  match indexer.open(&file, 0, &generation.token(), &mut |_, _| {}).unwrap() {
    OpenOutcome::Indexed(f) => {
      assert_eq!(f.file.id, 0);
      assert_eq!(f.locators.len(), 50);
    }
    OpenOutcome::AlreadyOpen(_) => panic!("cancelled open must not register the file"),
  }
}

#[test]
fn progress_reaches_the_file_length() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("a.jsonl");
  let (content, _) = mixed_fixture(100);
  fs::write(&file, &content).unwrap();

  let mut seen = Vec::new();
  index_file(
    &file,
    0,
    0,
    &small_window(128),
    &GenerationToken::detached(),
    &mut |done, total| seen.push((done, total)),
  )
  .unwrap();

  let len = content.len() as u64;
  assert_eq!(seen.first(), Some(&(0, len)));
  assert_eq!(seen.last(), Some(&(len, len)));
  assert!(seen.windows(2).all(|w| w[0].0 <= w[1].0));

  let mut pcts = Vec::new();
  engine()
    .open_with_progress(&file, |p| pcts.push(p))
    .unwrap();
  assert_eq!(pcts.first(), Some(&0));
  assert_eq!(pcts.last(), Some(&100));
}
