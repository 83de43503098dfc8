use std::{fs, path::Path};

use jl_core::{index_file, EntryStore, FileId, GenerationToken, IndexedFile, IndexerOptions};

fn opts() -> IndexerOptions {
  IndexerOptions {
    max_chunk_bytes: 64,
    page_bytes: 16,
    cancel_check_every: 1024,
  }
}

fn attach(store: &EntryStore, path: &Path, file_id: FileId) -> IndexedFile {
  let indexed = index_file(
    path,
    file_id,
    store.len(),
    &opts(),
    &GenerationToken::detached(),
    &mut |_, _| {},
  )
  .unwrap();
  store.attach(indexed.file.clone(), &indexed.locators);
  indexed
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
  let path = dir.join(name);
  fs::write(&path, content).unwrap();
  path
}

#[test]
fn text_and_parsed_follow_the_locator() {
  let dir = tempfile::tempdir().unwrap();
  let path = write(
    dir.path(),
    "a.jsonl",
    "{\"level\":\"INFO\",\"ctx\":{\"user\":\"ann\"}}\n{\"oops\":\n",
  );
  let store = EntryStore::new(16);
  attach(&store, &path, 0);

  // The second entry is an unbalanced tail and is not indexed.
  assert_eq!(store.len(), 1);
  let loc = store.bounds(0).unwrap();
  assert_eq!(&*store.text(&loc).unwrap(), "{\"level\":\"INFO\",\"ctx\":{\"user\":\"ann\"}}");

  let tree = store.parsed(&loc).unwrap().unwrap();
  assert_eq!(tree.get("level").unwrap().display_text(), "INFO");
  assert_eq!(store.field(&loc, "user").as_deref(), Some("ann"));
  assert_eq!(store.field(&loc, "ctx").as_deref(), Some("{\"user\":\"ann\"}"));
  assert_eq!(store.field(&loc, "missing"), None);
  assert_eq!(store.absolute_range(&loc), Some((0, loc.end as u64)));
}

#[test]
fn parse_failures_are_reported_per_entry() {
  let dir = tempfile::tempdir().unwrap();
  let path = write(dir.path(), "bad.jsonl", "{\"a\":1}\n{\"a\" 2}\ntrue\n");
  let store = EntryStore::new(16);
  attach(&store, &path, 0);

  assert_eq!(store.len(), 3);
  assert!(store.parsed(&store.bounds(0).unwrap()).unwrap().is_ok());
  let err = store.parsed(&store.bounds(1).unwrap()).unwrap().unwrap_err();
  assert_eq!(err.line, 1);
  assert!(err.column > 0);
  // Asking again gives the same answer.
  assert_eq!(store.parsed(&store.bounds(1).unwrap()).unwrap().unwrap_err(), err);
  assert_eq!(store.field(&store.bounds(1).unwrap(), "a"), None);
  assert!(store.parsed(&store.bounds(2).unwrap()).unwrap().unwrap().is_truthy());
}

#[test]
fn cell_text_is_single_line_and_bounded() {
  let dir = tempfile::tempdir().unwrap();
  let path = write(
    dir.path(),
    "a.jsonl",
    "{\"msg\":\"line one\\nline two\",\"n\":12}\n",
  );
  let store = EntryStore::new(4);
  attach(&store, &path, 0);
  let loc = store.bounds(0).unwrap();

  assert_eq!(store.cell_text(&loc, Some("msg"), 256), "line one\\nline two");
  assert_eq!(store.cell_text(&loc, Some("msg"), 4), "line...");
  assert_eq!(store.cell_text(&loc, Some("n"), 256), "12");
  assert_eq!(store.cell_text(&loc, Some("nope"), 256), "");
  assert_eq!(store.cell_text(&loc, None, 7), "{\"msg\":...");
}

#[test]
fn cache_stays_within_capacity() {
  let dir = tempfile::tempdir().unwrap();
  let content: String = (0..100).map(|i| format!("{{\"i\":{i}}}\n")).collect();
  let path = write(dir.path(), "many.jsonl", &content);
  let store = EntryStore::new(8);
  attach(&store, &path, 0);
  assert_eq!(store.cache_capacity(), 8);

  let first: Vec<String> = store
    .locators_from(0)
    .iter()
    .map(|l| {
      let v = store.field(l, "i").unwrap();
      assert!(store.cache_len() <= 8);
      v
    })
    .collect();

  // Evicted entries come back with the same value.
  for (l, expected) in store.locators_from(0).iter().zip(&first) {
    assert_eq!(&store.field(l, "i").unwrap(), expected);
  }
  assert_eq!(first[42], "42");
  assert!(store.cache_len() <= 8);
}

#[test]
fn invalidate_renumbers_remaining_entries() {
  let dir = tempfile::tempdir().unwrap();
  let a = write(dir.path(), "a.jsonl", "{\"f\":\"a0\"}\n{\"f\":\"a1\"}\n");
  let b = write(dir.path(), "b.jsonl", "{\"f\":\"b0\"}\n{\"f\":\"b1\"}\n{\"f\":\"b2\"}\n");
  let store = EntryStore::new(16);
  let a_file = attach(&store, &a, 0);
  attach(&store, &b, 1);
  assert_eq!(store.len(), 5);

  // Warm the cache for both files.
  for l in store.locators_from(0) {
    store.text(&l).unwrap();
  }
  let stale = a_file.locators[0];

  assert_eq!(store.invalidate(0), 2);
  assert_eq!(store.len(), 3);
  assert!(store.file(0).is_none());
  assert!(store.text(&stale).is_none());

  let rest = store.locators_from(0);
  assert_eq!(rest.iter().map(|l| l.ordinal).collect::<Vec<_>>(), vec![0, 1, 2]);
  assert!(rest.iter().all(|l| l.file_id == 1));
  assert_eq!(store.field(&rest[2], "f").as_deref(), Some("b2"));
  assert_eq!(store.locators_from(2).len(), 1);
  assert!(store.locators_from(10).is_empty());

  assert_eq!(store.invalidate(7), 0);
}
