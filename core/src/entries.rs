use std::{collections::BTreeMap, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::{Mutex, RwLock};

use crate::{
  chunk::FileChunk,
  indexer::MappedFile,
  models::{FileId, Locator},
  tree::{self, JsonNode, ParseError},
};

/// Cache key. Independent of the ordinal so renumbering after a close keeps cached values valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct EntryKey {
  file_id: FileId,
  chunk_id: u32,
  start: usize,
  end: usize,
}

impl From<&Locator> for EntryKey {
  fn from(l: &Locator) -> Self {
    Self {
      file_id: l.file_id,
      chunk_id: l.chunk_id,
      start: l.start,
      end: l.end,
    }
  }
}

type Parsed = Result<Arc<JsonNode>, ParseError>;

#[derive(Default)]
struct StoreInner {
  locators: Vec<Locator>,
  files: BTreeMap<FileId, Arc<MappedFile>>,
}

/// Locator list plus lazily filled, bounded text and parse caches.
///
/// Both caches are LRU with the same capacity. Values are computed outside the cache lock, so two
/// readers racing on a miss may both compute; the results are identical.
pub struct EntryStore {
  inner: RwLock<StoreInner>,
  text_cache: Mutex<LruCache<EntryKey, Arc<str>>>,
  parsed_cache: Mutex<LruCache<EntryKey, Parsed>>,
  capacity: usize,
}

impl EntryStore {
  pub fn new(capacity: usize) -> Self {
    let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
    Self {
      inner: RwLock::new(StoreInner::default()),
      text_cache: Mutex::new(LruCache::new(cap)),
      parsed_cache: Mutex::new(LruCache::new(cap)),
      capacity: cap.get(),
    }
  }

  /// Append a freshly indexed file. Its locators must continue the current ordinal sequence.
  pub fn attach(&self, file: Arc<MappedFile>, locators: &[Locator]) {
    let mut inner = self.inner.write();
    debug_assert!(locators
      .first()
      .map_or(true, |l| l.ordinal == inner.locators.len() as u64));
    inner.locators.extend_from_slice(locators);
    inner.files.insert(file.id, file);
  }

  pub fn len(&self) -> u64 {
    self.inner.read().locators.len() as u64
  }

  pub fn is_empty(&self) -> bool {
    self.inner.read().locators.is_empty()
  }

  pub fn bounds(&self, ordinal: u64) -> Option<Locator> {
    let idx = usize::try_from(ordinal).ok()?;
    self.inner.read().locators.get(idx).copied()
  }

  /// Copy of the locators with ordinals in `from..`.
  pub fn locators_from(&self, from: u64) -> Vec<Locator> {
    let inner = self.inner.read();
    let from = usize::try_from(from).unwrap_or(usize::MAX).min(inner.locators.len());
    inner.locators[from..].to_vec()
  }

  pub fn file(&self, file_id: FileId) -> Option<Arc<MappedFile>> {
    self.inner.read().files.get(&file_id).cloned()
  }

  pub fn files(&self) -> Vec<Arc<MappedFile>> {
    self.inner.read().files.values().cloned().collect()
  }

  fn chunk(&self, loc: &Locator) -> Option<Arc<FileChunk>> {
    let inner = self.inner.read();
    inner.files.get(&loc.file_id)?.chunk(loc.chunk_id).cloned()
  }

  /// Entry text, decoded lossily. `None` once the locator's file has been closed.
  pub fn text(&self, loc: &Locator) -> Option<Arc<str>> {
    let key = EntryKey::from(loc);
    if let Some(hit) = self.text_cache.lock().get(&key) {
      return Some(hit.clone());
    }

    let chunk = self.chunk(loc)?;
    let bytes = chunk.bytes().get(loc.start..loc.end)?;
    let text: Arc<str> = Arc::from(String::from_utf8_lossy(bytes));
    self.text_cache.lock().put(key, text.clone());
    Some(text)
  }

  /// Parsed entry. Parse failures are cached like successes.
  pub fn parsed(&self, loc: &Locator) -> Option<Parsed> {
    let key = EntryKey::from(loc);
    if let Some(hit) = self.parsed_cache.lock().get(&key) {
      return Some(hit.clone());
    }

    let text = self.text(loc)?;
    let parsed = tree::parse(&text).map(Arc::new);
    self.parsed_cache.lock().put(key, parsed.clone());
    Some(parsed)
  }

  /// Display text of the first member named `key` anywhere in the entry (depth-first).
  pub fn field(&self, loc: &Locator, key: &str) -> Option<String> {
    let node = self.parsed(loc)?.ok()?;
    node.find_value(key).map(JsonNode::display_text)
  }

  /// Single-line cell text: the named field, or the whole entry when `column` is `None`.
  pub fn cell_text(&self, loc: &Locator, column: Option<&str>, max_chars: usize) -> String {
    let raw = match column {
      Some(key) => self.field(loc, key).unwrap_or_default(),
      None => self.text(loc).map(|t| t.to_string()).unwrap_or_default(),
    };
    tree::cell_text(&raw, max_chars)
  }

  /// Absolute byte range of the entry in its file.
  pub fn absolute_range(&self, loc: &Locator) -> Option<(u64, u64)> {
    let chunk = self.chunk(loc)?;
    let base = chunk.file_offset();
    Some((base + loc.start as u64, base + loc.end as u64))
  }

  /// Drop a file: its locators, its cached values, and the store's reference to its mappings.
  /// Remaining ordinals are renumbered densely. Returns the number of locators removed.
  pub fn invalidate(&self, file_id: FileId) -> u64 {
    let removed = {
      let mut inner = self.inner.write();
      inner.files.remove(&file_id);
      let before = inner.locators.len();
      inner.locators.retain(|l| l.file_id != file_id);
      for (i, l) in inner.locators.iter_mut().enumerate() {
        l.ordinal = i as u64;
      }
      (before - inner.locators.len()) as u64
    };

    {
      let mut cache = self.text_cache.lock();
      let stale: Vec<EntryKey> = cache
        .iter()
        .filter(|(k, _)| k.file_id == file_id)
        .map(|(k, _)| *k)
        .collect();
      for k in stale {
        cache.pop(&k);
      }
    }
    {
      let mut cache = self.parsed_cache.lock();
      let stale: Vec<EntryKey> = cache
        .iter()
        .filter(|(k, _)| k.file_id == file_id)
        .map(|(k, _)| *k)
        .collect();
      for k in stale {
        cache.pop(&k);
      }
    }
    removed
  }

  /// Number of entries in the larger of the two caches.
  pub fn cache_len(&self) -> usize {
    self.text_cache.lock().len().max(self.parsed_cache.lock().len())
  }

  pub fn cache_capacity(&self) -> usize {
    self.capacity
  }
}
