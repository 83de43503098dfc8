use std::{
  collections::{BTreeMap, HashMap},
  fs::{self, File},
  path::{Path, PathBuf},
  sync::Arc,
};

use tracing::{debug, warn};

use crate::{
  cancel::{CancelCheck, GenerationToken},
  chunk::FileChunk,
  engine::CoreError,
  models::{FileId, Locator},
  scanner::{self, Scan},
};

#[derive(Debug, Clone)]
pub struct IndexerOptions {
  /// Upper bound for one mapped window.
  pub max_chunk_bytes: u64,
  /// Alignment used when a window is re-mapped in front of a straddling value.
  pub page_bytes: u64,
  pub cancel_check_every: usize,
}

impl IndexerOptions {
  fn page(&self) -> u64 {
    self.page_bytes.max(1)
  }

  fn window(&self) -> u64 {
    self.max_chunk_bytes.max(self.page() * 2)
  }
}

/// An open file: its mapped windows plus what indexing found.
#[derive(Debug)]
pub struct MappedFile {
  pub id: FileId,
  pub path: PathBuf,
  pub display_name: String,
  pub len: u64,
  pub entries: u64,
  pub chunks: Vec<Arc<FileChunk>>,
  pub truncated_tail: bool,
}

impl MappedFile {
  pub fn chunk(&self, chunk_id: u32) -> Option<&Arc<FileChunk>> {
    self.chunks.get(chunk_id as usize)
  }
}

#[derive(Debug)]
pub struct IndexedFile {
  pub file: Arc<MappedFile>,
  pub locators: Vec<Locator>,
}

#[derive(Debug)]
pub enum OpenOutcome {
  AlreadyOpen(FileId),
  Indexed(IndexedFile),
}

/// Owns the set of open files. Not thread-safe by itself; the engine serializes access.
pub struct Indexer {
  opts: IndexerOptions,
  next_id: FileId,
  files: BTreeMap<FileId, Arc<MappedFile>>,
  by_path: HashMap<PathBuf, FileId>,
}

impl Indexer {
  pub fn new(opts: IndexerOptions) -> Self {
    Self {
      opts,
      next_id: 0,
      files: BTreeMap::new(),
      by_path: HashMap::new(),
    }
  }

  pub fn lookup(&self, path: impl AsRef<Path>) -> Option<FileId> {
    let canonical = fs::canonicalize(path).ok()?;
    self.by_path.get(&canonical).copied()
  }

  /// Index `path` and register it. Ordinals start at `first_ordinal`.
  ///
  /// Re-opening a path that is already open is a no-op. A failed or cancelled open registers
  /// nothing and does not consume a file id.
  pub fn open(
    &mut self,
    path: impl AsRef<Path>,
    first_ordinal: u64,
    token: &GenerationToken,
    on_progress: &mut dyn FnMut(u64, u64),
  ) -> Result<OpenOutcome, CoreError> {
    let canonical = fs::canonicalize(path.as_ref())?;
    if let Some(id) = self.by_path.get(&canonical) {
      debug!(file_id = *id, path = %canonical.display(), "file already open");
      return Ok(OpenOutcome::AlreadyOpen(*id));
    }

    let id = self.next_id;
    let indexed = index_file(&canonical, id, first_ordinal, &self.opts, token, on_progress)?;
    self.next_id += 1;
    self.by_path.insert(canonical, id);
    self.files.insert(id, indexed.file.clone());
    Ok(OpenOutcome::Indexed(indexed))
  }

  pub fn close(&mut self, file_id: FileId) -> Option<Arc<MappedFile>> {
    let file = self.files.remove(&file_id)?;
    self.by_path.remove(&file.path);
    Some(file)
  }

  /// Undo the open that just registered `file_id`, giving its id back when it was the last one
  /// handed out.
  pub fn discard(&mut self, file_id: FileId) {
    if self.close(file_id).is_some() && file_id + 1 == self.next_id {
      self.next_id = file_id;
    }
  }

  pub fn file(&self, file_id: FileId) -> Option<Arc<MappedFile>> {
    self.files.get(&file_id).cloned()
  }

  /// Open files in id (= open) order.
  pub fn files(&self) -> Vec<Arc<MappedFile>> {
    self.files.values().cloned().collect()
  }
}

/// Sweep one file window by window and collect the bounds of every top-level JSON value.
///
/// When a value runs past the end of a window, the next window is mapped at the page-aligned
/// offset at or before the value's first byte, so the value lies entirely inside it. A value that
/// still does not fit stops the sweep; what was found before it is kept.
pub fn index_file(
  path: &Path,
  file_id: FileId,
  first_ordinal: u64,
  opts: &IndexerOptions,
  token: &GenerationToken,
  on_progress: &mut dyn FnMut(u64, u64),
) -> Result<IndexedFile, CoreError> {
  let file = File::open(path)?;
  let len = file.metadata()?.len();
  let page = opts.page();
  let window = opts.window();

  let mut chunks: Vec<Arc<FileChunk>> = Vec::new();
  let mut locators: Vec<Locator> = Vec::new();
  let mut truncated_tail = false;
  let mut check = CancelCheck::new(token, opts.cancel_check_every);

  let mut offset: u64 = 0;
  let mut cursor: usize = 0;
  on_progress(0, len);

  while offset < len {
    let map_len = window.min(len - offset);
    let is_last = offset + map_len >= len;
    let map_len = usize::try_from(map_len)
      .map_err(|_| CoreError::InvalidArg(format!("window of {map_len} bytes is not addressable")))?;
    let chunk = FileChunk::map(&file, file_id, offset, map_len)?;
    let chunk_id = chunks.len() as u32;
    let bytes = chunk.bytes();

    let before = locators.len();
    let mut resume_at: Option<u64> = None;
    loop {
      if !check.tick() {
        return Err(CoreError::Cancelled);
      }
      match scanner::next_value(bytes, cursor) {
        Scan::Value { begin, end } => {
          // A primitive cut by the window edge may continue in the file.
          if end == bytes.len() && !is_last && !scanner::is_delimited_start(bytes[begin]) {
            resume_at = Some(offset + begin as u64);
            break;
          }
          locators.push(Locator {
            file_id,
            chunk_id,
            start: begin,
            end,
            ordinal: first_ordinal + locators.len() as u64,
          });
          cursor = end;
        }
        Scan::Incomplete { begin } => {
          if is_last {
            warn!(
              file_id,
              path = %path.display(),
              offset = offset + begin as u64,
              "dropping incomplete trailing value"
            );
            truncated_tail = true;
          } else {
            resume_at = Some(offset + begin as u64);
          }
          break;
        }
        Scan::None => {
          if !is_last {
            resume_at = Some(offset + bytes.len() as u64);
          }
          break;
        }
      }
    }

    if locators.len() > before {
      chunks.push(Arc::new(chunk));
    }

    let Some(abs) = resume_at else {
      on_progress(len, len);
      break;
    };
    on_progress(abs, len);

    let next = abs - abs % page;
    if next <= offset {
      warn!(
        file_id,
        path = %path.display(),
        offset = abs,
        window,
        "value does not fit in one window; indexing stopped"
      );
      truncated_tail = true;
      break;
    }
    cursor = (abs - next) as usize;
    offset = next;
  }

  debug_assert!(locators
    .iter()
    .enumerate()
    .all(|(i, l)| l.ordinal == first_ordinal + i as u64 && l.end > l.start));

  let display_name = path
    .file_name()
    .and_then(|s| s.to_str())
    .map(str::to_string)
    .unwrap_or_else(|| path.to_string_lossy().to_string());

  debug!(
    file_id,
    path = %path.display(),
    entries = locators.len(),
    chunks = chunks.len(),
    truncated_tail,
    "indexed file"
  );

  let file = Arc::new(MappedFile {
    id: file_id,
    path: path.to_path_buf(),
    display_name,
    len,
    entries: locators.len() as u64,
    chunks,
    truncated_tail,
  });
  Ok(IndexedFile { file, locators })
}
