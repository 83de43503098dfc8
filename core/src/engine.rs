use std::{
  path::Path,
  sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
  },
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
  cancel::{CancelCheck, Generation, GenerationToken},
  columns::{merge_layout, ColumnLayout, ColumnModel},
  cursor::{decode_cursor, encode_cursor, Cursor},
  entries::EntryStore,
  expr::{self, ExprError},
  filter::{Decision, FilterEngine, FilterEvent, FilterRule},
  indexer::{IndexedFile, Indexer, IndexerOptions, MappedFile, OpenOutcome},
  models::{FileId, FileInfo, Locator, OutlineRow, Row, RowPage, SessionRestore, Task, TaskInfo, TaskKind},
  notify::{Subscribers, Subscription},
  query::QueryController,
  settings::{ColumnTable, Settings},
  storage::{PreferencesStore, SqliteStore, StorageOptions},
  tasks::TaskRegistry,
  tree::{JsonNode, ParseError},
};

#[derive(Debug, Error)]
pub enum CoreError {
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("unknown file: {0}")]
  UnknownFile(FileId),
  #[error("unknown entry: {0}")]
  UnknownEntry(u64),
  #[error("bad cursor token: {0}")]
  BadCursor(String),
  #[error("operation cancelled")]
  Cancelled,
  #[error("invalid argument: {0}")]
  InvalidArg(String),
  #[error("storage error: {0}")]
  Storage(String),
  #[error("task error: {0}")]
  Task(String),
  #[error("expression error: {0}")]
  Expr(#[from] ExprError),
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error("filter rules error: {0}")]
  Rules(String),
}

#[derive(Debug, Clone)]
pub struct CoreOptions {
  /// Largest single mapping; just under 2 GiB by default.
  pub max_chunk_bytes: u64,
  pub page_bytes: u64,
  /// Entries kept in each of the text and parse caches.
  pub cache_capacity: usize,
  /// Sweeps poll their cancellation token every this many entries.
  pub cancel_check_every: usize,
  pub cell_max_chars: usize,
  pub page_size: usize,
  /// Parse every entry on open to collect top-level keys as columns.
  pub infer_columns: bool,
  pub max_concurrent_tasks: usize,
  pub storage: StorageOptions,
}

impl Default for CoreOptions {
  fn default() -> Self {
    let page_bytes: u64 = 64 * 1024;
    Self {
      max_chunk_bytes: (i32::MAX as u64) & !(page_bytes - 1),
      page_bytes,
      cache_capacity: 10_000,
      cancel_check_every: 1024,
      cell_max_chars: 256,
      page_size: 100,
      infer_columns: true,
      max_concurrent_tasks: 2,
      storage: StorageOptions::default(),
    }
  }
}

/// Handle to the whole log view: open files, rules, the filtered view and preferences.
///
/// Cloning is cheap and every clone refers to the same state. Mutations (open, close, rule and
/// file-toggle changes) are serialized on one writer lock; reads run concurrently.
#[derive(Clone)]
pub struct CoreEngine {
  options: CoreOptions,
  // Also serves as the writer lock.
  indexer: Arc<Mutex<Indexer>>,
  store: Arc<EntryStore>,
  columns: Arc<RwLock<ColumnModel>>,
  filter: Arc<FilterEngine>,
  query: Arc<RwLock<QueryController>>,
  search_subscribers: Arc<Subscribers<String>>,
  index_gen: Generation,
  filter_gen: Generation,
  view_version: Arc<AtomicU64>,
  tasks: TaskRegistry,
  settings: Settings,
}

impl CoreEngine {
  /// Engine with preferences in the SQLite file named by `options.storage`.
  pub fn new(options: CoreOptions) -> Result<Self, CoreError> {
    let store = SqliteStore::new(options.storage.clone()).map_err(CoreError::Storage)?;
    Ok(Self::with_store(options, Arc::new(store)))
  }

  pub fn with_store(options: CoreOptions, prefs: Arc<dyn PreferencesStore>) -> Self {
    let indexer = Indexer::new(IndexerOptions {
      max_chunk_bytes: options.max_chunk_bytes,
      page_bytes: options.page_bytes,
      cancel_check_every: options.cancel_check_every,
    });
    let tasks = TaskRegistry::new(options.max_concurrent_tasks);
    Self {
      store: Arc::new(EntryStore::new(options.cache_capacity)),
      indexer: Arc::new(Mutex::new(indexer)),
      columns: Arc::new(RwLock::new(ColumnModel::new())),
      filter: Arc::new(FilterEngine::new()),
      query: Arc::new(RwLock::new(QueryController::new())),
      search_subscribers: Arc::new(Subscribers::new()),
      index_gen: Generation::new(),
      filter_gen: Generation::new(),
      view_version: Arc::new(AtomicU64::new(0)),
      tasks,
      settings: Settings::new(prefs),
      options,
    }
  }

  pub fn options(&self) -> &CoreOptions {
    &self.options
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  pub fn entries(&self) -> &EntryStore {
    &self.store
  }

  pub fn filter(&self) -> &FilterEngine {
    &self.filter
  }

  // ---------------- files ----------------

  pub fn open(&self, path: impl AsRef<Path>) -> Result<FileInfo, CoreError> {
    self.open_with_progress(path, |_| {})
  }

  /// Index `path`, evaluate its entries against the current rules and append them to the view.
  ///
  /// The callback receives a coarse percentage (0..=100). Opening a file that is already open
  /// returns its existing info. A failed or cancelled open leaves no trace.
  pub fn open_with_progress(
    &self,
    path: impl AsRef<Path>,
    mut on_progress_pct: impl FnMut(u8),
  ) -> Result<FileInfo, CoreError> {
    let mut indexer = self.indexer.lock();
    let token = self.index_gen.token();
    let first_ordinal = self.store.len();

    on_progress_pct(0);
    let mut last_pct: u8 = 0;
    let outcome = indexer.open(path.as_ref(), first_ordinal, &token, &mut |done, total| {
      if total == 0 {
        return;
      }
      // Leave room for the evaluation pass.
      let pct = (done.saturating_mul(90) / total).min(90) as u8;
      if pct != last_pct {
        last_pct = pct;
        on_progress_pct(pct);
      }
    })?;

    let IndexedFile { file, locators } = match outcome {
      OpenOutcome::AlreadyOpen(id) => {
        on_progress_pct(100);
        let file = indexer.file(id).ok_or(CoreError::UnknownFile(id))?;
        return Ok(self.file_info(&file));
      }
      OpenOutcome::Indexed(indexed) => indexed,
    };

    let file_id = file.id;
    self.store.attach(file.clone(), &locators);
    let res = {
      let mut query = self.query.write();
      let mut columns = self.columns.write();
      query.extend(
        &self.store,
        &self.filter,
        &locators,
        self.options.infer_columns.then_some(&mut *columns),
        &token,
        self.options.cancel_check_every,
      )
    };
    if let Err(e) = res {
      self.store.invalidate(file_id);
      indexer.discard(file_id);
      debug!(file_id, error = %e, "open abandoned after indexing");
      return Err(e);
    }

    self.bump_view();
    on_progress_pct(100);
    debug!(file_id, path = %file.path.display(), entries = file.entries, "file opened");
    Ok(self.file_info(&file))
  }

  /// Open `paths` in order. Stops at the first failure; files opened before it stay open.
  pub fn open_many<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<FileInfo>, CoreError> {
    let mut out = Vec::with_capacity(paths.len());
    for p in paths {
      out.push(self.open(p)?);
    }
    Ok(out)
  }

  /// Close a file: drop its entries, renumber the rest, and release the mappings once no reader
  /// holds them.
  pub fn close(&self, file_id: FileId) -> Result<(), CoreError> {
    let mut indexer = self.indexer.lock();
    let file = indexer.close(file_id).ok_or(CoreError::UnknownFile(file_id))?;
    let removed = self.store.invalidate(file_id);
    self.filter.forget_file(file_id);
    self.query.write().remove_file(file_id, &self.filter);

    if self.options.infer_columns {
      let token = self.index_gen.token();
      if let Err(e) = self.rebuild_columns(&token) {
        debug!(error = %e, "column rebuild interrupted; keeping previous columns");
      }
    }
    self.bump_view();
    debug!(file_id, path = %file.path.display(), removed, "file closed");
    Ok(())
  }

  fn rebuild_columns(&self, token: &GenerationToken) -> Result<(), CoreError> {
    let mut check = CancelCheck::new(token, self.options.cancel_check_every);
    let mut fresh = ColumnModel::new();
    for loc in self.store.locators_from(0) {
      if !check.tick() {
        return Err(CoreError::Cancelled);
      }
      if let Some(Ok(tree)) = self.store.parsed(&loc) {
        fresh.observe(&tree);
      }
    }
    *self.columns.write() = fresh;
    Ok(())
  }

  pub fn files(&self) -> Vec<FileInfo> {
    self.store.files().iter().map(|f| self.file_info(f)).collect()
  }

  fn file_info(&self, file: &MappedFile) -> FileInfo {
    FileInfo {
      file_id: file.id,
      path: file.path.to_string_lossy().to_string(),
      display_name: file.display_name.clone(),
      len_bytes: file.len,
      entries: file.entries,
      chunks: file.chunks.len(),
      enabled: self.filter.is_file_enabled(file.id),
      truncated_tail: file.truncated_tail,
    }
  }

  pub fn set_file_enabled(&self, file_id: FileId, enabled: bool) -> Result<(), CoreError> {
    let _writer = self.indexer.lock();
    if self.store.file(file_id).is_none() {
      return Err(CoreError::UnknownFile(file_id));
    }
    if self.filter.set_file_enabled(file_id, enabled) {
      self.query.write().rebuild_visible(&self.filter);
      self.bump_view();
    }
    Ok(())
  }

  // ---------------- rules ----------------

  pub fn rules(&self) -> Vec<FilterRule> {
    self.filter.rules()
  }

  /// Per-rule compile problems (bad regex, bad expression) for display next to the rule.
  pub fn rule_warnings(&self) -> Vec<String> {
    self.filter.rule_warnings()
  }

  /// Replace the rule list and re-evaluate every entry.
  ///
  /// Returns `CoreError::Cancelled` when the sweep was cancelled or superseded by a later change.
  /// The previous rules are then put back, so the rule list always matches the view.
  pub fn set_rules(&self, rules: Vec<FilterRule>) -> Result<(), CoreError> {
    self.change_rules(|f| {
      f.set_rules(rules);
      Ok(())
    })
  }

  pub fn push_rule(&self, rule: FilterRule) -> Result<(), CoreError> {
    self.change_rules(|f| {
      f.push_rule(rule);
      Ok(())
    })
  }

  pub fn update_rule(&self, index: usize, rule: FilterRule) -> Result<(), CoreError> {
    self.change_rules(|f| f.update_rule(index, rule).map(|_| ()))
  }

  pub fn remove_rule(&self, index: usize) -> Result<FilterRule, CoreError> {
    let mut removed = None;
    self.change_rules(|f| {
      removed = Some(f.remove_rule(index)?.0);
      Ok(())
    })?;
    removed.ok_or_else(|| CoreError::InvalidArg(format!("no rule at index {index}")))
  }

  fn change_rules(
    &self,
    apply: impl FnOnce(&FilterEngine) -> Result<(), CoreError>,
  ) -> Result<(), CoreError> {
    // Supersede any sweep still running for the previous rules.
    self.filter_gen.bump();
    let _writer = self.indexer.lock();
    let token = self.filter_gen.token();
    let previous = self.filter.snapshot();
    apply(&self.filter)?;
    if let Err(e) = self.recompute_locked(&token) {
      self.filter.restore(previous);
      debug!(error = %e, "rule change abandoned; previous rules restored");
      return Err(e);
    }
    Ok(())
  }

  /// Re-evaluate every entry against the current rules.
  pub fn refresh(&self) -> Result<(), CoreError> {
    self.filter_gen.bump();
    let _writer = self.indexer.lock();
    let token = self.filter_gen.token();
    self.recompute_locked(&token)
  }

  fn recompute_locked(&self, token: &GenerationToken) -> Result<(), CoreError> {
    self
      .query
      .write()
      .recompute(&self.store, &self.filter, token, self.options.cancel_check_every)?;
    self.bump_view();
    Ok(())
  }

  pub fn subscribe_rules(
    &self,
    listener: impl Fn(&FilterEvent) + Send + Sync + 'static,
  ) -> Subscription {
    self.filter.subscribe(listener)
  }

  pub fn validate_expression(&self, source: &str) -> Result<(), CoreError> {
    expr::validate(source).map_err(CoreError::from)
  }

  /// Supersede any indexing or filtering sweep in progress.
  pub fn cancel(&self) {
    self.index_gen.bump();
    self.filter_gen.bump();
  }

  // ---------------- search ----------------

  pub fn set_search_term(&self, term: &str) {
    self.query.write().set_search_term(term);
    self.search_subscribers.notify(&term.to_string());
  }

  pub fn search_term(&self) -> Option<String> {
    self.query.read().search_term().map(str::to_string)
  }

  pub fn subscribe_search(&self, listener: impl Fn(&String) + Send + Sync + 'static) -> Subscription {
    self.search_subscribers.subscribe(listener)
  }

  /// Next visible entry after `from` containing `term`, wrapping around once.
  pub fn find_next(&self, from: Option<u64>, term: &str) -> Option<Locator> {
    let ordinal = self.query.read().find_next(&self.store, from, term)?;
    self.store.bounds(ordinal)
  }

  // ---------------- view ----------------

  pub fn visible_count(&self) -> u64 {
    self.query.read().visible_count()
  }

  pub fn visible_at(&self, index: u64) -> Option<Locator> {
    let ordinal = self.query.read().visible_at(index)?;
    self.store.bounds(ordinal)
  }

  pub fn decision(&self, ordinal: u64) -> Option<Decision> {
    self.query.read().decision(ordinal, &self.filter)
  }

  pub fn columns(&self) -> Vec<String> {
    self.columns.read().names().to_vec()
  }

  /// Saved table layout merged with the columns currently known.
  pub fn column_layout(&self) -> Vec<ColumnLayout> {
    merge_layout(&self.settings.column_layout(ColumnTable::Entries), &self.columns())
  }

  fn bump_view(&self) {
    self.view_version.fetch_add(1, Ordering::SeqCst);
  }

  /// One page of the tabular projection.
  ///
  /// Columns are `#`, the inferred keys, then `Value` (the whole entry). A cursor from before the
  /// view last changed is rejected.
  pub fn visible_page(&self, cursor: Option<&str>, page_size: usize) -> Result<RowPage, CoreError> {
    let version = self.view_version.load(Ordering::SeqCst);
    let start = match decode_cursor(cursor)? {
      None => 0,
      Some(c) if c.generation != version => {
        return Err(CoreError::BadCursor("the view changed; restart paging".into()))
      }
      Some(c) => c.index,
    };
    let page_size = if page_size == 0 {
      self.options.page_size
    } else {
      page_size
    };

    let keys = self.columns();
    let max = self.options.cell_max_chars;
    let query = self.query.read();
    let total = query.visible_count();
    let end = start.saturating_add(page_size as u64).min(total);

    let mut rows = Vec::with_capacity(end.saturating_sub(start) as usize);
    for index in start..end {
      let Some(loc) = query.visible_at(index).and_then(|o| self.store.bounds(o)) else {
        continue;
      };
      let decision = query.decision(loc.ordinal, &self.filter);
      let text: Arc<str> = self.store.text(&loc).unwrap_or_else(|| Arc::from(""));

      let mut cells = Vec::with_capacity(keys.len() + 2);
      cells.push((loc.ordinal + 1).to_string());
      for key in &keys {
        cells.push(self.store.cell_text(&loc, Some(key), max));
      }
      cells.push(crate::tree::cell_text(&text, max));

      rows.push(Row {
        ordinal: loc.ordinal,
        number: loc.ordinal + 1,
        highlight: decision.and_then(|d| d.highlight),
        search_hit: query.is_search_hit(&text),
        cells,
      });
    }

    let mut columns = Vec::with_capacity(keys.len() + 2);
    columns.push("#".to_string());
    columns.extend(keys);
    columns.push("Value".to_string());

    let reached_end = end >= total;
    Ok(RowPage {
      columns,
      rows,
      next_cursor: (!reached_end).then(|| {
        encode_cursor(Cursor {
          index: end,
          generation: version,
        })
      }),
      reached_end,
    })
  }

  // ---------------- entries ----------------

  fn locator(&self, ordinal: u64) -> Result<Locator, CoreError> {
    self.store.bounds(ordinal).ok_or(CoreError::UnknownEntry(ordinal))
  }

  pub fn text(&self, ordinal: u64) -> Result<Arc<str>, CoreError> {
    let loc = self.locator(ordinal)?;
    self.store.text(&loc).ok_or(CoreError::UnknownEntry(ordinal))
  }

  pub fn parsed(&self, ordinal: u64) -> Result<Arc<JsonNode>, CoreError> {
    let loc = self.locator(ordinal)?;
    let parsed = self.store.parsed(&loc).ok_or(CoreError::UnknownEntry(ordinal))?;
    Ok(parsed?)
  }

  pub fn field(&self, ordinal: u64, key: &str) -> Result<Option<String>, CoreError> {
    let loc = self.locator(ordinal)?;
    Ok(self.store.field(&loc, key))
  }

  /// Tree-view rows for one entry.
  pub fn outline(&self, ordinal: u64) -> Result<Vec<OutlineRow>, CoreError> {
    Ok(self.parsed(ordinal)?.outline())
  }

  // ---------------- session ----------------

  /// Startup sequence: load saved rules, then open the command-line paths. When there are none
  /// (or one is missing), replay `lastFile` instead without saving it again.
  pub fn restore_session(&self, args: &[String]) -> Result<SessionRestore, CoreError> {
    let mut out = SessionRestore::default();

    match self.settings.filter_rules() {
      Ok((rules, warnings)) => {
        out.rule_warnings = warnings;
        if !rules.is_empty() {
          self.set_rules(rules)?;
        }
      }
      Err(e) => {
        warn!(error = %e, "saved filter rules are unreadable; starting without rules");
        out.rule_warnings.push(e.to_string());
      }
    }

    if self.open_all_or_stop(args, &mut out) {
      out.from_args = true;
      self.save_last_files()?;
      return Ok(out);
    }

    let last = self.settings.last_files();
    self.open_all_or_stop(&last, &mut out);
    Ok(out)
  }

  /// Open each path in order; stop at the first one that is missing or unreadable.
  fn open_all_or_stop(&self, paths: &[String], out: &mut SessionRestore) -> bool {
    if paths.is_empty() {
      return false;
    }
    for p in paths {
      if !Path::new(p).exists() {
        warn!(path = %p, "file not found");
        out.missing.push(p.clone());
        return false;
      }
      match self.open(p) {
        Ok(info) => out.opened.push(info),
        Err(e) => {
          warn!(path = %p, error = %e, "failed to open file");
          out.missing.push(p.clone());
          return false;
        }
      }
    }
    true
  }

  fn save_last_files(&self) -> Result<(), CoreError> {
    let paths: Vec<String> = self.files().into_iter().map(|f| f.path).collect();
    self.settings.save_last_files(&paths)
  }

  /// Persist rules, the open file list and the column layout.
  pub fn save_session(&self) -> Result<(), CoreError> {
    self.settings.save_filter_rules(&self.rules())?;
    self.save_last_files()?;
    self
      .settings
      .save_column_layout(ColumnTable::Entries, &self.column_layout())
  }

  // ---------------- background tasks ----------------

  /// Open `paths` on a background thread. Progress covers all files.
  pub fn start_open_task(&self, paths: Vec<String>) -> Result<TaskInfo, CoreError> {
    if paths.is_empty() {
      return Err(CoreError::InvalidArg("no paths to open".into()));
    }
    let engine = self.clone();
    self.tasks.spawn(TaskKind::OpenFiles, move |handle| {
      let n = paths.len();
      for (i, p) in paths.iter().enumerate() {
        if handle.is_cancelled() {
          return Err(CoreError::Cancelled);
        }
        let info = engine.open_with_progress(p, |pct| {
          handle.set_progress(((i * 100 + pct as usize) / n) as u8);
        })?;
        handle.record_opened(info.file_id);
      }
      Ok(())
    })
  }

  /// Poll a background task status.
  pub fn get_task(&self, task_id: &str) -> Result<Task, CoreError> {
    self.tasks.get(task_id)
  }

  /// Flag the task and stop the indexing sweep it may be running.
  pub fn cancel_task(&self, task_id: &str) -> Result<(), CoreError> {
    self.tasks.cancel(task_id)?;
    self.index_gen.bump();
    Ok(())
  }
}
