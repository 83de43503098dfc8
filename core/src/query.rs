use std::{cell::OnceCell, sync::Arc};

use crate::{
  cancel::{CancelCheck, GenerationToken},
  columns::ColumnModel,
  engine::CoreError,
  entries::EntryStore,
  filter::{Decision, EntrySource, FilterEngine},
  models::{FileId, Locator},
  search_match::PreparedSearch,
  tree::JsonNode,
};

/// Entry backed by the store; the tree is parsed only if a rule asks for it.
struct StoreEntry<'a> {
  store: &'a EntryStore,
  loc: &'a Locator,
  text: Arc<str>,
  tree: OnceCell<Option<Arc<JsonNode>>>,
}

impl<'a> StoreEntry<'a> {
  fn new(store: &'a EntryStore, loc: &'a Locator) -> Option<Self> {
    Some(Self {
      text: store.text(loc)?,
      store,
      loc,
      tree: OnceCell::new(),
    })
  }
}

impl EntrySource for StoreEntry<'_> {
  fn text(&self) -> &str {
    &self.text
  }

  fn tree(&self) -> Option<&JsonNode> {
    self
      .tree
      .get_or_init(|| self.store.parsed(self.loc).and_then(Result::ok))
      .as_deref()
  }
}

/// Result of one sweep, applied only if the sweep ran to completion.
struct Sweep {
  decisions: Vec<Decision>,
  file_of: Vec<FileId>,
  columns: Option<ColumnModel>,
}

fn sweep(
  store: &EntryStore,
  filter: &FilterEngine,
  locators: &[Locator],
  mut columns: Option<ColumnModel>,
  token: &GenerationToken,
  check_every: usize,
) -> Result<Sweep, CoreError> {
  let rules = filter.snapshot();
  let mut check = CancelCheck::new(token, check_every);
  let mut decisions = Vec::with_capacity(locators.len());
  let mut file_of = Vec::with_capacity(locators.len());

  for loc in locators {
    if !check.tick() {
      return Err(CoreError::Cancelled);
    }
    let decision = match StoreEntry::new(store, loc) {
      Some(entry) => {
        let d = rules.evaluate(&entry);
        if let (Some(cols), Some(tree)) = (columns.as_mut(), entry.tree()) {
          cols.observe(tree);
        }
        d
      }
      None => Decision::HIDDEN,
    };
    decisions.push(decision);
    file_of.push(loc.file_id);
  }
  Ok(Sweep {
    decisions,
    file_of,
    columns,
  })
}

/// Filtered view over the entry ordinals.
///
/// `decisions` holds the rule outcome per ordinal; whether a file is enabled is applied on top
/// when the visible list is derived, so toggling a file never re-runs the rules.
#[derive(Debug, Default)]
pub struct QueryController {
  decisions: Vec<Decision>,
  file_of: Vec<FileId>,
  visible: Vec<u64>,
  search: Option<PreparedSearch>,
}

impl QueryController {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn reset(&mut self) {
    self.decisions.clear();
    self.file_of.clear();
    self.visible.clear();
  }

  /// Re-evaluate every entry against the current rules. On cancellation nothing changes.
  pub fn recompute(
    &mut self,
    store: &EntryStore,
    filter: &FilterEngine,
    token: &GenerationToken,
    check_every: usize,
  ) -> Result<(), CoreError> {
    let all = store.locators_from(0);
    let done = sweep(store, filter, &all, None, token, check_every)?;
    self.decisions = done.decisions;
    self.file_of = done.file_of;
    self.rebuild_visible(filter);
    Ok(())
  }

  /// Evaluate newly attached entries only. `locators` must start at the next unseen ordinal.
  /// New top-level keys are added to `columns` when it is given. On cancellation nothing changes.
  pub fn extend(
    &mut self,
    store: &EntryStore,
    filter: &FilterEngine,
    locators: &[Locator],
    columns: Option<&mut ColumnModel>,
    token: &GenerationToken,
    check_every: usize,
  ) -> Result<(), CoreError> {
    if let Some(first) = locators.first() {
      if first.ordinal != self.decisions.len() as u64 {
        return Err(CoreError::InvalidArg(format!(
          "locators start at ordinal {} but {} are already evaluated",
          first.ordinal,
          self.decisions.len()
        )));
      }
    }
    let staged = columns.as_deref().cloned();
    let done = sweep(store, filter, locators, staged, token, check_every)?;

    for (ordinal, (decision, file_id)) in
      (self.decisions.len() as u64..).zip(done.decisions.iter().zip(&done.file_of))
    {
      if decision.visible && filter.is_file_enabled(*file_id) {
        self.visible.push(ordinal);
      }
    }
    self.decisions.extend(done.decisions);
    self.file_of.extend(done.file_of);
    if let (Some(target), Some(cols)) = (columns, done.columns) {
      *target = cols;
    }
    Ok(())
  }

  /// Forget a closed file's entries. Remaining ordinals shift down the same way the store
  /// renumbers them.
  pub fn remove_file(&mut self, file_id: FileId, filter: &FilterEngine) {
    let mut keep = self.file_of.iter().map(|f| *f != file_id);
    self.decisions.retain(|_| keep.next().unwrap_or(false));
    self.file_of.retain(|f| *f != file_id);
    self.rebuild_visible(filter);
  }

  /// Derive the visible list from stored decisions and the disabled-file set.
  pub fn rebuild_visible(&mut self, filter: &FilterEngine) {
    self.visible = self
      .decisions
      .iter()
      .zip(&self.file_of)
      .enumerate()
      .filter(|(_, (d, f))| d.visible && filter.is_file_enabled(**f))
      .map(|(i, _)| i as u64)
      .collect();
  }

  pub fn evaluated(&self) -> u64 {
    self.decisions.len() as u64
  }

  pub fn visible_count(&self) -> u64 {
    self.visible.len() as u64
  }

  /// Ordinal of the `index`-th visible entry.
  pub fn visible_at(&self, index: u64) -> Option<u64> {
    self.visible.get(usize::try_from(index).ok()?).copied()
  }

  /// Row index of `ordinal` in the visible list.
  pub fn position_of(&self, ordinal: u64) -> Option<u64> {
    self.visible.binary_search(&ordinal).ok().map(|i| i as u64)
  }

  /// Effective decision, including the disabled-file override.
  pub fn decision(&self, ordinal: u64, filter: &FilterEngine) -> Option<Decision> {
    let i = usize::try_from(ordinal).ok()?;
    let d = *self.decisions.get(i)?;
    if filter.is_file_enabled(self.file_of[i]) {
      Some(d)
    } else {
      Some(Decision::HIDDEN)
    }
  }

  pub fn set_search_term(&mut self, term: &str) {
    self.search = PreparedSearch::new(term);
  }

  pub fn search_term(&self) -> Option<&str> {
    self.search.as_ref().map(|s| s.term.as_str())
  }

  /// True when the current search term occurs in `text`.
  pub fn is_search_hit(&self, text: &str) -> bool {
    self.search.as_ref().is_some_and(|s| s.matches(text))
  }

  /// Next visible entry after `from` whose text contains `term` (case-insensitive), wrapping
  /// around once. The row holding `from` is tried last. An empty term finds nothing.
  pub fn find_next(&self, store: &EntryStore, from: Option<u64>, term: &str) -> Option<u64> {
    let search = PreparedSearch::new(term)?;
    let n = self.visible.len();
    if n == 0 {
      return None;
    }
    let start = from.and_then(|o| self.position_of(o)).map(|p| p as usize);

    (1..=n)
      .map(|i| match start {
        Some(s) => (s + i) % n,
        None => i - 1,
      })
      .map(|idx| self.visible[idx])
      .find(|&ordinal| {
        store
          .bounds(ordinal)
          .and_then(|loc| store.text(&loc))
          .is_some_and(|text| search.matches(&text))
      })
  }
}
