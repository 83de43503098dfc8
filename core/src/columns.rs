use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::tree::JsonNode;

pub const DEFAULT_COLUMN_WIDTH: f64 = 100.0;

/// Top-level object keys seen so far, in first-seen order.
#[derive(Debug, Default, Clone)]
pub struct ColumnModel {
  names: Vec<String>,
  seen: HashSet<String>,
}

impl ColumnModel {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add the keys of `root` not seen before. Returns true when something was added.
  pub fn observe(&mut self, root: &JsonNode) -> bool {
    let mut added = false;
    for key in root.keys() {
      if !self.seen.contains(key) {
        self.seen.insert(key.to_string());
        self.names.push(key.to_string());
        added = true;
      }
    }
    added
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn clear(&mut self) {
    self.names.clear();
    self.seen.clear();
  }

  /// Forget everything and observe `roots` again.
  pub fn rebuild<'a>(&mut self, roots: impl IntoIterator<Item = &'a JsonNode>) {
    self.clear();
    for root in roots {
      self.observe(root);
    }
  }
}

/// Persisted column order and width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnLayout {
  pub name: String,
  pub width: f64,
}

/// Saved columns that still exist come first, in saved order and with their saved width; the
/// remaining current columns follow with the default width.
pub fn merge_layout(saved: &[ColumnLayout], current: &[String]) -> Vec<ColumnLayout> {
  let current_set: HashSet<&str> = current.iter().map(String::as_str).collect();
  let mut placed: HashSet<&str> = HashSet::new();
  let mut out = Vec::with_capacity(current.len());

  for col in saved {
    if current_set.contains(col.name.as_str()) && placed.insert(col.name.as_str()) {
      out.push(col.clone());
    }
  }
  for name in current {
    if placed.insert(name.as_str()) {
      out.push(ColumnLayout {
        name: name.clone(),
        width: DEFAULT_COLUMN_WIDTH,
      });
    }
  }
  out
}
