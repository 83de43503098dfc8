use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{
  columns::ColumnLayout,
  engine::CoreError,
  filter::{rules_from_json, rules_to_json, FilterRule},
  storage::PreferencesStore,
};

/// Preference keys. Values are doubles or JSON, stored as strings.
pub mod keys {
  pub const WIN_X: &str = "winX";
  pub const WIN_Y: &str = "winY";
  pub const WIN_W: &str = "winW";
  pub const WIN_H: &str = "winH";
  pub const LAST_FILE: &str = "lastFile";
  pub const FILTER_RULES: &str = "filterRules";
  pub const TABLE_COLUMNS: &str = "tableColumns";
  pub const FILTER_COLUMNS: &str = "filterColumns";
  pub const MAIN_VIEW: &str = "mainView";
}

/// Window geometry. `x`/`y` are NaN until the window has been placed once.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBounds {
  pub x: f64,
  pub y: f64,
  pub width: f64,
  pub height: f64,
}

impl WindowBounds {
  pub fn has_position(&self) -> bool {
    !self.x.is_nan() && !self.y.is_nan()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnTable {
  Entries,
  Filters,
}

impl ColumnTable {
  fn key(self) -> &'static str {
    match self {
      ColumnTable::Entries => keys::TABLE_COLUMNS,
      ColumnTable::Filters => keys::FILTER_COLUMNS,
    }
  }
}

/// Typed access to the preferences namespace.
#[derive(Clone)]
pub struct Settings {
  store: Arc<dyn PreferencesStore>,
}

impl Settings {
  pub fn new(store: Arc<dyn PreferencesStore>) -> Self {
    Self { store }
  }

  pub fn store(&self) -> &Arc<dyn PreferencesStore> {
    &self.store
  }

  fn get(&self, key: &str) -> Option<String> {
    match self.store.get(key) {
      Ok(v) => v,
      Err(e) => {
        warn!(key, error = %e, "failed to read preference");
        None
      }
    }
  }

  fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
    self.store.set(key, value).map_err(CoreError::Storage)
  }

  fn get_f64(&self, key: &str) -> Option<f64> {
    let raw = self.get(key)?;
    match raw.trim().parse::<f64>() {
      Ok(v) => Some(v),
      Err(_) => {
        warn!(key, value = %raw, "preference is not a number");
        None
      }
    }
  }

  fn get_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
    let raw = self.get(key)?;
    match serde_json::from_str(&raw) {
      Ok(v) => Some(v),
      Err(e) => {
        warn!(key, error = %e, "preference is not valid JSON");
        None
      }
    }
  }

  fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), CoreError> {
    let json = serde_json::to_string(value).map_err(|e| CoreError::Storage(e.to_string()))?;
    self.set(key, &json)
  }

  pub fn window_bounds(&self, default_width: f64, default_height: f64) -> WindowBounds {
    WindowBounds {
      x: self.get_f64(keys::WIN_X).unwrap_or(f64::NAN),
      y: self.get_f64(keys::WIN_Y).unwrap_or(f64::NAN),
      width: self.get_f64(keys::WIN_W).unwrap_or(default_width),
      height: self.get_f64(keys::WIN_H).unwrap_or(default_height),
    }
  }

  pub fn save_window_bounds(&self, bounds: &WindowBounds) -> Result<(), CoreError> {
    self.set(keys::WIN_X, &bounds.x.to_string())?;
    self.set(keys::WIN_Y, &bounds.y.to_string())?;
    self.set(keys::WIN_W, &bounds.width.to_string())?;
    self.set(keys::WIN_H, &bounds.height.to_string())
  }

  /// Paths from the `;`-joined `lastFile` preference.
  pub fn last_files(&self) -> Vec<String> {
    self
      .get(keys::LAST_FILE)
      .map(|v| {
        v.split(';')
          .map(str::trim)
          .filter(|s| !s.is_empty())
          .map(str::to_string)
          .collect()
      })
      .unwrap_or_default()
  }

  pub fn save_last_files(&self, paths: &[String]) -> Result<(), CoreError> {
    self.set(keys::LAST_FILE, &paths.join(";"))
  }

  /// Saved rules plus load warnings. A missing preference is an empty rule list.
  pub fn filter_rules(&self) -> Result<(Vec<FilterRule>, Vec<String>), CoreError> {
    match self.get(keys::FILTER_RULES) {
      None => Ok((Vec::new(), Vec::new())),
      Some(json) if json.trim().is_empty() => Ok((Vec::new(), Vec::new())),
      Some(json) => rules_from_json(&json),
    }
  }

  pub fn save_filter_rules(&self, rules: &[FilterRule]) -> Result<(), CoreError> {
    self.set(keys::FILTER_RULES, &rules_to_json(rules))
  }

  pub fn column_layout(&self, table: ColumnTable) -> Vec<ColumnLayout> {
    self.get_json(table.key()).unwrap_or_default()
  }

  pub fn save_column_layout(&self, table: ColumnTable, layout: &[ColumnLayout]) -> Result<(), CoreError> {
    self.set_json(table.key(), layout)
  }

  /// Divider positions by name.
  pub fn main_view(&self) -> BTreeMap<String, f64> {
    self.get_json(keys::MAIN_VIEW).unwrap_or_default()
  }

  pub fn save_main_view(&self, dividers: &BTreeMap<String, f64>) -> Result<(), CoreError> {
    self.set_json(keys::MAIN_VIEW, dividers)
  }
}
