use std::{
  collections::HashMap,
  env, fs,
  path::{Path, PathBuf},
  sync::Arc,
};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

/// Key/value preferences backend. Values are opaque strings.
pub trait PreferencesStore: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<String>, String>;
  fn set(&self, key: &str, value: &str) -> Result<(), String>;
  fn remove(&self, key: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
  /// SQLite file. Defaults to `~/.jsonl-lens/preferences.sqlite`.
  pub sqlite_path: Option<PathBuf>,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS preferences(key TEXT PRIMARY KEY, value TEXT NOT NULL);";

fn sql_err(e: rusqlite::Error) -> String {
  e.to_string()
}

/// Preferences kept in one table of a SQLite file. The connection is opened once and shared.
#[derive(Clone)]
pub struct SqliteStore {
  path: PathBuf,
  conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
  pub fn new(opts: StorageOptions) -> Result<Self, String> {
    let path = match opts.sqlite_path {
      Some(p) => p,
      None => default_sqlite_path(),
    };
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
      fs::create_dir_all(dir).map_err(|e| format!("{}: {e}", dir.display()))?;
    }

    let conn = Connection::open(&path).map_err(sql_err)?;
    conn.execute_batch(SCHEMA).map_err(sql_err)?;
    Ok(Self {
      path,
      conn: Arc::new(Mutex::new(conn)),
    })
  }

  pub fn path(&self) -> &PathBuf {
    &self.path
  }
}

impl PreferencesStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<String>, String> {
    self
      .conn
      .lock()
      .query_row("SELECT value FROM preferences WHERE key = ?1", [key], |row| row.get(0))
      .optional()
      .map_err(sql_err)
  }

  fn set(&self, key: &str, value: &str) -> Result<(), String> {
    self
      .conn
      .lock()
      .execute(
        "INSERT INTO preferences(key, value) VALUES(?1, ?2) \
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key, value],
      )
      .map(drop)
      .map_err(sql_err)
  }

  fn remove(&self, key: &str) -> Result<(), String> {
    self
      .conn
      .lock()
      .execute("DELETE FROM preferences WHERE key = ?1", [key])
      .map(drop)
      .map_err(sql_err)
  }
}

/// In-process store for tests and for running without a preferences file.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl PreferencesStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>, String> {
    Ok(self.values.lock().get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<(), String> {
    self.values.lock().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<(), String> {
    self.values.lock().remove(key);
    Ok(())
  }
}

/// `$HOME` on Unix, `%USERPROFILE%` on Windows, the working directory as a last resort.
fn default_sqlite_path() -> PathBuf {
  let home = ["HOME", "USERPROFILE"]
    .into_iter()
    .find_map(env::var_os)
    .map(PathBuf::from)
    .unwrap_or_else(|| Path::new(".").to_path_buf());
  home.join(".jsonl-lens").join("preferences.sqlite")
}
