use serde::{Deserialize, Serialize};

use crate::color::Rgba;

/// Dense small integer assigned to a file when it is opened.
pub type FileId = u32;

/// Coordinate of one indexed JSON entry.
///
/// `start..end` is a byte range inside chunk `chunk_id` of file `file_id`. `ordinal` is the global
/// sequence number across all open files; it is dense and only changes when indexing resets
/// (a file is closed and the remaining entries are renumbered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
  pub file_id: FileId,
  pub chunk_id: u32,
  pub start: usize,
  pub end: usize,
  pub ordinal: u64,
}

impl Locator {
  pub fn byte_len(&self) -> usize {
    self.end - self.start
  }
}

/// One step of an expression path: `.key` or `[index]`. A path such as `$.req.headers[0]` is
/// a list of these, and serializes as `["req", "headers", 0]`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum JsonPathSegment {
  Key(String),
  Index(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
  pub file_id: FileId,
  pub path: String,
  pub display_name: String,
  pub len_bytes: u64,
  pub entries: u64,
  pub chunks: usize,
  pub enabled: bool,
  /// True when the tail of the file could not be indexed (truncated mid-entry or oversize value).
  pub truncated_tail: bool,
}

/// One row of the tabular projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
  pub ordinal: u64,
  /// 1-based row label shown in the `#` column.
  pub number: u64,
  pub highlight: Option<Rgba>,
  /// True when the current search term occurs in the entry text.
  pub search_hit: bool,
  /// Cell texts aligned with `RowPage.columns`.
  pub cells: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowPage {
  pub columns: Vec<String>,
  pub rows: Vec<Row>,
  pub next_cursor: Option<String>,
  pub reached_end: bool,
}

/// One line of the tree view for a selected entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineRow {
  pub depth: usize,
  pub label: String,
  pub truncated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionRestore {
  pub opened: Vec<FileInfo>,
  pub missing: Vec<String>,
  /// True when the paths came from the command line rather than the `lastFile` preference.
  pub from_args: bool,
  pub rule_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
  OpenFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
  pub id: String,
  pub kind: TaskKind,
  pub cancellable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  pub kind: TaskKind,
  pub started_at_ms: i64,
  pub progress_0_100: u8,
  pub cancellable: bool,
  pub finished: bool,
  pub cancelled: bool,
  pub error: Option<String>,
  pub opened: Vec<FileId>,
}
