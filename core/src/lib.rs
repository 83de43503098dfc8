mod cancel;
mod chunk;
mod color;
mod columns;
mod cursor;
mod engine;
mod entries;
pub mod expr;
mod filter;
mod indexer;
mod models;
mod notify;
mod query;
pub mod scanner;
mod search_match;
mod settings;
mod storage;
mod tasks;
mod tree;

pub use crate::cancel::{Generation, GenerationToken};
pub use crate::chunk::FileChunk;
pub use crate::color::{ColorError, Rgba};
pub use crate::columns::{merge_layout, ColumnLayout, ColumnModel, DEFAULT_COLUMN_WIDTH};
pub use crate::engine::{CoreEngine, CoreOptions};
pub use crate::entries::EntryStore;
pub use crate::filter::{
  rules_from_json, rules_to_json, Action, Decision, EntrySource, FilterEngine, FilterEvent,
  FilterRule, MatchKind, ParsedEntry, RuleSet,
};
pub use crate::indexer::{index_file, IndexedFile, Indexer, IndexerOptions, MappedFile, OpenOutcome};
pub use crate::models::{
  FileId, FileInfo, JsonPathSegment, Locator, OutlineRow, Row, RowPage, SessionRestore, Task,
  TaskInfo, TaskKind,
};
pub use crate::notify::{Subscribers, Subscription};
pub use crate::query::QueryController;
pub use crate::search_match::highlight_ranges;
pub use crate::settings::{keys, ColumnTable, Settings, WindowBounds};
pub use crate::storage::{MemoryStore, PreferencesStore, SqliteStore, StorageOptions};
pub use crate::tasks::TaskHandle;
pub use crate::tree::{cell_text, parse as parse_entry, JsonNode, ParseError};

pub use crate::engine::CoreError;
