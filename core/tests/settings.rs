use std::{collections::BTreeMap, sync::Arc};

use jl_core::{
  highlight_ranges, keys, merge_layout, Action, ColumnLayout, ColumnTable, FilterRule, MatchKind,
  MemoryStore, PreferencesStore, Rgba, Settings, SqliteStore, StorageOptions, WindowBounds,
  DEFAULT_COLUMN_WIDTH,
};

fn memory() -> (Arc<dyn PreferencesStore>, Settings) {
  let store: Arc<dyn PreferencesStore> = Arc::new(MemoryStore::new());
  (store.clone(), Settings::new(store))
}

#[test]
fn sqlite_store_roundtrip() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("nested").join("prefs.sqlite");
  let store = SqliteStore::new(StorageOptions {
    sqlite_path: Some(path.clone()),
  })
  .unwrap();
  assert_eq!(store.path(), &path);

  assert_eq!(store.get("k").unwrap(), None);
  store.set("k", "v1").unwrap();
  store.set("k", "v2").unwrap();
  assert_eq!(store.get("k").unwrap().as_deref(), Some("v2"));

  // A second handle on the same file sees the value.
  let again = SqliteStore::new(StorageOptions {
    sqlite_path: Some(path),
  })
  .unwrap();
  assert_eq!(again.get("k").unwrap().as_deref(), Some("v2"));

  again.remove("k").unwrap();
  assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn window_bounds_default_to_unset_position() {
  let (store, settings) = memory();
  let b = settings.window_bounds(800.0, 600.0);
  assert!(b.x.is_nan() && b.y.is_nan());
  assert!(!b.has_position());
  assert_eq!((b.width, b.height), (800.0, 600.0));

  settings
    .save_window_bounds(&WindowBounds {
      x: 10.0,
      y: 20.5,
      width: 1024.0,
      height: 768.0,
    })
    .unwrap();
  let b = settings.window_bounds(800.0, 600.0);
  assert!(b.has_position());
  assert_eq!((b.x, b.y, b.width, b.height), (10.0, 20.5, 1024.0, 768.0));

  // A value that is not a number falls back to the default.
  store.set(keys::WIN_W, "wide").unwrap();
  assert_eq!(settings.window_bounds(800.0, 600.0).width, 800.0);
}

#[test]
fn last_files_are_semicolon_joined() {
  let (store, settings) = memory();
  assert!(settings.last_files().is_empty());

  settings
    .save_last_files(&["/logs/a.jsonl".to_string(), "/logs/b.jsonl".to_string()])
    .unwrap();
  assert_eq!(
    store.get(keys::LAST_FILE).unwrap().as_deref(),
    Some("/logs/a.jsonl;/logs/b.jsonl")
  );

  store.set(keys::LAST_FILE, " /x.jsonl ;; /y.jsonl;").unwrap();
  assert_eq!(settings.last_files(), vec!["/x.jsonl", "/y.jsonl"]);
}

#[test]
fn filter_rules_roundtrip_and_bad_json() {
  let (store, settings) = memory();
  assert!(settings.filter_rules().unwrap().0.is_empty());

  let rules = vec![
    FilterRule::new(Action::Highlight, MatchKind::PlainCaseInsensitive, "warn").with_color(Rgba::RED),
    FilterRule::new(Action::Include, MatchKind::Expression, "$.code >= 500"),
  ];
  settings.save_filter_rules(&rules).unwrap();
  let (loaded, warnings) = settings.filter_rules().unwrap();
  assert_eq!(loaded, rules);
  assert!(warnings.is_empty());

  store.set(keys::FILTER_RULES, "[{").unwrap();
  assert!(settings.filter_rules().is_err());
}

#[test]
fn column_layouts_are_per_table() {
  let (_, settings) = memory();
  assert!(settings.column_layout(ColumnTable::Entries).is_empty());

  let layout = vec![
    ColumnLayout {
      name: "level".into(),
      width: 80.0,
    },
    ColumnLayout {
      name: "msg".into(),
      width: 300.0,
    },
  ];
  settings.save_column_layout(ColumnTable::Entries, &layout).unwrap();
  assert_eq!(settings.column_layout(ColumnTable::Entries), layout);
  assert!(settings.column_layout(ColumnTable::Filters).is_empty());
}

#[test]
fn merge_keeps_saved_order_and_widths() {
  let saved = vec![
    ColumnLayout {
      name: "msg".into(),
      width: 300.0,
    },
    ColumnLayout {
      name: "gone".into(),
      width: 50.0,
    },
    ColumnLayout {
      name: "level".into(),
      width: 80.0,
    },
  ];
  let current = vec!["level".to_string(), "ts".to_string(), "msg".to_string()];
  let merged = merge_layout(&saved, &current);
  assert_eq!(
    merged,
    vec![
      ColumnLayout {
        name: "msg".into(),
        width: 300.0
      },
      ColumnLayout {
        name: "level".into(),
        width: 80.0
      },
      ColumnLayout {
        name: "ts".into(),
        width: DEFAULT_COLUMN_WIDTH
      },
    ]
  );
}

#[test]
fn main_view_dividers() {
  let (store, settings) = memory();
  assert!(settings.main_view().is_empty());

  let mut dividers = BTreeMap::new();
  dividers.insert("horizontal".to_string(), 0.25);
  dividers.insert("vertical".to_string(), 0.6);
  settings.save_main_view(&dividers).unwrap();
  assert_eq!(settings.main_view(), dividers);

  store.set(keys::MAIN_VIEW, "not json").unwrap();
  assert!(settings.main_view().is_empty());
}

#[test]
fn highlight_ranges_are_case_insensitive() {
  let text = "Error: error in ERROR handler";
  let ranges = highlight_ranges(text, "error");
  assert_eq!(ranges, vec![0..5, 7..12, 16..21]);
  assert!(highlight_ranges(text, "").is_empty());
  assert_eq!(highlight_ranges("a.b a+b", "a.b"), vec![0..3]);
}

#[test]
fn colors_parse_and_format() {
  assert_eq!(Rgba::parse("#FF0000").unwrap(), Rgba::RED);
  assert_eq!(Rgba::parse("#f00").unwrap(), Rgba::RED);
  assert_eq!(Rgba::parse("rgb(255, 0, 0)").unwrap(), Rgba::RED);
  assert_eq!(Rgba::parse("0xffff00").unwrap(), Rgba::YELLOW);
  assert_eq!(Rgba::parse("rgba(0,0,0,0.5)").unwrap().to_hex(), "#00000080");
  assert!(Rgba::parse("#12").is_err());
  assert!(Rgba::parse("rgba(0,0,0,2)").is_err());

  assert_eq!(Rgba::YELLOW.contrast_text(), Rgba::BLACK);
  assert_eq!(Rgba::parse("#000080").unwrap().contrast_text(), Rgba::WHITE);
  assert_eq!(Rgba::RED.to_css_rgba(), "rgba(255,0,0,1.00)");

  let json = serde_json::to_string(&Rgba::RED).unwrap();
  assert_eq!(json, "\"#ff0000\"");
  assert_eq!(serde_json::from_str::<Rgba>(&json).unwrap(), Rgba::RED);
}
