use std::{
  cell::OnceCell,
  collections::HashSet,
  fmt,
  str::FromStr,
  sync::Arc,
};

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::{
  color::Rgba,
  engine::CoreError,
  expr::Program,
  models::FileId,
  notify::{Subscribers, Subscription},
  tree::JsonNode,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
  Include,
  Exclude,
  Highlight,
}

impl Action {
  pub fn as_str(self) -> &'static str {
    match self {
      Action::Include => "INCLUDE",
      Action::Exclude => "EXCLUDE",
      Action::Highlight => "HIGHLIGHT",
    }
  }
}

impl FromStr for Action {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "INCLUDE" => Ok(Action::Include),
      "EXCLUDE" => Ok(Action::Exclude),
      "HIGHLIGHT" => Ok(Action::Highlight),
      _ => Err(format!("unknown rule action {s:?}")),
    }
  }
}

impl fmt::Display for Action {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchKind {
  #[serde(rename = "case_insensitive")]
  PlainCaseInsensitive,
  #[serde(rename = "case_sensitive")]
  PlainCaseSensitive,
  #[serde(rename = "regex")]
  Regex,
  #[serde(rename = "expr")]
  Expression,
}

impl MatchKind {
  pub fn as_str(self) -> &'static str {
    match self {
      MatchKind::PlainCaseInsensitive => "case_insensitive",
      MatchKind::PlainCaseSensitive => "case_sensitive",
      MatchKind::Regex => "regex",
      MatchKind::Expression => "expr",
    }
  }
}

impl FromStr for MatchKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim() {
      "case_insensitive" => Ok(MatchKind::PlainCaseInsensitive),
      "case_sensitive" => Ok(MatchKind::PlainCaseSensitive),
      "regex" => Ok(MatchKind::Regex),
      "expr" => Ok(MatchKind::Expression),
      _ => Err(format!("unknown match type {s:?}")),
    }
  }
}

impl fmt::Display for MatchKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
  pub enabled: bool,
  pub action: Action,
  #[serde(rename = "type")]
  pub kind: MatchKind,
  pub expression: String,
  /// Only used by `HIGHLIGHT` rules.
  pub color: Rgba,
}

impl Default for FilterRule {
  fn default() -> Self {
    Self {
      enabled: true,
      action: Action::Include,
      kind: MatchKind::PlainCaseInsensitive,
      expression: String::new(),
      color: Rgba::YELLOW,
    }
  }
}

impl FilterRule {
  pub fn new(action: Action, kind: MatchKind, expression: impl Into<String>) -> Self {
    Self {
      action,
      kind,
      expression: expression.into(),
      ..Self::default()
    }
  }

  pub fn with_color(mut self, color: Rgba) -> Self {
    self.color = color;
    self
  }

  pub fn disabled(mut self) -> Self {
    self.enabled = false;
    self
  }
}

/// Outcome of filtering one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
  pub visible: bool,
  pub highlight: Option<Rgba>,
}

impl Decision {
  pub const HIDDEN: Decision = Decision {
    visible: false,
    highlight: None,
  };
  pub const VISIBLE: Decision = Decision {
    visible: true,
    highlight: None,
  };
}

/// What a rule sees of an entry.
pub trait EntrySource {
  fn text(&self) -> &str;
  /// Parsed entry, or `None` when the text is not valid JSON.
  fn tree(&self) -> Option<&JsonNode>;
}

/// An entry whose text and (optional) tree are already at hand.
pub struct ParsedEntry<'a> {
  pub text: &'a str,
  pub tree: Option<&'a JsonNode>,
}

impl EntrySource for ParsedEntry<'_> {
  fn text(&self) -> &str {
    self.text
  }

  fn tree(&self) -> Option<&JsonNode> {
    self.tree
  }
}

#[derive(Debug)]
enum Matcher {
  Plain(String),
  /// Needle already lowercased.
  PlainFolded(String),
  Regex(Regex),
  Expr(Program),
  /// Did not compile; never matches.
  Invalid(String),
}

#[derive(Debug)]
struct CompiledRule {
  rule: FilterRule,
  matcher: Matcher,
}

impl CompiledRule {
  fn compile(rule: FilterRule) -> Self {
    let matcher = match rule.kind {
      MatchKind::PlainCaseSensitive => Matcher::Plain(rule.expression.clone()),
      MatchKind::PlainCaseInsensitive => Matcher::PlainFolded(rule.expression.to_lowercase()),
      MatchKind::Regex => match RegexBuilder::new(&rule.expression)
        .case_insensitive(true)
        .build()
      {
        Ok(re) => Matcher::Regex(re),
        Err(e) => Matcher::Invalid(e.to_string()),
      },
      MatchKind::Expression => match Program::compile(&rule.expression) {
        Ok(p) => Matcher::Expr(p),
        Err(e) => Matcher::Invalid(e.to_string()),
      },
    };
    Self { rule, matcher }
  }

  fn matches(&self, entry: &dyn EntrySource, folded: &OnceCell<String>) -> bool {
    match &self.matcher {
      Matcher::Plain(needle) => entry.text().contains(needle.as_str()),
      Matcher::PlainFolded(needle) => folded
        .get_or_init(|| entry.text().to_lowercase())
        .contains(needle.as_str()),
      Matcher::Regex(re) => re.is_match(entry.text()),
      Matcher::Expr(program) => match entry.tree() {
        Some(tree) => program.matches(tree),
        None => {
          trace!(expression = %program.source(), "entry is not valid JSON; expression rule skipped");
          false
        }
      },
      Matcher::Invalid(_) => false,
    }
  }
}

/// Immutable compiled rule list. Swapped as a whole so readers never see a partial update.
#[derive(Debug, Default)]
pub struct RuleSet {
  rules: Vec<Arc<CompiledRule>>,
  default_visible: bool,
  any_active: bool,
}

impl RuleSet {
  pub fn new(rules: Vec<FilterRule>) -> Self {
    Self::from_compiled(rules.into_iter().map(|r| Arc::new(CompiledRule::compile(r))).collect())
  }

  fn from_compiled(rules: Vec<Arc<CompiledRule>>) -> Self {
    let active = || rules.iter().filter(|r| r.rule.enabled);
    let has_include = active().any(|r| r.rule.action == Action::Include);
    let any_active = active().next().is_some();
    Self {
      // Any include rule means rows must be explicitly included.
      default_visible: !has_include,
      any_active,
      rules,
    }
  }

  pub fn rules(&self) -> Vec<FilterRule> {
    self.rules.iter().map(|r| r.rule.clone()).collect()
  }

  pub fn len(&self) -> usize {
    self.rules.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rules.is_empty()
  }

  pub fn default_visibility(&self) -> bool {
    self.default_visible
  }

  /// Last enabled matching rule wins; no match falls back to the default visibility.
  pub fn evaluate(&self, entry: &dyn EntrySource) -> Decision {
    if !self.any_active {
      return Decision::VISIBLE;
    }
    let folded = OnceCell::new();
    let last = self
      .rules
      .iter()
      .rev()
      .find(|r| r.rule.enabled && r.matches(entry, &folded));

    match last.map(|r| &r.rule) {
      None => Decision {
        visible: self.default_visible,
        highlight: None,
      },
      Some(FilterRule {
        action: Action::Highlight,
        color,
        ..
      }) => Decision {
        visible: true,
        highlight: Some(*color),
      },
      Some(FilterRule {
        action: Action::Include,
        ..
      }) => Decision::VISIBLE,
      Some(FilterRule {
        action: Action::Exclude,
        ..
      }) => Decision::HIDDEN,
    }
  }

  /// `(rule index, message)` for every rule whose pattern or expression does not compile.
  pub fn warnings(&self) -> Vec<(usize, String)> {
    self
      .rules
      .iter()
      .enumerate()
      .filter_map(|(i, r)| match &r.matcher {
        Matcher::Invalid(msg) => Some((i, msg.clone())),
        _ => None,
      })
      .collect()
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
  RulesChanged,
  FileToggled { file_id: FileId, enabled: bool },
}

/// Owner of the rule list and the disabled-file set.
pub struct FilterEngine {
  rules: RwLock<Arc<RuleSet>>,
  disabled_files: RwLock<HashSet<FileId>>,
  subscribers: Subscribers<FilterEvent>,
}

impl Default for FilterEngine {
  fn default() -> Self {
    Self::new()
  }
}

impl FilterEngine {
  pub fn new() -> Self {
    Self {
      rules: RwLock::new(Arc::new(RuleSet::default())),
      disabled_files: RwLock::new(HashSet::new()),
      subscribers: Subscribers::new(),
    }
  }

  pub fn snapshot(&self) -> Arc<RuleSet> {
    self.rules.read().clone()
  }

  pub fn rules(&self) -> Vec<FilterRule> {
    self.snapshot().rules()
  }

  pub fn set_rules(&self, rules: Vec<FilterRule>) -> Arc<RuleSet> {
    self.install(Arc::new(RuleSet::new(rules)))
  }

  pub fn push_rule(&self, rule: FilterRule) -> Arc<RuleSet> {
    let mut compiled = self.snapshot().rules.clone();
    compiled.push(Arc::new(CompiledRule::compile(rule)));
    self.install(Arc::new(RuleSet::from_compiled(compiled)))
  }

  /// Replace the rule at `index`. Only that rule is recompiled.
  pub fn update_rule(&self, index: usize, rule: FilterRule) -> Result<Arc<RuleSet>, CoreError> {
    let mut compiled = self.snapshot().rules.clone();
    let slot = compiled
      .get_mut(index)
      .ok_or_else(|| CoreError::InvalidArg(format!("no rule at index {index}")))?;
    *slot = Arc::new(CompiledRule::compile(rule));
    Ok(self.install(Arc::new(RuleSet::from_compiled(compiled))))
  }

  pub fn remove_rule(&self, index: usize) -> Result<(FilterRule, Arc<RuleSet>), CoreError> {
    let mut compiled = self.snapshot().rules.clone();
    if index >= compiled.len() {
      return Err(CoreError::InvalidArg(format!("no rule at index {index}")));
    }
    let removed = compiled.remove(index).rule.clone();
    Ok((removed, self.install(Arc::new(RuleSet::from_compiled(compiled)))))
  }

  fn install(&self, set: Arc<RuleSet>) -> Arc<RuleSet> {
    for (i, msg) in set.warnings() {
      warn!(rule = i, error = %msg, "filter rule does not compile and will never match");
    }
    *self.rules.write() = set.clone();
    self.subscribers.notify(&FilterEvent::RulesChanged);
    set
  }

  /// Put back a rule set captured with `snapshot` after a change was abandoned. Listeners are
  /// not notified.
  pub fn restore(&self, set: Arc<RuleSet>) {
    *self.rules.write() = set;
  }

  /// Returns true when the state actually changed.
  pub fn set_file_enabled(&self, file_id: FileId, enabled: bool) -> bool {
    let changed = {
      let mut disabled = self.disabled_files.write();
      if enabled {
        disabled.remove(&file_id)
      } else {
        disabled.insert(file_id)
      }
    };
    if changed {
      self
        .subscribers
        .notify(&FilterEvent::FileToggled { file_id, enabled });
    }
    changed
  }

  pub fn is_file_enabled(&self, file_id: FileId) -> bool {
    !self.disabled_files.read().contains(&file_id)
  }

  /// Drop any state held for a closed file.
  pub fn forget_file(&self, file_id: FileId) {
    self.disabled_files.write().remove(&file_id);
  }

  /// Disabled files are always hidden; otherwise the rules decide.
  pub fn evaluate(&self, file_id: FileId, entry: &dyn EntrySource) -> Decision {
    if !self.is_file_enabled(file_id) {
      return Decision::HIDDEN;
    }
    self.evaluate_rules(entry)
  }

  pub fn evaluate_rules(&self, entry: &dyn EntrySource) -> Decision {
    self.snapshot().evaluate(entry)
  }

  pub fn rule_warnings(&self) -> Vec<String> {
    self
      .snapshot()
      .warnings()
      .into_iter()
      .map(|(i, msg)| format!("rule {}: {msg}", i + 1))
      .collect()
  }

  pub fn subscribe(&self, listener: impl Fn(&FilterEvent) + Send + Sync + 'static) -> Subscription {
    self.subscribers.subscribe(listener)
  }
}

// ---------------- persisted rule JSON ----------------

#[derive(Debug, Default, Deserialize)]
struct RuleRecord {
  action: Option<String>,
  #[serde(rename = "type")]
  kind: Option<String>,
  expression: Option<String>,
  color: Option<String>,
  enabled: Option<EnabledField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EnabledField {
  Bool(bool),
  Text(String),
}

#[derive(Serialize)]
struct RuleOut<'a> {
  action: &'static str,
  #[serde(rename = "type")]
  kind: &'static str,
  expression: &'a str,
  color: String,
  enabled: &'static str,
}

/// Serialize rules in the `filterRules` preference format (string enumerants).
pub fn rules_to_json(rules: &[FilterRule]) -> String {
  let out: Vec<RuleOut<'_>> = rules
    .iter()
    .map(|r| RuleOut {
      action: r.action.as_str(),
      kind: r.kind.as_str(),
      expression: &r.expression,
      color: r.color.to_hex(),
      enabled: if r.enabled { "true" } else { "false" },
    })
    .collect();
  serde_json::to_string(&out).unwrap_or_else(|_| "[]".to_string())
}

/// Load rules from the `filterRules` preference. Rules that cannot be understood are skipped and
/// reported in the returned warnings; legacy match types are migrated.
pub fn rules_from_json(json: &str) -> Result<(Vec<FilterRule>, Vec<String>), CoreError> {
  let items: Vec<serde_json::Value> =
    serde_json::from_str(json).map_err(|e| CoreError::Rules(e.to_string()))?;

  let mut rules = Vec::with_capacity(items.len());
  let mut warnings = Vec::new();
  for (i, item) in items.into_iter().enumerate() {
    let record: RuleRecord = match serde_json::from_value(item) {
      Ok(r) => r,
      Err(e) => {
        warnings.push(format!("rule {}: {e}", i + 1));
        continue;
      }
    };
    match rule_from_record(record, &mut warnings, i + 1) {
      Some(rule) => rules.push(rule),
      None => continue,
    }
  }

  for w in &warnings {
    warn!(warning = %w, "filter rules loaded with warnings");
  }
  Ok((rules, warnings))
}

fn rule_from_record(record: RuleRecord, warnings: &mut Vec<String>, n: usize) -> Option<FilterRule> {
  let mut rule = FilterRule::default();

  if let Some(action) = record.action {
    match action.parse::<Action>() {
      Ok(a) => rule.action = a,
      Err(e) => {
        warnings.push(format!("rule {n}: {e}; rule skipped"));
        return None;
      }
    }
  }

  if let Some(kind) = record.kind {
    rule.kind = match kind.as_str() {
      "PLAIN" => {
        warnings.push(format!("rule {n}: legacy match type PLAIN migrated to case_sensitive"));
        MatchKind::PlainCaseSensitive
      }
      "REGEX" => {
        warnings.push(format!("rule {n}: legacy match type REGEX migrated to regex"));
        MatchKind::Regex
      }
      "JSONPATH" => {
        warnings.push(format!(
          "rule {n}: legacy match type JSONPATH migrated to expr; the expression now matches on truthiness"
        ));
        MatchKind::Expression
      }
      other => match other.parse::<MatchKind>() {
        Ok(k) => k,
        Err(e) => {
          warnings.push(format!("rule {n}: {e}; rule skipped"));
          return None;
        }
      },
    };
  }

  if let Some(expression) = record.expression {
    rule.expression = expression;
  }

  if let Some(color) = record.color {
    match Rgba::parse(&color) {
      Ok(c) => rule.color = c,
      Err(e) => warnings.push(format!("rule {n}: {e}; using {}", rule.color)),
    }
  }

  match record.enabled {
    None => {}
    Some(EnabledField::Bool(b)) => rule.enabled = b,
    Some(EnabledField::Text(s)) => match s.trim().to_ascii_lowercase().as_str() {
      "true" => rule.enabled = true,
      "false" => rule.enabled = false,
      _ => warnings.push(format!("rule {n}: enabled={s:?} is not a boolean; keeping it enabled")),
    },
  }

  Some(rule)
}
