use std::fmt;

use serde::{
  de::{MapAccess, SeqAccess, Visitor},
  ser::{SerializeMap, SerializeSeq},
  Deserialize, Deserializer, Serialize, Serializer,
};
use thiserror::Error;

use crate::models::{JsonPathSegment, OutlineRow};

/// Parsed JSON entry.
///
/// Objects keep their members in source order as a list of pairs. Duplicate keys are kept; lookups
/// resolve to the last occurrence, matching what most JSON readers do.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonNode {
  Null,
  Bool(bool),
  Number(serde_json::Number),
  String(String),
  Array(Vec<JsonNode>),
  Object(Vec<(String, JsonNode)>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("json parse error at line {line}, column {column}: {message}")]
pub struct ParseError {
  pub message: String,
  pub line: usize,
  pub column: usize,
}

impl From<serde_json::Error> for ParseError {
  fn from(e: serde_json::Error) -> Self {
    Self {
      message: e.to_string(),
      line: e.line(),
      column: e.column(),
    }
  }
}

pub fn parse(text: &str) -> Result<JsonNode, ParseError> {
  serde_json::from_str(text).map_err(ParseError::from)
}

const TITLE_MAX_CHARS: usize = 200;
const MULTILINE_TITLE_MAX_CHARS: usize = 256;

impl JsonNode {
  pub fn is_container(&self) -> bool {
    matches!(self, JsonNode::Array(_) | JsonNode::Object(_))
  }

  pub fn get(&self, key: &str) -> Option<&JsonNode> {
    match self {
      JsonNode::Object(members) => members.iter().rev().find(|(k, _)| k == key).map(|(_, v)| v),
      _ => None,
    }
  }

  pub fn at(&self, index: usize) -> Option<&JsonNode> {
    match self {
      JsonNode::Array(items) => items.get(index),
      _ => None,
    }
  }

  /// Top-level member names in source order (empty for non-objects).
  pub fn keys(&self) -> impl Iterator<Item = &str> {
    let members: &[(String, JsonNode)] = match self {
      JsonNode::Object(members) => members,
      _ => &[],
    };
    members.iter().map(|(k, _)| k.as_str())
  }

  pub fn resolve(&self, path: &[JsonPathSegment]) -> Option<&JsonNode> {
    let mut node = self;
    for seg in path {
      node = match seg {
        JsonPathSegment::Key(k) => node.get(k)?,
        JsonPathSegment::Index(i) => node.at(usize::try_from(*i).ok()?)?,
      };
    }
    Some(node)
  }

  /// Depth-first search for the first member named `key`, at any nesting level.
  ///
  /// For each object member in order, a matching name wins before descending into its value.
  pub fn find_value(&self, key: &str) -> Option<&JsonNode> {
    match self {
      JsonNode::Object(members) => {
        for (k, v) in members {
          if k == key {
            return Some(v);
          }
          if let Some(found) = v.find_value(key) {
            return Some(found);
          }
        }
        None
      }
      JsonNode::Array(items) => items.iter().find_map(|v| v.find_value(key)),
      _ => None,
    }
  }

  /// Non-zero numbers, `true`, and non-empty strings, arrays, and objects are truthy.
  pub fn is_truthy(&self) -> bool {
    match self {
      JsonNode::Null => false,
      JsonNode::Bool(b) => *b,
      JsonNode::Number(n) => n.as_f64().map(|x| x != 0.0).unwrap_or(false),
      JsonNode::String(s) => !s.is_empty(),
      JsonNode::Array(items) => !items.is_empty(),
      JsonNode::Object(members) => !members.is_empty(),
    }
  }

  /// Natural display form: strings without quotes, scalars as written, containers as compact JSON.
  pub fn display_text(&self) -> String {
    match self {
      JsonNode::Null => "null".to_string(),
      JsonNode::Bool(b) => b.to_string(),
      JsonNode::Number(n) => n.to_string(),
      JsonNode::String(s) => s.clone(),
      JsonNode::Array(_) | JsonNode::Object(_) => self.to_compact_json(),
    }
  }

  pub fn to_compact_json(&self) -> String {
    serde_json::to_string(self).unwrap_or_default()
  }

  /// Flatten into tree-view rows.
  ///
  /// Members are labelled `key: title` and array items `[i]: title`. Containers get their children
  /// one level deeper; a scalar whose title had to be shortened gets a child row with the full text.
  pub fn outline(&self) -> Vec<OutlineRow> {
    let mut out = Vec::new();
    outline_into(self, 0, &mut out);
    out
  }
}

fn outline_into(node: &JsonNode, depth: usize, out: &mut Vec<OutlineRow>) {
  let push_child = |label: String, child: &JsonNode, out: &mut Vec<OutlineRow>| {
    let (title, truncated) = title(child);
    out.push(OutlineRow {
      depth,
      label: format!("{label}: {title}"),
      truncated,
    });
    if child.is_container() {
      outline_into(child, depth + 1, out);
    } else if truncated {
      out.push(OutlineRow {
        depth: depth + 1,
        label: child.display_text(),
        truncated: false,
      });
    }
  };

  match node {
    JsonNode::Object(members) => {
      for (k, v) in members {
        push_child(k.clone(), v, out);
      }
    }
    JsonNode::Array(items) => {
      for (i, v) in items.iter().enumerate() {
        push_child(format!("[{i}]"), v, out);
      }
    }
    _ => {}
  }
}

fn title(node: &JsonNode) -> (String, bool) {
  let text = node.display_text();
  if !node.is_container() {
    if let Some(nl) = text.find('\n') {
      if text.len() > nl + 1 {
        let head: String = text.chars().take(MULTILINE_TITLE_MAX_CHARS).collect();
        let more = text.chars().count() > MULTILINE_TITLE_MAX_CHARS;
        let mut t = head.replace('\n', "\\n");
        if more {
          t.push_str("...");
        }
        return (t, true);
      }
    }
  }
  if text.chars().count() > TITLE_MAX_CHARS {
    let mut t: String = text.chars().take(TITLE_MAX_CHARS).collect();
    t.push_str("...");
    return (t, true);
  }
  (text, false)
}

/// Shorten `s` for a single-line table cell: newlines become `\n`, and text longer than
/// `max_chars` is cut with a `...` suffix.
pub fn cell_text(s: &str, max_chars: usize) -> String {
  let mut out = String::new();
  for (count, ch) in s.chars().enumerate() {
    if count >= max_chars {
      out.push_str("...");
      break;
    }
    match ch {
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      c => out.push(c),
    }
  }
  out
}

impl fmt::Display for JsonNode {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.display_text())
  }
}

impl Serialize for JsonNode {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      JsonNode::Null => serializer.serialize_unit(),
      JsonNode::Bool(b) => serializer.serialize_bool(*b),
      JsonNode::Number(n) => n.serialize(serializer),
      JsonNode::String(s) => serializer.serialize_str(s),
      JsonNode::Array(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      JsonNode::Object(members) => {
        let mut map = serializer.serialize_map(Some(members.len()))?;
        for (k, v) in members {
          map.serialize_entry(k, v)?;
        }
        map.end()
      }
    }
  }
}

impl<'de> Deserialize<'de> for JsonNode {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    deserializer.deserialize_any(NodeVisitor)
  }
}

struct NodeVisitor;

impl<'de> Visitor<'de> for NodeVisitor {
  type Value = JsonNode;

  fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("any JSON value")
  }

  fn visit_bool<E>(self, v: bool) -> Result<JsonNode, E> {
    Ok(JsonNode::Bool(v))
  }

  fn visit_i64<E>(self, v: i64) -> Result<JsonNode, E> {
    Ok(JsonNode::Number(v.into()))
  }

  fn visit_u64<E>(self, v: u64) -> Result<JsonNode, E> {
    Ok(JsonNode::Number(v.into()))
  }

  fn visit_f64<E>(self, v: f64) -> Result<JsonNode, E> {
    Ok(serde_json::Number::from_f64(v).map_or(JsonNode::Null, JsonNode::Number))
  }

  fn visit_str<E>(self, v: &str) -> Result<JsonNode, E> {
    Ok(JsonNode::String(v.to_string()))
  }

  fn visit_string<E>(self, v: String) -> Result<JsonNode, E> {
    Ok(JsonNode::String(v))
  }

  fn visit_unit<E>(self) -> Result<JsonNode, E> {
    Ok(JsonNode::Null)
  }

  fn visit_none<E>(self) -> Result<JsonNode, E> {
    Ok(JsonNode::Null)
  }

  fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<JsonNode, D::Error> {
    Deserialize::deserialize(deserializer)
  }

  fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<JsonNode, A::Error> {
    let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
    while let Some(item) = seq.next_element()? {
      items.push(item);
    }
    Ok(JsonNode::Array(items))
  }

  fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<JsonNode, A::Error> {
    let mut members = Vec::with_capacity(map.size_hint().unwrap_or(0));
    while let Some((k, v)) = map.next_entry::<String, JsonNode>()? {
      members.push((k, v));
    }
    Ok(JsonNode::Object(members))
  }
}
