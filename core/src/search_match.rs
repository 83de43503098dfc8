use std::ops::Range;

use regex::{Regex, RegexBuilder};

/// A normalized search term, ready to test many entries.
#[derive(Debug, Clone)]
pub(crate) struct PreparedSearch {
  pub(crate) term: String,
  folded: String,
  pattern: Option<Regex>,
}

impl PreparedSearch {
  /// `None` for an empty (or all-whitespace) term.
  pub(crate) fn new(term: &str) -> Option<Self> {
    if term.trim().is_empty() {
      return None;
    }
    let pattern = RegexBuilder::new(&regex::escape(term))
      .case_insensitive(true)
      .build()
      .ok();
    Some(Self {
      term: term.to_string(),
      folded: term.to_lowercase(),
      pattern,
    })
  }

  /// Case-insensitive substring test.
  pub(crate) fn matches(&self, hay: &str) -> bool {
    hay.to_lowercase().contains(&self.folded)
  }

  /// Byte ranges of every occurrence in `hay`, in order and non-overlapping.
  pub(crate) fn ranges(&self, hay: &str) -> Vec<Range<usize>> {
    match &self.pattern {
      Some(re) => re.find_iter(hay).map(|m| m.range()).collect(),
      None => Vec::new(),
    }
  }
}

/// Case-insensitive byte ranges of `term` in `text`, for highlighting a cell or tree label.
pub fn highlight_ranges(text: &str, term: &str) -> Vec<Range<usize>> {
  PreparedSearch::new(term)
    .map(|p| p.ranges(text))
    .unwrap_or_default()
}
