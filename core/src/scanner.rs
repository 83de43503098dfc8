/// Result of looking for the next top-level JSON value in a byte window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
  /// `buf[begin..end]` holds exactly one value.
  Value { begin: usize, end: usize },
  /// A value starts at `begin` but the buffer ends before it is balanced.
  Incomplete { begin: usize },
  /// Only whitespace (or nothing) is left.
  None,
}

/// Find the bounds of the next JSON value at or after `start`.
///
/// Only enough structure is tracked to find the boundary: nesting depth outside strings and the
/// escape flag inside strings. Content is not validated, so malformed input may yield spurious
/// bounds that later fail to parse. A primitive that runs into the end of `buf` is reported as a
/// complete value; callers scanning a window that is not the last one must treat that case as
/// incomplete.
pub fn next_value(buf: &[u8], start: usize) -> Scan {
  let pos = skip_ignorable(buf, start);
  if pos >= buf.len() {
    return Scan::None;
  }

  let end = match buf[pos] {
    b'{' | b'[' => find_balanced(buf, pos),
    b'"' => find_string_end(buf, pos),
    _ => Some(find_primitive_end(buf, pos)),
  };

  match end {
    Some(end) => Scan::Value { begin: pos, end },
    None => Scan::Incomplete { begin: pos },
  }
}

/// True when a value starting with `b` closes itself (object, array, string).
pub(crate) fn is_delimited_start(b: u8) -> bool {
  matches!(b, b'{' | b'[' | b'"')
}

fn is_ignorable_byte(b: u8) -> bool {
  b == 0 || b.is_ascii_whitespace() || b == 0x0B
}

fn skip_ignorable(buf: &[u8], mut pos: usize) -> usize {
  loop {
    // UTF-8 BOM (EF BB BF) in front of a value.
    if buf.len() >= pos + 3 && buf[pos] == 0xEF && buf[pos + 1] == 0xBB && buf[pos + 2] == 0xBF {
      pos += 3;
      continue;
    }
    match buf.get(pos) {
      Some(&b) if is_ignorable_byte(b) => pos += 1,
      _ => return pos,
    }
  }
}

fn find_balanced(buf: &[u8], pos: usize) -> Option<usize> {
  let mut depth: i64 = 0;
  let mut in_string = false;
  let mut escape = false;

  for (i, &b) in buf.iter().enumerate().skip(pos) {
    if in_string {
      if escape {
        escape = false;
      } else if b == b'\\' {
        escape = true;
      } else if b == b'"' {
        in_string = false;
      }
      continue;
    }

    match b {
      b'"' => in_string = true,
      b'{' | b'[' => depth += 1,
      b'}' | b']' => {
        depth -= 1;
        if depth == 0 {
          return Some(i + 1);
        }
      }
      _ => {}
    }
  }
  None
}

fn find_string_end(buf: &[u8], pos: usize) -> Option<usize> {
  let mut escape = false;
  for (i, &b) in buf.iter().enumerate().skip(pos + 1) {
    if escape {
      escape = false;
    } else if b == b'\\' {
      escape = true;
    } else if b == b'"' {
      return Some(i + 1);
    }
  }
  None
}

fn find_primitive_end(buf: &[u8], pos: usize) -> usize {
  // The first byte always belongs to the value so a stray delimiter still makes progress.
  for (i, &b) in buf.iter().enumerate().skip(pos + 1) {
    if matches!(b, b',' | b']' | b'}') || is_ignorable_byte(b) {
      return i;
    }
  }
  buf.len()
}
