use jl_core::scanner::{next_value, Scan};

fn values(buf: &[u8]) -> Vec<&str> {
  let mut out = Vec::new();
  let mut pos = 0;
  while let Scan::Value { begin, end } = next_value(buf, pos) {
    out.push(std::str::from_utf8(&buf[begin..end]).unwrap());
    pos = end;
  }
  out
}

#[test]
fn splits_concatenated_values_without_newlines() {
  let buf = br#"{"a":1}{"b":[1,2]}  [3] "x" 42 true null"#;
  assert_eq!(
    values(buf),
    vec![r#"{"a":1}"#, r#"{"b":[1,2]}"#, "[3]", r#""x""#, "42", "true", "null"]
  );
}

#[test]
fn braces_inside_strings_do_not_count() {
  let buf = br#"{"msg":"a } b { c","q":"\"}"} {"n":2}"#;
  assert_eq!(values(buf), vec![r#"{"msg":"a } b { c","q":"\"}"}"#, r#"{"n":2}"#]);
}

#[test]
fn escaped_backslash_before_quote_ends_string() {
  let buf = br#"{"p":"C:\\"} 1"#;
  assert_eq!(values(buf), vec![r#"{"p":"C:\\"}"#, "1"]);
}

#[test]
fn nul_padding_and_bom_are_skipped() {
  let mut buf = vec![0xEF, 0xBB, 0xBF];
  buf.extend_from_slice(b"{\"a\":1}\0\0\0\n\r\n{\"b\":2}\0\0");
  assert_eq!(values(&buf), vec![r#"{"a":1}"#, r#"{"b":2}"#]);
  assert_eq!(next_value(&buf, buf.len() - 2), Scan::None);
}

#[test]
fn unbalanced_tail_is_incomplete() {
  let buf = br#"{"a":1} {"b":[1,2"#;
  match next_value(buf, 7) {
    Scan::Incomplete { begin } => assert_eq!(begin, 8),
    other => panic!("expected incomplete, got {other:?}"),
  }
  assert!(matches!(next_value(br#"  "open"#, 0), Scan::Incomplete { begin: 2 }));
}

#[test]
fn whitespace_only_is_none() {
  assert_eq!(next_value(b"", 0), Scan::None);
  assert_eq!(next_value(b" \n\t\r ", 0), Scan::None);
  assert_eq!(next_value(b"{}", 2), Scan::None);
}

#[test]
fn primitive_ends_at_delimiter() {
  assert_eq!(next_value(b"12,", 0), Scan::Value { begin: 0, end: 2 });
  assert_eq!(next_value(b"false}", 0), Scan::Value { begin: 0, end: 5 });
  // Runs to the end of the buffer.
  assert_eq!(next_value(b"  3.5e2", 0), Scan::Value { begin: 2, end: 7 });
}

#[test]
fn stray_closer_still_advances() {
  let buf = b"} {\"a\":1}";
  match next_value(buf, 0) {
    Scan::Value { begin, end } => {
      assert_eq!(begin, 0);
      assert!(end > begin);
    }
    other => panic!("expected progress, got {other:?}"),
  }
}
