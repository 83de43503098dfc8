use jl_core::{
  expr::{evaluate_bool, validate, ExprError, Program, Value},
  parse_entry, JsonNode,
};

fn entry(json: &str) -> JsonNode {
  parse_entry(json).unwrap()
}

fn eval(source: &str, json: &str) -> String {
  let root = entry(json);
  let program = Program::compile(source).unwrap();
  let value = program.eval(&root).unwrap();
  value.to_string()
}

#[test]
fn status_code_and_flag() {
  let failing = entry(r#"{"code":500,"ok":false}"#);
  let fine = entry(r#"{"code":500,"ok":true}"#);
  assert!(evaluate_bool("$.code >= 500 && !$.ok", &failing));
  assert!(!evaluate_bool("$.code >= 500 && !$.ok", &fine));
}

#[test]
fn precedence_and_grouping() {
  assert_eq!(eval("1 + 2 * 3", "{}"), "7");
  assert_eq!(eval("(1 + 2) * 3", "{}"), "9");
  assert_eq!(eval("10 - 4 - 3", "{}"), "3");
  assert_eq!(eval("7 % 4", "{}"), "3");
  assert_eq!(eval("1 / 4", "{}"), "0.25");
  assert_eq!(eval("true || false && false", "{}"), "true");
  assert_eq!(eval("(true || false) && false", "{}"), "false");
  assert_eq!(eval("!!1", "{}"), "true");
}

#[test]
fn paths_resolve_into_nested_values() {
  let json = r#"{"user":{"name":"ann","roles":["admin","dev"]},"n":[1,2,3]}"#;
  assert_eq!(eval("$.user.name", json), "ann");
  assert_eq!(eval("$.user.roles[1]", json), "dev");
  assert_eq!(eval("$.n[0] + $.n[2]", json), "4");
  assert_eq!(eval("$.user.roles", json), r#"["admin","dev"]"#);
  assert!(evaluate_bool(r#"$.user.roles[0] == "admin""#, &entry(json)));
  assert!(evaluate_bool("$", &entry(json)));
}

#[test]
fn missing_paths_are_null() {
  let root = entry(r#"{"a":1}"#);
  assert!(evaluate_bool("$.missing == null", &root));
  assert!(!evaluate_bool("$.missing", &root));
  assert!(evaluate_bool("!$.missing.deeper[3]", &root));
  assert_eq!(
    Program::compile("$.missing").unwrap().eval(&root).unwrap(),
    Value::Null
  );
}

#[test]
fn mixed_operands_compare_as_strings() {
  let json = r#"{"level":"WARN","v":"10","t":true}"#;
  assert_eq!(eval(r#"$.level == "WARN""#, json), "true");
  assert_eq!(eval(r#"$.v == 10"#, json), "true");
  // String ordering, not numeric.
  assert_eq!(eval(r#"$.v < "9""#, json), "true");
  // Booleans take part in arithmetic.
  assert_eq!(eval("$.t + 1", json), "2");
  assert_eq!(eval(r#"$.level != "INFO""#, json), "true");
}

#[test]
fn truthiness_of_containers_and_strings() {
  let json = r#"{"empty":[],"full":[0],"obj":{},"s":"","z":0}"#;
  let root = entry(json);
  assert!(!evaluate_bool("$.empty", &root));
  assert!(evaluate_bool("$.full", &root));
  assert!(!evaluate_bool("$.obj", &root));
  assert!(!evaluate_bool("$.s", &root));
  assert!(!evaluate_bool("$.z", &root));
  assert!(evaluate_bool("$.empty || $.full", &root));
}

#[test]
fn type_errors_evaluate_to_false() {
  let root = entry(r#"{"s":"abc"}"#);
  let program = Program::compile(r#"$.s * 2"#).unwrap();
  assert!(matches!(program.eval(&root), Err(ExprError::Type { op: "*", .. })));
  assert!(!program.matches(&root));
  assert!(!evaluate_bool(r#"$.s - "a""#, &root));
}

#[test]
fn validation_catches_malformed_input() {
  assert!(validate("$.code >= 500 && !$.ok").is_ok());
  assert_eq!(validate(""), Err(ExprError::Empty));
  assert_eq!(validate("($.a"), Err(ExprError::UnbalancedParens));
  assert!(matches!(validate("$.a >"), Err(ExprError::Syntax { .. })));
  assert!(matches!(validate("$.a $.b"), Err(ExprError::Syntax { .. })));
  assert!(matches!(validate("$.a ~ 1"), Err(ExprError::Syntax { position: 4, .. })));
  assert!(matches!(validate("$.a[x]"), Err(ExprError::Syntax { .. })));

  // Compile errors never escape evaluate_bool.
  assert!(!evaluate_bool("((", &entry("{}")));
}

#[test]
fn source_is_kept() {
  let p = Program::compile(" $.a == 1 ").unwrap();
  assert_eq!(p.source(), " $.a == 1 ");
}
