
use indexmap::indexmap;
use pretty_assertions::assert_eq;

use crate::{parse, to_literal, to_literal_pretty, Map, Value};

fn map(entries: Map) -> Value {
    Value::Map(entries)
}

#[test]
fn trailing_comma_and_comment() {
    let parsed = parse("{\"a\": [1, 2,], \"b\": \"x\" # comment\n}").unwrap();
    assert_eq!(
        parsed,
        map(indexmap! {
            "a".to_string() => Value::List(vec![Value::Int(1), Value::Int(2)]),
            "b".to_string() => "x".into(),
        })
    );
}

#[test]
fn nested_document() {
    let parsed = parse(
        r#"
# Leading comment
{
  'variables': {'use_x%': 0},
  'targets': [
    {
      'target_name': 'base',
      'type': 'static_library',
      'sources': ['a.c', "b.c"],
      'ratio': -1.5,
    },
  ],
}
"#,
    )
    .unwrap();

    let targets = parsed.as_map().unwrap()["targets"].as_list().unwrap();
    let base = targets[0].as_map().unwrap();
    assert_eq!(base["target_name"], "base".into());
    assert_eq!(base["ratio"], Value::Float(-1.5));
    assert_eq!(
        parsed.as_map().unwrap()["variables"],
        map(indexmap! { "use_x%".to_string() => Value::Int(0) })
    );
}

#[test]
fn key_order_is_preserved() {
    let parsed = parse("{'z': 1, 'a': 2, 'm': 3}").unwrap();
    let keys: Vec<&String> = parsed.as_map().unwrap().keys().collect();
    assert_eq!(keys, ["z", "a", "m"]);
}

#[test]
fn escapes() {
    let parsed = parse(r#"['a\tb', "q\"q", 'it\'s', 'back\\slash', 'keep\d']"#).unwrap();
    assert_eq!(
        parsed,
        Value::List(vec![
            "a\tb".into(),
            "q\"q".into(),
            "it's".into(),
            "back\\slash".into(),
            "keep\\d".into(),
        ])
    );
}

#[test]
fn adjacent_strings_concatenate() {
    let parsed = parse("{'cmd': 'echo ' \"hello\" ' world'}").unwrap();
    assert_eq!(parsed.as_map().unwrap()["cmd"], "echo hello world".into());
}

#[test]
fn empty_containers() {
    assert_eq!(parse("{}").unwrap(), map(Map::new()));
    assert_eq!(parse(" [ ] ").unwrap(), Value::List(vec![]));
}

#[test]
fn writer_output_reparses() {
    let text = r#"{
  'variables': {'name': 'it\'s "quoted"', 'n': 7, 'f': 2.0},
  'targets': [{'target_name': 'x', 'sources': ['a.c', 'tab\there'], 'empty': []}],
  'nested': {'deeper': {'list': [[1, -2], {}]}},
}"#;
    let parsed = parse(text).unwrap();
    assert_eq!(parse(&to_literal(&parsed)).unwrap(), parsed);
    assert_eq!(parse(&to_literal_pretty(&parsed)).unwrap(), parsed);
}

#[test]
fn pretty_layout() {
    let parsed = parse("{'a': [1, 'b'], 'c': {}}").unwrap();
    assert_eq!(
        to_literal_pretty(&parsed),
        "{\n  'a': [\n    1,\n    'b',\n  ],\n  'c': {},\n}\n"
    );
}

#[test]
fn display_is_compact_literal() {
    let parsed = parse("{'a': [1, 'b']}").unwrap();
    assert_eq!(parsed.to_string(), "{'a': [1, 'b']}");
}
