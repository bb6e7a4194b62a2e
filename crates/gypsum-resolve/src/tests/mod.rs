mod condition;
mod wildcard;

use gypsum_syntax::{parse, Map, Value};

use crate::target::Targets;

pub(crate) fn map(text: &str) -> Map {
    match parse(text).unwrap() {
        Value::Map(m) => m,
        other => panic!("expected a dict, got {other}"),
    }
}

/// Targets keyed by name, each given as a literal dict.
pub(crate) fn targets(entries: &[(&str, &str)]) -> Targets {
    entries
        .iter()
        .map(|(name, spec)| (name.to_string(), map(spec)))
        .collect()
}

pub(crate) fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_list)
        .map(|items| items.iter().map(Value::to_plain_string).collect())
        .unwrap_or_default()
}
