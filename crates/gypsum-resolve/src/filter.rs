//! `X!` (literal exclusion) and `X/` (regex exclusion/inclusion) list filters.

use gypsum_syntax::{Map, Value};
use regex::Regex;

use crate::errors::{GypError, GypResult};

#[derive(Clone, Copy, PartialEq, Eq)]
enum ItemAction {
    Unset,
    Exclude,
    Include,
}

fn filter_operation(key: &str) -> Option<(&str, char)> {
    match key.chars().last() {
        Some(op @ ('!' | '/')) => Some((&key[..key.len() - 1], op)),
        _ => None,
    }
}

/// Apply every filter found in `the_dict` (named `name` in error messages) and then recurse
/// into nested dictionaries and lists.
pub fn process_list_filters_in_dict(name: &str, the_dict: &mut Map) -> GypResult<()> {
    let mut lists: Vec<String> = vec![];
    let mut orphans: Vec<String> = vec![];

    for (key, value) in the_dict.iter() {
        let Some((list_key, op)) = filter_operation(key) else {
            continue;
        };

        if !matches!(value, Value::List(_)) {
            return Err(GypError::Invalid(format!(
                "{name} key {key} must be list, not {}",
                value.type_name()
            ))
            .into());
        }

        match the_dict.get(list_key) {
            None => orphans.push(key.clone()),
            Some(Value::List(_)) => {
                if !lists.iter().any(|l| l == list_key) {
                    lists.push(list_key.to_string());
                }
            }
            Some(other) => {
                let what = if op == '!' { "exclusion" } else { "regex" };
                return Err(GypError::Invalid(format!(
                    "{name} key {list_key} must be list, not {} when applying {what}",
                    other.type_name()
                ))
                .into());
            }
        }
    }

    for orphan in orphans {
        the_dict.shift_remove(&orphan);
    }

    for list_key in lists {
        apply_filters(name, &list_key, the_dict)?;
    }

    for (key, value) in the_dict.iter_mut() {
        match value {
            Value::Map(m) => process_list_filters_in_dict(key, m)?,
            Value::List(l) => process_list_filters_in_list(key, l)?,
            _ => {}
        }
    }

    Ok(())
}

pub fn process_list_filters_in_list(name: &str, the_list: &mut [Value]) -> GypResult<()> {
    for item in the_list.iter_mut() {
        match item {
            Value::Map(m) => process_list_filters_in_dict(name, m)?,
            Value::List(l) => process_list_filters_in_list(name, l)?,
            _ => {}
        }
    }
    Ok(())
}

fn apply_filters(name: &str, list_key: &str, the_dict: &mut Map) -> GypResult<()> {
    let len = the_dict
        .get(list_key)
        .and_then(Value::as_list)
        .map_or(0, Vec::len);
    let mut actions = vec![ItemAction::Unset; len];

    let exclude_key = format!("{list_key}!");
    if let Some(Value::List(excludes)) = the_dict.shift_remove(&exclude_key) {
        let the_list = the_dict.get(list_key).and_then(Value::as_list);
        for exclude in &excludes {
            for (index, item) in the_list.into_iter().flatten().enumerate() {
                if item == exclude {
                    actions[index] = ItemAction::Exclude;
                }
            }
        }
    }

    let regex_key = format!("{list_key}/");
    if let Some(Value::List(regexes)) = the_dict.shift_remove(&regex_key) {
        let the_list = the_dict.get(list_key).and_then(Value::as_list);
        for entry in &regexes {
            let (action, pattern) = match entry.as_list().map(Vec::as_slice) {
                Some([Value::Str(action), Value::Str(pattern)]) => (action, pattern),
                _ => {
                    return Err(GypError::Invalid(format!(
                        "{name} key {regex_key} entries must be [action, pattern] pairs, found {entry}"
                    ))
                    .into())
                }
            };

            let action = match action.as_str() {
                "exclude" => ItemAction::Exclude,
                "include" => ItemAction::Include,
                other => {
                    return Err(GypError::Invalid(format!(
                        "Unrecognized action {other} in {name} key {regex_key}"
                    ))
                    .into())
                }
            };

            let pattern_re = Regex::new(pattern).map_err(|e| {
                GypError::Invalid(format!(
                    "Invalid pattern {pattern:?} in {name} key {regex_key}: {e}"
                ))
            })?;

            for (index, item) in the_list.into_iter().flatten().enumerate() {
                if actions[index] == action || !item.is_scalar() {
                    continue;
                }
                if pattern_re.is_match(&item.to_plain_string()) {
                    actions[index] = action;
                }
            }
        }
    }

    let excluded_key = format!("{list_key}_excluded");
    if the_dict.contains_key(&excluded_key) {
        return Err(GypError::Invalid(format!(
            "{name} key {excluded_key} must not be present prior to applying exclusion/regex filters for {list_key}"
        ))
        .into());
    }

    let Some(Value::List(the_list)) = the_dict.get_mut(list_key) else {
        return Ok(());
    };

    let mut kept = Vec::with_capacity(the_list.len());
    let mut excluded = vec![];
    for (item, action) in the_list.drain(..).zip(actions) {
        if action == ItemAction::Exclude {
            excluded.push(item);
        } else {
            kept.push(item);
        }
    }
    *the_list = kept;

    if !excluded.is_empty() {
        the_dict.insert(excluded_key, Value::List(excluded));
    }

    Ok(())
}
