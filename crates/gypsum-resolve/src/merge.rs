//! Deep merging of one dictionary into another.
//!
//! List-valued keys carry their merge policy in a trailing character: `key=` replaces,
//! `key+` prepends, `key?` only sets when absent, and a bare `key` appends. Path-valued keys
//! are rebased from the file that declares them to the file they are merged into.

use std::collections::HashSet;
use std::sync::LazyLock;

use gypsum_syntax::{Map, Value};
use gypsum_util::path::{dirname, join, normpath, relative_path};
use regex::Regex;

use crate::config::ResolverConfig;
use crate::errors::{GypError, GypResult};

static PATH_EXCEPTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"^["']?[-/$<>^]"#).unwrap());

/// Rebase `item`, written relative to `fro_file`, so it is relative to `to_file` instead.
///
/// Absolute paths, flags and values that start with an expansion are left alone.
pub fn make_path_relative(to_file: &str, fro_file: &str, item: &str) -> String {
    if to_file == fro_file || PATH_EXCEPTION.is_match(item) {
        return item.to_string();
    }

    let rebased = normpath(&join(
        &relative_path(dirname(fro_file), dirname(to_file)),
        item,
    ));
    if item.ends_with('/') && !rebased.ends_with('/') {
        format!("{rebased}/")
    } else {
        rebased
    }
}

#[derive(Hash, PartialEq, Eq)]
enum SingletonKey {
    Str(String),
    Int(i64),
    Float(u64),
}

/// Scalars other than flags (strings starting with `-`) may appear at most once in a list.
fn singleton_key(item: &Value) -> Option<SingletonKey> {
    match item {
        Value::Str(s) if !s.starts_with('-') => Some(SingletonKey::Str(s.clone())),
        Value::Int(i) => Some(SingletonKey::Int(*i)),
        Value::Float(f) => Some(SingletonKey::Float(f.to_bits())),
        _ => None,
    }
}

fn copy_item(
    item: &Value,
    to_file: &str,
    fro_file: &str,
    is_paths: bool,
    config: &ResolverConfig,
) -> GypResult<Value> {
    Ok(match item {
        Value::Str(s) if is_paths => Value::Str(make_path_relative(to_file, fro_file, s)),
        Value::Map(m) => {
            let mut copy = Map::new();
            merge_dicts(&mut copy, m, to_file, fro_file, config)?;
            Value::Map(copy)
        }
        Value::List(l) => {
            let mut copy = vec![];
            merge_lists(&mut copy, l, to_file, fro_file, is_paths, true, config)?;
            Value::List(copy)
        }
        other => other.clone(),
    })
}

/// Merge the items of `fro` into `to`, appending or prepending.
pub fn merge_lists(
    to: &mut Vec<Value>,
    fro: &[Value],
    to_file: &str,
    fro_file: &str,
    is_paths: bool,
    append: bool,
    config: &ResolverConfig,
) -> GypResult<()> {
    if append {
        let mut present: HashSet<SingletonKey> = to.iter().filter_map(singleton_key).collect();
        for item in fro {
            let copied = copy_item(item, to_file, fro_file, is_paths, config)?;
            if let Some(key) = singleton_key(&copied) {
                if !present.insert(key) {
                    continue;
                }
            }
            to.push(copied);
        }
    } else {
        for item in fro {
            let copied = copy_item(item, to_file, fro_file, is_paths, config)?;
            if singleton_key(&copied).is_some() {
                to.retain(|existing| existing != &copied);
            }
            to.insert(0, copied);
        }
    }

    Ok(())
}

fn base_key(key: &str) -> (&str, Option<char>) {
    match key.chars().last() {
        Some(c @ ('=' | '+' | '?')) => (&key[..key.len() - 1], Some(c)),
        _ => (key, None),
    }
}

/// Merge `fro`, declared in `fro_file`, into `to`, declared in `to_file`.
pub fn merge_dicts(
    to: &mut Map,
    fro: &Map,
    to_file: &str,
    fro_file: &str,
    config: &ResolverConfig,
) -> GypResult<()> {
    for (k, v) in fro {
        match v {
            Value::Str(_) | Value::Int(_) | Value::Float(_) => {
                if let Some(existing) = to.get(k) {
                    if !existing.is_scalar() {
                        return Err(GypError::TypeMismatch(format!(
                            "Attempt to merge dict value of type {} into incompatible type {} for key {k}",
                            v.type_name(),
                            existing.type_name()
                        ))
                        .into());
                    }
                }

                let merged = match v {
                    Value::Str(s) if config.is_path_section(k) => {
                        Value::Str(make_path_relative(to_file, fro_file, s))
                    }
                    other => other.clone(),
                };
                to.insert(k.clone(), merged);
            }
            Value::Map(fro_map) => match to.get_mut(k) {
                Some(Value::Map(to_map)) => {
                    merge_dicts(to_map, fro_map, to_file, fro_file, config)?;
                }
                Some(existing) => {
                    return Err(GypError::TypeMismatch(format!(
                        "Attempt to merge dict value of type dict into incompatible type {} for key {k}",
                        existing.type_name()
                    ))
                    .into());
                }
                None => {
                    let mut fresh = Map::new();
                    merge_dicts(&mut fresh, fro_map, to_file, fro_file, config)?;
                    to.insert(k.clone(), Value::Map(fresh));
                }
            },
            Value::List(fro_list) => {
                let (list_base, policy) = base_key(k);
                let incompatible: Vec<String> = match policy {
                    Some('=') => vec![list_base.to_string(), format!("{list_base}?")],
                    Some('+') => vec![format!("{list_base}="), format!("{list_base}?")],
                    Some('?') => vec![
                        list_base.to_string(),
                        format!("{list_base}="),
                        format!("{list_base}+"),
                    ],
                    _ => vec![format!("{list_base}="), format!("{list_base}?")],
                };
                if let Some(other) = incompatible.iter().find(|i| fro.contains_key(*i)) {
                    return Err(GypError::IncompatibleListPolicy {
                        key: k.clone(),
                        other: other.clone(),
                    }
                    .into());
                }

                match policy {
                    Some('=') => {
                        to.insert(list_base.to_string(), Value::List(vec![]));
                    }
                    Some('?') if to.contains_key(list_base) => continue,
                    _ => {}
                }

                let is_paths = config.is_path_section(list_base);
                let append = policy != Some('+');
                match to.get_mut(list_base) {
                    Some(Value::List(to_list)) => {
                        merge_lists(to_list, fro_list, to_file, fro_file, is_paths, append, config)?;
                    }
                    Some(existing) => {
                        return Err(GypError::TypeMismatch(format!(
                            "Attempt to merge dict value of type list into incompatible type {} for key {list_base} ({k})",
                            existing.type_name()
                        ))
                        .into());
                    }
                    None => {
                        let mut fresh = vec![];
                        merge_lists(&mut fresh, fro_list, to_file, fro_file, is_paths, append, config)?;
                        to.insert(list_base.to_string(), Value::List(fresh));
                    }
                }
            }
        }
    }

    Ok(())
}
