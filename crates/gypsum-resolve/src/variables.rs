use gypsum_syntax::{Map, Value};
use gypsum_util::path::{dirname, relative_path};

/// Variables visible at one point of a document. Cloning is cheap, so each level of a
/// document walk gets its own copy and never disturbs its parent's.
pub type Scope = im_rc::HashMap<String, Value>;

pub fn scope_from_map(map: &Map) -> Scope {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

pub fn scope_to_map(scope: &Scope) -> Map {
    let mut map: Map = scope.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    map.sort_keys();
    map
}

/// Expose every string, number and list sibling `key` as the variable `_key`.
pub fn load_automatic_variables(variables: &mut Scope, the_dict: &Map) {
    for (key, value) in the_dict {
        if matches!(value, Value::Str(_) | Value::Int(_) | Value::Float(_) | Value::List(_)) {
            variables.insert(format!("_{key}"), value.clone());
        }
    }
}

/// Load the `variables` sub-dictionary of `the_dict` into `variables`.
///
/// A name ending in `%` is only a default and never overrides an existing variable. When
/// `the_dict` is itself a `variables` dictionary, such a default defers to a plain definition
/// of the same name next to it.
pub fn load_variables_from_variables_dict(
    variables: &mut Scope,
    the_dict: &Map,
    the_dict_key: Option<&str>,
) {
    let Some(Value::Map(vars)) = the_dict.get("variables") else {
        return;
    };

    for (key, value) in vars {
        if matches!(value, Value::Map(_)) {
            continue;
        }

        match key.strip_suffix('%') {
            Some(name) => {
                if variables.contains_key(name) {
                    continue;
                }
                let value = match the_dict.get(name) {
                    Some(own) if the_dict_key == Some("variables") => own.clone(),
                    _ => value.clone(),
                };
                variables.insert(name.to_string(), value);
            }
            None => {
                variables.insert(key.clone(), value.clone());
            }
        }
    }
}

/// The value of `DEPTH` for a build file: the configured depth relative to the file's directory.
pub fn depth_for(depth: &str, build_file: &str) -> String {
    let relative = relative_path(depth, dirname(build_file));
    if relative.is_empty() {
        ".".into()
    } else {
        relative
    }
}
