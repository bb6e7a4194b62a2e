//! Front-end helpers for the `gypsum` binary: turning `-D`/`GYP_DEFINES` into initial
//! variables and rendering a [`Resolution`].

use anyhow::Context;
use gypsum_resolve::Resolution;
use gypsum_syntax::{to_literal_pretty, Map, Value};
use gypsum_util::shell::split_posix_shell;

/// Parse one `name[=value]` define. A value that reads as an integer becomes one; a bare name
/// is set to `1`.
pub fn parse_define(define: &str) -> (String, Value) {
    match define.split_once('=') {
        Some((name, value)) => {
            let value = match value.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::Str(value.to_string()),
            };
            (name.to_string(), value)
        }
        None => (define.to_string(), Value::Int(1)),
    }
}

/// Initial variables: the shell-split words of `gyp_defines` first, then `defines` from the
/// command line, later definitions winning.
pub fn initial_variables<S: AsRef<str>>(
    gyp_defines: Option<&str>,
    defines: &[S],
) -> anyhow::Result<Map> {
    let mut variables = Map::new();

    if let Some(gyp_defines) = gyp_defines {
        let words = split_posix_shell(gyp_defines).context("while reading GYP_DEFINES")?;
        for word in words {
            let (name, value) = parse_define(&word);
            variables.insert(name, value);
        }
    }

    for define in defines {
        let (name, value) = parse_define(define.as_ref());
        variables.insert(name, value);
    }

    Ok(variables)
}

/// One qualified target name per line, dependencies first.
pub fn render_order(resolution: &Resolution) -> String {
    resolution
        .flat_list
        .iter()
        .map(|name| format!("{name}\n"))
        .collect()
}

/// The resolved targets as a literal map keyed by qualified name, in dependency order.
pub fn render_targets(resolution: &Resolution) -> String {
    let targets: Map = resolution
        .flat_list
        .iter()
        .filter_map(|name| {
            resolution
                .targets
                .get(name)
                .map(|spec| (name.clone(), Value::Map(spec.clone())))
        })
        .collect();
    to_literal_pretty(&Value::Map(targets))
}
