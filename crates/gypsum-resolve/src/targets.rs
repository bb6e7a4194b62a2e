//! Passes over the table of loaded targets, run once every build file is loaded and before
//! the target graph is ordered.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use gypsum_syntax::{Map, Value};
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;

use crate::config::ResolverConfig;
use crate::errors::{CycleLevel, GypError, GypResult};
use crate::filter::process_list_filters_in_dict;
use crate::graph::DependencyGraph;
use crate::qualified::{build_file, parse_qualified_target, qualified_target, resolve_target};
use crate::target::{flag, nested_flag, string_list, Targets};

/// List sections whose entries name other targets.
pub const DEPENDENCY_SECTIONS: [&str; 2] = ["dependencies", "export_dependent_settings"];

/// Qualified target names per target build file, in declaration order.
pub type FileTargets = IndexMap<String, Vec<String>>;

pub fn toolset(spec: &Map) -> Option<&str> {
    spec.get("toolset").and_then(Value::as_str)
}

fn target_name(spec: &Map) -> Option<&str> {
    spec.get("target_name").and_then(Value::as_str)
}

fn set_string_list(spec: &mut Map, key: &str, items: Vec<String>) {
    spec.insert(key.to_string(), Value::List(items.into_iter().map(Value::Str).collect()));
}

/// Move the `targets` of every target build file into one table keyed by qualified name.
///
/// Each document is left with an empty `targets` list for the resolved targets to be written
/// back into.
pub fn build_targets_dict(
    documents: &mut IndexMap<String, Map>,
    target_build_files: &IndexSet<String>,
) -> GypResult<(Targets, FileTargets)> {
    let mut targets = Targets::new();
    let mut by_file = FileTargets::new();

    for file in target_build_files {
        let mut names = vec![];
        let document = documents
            .get_mut(file)
            .ok_or_else(|| GypError::Invalid(format!("{file} was never loaded")))?;

        let list = match document.get_mut("targets") {
            None => vec![],
            Some(Value::List(list)) => std::mem::take(list),
            Some(other) => {
                return Err(GypError::TypeMismatch(format!(
                    "targets in {file} must be a list, found a {}",
                    other.type_name()
                ))
                .into())
            }
        };

        for target in list {
            let Value::Map(spec) = target else {
                return Err(GypError::TypeMismatch(format!(
                    "Every entry of targets in {file} must be a dict, found a {}",
                    target.type_name()
                ))
                .into());
            };
            let Some(name) = target_name(&spec) else {
                return Err(GypError::Invalid(format!(
                    "A target in {file} has no string target_name"
                ))
                .into());
            };

            let qualified = qualified_target(file, name, toolset(&spec));
            if targets.contains_key(&qualified) {
                return Err(GypError::DuplicateTargetDefinition(qualified).into());
            }
            names.push(qualified.clone());
            targets.insert(qualified, spec);
        }

        by_file.insert(file.clone(), names);
    }

    Ok((targets, by_file))
}

/// Rewrite every dependency reference into a fully qualified name.
///
/// Anything listed outside `dependencies` itself must also appear in `dependencies`.
pub fn qualify_dependencies(targets: &mut Targets, config: &ResolverConfig) -> GypResult<()> {
    for (name, spec) in targets.iter_mut() {
        let target_file = build_file(name).unwrap_or_default();
        let target_toolset = toolset(spec).map(String::from);

        let keys = DEPENDENCY_SECTIONS
            .iter()
            .flat_map(|section| [section.to_string(), format!("{section}!")]);
        let mut qualified_keys = vec![];
        for key in keys {
            let Some(Value::List(dependencies)) = spec.get_mut(&key) else {
                continue;
            };

            for dependency in dependencies.iter_mut() {
                let Value::Str(reference) = dependency else {
                    return Err(GypError::TypeMismatch(format!(
                        "{key} of {name} must only hold strings, found a {}",
                        dependency.type_name()
                    ))
                    .into());
                };

                let resolved =
                    resolve_target(Some(target_file.as_str()), reference, target_toolset.as_deref());
                let dependency_toolset = if config.multiple_toolsets() {
                    resolved.toolset
                } else {
                    target_toolset.clone()
                };
                *dependency = Value::Str(qualified_target(
                    resolved.build_file.as_deref().unwrap_or_default(),
                    &resolved.target,
                    dependency_toolset.as_deref(),
                ));
            }
            qualified_keys.push(key);
        }

        let direct = string_list(spec, "dependencies");
        for key in qualified_keys.iter().filter(|k| *k != "dependencies") {
            if let Some(stray) = string_list(spec, key).into_iter().find(|d| !direct.contains(d)) {
                return Err(GypError::Invalid(format!(
                    "Found {stray} in {key} of {name}, but not in dependencies"
                ))
                .into());
            }
        }
    }
    Ok(())
}

/// Drop dependencies of a target on itself when the target asks for it through
/// `variables.prune_self_dependency`.
pub fn remove_self_dependencies(targets: &mut Targets) {
    for (name, spec) in targets.iter_mut() {
        if !nested_flag(spec, "variables", "prune_self_dependency", false) {
            continue;
        }
        for section in DEPENDENCY_SECTIONS {
            let dependencies = string_list(spec, section);
            if dependencies.contains(name) {
                let kept = dependencies.into_iter().filter(|d| d != name).collect();
                set_string_list(spec, section, kept);
            }
        }
    }
}

/// Replace `file:*` and `file:name#*` references with every matching target of `file` that
/// does not set `suppress_wildcard`.
pub fn expand_wildcard_dependencies(targets: &mut Targets, by_file: &FileTargets) -> GypResult<()> {
    let names: Vec<String> = targets.keys().cloned().collect();
    for name in &names {
        let target_file = build_file(name).unwrap_or_default();
        for section in DEPENDENCY_SECTIONS {
            let Some(Value::List(dependencies)) = targets.get(name).and_then(|s| s.get(section)) else {
                continue;
            };

            let mut expanded: Vec<Value> = vec![];
            let mut changed = false;
            for dependency in dependencies {
                let Value::Str(reference) = dependency else {
                    expanded.push(dependency.clone());
                    continue;
                };
                let parsed = parse_qualified_target(reference);
                let wanted_toolset = parsed.toolset.as_deref();
                if parsed.target != "*" && wanted_toolset != Some("*") {
                    expanded.push(dependency.clone());
                    continue;
                }

                changed = true;
                let dependency_file = parsed.build_file.clone().unwrap_or_default();
                if dependency_file == target_file {
                    return Err(GypError::Invalid(format!(
                        "Found wildcard in {section} of {name} referring to same build file"
                    ))
                    .into());
                }

                let candidates = by_file.get(&dependency_file).ok_or_else(|| {
                    GypError::Invalid(format!(
                        "Wildcard {reference} in {section} of {name} names {dependency_file}, which has no targets"
                    ))
                })?;
                for candidate in candidates {
                    let Some(candidate_spec) = targets.get(candidate) else {
                        continue;
                    };
                    if flag(candidate_spec, "suppress_wildcard", false) {
                        continue;
                    }
                    let candidate_name = target_name(candidate_spec).unwrap_or_default();
                    if parsed.target != "*" && parsed.target != candidate_name {
                        continue;
                    }
                    let candidate_toolset = toolset(candidate_spec);
                    if wanted_toolset != Some("*") && wanted_toolset != candidate_toolset {
                        continue;
                    }
                    expanded.push(Value::Str(qualified_target(
                        &dependency_file,
                        candidate_name,
                        candidate_toolset,
                    )));
                }
            }

            if changed {
                if let Some(spec) = targets.get_mut(name) {
                    spec.insert(section.to_string(), Value::List(expanded));
                }
            }
        }
    }
    Ok(())
}

/// `type: none` targets do not link, so they drop dependencies on targets flagged with
/// `variables.link_dependency`.
pub fn remove_link_dependencies_from_none_targets(targets: &mut Targets) {
    let link_only: HashSet<String> = targets
        .iter()
        .filter(|(_, spec)| nested_flag(spec, "variables", "link_dependency", false))
        .map(|(name, _)| name.clone())
        .collect();
    if link_only.is_empty() {
        return;
    }

    for spec in targets.values_mut() {
        if spec.get("type").and_then(Value::as_str) != Some("none") {
            continue;
        }
        for section in DEPENDENCY_SECTIONS {
            let dependencies = string_list(spec, section);
            if dependencies.iter().any(|d| link_only.contains(d)) {
                let kept = dependencies.into_iter().filter(|d| !link_only.contains(d)).collect();
                set_string_list(spec, section, kept);
            }
        }
    }
}

/// Apply `!` and `/` filters to the dependency sections only, ahead of the general filter pass.
pub fn filter_dependency_sections(targets: &mut Targets) -> GypResult<()> {
    for (name, spec) in targets.iter_mut() {
        let mut sections = Map::new();
        for section in DEPENDENCY_SECTIONS {
            for op in ["", "!", "/"] {
                let key = format!("{section}{op}");
                if let Some(value) = spec.shift_remove(&key) {
                    sections.insert(key, value);
                }
            }
        }

        process_list_filters_in_dict(name, &mut sections)?;
        spec.extend(sections);
    }
    Ok(())
}

pub fn remove_duplicate_dependencies(targets: &mut Targets) {
    for spec in targets.values_mut() {
        for section in DEPENDENCY_SECTIONS {
            let dependencies = string_list(spec, section);
            if dependencies.is_empty() {
                continue;
            }
            let unique: Vec<String> = dependencies.iter().unique().cloned().collect();
            if unique.len() != dependencies.len() {
                set_string_list(spec, section, unique);
            }
        }
    }
}

/// Reject cycles between build files, even when the targets inside them are acyclic.
pub fn verify_no_gyp_file_circular_dependencies(targets: &Targets) -> GypResult<()> {
    let mut graph = DependencyGraph::new();
    for name in targets.keys() {
        graph.add_node(&build_file(name).unwrap_or_default());
    }

    let mut edges: HashSet<(String, String)> = HashSet::new();
    for (name, spec) in targets {
        let file = build_file(name).unwrap_or_default();
        for dependency in string_list(spec, "dependencies") {
            let dependency_file = build_file(&dependency)
                .ok_or_else(|| GypError::Invalid(format!("Dependency '{dependency}' names no build file")))
                .with_context(|| format!("while computing dependencies of .gyp file {file}"))?;
            if dependency_file == file {
                continue;
            }

            let (Some(from), Some(to)) = (graph.node(&file), graph.node(&dependency_file)) else {
                return Err(GypError::Invalid(format!("Dependency '{dependency_file}' not found")).into());
            };
            if edges.insert((file.clone(), dependency_file)) {
                graph.add_dependency(from, to);
            }
        }
    }

    graph.attach_orphans_to_root();
    graph.flat_list(CycleLevel::BuildFile).map(|_| ())
}

/// Two targets in one directory may not share a name, even when declared in different files.
pub fn verify_no_colliding_targets(flat_list: &[String]) -> GypResult<()> {
    let mut used: HashMap<String, String> = HashMap::new();
    for target in flat_list {
        let Some((path, name)) = target.rsplit_once(':') else {
            continue;
        };
        let (directory, file) = match path.rsplit_once('/') {
            Some((directory, file)) if !directory.is_empty() => (directory, file),
            Some((_, file)) => (".", file),
            None => (".", path),
        };

        let key = format!("{directory}:{name}");
        if let Some(first) = used.get(&key) {
            return Err(GypError::DuplicateTarget {
                name: name.to_string(),
                directory: directory.to_string(),
                first: first.clone(),
                second: file.to_string(),
            }
            .into());
        }
        used.insert(key, file.to_string());
    }
    Ok(())
}

/// Replace every integer under `value` with its decimal spelling.
pub fn stringify_integers(value: &mut Value) {
    match value {
        Value::Int(i) => *value = Value::Str(i.to_string()),
        Value::List(items) => items.iter_mut().for_each(stringify_integers),
        Value::Map(map) => map.values_mut().for_each(stringify_integers),
        Value::Str(_) | Value::Float(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn colliding_targets_in_one_directory() {
        let err = verify_no_colliding_targets(&[
            "foo/a.gyp:t#target".to_string(),
            "foo/b.gyp:t#target".to_string(),
        ])
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Duplicate target name "t#target" in directory "foo" used both in "a.gyp" and "b.gyp""#
        );

        verify_no_colliding_targets(&[
            "foo/a.gyp:t#target".to_string(),
            "bar/b.gyp:t#target".to_string(),
            "a.gyp:t#host".to_string(),
        ])
        .unwrap();
    }

    #[test]
    fn stringify_nested_integers() {
        let mut value = gypsum_syntax::parse("{'a': 1, 'b': [2, 'x', {'c': 3}], 'd': 1.5}").unwrap();
        stringify_integers(&mut value);
        assert_eq!(
            value,
            gypsum_syntax::parse("{'a': '1', 'b': ['2', 'x', {'c': '3'}], 'd': 1.5}").unwrap()
        );
    }
}
