//! Passes over the ordered target graph: pruning to root targets, publishing dependent settings
//! and rewriting static library dependencies.

use std::collections::HashSet;

use gypsum_syntax::Value;
use tracing::debug;

use crate::config::ResolverConfig;
use crate::errors::{GypError, GypResult};
use crate::graph::DependencyGraph;
use crate::merge::merge_dicts;
use crate::qualified::{build_file, find_qualified_targets};
use crate::target::{flag, get_target, string_list, target_type, TargetType, Targets};

/// Sections a dependency publishes to the targets that depend on it, in the order they apply.
pub const DEPENDENT_SETTINGS_KEYS: [&str; 3] =
    ["all_dependent_settings", "direct_dependent_settings", "link_settings"];

/// Keep only `root_targets` and everything they depend on.
pub fn prune_to_roots(
    targets: &mut Targets,
    flat_list: &mut Vec<String>,
    graph: &DependencyGraph,
    root_targets: &[String],
) -> GypResult<()> {
    let mut wanted: HashSet<String> = HashSet::new();
    for root in root_targets {
        let root = root.trim();
        let matches = find_qualified_targets(root, flat_list);
        if matches.is_empty() {
            return Err(GypError::Invalid(format!("Could not find target {root}")).into());
        }
        for name in matches {
            wanted.extend(graph.deep_dependencies(&name)?);
            wanted.insert(name);
        }
    }

    debug!(kept = wanted.len(), of = flat_list.len(), "Pruning to root targets");
    targets.retain(|name, _| wanted.contains(name));
    flat_list.retain(|name| wanted.contains(name));
    Ok(())
}

/// Merge the `key` section of each relevant dependency into every target, in flat order.
fn do_dependent_settings(
    key: &str,
    flat_list: &[String],
    targets: &mut Targets,
    graph: &DependencyGraph,
    config: &ResolverConfig,
) -> GypResult<()> {
    for target in flat_list {
        let dependencies: Vec<String> = match key {
            "all_dependent_settings" => graph.deep_dependencies(target)?.into_iter().collect(),
            "direct_dependent_settings" => graph.direct_and_imported_dependencies(target, targets)?,
            _ => graph
                .dependencies_for_link_settings(target, targets)?
                .into_iter()
                .collect(),
        };

        let target_file = build_file(target).unwrap_or_default();
        for dependency in dependencies {
            let Some(section) = get_target(targets, &dependency)?.get(key) else {
                continue;
            };
            let Value::Map(section) = section.clone() else {
                return Err(GypError::TypeMismatch(format!(
                    "{key} in {dependency} must be a dict, found a {}",
                    section.type_name()
                ))
                .into());
            };

            let dependency_file = build_file(&dependency).unwrap_or_default();
            if let Some(spec) = targets.get_mut(target) {
                merge_dicts(spec, &section, &target_file, &dependency_file, config)?;
            }
        }
    }
    Ok(())
}

/// Publish every dependent settings section, then remove those sections from all targets.
pub fn propagate_dependent_settings(
    flat_list: &[String],
    targets: &mut Targets,
    graph: &DependencyGraph,
    config: &ResolverConfig,
) -> GypResult<()> {
    for key in DEPENDENT_SETTINGS_KEYS {
        do_dependent_settings(key, flat_list, targets, graph, config)?;
        for target in flat_list {
            if let Some(spec) = targets.get_mut(target) {
                spec.shift_remove(key);
            }
        }
    }
    Ok(())
}

/// Static libraries do not link, so their dependencies on other static libraries are only
/// ordering constraints and get pushed onto whatever links them instead.
///
/// A static library keeps its original list as `dependencies_original` and from then on only
/// depends on hard dependencies and its direct non-static-library dependencies. Every
/// linkable target gains its full link closure.
pub fn adjust_static_library_dependencies(
    flat_list: &[String],
    targets: &mut Targets,
    graph: &DependencyGraph,
    sort_dependencies: bool,
) -> GypResult<()> {
    for target in flat_list {
        let kind = target_type(targets, target)?;

        if kind == TargetType::StaticLibrary {
            let spec = get_target(targets, target)?;
            let Some(original) = spec.get("dependencies").cloned() else {
                continue;
            };
            let direct = string_list(spec, "dependencies");

            let mut dependencies = graph.direct_and_imported_dependencies(target, targets)?;
            let mut keep = Vec::with_capacity(dependencies.len());
            for dependency in &dependencies {
                let dependency_spec = get_target(targets, dependency)?;
                let dependency_kind = target_type(targets, dependency)?;
                keep.push(if dependency_kind == TargetType::StaticLibrary {
                    flag(dependency_spec, "hard_dependency", false)
                } else {
                    direct.contains(dependency)
                });
            }
            let mut keep = keep.into_iter();
            dependencies.retain(|_| keep.next().unwrap_or(false));

            let Some(spec) = targets.get_mut(target) else {
                continue;
            };
            spec.insert("dependencies_original".into(), original);
            if dependencies.is_empty() {
                spec.shift_remove("dependencies");
            } else {
                spec.insert(
                    "dependencies".into(),
                    Value::List(dependencies.into_iter().map(Value::Str).collect()),
                );
            }
        } else if kind.is_linkable() {
            let link_dependencies = graph.dependencies_to_link_against(target, targets)?;
            let Some(spec) = targets.get_mut(target) else {
                continue;
            };

            let mut dependencies = string_list(spec, "dependencies");
            let had_dependencies = spec.contains_key("dependencies");
            for dependency in link_dependencies {
                if &dependency != target && !dependencies.contains(&dependency) {
                    dependencies.push(dependency);
                }
            }

            if sort_dependencies {
                let present: HashSet<&String> = dependencies.iter().collect();
                dependencies = flat_list
                    .iter()
                    .rev()
                    .filter(|name| present.contains(name))
                    .cloned()
                    .collect();
            }

            if had_dependencies || !dependencies.is_empty() {
                spec.insert(
                    "dependencies".into(),
                    Value::List(dependencies.into_iter().map(Value::Str).collect()),
                );
            }
        }
    }
    Ok(())
}
