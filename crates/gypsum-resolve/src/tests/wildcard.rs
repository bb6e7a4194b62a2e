use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use super::{strings, targets};
use crate::config::{GeneratorInputInfoBuilder, ResolverConfig};
use crate::targets::{
    expand_wildcard_dependencies, filter_dependency_sections, qualify_dependencies,
    remove_duplicate_dependencies, remove_link_dependencies_from_none_targets,
    remove_self_dependencies, FileTargets,
};

fn by_file() -> FileTargets {
    IndexMap::from([
        (
            "a.gyp".to_string(),
            vec!["a.gyp:t1#target".to_string(), "a.gyp:t2#target".to_string()],
        ),
        ("b.gyp".to_string(), vec!["b.gyp:t3#target".to_string()]),
    ])
}

fn wildcard_targets(t1_extra: &str, reference: &str) -> crate::target::Targets {
    targets(&[
        (
            "a.gyp:t1#target",
            format!("{{'target_name': 't1', 'toolset': 'target'{t1_extra}}}").as_str(),
        ),
        ("a.gyp:t2#target", "{'target_name': 't2', 'toolset': 'target'}"),
        (
            "b.gyp:t3#target",
            format!("{{'target_name': 't3', 'toolset': 'target', 'dependencies': ['{reference}']}}")
                .as_str(),
        ),
    ])
}

#[test]
fn star_names_every_target_of_the_file() {
    let mut targets = wildcard_targets("", "a.gyp:*#target");
    expand_wildcard_dependencies(&mut targets, &by_file()).unwrap();
    assert_eq!(
        strings(targets["b.gyp:t3#target"].get("dependencies")),
        ["a.gyp:t1#target", "a.gyp:t2#target"]
    );
}

#[test]
fn suppressed_targets_are_skipped() {
    let mut targets = wildcard_targets(", 'suppress_wildcard': 1", "a.gyp:*#target");
    expand_wildcard_dependencies(&mut targets, &by_file()).unwrap();
    assert_eq!(
        strings(targets["b.gyp:t3#target"].get("dependencies")),
        ["a.gyp:t2#target"]
    );
}

#[test]
fn star_toolset_matches_any_toolset() {
    let mut targets = wildcard_targets("", "a.gyp:t2#*");
    expand_wildcard_dependencies(&mut targets, &by_file()).unwrap();
    assert_eq!(
        strings(targets["b.gyp:t3#target"].get("dependencies")),
        ["a.gyp:t2#target"]
    );
}

#[test]
fn wildcard_into_own_file_is_rejected() {
    let mut targets = wildcard_targets("", "b.gyp:*#target");
    let err = expand_wildcard_dependencies(&mut targets, &by_file()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Found wildcard in dependencies of b.gyp:t3#target referring to same build file"
    );
}

#[test]
fn references_are_qualified_relative_to_their_file() {
    let mut targets = targets(&[(
        "sub/b.gyp:t#target",
        "{'target_name': 't', 'toolset': 'target',
          'dependencies': ['../a.gyp:x', 'y', 'c.gyp:z#host']}",
    )]);
    qualify_dependencies(&mut targets, &ResolverConfig::default()).unwrap();
    assert_eq!(
        strings(targets["sub/b.gyp:t#target"].get("dependencies")),
        ["a.gyp:x#target", "sub/b.gyp:y#target", "sub/c.gyp:z#target"]
    );
}

#[test]
fn named_toolsets_survive_with_multiple_toolsets() {
    let config = ResolverConfig::builder()
        .generator(
            GeneratorInputInfoBuilder::default()
                .supports_multiple_toolsets(true)
                .build()
                .unwrap(),
        )
        .build()
        .unwrap();
    let mut targets = targets(&[(
        "b.gyp:t#target",
        "{'target_name': 't', 'toolset': 'target', 'dependencies': ['c.gyp:z#host', 'y']}",
    )]);
    qualify_dependencies(&mut targets, &config).unwrap();
    assert_eq!(
        strings(targets["b.gyp:t#target"].get("dependencies")),
        ["c.gyp:z#host", "b.gyp:y#target"]
    );
}

#[test]
fn exports_must_also_be_dependencies() {
    let mut targets = targets(&[(
        "b.gyp:t#target",
        "{'target_name': 't', 'toolset': 'target', 'dependencies': ['y'],
          'export_dependent_settings': ['z']}",
    )]);
    let err = qualify_dependencies(&mut targets, &ResolverConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Found b.gyp:z#target in export_dependent_settings of b.gyp:t#target, but not in dependencies"
    );
}

#[test]
fn self_dependencies_pruned_on_request() {
    let mut targets = targets(&[
        (
            "x.gyp:a#target",
            "{'target_name': 'a', 'dependencies': ['x.gyp:a#target', 'x.gyp:b#target'],
              'variables': {'prune_self_dependency': 1}}",
        ),
        ("x.gyp:b#target", "{'target_name': 'b', 'dependencies': ['x.gyp:b#target']}"),
    ]);
    remove_self_dependencies(&mut targets);
    assert_eq!(strings(targets["x.gyp:a#target"].get("dependencies")), ["x.gyp:b#target"]);
    assert_eq!(strings(targets["x.gyp:b#target"].get("dependencies")), ["x.gyp:b#target"]);
}

#[test]
fn none_targets_drop_link_only_dependencies() {
    let mut targets = targets(&[
        ("l", "{'target_name': 'l', 'variables': {'link_dependency': 1}}"),
        ("o", "{'target_name': 'o'}"),
        ("n", "{'target_name': 'n', 'type': 'none', 'dependencies': ['l', 'o']}"),
        ("e", "{'target_name': 'e', 'type': 'executable', 'dependencies': ['l', 'o']}"),
    ]);
    remove_link_dependencies_from_none_targets(&mut targets);
    assert_eq!(strings(targets["n"].get("dependencies")), ["o"]);
    assert_eq!(strings(targets["e"].get("dependencies")), ["l", "o"]);
}

#[test]
fn dependency_filters_and_duplicates() {
    let mut targets = targets(&[(
        "t",
        "{'target_name': 't', 'dependencies': ['a', 'b', 'a', 'c'], 'dependencies!': ['b'],
          'sources!': ['untouched.c']}",
    )]);
    filter_dependency_sections(&mut targets).unwrap();
    remove_duplicate_dependencies(&mut targets);

    let spec = &targets["t"];
    assert_eq!(strings(spec.get("dependencies")), ["a", "c"]);
    assert_eq!(strings(spec.get("dependencies_excluded")), ["b"]);
    assert!(!spec.contains_key("dependencies!"));
    assert!(spec.contains_key("sources!"));
}
