use std::fs;
use std::path::Path;

use gypsum_resolve::{load, GypError, ResolverConfig, Resolution};
use gypsum_syntax::{Map, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Write `files` (relative path, contents) into a fresh directory.
fn fixture(files: &[(&str, &str)]) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (name, contents) in files {
        let path = dir.path().join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }
    dir
}

fn root(dir: &TempDir) -> String {
    dir.path().to_string_lossy().replace('\\', "/")
}

fn resolve(dir: &TempDir, file: &str, config: &ResolverConfig) -> anyhow::Result<Resolution> {
    load(
        &[format!("{}/{file}", root(dir))],
        &Map::new(),
        &[],
        Some(&root(dir)),
        config,
    )
}

fn strings(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_list)
        .map(|items| items.iter().map(Value::to_plain_string).collect())
        .unwrap_or_default()
}

fn default_configuration<'a>(resolution: &'a Resolution, target: &str) -> &'a Map {
    resolution.targets[target]["configurations"]
        .as_map()
        .and_then(|c| c.get("Default"))
        .and_then(Value::as_map)
        .unwrap()
}

const COMMON_GYPI: &str = r#"{
  'variables': {'use_foo%': 1},
  'target_defaults': {'defines': ['COMMON']},
}"#;

const APP_GYP: &str = r#"{
  'includes': ['common.gypi'],
  'targets': [
    {
      'target_name': 'app',
      'type': 'executable',
      'sources': ['main.c'],
      'dependencies': ['lib/lib.gyp:lib'],
      'defines': ['DEPTH_IS_<(DEPTH)'],
      'conditions': [
        ['use_foo==1', {'defines': ['FOO']}, {'defines': ['NO_FOO']}],
      ],
    },
  ],
}"#;

const LIB_GYP: &str = r#"{
  'targets': [
    {
      'target_name': 'lib',
      'type': 'static_library',
      'sources': ['lib.c', 'lib_win.c'],
      'sources!': ['lib_win.c'],
      'defines': ['DEPTH_IS_<(DEPTH)'],
      'direct_dependent_settings': {'include_dirs': ['include']},
    },
  ],
}"#;

#[test_log::test]
fn resolves_a_small_tree() {
    let dir = fixture(&[
        ("common.gypi", COMMON_GYPI),
        ("app.gyp", APP_GYP),
        ("lib/lib.gyp", LIB_GYP),
    ]);
    let r = root(&dir);
    let resolution = resolve(&dir, "app.gyp", &ResolverConfig::default()).unwrap();

    let app = format!("{r}/app.gyp:app#target");
    let lib = format!("{r}/lib/lib.gyp:lib#target");
    assert_eq!(resolution.flat_list, [lib.clone(), app.clone()]);

    let app_spec = &resolution.targets[&app];
    assert_eq!(strings(app_spec.get("dependencies")), [lib.clone()]);
    assert_eq!(strings(app_spec.get("sources")), ["main.c"]);
    assert_eq!(app_spec["default_configuration"], Value::from("Default"));

    let app_default = default_configuration(&resolution, &app);
    assert_eq!(strings(app_default.get("defines")), ["COMMON", "DEPTH_IS_.", "FOO"]);
    assert_eq!(strings(app_default.get("include_dirs")), ["lib/include"]);

    let lib_spec = &resolution.targets[&lib];
    assert_eq!(strings(lib_spec.get("sources")), ["lib.c"]);
    assert_eq!(strings(lib_spec.get("sources_excluded")), ["lib_win.c"]);
    assert!(!lib_spec.contains_key("direct_dependent_settings"));
    assert_eq!(
        strings(default_configuration(&resolution, &lib).get("defines")),
        ["DEPTH_IS_.."]
    );
}

#[test]
fn documents_hold_the_resolved_targets() {
    let dir = fixture(&[
        ("common.gypi", COMMON_GYPI),
        ("app.gyp", APP_GYP),
        ("lib/lib.gyp", LIB_GYP),
    ]);
    let r = root(&dir);
    let resolution = resolve(&dir, "app.gyp", &ResolverConfig::default()).unwrap();

    let document = &resolution.documents[&format!("{r}/app.gyp")];
    assert!(!document.contains_key("includes"));
    assert!(!document.contains_key("target_defaults"));
    assert_eq!(document["_DEPTH"], Value::Str(r.clone()));
    assert_eq!(strings(document.get("included_files")), ["app.gyp", "common.gypi"]);

    let targets = document["targets"].as_list().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(
        targets[0].as_map().unwrap().get("target_name"),
        Some(&Value::from("app"))
    );

    assert!(resolution.documents.contains_key(&format!("{r}/common.gypi")));
}

#[test]
fn command_line_variables_override_defaults() {
    let dir = fixture(&[
        ("common.gypi", COMMON_GYPI),
        ("app.gyp", APP_GYP),
        ("lib/lib.gyp", LIB_GYP),
    ]);
    let r = root(&dir);
    let mut variables = Map::new();
    variables.insert("use_foo".into(), Value::Int(0));
    let resolution = load(
        &[format!("{r}/app.gyp")],
        &variables,
        &[],
        Some(&r),
        &ResolverConfig::default(),
    )
    .unwrap();

    let app_default = default_configuration(&resolution, &format!("{r}/app.gyp:app#target"));
    assert_eq!(strings(app_default.get("defines")), ["COMMON", "DEPTH_IS_.", "NO_FOO"]);
}

#[test]
fn global_includes_apply_to_every_target_file() {
    let dir = fixture(&[
        ("global.gypi", "{'target_defaults': {'cflags': ['-Wall']}}"),
        ("x.gyp", "{'targets': [{'target_name': 'x', 'type': 'none'}]}"),
    ]);
    let r = root(&dir);
    let resolution = load(
        &[format!("{r}/x.gyp")],
        &Map::new(),
        &[format!("{r}/global.gypi")],
        None,
        &ResolverConfig::default(),
    )
    .unwrap();

    let target = format!("{r}/x.gyp:x#target");
    assert_eq!(
        strings(default_configuration(&resolution, &target).get("cflags")),
        ["-Wall"]
    );
    let document = &resolution.documents[&format!("{r}/x.gyp")];
    assert_eq!(strings(document.get("included_files")), ["x.gyp", "global.gypi"]);
    assert!(!document.contains_key("_DEPTH"));
}

#[test]
fn wildcards_respect_suppression() {
    let dir = fixture(&[
        (
            "a.gyp",
            "{'targets': [
               {'target_name': 't1', 'type': 'none'},
               {'target_name': 't2', 'type': 'none', 'suppress_wildcard': 1},
             ]}",
        ),
        (
            "b.gyp",
            "{'targets': [{'target_name': 't3', 'type': 'none', 'dependencies': ['a.gyp:*']}]}",
        ),
    ]);
    let r = root(&dir);
    let resolution = resolve(&dir, "b.gyp", &ResolverConfig::default()).unwrap();

    assert_eq!(
        strings(resolution.targets[&format!("{r}/b.gyp:t3#target")].get("dependencies")),
        [format!("{r}/a.gyp:t1#target")]
    );
    assert_eq!(resolution.flat_list.len(), 3);
}

#[test]
fn static_libraries_push_dependencies_to_the_link() {
    let dir = fixture(&[(
        "x.gyp",
        "{'targets': [
           {'target_name': 'exe', 'type': 'executable', 'dependencies': ['s']},
           {'target_name': 's', 'type': 'static_library', 'dependencies': ['h']},
           {'target_name': 'h', 'type': 'static_library', 'dependencies': ['d'],
            'export_dependent_settings': ['d']},
           {'target_name': 'd', 'type': 'static_library', 'hard_dependency': 1},
         ]}",
    )]);
    let r = root(&dir);
    let resolution = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap();
    let q = |name: &str| format!("{r}/x.gyp:{name}#target");

    assert_eq!(resolution.flat_list, [q("d"), q("h"), q("s"), q("exe")]);
    assert_eq!(strings(resolution.targets[&q("s")].get("dependencies")), [q("d")]);
    assert_eq!(
        strings(resolution.targets[&q("s")].get("dependencies_original")),
        [q("h")]
    );
    assert_eq!(
        strings(resolution.targets[&q("exe")].get("dependencies")),
        [q("s"), q("h"), q("d")]
    );
}

#[test]
fn build_file_cycles() {
    let files = [
        (
            "a.gyp",
            "{'targets': [
               {'target_name': 'x', 'type': 'none', 'dependencies': ['b.gyp:y']},
               {'target_name': 'w', 'type': 'none'},
             ]}",
        ),
        (
            "b.gyp",
            "{'targets': [
               {'target_name': 'y', 'type': 'none'},
               {'target_name': 'z', 'type': 'none', 'dependencies': ['a.gyp:w']},
             ]}",
        ),
    ];
    let dir = fixture(&files);
    let r = root(&dir);

    let err = resolve(&dir, "a.gyp", &ResolverConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Cycles in .gyp file dependency graph detected:\nCycle: {r}/a.gyp -> {r}/b.gyp -> {r}/a.gyp")
    );

    let config = ResolverConfig::builder().circular_check(false).build().unwrap();
    let resolution = resolve(&dir, "a.gyp", &config).unwrap();
    assert_eq!(resolution.flat_list.len(), 4);
}

#[test]
fn target_cycles() {
    let dir = fixture(&[(
        "x.gyp",
        "{'targets': [
           {'target_name': 'A', 'type': 'none', 'dependencies': ['B']},
           {'target_name': 'B', 'type': 'none', 'dependencies': ['A']},
         ]}",
    )]);
    let r = root(&dir);
    let err = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Cycles in dependency graph detected:\nCycle: {r}/x.gyp:A#target -> {r}/x.gyp:B#target -> {r}/x.gyp:A#target")
    );
}

#[test]
fn colliding_target_names_in_one_directory() {
    let dir = fixture(&[
        (
            "a.gyp",
            "{'targets': [{'target_name': 'dup', 'type': 'none', 'dependencies': ['b.gyp:dup']}]}",
        ),
        ("b.gyp", "{'targets': [{'target_name': 'dup', 'type': 'none'}]}"),
    ]);
    let r = root(&dir);
    let err = resolve(&dir, "a.gyp", &ResolverConfig::default()).unwrap_err();
    assert_eq!(
        err.to_string(),
        format!("Duplicate target name \"dup\" in directory \"{r}\" used both in \"b.gyp\" and \"a.gyp\"")
    );
}

#[test]
fn missing_dependency_file_is_reported_with_context() {
    let dir = fixture(&[(
        "app.gyp",
        "{'targets': [{'target_name': 'app', 'type': 'none', 'dependencies': ['missing.gyp:x']}]}",
    )]);
    let r = root(&dir);
    let err = resolve(&dir, "app.gyp", &ResolverConfig::default()).unwrap_err();

    assert_eq!(
        format!("{err:#}"),
        format!(
            "while trying to load {r}/app.gyp: while loading dependencies of {r}/app.gyp: \
             {r}/missing.gyp not found: {}",
            err.root_cause()
        )
    );
    assert!(matches!(
        err.downcast_ref::<GypError>(),
        Some(GypError::MissingBuildFile { .. })
    ));
}

#[test]
fn command_substitution_runs_in_the_build_file_directory() {
    let dir = fixture(&[
        ("marker.txt", "from-file\n"),
        (
            "x.gyp",
            "{'targets': [{'target_name': 'x', 'type': 'none',
               'product_name': '<!(cat marker.txt)',
               'defines': ['<!@(echo A B)']}]}",
        ),
    ]);
    let r = root(&dir);
    let resolution = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap();
    let target = format!("{r}/x.gyp:x#target");

    assert_eq!(
        resolution.targets[&target]["product_name"],
        Value::from("from-file")
    );
    assert_eq!(
        strings(default_configuration(&resolution, &target).get("defines")),
        ["A", "B"]
    );
}

#[test]
fn late_phases_see_the_final_settings() {
    let dir = fixture(&[(
        "x.gyp",
        r#"{'targets': [{'target_name': 'x', 'type': 'none',
             'variables': {'mode': 'late'},
             'defines': ['MODE_>(mode)', 'LAST_^(_type)'],
             'target_conditions': [['_type=="none"', {'defines': ['NONE']}]]}]}"#,
    )]);
    let r = root(&dir);
    let resolution = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap();
    let target = format!("{r}/x.gyp:x#target");

    assert_eq!(
        strings(default_configuration(&resolution, &target).get("defines")),
        ["MODE_late", "LAST_none", "NONE"]
    );
    assert!(!resolution.targets[&target].contains_key("target_conditions"));
}

#[test]
fn configurations_inherit() {
    let dir = fixture(&[(
        "x.gyp",
        "{'targets': [{'target_name': 'x', 'type': 'none', 'defines': ['T'],
           'configurations': {
             'Common': {'abstract': 1, 'defines': ['COMMON']},
             'Debug': {'inherit_from': ['Common'], 'defines': ['DEBUG']},
             'Release': {'inherit_from': ['Common']},
           }}]}",
    )]);
    let r = root(&dir);
    let resolution = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap();
    let spec = &resolution.targets[&format!("{r}/x.gyp:x#target")];

    assert_eq!(spec["default_configuration"], Value::from("Debug"));
    assert!(!spec.contains_key("defines"));

    let configurations = spec["configurations"].as_map().unwrap();
    assert_eq!(
        configurations.keys().collect::<Vec<_>>(),
        ["Debug", "Release"]
    );
    let defines = |name: &str| strings(configurations[name].as_map().unwrap().get("defines"));
    assert_eq!(defines("Debug"), ["T", "COMMON", "DEBUG"]);
    assert_eq!(defines("Release"), ["T", "COMMON"]);
}

#[test]
fn root_targets_prune_the_output() {
    let dir = fixture(&[(
        "x.gyp",
        "{'targets': [
           {'target_name': 'base', 'type': 'none'},
           {'target_name': 'app', 'type': 'none', 'dependencies': ['base']},
           {'target_name': 'other', 'type': 'none'},
         ]}",
    )]);
    let r = root(&dir);
    let config = ResolverConfig::builder()
        .root_targets(vec!["app".to_string()])
        .build()
        .unwrap();
    let resolution = resolve(&dir, "x.gyp", &config).unwrap();

    assert_eq!(
        resolution.flat_list,
        [format!("{r}/x.gyp:base#target"), format!("{r}/x.gyp:app#target")]
    );
    assert!(!resolution.targets.contains_key(&format!("{r}/x.gyp:other#target")));
}

#[test]
fn stringified_integers() {
    let dir = fixture(&[(
        "x.gyp",
        "{'targets': [{'target_name': 'x', 'type': 'none', 'product_name': '<(n)',
           'variables': {'n': '7'}}]}",
    )]);
    let r = root(&dir);
    let target = format!("{r}/x.gyp:x#target");

    let plain = resolve(&dir, "x.gyp", &ResolverConfig::default()).unwrap();
    assert_eq!(plain.targets[&target]["product_name"], Value::Int(7));

    let config = ResolverConfig::builder().stringify_integers(true).build().unwrap();
    let stringified = resolve(&dir, "x.gyp", &config).unwrap();
    assert_eq!(stringified.targets[&target]["product_name"], Value::from("7"));
}

#[test]
fn invalid_documents() {
    let dir = fixture(&[
        ("list.gyp", "['not', 'a', 'dict']"),
        ("broken.gyp", "{'targets': ["),
        ("bad_type.gyp", "{'targets': [{'target_name': 'x', 'type': 'program'}]}"),
        (
            "bad_dep.gyp",
            "{'targets': [{'target_name': 'x', 'type': 'none', 'dependencies': ['y', 1]}]}",
        ),
    ]);

    let err = resolve(&dir, "list.gyp", &ResolverConfig::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GypError>(),
        Some(GypError::NotADictionary { .. })
    ));

    let err = resolve(&dir, "broken.gyp", &ResolverConfig::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GypError>(),
        Some(GypError::Syntax { .. })
    ));

    let err = resolve(&dir, "bad_type.gyp", &ResolverConfig::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GypError>(),
        Some(GypError::InvalidTargetType { .. })
    ));

    let err = resolve(&dir, "bad_dep.gyp", &ResolverConfig::default()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<GypError>(),
        Some(GypError::TypeMismatch(message))
            if message.starts_with("dependencies of target x in ")
                && message.ends_with("must only hold strings, found a int")
    ));
}

#[test]
fn file_lists_land_next_to_the_build_file() {
    let dir = fixture(&[(
        "sub/x.gyp",
        "{'targets': [{'target_name': 'x', 'type': 'none',
           'variables': {'srcs': ['a.c', 'b.c']},
           'inputs': ['<|(srcs.txt <@(srcs))']}]}",
    )]);
    resolve(&dir, "sub/x.gyp", &ResolverConfig::default()).unwrap();
    assert_eq!(
        fs::read_to_string(Path::new(&root(&dir)).join("sub/srcs.txt")).unwrap(),
        "a.c\nb.c\n"
    );
}
