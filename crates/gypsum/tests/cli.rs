use std::fs;
use std::process::{Command, Output};

use gypsum_syntax::{parse, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const X_GYP: &str = r#"{
  'variables': {'OS%': 'linux'},
  'targets': [
    {'target_name': 'a', 'type': 'static_library'},
    {
      'target_name': 'b',
      'type': 'executable',
      'dependencies': ['a'],
      'conditions': [['OS=="mac"', {'product_name': 'b_mac'}]],
    },
  ],
}"#;

fn fixture() -> (TempDir, String) {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.gyp"), X_GYP).unwrap();
    let build_file = format!("{}/x.gyp", dir.path().to_string_lossy());
    (dir, build_file)
}

fn gypsum(args: &[&str], gyp_defines: Option<&str>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_gypsum"));
    command.args(args).env_remove("RUST_LOG");
    match gyp_defines {
        Some(defines) => command.env("GYP_DEFINES", defines),
        None => command.env_remove("GYP_DEFINES"),
    };
    command.output().unwrap()
}

#[test]
fn order_prints_dependencies_first() {
    let (_dir, build_file) = fixture();
    let output = gypsum(&["order", &build_file], None);
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("{build_file}:a#target\n{build_file}:b#target\n")
    );
}

#[test]
fn dump_applies_defines() {
    let (_dir, build_file) = fixture();
    let output = gypsum(&["dump", "-D", "OS=mac", &build_file], Some("OS=win"));
    assert!(output.status.success());

    let dumped = parse(&String::from_utf8_lossy(&output.stdout)).unwrap();
    let b = dumped
        .as_map()
        .and_then(|m| m.get(&format!("{build_file}:b#target")))
        .and_then(Value::as_map)
        .unwrap();
    assert_eq!(b.get("product_name"), Some(&Value::from("b_mac")));
}

#[test]
fn missing_build_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let missing = format!("{}/missing.gyp", dir.path().to_string_lossy());
    let output = gypsum(&["order", &missing], None);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains(&format!("{missing} not found")));
}
