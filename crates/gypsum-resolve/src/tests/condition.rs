use gypsum_syntax::Value;
use pretty_assertions::assert_eq;

use crate::condition::{compile, evaluate, Operand};
use crate::variables::Scope;

fn scope() -> Scope {
    let mut scope = Scope::new();
    scope.insert("OS".into(), Value::from("linux"));
    scope.insert("use_x".into(), Value::Int(0));
    scope.insert("level".into(), Value::Int(2));
    scope.insert(
        "archs".into(),
        Value::List(vec![Value::from("x64"), Value::from("arm64")]),
    );
    scope
}

fn eval(text: &str) -> Result<Operand, String> {
    evaluate(&compile(text)?, &scope())
}

fn truthy(text: &str) -> bool {
    eval(text).unwrap().is_truthy()
}

#[test]
fn equality_and_boolean_operators() {
    assert!(truthy(r#"OS=="linux""#));
    assert!(!truthy(r#"OS!="linux""#));
    assert!(truthy(r#"OS=="linux" and not use_x"#));
    assert!(truthy(r#"OS=="mac" or level==2"#));
    assert!(!truthy("use_x==1 and undefined_name"));
}

#[test]
fn membership() {
    assert!(truthy(r#"OS in ("linux", "android")"#));
    assert!(truthy(r#"OS not in ["win", "mac"]"#));
    assert!(truthy(r#""arm64" in archs"#));
    assert!(truthy(r#""in" in "linux""#));
    assert!(truthy(r#""b" in "a b c".split()"#));
    assert!(truthy(r#""c" in "a,b,c".split(",")"#));
}

#[test]
fn comparison_chains_and_numbers() {
    assert!(truthy("1 < level <= 2"));
    assert!(!truthy("1 < level < 2"));
    assert!(truthy("level > -1"));
    assert!(truthy("level == 2 == 2"));
}

#[test]
fn and_or_yield_the_deciding_operand() {
    assert_eq!(eval(r#""" or "x""#).unwrap(), Operand::Str("x".into()));
    assert_eq!(eval("0 and 5").unwrap(), Operand::Int(0));
    assert_eq!(eval("not 0").unwrap(), Operand::Bool(true));
}

#[test]
fn adjacent_strings_concatenate() {
    assert!(truthy(r#"OS == "li" "nux""#));
}

#[test]
fn undefined_names_fail() {
    assert_eq!(eval("missing").unwrap_err(), "name 'missing' is not defined");
}

#[test]
fn ordering_across_types_fails() {
    assert_eq!(
        eval("OS < 1").unwrap_err(),
        "'<' not supported between instances of 'str' and 'int'"
    );
}

#[test]
fn syntax_errors() {
    assert!(compile("OS ==").is_err());
    assert!(compile("(OS").is_err());
    assert!(compile("OS.lower()").is_err());
    assert!(compile("OS == 'linux' )").is_err());
}
