use std::fmt;
use std::io;

use gypsum_syntax::SyntaxError;
use itertools::Itertools;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleLevel {
    Target,
    BuildFile,
}

impl fmt::Display for CycleLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleLevel::Target => f.write_str("dependency graph"),
            CycleLevel::BuildFile => f.write_str(".gyp file dependency graph"),
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    cycles
        .iter()
        .map(|cycle| format!("Cycle: {}", cycle.join(" -> ")))
        .join("\n")
}

#[derive(Error, Debug)]
pub enum GypError {
    #[error("{file}: {source}")]
    Syntax { file: String, source: SyntaxError },

    #[error("{path} not found")]
    MissingBuildFile { path: String, source: io::Error },

    #[error("{path} does not evaluate to a dictionary")]
    NotADictionary { path: String },

    #[error("Undefined variable {name} in {build_file}")]
    UndefinedVariable { name: String, build_file: String },

    #[error("{0}")]
    TypeMismatch(String),

    #[error("Incompatible list policies {key} and {other}")]
    IncompatibleListPolicy { key: String, other: String },

    #[error("Duplicate target definitions for {0}")]
    DuplicateTargetDefinition(String),

    #[error(
        "Duplicate target name \"{name}\" in directory \"{directory}\" used both in \"{first}\" and \"{second}\""
    )]
    DuplicateTarget {
        name: String,
        directory: String,
        first: String,
        second: String,
    },

    #[error("rule {rule} exists in duplicate, target {target}")]
    DuplicateRuleName { rule: String, target: String },

    #[error(
        "extension {extension} associated with multiple rules, target {target} rules {first} and {second}"
    )]
    DuplicateRuleExtension {
        extension: String,
        target: String,
        first: String,
        second: String,
    },

    #[error("Dependency '{dependency}' not found while trying to load target {target}")]
    MissingDependency { dependency: String, target: String },

    #[error("Cycles in {level} detected:\n{}", format_cycles(.cycles))]
    DependencyCycle {
        level: CycleLevel,
        cycles: Vec<Vec<String>>,
    },

    #[error("Target {target} has an invalid target type '{found}'. Must be one of {allowed}.")]
    InvalidTargetType {
        target: String,
        found: String,
        allowed: String,
    },

    #[error("{key} not allowed in the {configuration} configuration, found in target {target}")]
    InvalidConfigurationKey {
        key: String,
        configuration: String,
        target: String,
    },

    #[error("Configuration inheritance cycle in target {target}: {}", .chain.join(" -> "))]
    ConfigurationCycle { target: String, chain: Vec<String> },

    #[error("{reason} in target {target}")]
    MalformedAction { target: String, reason: String },

    #[error("{reason} in target {target} in {build_file}")]
    MalformedRunAs {
        target: String,
        build_file: String,
        reason: String,
    },

    #[error("{message} while evaluating condition '{condition}' in {build_file}")]
    ConditionSyntax {
        condition: String,
        build_file: String,
        message: String,
    },

    #[error("{message} while evaluating condition '{condition}' in {build_file}")]
    ConditionEvaluation {
        condition: String,
        build_file: String,
        message: String,
    },

    #[error("Call to '{command}' returned exit status {status} while in {build_file}.{}", stderr_suffix(.stderr))]
    CommandFailed {
        command: String,
        build_file: String,
        status: i32,
        stderr: String,
    },

    #[error("Unable to run '{command}' while in {build_file}")]
    CommandSpawn {
        command: String,
        build_file: String,
        source: io::Error,
    },

    #[error("Expansion of '{input}' in {build_file} recursed too deeply")]
    RecursiveExpansion { input: String, build_file: String },

    #[error("{0}")]
    Invalid(String),
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.trim().is_empty() {
        String::new()
    } else {
        format!(" stderr: {}", stderr.trim_end())
    }
}

pub type GypResult<T> = anyhow::Result<T>;
