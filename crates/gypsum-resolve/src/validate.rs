//! Final shape checks on fully resolved targets.

use std::collections::{HashMap, HashSet};

use gypsum_syntax::{Map, Value};
use gypsum_util::path::split_ext;

use crate::errors::{GypError, GypResult};
use crate::target::{flag, TargetType};

pub fn validate_target_type(target: &str, target_dict: &Map) -> GypResult<()> {
    let found = target_dict.get("type");
    let kind = found
        .and_then(Value::as_str)
        .and_then(|t| t.parse::<TargetType>().ok())
        .ok_or_else(|| GypError::InvalidTargetType {
            target: target.to_string(),
            found: found.map(Value::to_plain_string).unwrap_or_else(|| "None".into()),
            allowed: TargetType::allowed(),
        })?;

    if flag(target_dict, "standalone_static_library", false) && kind != TargetType::StaticLibrary {
        return Err(GypError::Invalid(format!(
            "Target {target} has type {kind} but standalone_static_library flag is only valid for static_library type."
        ))
        .into());
    }
    Ok(())
}

fn rule_string<'m>(rule: &'m Map, key: &str, target: &str) -> GypResult<&'m str> {
    rule.get(key).and_then(Value::as_str).ok_or_else(|| {
        GypError::Invalid(format!("A rule in target {target} has no string {key}")).into()
    })
}

/// Check rule names and extensions for uniqueness and give each rule the `rule_sources` it
/// applies to.
pub fn validate_rules_in_target(
    target: &str,
    target_dict: &mut Map,
    extra_sources_for_rules: &[String],
) -> GypResult<()> {
    let source_keys: Vec<&str> = std::iter::once("sources")
        .chain(extra_sources_for_rules.iter().map(String::as_str))
        .collect();
    let sources: Vec<String> = source_keys
        .iter()
        .filter_map(|key| target_dict.get(*key).and_then(Value::as_list))
        .flatten()
        .filter_map(|s| s.as_str().map(String::from))
        .collect();

    let Some(rules) = target_dict.get_mut("rules") else {
        return Ok(());
    };
    let Some(rules) = rules.as_list_mut() else {
        return Err(GypError::TypeMismatch(format!("rules of target {target} must be a list")).into());
    };

    let mut rule_names: HashSet<String> = HashSet::new();
    let mut rule_extensions: HashMap<String, String> = HashMap::new();
    for rule in rules.iter_mut() {
        let Some(rule) = rule.as_map_mut() else {
            return Err(GypError::TypeMismatch(format!("A rule in target {target} is not a dict")).into());
        };

        let rule_name = rule_string(rule, "rule_name", target)?.to_string();
        if !rule_names.insert(rule_name.clone()) {
            return Err(GypError::DuplicateRuleName {
                rule: rule_name,
                target: target.to_string(),
            }
            .into());
        }

        let extension = rule_string(rule, "extension", target)?;
        let extension = extension.strip_prefix('.').unwrap_or(extension).to_string();
        if let Some(first) = rule_extensions.get(&extension) {
            return Err(GypError::DuplicateRuleExtension {
                extension,
                target: target.to_string(),
                first: first.clone(),
                second: rule_name,
            }
            .into());
        }
        rule_extensions.insert(extension.clone(), rule_name.clone());

        if rule.contains_key("rule_sources") {
            return Err(GypError::Invalid(format!(
                "rule_sources must not exist in input, target {target} rule {rule_name}"
            ))
            .into());
        }

        let rule_sources: Vec<Value> = sources
            .iter()
            .filter(|source| {
                let (_, ext) = split_ext(source);
                ext.strip_prefix('.').unwrap_or(ext) == extension
            })
            .map(|source| Value::Str(source.clone()))
            .collect();
        if !rule_sources.is_empty() {
            rule.insert("rule_sources".into(), Value::List(rule_sources));
        }
    }
    Ok(())
}

pub fn validate_run_as_in_target(target: &str, target_dict: &Map, build_file: &str) -> GypResult<()> {
    let Some(run_as) = target_dict.get("run_as") else {
        return Ok(());
    };
    let malformed = |reason: &str| -> anyhow::Error {
        GypError::MalformedRunAs {
            target: target.to_string(),
            build_file: build_file.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    let Value::Map(run_as) = run_as else {
        return Err(malformed("The 'run_as' section should be a dictionary"));
    };
    match run_as.get("action") {
        Some(Value::List(action)) if !action.is_empty() => {}
        Some(Value::List(_)) | None => {
            return Err(malformed("The 'run_as' section must have an 'action' section"))
        }
        Some(_) => return Err(malformed("The 'action' for 'run_as' must be a list")),
    }
    if run_as
        .get("working_directory")
        .is_some_and(|w| !matches!(w, Value::Str(_)))
    {
        return Err(malformed("The 'working_directory' for 'run_as' must be a string"));
    }
    if run_as
        .get("environment")
        .is_some_and(|e| !matches!(e, Value::Map(_)))
    {
        return Err(malformed("The 'environment' for 'run_as' must be a dictionary"));
    }
    Ok(())
}

pub fn validate_actions_in_target(target: &str, target_dict: &Map) -> GypResult<()> {
    let Some(actions) = target_dict.get("actions").and_then(Value::as_list) else {
        return Ok(());
    };
    let malformed = |reason: &str| -> anyhow::Error {
        GypError::MalformedAction {
            target: target.to_string(),
            reason: reason.to_string(),
        }
        .into()
    };

    for action in actions {
        let Some(action) = action.as_map() else {
            return Err(malformed("Action is not a dictionary"));
        };
        if !action.get("action_name").is_some_and(Value::is_truthy) {
            return Err(malformed(
                "Anonymous action; an action must have an 'action_name' field",
            ));
        }
        if !matches!(action.get("inputs"), Some(Value::List(inputs)) if !inputs.is_empty()) {
            return Err(malformed("Action has no inputs"));
        }
        let Some(Value::List(command)) = action.get("action") else {
            return Err(malformed("Action has no command list"));
        };
        if !command.first().is_some_and(Value::is_truthy) {
            return Err(malformed("Empty action as command"));
        }
    }
    Ok(())
}
