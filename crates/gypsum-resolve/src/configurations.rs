//! Folding target-level settings into named configurations.

use gypsum_syntax::{Map, Value};
use tracing::trace;

use crate::config::{ResolverConfig, INVALID_CONFIGURATION_KEYS};
use crate::errors::{GypError, GypResult};
use crate::merge::merge_dicts;
use crate::qualified::build_file;
use crate::target::{flag, string_list};

const KEY_SUFFIXES: [char; 5] = ['=', '+', '?', '!', '/'];

fn key_base(key: &str) -> &str {
    match key.strip_suffix(KEY_SUFFIXES) {
        Some(base) => base,
        None => key,
    }
}

fn is_abstract(configuration: &Value) -> bool {
    configuration.as_map().is_some_and(|c| flag(c, "abstract", false))
}

/// Merge `configuration` into `merged` after everything it inherits from.
///
/// `chain` holds the configurations already on the inheritance path.
fn merge_config_with_inheritance(
    merged: &mut Map,
    build_file: &str,
    target: &str,
    configurations: &Map,
    configuration: &str,
    chain: &mut Vec<String>,
    config: &ResolverConfig,
) -> GypResult<()> {
    if chain.iter().any(|c| c == configuration) {
        let mut cycle = chain.clone();
        cycle.push(configuration.to_string());
        return Err(GypError::ConfigurationCycle {
            target: target.to_string(),
            chain: cycle,
        }
        .into());
    }

    let Some(Value::Map(configuration_dict)) = configurations.get(configuration) else {
        return Err(GypError::Invalid(format!(
            "Configuration {configuration} of target {target} is not defined or not a dict"
        ))
        .into());
    };

    chain.push(configuration.to_string());
    for parent in string_list(configuration_dict, "inherit_from") {
        merge_config_with_inheritance(
            merged,
            build_file,
            target,
            configurations,
            &parent,
            chain,
            config,
        )?;
    }
    chain.pop();

    merge_dicts(merged, configuration_dict, build_file, build_file, config)?;
    merged.shift_remove("abstract");
    Ok(())
}

/// Give the target its final `configurations`: one entry per concrete configuration holding a
/// copy of every configuration-scoped target setting merged with the configuration's own
/// settings. Configuration-scoped keys are then removed from the target itself.
pub fn set_up_configurations(
    target: &str,
    target_dict: &mut Map,
    config: &ResolverConfig,
) -> GypResult<()> {
    let build_file = build_file(target).unwrap_or_default();

    if !target_dict.contains_key("configurations") {
        let mut default = Map::new();
        default.insert("Default".into(), Value::Map(Map::new()));
        target_dict.insert("configurations".into(), Value::Map(default));
    }

    let configurations = match target_dict.get("configurations") {
        Some(Value::Map(configurations)) => configurations.clone(),
        Some(other) => {
            return Err(GypError::TypeMismatch(format!(
                "configurations of {target} must be a dict, found a {}",
                other.type_name()
            ))
            .into())
        }
        None => Map::new(),
    };

    if !target_dict.contains_key("default_configuration") {
        let first = configurations
            .iter()
            .filter(|(_, c)| !is_abstract(c))
            .map(|(name, _)| name)
            .min()
            .ok_or_else(|| {
                GypError::Invalid(format!("Target {target} has no concrete configurations"))
            })?;
        target_dict.insert("default_configuration".into(), Value::Str(first.clone()));
    }

    let mut concrete = Map::new();
    for (name, configuration) in &configurations {
        if is_abstract(configuration) {
            continue;
        }

        let mut merged: Map = target_dict
            .iter()
            .filter(|(key, _)| !config.is_non_configuration_key(key_base(key)))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        merge_config_with_inheritance(
            &mut merged,
            &build_file,
            target,
            &configurations,
            name,
            &mut vec![],
            config,
        )?;
        trace!(target, configuration = name, "Merged configuration");
        concrete.insert(name.clone(), Value::Map(merged));
    }

    target_dict.retain(|key, _| config.is_non_configuration_key(key_base(key)));

    for (name, configuration) in &concrete {
        let Some(configuration) = configuration.as_map() else {
            continue;
        };
        if let Some(key) = configuration
            .keys()
            .find(|key| INVALID_CONFIGURATION_KEYS.contains(&key.as_str()))
        {
            return Err(GypError::InvalidConfigurationKey {
                key: key.clone(),
                configuration: name.clone(),
                target: target.to_string(),
            }
            .into());
        }
    }

    target_dict.insert("configurations".into(), Value::Map(concrete));
    Ok(())
}
