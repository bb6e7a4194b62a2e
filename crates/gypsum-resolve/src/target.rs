use std::fmt;
use std::str::FromStr;

use gypsum_syntax::{Map, Value};
use indexmap::IndexMap;
use itertools::Itertools;

use crate::errors::{GypError, GypResult};

/// Resolved targets keyed by qualified name.
pub type Targets = IndexMap<String, Map>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Executable,
    LoadableModule,
    StaticLibrary,
    SharedLibrary,
    MacKernelExtension,
    None,
}

impl TargetType {
    pub const ALL: [TargetType; 6] = [
        TargetType::Executable,
        TargetType::LoadableModule,
        TargetType::StaticLibrary,
        TargetType::SharedLibrary,
        TargetType::MacKernelExtension,
        TargetType::None,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TargetType::Executable => "executable",
            TargetType::LoadableModule => "loadable_module",
            TargetType::StaticLibrary => "static_library",
            TargetType::SharedLibrary => "shared_library",
            TargetType::MacKernelExtension => "mac_kernel_extension",
            TargetType::None => "none",
        }
    }

    /// Types that produce a final link. Static libraries are archives, not links.
    pub fn is_linkable(self) -> bool {
        matches!(
            self,
            TargetType::Executable
                | TargetType::SharedLibrary
                | TargetType::LoadableModule
                | TargetType::MacKernelExtension
        )
    }

    pub fn allowed() -> String {
        TargetType::ALL.iter().map(|t| t.as_str()).join(", ")
    }
}

impl FromStr for TargetType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn get_target<'t>(targets: &'t Targets, name: &str) -> GypResult<&'t Map> {
    targets.get(name).ok_or_else(|| {
        GypError::Invalid(format!("Target {name} is not among the loaded targets")).into()
    })
}

/// The declared `type` of the target `name`.
pub fn target_type(targets: &Targets, name: &str) -> GypResult<TargetType> {
    let spec = get_target(targets, name)?;
    if !spec.contains_key("target_name") {
        return Err(GypError::Invalid(format!("Missing 'target_name' field in target {name}")).into());
    }

    match spec.get("type") {
        None => Err(GypError::Invalid(format!("Missing 'type' field in target {name}")).into()),
        Some(Value::Str(t)) => t.parse().map_err(|_| {
            GypError::InvalidTargetType {
                target: name.to_string(),
                found: t.clone(),
                allowed: TargetType::allowed(),
            }
            .into()
        }),
        Some(other) => Err(GypError::InvalidTargetType {
            target: name.to_string(),
            found: other.to_plain_string(),
            allowed: TargetType::allowed(),
        }
        .into()),
    }
}

/// String entries of the list under `key`; missing keys are empty.
pub fn string_list(spec: &Map, key: &str) -> Vec<String> {
    spec.get(key)
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(|i| i.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

/// Like [`string_list`], but anything other than a list of strings under `key` is an error
/// naming `owner`.
pub fn checked_string_list(spec: &Map, key: &str, owner: &str) -> GypResult<Vec<String>> {
    let items = match spec.get(key) {
        None => return Ok(vec![]),
        Some(Value::List(items)) => items,
        Some(other) => {
            return Err(GypError::TypeMismatch(format!(
                "{key} of {owner} must be a list, found a {}",
                other.type_name()
            ))
            .into())
        }
    };

    items
        .iter()
        .map(|item| match item {
            Value::Str(s) => Ok(s.clone()),
            other => Err(GypError::TypeMismatch(format!(
                "{key} of {owner} must only hold strings, found a {}",
                other.type_name()
            ))
            .into()),
        })
        .collect()
}

/// `spec[section][key]` read as a switch, or `default` when absent.
pub fn nested_flag(spec: &Map, section: &str, key: &str, default: bool) -> bool {
    spec.get(section)
        .and_then(Value::as_map)
        .and_then(|m| m.get(key))
        .map_or(default, Value::as_flag)
}

pub fn flag(spec: &Map, key: &str, default: bool) -> bool {
    spec.get(key).map_or(default, Value::as_flag)
}
