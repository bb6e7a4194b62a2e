//! Inputs that shape a resolution run but never change during it.

use std::collections::HashSet;

use derive_builder::Builder;

/// Keys whose values are paths relative to the file that declares them.
pub const BASE_PATH_SECTIONS: &[&str] = &[
    "destination",
    "files",
    "include_dirs",
    "inputs",
    "libraries",
    "outputs",
    "sources",
];

/// Keys that stay on the target itself instead of being copied into each configuration.
pub const BASE_NON_CONFIGURATION_KEYS: &[&str] = &[
    // Sections that must be present in all targets.
    "configurations",
    "default_configuration",
    "target_name",
    "type",
    // Sections that can be present in any target.
    "actions",
    "all_dependent_settings",
    "copies",
    "dependencies",
    "dependencies_original",
    "direct_dependent_settings",
    "link_settings",
    "postbuilds",
    "rules",
    "run_as",
    "sources",
    "standalone_static_library",
    "suppress_wildcard",
    "toolset",
    "toolsets",
    "variables",
    // Sections added during loading.
    "included_files",
    "libraries",
    "product_dir",
    "product_extension",
    "product_name",
    "product_prefix",
];

/// Keys that may only appear at target scope, never inside a configuration.
pub const INVALID_CONFIGURATION_KEYS: &[&str] = &[
    "actions",
    "all_dependent_settings",
    "configurations",
    "dependencies",
    "direct_dependent_settings",
    "libraries",
    "link_settings",
    "sources",
    "standalone_static_library",
    "target_name",
    "type",
];

/// Where generated file lists (`<|(...)`) are written when the backend wants them kept out of
/// the source tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileListPaths {
    pub toplevel: String,
    pub qualified_out_dir: String,
}

/// What the backend generator needs from, and tells, the resolver.
#[derive(Builder, Clone, Debug)]
#[builder(default, setter(into))]
pub struct GeneratorInputInfo {
    /// Extra path-valued keys on top of [`BASE_PATH_SECTIONS`].
    pub path_sections: HashSet<String>,
    /// Extra keys on top of [`BASE_NON_CONFIGURATION_KEYS`].
    pub non_configuration_keys: Vec<String>,
    pub supports_multiple_toolsets: bool,
    pub adjust_static_libraries: bool,
    pub sort_dependencies: bool,
    /// Extra list keys whose entries are matched against rule extensions.
    pub extra_sources_for_rules: Vec<String>,
    pub filelist_paths: Option<FileListPaths>,
}

impl Default for GeneratorInputInfo {
    fn default() -> Self {
        Self {
            path_sections: HashSet::new(),
            non_configuration_keys: vec![],
            supports_multiple_toolsets: false,
            adjust_static_libraries: true,
            sort_dependencies: false,
            extra_sources_for_rules: vec![],
            filelist_paths: None,
        }
    }
}

#[derive(Builder, Clone, Debug)]
#[builder(default, setter(into))]
pub struct ResolverConfig {
    pub generator: GeneratorInputInfo,
    /// Restrict the output to these targets and their dependencies.
    pub root_targets: Vec<String>,
    /// Reject dependency cycles between build files, not just between targets.
    pub circular_check: bool,
    /// Turn every integer in the resolved targets into its decimal string.
    pub stringify_integers: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorInputInfo::default(),
            root_targets: vec![],
            circular_check: true,
            stringify_integers: false,
        }
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::default()
    }

    /// Whether values under `section` are paths, ignoring any `= + ? !` policy suffix.
    pub fn is_path_section(&self, section: &str) -> bool {
        let section = section.trim_end_matches(['=', '+', '?', '!']);
        if BASE_PATH_SECTIONS.contains(&section) || self.generator.path_sections.contains(section)
        {
            return true;
        }

        if !section.contains('_') {
            return false;
        }

        let tail = section.strip_suffix('s').unwrap_or(section);
        tail.ends_with("_file") || tail.ends_with("_path") || tail.ends_with("_dir")
    }

    pub fn is_non_configuration_key(&self, key: &str) -> bool {
        BASE_NON_CONFIGURATION_KEYS.contains(&key)
            || self.generator.non_configuration_keys.iter().any(|k| k == key)
    }

    pub fn multiple_toolsets(&self) -> bool {
        self.generator.supports_multiple_toolsets
    }
}
