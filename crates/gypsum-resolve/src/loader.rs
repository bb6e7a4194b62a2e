//! Reading build files, merging their includes and running the whole resolution pipeline.

use std::collections::HashMap;
use std::fs;

use anyhow::Context;
use gypsum_syntax::{parse, Map, Value};
use gypsum_util::path::{dirname, join, normpath, relative_path};
use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::command::RunCache;
use crate::config::ResolverConfig;
use crate::configurations::set_up_configurations;
use crate::dependent_settings::{
    adjust_static_library_dependencies, propagate_dependent_settings, prune_to_roots,
};
use crate::errors::{CycleLevel, GypError, GypResult};
use crate::expand::{Expander, Phase};
use crate::filter::process_list_filters_in_dict;
use crate::graph::DependencyGraph;
use crate::merge::merge_dicts;
use crate::qualified::{build_file, resolve_target};
use crate::target::{checked_string_list, string_list, Targets};
use crate::targets::{
    build_targets_dict, expand_wildcard_dependencies, filter_dependency_sections,
    qualify_dependencies, remove_duplicate_dependencies,
    remove_link_dependencies_from_none_targets, remove_self_dependencies, stringify_integers,
    verify_no_colliding_targets, verify_no_gyp_file_circular_dependencies,
};
use crate::validate::{
    validate_actions_in_target, validate_rules_in_target, validate_run_as_in_target,
    validate_target_type,
};
use crate::variables::{scope_from_map, Scope};

/// The outcome of a resolution run.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Qualified target names, every target after all of its dependencies.
    pub flat_list: Vec<String>,
    /// Fully resolved targets keyed by qualified name.
    pub targets: Targets,
    /// Every document read, keyed by normalized path. Target build files hold their resolved
    /// targets.
    pub documents: IndexMap<String, Map>,
}

/// Split `toolsets` lists into one copy of the target per toolset.
///
/// Without multiple toolset support every target gets the single toolset `target`. A target
/// that already names its `toolset` and lists no `toolsets` is left alone.
pub fn process_toolsets_in_dict(data: &mut Map, multiple_toolsets: bool) {
    if let Some(Value::List(targets)) = data.get_mut("targets") {
        let mut expanded = Vec::with_capacity(targets.len());
        for target in std::mem::take(targets) {
            let Value::Map(mut target) = target else {
                expanded.push(target);
                continue;
            };
            if target.contains_key("toolset") && !target.contains_key("toolsets") {
                expanded.push(Value::Map(target));
                continue;
            }

            let toolsets = match target.get("toolsets") {
                Some(_) if multiple_toolsets => string_list(&target, "toolsets"),
                _ => vec!["target".to_string()],
            };
            target.shift_remove("toolsets");

            if let Some((first, rest)) = toolsets.split_first() {
                for toolset in rest {
                    let mut copy = target.clone();
                    copy.insert("toolset".into(), Value::Str(toolset.clone()));
                    expanded.push(Value::Map(copy));
                }
                target.insert("toolset".into(), Value::Str(first.clone()));
                expanded.push(Value::Map(target));
            }
        }
        *targets = expanded;
    }

    if let Some(Value::List(conditions)) = data.get_mut("conditions") {
        for condition in conditions {
            let Value::List(branches) = condition else {
                continue;
            };
            for branch in branches.iter_mut().skip(1) {
                if let Value::Map(branch) = branch {
                    process_toolsets_in_dict(branch, multiple_toolsets);
                }
            }
        }
    }
}

/// Loads build files and everything they include or depend on, each exactly once.
pub struct Loader<'r> {
    config: &'r ResolverConfig,
    expander: Expander<'r>,
    variables: Scope,
    includes: Vec<String>,
    depth: Option<String>,
    documents: IndexMap<String, Map>,
    /// Files included directly by each loaded file, in include order.
    included: HashMap<String, Vec<String>>,
    target_build_files: IndexSet<String>,
}

impl<'r> Loader<'r> {
    pub fn new(
        config: &'r ResolverConfig,
        cache: &'r RunCache,
        variables: &Map,
        includes: &[String],
        depth: Option<&str>,
    ) -> Self {
        Self {
            config,
            expander: Expander::new(config, cache),
            variables: scope_from_map(variables),
            includes: includes.to_vec(),
            depth: depth.map(String::from),
            documents: IndexMap::new(),
            included: HashMap::new(),
            target_build_files: IndexSet::new(),
        }
    }

    pub fn documents(&self) -> &IndexMap<String, Map> {
        &self.documents
    }

    pub fn target_build_files(&self) -> &IndexSet<String> {
        &self.target_build_files
    }

    /// Variables for a target declared in `build_file`.
    fn variables_for(&self, build_file: &str) -> Scope {
        let mut variables = self.variables.clone();
        if let Some(depth) = &self.depth {
            variables.insert(
                "DEPTH".into(),
                Value::Str(crate::variables::depth_for(depth, build_file)),
            );
        }
        variables
    }

    /// Parse `path` and merge its includes. Target build files also receive the global
    /// includes.
    pub fn load_one_build_file(&mut self, path: &str, is_target: bool) -> GypResult<Map> {
        if let Some(document) = self.documents.get(path) {
            return Ok(document.clone());
        }

        let text = fs::read_to_string(path).map_err(|source| GypError::MissingBuildFile {
            path: path.to_string(),
            source,
        })?;
        let parsed = parse(&text).map_err(|source| GypError::Syntax {
            file: path.to_string(),
            source,
        })?;
        let Value::Map(mut document) = parsed else {
            return Err(GypError::NotADictionary {
                path: path.to_string(),
            }
            .into());
        };

        // Registered before its includes are read, so an include cycle ends here.
        self.documents.insert(path.to_string(), document.clone());
        self.included.entry(path.to_string()).or_default();

        if !document.get("skip_includes").is_some_and(Value::as_flag) {
            let includes = is_target.then(|| self.includes.clone());
            self.load_includes_into_dict(&mut document, path, includes.as_deref())
                .with_context(|| format!("while reading includes of {path}"))?;
            self.documents.insert(path.to_string(), document.clone());
        }

        Ok(document)
    }

    fn load_includes_into_dict(
        &mut self,
        subdict: &mut Map,
        subdict_path: &str,
        includes: Option<&[String]>,
    ) -> GypResult<()> {
        let mut includes_list: Vec<String> = includes.map(<[String]>::to_vec).unwrap_or_default();

        if let Some(own) = subdict.shift_remove("includes") {
            let Value::List(own) = own else {
                return Err(GypError::TypeMismatch(format!(
                    "includes in {subdict_path} must be a list, found a {}",
                    own.type_name()
                ))
                .into());
            };
            for include in own {
                let Value::Str(include) = include else {
                    return Err(GypError::TypeMismatch(format!(
                        "includes in {subdict_path} must only hold strings, found a {}",
                        include.type_name()
                    ))
                    .into());
                };
                includes_list.push(normpath(&join(dirname(subdict_path), &include)));
            }
        }

        for include in includes_list {
            self.included
                .entry(subdict_path.to_string())
                .or_default()
                .push(include.clone());
            debug!(include, "Loading included file");
            let included = self.load_one_build_file(&include, false)?;
            merge_dicts(subdict, &included, subdict_path, &include, self.config)?;
        }

        let keys: Vec<String> = subdict.keys().cloned().collect();
        for key in keys {
            match subdict.get_mut(&key) {
                Some(Value::Map(child)) => self.load_includes_into_dict(child, subdict_path, None)?,
                Some(Value::List(child)) => self.load_includes_into_list(child, subdict_path)?,
                _ => {}
            }
        }
        Ok(())
    }

    fn load_includes_into_list(&mut self, sublist: &mut [Value], sublist_path: &str) -> GypResult<()> {
        for item in sublist {
            match item {
                Value::Map(child) => self.load_includes_into_dict(child, sublist_path, None)?,
                Value::List(child) => self.load_includes_into_list(child, sublist_path)?,
                _ => {}
            }
        }
        Ok(())
    }

    /// `path` followed by everything it includes, depth first.
    pub fn included_build_files(&self, path: &str) -> Vec<String> {
        let mut out = vec![];
        self.collect_included(path, &mut out);
        out
    }

    fn collect_included(&self, path: &str, out: &mut Vec<String>) {
        if out.iter().any(|p| p == path) {
            return;
        }
        out.push(path.to_string());
        for include in self.included.get(path).into_iter().flatten() {
            self.collect_included(include, out);
        }
    }

    /// Load a build file that declares targets, run its early expansion and then load every
    /// build file its targets depend on.
    pub fn load_target_build_file(&mut self, path: &str) -> GypResult<()> {
        if !self.target_build_files.insert(path.to_string()) {
            return Ok(());
        }
        debug!(path, "Loading target build file");

        let variables = self.variables_for(path);
        let mut document = self.load_one_build_file(path, true)?;

        if let Some(depth) = &self.depth {
            document.insert("_DEPTH".into(), Value::Str(depth.clone()));
        }
        if document.contains_key("included_files") {
            return Err(GypError::Invalid(format!(
                "{path} must not contain included_files key"
            ))
            .into());
        }
        let included_files = self
            .included_build_files(path)
            .iter()
            .map(|included| Value::Str(relative_path(included, dirname(path))))
            .collect();
        document.insert("included_files".into(), Value::List(included_files));

        let multiple_toolsets = self.config.multiple_toolsets();
        process_toolsets_in_dict(&mut document, multiple_toolsets);
        self.expander
            .process_dict(&mut document, Phase::Early, &variables, path, None)?;
        process_toolsets_in_dict(&mut document, multiple_toolsets);

        if let Some(defaults) = document.shift_remove("target_defaults") {
            let Value::Map(defaults) = defaults else {
                return Err(GypError::TypeMismatch(format!(
                    "target_defaults in {path} must be a dict"
                ))
                .into());
            };
            let Some(Value::List(targets)) = document.get_mut("targets") else {
                return Err(GypError::Invalid(format!(
                    "Unable to find targets in build file {path}"
                ))
                .into());
            };
            for target in targets.iter_mut() {
                let Value::Map(old) = target else {
                    continue;
                };
                let mut merged = defaults.clone();
                merge_dicts(&mut merged, old, path, path, self.config)?;
                *old = merged;
            }
        }

        let mut dependencies: IndexSet<String> = IndexSet::new();
        if let Some(Value::List(targets)) = document.get("targets") {
            for target in targets.iter().filter_map(Value::as_map) {
                let owner = match target.get("target_name") {
                    Some(Value::Str(name)) => format!("target {name} in {path}"),
                    _ => format!("a target in {path}"),
                };
                for dependency in checked_string_list(target, "dependencies", &owner)? {
                    if let Some(file) = resolve_target(Some(path), &dependency, None).build_file {
                        dependencies.insert(file);
                    }
                }
            }
        }

        self.documents.insert(path.to_string(), document);

        for dependency in dependencies {
            self.load_target_build_file(&dependency)
                .with_context(|| format!("while loading dependencies of {path}"))?;
        }
        Ok(())
    }
}

/// Resolve `build_files` and everything they reach into a flat, ordered set of targets.
///
/// `variables` seeds every build file's scope, `includes` are merged into every target build
/// file and `depth`, when given, is the directory `DEPTH` is computed against.
pub fn load<S: AsRef<str>>(
    build_files: &[S],
    variables: &Map,
    includes: &[String],
    depth: Option<&str>,
    config: &ResolverConfig,
) -> GypResult<Resolution> {
    let cache = RunCache::default();
    let mut loader = Loader::new(config, &cache, variables, includes, depth);

    let roots: IndexSet<String> = build_files.iter().map(|f| normpath(f.as_ref())).collect();
    for root in &roots {
        loader
            .load_target_build_file(root)
            .with_context(|| format!("while trying to load {root}"))?;
    }
    info!(files = loader.target_build_files.len(), "Loaded build files");

    let mut documents = std::mem::take(&mut loader.documents);
    let (mut targets, by_file) = build_targets_dict(&mut documents, &loader.target_build_files)?;

    qualify_dependencies(&mut targets, config)?;
    remove_self_dependencies(&mut targets);
    expand_wildcard_dependencies(&mut targets, &by_file)?;
    remove_link_dependencies_from_none_targets(&mut targets);
    filter_dependency_sections(&mut targets)?;
    remove_duplicate_dependencies(&mut targets);

    if config.circular_check {
        verify_no_gyp_file_circular_dependencies(&targets)?;
    }

    let mut graph = DependencyGraph::build(&targets)?;
    let mut flat_list = graph.flat_list(CycleLevel::Target)?;

    if !config.root_targets.is_empty() {
        prune_to_roots(&mut targets, &mut flat_list, &graph, &config.root_targets)?;
    }
    verify_no_colliding_targets(&flat_list)?;

    propagate_dependent_settings(&flat_list, &mut targets, &graph, config)?;
    if config.generator.adjust_static_libraries {
        adjust_static_library_dependencies(
            &flat_list,
            &mut targets,
            &graph,
            config.generator.sort_dependencies,
        )?;
    }

    let late_pass = |targets: &mut Targets, phase: Phase| -> GypResult<()> {
        for target in &flat_list {
            let file = build_file(target).unwrap_or_default();
            let variables = loader.variables_for(&file);
            if let Some(spec) = targets.get_mut(target) {
                loader
                    .expander
                    .process_dict(spec, phase, &variables, &file, None)?;
            }
        }
        Ok(())
    };

    late_pass(&mut targets, Phase::Late)?;
    for target in &flat_list {
        if let Some(spec) = targets.get_mut(target) {
            set_up_configurations(target, spec, config)?;
            process_list_filters_in_dict(target, spec)?;
        }
    }
    late_pass(&mut targets, Phase::LateLate)?;

    for target in &flat_list {
        let file = build_file(target).unwrap_or_default();
        let Some(spec) = targets.get_mut(target) else {
            continue;
        };
        validate_target_type(target, spec)?;
        validate_rules_in_target(target, spec, &config.generator.extra_sources_for_rules)?;
        validate_run_as_in_target(target, spec, &file)?;
        validate_actions_in_target(target, spec)?;
    }

    if config.stringify_integers {
        for spec in targets.values_mut() {
            spec.values_mut().for_each(stringify_integers);
        }
    }

    for (file, names) in &by_file {
        let Some(document) = documents.get_mut(file) else {
            continue;
        };
        if !document.contains_key("targets") {
            continue;
        }
        let resolved = names
            .iter()
            .filter_map(|name| targets.get(name).cloned().map(Value::Map))
            .collect();
        document.insert("targets".into(), Value::List(resolved));
    }

    Ok(Resolution {
        flat_list,
        targets,
        documents,
    })
}
