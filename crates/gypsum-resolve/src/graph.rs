//! Dependency graph over qualified target names (or build files) with a nameless root node
//! that every node without dependencies hangs off.
//!
//! Edges point from a dependent to its dependency. petgraph lists neighbors most recent first,
//! so the accessors below reverse them back into declaration order.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction::{Incoming, Outgoing};
use tracing::debug;

use crate::errors::{CycleLevel, GypError, GypResult};
use crate::target::{flag, get_target, string_list, target_type, TargetType, Targets};

pub struct DependencyGraph {
    graph: DiGraph<Option<String>, ()>,
    root: NodeIndex,
    nodes: HashMap<String, NodeIndex>,
    /// Node names in the order they were added.
    order: Vec<String>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(None);
        Self {
            graph,
            root,
            nodes: HashMap::new(),
            order: vec![],
        }
    }

    pub fn add_node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.nodes.get(name) {
            return index;
        }
        let index = self.graph.add_node(Some(name.to_string()));
        self.nodes.insert(name.to_string(), index);
        self.order.push(name.to_string());
        index
    }

    pub fn add_dependency(&mut self, dependent: NodeIndex, dependency: NodeIndex) {
        self.graph.add_edge(dependent, dependency, ());
    }

    /// Make `node` a dependent of the root.
    pub fn attach_to_root(&mut self, node: NodeIndex) {
        self.graph.add_edge(node, self.root, ());
    }

    /// Hang every node that has no dependencies off the root.
    pub fn attach_orphans_to_root(&mut self) {
        let orphans: Vec<NodeIndex> = self
            .order
            .iter()
            .filter_map(|name| self.node(name))
            .filter(|&n| self.graph.neighbors_directed(n, Outgoing).next().is_none())
            .collect();
        for node in orphans {
            self.attach_to_root(node);
        }
    }

    pub fn node(&self, name: &str) -> Option<NodeIndex> {
        self.nodes.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn name(&self, node: NodeIndex) -> Option<&str> {
        self.graph[node].as_deref()
    }

    fn dependencies_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(node, Outgoing).collect();
        deps.reverse();
        deps
    }

    fn dependents_of(&self, node: NodeIndex) -> Vec<NodeIndex> {
        let mut deps: Vec<NodeIndex> = self.graph.neighbors_directed(node, Incoming).collect();
        deps.reverse();
        deps
    }

    fn sorted_by_name(&self, mut nodes: Vec<NodeIndex>) -> Vec<NodeIndex> {
        nodes.sort_by(|a, b| self.name(*a).cmp(&self.name(*b)));
        nodes
    }

    fn index(&self, name: &str) -> GypResult<NodeIndex> {
        self.node(name).ok_or_else(|| {
            GypError::Invalid(format!("{name} is not part of the dependency graph")).into()
        })
    }

    /// Build the graph of `targets` from their `dependencies` lists.
    pub fn build(targets: &Targets) -> GypResult<Self> {
        let mut graph = Self::new();
        for name in targets.keys() {
            graph.add_node(name);
        }

        for (name, spec) in targets {
            let node = graph.index(name)?;
            let dependencies = string_list(spec, "dependencies");
            if dependencies.is_empty() {
                graph.attach_to_root(node);
                continue;
            }

            for dependency in dependencies {
                let Some(dependency_node) = graph.node(&dependency) else {
                    return Err(GypError::MissingDependency {
                        dependency,
                        target: name.clone(),
                    }
                    .into());
                };
                graph.add_dependency(node, dependency_node);
            }
        }

        Ok(graph)
    }

    /// Order the nodes so every node follows all of its dependencies. Nodes caught in (or
    /// behind) a cycle are left out.
    pub fn flatten(&self) -> Vec<String> {
        let mut flat: IndexSet<NodeIndex> = IndexSet::new();
        let mut ready = self.sorted_by_name(self.dependents_of(self.root));

        while let Some(node) = ready.pop() {
            flat.insert(node);
            for dependent in self.sorted_by_name(self.dependents_of(node)) {
                if self
                    .dependencies_of(dependent)
                    .iter()
                    .all(|d| flat.contains(d))
                {
                    ready.push(dependent);
                }
            }
        }

        flat.into_iter()
            .filter_map(|n| self.name(n).map(String::from))
            .collect()
    }

    /// Every cycle reachable from the root, each as the chain of names that closes the loop.
    pub fn find_cycles(&self) -> Vec<Vec<String>> {
        let mut results = vec![];
        let mut visited: HashSet<NodeIndex> = HashSet::from([self.root]);
        self.visit_for_cycles(self.root, &mut vec![self.root], &mut visited, &mut results);

        results
            .into_iter()
            .map(|cycle| {
                cycle
                    .into_iter()
                    .filter_map(|n| self.name(n).map(String::from))
                    .collect()
            })
            .collect()
    }

    /// `path` holds the walk so far, newest node first.
    fn visit_for_cycles(
        &self,
        node: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
        results: &mut Vec<Vec<NodeIndex>>,
    ) {
        for child in self.dependents_of(node) {
            if let Some(pos) = path.iter().position(|p| *p == child) {
                let mut cycle = vec![child];
                cycle.extend_from_slice(&path[..=pos]);
                results.push(cycle);
            } else if visited.insert(child) {
                path.insert(0, child);
                self.visit_for_cycles(child, path, visited, results);
                path.remove(0);
            }
        }
    }

    /// The flattened order, or a [`GypError::DependencyCycle`] naming every cycle when some
    /// nodes could not be ordered.
    pub fn flat_list(&mut self, level: CycleLevel) -> GypResult<Vec<String>> {
        let flat = self.flatten();
        if flat.len() == self.len() {
            return Ok(flat);
        }

        if self.dependents_of(self.root).is_empty() {
            if let Some(first) = self.order.first().cloned() {
                let node = self.index(&first)?;
                self.attach_to_root(node);
            }
        }

        let mut cycles = self.find_cycles();
        let flattened: HashSet<&String> = flat.iter().collect();
        let mut seeds = self
            .order
            .clone()
            .into_iter()
            .filter(|name| !flattened.contains(name));
        while cycles.is_empty() {
            let Some(seed) = seeds.next() else {
                break;
            };
            debug!(seed, "No cycle reachable from the root; seeding");
            let node = self.index(&seed)?;
            self.attach_to_root(node);
            cycles = self.find_cycles();
        }

        Err(GypError::DependencyCycle { level, cycles }.into())
    }

    /// Direct dependencies of `name`, without duplicates.
    pub fn direct_dependencies(&self, name: &str) -> GypResult<Vec<String>> {
        let mut out: Vec<String> = vec![];
        for dependency in self.dependencies_of(self.index(name)?) {
            if let Some(dep) = self.name(dependency) {
                if !out.iter().any(|o| o == dep) {
                    out.push(dep.to_string());
                }
            }
        }
        Ok(out)
    }

    /// Direct dependencies plus whatever they re-export through `export_dependent_settings`,
    /// each export inserted right after its exporter.
    pub fn direct_and_imported_dependencies(
        &self,
        name: &str,
        targets: &Targets,
    ) -> GypResult<Vec<String>> {
        let mut dependencies = self.direct_dependencies(name)?;

        let mut index = 0;
        while index < dependencies.len() {
            let exported = string_list(get_target(targets, &dependencies[index])?, "export_dependent_settings");
            let mut add_index = 1;
            for imported in exported {
                if !dependencies.contains(&imported) {
                    dependencies.insert(index + add_index, imported);
                    add_index += 1;
                }
            }
            index += 1;
        }

        Ok(dependencies)
    }

    /// Every transitive dependency of `name`, dependencies of a node listed before the node.
    pub fn deep_dependencies(&self, name: &str) -> GypResult<IndexSet<String>> {
        let mut out = IndexSet::new();
        self.collect_deep(self.index(name)?, &mut out);
        Ok(out)
    }

    fn collect_deep(&self, node: NodeIndex, out: &mut IndexSet<String>) {
        for dependency in self.dependencies_of(node) {
            let Some(dep) = self.name(dependency) else {
                continue;
            };
            if !out.contains(dep) {
                self.collect_deep(dependency, out);
                out.insert(dep.to_string());
            }
        }
    }

    fn link_dependencies(
        &self,
        node: NodeIndex,
        targets: &Targets,
        include_shared_libraries: bool,
        initial: bool,
        out: &mut IndexSet<String>,
    ) -> GypResult<()> {
        let Some(name) = self.name(node) else {
            return Ok(());
        };

        let kind = target_type(targets, name)?;
        let linkable = kind.is_linkable();
        if initial && !linkable {
            return Ok(());
        }

        if kind == TargetType::None && !flag(get_target(targets, name)?, "dependencies_traverse", true) {
            out.insert(name.to_string());
            return Ok(());
        }

        if !initial
            && matches!(
                kind,
                TargetType::Executable | TargetType::LoadableModule | TargetType::MacKernelExtension
            )
        {
            return Ok(());
        }

        if !initial && kind == TargetType::SharedLibrary && !include_shared_libraries {
            return Ok(());
        }

        if out.insert(name.to_string()) && (initial || !linkable) {
            for dependency in self.dependencies_of(node) {
                self.link_dependencies(dependency, targets, include_shared_libraries, false, out)?;
            }
        }

        Ok(())
    }

    /// Targets whose `link_settings` apply to `name`.
    pub fn dependencies_for_link_settings(
        &self,
        name: &str,
        targets: &Targets,
    ) -> GypResult<IndexSet<String>> {
        let include_shared =
            flag(get_target(targets, name)?, "allow_sharedlib_linksettings_propagation", true);
        let mut out = IndexSet::new();
        self.link_dependencies(self.index(name)?, targets, include_shared, true, &mut out)?;
        Ok(out)
    }

    /// Targets that `name` links against, starting with `name` itself when it is linkable.
    pub fn dependencies_to_link_against(
        &self,
        name: &str,
        targets: &Targets,
    ) -> GypResult<IndexSet<String>> {
        let mut out = IndexSet::new();
        self.link_dependencies(self.index(name)?, targets, true, true, &mut out)?;
        Ok(out)
    }
}
