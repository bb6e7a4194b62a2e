//! Resolution of build files into an ordered set of fully expanded targets.
//!
//! ## Pipeline
//! [`load`] reads every build file reachable from the roots, merging `includes` and running the
//! early (`<`) expansion and `conditions` on each file as it is read. Targets are then gathered
//! under their qualified names (`path/to/file.gyp:target#toolset`), wildcard dependencies are
//! expanded and the dependency graph is ordered so that every target comes after its
//! dependencies.
//!
//! With the order known, dependent settings (`all_dependent_settings`,
//! `direct_dependent_settings`, `link_settings`) are merged into the targets that depend on
//! them and static library dependencies are rewritten. Finally the late (`>`) expansion and
//! `target_conditions` run, settings are folded into `configurations`, list filters apply, the
//! latelate (`^`) expansion runs and each target is validated.
//!
//! ## Merging
//! Dictionaries merge recursively. A list key may carry a policy suffix: `key=` replaces,
//! `key+` prepends, `key?` only sets the list when it is absent, and a bare key appends.
//! Values under path-valued keys (`sources`, `include_dirs`, anything ending in `_dir`,
//! `_file`, `_path`, ...) are rewritten to stay relative to the file that ends up holding them.

pub mod command;
pub mod condition;
pub mod config;
pub mod configurations;
pub mod dependent_settings;
pub mod errors;
pub mod expand;
pub mod filter;
pub mod graph;
pub mod loader;
pub mod merge;
pub mod qualified;
pub mod target;
pub mod targets;
pub mod validate;
pub mod variables;

#[cfg(test)]
mod tests;

pub use config::{FileListPaths, GeneratorInputInfo, GeneratorInputInfoBuilder, ResolverConfig, ResolverConfigBuilder};
pub use errors::{CycleLevel, GypError, GypResult};
pub use graph::DependencyGraph;
pub use loader::{load, Loader, Resolution};
pub use merge::{merge_dicts, merge_lists};
pub use qualified::{
    build_file, find_qualified_targets, parse_qualified_target, qualified_target, resolve_target,
    QualifiedTarget,
};
pub use target::{TargetType, Targets};
