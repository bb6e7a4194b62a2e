//! Variable, command and file-list expansion, and the document walk that drives it.
//!
//! A reference looks like `<(name)`, `<!(command)`, `<@(list_name)`, `<!@(command)` or
//! `<|(file_name item...)`. The leading character selects the phase the reference belongs to:
//! `<` is expanded while loading, `>` once dependencies are known and `^` last of all.

use std::cell::Cell;
use std::fs;
use std::rc::Rc;
use std::sync::LazyLock;

use anyhow::Context;
use gypsum_syntax::{parse, Map, Value};
use gypsum_util::path::{dirname, join, relative_path};
use gypsum_util::shell::{encode_posix_shell_list, split_posix_shell};
use regex::Regex;
use scopeguard::defer;
use tracing::{debug, trace};

use crate::command::{CommandLine, RunCache};
use crate::condition::{compile, evaluate};
use crate::config::ResolverConfig;
use crate::errors::{GypError, GypResult};
use crate::filter::process_list_filters_in_dict;
use crate::merge::merge_dicts;
use crate::variables::{
    load_automatic_variables, load_variables_from_variables_dict, scope_from_map, scope_to_map,
    Scope,
};

const MAX_EXPANSION_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Early,
    Late,
    LateLate,
}

fn expansion_regex(symbol: &str) -> Regex {
    Regex::new(&format!(
        r"(?P<replace>(?P<type>{symbol}(?:(?:!?@?)|\|)?)(?P<command_string>[-a-zA-Z0-9_.]+)?\((?P<is_array>\s*\[?)(?P<content>.*?)(\]?)\))"
    ))
    .unwrap()
}

static EARLY_REFERENCE: LazyLock<Regex> = LazyLock::new(|| expansion_regex("<"));
static LATE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| expansion_regex(">"));
static LATELATE_REFERENCE: LazyLock<Regex> = LazyLock::new(|| expansion_regex(r"\^"));
static CANONICAL_INT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+$").unwrap());

impl Phase {
    pub fn symbol(self) -> char {
        match self {
            Phase::Early => '<',
            Phase::Late => '>',
            Phase::LateLate => '^',
        }
    }

    fn reference_regex(self) -> &'static Regex {
        match self {
            Phase::Early => &EARLY_REFERENCE,
            Phase::Late => &LATE_REFERENCE,
            Phase::LateLate => &LATELATE_REFERENCE,
        }
    }

    /// The key holding the conditions evaluated in this phase.
    pub fn conditions_key(self) -> Option<&'static str> {
        match self {
            Phase::Early => Some("conditions"),
            Phase::Late => Some("target_conditions"),
            Phase::LateLate => None,
        }
    }
}

/// Parse `s` as an integer if it is an optionally negated run of digits that fits an `i64`.
pub fn canonical_int(s: &str) -> Option<i64> {
    if CANONICAL_INT.is_match(s) {
        s.parse().ok()
    } else {
        None
    }
}

fn coerce_canonical_int(value: Value) -> Value {
    match value {
        Value::Str(s) => match canonical_int(&s) {
            Some(i) => Value::Int(i),
            None => Value::Str(s),
        },
        Value::List(items) => Value::List(items.into_iter().map(coerce_canonical_int).collect()),
        other => other,
    }
}

/// Locate the first balanced `()`, `[]` or `{}` group, as byte offsets of its opening bracket and
/// one past its closing bracket.
fn find_enclosing_bracket_group(input: &str) -> Option<(usize, usize)> {
    let mut stack = vec![];
    let mut start = None;
    for (index, c) in input.char_indices() {
        match c {
            '(' | '[' | '{' => {
                stack.push(c);
                start.get_or_insert(index);
            }
            ')' | ']' | '}' => {
                let opening = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(opening) {
                    return None;
                }
                if stack.is_empty() {
                    return start.map(|start| (start, index + 1));
                }
            }
            _ => {}
        }
    }
    None
}

fn plain_string_items(items: &[Value]) -> Vec<String> {
    items.iter().map(Value::to_plain_string).collect()
}

/// Text of an expanded reference body.
fn contents_text(value: &Value) -> String {
    match value {
        Value::List(items) => encode_posix_shell_list(plain_string_items(items)),
        other => other.to_plain_string(),
    }
}

struct Reference {
    start: usize,
    kind: String,
    command_string: Option<String>,
    is_array: bool,
}

impl Reference {
    fn run_command(&self) -> bool {
        self.kind.contains('!')
    }

    fn file_list(&self) -> bool {
        self.kind.contains('|')
    }

    fn expand_to_list(&self) -> bool {
        self.kind.contains('@')
    }
}

/// Expands references and evaluates conditions within one resolution run.
pub struct Expander<'r> {
    config: &'r ResolverConfig,
    cache: &'r RunCache,
    depth: Cell<usize>,
}

impl<'r> Expander<'r> {
    pub fn new(config: &'r ResolverConfig, cache: &'r RunCache) -> Self {
        Self {
            config,
            cache,
            depth: Cell::new(0),
        }
    }

    pub fn config(&self) -> &'r ResolverConfig {
        self.config
    }

    /// Expand every `phase` reference in `input`, declared in `build_file`.
    ///
    /// The result is a string, an integer when the expansion is a canonical integer, or a list
    /// when a whole-string `@` reference produced one.
    pub fn expand_variables(
        &self,
        input: &str,
        phase: Phase,
        variables: &Scope,
        build_file: &str,
    ) -> GypResult<Value> {
        if let Some(i) = canonical_int(input) {
            return Ok(Value::Int(i));
        }
        if !input.contains(phase.symbol()) {
            return Ok(Value::Str(input.to_string()));
        }

        let references: Vec<Reference> = phase
            .reference_regex()
            .captures_iter(input)
            .filter_map(|caps| {
                Some(Reference {
                    start: caps.name("replace")?.start(),
                    kind: caps.name("type")?.as_str().to_string(),
                    command_string: caps.name("command_string").map(|m| m.as_str().to_string()),
                    is_array: caps.name("is_array").is_some_and(|m| m.as_str().contains('[')),
                })
            })
            .collect();
        if references.is_empty() {
            return Ok(Value::Str(input.to_string()));
        }

        let depth = self.depth.get() + 1;
        if depth > MAX_EXPANSION_DEPTH {
            return Err(GypError::RecursiveExpansion {
                input: input.to_string(),
                build_file: build_file.to_string(),
            }
            .into());
        }
        self.depth.set(depth);
        defer! {
            self.depth.set(depth - 1);
        }

        trace!(input, count = references.len(), "Matches");

        let mut input_str = input.to_string();
        let mut list_output: Option<Vec<Value>> = None;

        // Right to left, so earlier offsets stay valid while later references are replaced.
        for reference in references.iter().rev() {
            let (group_start, group_end) = find_enclosing_bracket_group(&input_str[reference.start..])
                .ok_or_else(|| {
                    GypError::Invalid(format!(
                        "Unbalanced brackets in '{}' in {build_file}",
                        &input_str[reference.start..]
                    ))
                })?;
            let replace_end = reference.start + group_end;
            let matched = input_str[reference.start..replace_end].to_string();
            let raw_contents = &input_str[reference.start + group_start + 1..replace_end - 1];

            let contents = if reference.file_list() {
                let mut filtered = scope_to_map(variables);
                process_list_filters_in_dict(raw_contents, &mut filtered)?;
                self.expand_variables(raw_contents, phase, &scope_from_map(&filtered), build_file)?
            } else {
                self.expand_variables(raw_contents, phase, variables, build_file)?
            };
            let contents = contents_text(&contents).trim().to_string();

            let expand_to_list = reference.expand_to_list() && input_str == matched;
            let build_file_dir = dirname(build_file);

            let replacement = if reference.file_list() {
                Value::Str(self.write_file_list(&contents, build_file_dir)?)
            } else if reference.run_command() {
                if let Some(command_string) = &reference.command_string {
                    return Err(GypError::Invalid(format!(
                        "Unknown command string '{command_string}' in '{matched}' in {build_file}"
                    ))
                    .into());
                }

                let command = if reference.is_array {
                    let parsed = parse(&contents).map_err(|source| GypError::Syntax {
                        file: build_file.to_string(),
                        source,
                    })?;
                    match parsed {
                        Value::List(argv) if argv.iter().all(Value::is_scalar) => {
                            CommandLine::Argv(plain_string_items(&argv))
                        }
                        other => {
                            return Err(GypError::TypeMismatch(format!(
                                "Command array '{other}' in {build_file} must be a list of strings"
                            ))
                            .into())
                        }
                    }
                } else {
                    CommandLine::Shell(contents.clone())
                };

                let cwd = (!build_file_dir.is_empty()).then_some(build_file_dir);
                Value::Str(
                    self.cache
                        .run(&command, cwd, build_file)
                        .with_context(|| format!("while expanding '{matched}' in {build_file}"))?,
                )
            } else {
                match variables.get(&contents) {
                    Some(value) => value.clone(),
                    None if contents.ends_with('!') || contents.ends_with('/') => {
                        Value::List(vec![])
                    }
                    None => {
                        return Err(GypError::UndefinedVariable {
                            name: contents,
                            build_file: build_file.to_string(),
                        }
                        .into())
                    }
                }
            };

            let replacement = match replacement {
                Value::List(mut items) => {
                    if !contents.ends_with('/') {
                        if let Some(bad) = items.iter().find(|i| !matches!(i, Value::Str(_) | Value::Int(_))) {
                            return Err(GypError::TypeMismatch(format!(
                                "Variable {contents} must expand to a string or list of strings; list contains a {}",
                                bad.type_name()
                            ))
                            .into());
                        }
                    }
                    self.process_list(&mut items, phase, variables, build_file)?;
                    Value::List(items)
                }
                scalar @ (Value::Str(_) | Value::Int(_)) => scalar,
                other => {
                    return Err(GypError::TypeMismatch(format!(
                        "Variable {contents} must expand to a string or list of strings; found a {}",
                        other.type_name()
                    ))
                    .into())
                }
            };

            if expand_to_list {
                list_output = Some(match replacement {
                    Value::List(items) => items,
                    other => split_posix_shell(&other.to_plain_string())
                        .map_err(|e| GypError::Invalid(format!("{e} in {build_file}")))?
                        .into_iter()
                        .map(Value::Str)
                        .collect(),
                });
                break;
            }

            let encoded = contents_text(&replacement);
            input_str.replace_range(reference.start..replace_end, &encoded);
        }

        let output = match list_output {
            Some(items) => {
                if matches!(items.first(), Some(Value::List(_))) {
                    Value::List(items)
                } else {
                    Value::List(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::Str(s) => self.expand_variables(&s, phase, variables, build_file),
                                other => Ok(other),
                            })
                            .collect::<GypResult<_>>()?,
                    )
                }
            }
            None if input_str == input => {
                trace!(input, "Found only identity matches");
                Value::Str(input_str)
            }
            None => {
                trace!(input, output = %input_str, "Expanding again");
                self.expand_variables(&input_str, phase, variables, build_file)?
            }
        };

        Ok(coerce_canonical_int(output))
    }

    fn write_file_list(&self, contents: &str, build_file_dir: &str) -> GypResult<String> {
        let mut words = contents.split(' ');
        let file_name = words.next().unwrap_or_default();
        if file_name.starts_with('/') {
            return Err(GypError::Invalid(format!(
                "| cannot handle absolute paths, got \"{file_name}\""
            ))
            .into());
        }

        let path = match &self.config.generator.filelist_paths {
            None => join(build_file_dir, file_name),
            Some(paths) => {
                let rel_build_file_dir = if build_file_dir.starts_with('/') {
                    relative_path(build_file_dir, &paths.toplevel)
                } else {
                    build_file_dir.to_string()
                };
                join(&join(&paths.qualified_out_dir, &rel_build_file_dir), file_name)
            }
        };

        let body: String = words.map(|w| format!("{w}\n")).collect();
        let unchanged = fs::read_to_string(&path).is_ok_and(|existing| existing == body);
        if !unchanged {
            debug!(path, "Writing file list");
            if let Some(parent) = std::path::Path::new(&path).parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("creating directory for {path}"))?;
                }
            }
            fs::write(&path, body).with_context(|| format!("writing file list {path}"))?;
        }

        Ok(relative_path(&path, build_file_dir))
    }

    /// Expand references and resolve conditions throughout `the_dict`.
    ///
    /// `the_dict_key` is the key `the_dict` lives under in its parent, if any.
    pub fn process_dict(
        &self,
        the_dict: &mut Map,
        phase: Phase,
        variables_in: &Scope,
        build_file: &str,
        the_dict_key: Option<&str>,
    ) -> GypResult<()> {
        let mut variables = variables_in.clone();
        load_automatic_variables(&mut variables, the_dict);

        match the_dict.get_mut("variables") {
            Some(Value::Map(vars)) => {
                for (key, value) in vars.iter() {
                    variables.insert(key.clone(), value.clone());
                }
                self.process_dict(vars, phase, &variables, build_file, Some("variables"))?;
            }
            Some(other) => {
                return Err(GypError::TypeMismatch(format!(
                    "variables must be a dict, found a {} in {build_file}",
                    other.type_name()
                ))
                .into())
            }
            None => {}
        }

        load_variables_from_variables_dict(&mut variables, the_dict, the_dict_key);

        let keys: Vec<String> = the_dict.keys().cloned().collect();
        for key in &keys {
            if key == "variables" {
                continue;
            }
            let Some(Value::Str(value)) = the_dict.get(key) else {
                continue;
            };

            let expanded = self.expand_variables(value, phase, &variables, build_file)?;
            if !matches!(expanded, Value::Str(_) | Value::Int(_)) {
                return Err(GypError::TypeMismatch(format!(
                    "Variable expansion in this context permits str and int only, found {} for {key}",
                    expanded.type_name()
                ))
                .into());
            }
            the_dict.insert(key.clone(), expanded);
        }

        // Expansion may have changed values the conditions look at.
        let mut variables = variables_in.clone();
        load_automatic_variables(&mut variables, the_dict);
        load_variables_from_variables_dict(&mut variables, the_dict, the_dict_key);

        self.process_conditions_in_dict(the_dict, phase, &variables, build_file)?;

        // Conditions may have merged in new variables.
        let mut variables = variables_in.clone();
        load_automatic_variables(&mut variables, the_dict);
        load_variables_from_variables_dict(&mut variables, the_dict, the_dict_key);

        let keys: Vec<String> = the_dict.keys().cloned().collect();
        for key in &keys {
            if key == "variables" {
                continue;
            }
            match the_dict.get_mut(key) {
                Some(Value::Map(child)) => {
                    self.process_dict(child, phase, &variables, build_file, Some(key))?
                }
                Some(Value::List(child)) => {
                    self.process_list(child, phase, &variables, build_file)?
                }
                _ => {}
            }
        }

        Ok(())
    }

    pub fn process_list(
        &self,
        the_list: &mut Vec<Value>,
        phase: Phase,
        variables: &Scope,
        build_file: &str,
    ) -> GypResult<()> {
        let mut index = 0;
        while index < the_list.len() {
            let expanded = match &mut the_list[index] {
                Value::Map(child) => {
                    self.process_dict(child, phase, variables, build_file, None)?;
                    None
                }
                Value::List(child) => {
                    self.process_list(child, phase, variables, build_file)?;
                    None
                }
                Value::Str(s) => Some(self.expand_variables(s, phase, variables, build_file)?),
                Value::Int(_) | Value::Float(_) => None,
            };

            match expanded {
                Some(Value::List(items)) => {
                    let count = items.len();
                    the_list.splice(index..=index, items);
                    index += count;
                    continue;
                }
                Some(scalar @ (Value::Str(_) | Value::Int(_))) => the_list[index] = scalar,
                Some(other) => {
                    return Err(GypError::TypeMismatch(format!(
                        "Variable expansion in this context permits strings and lists only, found {} at index {index}",
                        other.type_name()
                    ))
                    .into())
                }
                None => {}
            }
            index += 1;
        }

        Ok(())
    }

    fn process_conditions_in_dict(
        &self,
        the_dict: &mut Map,
        phase: Phase,
        variables: &Scope,
        build_file: &str,
    ) -> GypResult<()> {
        let Some(conditions_key) = phase.conditions_key() else {
            return Ok(());
        };
        let Some(conditions) = the_dict.shift_remove(conditions_key) else {
            return Ok(());
        };
        let Value::List(conditions) = conditions else {
            return Err(GypError::TypeMismatch(format!(
                "{conditions_key} must be a list, found a {} in {build_file}",
                conditions.type_name()
            ))
            .into());
        };

        for condition in conditions {
            if let Some(mut merge_dict) =
                self.eval_condition(condition, conditions_key, phase, variables, build_file)?
            {
                self.process_dict(&mut merge_dict, phase, variables, build_file, None)?;
                merge_dicts(the_dict, &merge_dict, build_file, build_file, self.config)?;
            }
        }

        Ok(())
    }

    /// Select the dictionary chosen by `condition`, a list of the form
    /// `[expr, true_dict, (false_dict,)? expr, true_dict, ...]`.
    ///
    /// The first expression that selects a dictionary wins; the remaining entries are only
    /// checked for shape.
    pub fn eval_condition(
        &self,
        condition: Value,
        conditions_key: &str,
        phase: Phase,
        variables: &Scope,
        build_file: &str,
    ) -> GypResult<Option<Map>> {
        let Value::List(items) = condition else {
            return Err(GypError::TypeMismatch(format!(
                "{conditions_key} {condition} must be a list"
            ))
            .into());
        };
        if items.len() < 2 {
            return Err(GypError::Invalid(format!(
                "{conditions_key} {} must be at least length 2, not {}",
                Value::List(items.clone()),
                items.len()
            ))
            .into());
        }

        let len = items.len();
        let mut items = items.into_iter().enumerate().peekable();
        let mut result = None;
        while let Some((i, cond_expr)) = items.next() {
            let Value::Str(cond_expr) = cond_expr else {
                return Err(GypError::TypeMismatch(format!(
                    "{conditions_key} item {i} must be a condition string, found {}",
                    cond_expr.type_name()
                ))
                .into());
            };

            let true_dict = match items.next() {
                Some((_, Value::Map(m))) => m,
                Some((_, other)) => {
                    return Err(GypError::TypeMismatch(format!(
                        "{conditions_key} {cond_expr} must be followed by a dictionary, not {}",
                        other.type_name()
                    ))
                    .into())
                }
                None => {
                    return Err(GypError::Invalid(format!(
                        "{conditions_key} {cond_expr} must be followed by a dictionary"
                    ))
                    .into())
                }
            };

            let false_dict = match items.peek() {
                Some((j, Value::Map(_))) => {
                    if *j + 1 != len {
                        return Err(GypError::Invalid(format!(
                            "{conditions_key} {cond_expr} has {} unexpected trailing items",
                            len - j - 1
                        ))
                        .into());
                    }
                    items.next().and_then(|(_, v)| match v {
                        Value::Map(m) => Some(m),
                        _ => None,
                    })
                }
                _ => None,
            };

            if result.is_none() {
                result = self.eval_single_condition(
                    &cond_expr, true_dict, false_dict, phase, variables, build_file,
                )?;
            }
        }

        Ok(result)
    }

    fn eval_single_condition(
        &self,
        cond_expr: &str,
        true_dict: Map,
        false_dict: Option<Map>,
        phase: Phase,
        variables: &Scope,
        build_file: &str,
    ) -> GypResult<Option<Map>> {
        let expanded = self.expand_variables(cond_expr, phase, variables, build_file)?;
        let cond_text = match expanded {
            Value::Str(s) => s,
            Value::Int(i) => i.to_string(),
            other => {
                return Err(GypError::TypeMismatch(format!(
                    "Variable expansion in this context permits str and int only, found {} for condition '{cond_expr}'",
                    other.type_name()
                ))
                .into())
            }
        };

        let cached = self.cache.conditions.borrow().get(&cond_text).cloned();
        let compiled = match cached {
            Some(compiled) => compiled,
            None => {
                let compiled = Rc::new(compile(&cond_text).map_err(|message| {
                    GypError::ConditionSyntax {
                        condition: cond_text.clone(),
                        build_file: build_file.to_string(),
                        message,
                    }
                })?);
                self.cache
                    .conditions
                    .borrow_mut()
                    .insert(cond_text.clone(), compiled.clone());
                compiled
            }
        };

        let outcome = evaluate(&compiled, variables).map_err(|message| {
            GypError::ConditionEvaluation {
                condition: cond_text.clone(),
                build_file: build_file.to_string(),
                message,
            }
        })?;

        Ok(if outcome.is_truthy() {
            Some(true_dict)
        } else {
            false_dict
        })
    }
}

/// Evaluate one condition list in the early phase with a fresh run cache.
///
/// ```
/// use gypsum_resolve::expand::evaluate_condition_list;
/// use gypsum_resolve::variables::Scope;
/// use gypsum_resolve::ResolverConfig;
/// use gypsum_syntax::{parse, Value};
///
/// let condition = parse(r#"['OS=="linux"', {'sources': ['a.c']}, {'sources': ['b.c']}]"#).unwrap();
/// let mut scope = Scope::new();
/// scope.insert("OS".into(), Value::from("mac"));
/// let chosen = evaluate_condition_list(condition, &scope, "x.gyp", &ResolverConfig::default()).unwrap();
/// assert_eq!(chosen.unwrap()["sources"], parse("['b.c']").unwrap());
/// ```
pub fn evaluate_condition_list(
    condition: Value,
    scope: &Scope,
    build_file: &str,
    config: &ResolverConfig,
) -> GypResult<Option<Map>> {
    let cache = RunCache::default();
    let expander = Expander::new(config, &cache);
    expander.eval_condition(condition, "conditions", Phase::Early, scope, build_file)
}
