//! Addressing targets as `build_file:target_name#toolset`.

use std::fmt;

use gypsum_util::path::{dirname, join, normpath};

/// The three parts of a (possibly partial) qualified target name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTarget {
    pub build_file: Option<String>,
    pub target: String,
    pub toolset: Option<String>,
}

impl fmt::Display for QualifiedTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(build_file) = &self.build_file {
            write!(f, "{build_file}:")?;
        }
        f.write_str(&self.target)?;
        if let Some(toolset) = &self.toolset {
            write!(f, "#{toolset}")?;
        }
        Ok(())
    }
}

/// Split a qualified name into its parts. The build file is split off at the last `:` so that
/// drive-letter paths keep their colon.
///
/// ```
/// use gypsum_resolve::qualified::parse_qualified_target;
/// let q = parse_qualified_target("base/base.gyp:base#host");
/// assert_eq!(q.build_file.as_deref(), Some("base/base.gyp"));
/// assert_eq!(q.target, "base");
/// assert_eq!(q.toolset.as_deref(), Some("host"));
/// ```
pub fn parse_qualified_target(name: &str) -> QualifiedTarget {
    let (build_file, rest) = match name.rsplit_once(':') {
        Some((build_file, rest)) => (Some(build_file.to_string()), rest),
        None => (None, name),
    };
    let (target, toolset) = match rest.rsplit_once('#') {
        Some((target, toolset)) => (target.to_string(), Some(toolset.to_string())),
        None => (rest.to_string(), None),
    };

    QualifiedTarget {
        build_file,
        target,
        toolset,
    }
}

pub fn qualified_target(build_file: &str, target: &str, toolset: Option<&str>) -> String {
    match toolset {
        Some(toolset) if !toolset.is_empty() => format!("{build_file}:{target}#{toolset}"),
        _ => format!("{build_file}:{target}"),
    }
}

/// Resolve a dependency reference written in `build_file`. A build file named by the reference
/// is relative to the directory of `build_file`; a toolset named by the reference overrides
/// `toolset`.
pub fn resolve_target(
    build_file: Option<&str>,
    target: &str,
    toolset: Option<&str>,
) -> QualifiedTarget {
    let parsed = parse_qualified_target(target);

    let build_file = match (parsed.build_file, build_file) {
        (Some(parsed), Some(referrer)) if !parsed.is_empty() => {
            Some(normpath(&join(dirname(referrer), &parsed)))
        }
        (Some(parsed), None) if !parsed.is_empty() => Some(parsed),
        (_, referrer) => referrer.map(String::from),
    };

    QualifiedTarget {
        build_file,
        target: parsed.target,
        toolset: parsed.toolset.or_else(|| toolset.map(String::from)),
    }
}

pub fn build_file(qualified: &str) -> Option<String> {
    parse_qualified_target(qualified).build_file
}

/// Every entry of `qualified_list` whose target name (ignoring file and toolset) is `target`.
pub fn find_qualified_targets<S: AsRef<str>>(target: &str, qualified_list: &[S]) -> Vec<String> {
    qualified_list
        .iter()
        .map(AsRef::as_ref)
        .filter(|q| parse_qualified_target(q).target == target)
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_partial_names() {
        assert_eq!(
            parse_qualified_target("name"),
            QualifiedTarget {
                build_file: None,
                target: "name".into(),
                toolset: None
            }
        );
        assert_eq!(
            parse_qualified_target("C:/src/a.gyp:t").build_file.as_deref(),
            Some("C:/src/a.gyp")
        );
    }

    #[test]
    fn format_round_trips() {
        let name = qualified_target("a/b.gyp", "t", Some("target"));
        assert_eq!(name, "a/b.gyp:t#target");
        assert_eq!(parse_qualified_target(&name).to_string(), name);
        assert_eq!(qualified_target("a.gyp", "t", None), "a.gyp:t");
    }

    #[test]
    fn resolve_relative_to_referrer() {
        let resolved = resolve_target(Some("src/net/net.gyp"), "../base/base.gyp:base", None);
        assert_eq!(resolved.build_file.as_deref(), Some("src/base/base.gyp"));
        assert_eq!(resolved.target, "base");

        let local = resolve_target(Some("src/net/net.gyp"), "net_unittests#host", Some("target"));
        assert_eq!(local.build_file.as_deref(), Some("src/net/net.gyp"));
        assert_eq!(local.toolset.as_deref(), Some("host"));
    }

    #[test]
    fn find_by_target_name() {
        let list = ["a.gyp:x#target", "b.gyp:y#target", "c.gyp:x#host"];
        assert_eq!(
            find_qualified_targets("x", &list),
            vec!["a.gyp:x#target", "c.gyp:x#host"]
        );
        assert_eq!(build_file("a.gyp:x#target").as_deref(), Some("a.gyp"));
    }
}
