use std::sync::LazyLock;

use itertools::Itertools;
use regex::Regex;
use thiserror::Error;

static NEEDS_QUOTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\t\n #$%&'()*;<=>?\[{|}~]|^$").unwrap());
static NEEDS_ESCAPING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(["\\`])"#).unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShellSplitError {
    #[error("No closing quotation or escaped character in {0:?}")]
    Unbalanced(String),
}

/// Quote `argument` so that a POSIX shell reads it back as a single word.
///
/// Arguments containing shell metacharacters (or nothing at all) are wrapped in double quotes;
/// `"`, `\` and `` ` `` are always backslash-escaped.
pub fn encode_posix_shell_argument(argument: &str) -> String {
    let quote = if NEEDS_QUOTING.is_match(argument) {
        "\""
    } else {
        ""
    };

    let escaped = NEEDS_ESCAPING.replace_all(argument, "\\${1}");
    format!("{quote}{escaped}{quote}")
}

pub fn encode_posix_shell_list<I, S>(arguments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    arguments
        .into_iter()
        .map(|a| encode_posix_shell_argument(a.as_ref()))
        .join(" ")
}

/// Split `input` into words the way a POSIX shell would, without performing any expansion.
pub fn split_posix_shell(input: &str) -> Result<Vec<String>, ShellSplitError> {
    shlex::split(input).ok_or_else(|| ShellSplitError::Unbalanced(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encode_plain_and_special() {
        assert_eq!(encode_posix_shell_argument("abc"), "abc");
        assert_eq!(encode_posix_shell_argument(""), "\"\"");
        assert_eq!(encode_posix_shell_argument("a b"), "\"a b\"");
        assert_eq!(encode_posix_shell_argument("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(encode_posix_shell_argument("back\\slash"), "back\\\\slash");
        assert_eq!(encode_posix_shell_argument("x=1"), "\"x=1\"");
    }

    #[test]
    fn encode_list() {
        assert_eq!(encode_posix_shell_list(["-DFOO", "a b", ""]), "-DFOO \"a b\" \"\"");
    }

    #[test]
    fn split_words() {
        assert_eq!(
            split_posix_shell("  a 'b c'  \"d \\\"e\\\"\" f\\ g ").unwrap(),
            vec!["a", "b c", "d \"e\"", "f g"]
        );
        assert_eq!(split_posix_shell("OS=linux use_x=1").unwrap(), vec!["OS=linux", "use_x=1"]);
        assert_eq!(split_posix_shell("''").unwrap(), vec![""]);
        assert!(split_posix_shell("").unwrap().is_empty());
    }

    #[test]
    fn split_errors() {
        for input in ["'open", "say \"hi", "trail\\"] {
            assert_eq!(
                split_posix_shell(input),
                Err(ShellSplitError::Unbalanced(input.to_string()))
            );
        }
    }

    #[test]
    fn encoded_list_splits_back() {
        let args = ["plain", "with space", "quote\"d", "", "$HOME"];
        assert_eq!(split_posix_shell(&encode_posix_shell_list(args)).unwrap(), args);
    }
}
