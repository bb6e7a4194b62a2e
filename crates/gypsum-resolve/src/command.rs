//! Running `<!(...)` command substitutions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::condition::Expr;
use crate::errors::{GypError, GypResult};

/// How a substitution asked for its command to be run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandLine {
    /// Handed to `sh -c`.
    Shell(String),
    /// Executed directly, without a shell.
    Argv(Vec<String>),
}

impl CommandLine {
    pub fn display(&self) -> String {
        match self {
            CommandLine::Shell(cmd) => cmd.clone(),
            CommandLine::Argv(argv) => argv.join(" "),
        }
    }
}

/// Memoized work for the duration of one resolution run.
#[derive(Default)]
pub struct RunCache {
    commands: RefCell<HashMap<(CommandLine, Option<String>), String>>,
    pub(crate) conditions: RefCell<HashMap<String, Rc<Expr>>>,
}

impl RunCache {
    /// Run `command` in `cwd` (the current directory when `None`) and return its standard output
    /// with trailing whitespace removed. Identical commands in the same directory run once.
    pub fn run(
        &self,
        command: &CommandLine,
        cwd: Option<&str>,
        build_file: &str,
    ) -> GypResult<String> {
        let key = (command.clone(), cwd.map(String::from));
        if let Some(cached) = self.commands.borrow().get(&key) {
            debug!(command = %command.display(), "Using cached command output");
            return Ok(cached.clone());
        }

        debug!(command = %command.display(), cwd = ?cwd, "Executing command");
        let mut process = match command {
            CommandLine::Shell(cmd) => {
                let mut c = Command::new("sh");
                c.arg("-c").arg(cmd);
                c
            }
            CommandLine::Argv(argv) => {
                let Some((program, args)) = argv.split_first() else {
                    return Err(GypError::Invalid(format!(
                        "Empty command array while in {build_file}"
                    ))
                    .into());
                };
                let mut c = Command::new(program);
                c.args(args);
                c
            }
        };
        if let Some(cwd) = cwd {
            process.current_dir(cwd);
        }

        let output = process
            .stdin(Stdio::null())
            .output()
            .map_err(|source| GypError::CommandSpawn {
                command: command.display(),
                build_file: build_file.to_string(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !stderr.is_empty() {
            warn!(command = %command.display(), "{}", stderr.trim_end());
        }

        if !output.status.success() || !stderr.is_empty() {
            return Err(GypError::CommandFailed {
                command: command.display(),
                build_file: build_file.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr,
            }
            .into());
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        self.commands.borrow_mut().insert(key, stdout.clone());
        Ok(stdout)
    }
}
