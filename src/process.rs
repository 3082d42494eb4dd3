//! Child process execution.
//!
//! Every compiler, probe and companion invocation goes through a
//! [`CommandRunner`] so the driver's control flow can be exercised without a
//! real toolchain.

use std::ffi::OsString;
use std::fmt;
use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};

use itertools::Itertools;

use crate::error::DriverError;

/// A program and its arguments, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl CompilerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        CompilerCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Drops every argument equal to one of `unwanted`.
    pub fn without(&self, unwanted: &[&str]) -> Self {
        CompilerCommand {
            program: self.program.clone(),
            args: self
                .args
                .iter()
                .filter(|a| !unwanted.contains(&a.as_str()))
                .cloned()
                .collect(),
        }
    }

    pub fn contains(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    fn spawn_error(&self, source: std::io::Error) -> DriverError {
        DriverError::Spawn {
            program: self.program.clone(),
            source,
        }
    }
}

impl fmt::Display for CompilerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", std::iter::once(&self.program).chain(&self.args).join(" "))
    }
}

/// What to connect to the child's stdin.
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Null,
    Text(&'a str),
}

/// Combined stdout and stderr of a finished child, plus its exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub text: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait CommandRunner {
    /// Runs the command to completion, capturing its merged output.
    fn capture(&mut self, command: &CompilerCommand, input: Input<'_>) -> Result<CommandOutput, DriverError>;

    /// Runs the command with inherited stdio and returns its exit code.
    fn status(&mut self, command: &CompilerCommand) -> Result<i32, DriverError>;
}

/// Runs commands as real child processes with the driver's search path.
pub struct SystemRunner {
    search_path: OsString,
}

impl SystemRunner {
    pub fn new(search_path: OsString) -> Self {
        SystemRunner { search_path }
    }

    fn command(&self, command: &CompilerCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args).env("PATH", &self.search_path);
        cmd
    }
}

impl CommandRunner for SystemRunner {
    fn capture(&mut self, command: &CompilerCommand, input: Input<'_>) -> Result<CommandOutput, DriverError> {
        let (mut reader, writer) = std::io::pipe().map_err(|e| command.spawn_error(e))?;
        let writer_err = writer.try_clone().map_err(|e| command.spawn_error(e))?;

        // the Command owns the parent's copies of the write end; it must be
        // dropped before reading or the pipe never reaches EOF
        let mut child = {
            let mut cmd = self.command(command);
            cmd.stdout(writer).stderr(writer_err);
            match input {
                Input::Null => cmd.stdin(Stdio::null()),
                Input::Text(_) => cmd.stdin(Stdio::piped()),
            };
            cmd.spawn().map_err(|e| command.spawn_error(e))?
        };

        let stdin = child.stdin.take();
        let mut raw = Vec::new();
        std::thread::scope(|scope| {
            if let (Some(mut stdin), Input::Text(text)) = (stdin, input) {
                scope.spawn(move || {
                    // a compiler that gives up early closes its stdin
                    let _ = stdin.write_all(text.as_bytes());
                });
            }
            reader.read_to_end(&mut raw)
        })?;

        let status = child.wait()?;
        Ok(CommandOutput {
            text: String::from_utf8_lossy(&raw).into_owned(),
            code: exit_code(status),
        })
    }

    fn status(&mut self, command: &CompilerCommand) -> Result<i32, DriverError> {
        let status = self
            .command(command)
            .status()
            .map_err(|e| command.spawn_error(e))?;
        Ok(exit_code(status))
    }
}

/// Exit code as a shell would report it.
fn exit_code(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(1)
}
