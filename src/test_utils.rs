//! Shared helpers for the driver's unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use crate::driver::cli::{Config, DriverEnv, Resolution, resolve};
use crate::embed::SourceTree;
use crate::error::DriverError;
use crate::process::{CommandOutput, CommandRunner, CompilerCommand, Input};
use crate::toolchain::SearchPath;

/// Banner printed by a typical clang 14 install.
pub const CLANG_14_BANNER: &str = "Ubuntu clang version 14.0.6\nTarget: x86_64-pc-linux-gnu\nThread model: posix\n";

/// A clang new enough for every feature.
pub const CLANG_UNINSTALLED_BANNER: &str = "clang version 99.0.1\nTarget: x86_64-pc-linux-gnu\n";

/// One recorded invocation: the command and whatever was fed on stdin.
#[derive(Debug, Clone)]
pub struct Call {
    pub command: CompilerCommand,
    pub stdin: Option<String>,
    pub captured: bool,
}

/// A [`CommandRunner`] that never spawns anything.
///
/// Responses are handed out in order; a `None` response simulates a spawn
/// failure. Once the script runs out every command succeeds silently.
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Vec<Call>,
    script: VecDeque<Option<CommandOutput>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, text: &str, code: i32) -> Self {
        self.script.push_back(Some(CommandOutput {
            text: text.to_string(),
            code,
        }));
        self
    }

    pub fn then_spawn_failure(mut self) -> Self {
        self.script.push_back(None);
        self
    }

    pub fn programs(&self) -> Vec<&str> {
        self.calls.iter().map(|c| c.command.program.as_str()).collect()
    }

    fn next(&mut self, command: &CompilerCommand) -> Result<CommandOutput, DriverError> {
        match self.script.pop_front() {
            Some(Some(out)) => Ok(out),
            Some(None) => Err(DriverError::Spawn {
                program: command.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            None => Ok(CommandOutput::default()),
        }
    }
}

impl CommandRunner for RecordingRunner {
    fn capture(&mut self, command: &CompilerCommand, input: Input<'_>) -> Result<CommandOutput, DriverError> {
        self.calls.push(Call {
            command: command.clone(),
            stdin: match input {
                Input::Null => None,
                Input::Text(text) => Some(text.to_string()),
            },
            captured: true,
        });
        self.next(command)
    }

    fn status(&mut self, command: &CompilerCommand) -> Result<i32, DriverError> {
        self.calls.push(Call {
            command: command.clone(),
            stdin: None,
            captured: false,
        });
        self.next(command).map(|out| out.code)
    }
}

/// Environment with no colour, no debug output and an empty search path.
pub fn test_env() -> DriverEnv {
    DriverEnv {
        debug: 0,
        colorize: false,
        search_path: SearchPath::new("/nonexistent"),
        driver_path: PathBuf::from("/usr/local/bin/dcc"),
        helper_dir: PathBuf::from("/nonexistent"),
        clang_lib_root: PathBuf::from("/nonexistent"),
    }
}

pub fn args(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|t| t.to_string()).collect()
}

/// Resolves `tokens` in [`test_env`], expecting a compile.
pub fn config(tokens: &[&str]) -> Config {
    match resolve(&args(tokens), &test_env()) {
        Ok(Resolution::Compile(config)) => config,
        other => panic!("expected a compile for {tokens:?}, got {other:?}"),
    }
}

/// In-memory files that remember every path asked for.
#[derive(Default)]
pub struct MemoryTree {
    pub files: HashMap<PathBuf, Vec<u8>>,
    pub accessed: RefCell<Vec<PathBuf>>,
}

impl MemoryTree {
    pub fn with(mut self, path: &str, contents: &str) -> Self {
        self.files.insert(PathBuf::from(path), contents.as_bytes().to_vec());
        self
    }

    fn lookup(&self, path: &Path) -> io::Result<&Vec<u8>> {
        self.accessed.borrow_mut().push(path.to_path_buf());
        self.files
            .get(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))
    }
}

impl SourceTree for MemoryTree {
    fn file_size(&self, path: &Path) -> io::Result<u64> {
        self.lookup(path).map(|f| f.len() as u64)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lookup(path).cloned()
    }
}
