//! Compiler driver module

pub mod cli;
pub mod compiler;
pub mod output;

use std::io::{self, Write};

use log::debug;

use crate::embed::{FileTree, HELPER_SCRIPTS};
use crate::error::DriverError;
use crate::process::{CommandRunner, CompilerCommand, SystemRunner};
use crate::toolchain::HostInfo;

pub use cli::{Cli, Config, DriverEnv, Resolution};
pub use compiler::{CompilerDriver, Stage};
pub use output::{EXPLAINER, Reporter};

/// Monitor script run in watch mode.
const VALGRIND_MONITOR: &str = HELPER_SCRIPTS[2];

/// Carries out a resolved invocation and returns the exit code.
pub fn dispatch(resolution: Resolution, env: &DriverEnv, out: &mut impl Write) -> Result<i32, DriverError> {
    let mut runner = SystemRunner::new(env.search_path.as_os_str().to_owned());
    match resolution {
        Resolution::Version => {
            writeln!(out, "dcc version {}", cli::VERSION)?;
            Ok(0)
        }
        Resolution::Help => {
            write!(out, "{}", cli::HELP)?;
            Ok(0)
        }
        Resolution::WatchValgrind => watch_valgrind(env, &mut runner),
        Resolution::Compile(config) => {
            let host = HostInfo::detect(&env.search_path);
            let reporter = Reporter::new(env.search_path.find(EXPLAINER), io::stderr());
            CompilerDriver::new(config, env, host, &mut runner, &FileTree, reporter).run()
        }
    }
}

/// Runs the valgrind monitor on the driver's stdin, which the
/// instrumented program connects to valgrind's error stream.
pub fn watch_valgrind(env: &DriverEnv, runner: &mut dyn CommandRunner) -> Result<i32, DriverError> {
    let script = env.helper_dir.join(VALGRIND_MONITOR);
    if !script.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("{} not found", script.display())).into());
    }
    let command = CompilerCommand::new("python3").arg("-E").arg(script.to_string_lossy());
    debug!("{command}");
    runner.status(&command)
}
