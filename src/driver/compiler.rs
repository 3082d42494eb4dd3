//! Compilation pipeline orchestration module
//!
//! Drives one invocation through its stages: the instrumented compile with
//! the wrapper on stdin, a single retry without undefined-behaviour checks
//! when the runtime fails to link, reporting, and an advisory gcc pass that
//! catches warnings clang misses.

use std::io::Write;
use std::path::PathBuf;

use log::{debug, warn};

use crate::embed::{self, SourceTree};
use crate::error::DriverError;
use crate::process::{CommandOutput, CommandRunner, CompilerCommand, Input};
use crate::sanitizer::{self, SanitizerPlan, UBSAN_FLAGS};
use crate::toolchain::{self, HostInfo, ToolchainInfo};
use crate::wrapper::{self, DEBUG_WRAPPER_FILE, WrapperValues};

use super::cli::{Config, DriverEnv};
use super::output::Reporter;

/// Linker output that means the undefined-behaviour runtime is incomplete.
const WORKAROUND_TRIGGER: &str = "undefined reference to `__";

/// Alternate compiler used for the cross-check.
const CROSS_CHECK_COMPILER: &str = "gcc";

/// Executor states; see [`CompilerDriver::run`].
#[derive(Debug)]
pub enum Stage {
    Init,
    Incremental(CompilerCommand),
    PrimaryCompile { command: CompilerCommand, wrapper: String },
    Workaround { command: CompilerCommand, wrapper: String },
    Report(CommandOutput),
    CrossCheck,
    Exit(i32),
}

/// Main compiler driver
pub struct CompilerDriver<'a, W: Write> {
    config: Config,
    env: &'a DriverEnv,
    host: HostInfo,
    runner: &'a mut dyn CommandRunner,
    tree: &'a dyn SourceTree,
    reporter: Reporter<W>,
    debug_wrapper_path: PathBuf,
}

impl<'a, W: Write> CompilerDriver<'a, W> {
    pub fn new(
        config: Config,
        env: &'a DriverEnv,
        host: HostInfo,
        runner: &'a mut dyn CommandRunner,
        tree: &'a dyn SourceTree,
        reporter: Reporter<W>,
    ) -> Self {
        CompilerDriver {
            config,
            env,
            host,
            runner,
            tree,
            reporter,
            debug_wrapper_path: PathBuf::from(DEBUG_WRAPPER_FILE),
        }
    }

    /// Where the wrapper is left at debug level 2 and above.
    pub fn with_debug_wrapper_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_wrapper_path = path.into();
        self
    }

    pub fn reporter(&self) -> &Reporter<W> {
        &self.reporter
    }

    /// Runs every stage and returns the process exit code.
    ///
    /// Compile-only invocations go `Init -> Incremental -> Exit`; everything
    /// else goes `Init -> PrimaryCompile -> [Workaround] -> Report ->
    /// [CrossCheck] -> Exit`.
    pub fn run(&mut self) -> Result<i32, DriverError> {
        let mut stage = Stage::Init;
        loop {
            stage = match stage {
                Stage::Exit(code) => return Ok(code),
                stage => self.step(stage)?,
            };
        }
    }

    fn step(&mut self, stage: Stage) -> Result<Stage, DriverError> {
        match stage {
            Stage::Init => self.init(),
            Stage::Incremental(command) => {
                debug!("incremental compilation, running: {command}");
                self.runner.status(&command).map(Stage::Exit)
            }
            Stage::PrimaryCompile { command, wrapper } => {
                let output = self.runner.capture(&command, Input::Text(&wrapper))?;
                if output.text.contains(WORKAROUND_TRIGGER) {
                    Ok(Stage::Workaround { command, wrapper })
                } else {
                    Ok(Stage::Report(output))
                }
            }
            Stage::Workaround { command, wrapper } => {
                let command = command.without(&UBSAN_FLAGS);
                debug!("undefined reference to runtime helper, recompiling: {command}");
                let output = self.runner.capture(&command, Input::Text(&wrapper))?;
                Ok(Stage::Report(output))
            }
            Stage::Report(output) => {
                if !output.text.is_empty() {
                    self.reporter.report(&output.text, &self.config, &mut *self.runner)?;
                }
                Ok(if !output.success() {
                    Stage::Exit(output.code)
                } else if output.text.is_empty() {
                    Stage::CrossCheck
                } else {
                    Stage::Exit(0)
                })
            }
            Stage::CrossCheck => {
                self.cross_check()?;
                Ok(Stage::Exit(0))
            }
            Stage::Exit(code) => Ok(Stage::Exit(code)),
        }
    }

    fn init(&mut self) -> Result<Stage, DriverError> {
        // fallback is decided before any compiler runs
        self.config = sanitizer::resolve_fallback(self.config.clone(), &self.host)?;

        let with_libc = sanitizer::needs_libc_probe(&self.config, self.host.pointer_width);
        let toolchain = toolchain::probe(
            &self.config.compiler,
            self.host.pointer_width,
            with_libc,
            &self.env.clang_lib_root,
            &mut *self.runner,
        )?;
        let plan = sanitizer::plan(&self.config, &toolchain);
        if plan.libc_workaround {
            warn!("incompatible clang libc versions, disabling error detection by sanitizers");
        }

        if self.config.incremental {
            let command = CompilerCommand::new(&self.config.compiler)
                .args(plan.sanitizer_flags.iter().cloned())
                .args(plan.style_flags.iter().cloned())
                .args(self.config.compiler_args.iter().cloned());
            return Ok(Stage::Incremental(command));
        }

        let wrapper = self.wrapper_source(&toolchain)?;
        let command = self.primary_command(&plan);
        debug!("{command}");
        if self.config.debug > 1 {
            self.leave_debug_wrapper(&command, &wrapper);
        }
        Ok(Stage::PrimaryCompile { command, wrapper })
    }

    fn wrapper_source(&self, toolchain: &ToolchainInfo) -> Result<String, DriverError> {
        let archive = embed::embed_sources(
            self.config.embed_source,
            self.config.sources.iter().map(String::as_str),
            &self.env.helper_dir,
            self.tree,
        )?;
        let values = WrapperValues {
            config: &self.config,
            toolchain,
            driver_path: wrapper::self_path(&self.env.driver_path),
            archive: archive.as_deref(),
        };
        Ok(wrapper::wrapper_source(&values)?)
    }

    /// User arguments, then the stdin source, then instrumentation. The
    /// main-wrap flag must come after every input.
    fn primary_command(&self, plan: &SanitizerPlan) -> CompilerCommand {
        CompilerCommand::new(&self.config.compiler)
            .args(self.config.compiler_args.iter().cloned())
            .args(["-x", "c", "-"])
            .args(plan.sanitizer_flags.iter().cloned())
            .args(plan.style_flags.iter().cloned())
            .args(plan.main_flag)
    }

    fn leave_debug_wrapper(&self, command: &CompilerCommand, wrapper: &str) {
        let path = self.debug_wrapper_path.display();
        debug!("Leaving main_wrapper in {path} compile with this command:");
        debug!("{}", command.to_string().replace("-x c -", &path.to_string()));
        if let Err(e) = std::fs::write(&self.debug_wrapper_path, wrapper) {
            debug!("could not write {path}: {e}");
        }
    }

    fn cross_check(&mut self) -> Result<(), DriverError> {
        if self.host.alternate_compiler.is_none()
            || self.config.compiler.contains(CROSS_CHECK_COMPILER)
            || self.config.object_files
        {
            return Ok(());
        }

        let command = CompilerCommand::new(CROSS_CHECK_COMPILER)
            .args(self.config.compiler_args.iter().cloned())
            .args(sanitizer::cross_check_flags());
        debug!("compiling with gcc for extra checking");
        debug!("{command}");

        let output = self.runner.capture(&command, Input::Null)?;
        // gcc naming itself, e.g. rejecting a clang-only option
        if !output.text.is_empty() && !output.text.contains("command line") {
            self.reporter.report(&output.text, &self.config, &mut *self.runner)?;
        }
        Ok(())
    }
}
