//! Compiler diagnostics output
//!
//! Captured compiler output is either written as-is or handed to the
//! `dcc-explain` companion, which adds plain-language explanations.

use std::io::Write;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::DriverError;
use crate::process::{CommandRunner, CompilerCommand, Input};

use super::cli::Config;

/// Companion executable that explains compiler messages.
pub const EXPLAINER: &str = "dcc-explain";

pub struct Reporter<W: Write> {
    explainer: Option<PathBuf>,
    sink: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(explainer: Option<PathBuf>, sink: W) -> Self {
        Reporter { explainer, sink }
    }

    /// Writes compiler output, explained when possible.
    ///
    /// Falls back to the raw text if explanations are off, the explainer is
    /// not installed, or it fails.
    pub fn report(&mut self, text: &str, config: &Config, runner: &mut dyn CommandRunner) -> Result<(), DriverError> {
        if config.explanations
            && let Some(explainer) = &self.explainer
        {
            let command = explain_command(explainer, config);
            match runner.capture(&command, Input::Text(text)) {
                Ok(out) if out.success() => {
                    self.sink.write_all(out.text.as_bytes())?;
                    return Ok(());
                }
                Ok(out) => debug!("{} exited with status {}", command.program, out.code),
                Err(e) => debug!("{e}"),
            }
        }
        self.sink.write_all(text.as_bytes())?;
        self.sink.flush()?;
        Ok(())
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }
}

fn explain_command(explainer: &Path, config: &Config) -> CompilerCommand {
    CompilerCommand::new(explainer.to_string_lossy())
        .arg(format!("--max-explanations={}", config.max_explanations))
        .arg(if config.colorize { "--colorize" } else { "--no-colorize" })
}
