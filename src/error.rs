use std::path::PathBuf;

use thiserror::Error;

use crate::wrapper::TemplateError;

pub const USAGE: &str = "Usage: dcc [--valgrind|--memory|--leak-check|--no-explanations|--no-shared-libasan|--no-embed-source] [clang-arguments] <c-files>";

/// Fatal driver errors. Compiler failures are not errors: their exit status
/// is propagated as-is by the executor.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("{USAGE}")]
    Usage,

    #[error("will not overwrite {} with machine code", .0.display())]
    WouldOverwriteSource(PathBuf),

    #[error("Can not get version information for '{0}'")]
    ToolchainProbe(String),

    #[error("uninitialized value checking not supported on 32-bit architectures")]
    UnsupportedConfiguration,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("internal error: {0}")]
    Template(#[from] TemplateError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    pub fn exit_code(&self) -> i32 {
        1
    }
}
