//! Sanitizer policy.
//!
//! Turns a resolved [`Config`] and the probed toolchain into the concrete
//! flags for the instrumented compile. Nothing here touches the file system
//! or spawns processes; every fact it needs arrives through [`HostInfo`] or
//! [`ToolchainInfo`].

use log::debug;

use crate::driver::cli::{Config, MainInterception, SanitizerMode, SharedRuntime};
use crate::error::DriverError;
use crate::toolchain::{HostInfo, PointerWidth, ToolchainInfo};

/// Undefined-behaviour flags, also the exact pair dropped by the link
/// workaround retry.
pub const UBSAN_FLAGS: [&str; 2] = ["-fsanitize=undefined", "-fno-sanitize-recover=undefined,integer"];

/// Warning and language flags understood by both clang and gcc.
pub const COMMON_FLAGS: &[&str] = &[
    "-Wall",
    "-Wno-unused",
    "-Wunused-variable",
    "-Wunused-value",
    "-Wno-unused-result",
    "-std=gnu11",
    "-g",
    "-lm",
];

const CLANG_ONLY_FLAGS: &[&str] = &[
    "-Wunused-comparison",
    "-fno-omit-frame-pointer",
    "-fno-common",
    "-funwind-tables",
    "-fno-optimize-sibling-calls",
    "-Qunused-arguments",
];

const COLOR_FLAGS: &[&str] = &["-fcolor-diagnostics", "-fdiagnostics-color"];

/// Appended to [`COMMON_FLAGS`] for the gcc cross-check, which only looks
/// for diagnostics and throws its output away.
const CROSS_CHECK_FLAGS: &[&str] = &["-Wunused-but-set-variable", "-O", "-o", "/dev/null"];

/// Flags for one instrumented build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizerPlan {
    pub sanitizer_flags: Vec<String>,
    pub style_flags: Vec<String>,
    /// Appended last to the primary compile; position sensitive.
    pub main_flag: Option<&'static str>,
    /// Undefined-behaviour checks were left out because this 32-bit libc and
    /// compiler pair cannot link them.
    pub libc_workaround: bool,
}

/// Replaces a configuration the host cannot build with one it can.
///
/// MemorySanitizer needs a 64-bit host; on 32-bit hosts valgrind stands in
/// when it is installed.
pub fn resolve_fallback(config: Config, host: &HostInfo) -> Result<Config, DriverError> {
    if config.sanitizer != SanitizerMode::Memory || host.pointer_width == PointerWidth::Bits64 {
        return Ok(config);
    }
    match &host.valgrind {
        Some(valgrind) => {
            debug!("32-bit host, using {} instead of MemorySanitizer", valgrind.display());
            Ok(Config {
                sanitizer: SanitizerMode::Valgrind,
                ..config
            })
        }
        None => Err(DriverError::UnsupportedConfiguration),
    }
}

/// Whether the C library version matters for this build.
pub fn needs_libc_probe(config: &Config, pointer_width: PointerWidth) -> bool {
    config.sanitizer == SanitizerMode::Address && pointer_width == PointerWidth::Bits32
}

/// Computes the instrumented build's flags.
pub fn plan(config: &Config, toolchain: &ToolchainInfo) -> SanitizerPlan {
    let version = &toolchain.compiler_version;
    let mut sanitizer_flags: Vec<String> = Vec::new();

    let libc_workaround = needs_libc_probe(config, toolchain.pointer_width)
        && toolchain.libc_version.is_some_and(|libc| libc.at_least(2, 27))
        && !version.at_least(6, 0);

    match config.sanitizer {
        SanitizerMode::Valgrind => {}
        SanitizerMode::Memory => sanitizer_flags.push("-fsanitize=memory".to_string()),
        SanitizerMode::Address => sanitizer_flags.push("-fsanitize=address".to_string()),
    }

    // memory mode gets no undefined-behaviour checks at all
    if config.sanitizer != SanitizerMode::Memory && !libc_workaround {
        sanitizer_flags.push(UBSAN_FLAGS[0].to_string());
        if version.at_least(3, 6) {
            sanitizer_flags.push(UBSAN_FLAGS[1].to_string());
        }
    }

    if config.sanitizer == SanitizerMode::Address {
        let shared = match config.shared_runtime {
            SharedRuntime::Auto => version.at_least(7, 0),
            SharedRuntime::On => true,
            SharedRuntime::Off => false,
        };
        if shared && let Some(dir) = &toolchain.sanitizer_runtime_dir {
            sanitizer_flags.push("-shared-libasan".to_string());
            sanitizer_flags.push(format!("-Wl,-rpath,{}", dir.display()));
        }
    }

    SanitizerPlan {
        sanitizer_flags,
        style_flags: style_flags(config.colorize),
        main_flag: main_flag(config.main_interception),
        libc_workaround,
    }
}

pub fn style_flags(colorize: bool) -> Vec<String> {
    let color: &[&str] = if colorize { COLOR_FLAGS } else { &[] };
    COMMON_FLAGS
        .iter()
        .chain(CLANG_ONLY_FLAGS)
        .chain(color)
        .map(|f| f.to_string())
        .collect()
}

pub fn main_flag(strategy: MainInterception) -> Option<&'static str> {
    match strategy {
        MainInterception::LinkerWrap => Some("-Wl,-wrap,main"),
        MainInterception::IfdefReplace => Some("-Dmain=__real_main"),
        MainInterception::Disabled => None,
    }
}

/// Flags for the uninstrumented gcc pass, after the user's arguments.
pub fn cross_check_flags() -> Vec<String> {
    COMMON_FLAGS
        .iter()
        .chain(CROSS_CHECK_FLAGS)
        .map(|f| f.to_string())
        .collect()
}
