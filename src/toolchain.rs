//! Toolchain and host capability probing.
//!
//! Everything later stages need to know about the compiler and the machine
//! is gathered here once and handed on as plain data; nothing downstream
//! looks at raw probe output.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use log::debug;
use regex::Regex;
use target_lexicon::Triple;

use crate::error::DriverError;
use crate::process::{CommandRunner, CompilerCommand, Input};

/// Directories always searched after the driver's own directory.
const STANDARD_DIRS: &str = "/bin:/usr/bin:/usr/local/bin:/sbin:/usr/sbin";

/// Where clang installs its per-version resource directories.
pub const CLANG_LIB_ROOT: &str = "/usr/lib/clang";

static CLANG_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)clang version ((\d+)\.(\d+)(?:\.\d+)?)").expect("valid regex"));

static LIBC_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)\.(\d+)").expect("valid regex"));

/// Search path used for the compiler and every companion executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath(OsString);

impl SearchPath {
    pub fn new(path: impl Into<OsString>) -> Self {
        SearchPath(path.into())
    }

    /// The driver's own directory first, then the standard system
    /// directories, then whatever `PATH` the driver inherited.
    pub fn for_driver(driver_dir: Option<&Path>, inherited: Option<&OsStr>) -> Self {
        let mut path = OsString::new();
        if let Some(dir) = driver_dir {
            path.push(dir);
            path.push(":");
        }
        path.push(STANDARD_DIRS);
        path.push(":");
        if let Some(inherited) = inherited {
            path.push(inherited);
        }
        SearchPath(path)
    }

    pub fn find(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        which::which_in(program, Some(&self.0), cwd).ok()
    }

    pub fn as_os_str(&self) -> &OsStr {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerWidth {
    Bits32,
    Bits64,
}

impl PointerWidth {
    pub fn host() -> Self {
        match Triple::host().pointer_width() {
            Ok(target_lexicon::PointerWidth::U64) | Err(()) => PointerWidth::Bits64,
            Ok(_) => PointerWidth::Bits32,
        }
    }
}

/// Host facts needed before any compiler is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub pointer_width: PointerWidth,
    pub valgrind: Option<PathBuf>,
    /// Compiler used for the cross-check pass.
    pub alternate_compiler: Option<PathBuf>,
}

impl HostInfo {
    pub fn detect(search_path: &SearchPath) -> Self {
        let host = HostInfo {
            pointer_width: PointerWidth::host(),
            valgrind: search_path.find("valgrind"),
            alternate_compiler: search_path.find("gcc"),
        };
        debug!("host: {:?}", host);
        host
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerVersion {
    /// Version as printed, e.g. `14.0.6`.
    pub full: String,
    pub major: u32,
    pub minor: u32,
}

impl CompilerVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        CompilerVersion {
            full: format!("{major}.{minor}.{patch}"),
            major,
            minor,
        }
    }

    /// Extracts the version from a `--version` banner.
    pub fn parse(banner: &str) -> Option<Self> {
        let caps = CLANG_VERSION_RE.captures(banner)?;
        Some(CompilerVersion {
            full: caps[1].to_string(),
            major: caps[2].parse().ok()?,
            minor: caps[3].parse().ok()?,
        })
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibcVersion {
    pub major: u32,
    pub minor: u32,
}

impl LibcVersion {
    pub fn parse(banner: &str) -> Option<Self> {
        let caps = LIBC_VERSION_RE.captures(banner)?;
        Some(LibcVersion {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
        })
    }

    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// Result of the one-shot toolchain probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainInfo {
    pub compiler_version: CompilerVersion,
    /// Only probed for 32-bit address sanitizer builds.
    pub libc_version: Option<LibcVersion>,
    pub pointer_width: PointerWidth,
    /// Version-specific sanitizer runtime directory, if it exists.
    pub sanitizer_runtime_dir: Option<PathBuf>,
}

/// Places under `lib_root` the sanitizer runtime may live for `version`,
/// most specific first.
pub fn runtime_dir_candidates(lib_root: &Path, version: &CompilerVersion) -> Vec<PathBuf> {
    let runtime_dir = |name: &str| lib_root.join(name).join("lib").join("linux");
    let mut dirs = vec![runtime_dir(&version.full)];
    let by_major = runtime_dir(&version.major.to_string());
    if !dirs.contains(&by_major) {
        dirs.push(by_major);
    }
    dirs
}

/// Probes `compiler` for its version.
///
/// An unparsable banner is fatal. The C library version is only probed when
/// `with_libc` is set, and failing to get it is not. The runtime directory
/// is the first existing candidate under `lib_root`.
pub fn probe(
    compiler: &str,
    pointer_width: PointerWidth,
    with_libc: bool,
    lib_root: &Path,
    runner: &mut dyn CommandRunner,
) -> Result<ToolchainInfo, DriverError> {
    let banner = runner
        .capture(&CompilerCommand::new(compiler).arg("--version"), Input::Null)
        .map_err(|e| {
            debug!("{e}");
            DriverError::ToolchainProbe(compiler.to_string())
        })?;
    debug!("clang version: {}", banner.text.trim_end());

    let compiler_version =
        CompilerVersion::parse(&banner.text).ok_or_else(|| DriverError::ToolchainProbe(compiler.to_string()))?;

    let libc_version = if with_libc { probe_libc(runner) } else { None };

    let sanitizer_runtime_dir = runtime_dir_candidates(lib_root, &compiler_version)
        .into_iter()
        .find(|dir| dir.is_dir());

    Ok(ToolchainInfo {
        compiler_version,
        libc_version,
        pointer_width,
        sanitizer_runtime_dir,
    })
}

fn probe_libc(runner: &mut dyn CommandRunner) -> Option<LibcVersion> {
    match runner.capture(&CompilerCommand::new("ldd").arg("--version"), Input::Null) {
        Ok(out) => {
            debug!("libc version: {}", out.text.lines().next().unwrap_or_default());
            LibcVersion::parse(&out.text)
        }
        Err(e) => {
            debug!("{e}");
            None
        }
    }
}
