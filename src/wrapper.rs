//! Wrapper source generation.
//!
//! The wrapper is a fixed C template with `__DCC_<FIELD>__` placeholders.
//! Every placeholder must name a [`TemplateField`] and every field must be
//! used, so a template edit that drifts from this module fails loudly
//! instead of compiling a half-configured wrapper.

use std::borrow::Cow;
use std::path::Path;
use std::sync::LazyLock;

use hashbrown::HashSet;
use regex::Regex;
use thiserror::Error;

use crate::driver::cli::{Config, MainInterception, SanitizerMode};
use crate::embed::archive;
use crate::toolchain::ToolchainInfo;

pub const TEMPLATE: &str = include_str!("wrapper/main_wrapper.c");

/// Written at high debug levels so the wrapper can be compiled by hand.
pub const DEBUG_WRAPPER_FILE: &str = "dcc_main_wrapper.c";

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"__DCC_([A-Z0-9_]+?)__").expect("valid regex"));

/// Shared build-farm mount points that must be reached through `/home/`.
static MOUNT_PREFIXES: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"/tmp_amd/\w+/\w+ort/\w+/\d+/").expect("valid regex"),
        Regex::new(r"^/tmp_amd/\w+/\w+ort/\d+/").expect("valid regex"),
        Regex::new(r"^/(import|export)/\w+/\d+/").expect("valid regex"),
    ]
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("wrapper template uses unknown placeholder __DCC_{0}__")]
    UnknownPlaceholder(String),
    #[error("wrapper template never uses __DCC_{0}__")]
    UnusedField(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateField {
    Path,
    Sanitizer,
    SanitizerIsAddress,
    SanitizerIsMemory,
    SanitizerIsValgrind,
    LeakCheckYesNo,
    LeakCheck10,
    SuppressionsFile,
    StackUseAfterReturn,
    NoWrapMain,
    MainSymbol,
    ClangVersionMajor,
    ClangVersionMinor,
    EmbedSource,
    EmbeddedArchive,
    MonitorValgrind,
}

impl TemplateField {
    pub const ALL: [TemplateField; 16] = [
        TemplateField::Path,
        TemplateField::Sanitizer,
        TemplateField::SanitizerIsAddress,
        TemplateField::SanitizerIsMemory,
        TemplateField::SanitizerIsValgrind,
        TemplateField::LeakCheckYesNo,
        TemplateField::LeakCheck10,
        TemplateField::SuppressionsFile,
        TemplateField::StackUseAfterReturn,
        TemplateField::NoWrapMain,
        TemplateField::MainSymbol,
        TemplateField::ClangVersionMajor,
        TemplateField::ClangVersionMinor,
        TemplateField::EmbedSource,
        TemplateField::EmbeddedArchive,
        TemplateField::MonitorValgrind,
    ];

    /// Placeholder name between `__DCC_` and `__`.
    pub fn name(self) -> &'static str {
        match self {
            TemplateField::Path => "PATH",
            TemplateField::Sanitizer => "SANITIZER",
            TemplateField::SanitizerIsAddress => "SANITIZER_IS_ADDRESS",
            TemplateField::SanitizerIsMemory => "SANITIZER_IS_MEMORY",
            TemplateField::SanitizerIsValgrind => "SANITIZER_IS_VALGRIND",
            TemplateField::LeakCheckYesNo => "LEAK_CHECK_YES_NO",
            TemplateField::LeakCheck10 => "LEAK_CHECK_1_0",
            TemplateField::SuppressionsFile => "SUPPRESSIONS_FILE",
            TemplateField::StackUseAfterReturn => "STACK_USE_AFTER_RETURN",
            TemplateField::NoWrapMain => "NO_WRAP_MAIN",
            TemplateField::MainSymbol => "MAIN_SYMBOL",
            TemplateField::ClangVersionMajor => "CLANG_VERSION_MAJOR",
            TemplateField::ClangVersionMinor => "CLANG_VERSION_MINOR",
            TemplateField::EmbedSource => "EMBED_SOURCE",
            TemplateField::EmbeddedArchive => "EMBEDDED_ARCHIVE",
            TemplateField::MonitorValgrind => "MONITOR_VALGRIND",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Everything the wrapper is specialised on.
pub struct WrapperValues<'a> {
    pub config: &'a Config,
    pub toolchain: &'a ToolchainInfo,
    /// Driver path as the binary should call it, see [`self_path`].
    pub driver_path: String,
    /// Compressed archive, present when sources are embedded.
    pub archive: Option<&'a [u8]>,
}

fn flag(on: bool) -> Cow<'static, str> {
    Cow::Borrowed(if on { "1" } else { "0" })
}

impl WrapperValues<'_> {
    pub fn value(&self, field: TemplateField) -> Cow<'_, str> {
        let config = self.config;
        match field {
            TemplateField::Path => c_escape(&self.driver_path),
            TemplateField::Sanitizer => Cow::Borrowed(config.sanitizer.as_str()),
            TemplateField::SanitizerIsAddress => flag(config.sanitizer == SanitizerMode::Address),
            TemplateField::SanitizerIsMemory => flag(config.sanitizer == SanitizerMode::Memory),
            TemplateField::SanitizerIsValgrind => flag(config.sanitizer == SanitizerMode::Valgrind),
            TemplateField::LeakCheckYesNo => Cow::Borrowed(if config.leak_check { "yes" } else { "no" }),
            TemplateField::LeakCheck10 => flag(config.leak_check),
            TemplateField::SuppressionsFile => c_escape(&config.suppressions),
            TemplateField::StackUseAfterReturn => flag(config.stack_use_after_return),
            TemplateField::NoWrapMain => flag(config.main_interception == MainInterception::Disabled),
            TemplateField::MainSymbol => Cow::Borrowed(main_symbol(config.main_interception)),
            TemplateField::ClangVersionMajor => Cow::Owned(self.toolchain.compiler_version.major.to_string()),
            TemplateField::ClangVersionMinor => Cow::Owned(self.toolchain.compiler_version.minor.to_string()),
            TemplateField::EmbedSource => flag(self.archive.is_some()),
            TemplateField::EmbeddedArchive => match self.archive {
                Some(bytes) => Cow::Owned(archive::c_array(bytes)),
                None => Cow::Borrowed(""),
            },
            TemplateField::MonitorValgrind => Cow::Owned(self.valgrind_monitor()),
        }
    }

    /// Shell command the valgrind-wrapped program pipes its errors into.
    ///
    /// With an embedded archive the monitor script is unpacked from the
    /// archive written to the command's stdin, so the binary keeps working
    /// without the driver installed.
    fn valgrind_monitor(&self) -> String {
        match self.archive {
            Some(bytes) => format!(
                "python3 -E -c \\\"import os,sys,tarfile,tempfile\\n\\\n\
                 with tempfile.TemporaryDirectory() as temp_dir:\\n\\\n\
                 \x20   tarfile.open(fileobj=sys.stdin.buffer, bufsize={}, mode='r|gz').extractall(temp_dir)\\n\\\n\
                 \x20   os.chdir(temp_dir)\\n\\\n\
                 \x20   exec(open('watch_valgrind.py').read())\\n\\\n\
                 \\\"",
                bytes.len()
            ),
            None => format!("{} --watch-stdin-for-valgrind-errors", c_escape(&self.driver_path)),
        }
    }
}

pub fn main_symbol(strategy: MainInterception) -> &'static str {
    match strategy {
        MainInterception::IfdefReplace => "main",
        MainInterception::LinkerWrap | MainInterception::Disabled => "__wrap_main",
    }
}

/// Escapes text for use inside a C string literal. Control characters
/// become three-digit octal escapes.
fn c_escape(text: &str) -> Cow<'_, str> {
    if !text.chars().any(|c| c == '\\' || c == '"' || c.is_ascii_control()) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            c if c.is_ascii_control() => escaped.push_str(&format!("\\{:03o}", c as u32)),
            c => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// The driver's path with build-farm mount prefixes rewritten to `/home/`.
pub fn self_path(path: &Path) -> String {
    let mut path = path.to_string_lossy().into_owned();
    for prefix in MOUNT_PREFIXES.iter() {
        path = prefix.replace_all(&path, "/home/").into_owned();
    }
    path
}

/// Substitutes every placeholder in `template` in a single pass.
pub fn render(template: &str, values: &WrapperValues<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut used: HashSet<TemplateField> = HashSet::new();
    let mut last = 0;

    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let field = TemplateField::from_name(name.as_str())
            .ok_or_else(|| TemplateError::UnknownPlaceholder(name.as_str().to_string()))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&values.value(field));
        used.insert(field);
        last = whole.end();
    }
    out.push_str(&template[last..]);

    if let Some(unused) = TemplateField::ALL.into_iter().find(|f| !used.contains(f)) {
        return Err(TemplateError::UnusedField(unused.name()));
    }
    Ok(out)
}

/// Renders the built-in wrapper template.
pub fn wrapper_source(values: &WrapperValues<'_>) -> Result<String, TemplateError> {
    render(TEMPLATE, values)
}

#[cfg(test)]
mod tests_wrapper;
