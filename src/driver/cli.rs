//! CLI parsing and configuration module
//!
//! The driver accepts its own options mixed freely with compiler arguments,
//! so clap only captures the raw tokens. Resolution is a fold over those
//! tokens into a [`Config`]; every option is a [`Setting`] and later
//! settings replace earlier ones.

use std::ffi::{OsStr, OsString};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use clap::Parser as CliParser;
use indexmap::IndexSet;

use crate::error::DriverError;
use crate::toolchain::{CLANG_LIB_ROOT, SearchPath};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const HELP: &str = "
  --memory                 check for uninitialized variable using MemorySanitizer
  --leak-check             check for memory leaks, requires --valgrind to intercept errors
  --no-explanations        do not add explanations to compile-time error messages
  --no-embed-source        do not embed program source in binary
  --no-shared-libasan      do not link the address sanitizer runtime as a shared library
  --valgrind               check for uninitialized variables using Valgrind
  --use-after-return       check for use of local variables after function returns
  --wrap-main              intercept the user's main function with ld's -wrap option
  --ifdef-main             use ifdef to replace user's main function rather than ld's -wrap option
  --no-wrap-main           do not intercept the user's main function
  --c-compiler=COMPILER    compile with COMPILER instead of clang
";

/// Options that take their value as the following token.
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-I", "-L", "-l", "-D", "-U", "-include", "-isystem", "-iquote", "-idirafter", "-MF", "-MT", "-MQ",
    "-Xlinker", "-Xpreprocessor", "-Xassembler",
];

const DEFAULT_MAX_EXPLANATIONS: u32 = 3;

/// CLI interface using clap
#[derive(CliParser, Debug)]
#[command(
    name = "dcc",
    about = "Compile C programs with runtime error detection",
    disable_help_flag = true,
    disable_version_flag = true
)]
pub struct Cli {
    /// dcc options and compiler arguments, in any order
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SanitizerMode {
    #[default]
    Address,
    Memory,
    Valgrind,
}

impl SanitizerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SanitizerMode::Address => "address",
            SanitizerMode::Memory => "memory",
            SanitizerMode::Valgrind => "valgrind",
        }
    }
}

/// How the user's `main` is intercepted so the wrapper can run around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainInterception {
    /// `-Wl,-wrap,main`
    LinkerWrap,
    /// `-Dmain=__real_main`, for linkers without `-wrap`
    IfdefReplace,
    /// user's `main` runs untouched
    Disabled,
}

impl MainInterception {
    /// macOS's linker has no `-wrap`.
    pub fn platform_default() -> Self {
        if cfg!(target_os = "macos") {
            MainInterception::IfdefReplace
        } else {
            MainInterception::LinkerWrap
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharedRuntime {
    #[default]
    Auto,
    On,
    Off,
}

/// Settings taken from the environment rather than the command line.
#[derive(Debug, Clone)]
pub struct DriverEnv {
    pub debug: u32,
    pub colorize: bool,
    pub search_path: SearchPath,
    /// Absolute path of the running driver.
    pub driver_path: PathBuf,
    /// Where the helper scripts embedded in binaries live.
    pub helper_dir: PathBuf,
    /// Root of clang's versioned resource directories.
    pub clang_lib_root: PathBuf,
}

impl DriverEnv {
    pub fn from_env() -> Self {
        let driver_path = std::env::current_exe()
            .and_then(|p| p.canonicalize())
            .unwrap_or_else(|_| PathBuf::from(std::env::args().next().unwrap_or_else(|| "dcc".to_string())));
        let driver_dir = driver_path.parent().map(Path::to_path_buf);

        let debug = std::env::var("DCC_DEBUG")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        let colorize = std::io::stderr().is_terminal()
            || std::env::var_os("DCC_COLORIZE_OUTPUT").is_some_and(|v| !v.is_empty());
        let helper_dir = std::env::var_os("DCC_HELPER_DIR")
            .map(PathBuf::from)
            .or_else(|| driver_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let inherited = std::env::var_os("PATH");

        DriverEnv {
            debug,
            colorize,
            search_path: SearchPath::for_driver(driver_dir.as_deref(), inherited.as_deref()),
            driver_path,
            helper_dir,
            clang_lib_root: PathBuf::from(CLANG_LIB_ROOT),
        }
    }
}

/// Fully resolved invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub compiler: String,
    pub sanitizer: SanitizerMode,
    pub leak_check: bool,
    pub suppressions: String,
    pub stack_use_after_return: bool,
    pub main_interception: MainInterception,
    pub embed_source: bool,
    pub shared_runtime: SharedRuntime,
    pub colorize: bool,
    pub debug: u32,
    pub explanations: bool,
    pub max_explanations: u32,
    /// Arguments passed through to the compiler, in order.
    pub compiler_args: Vec<String>,
    /// `.c` and `.h` arguments, candidates for embedding.
    pub sources: IndexSet<String>,
    /// `-c` given: compile only, no wrapper.
    pub incremental: bool,
    /// Inputs other than C sources given: link-only invocation.
    pub object_files: bool,
    pub output: Option<String>,
}

impl Config {
    pub fn new(env: &DriverEnv) -> Self {
        Config {
            compiler: "clang".to_string(),
            sanitizer: SanitizerMode::default(),
            leak_check: false,
            suppressions: "/dev/null".to_string(),
            stack_use_after_return: false,
            main_interception: MainInterception::platform_default(),
            embed_source: true,
            shared_runtime: SharedRuntime::default(),
            colorize: env.colorize,
            debug: env.debug,
            explanations: true,
            max_explanations: DEFAULT_MAX_EXPLANATIONS,
            compiler_args: Vec::new(),
            sources: IndexSet::new(),
            incremental: false,
            object_files: false,
            output: None,
        }
    }

    /// Applies one setting. Settings are applied in command-line order, so
    /// a later setting for the same field always wins.
    fn apply(mut self, setting: Setting) -> Self {
        match setting {
            Setting::Sanitizer(mode) => self.sanitizer = mode,
            Setting::LeakCheck => self.leak_check = true,
            Setting::Suppressions(path) => self.suppressions = path,
            Setting::Explanations(on) => self.explanations = on,
            Setting::SharedRuntime(pref) => self.shared_runtime = pref,
            Setting::UseAfterReturn => self.stack_use_after_return = true,
            Setting::EmbedSource(on) => self.embed_source = on,
            Setting::MainInterception(strategy) => self.main_interception = strategy,
            Setting::Compiler(name) => self.compiler = name,
            Setting::Colorize(on) => self.colorize = on,
        }
        self
    }

    /// Renders the configuration as a normalized token list which resolves
    /// back to the same configuration.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![format!("--c-compiler={}", self.compiler)];
        match self.sanitizer {
            SanitizerMode::Address => {}
            SanitizerMode::Memory => args.push("--memory".to_string()),
            SanitizerMode::Valgrind => args.push("--valgrind".to_string()),
        }
        if self.leak_check {
            args.push("--leak-check".to_string());
        }
        args.push(format!("--suppressions={}", self.suppressions));
        if self.stack_use_after_return {
            args.push("--use-after-return".to_string());
        }
        args.push(
            match self.main_interception {
                MainInterception::LinkerWrap => "--wrap-main",
                MainInterception::IfdefReplace => "--ifdef-main",
                MainInterception::Disabled => "--no-wrap-main",
            }
            .to_string(),
        );
        match self.shared_runtime {
            SharedRuntime::Auto => {}
            SharedRuntime::On => args.push("--shared-libasan".to_string()),
            SharedRuntime::Off => args.push("--no-shared-libasan".to_string()),
        }
        let toggles = [
            (self.embed_source, "--embed-source", "--no-embed-source"),
            (self.explanations, "--explanations", "--no-explanations"),
            (self.colorize, "-fcolor-diagnostics", "-fno-color-diagnostics"),
        ];
        for (on, yes, no) in toggles {
            args.push(if on { yes } else { no }.to_string());
        }
        args.extend(self.compiler_args.iter().cloned());
        args
    }
}

/// A driver option, decoded from one token.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Setting {
    Sanitizer(SanitizerMode),
    LeakCheck,
    Suppressions(String),
    Explanations(bool),
    SharedRuntime(SharedRuntime),
    UseAfterReturn,
    EmbedSource(bool),
    MainInterception(MainInterception),
    Compiler(String),
    Colorize(bool),
}

/// What the invocation asks the driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Compile(Config),
    Version,
    Help,
    /// Re-invoked by a valgrind-instrumented binary to watch its errors.
    WatchValgrind,
}

/// Role of the next token, decided by the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Nothing,
    Output,
    OptionValue,
}

/// Fold state: the configuration so far and what the last token expects.
struct Fold {
    config: Config,
    pending: Pending,
}

enum Step {
    Continue(Fold),
    Exit(Resolution),
}

impl Fold {
    fn step(self, token: &str, next: Option<&str>) -> Result<Step, DriverError> {
        if self.pending == Pending::Nothing {
            if let Some(setting) = parse_setting(token) {
                return Ok(Step::Continue(Fold {
                    config: self.config.apply(setting),
                    pending: Pending::Nothing,
                }));
            }
            match token {
                "-v" | "--version" => return Ok(Step::Exit(Resolution::Version)),
                "--help" => return Ok(Step::Exit(Resolution::Help)),
                "--watch-stdin-for-valgrind-errors" => return Ok(Step::Exit(Resolution::WatchValgrind)),
                _ => {}
            }
        }
        self.compiler_arg(token, next).map(Step::Continue)
    }

    fn compiler_arg(mut self, token: &str, next: Option<&str>) -> Result<Fold, DriverError> {
        self.config.compiler_args.push(token.to_string());

        let pending = std::mem::replace(&mut self.pending, Pending::Nothing);
        match pending {
            Pending::Output => self.config.output = Some(token.to_string()),
            Pending::OptionValue => {}
            Pending::Nothing if token == "-o" => {
                if let Some(target) = next
                    && has_extension(target, &["c"])
                    && Path::new(target).exists()
                {
                    return Err(DriverError::WouldOverwriteSource(PathBuf::from(target)));
                }
                self.pending = Pending::Output;
            }
            Pending::Nothing if token == "-c" => self.config.incremental = true,
            Pending::Nothing if OPTIONS_WITH_VALUE.contains(&token) => self.pending = Pending::OptionValue,
            Pending::Nothing if token.starts_with('-') => {}
            Pending::Nothing if has_extension(token, &["c", "h"]) => {
                self.config.sources.insert(token.to_string());
            }
            Pending::Nothing => self.config.object_files = true,
        }
        Ok(self)
    }
}

fn parse_setting(token: &str) -> Option<Setting> {
    let setting = match token {
        "--memory" | "-u" | "--undefined" | "--uninitialized" | "--uninitialised" | "-fsanitize=memory" => {
            Setting::Sanitizer(SanitizerMode::Memory)
        }
        "--valgrind" => Setting::Sanitizer(SanitizerMode::Valgrind),
        "--leak-check" | "--leakcheck" => Setting::LeakCheck,
        "--explanations" => Setting::Explanations(true),
        "--no-explanations" => Setting::Explanations(false),
        "--shared-libasan" | "-shared-libasan" => Setting::SharedRuntime(SharedRuntime::On),
        "--no-shared-libasan" => Setting::SharedRuntime(SharedRuntime::Off),
        "--use-after-return" => Setting::UseAfterReturn,
        "--embed-source" => Setting::EmbedSource(true),
        "--no-embed-source" => Setting::EmbedSource(false),
        "--wrap-main" => Setting::MainInterception(MainInterception::LinkerWrap),
        "--ifdef-main" => Setting::MainInterception(MainInterception::IfdefReplace),
        "--no-wrap-main" => Setting::MainInterception(MainInterception::Disabled),
        "-fcolor-diagnostics" => Setting::Colorize(true),
        "-fno-color-diagnostics" => Setting::Colorize(false),
        _ => {
            if let Some(path) = token.strip_prefix("--suppressions=") {
                Setting::Suppressions(path.to_string())
            } else if let Some(name) = token.strip_prefix("--c-compiler=") {
                Setting::Compiler(name.to_string())
            } else {
                return None;
            }
        }
    };
    Some(setting)
}

fn has_extension(token: &str, extensions: &[&str]) -> bool {
    Path::new(token)
        .extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

/// Resolves raw command-line tokens against the environment defaults.
pub fn resolve(tokens: &[String], env: &DriverEnv) -> Result<Resolution, DriverError> {
    if tokens.is_empty() {
        return Err(DriverError::Usage);
    }

    let mut fold = Fold {
        config: Config::new(env),
        pending: Pending::Nothing,
    };
    for (i, token) in tokens.iter().enumerate() {
        let next = tokens.get(i + 1).map(String::as_str);
        match fold.step(token, next)? {
            Step::Continue(state) => fold = state,
            Step::Exit(resolution) => return Ok(resolution),
        }
    }
    Ok(Resolution::Compile(fold.config))
}

impl Cli {
    /// Parses the process arguments.
    pub fn capture() -> Self {
        Self::capture_from(std::env::args_os())
    }

    /// Parses `argv`, program name first.
    ///
    /// clap takes a leading `--` as its own separator and drops it. It is
    /// put back, since the compiler must see every token dcc does not own.
    pub fn capture_from<I, T>(argv: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();
        let mut cli = Cli::parse_from(&argv);
        if argv.get(1).is_some_and(|first| first == "--") {
            cli.args.insert(0, "--".to_string());
        }
        cli
    }

    /// Resolve the captured tokens into what the driver should do
    pub fn into_resolution(self, env: &DriverEnv) -> Result<Resolution, DriverError> {
        resolve(&self.args, env)
    }
}
