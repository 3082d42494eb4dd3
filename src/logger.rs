//! Logging setup for the driver binary.
//!
//! All driver components log through the `log` facade; the debug verbosity
//! level taken from `DCC_DEBUG` selects how much of it reaches stderr.

use std::io::Write;

use log::LevelFilter;

/// Maps a debug verbosity level to a log filter.
///
/// Level 0 keeps warnings only, level 1 adds the commands being run and the
/// embedding decisions, level 2 and above adds everything.
pub fn level_filter(debug: u32) -> LevelFilter {
    match debug {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Installs the global logger. Calling it twice is harmless.
pub fn init(debug: u32) {
    let _ = env_logger::Builder::new()
        .filter_level(level_filter(debug))
        .format(|buf, record| writeln!(buf, "dcc: {}", record.args()))
        .target(env_logger::Target::Stderr)
        .try_init();
}
