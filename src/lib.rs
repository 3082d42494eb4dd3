//! A compiler driver that builds C programs able to explain their own
//! runtime errors.

/// Contains the command-line resolution, executor and diagnostics output.
pub mod driver;
/// Contains the source embedding pipeline.
pub mod embed;
/// Contains the error types for the application.
pub mod error;
/// Contains the logger.
pub mod logger;
pub mod process;
pub mod sanitizer;
pub mod toolchain;
pub mod wrapper;

#[cfg(test)]
pub(crate) mod test_utils;
