//! Error handling for the trajectory analysis pipeline.
//!
//! The pipeline distinguishes a small set of failure classes that the
//! command line maps onto exit codes. Everything else travels as an
//! `anyhow` error with context attached at the I/O boundary where it
//! occurred.

use std::path::{Path, PathBuf};

use anyhow::Context;
use thiserror::Error;

/// Failure classes surfaced by the analysis stages.
#[derive(Error, Debug)]
pub enum TrajanError {
    /// Unreadable, malformed, or missing input data.
    #[error("input error: {0}")]
    Input(String),

    /// Invalid configuration (flag values that cannot be honored).
    #[error("configuration error: {0}")]
    Config(String),

    /// A persisted RR matrix does not match the current run.
    #[error("incompatible RR file: {0}")]
    IncompatibleRrFile(String),

    /// An external clustering tool failed or is missing.
    #[error("external tool `{tool}` failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// The relative-risk estimator failed (e.g. a worker panicked).
    #[error("estimator failure: {0}")]
    Estimator(String),
}

impl TrajanError {
    /// Create a new input error.
    pub fn input<S: Into<String>>(message: S) -> Self {
        Self::Input(message.into())
    }

    /// Create a new input error mentioning the offending file.
    pub fn input_at<S: Into<String>, P: Into<PathBuf>>(message: S, path: P) -> Self {
        Self::Input(format!(
            "{} (path: {})",
            message.into(),
            path.into().display()
        ))
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a new external-tool error with captured stderr.
    pub fn external_tool<S: Into<String>, M: Into<String>>(tool: S, message: M) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result type used throughout the library.
pub type Result<T> = anyhow::Result<T>;

/// Extension trait for attaching file-path context to results.
pub trait ResultExt<T> {
    /// Add a message and the path of the file being processed.
    fn with_path_context<S: AsRef<str>, P: AsRef<Path>>(self, msg: S, path: P) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_path_context<S: AsRef<str>, P: AsRef<Path>>(self, msg: S, path: P) -> Result<T> {
        let msg = msg.as_ref();
        let path = path.as_ref();
        self.with_context(|| format!("{} (path: {})", msg, path.display()))
    }
}
