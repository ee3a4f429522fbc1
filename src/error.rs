//! Error types shared by the setup pipeline and the compiler runner.
//!
//! Setup errors abort the whole setup sequence. Compile errors leave the
//! [`Compiler`](crate::services::Compiler) in the `Failed` phase with its child reaped.

use camino::Utf8PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Messages longer than this many lines are cut down to their first line
/// before being surfaced to the caller.
pub const MAX_MESSAGE_LINES: usize = 10;

/// Errors raised while installing the compiler binary or story formats
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("No Tweego binary for platform {os} ({arch})")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Failed to download {url}: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Failed to extract {archive}: {reason}")]
    ExtractionFailed { archive: Utf8PathBuf, reason: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SetupError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while verifying or running the compiler binary
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Tweego is not set up correctly, run setup first")]
    SetupIncomplete,

    #[error("Failed to start Tweego: {0}")]
    SpawnFailed(String),

    #[error("Error while reading Tweego output: {0}")]
    StreamError(String),

    #[error("Tweego produced invalid output{}: {first_line}", exit_suffix(.exit_code))]
    MalformedOutput {
        first_line: String,
        exit_code: Option<i32>,
    },

    #[error("Output file {0} is locked by another process")]
    OutputLocked(Utf8PathBuf),

    #[error("Failed to kill Tweego process: {0}")]
    KillFailed(String),

    #[error("Tweego timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid build configuration: {0}")]
    InvalidBuildConfig(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub(crate) fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) if *code != 0 => format!(" (exit code {})", code),
        _ => String::new(),
    }
}

/// Keep user-facing messages short: anything over [`MAX_MESSAGE_LINES`]
/// lines is reduced to its first line.
pub fn summarize_message(message: &str) -> String {
    if message.lines().count() > MAX_MESSAGE_LINES {
        message.lines().next().unwrap_or_default().to_string()
    } else {
        message.trim_end().to_string()
    }
}
