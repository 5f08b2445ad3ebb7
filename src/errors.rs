//! Typed error hierarchy for the coverage orchestrator.
//!
//! One enum per subsystem, plus `PipelineError` which wraps the fatal ones:
//! - `SelectError`: source discovery failures (fatal)
//! - `WriteError`: shadow file write failures (fatal, no rollback)
//! - `InstrumentError`: instrumentation engine failures (fatal)
//! - `StageError`: generate/test process failures (fatal)
//! - `PayloadParseError`: malformed coverage payload line (recoverable)
//! - `ConfigError`: invalid `solcover.toml` contents

use std::path::PathBuf;
use thiserror::Error;

/// Errors from discovering source files under the configured roots.
#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Source root {path} does not exist or is not a directory")]
    RootMissing { path: PathBuf },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to walk source root {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// A shadow file could not be written. Files written before it stay on disk.
#[derive(Debug, Error)]
#[error("Failed to write shadow file {path}: {source}")]
pub struct WriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors from the external instrumentation engine.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Failed to spawn instrumenter `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Instrumenter I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Instrumenter exited with code {exit_code}: {stderr}")]
    NonZeroExit { exit_code: i32, stderr: String },

    #[error("Instrumenter timed out after {secs} seconds")]
    TimedOut { secs: u64 },

    #[error("Instrumenter returned invalid JSON: {0}")]
    InvalidResponse(#[source] serde_json::Error),

    #[error("Instrumenter did not return {path}")]
    MissingFile { path: PathBuf },
}

/// Errors from running an external stage process.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Failed to spawn {stage} stage `{command}`: {source}")]
    SpawnFailed {
        stage: String,
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited unsuccessfully. `exit_code` is `None` when it was
    /// terminated by a signal.
    #[error("{stage} stage failed with exit status {}", display_code(.exit_code))]
    Failed {
        stage: String,
        exit_code: Option<i32>,
    },

    #[error("{stage} stage timed out after {secs} seconds")]
    TimedOut { stage: String, secs: u64 },

    #[error("{stage} stage interrupted")]
    Interrupted { stage: String },

    #[error("Failed to read {stage} stage output: {source}")]
    Io {
        stage: String,
        #[source]
        source: std::io::Error,
    },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "<signal>".to_string(),
    }
}

/// A line carried both sentinels but the enclosed payload did not decode.
#[derive(Debug, Error)]
#[error("Malformed coverage payload: {source}")]
pub struct PayloadParseError {
    #[source]
    pub source: serde_json::Error,
}

/// Validation failures for the orchestrator configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No source roots configured")]
    NoRoots,

    #[error("Source root '{0}' is configured more than once")]
    DuplicateRoot(PathBuf),

    #[error("Skip entry '{entry}' for root '{root}' must be a relative path inside the root")]
    InvalidSkipEntry { root: PathBuf, entry: String },

    #[error("Skip entry '{entry}' for root '{root}' is not a valid glob: {source}")]
    InvalidSkipGlob {
        root: PathBuf,
        entry: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("The {0} stage command is empty")]
    EmptyCommand(&'static str),

    #[error("Invalid coverage setting: {0}")]
    InvalidCoverage(String),

    #[error("Instrumenter configuration is invalid: {0}")]
    InvalidInstrumenter(String),
}

/// Fatal errors that move the pipeline to `Failed`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Select(#[from] SelectError),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Stage(#[from] StageError),
}
