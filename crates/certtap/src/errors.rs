//! Error types for certificate extraction.
//!
//! The taxonomy keeps two tiers apart: [`ExtractError`] aborts an entire
//! extraction pass (there is nothing to iterate over), while
//! [`RecordError`] is scoped to a single certificate record or output
//! domain and never takes the rest of the pass down with it.

use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort an extraction pass.
///
/// The operator sees the cause in the log; the pass runs again when the
/// next change event arrives, there is no internal retry loop.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The state file could not be read.
    #[error("failed to read state file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document does not match any known ACME storage layout.
    #[error("unrecognized ACME state layout: {0}")]
    UnrecognizedSchema(String),

    /// The document holds several challenge sections and none was selected.
    #[error(
        "state file holds multiple challenge sections ({}); select one with --challenge",
        available.join(", ")
    )]
    AmbiguousChallenge { available: Vec<String> },
}

/// Failures scoped to one certificate record or one output domain.
///
/// The orchestrator logs these with record identity and continues with the
/// remaining records; a state file with one bad certificate must not block
/// extraction of the others.
#[derive(Debug, Error)]
pub enum RecordError {
    /// A required field is absent or has the wrong type.
    #[error("record {index}: missing or invalid field `{field}`")]
    MissingField { index: usize, field: String },

    /// Key or bundle material failed to decode.
    #[error("record {index} ({name}): {what} is not decodable: {reason}")]
    Decode {
        index: usize,
        name: String,
        what: &'static str,
        reason: String,
    },

    /// A domain name is unusable as a filesystem path segment.
    #[error("domain name {name:?} is not a valid path segment")]
    InvalidName { name: String },

    /// One or more output files for a domain could not be written.
    #[error("failed to write {failed} of {total} files for {name}")]
    Write {
        name: String,
        failed: usize,
        total: usize,
    },
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Include and exclude lists are mutually exclusive.
    #[error("include and exclude lists cannot be combined")]
    IncludeExcludeConflict,

    /// The state path has no final file name component.
    #[error("state file path {0} does not name a file")]
    NotAFile(PathBuf),

    /// A zero quiet interval would defeat coalescing entirely.
    #[error("debounce interval must be greater than zero")]
    ZeroDebounce,
}
