use std::path::PathBuf;

use thiserror::Error;

/// Domain errors raised while building the donor index or running the matcher.
///
/// `NotFound` is intentionally absent here: a missing node-key lookup in the
/// donor graph is not an error condition, it is represented as `Option::None`
/// at the call site instead of a variant of this enum.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("{file}:{line}: {reason}")]
    Parse {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("{file}:{line}: {reason}")]
    Structural {
        file: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("graph file {path} has {found}, expected {expected}")]
    Version {
        path: PathBuf,
        found: String,
        expected: String,
    },
}

pub type Result<T> = std::result::Result<T, MatchError>;
