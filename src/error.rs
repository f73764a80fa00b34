//! Error types shared by the parser, tune codec and comparison engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compare::AlignmentMethod;
use crate::parsers::LogFormat;
use crate::tune::TuneFormat;

/// Errors that can occur while loading, converting or comparing logs
#[derive(Error, Debug)]
pub enum Error {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("could not determine the format of {}", .0.display())]
    FormatUndetermined(PathBuf),

    #[error("{format} header row not found within the first {searched} lines")]
    HeaderNotFound { format: LogFormat, searched: usize },

    #[error("malformed {format} log: {reason}")]
    Malformed { format: LogFormat, reason: String },

    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exporting tunes as {0} is not supported")]
    UnsupportedExportTarget(TuneFormat),

    #[error("comparison session is full ({0} logs loaded)")]
    CapacityExceeded(usize),

    #[error("log index {index} out of range ({len} loaded)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{method} alignment requires a {argument}")]
    MissingArgument {
        method: AlignmentMethod,
        argument: &'static str,
    },

    #[error("invalid formula for math channel '{name}': {reason}")]
    InvalidFormula { name: String, reason: String },

    #[error("channel '{channel}' has {actual} samples but the time axis has {expected}")]
    ShapeMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },
}

impl Error {
    /// Wrap an I/O error, promoting `NotFound` to its own variant
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Error::NotFound(path)
        } else {
            Error::Io { path, source }
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_promoted() {
        let err = Error::io("missing.csv", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(err, Error::NotFound(p) if p == PathBuf::from("missing.csv")));

        let err = Error::io("locked.csv", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_messages() {
        let err = Error::HeaderNotFound {
            format: LogFormat::HpTuners,
            searched: 64,
        };
        assert_eq!(
            err.to_string(),
            "HP Tuners header row not found within the first 64 lines"
        );
        assert_eq!(
            Error::CapacityExceeded(15).to_string(),
            "comparison session is full (15 logs loaded)"
        );
    }
}
