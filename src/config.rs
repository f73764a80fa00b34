//! Tunable options for the parser, comparison engine and tune codec.
//!
//! None of these are read from the environment. Callers build them (or load
//! them from a JSON document with [`Config::from_json_str`]) and hand them to
//! the owned [`LogParser`](crate::parsers::LogParser) and
//! [`ComparisonEngine`](crate::compare::ComparisonEngine) instances.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Options for format detection and log parsing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseOptions {
    /// Lines of decoded text scanned for vendor markers
    pub sniff_lines: usize,
    /// Lines scanned for a header row in dialects with free-text preambles
    pub header_search_lines: usize,
    /// Files at least this large are memory-mapped instead of read
    pub mmap_threshold: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            sniff_lines: 10,
            header_search_lines: 64,
            mmap_threshold: 4 * 1024 * 1024,
        }
    }
}

/// Options for a comparison session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Maximum distance from the target value for an event-start match
    pub event_tolerance: f64,
    /// Parser options used by `load`
    pub parse: ParseOptions,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            event_tolerance: 0.01,
            parse: ParseOptions::default(),
        }
    }
}

/// Options for tune file import
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuneOptions {
    /// Bytes at the head of a binary tune scanned for VIN and year tokens
    pub header_scan_bytes: usize,
}

impl Default for TuneOptions {
    fn default() -> Self {
        Self {
            header_scan_bytes: 1024,
        }
    }
}

/// All options in one document
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineOptions,
    pub tune: TuneOptions,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_json_str(&json)
    }
}
