//! logbench - ECU log and tune file ingestion with multi-log comparison
//!
//! This library detects and parses telemetry logs from many vendor tools
//! into a common time-series record, reads and converts ECU tune files, and
//! aligns up to fifteen logs on a shared timeline for side-by-side queries.
//!
//! ## Module Structure
//!
//! - [`parsers`] - Log format detection and parsing (CSV, TSV, JSON, Haltech, ...)
//! - [`tune`] - Tune file detection, import, export and conversion
//! - [`compare`] - Multi-log comparison engine
//! - [`expression`] - Math channel formula parser and evaluator
//! - [`state`] - Session types and constants
//! - [`units`] - Channel unit parsing and inference
//! - [`config`] - Options for the parser, engine and tune codec
//! - [`source`] - File reading and text decoding
//! - [`error`] - Error types

pub mod compare;
pub mod config;
pub mod error;
pub mod expression;
pub mod parsers;
pub mod source;
pub mod state;
pub mod tune;
pub mod units;

pub use compare::{AlignmentMethod, ComparisonEngine, ComparisonResult, RangeStats};
pub use config::{Config, EngineOptions, ParseOptions, TuneOptions};
pub use error::{Error, Result};
pub use parsers::{detect_log_format, parse_log, LogFormat, LogParser, LogRecord};
pub use tune::{convert_tune, detect_tune_format, export_tune, import_tune, TuneFormat, TuneRecord};
