//! Comparison session state types and constants.
//!
//! This module contains the session-local wrappers the comparison engine
//! keeps around parsed records: loaded logs, the shared cursor and the
//! colour palette.

use serde::Serialize;
use std::path::PathBuf;

use crate::parsers::LogRecord;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of logs in one comparison session
pub const MAX_LOGS: usize = 15;

/// Default points returned by LTTB downsampling
pub const MAX_CHART_POINTS: usize = 2000;

/// Color palette assigned to logs in load order
pub const LOG_COLORS: [[u8; 3]; MAX_LOGS] = [
    [113, 120, 78],  // Olive green
    [191, 78, 48],   // Rust orange
    [71, 108, 155],  // Blue
    [159, 166, 119], // Sage green
    [253, 193, 73],  // Amber
    [135, 30, 28],   // Dark red
    [246, 247, 235], // Cream
    [100, 149, 237], // Cornflower blue
    [255, 127, 80],  // Coral
    [144, 238, 144], // Light green
    [0, 158, 115],   // Bluish green
    [204, 121, 167], // Reddish purple
    [86, 180, 233],  // Sky blue
    [213, 94, 0],    // Vermillion
    [153, 153, 153], // Gray
];

/// Palette entry for the `n`th log loaded into a session
pub fn palette_color(n: usize) -> [u8; 3] {
    LOG_COLORS[n % LOG_COLORS.len()]
}

// ============================================================================
// Core Types
// ============================================================================

/// A parsed record held by a comparison session
#[derive(Clone, Debug)]
pub struct LoadedLog {
    /// Path to the original file, if loaded from disk
    pub path: Option<PathBuf>,
    /// Display identifier, unique within the session
    pub name: String,
    pub color: [u8; 3],
    pub visible: bool,
    /// Seconds added to every timestamp when queried through the engine
    pub offset: f64,
    /// Parsed log data
    pub record: LogRecord,
}

impl LoadedLog {
    pub fn new(record: LogRecord, name: String, color: [u8; 3]) -> Self {
        Self {
            path: None,
            name,
            color,
            visible: true,
            offset: 0.0,
            record,
        }
    }

    /// Timestamp of sample `index` on the aligned axis
    pub fn aligned_time(&self, index: usize) -> Option<f64> {
        self.record.time().get(index).map(|t| t + self.offset)
    }

    /// First and last aligned timestamps
    pub fn aligned_span(&self) -> Option<(f64, f64)> {
        let time = self.record.time();
        Some((time.first()? + self.offset, time.last()? + self.offset))
    }

    /// Sample index nearest an aligned-axis position
    pub fn nearest_index(&self, position: f64) -> Option<usize> {
        self.record.nearest_index(position - self.offset)
    }

    /// Index range of samples whose aligned time is within `[start, end]`
    pub fn index_range(&self, start: f64, end: f64) -> std::ops::Range<usize> {
        let time = self.record.time();
        let lo = time.partition_point(|&t| t + self.offset < start);
        let hi = time.partition_point(|&t| t + self.offset <= end);
        lo..hi.max(lo)
    }
}

/// The shared cursor of a comparison session
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct CursorState {
    /// Position on the aligned time axis, in seconds
    pub position: f64,
    /// Channel the caller is focused on, if any
    pub active_channel: Option<String>,
}
