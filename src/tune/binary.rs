//! Header scan for binary vendor tune containers.
//!
//! Only identification metadata is recovered. Calibration tables inside
//! these containers use vendor-specific layouts and are left empty.

use regex::Regex;
use std::sync::LazyLock;

use super::types::{TuneFormat, TuneRecord};

static VIN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-HJ-NPR-Z0-9]{17}\b").expect("VIN regex is valid"));

static YEAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex is valid"));

/// Scan the head of a binary tune for a VIN-shaped token and a model year
pub(crate) fn scan_header(bytes: &[u8], format: TuneFormat, scan_bytes: usize) -> TuneRecord {
    let head = &bytes[..bytes.len().min(scan_bytes)];
    let text = String::from_utf8_lossy(head);
    let mut record = TuneRecord::new(format);

    if let Some(vin) = VIN_REGEX.find(&text) {
        record.vin = Some(vin.as_str().to_string());
    }
    if let Some(year) = YEAR_REGEX.find(&text) {
        record.year = year.as_str().to_string();
    }

    tracing::debug!(
        "Scanned {} header bytes of {} tune: vin={:?} year={}",
        head.len(),
        format,
        record.vin,
        record.year
    );
    record
}
