//! Vendor dialect tables.
//!
//! Every vendor text export handled here is generic delimited text with a
//! free-text preamble. The tables below drive both detection (marker
//! substrings) and parsing (how to find the header row).

use regex::Regex;
use std::sync::LazyLock;

use super::types::{LogFormat, RecordBuilder};

/// A content marker, matched against lower-cased text
#[derive(Clone, Copy, Debug)]
pub(crate) enum Marker {
    /// Substring anywhere in the sniffed lines
    Contains(&'static str),
    /// Prefix of the first non-empty line
    FirstLinePrefix(&'static str),
}

/// Vendor markers in priority order. The first format with a matching
/// marker wins.
pub(crate) const VENDOR_MARKERS: &[(LogFormat, &[Marker])] = &[
    (
        LogFormat::Haltech,
        &[Marker::Contains("%datalog%"), Marker::Contains("haltech")],
    ),
    (
        LogFormat::EcuMaster,
        &[
            Marker::FirstLinePrefix("time;"),
            Marker::Contains("ecumaster"),
            Marker::Contains("emu pro"),
        ],
    ),
    (
        LogFormat::HpTuners,
        &[Marker::Contains("hp tuners"), Marker::Contains("vcm scanner")],
    ),
    (LogFormat::EfiLive, &[Marker::Contains("efilive")]),
    (
        LogFormat::CobbAccessport,
        &[Marker::Contains("accessport"), Marker::Contains("cobb tuning")],
    ),
    (
        LogFormat::MegaLogViewer,
        &[
            Marker::Contains("megalogviewer"),
            Marker::Contains("ms3 format"),
            Marker::Contains("speeduino"),
            Marker::Contains("rusefi"),
        ],
    ),
];

/// How a dialect's header row is located
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum HeaderRule {
    /// The first non-empty line is the header
    FirstLine,
    /// Scan for the first line that names a time column
    Search,
}

/// Parsing rules for one delimited dialect
#[derive(Clone, Copy, Debug)]
pub(crate) struct Dialect {
    pub format: LogFormat,
    pub header: HeaderRule,
    /// Fixed delimiter; `None` sniffs it from the header row
    pub delimiter: Option<char>,
    /// Extra column names treated as the time axis
    pub time_aliases: &'static [&'static str],
    /// A row of unit names may directly follow the header
    pub units_row: bool,
    /// Column names are `group/name` paths shortened to their last segment
    pub path_columns: bool,
}

impl Dialect {
    const fn generic(format: LogFormat, delimiter: Option<char>) -> Self {
        Self {
            format,
            header: HeaderRule::FirstLine,
            delimiter,
            time_aliases: &[],
            units_row: false,
            path_columns: false,
        }
    }

    const fn searched(format: LogFormat) -> Self {
        Self {
            header: HeaderRule::Search,
            ..Self::generic(format, None)
        }
    }

    /// Rules for a delimited format, or `None` for formats with their own
    /// parser (JSON, Haltech) and for `Unknown`
    pub(crate) fn for_format(format: LogFormat) -> Option<Self> {
        let dialect = match format {
            LogFormat::Csv => Self::generic(format, Some(',')),
            LogFormat::Tsv => Self::generic(format, Some('\t')),
            LogFormat::EcuMaster => Self {
                path_columns: true,
                ..Self::generic(format, None)
            },
            LogFormat::HpTuners => Self {
                time_aliases: &["offset"],
                ..Self::searched(format)
            },
            LogFormat::EfiLive | LogFormat::CobbAccessport => Self::searched(format),
            LogFormat::MegaLogViewer => Self {
                units_row: true,
                ..Self::searched(format)
            },
            LogFormat::Json | LogFormat::Haltech | LogFormat::Unknown => return None,
        };
        Some(dialect)
    }
}

static VEHICLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<year>(?:19|20)\d{2})\s+(?<make>\S+)(?:\s+(?<model>.+))?$")
        .expect("vehicle regex is valid")
});

static KEY_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<key>[^:=]+?)\s*[:=]\s*(?<value>.*)$").expect("key/value regex is valid")
});

/// Record vehicle identification and other `key: value` entries found in
/// preamble lines above the header row.
pub(crate) fn scan_preamble(lines: &[&str], delimiter: char, builder: &mut RecordBuilder) {
    for line in lines {
        let line = line.trim().trim_matches('"');
        if line.is_empty() {
            continue;
        }

        let (key, value) = match KEY_VALUE_REGEX.captures(line) {
            Some(caps) => (caps["key"].to_string(), caps["value"].to_string()),
            None => match line.split_once(delimiter) {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => continue,
            },
        };
        let key = key.trim().trim_matches('"');
        let value = value.trim().trim_matches(|c| c == '"' || c == delimiter).trim();
        if key.is_empty() || value.is_empty() {
            continue;
        }

        apply_preamble_entry(key, value, builder);
    }
}

fn apply_preamble_entry(key: &str, value: &str, builder: &mut RecordBuilder) {
    let vehicle = builder.vehicle_mut();
    match key.to_ascii_lowercase().as_str() {
        "make" | "vehicle make" => vehicle.make = Some(value.to_string()),
        "model" | "vehicle model" => vehicle.model = Some(value.to_string()),
        "year" | "model year" | "vehicle year" => {
            if let Ok(year) = value.parse::<u16>() {
                vehicle.year = Some(year);
            }
        }
        "vehicle" => {
            if let Some(caps) = VEHICLE_REGEX.captures(value) {
                vehicle.year = caps["year"].parse().ok();
                vehicle.make = Some(caps["make"].to_string());
                vehicle.model = caps.name("model").map(|m| m.as_str().trim().to_string());
            } else {
                builder.set_property(key, value);
            }
        }
        _ => builder.set_property(key, value),
    }
}
