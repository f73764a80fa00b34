use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use strum::{AsRefStr, Display, EnumIter};

use crate::error::{Error, Result};

/// Recognised telemetry log encodings
#[derive(
    AsRefStr,
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    EnumIter,
    Eq,
    Hash,
    PartialEq,
    Serialize,
)]
pub enum LogFormat {
    #[strum(serialize = "CSV")]
    Csv,
    #[strum(serialize = "TSV")]
    Tsv,
    #[strum(serialize = "JSON")]
    Json,
    Haltech,
    #[strum(serialize = "ECUMaster")]
    EcuMaster,
    #[strum(serialize = "HP Tuners")]
    HpTuners,
    #[strum(serialize = "EFILive")]
    EfiLive,
    #[strum(serialize = "COBB Accessport")]
    CobbAccessport,
    MegaLogViewer,
    /// Detection exhausted every heuristic
    #[default]
    Unknown,
}

impl LogFormat {
    /// Vendor dialects are generic delimited text preceded by a preamble
    pub fn is_vendor_dialect(&self) -> bool {
        !matches!(
            self,
            LogFormat::Csv | LogFormat::Tsv | LogFormat::Json | LogFormat::Unknown
        )
    }
}

/// Best-effort vehicle identification recovered from a log preamble
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleInfo {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<u16>,
}

impl VehicleInfo {
    pub fn is_empty(&self) -> bool {
        self.make.is_none() && self.model.is_none() && self.year.is_none()
    }
}

/// Metadata describing a parsed log. Immutable once the record is built.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogMetadata {
    pub format: LogFormat,
    pub vehicle: Option<VehicleInfo>,
    /// Seconds between the first and last sample
    pub duration: Option<f64>,
    /// `1 / mean(Δt)`; unset with fewer than two samples
    pub sample_rate: Option<f64>,
    /// Channel names in file order
    pub channel_names: Vec<String>,
    /// Display unit per channel (channels without a known unit are absent)
    pub units: HashMap<String, String>,
    /// Free-form preamble entries (software version, capture date, ...)
    pub properties: BTreeMap<String, String>,
}

/// A normalized log: one time axis and one value array per channel.
///
/// Every channel holds exactly as many samples as the time axis. Samples
/// that could not be read are `None`, never a substitute number.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogRecord {
    meta: LogMetadata,
    time: Vec<f64>,
    channels: HashMap<String, Vec<Option<f64>>>,
}

impl LogRecord {
    /// Build a record from already-separated columns.
    ///
    /// Fails if any column length differs from the time axis, or if the time
    /// axis decreases.
    pub fn from_columns(
        format: LogFormat,
        time: Vec<f64>,
        columns: Vec<(String, Vec<Option<f64>>)>,
    ) -> Result<Self> {
        if let Some(pos) = time.windows(2).position(|w| w[1] < w[0]) {
            return Err(Error::Malformed {
                format,
                reason: format!("time axis decreases at sample {}", pos + 1),
            });
        }

        let mut builder = RecordBuilder::new(format);
        let mut data = Vec::with_capacity(columns.len());
        for (name, values) in columns {
            if values.len() != time.len() {
                return Err(Error::ShapeMismatch {
                    channel: name,
                    expected: time.len(),
                    actual: values.len(),
                });
            }
            builder.add_channel(&name, None);
            data.push(values);
        }

        builder.time = time;
        builder.columns = data;
        Ok(builder.finish())
    }

    pub fn meta(&self) -> &LogMetadata {
        &self.meta
    }

    pub fn format(&self) -> LogFormat {
        self.meta.format
    }

    /// The time axis in seconds, non-decreasing
    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn channel(&self, name: &str) -> Option<&[Option<f64>]> {
        self.channels.get(name).map(Vec::as_slice)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    pub fn channel_names(&self) -> &[String] {
        &self.meta.channel_names
    }

    pub fn unit(&self, channel: &str) -> Option<&str> {
        self.meta.units.get(channel).map(String::as_str)
    }

    /// Number of samples on the time axis
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Value of `channel` at sample `index`; `None` if missing or absent
    pub fn value_at(&self, channel: &str, index: usize) -> Option<f64> {
        self.channels.get(channel)?.get(index).copied().flatten()
    }

    /// Index of the sample closest to `time`. Ties go to the earliest index.
    pub fn nearest_index(&self, time: f64) -> Option<usize> {
        if self.time.is_empty() {
            return None;
        }

        // First sample at or after the query
        let upper = self.time.partition_point(|&t| t < time);
        if upper == 0 {
            return Some(0);
        }
        if upper == self.time.len() {
            return Some(self.first_index_of(upper - 1));
        }

        let below = upper - 1;
        if (self.time[below] - time).abs() <= (self.time[upper] - time).abs() {
            Some(self.first_index_of(below))
        } else {
            Some(upper)
        }
    }

    /// Walk back over repeated timestamps to the earliest equal one
    fn first_index_of(&self, mut index: usize) -> usize {
        while index > 0 && self.time[index - 1] == self.time[index] {
            index -= 1;
        }
        index
    }
}

/// Trait for log file parsers
pub trait Parseable {
    fn parse(&self, contents: &str) -> Result<LogRecord>;
}

/// Accumulates rows column by column so that every channel stays the same
/// length as the time axis.
#[derive(Debug)]
pub(crate) struct RecordBuilder {
    format: LogFormat,
    names: Vec<String>,
    units: HashMap<String, String>,
    time: Vec<f64>,
    columns: Vec<Vec<Option<f64>>>,
    vehicle: VehicleInfo,
    properties: BTreeMap<String, String>,
}

impl RecordBuilder {
    pub(crate) fn new(format: LogFormat) -> Self {
        Self {
            format,
            names: Vec::new(),
            units: HashMap::new(),
            time: Vec::new(),
            columns: Vec::new(),
            vehicle: VehicleInfo::default(),
            properties: BTreeMap::new(),
        }
    }

    /// Register a channel, renaming duplicates to `name (2)`, `name (3)`, ...
    /// Returns the stored name.
    pub(crate) fn add_channel(&mut self, name: &str, unit: Option<&str>) -> String {
        let mut unique = name.to_string();
        let mut n = 2;
        while self.names.contains(&unique) {
            unique = format!("{} ({})", name, n);
            n += 1;
        }

        if let Some(unit) = unit.filter(|u| !u.is_empty()) {
            self.units.insert(unique.clone(), unit.to_string());
        }
        self.names.push(unique.clone());
        self.columns.push(Vec::with_capacity(self.time.capacity()));
        unique
    }

    pub(crate) fn set_unit(&mut self, column: usize, unit: &str) {
        if let Some(name) = self.names.get(column) {
            if unit.is_empty() {
                self.units.remove(name);
            } else {
                self.units.insert(name.clone(), unit.to_string());
            }
        }
    }

    pub(crate) fn channel_count(&self) -> usize {
        self.names.len()
    }

    pub(crate) fn reserve(&mut self, rows: usize) {
        self.time.reserve(rows);
        for column in &mut self.columns {
            column.reserve(rows);
        }
    }

    /// Most recent timestamp on the axis
    pub(crate) fn last_time(&self) -> Option<f64> {
        self.time.last().copied()
    }

    /// Append one row. Rows earlier than the previous one are rejected so
    /// that the axis stays non-decreasing. Short rows are padded with
    /// `None`, long rows truncated.
    pub(crate) fn push_row(
        &mut self,
        time: f64,
        values: impl IntoIterator<Item = Option<f64>>,
    ) -> bool {
        if self.last_time().is_some_and(|last| time < last) {
            return false;
        }

        self.time.push(time);
        let mut values = values.into_iter();
        for column in &mut self.columns {
            column.push(values.next().flatten());
        }
        true
    }

    pub(crate) fn vehicle_mut(&mut self) -> &mut VehicleInfo {
        &mut self.vehicle
    }

    pub(crate) fn set_property(&mut self, key: &str, value: &str) {
        self.properties
            .insert(key.trim().to_string(), value.trim().to_string());
    }

    pub(crate) fn finish(self) -> LogRecord {
        let n = self.time.len();
        let (duration, sample_rate) = match (self.time.first(), self.time.last()) {
            (Some(&first), Some(&last)) => {
                let span = last - first;
                // mean(Δt) over n - 1 intervals
                let rate = if n >= 2 && span > 0.0 {
                    Some((n - 1) as f64 / span)
                } else {
                    None
                };
                (Some(span), rate)
            }
            _ => (None, None),
        };

        let channels = self
            .names
            .iter()
            .cloned()
            .zip(self.columns)
            .collect::<HashMap<_, _>>();

        LogRecord {
            meta: LogMetadata {
                format: self.format,
                vehicle: (!self.vehicle.is_empty()).then_some(self.vehicle),
                duration,
                sample_rate,
                channel_names: self.names,
                units: self.units,
                properties: self.properties,
            },
            time: self.time,
            channels,
        }
    }
}
