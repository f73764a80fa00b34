//! Multi-log comparison engine.
//!
//! Holds up to [`MAX_LOGS`] parsed records, shifts each by a per-log
//! alignment offset and answers point and range queries across all of them
//! on the shared aligned time axis.

pub mod downsample;
pub mod math;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;
use strum::{Display, EnumIter, EnumString};

pub use downsample::downsample_lttb;
pub use math::MathChannel;

use crate::config::EngineOptions;
use crate::error::{Error, Result};
use crate::parsers::{write_csv, LogParser, LogRecord};
use crate::source;
use crate::state::{palette_color, CursorState, LoadedLog, MAX_LOGS};

/// How logs are shifted onto a shared time axis
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString, Eq, PartialEq, Serialize,
)]
#[strum(ascii_case_insensitive)]
pub enum AlignmentMethod {
    /// Clear every offset
    #[strum(to_string = "TimeZero", serialize = "time-zero")]
    TimeZero,
    /// First sample of a channel within tolerance of a target value
    #[strum(to_string = "EventStart", serialize = "event-start")]
    EventStart,
    /// Sample holding a channel's maximum value
    #[strum(to_string = "PeakValue", serialize = "peak-value")]
    PeakValue,
    /// Offsets are set by the caller through `set_offset`
    #[strum(to_string = "Manual", serialize = "manual")]
    Manual,
}

/// Values of every visible log at the cursor
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub position: f64,
    /// log name -> channel -> value at that log's nearest sample
    pub values: BTreeMap<String, BTreeMap<String, Option<f64>>>,
    /// log name -> channel -> value minus the baseline log's value
    pub differences: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Summary of one channel over a time range. Missing samples are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct RangeStats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
    pub count: usize,
}

impl RangeStats {
    fn from_samples(samples: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;
        for v in samples {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }
        (count > 0).then(|| RangeStats {
            min,
            max,
            avg: sum / count as f64,
            count,
        })
    }
}

/// Aligned samples of one channel: `(aligned time, value)`
pub type AlignedSeries = Vec<(f64, Option<f64>)>;

/// A comparison session. Not internally synchronized.
#[derive(Debug, Default)]
pub struct ComparisonEngine {
    options: EngineOptions,
    parser: LogParser,
    logs: Vec<LoadedLog>,
    cursor: CursorState,
    math_channels: Vec<MathChannel>,
    /// Logs ever loaded, used for palette assignment
    loaded_total: usize,
}

impl ComparisonEngine {
    pub fn new(options: EngineOptions) -> Self {
        let parser = LogParser::new(options.parse.clone());
        Self {
            options,
            parser,
            ..Self::default()
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    // ------------------------------------------------------------------
    // Session membership
    // ------------------------------------------------------------------

    /// Parse and load a file. Returns the new log's index.
    ///
    /// A failed parse leaves the session unchanged.
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        name: Option<&str>,
        color: Option<[u8; 3]>,
    ) -> Result<usize> {
        let path = path.as_ref();
        self.check_capacity()?;

        let record = self.parser.parse(path, None)?;
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| source::base_name(path));
        let index = self.load_record(record, &name, color)?;
        self.logs[index].path = Some(path.to_path_buf());
        Ok(index)
    }

    /// Load an already-parsed record under the same capacity rules
    pub fn load_record(
        &mut self,
        record: LogRecord,
        name: &str,
        color: Option<[u8; 3]>,
    ) -> Result<usize> {
        self.check_capacity()?;

        let name = self.unique_name(name);
        let color = color.unwrap_or_else(|| palette_color(self.loaded_total));
        self.loaded_total += 1;

        tracing::info!(
            "Loaded '{}' ({}, {} channels, {} samples)",
            name,
            record.format(),
            record.channel_names().len(),
            record.len()
        );
        self.logs.push(LoadedLog::new(record, name, color));
        Ok(self.logs.len() - 1)
    }

    /// Remove a log by position. Remaining logs keep their colors.
    pub fn remove(&mut self, index: usize) -> Result<LoadedLog> {
        self.check_index(index)?;
        let log = self.logs.remove(index);
        tracing::info!("Removed '{}' ({} logs remain)", log.name, self.logs.len());
        Ok(log)
    }

    fn check_capacity(&self) -> Result<()> {
        if self.logs.len() >= MAX_LOGS {
            return Err(Error::CapacityExceeded(MAX_LOGS));
        }
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.logs.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.logs.len(),
            });
        }
        Ok(())
    }

    fn unique_name(&self, base: &str) -> String {
        let taken = |name: &str| self.logs.iter().any(|log| log.name == name);
        let mut name = base.to_string();
        let mut n = 2;
        while taken(&name) {
            name = format!("{} ({})", base, n);
            n += 1;
        }
        name
    }

    pub fn logs(&self) -> &[LoadedLog] {
        &self.logs
    }

    pub fn log(&self, index: usize) -> Option<&LoadedLog> {
        self.logs.get(index)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Manual alignment: set one log's offset in seconds
    pub fn set_offset(&mut self, index: usize, offset: f64) -> Result<()> {
        self.check_index(index)?;
        self.logs[index].offset = offset;
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.check_index(index)?;
        self.logs[index].visible = visible;
        Ok(())
    }

    /// Earliest and latest aligned timestamps over visible logs
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let mut min_time = f64::MAX;
        let mut max_time = f64::MIN;

        for log in self.visible_logs() {
            if let Some((first, last)) = log.aligned_span() {
                min_time = min_time.min(first);
                max_time = max_time.max(last);
            }
        }

        (min_time <= max_time).then_some((min_time, max_time))
    }

    fn visible_logs(&self) -> impl Iterator<Item = &LoadedLog> {
        self.logs.iter().filter(|log| log.visible)
    }

    // ------------------------------------------------------------------
    // Alignment
    // ------------------------------------------------------------------

    /// Align every loaded log.
    ///
    /// `EventStart` needs `channel` and `target`; `PeakValue` needs
    /// `channel`. The first log with a match becomes the baseline; logs
    /// without a match get offset 0.
    pub fn align(
        &mut self,
        method: AlignmentMethod,
        channel: Option<&str>,
        target: Option<f64>,
    ) -> Result<()> {
        let missing = |argument| Error::MissingArgument { method, argument };

        match method {
            AlignmentMethod::Manual => return Ok(()),
            AlignmentMethod::TimeZero => {
                for log in &mut self.logs {
                    log.offset = 0.0;
                }
            }
            AlignmentMethod::EventStart => {
                let channel = channel.ok_or_else(|| missing("channel"))?;
                let target = target.ok_or_else(|| missing("target value"))?;
                let tolerance = self.options.event_tolerance;
                self.align_on(channel, |values| {
                    values
                        .iter()
                        .position(|v| v.is_some_and(|v| (v - target).abs() <= tolerance))
                });
            }
            AlignmentMethod::PeakValue => {
                let channel = channel.ok_or_else(|| missing("channel"))?;
                self.align_on(channel, peak_index);
            }
        }

        tracing::info!(
            "Aligned {} logs by {}{}",
            self.logs.len(),
            method,
            channel.map(|c| format!(" on '{}'", c)).unwrap_or_default()
        );
        Ok(())
    }

    fn align_on(&mut self, channel: &str, find: impl Fn(&[Option<f64>]) -> Option<usize>) {
        let matches: Vec<Option<f64>> = self
            .logs
            .iter()
            .map(|log| {
                let values = self.channel_values(log, channel)?;
                let index = find(&values[..])?;
                log.record.time().get(index).copied()
            })
            .collect();

        let baseline = matches.iter().flatten().next().copied();
        for (log, matched) in self.logs.iter_mut().zip(matches) {
            log.offset = match (baseline, matched) {
                (Some(baseline), Some(matched)) => baseline - matched,
                _ => 0.0,
            };
            if matched.is_none() {
                tracing::debug!("'{}' has no alignment match on '{}'", log.name, channel);
            }
        }
    }

    // ------------------------------------------------------------------
    // Math channels
    // ------------------------------------------------------------------

    /// Add or replace a math channel. The formula is kept verbatim.
    pub fn add_math_channel(&mut self, name: &str, formula: &str) -> Result<()> {
        let channel = MathChannel::new(name, formula)?;
        match self.math_channels.iter_mut().find(|c| c.name() == name) {
            Some(existing) => *existing = channel,
            None => self.math_channels.push(channel),
        }
        tracing::info!("Added math channel '{}' = {}", name, formula);
        Ok(())
    }

    pub fn remove_math_channel(&mut self, name: &str) -> bool {
        let before = self.math_channels.len();
        self.math_channels.retain(|c| c.name() != name);
        self.math_channels.len() != before
    }

    pub fn math_channels(&self) -> &[MathChannel] {
        &self.math_channels
    }

    fn math_channel(&self, name: &str) -> Option<&MathChannel> {
        self.math_channels.iter().find(|c| c.name() == name)
    }

    /// A raw channel of `log`, or a math channel computed over it
    fn channel_values<'a>(
        &self,
        log: &'a LoadedLog,
        channel: &str,
    ) -> Option<Cow<'a, [Option<f64>]>> {
        if let Some(values) = log.record.channel(channel) {
            return Some(Cow::Borrowed(values));
        }
        self.math_channel(channel)?
            .compute(&log.record)
            .map(Cow::Owned)
    }

    /// Raw channel names followed by the math channels that apply to `log`
    fn channel_names(&self, log: &LoadedLog) -> Vec<String> {
        let mut names = log.record.channel_names().to_vec();
        names.extend(
            self.math_channels
                .iter()
                .filter(|c| !log.record.has_channel(c.name()) && c.applies_to(&log.record))
                .map(|c| c.name().to_string()),
        );
        names
    }

    fn value_at(&self, log: &LoadedLog, channel: &str, index: usize) -> Option<f64> {
        if log.record.has_channel(channel) {
            return log.record.value_at(channel, index);
        }
        let math = self.math_channel(channel)?;
        if !math.applies_to(&log.record) {
            return None;
        }
        math.value_at(&log.record, index)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Samples of `channel` for every visible log that has it, on the
    /// aligned axis, optionally limited to `[start, end]`
    pub fn aligned_samples(
        &self,
        channel: &str,
        start: Option<f64>,
        end: Option<f64>,
    ) -> BTreeMap<String, AlignedSeries> {
        let start = start.unwrap_or(f64::NEG_INFINITY);
        let end = end.unwrap_or(f64::INFINITY);

        self.visible_logs()
            .filter_map(|log| {
                let values = self.channel_values(log, channel)?;
                let range = log.index_range(start, end);
                let series: AlignedSeries = log.record.time()[range.clone()]
                    .iter()
                    .zip(&values[range])
                    .map(|(t, v)| (t + log.offset, *v))
                    .collect();
                Some((log.name.clone(), series))
            })
            .collect()
    }

    /// Aligned samples reduced to at most `max_points` per log with LTTB.
    /// Missing samples are dropped before downsampling.
    pub fn downsampled_samples(
        &self,
        channel: &str,
        start: Option<f64>,
        end: Option<f64>,
        max_points: usize,
    ) -> BTreeMap<String, Vec<[f64; 2]>> {
        self.aligned_samples(channel, start, end)
            .into_iter()
            .map(|(name, series)| {
                let (times, values): (Vec<f64>, Vec<f64>) = series
                    .into_iter()
                    .filter_map(|(t, v)| v.map(|v| (t, v)))
                    .unzip();
                (name, downsample_lttb(&times, &values, max_points))
            })
            .collect()
    }

    pub fn set_cursor(&mut self, position: f64, channel: Option<&str>) {
        self.cursor.position = position;
        self.cursor.active_channel = channel.map(str::to_string);
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    /// Every visible log's values at its sample nearest the cursor, plus
    /// differences against the first loaded log
    pub fn cursor_query(&self) -> ComparisonResult {
        let position = self.cursor.position;
        let mut result = ComparisonResult {
            position,
            ..ComparisonResult::default()
        };

        for log in self.visible_logs() {
            let Some(index) = log.nearest_index(position) else {
                continue;
            };
            let values = self
                .channel_names(log)
                .into_iter()
                .map(|channel| {
                    let value = self.value_at(log, &channel, index);
                    (channel, value)
                })
                .collect();
            result.values.insert(log.name.clone(), values);
        }

        if self.logs.len() > 1 {
            let baseline = &self.logs[0];
            if let Some(base_index) = baseline.nearest_index(position) {
                for log in self.logs.iter().skip(1).filter(|log| log.visible) {
                    let Some(values) = result.values.get(&log.name) else {
                        continue;
                    };
                    let diffs: BTreeMap<String, f64> = values
                        .iter()
                        .filter_map(|(channel, value)| {
                            let base = self.value_at(baseline, channel, base_index)?;
                            Some((channel.clone(), (*value)? - base))
                        })
                        .collect();
                    result.differences.insert(log.name.clone(), diffs);
                }
            }
        }

        result
    }

    /// Min, max and mean of each channel over `[start, end]` on the aligned
    /// axis. Logs with no samples in range are omitted.
    pub fn analyze_range(
        &self,
        start: f64,
        end: f64,
        channels: Option<&[&str]>,
    ) -> BTreeMap<String, BTreeMap<String, RangeStats>> {
        let mut result = BTreeMap::new();

        for log in self.visible_logs() {
            let range = log.index_range(start, end);
            if range.is_empty() {
                continue;
            }

            let names: Vec<String> = match channels {
                Some(channels) => channels.iter().map(|c| c.to_string()).collect(),
                None => self.channel_names(log),
            };
            let stats: BTreeMap<String, RangeStats> = names
                .into_iter()
                .filter_map(|channel| {
                    let values = self.channel_values(log, &channel)?;
                    let present = values[range.clone()].iter().flatten().copied();
                    Some((channel, RangeStats::from_samples(present)?))
                })
                .collect();
            result.insert(log.name.clone(), stats);
        }

        result
    }

    /// Write one log as CSV on the aligned axis
    pub fn export_log(&self, index: usize, path: impl AsRef<Path>) -> Result<()> {
        self.check_index(index)?;
        let log = &self.logs[index];
        write_csv(&log.record, path.as_ref(), log.offset)
    }
}

/// Index of the largest present value; ties go to the earliest sample
fn peak_index(values: &[Option<f64>]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
