//! Structured-object log parser.
//!
//! Two layouts are accepted:
//!
//! ```text
//! {"time": [0, 0.1], "channels": {"RPM": [800, 810]}, "units": {"RPM": "rpm"}}
//! [{"time": 0, "RPM": 800}, {"time": 0.1, "RPM": 810}]
//! ```
//!
//! `data` may stand in for `channels`, and either may also be an array of
//! row objects. Key order from the file is preserved.

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::units;

use super::delimited::parse_value;
use super::types::{LogFormat, LogRecord, Parseable, RecordBuilder};

pub struct JsonLog;

impl Parseable for JsonLog {
    fn parse(&self, contents: &str) -> Result<LogRecord> {
        let root: Value = serde_json::from_str(contents)?;
        let mut builder = RecordBuilder::new(LogFormat::Json);

        match root {
            Value::Array(rows) => parse_rows(&rows, None, &mut builder)?,
            Value::Object(object) => parse_object(&object, &mut builder)?,
            _ => return Err(malformed("top level must be an object or an array")),
        }

        let log = builder.finish();
        tracing::info!(
            "Parsed JSON log: {} channels, {} data points",
            log.channel_names().len(),
            log.len()
        );
        Ok(log)
    }
}

fn malformed(reason: impl Into<String>) -> Error {
    Error::Malformed {
        format: LogFormat::Json,
        reason: reason.into(),
    }
}

fn parse_object(object: &Map<String, Value>, builder: &mut RecordBuilder) -> Result<()> {
    let units = object.get("units").and_then(Value::as_object);
    if let Some(vehicle) = object
        .get("vehicle")
        .or_else(|| object.get("metadata"))
        .and_then(Value::as_object)
    {
        read_vehicle(vehicle, builder);
    }

    let time = object
        .iter()
        .find(|(k, _)| units::is_time_column(k))
        .map(|(_, v)| v);
    let channels = object.get("channels").or_else(|| object.get("data"));

    match (time, channels) {
        (_, Some(Value::Array(rows))) => parse_rows(rows, units, builder),
        (Some(Value::Array(time)), Some(Value::Object(columns))) => {
            parse_columns(time, columns, units, builder)
        }
        (None, _) => Err(malformed("missing 'time' array")),
        (_, None) => Err(malformed("missing 'channels' or 'data'")),
        _ => Err(malformed("'time' must be an array and 'channels' an object")),
    }
}

fn parse_columns(
    time: &[Value],
    columns: &Map<String, Value>,
    units: Option<&Map<String, Value>>,
    builder: &mut RecordBuilder,
) -> Result<()> {
    let len = time.len();
    let mut data: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());

    for (name, values) in columns {
        let Value::Array(values) = values else {
            return Err(malformed(format!("channel '{}' is not an array", name)));
        };
        if values.len() != len {
            tracing::warn!(
                "JSON channel '{}' has {} samples, time axis has {}; adjusting",
                name,
                values.len(),
                len
            );
        }
        let mut column: Vec<Option<f64>> = values.iter().take(len).map(sample).collect();
        column.resize(len, None);

        builder.add_channel(name, Some(&unit_for(name, units)));
        data.push(column);
    }

    builder.reserve(len);
    let mut skipped = 0usize;
    for (row, t) in time.iter().enumerate() {
        let Some(t) = sample(t) else {
            skipped += 1;
            continue;
        };
        if !builder.push_row(t, data.iter().map(|column| column[row])) {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::debug!("Skipped {} JSON samples with missing or out-of-order time", skipped);
    }
    Ok(())
}

fn parse_rows(
    rows: &[Value],
    units: Option<&Map<String, Value>>,
    builder: &mut RecordBuilder,
) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    let Value::Object(first) = first else {
        return Err(malformed("rows must be objects"));
    };

    let time_key = first.keys().find(|k| units::is_time_column(k)).cloned();
    let names: Vec<&String> = first
        .keys()
        .filter(|k| Some(*k) != time_key.as_ref())
        .collect();
    for name in &names {
        builder.add_channel(name, Some(&unit_for(name, units)));
    }
    builder.reserve(rows.len());

    let mut skipped = 0usize;
    for (index, row) in rows.iter().enumerate() {
        let Value::Object(row) = row else {
            skipped += 1;
            continue;
        };
        let time = match &time_key {
            Some(key) => match row.get(key).and_then(sample) {
                Some(t) => t,
                None => {
                    skipped += 1;
                    continue;
                }
            },
            None => index as f64,
        };
        let values = names.iter().map(|name| row.get(*name).and_then(sample));
        if !builder.push_row(time, values) {
            skipped += 1;
        }
    }
    if skipped > 0 {
        tracing::debug!("Skipped {} JSON rows", skipped);
    }
    Ok(())
}

/// Numbers and numeric strings become samples; everything else is missing
fn sample(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_value(s, false),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn unit_for(name: &str, units: Option<&Map<String, Value>>) -> String {
    units
        .and_then(|u| u.get(name))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| units::infer_unit(name).to_string())
}

fn read_vehicle(object: &Map<String, Value>, builder: &mut RecordBuilder) {
    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    let vehicle = builder.vehicle_mut();
    vehicle.make = text("make");
    vehicle.model = text("model");
    vehicle.year = object.get("year").and_then(|y| match y {
        Value::Number(n) => n.as_u64().and_then(|y| u16::try_from(y).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_object_with_channels() {
        let log = JsonLog
            .parse(
                r#"{
                    "vehicle": {"make": "Ram", "model": "2500", "year": 2021},
                    "time": [0, 0.5, 1.0],
                    "channels": {"RPM": [800, 900, 1000], "Boost": [1.0, null, "2.5"]},
                    "units": {"Boost": "psi"}
                }"#,
            )
            .unwrap();

        assert_eq!(log.format(), LogFormat::Json);
        assert_eq!(log.channel_names(), &["RPM".to_string(), "Boost".to_string()]);
        assert_eq!(log.channel("Boost").unwrap(), &[Some(1.0), None, Some(2.5)]);
        assert_eq!(log.unit("Boost"), Some("psi"));
        assert_eq!(log.unit("RPM"), Some("RPM"));
        assert_eq!(log.meta().sample_rate, Some(2.0));
        let vehicle = log.meta().vehicle.clone().unwrap();
        assert_eq!(vehicle.make.as_deref(), Some("Ram"));
        assert_eq!(vehicle.year, Some(2021));
    }

    #[test]
    fn test_short_and_long_channels_are_fitted() {
        let log = JsonLog
            .parse(r#"{"time": [0, 1, 2], "data": {"A": [1], "B": [1, 2, 3, 4]}}"#)
            .unwrap();
        assert_eq!(log.channel("A").unwrap(), &[Some(1.0), None, None]);
        assert_eq!(log.channel("B").unwrap(), &[Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn test_array_of_objects() {
        let log = JsonLog
            .parse(
                r#"[
                    {"timestamp": 0.0, "rpm": 800, "tps": 0},
                    {"timestamp": 0.1, "rpm": 850},
                    {"timestamp": 0.2, "rpm": 900, "tps": 4, "extra": 1}
                ]"#,
            )
            .unwrap();

        assert_eq!(log.channel_names(), &["rpm".to_string(), "tps".to_string()]);
        assert_eq!(log.time(), &[0.0, 0.1, 0.2]);
        assert_eq!(log.channel("tps").unwrap(), &[Some(0.0), None, Some(4.0)]);
        assert!(!log.has_channel("extra"));
    }

    #[test]
    fn test_data_as_rows() {
        let log = JsonLog
            .parse(r#"{"data": [{"t": 0, "X": 1}, {"t": 1, "X": 2}]}"#)
            .unwrap();
        assert_eq!(log.time(), &[0.0, 1.0]);
        assert_eq!(log.channel("X").unwrap(), &[Some(1.0), Some(2.0)]);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(JsonLog.parse("42"), Err(Error::Malformed { .. })));
        assert!(matches!(
            JsonLog.parse(r#"{"channels": {"A": [1]}}"#),
            Err(Error::Malformed { .. })
        ));
        assert!(matches!(JsonLog.parse("{not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_empty_array_is_empty_record() {
        let log = JsonLog.parse("[]").unwrap();
        assert!(log.is_empty());
    }
}
