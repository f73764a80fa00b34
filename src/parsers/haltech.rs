//! Haltech NSP CSV export parser.
//!
//! Haltech exports open with a `%DataLog%` marker and a block of
//! `Key : Value` lines. Each channel is declared by a `Channel` line followed
//! by `ID`, `Type` and `DisplayMaxMin`. Data rows start with an
//! `HH:MM:SS.mmm` timestamp and carry raw integer values that are scaled
//! according to the channel type.

use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;
use strum::{AsRefStr, EnumString};

use crate::error::{Error, Result};

use super::delimited::{parse_clock, parse_value, split_fields, ClockAxis};
use super::types::{LogFormat, LogRecord, Parseable, RecordBuilder};

static KEY_VALUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<name>[^:]+?)\s*:\s*(?<value>.+)$").expect("key/value regex is valid")
});

static DATA_ROW_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}:\d{2}").expect("timestamp regex is valid"));

/// Haltech channel types as written in the `Type` line
#[derive(AsRefStr, Clone, Copy, Debug, Default, EnumString, PartialEq)]
pub enum ChannelType {
    AFR,
    AbsPressure,
    Acceleration,
    Angle,
    AngularVelocity,
    BatteryVoltage,
    Current,
    #[strum(serialize = "Current_uA_as_mA")]
    CurrentMicroampsAsMilliamps,
    #[strum(serialize = "Current_mA_as_A")]
    CurrentMilliampsAsAmps,
    Decibel,
    Density,
    DrivenDistance,
    EngineSpeed,
    Flow,
    Frequency,
    #[strum(serialize = "FuelEcomony")]
    FuelEconomy,
    FuelVolume,
    Gear,
    GearRatio,
    MassOverTime,
    #[strum(serialize = "MassPerCyl")]
    MassPerCylinder,
    Percentage,
    PercentPerEngineCycle,
    PercentPerLambda,
    #[strum(serialize = "PercentPerRpm")]
    PercentPerRPM,
    Pressure,
    Ratio,
    #[default]
    Raw,
    Resistance,
    Speed,
    Stoichiometry,
    Temperature,
    #[strum(serialize = "Time_us")]
    TimeMicroseconds,
    #[strum(serialize = "Time_ms")]
    TimeMilliseconds,
    #[strum(serialize = "Time_ms_as_s")]
    TimeMillisecondsAsSeconds,
    #[strum(serialize = "Time_s")]
    TimeSeconds,
}

impl ChannelType {
    /// `(divisor, offset, unit)`: displayed value is `raw / divisor + offset`.
    ///
    /// Reference: Haltech CAN ECU broadcast protocol. Battery voltage is in
    /// millivolts in CSV exports, not the protocol's decivolts.
    fn scaling(&self) -> (f64, f64, &'static str) {
        use ChannelType::*;
        match self {
            EngineSpeed => (1.0, 0.0, "RPM"),
            AbsPressure => (10.0, 0.0, "kPa"),
            // Gauge pressure: subtract one atmosphere
            Pressure => (10.0, -101.3, "kPa"),
            Percentage | PercentPerEngineCycle | PercentPerLambda | PercentPerRPM => {
                (10.0, 0.0, "%")
            }
            Angle => (10.0, 0.0, "°"),
            BatteryVoltage => (1000.0, 0.0, "V"),
            Temperature => (10.0, 0.0, "K"),
            Speed => (10.0, 0.0, "km/h"),
            AFR => (1000.0, 0.0, "λ"),
            Decibel => (100.0, 0.0, "dB"),
            TimeMicroseconds => (1000.0, 0.0, "ms"),
            TimeMilliseconds => (1.0, 0.0, "ms"),
            TimeMillisecondsAsSeconds => (1000.0, 0.0, "s"),
            TimeSeconds => (1.0, 0.0, "s"),
            Acceleration => (10.0, 0.0, "m/s²"),
            AngularVelocity => (10.0, 0.0, "°/s"),
            Current | CurrentMilliampsAsAmps => (1000.0, 0.0, "A"),
            CurrentMicroampsAsMilliamps => (1000.0, 0.0, "mA"),
            Density => (10.0, 0.0, "g/m³"),
            Flow => (1.0, 0.0, "cc/min"),
            Frequency => (1.0, 0.0, "Hz"),
            FuelEconomy => (10.0, 0.0, "L/100km"),
            FuelVolume => (10.0, 0.0, "L"),
            GearRatio | Ratio | Stoichiometry => (100.0, 0.0, ""),
            Resistance => (1.0, 0.0, "Ω"),
            DrivenDistance => (1.0, 0.0, "km"),
            MassOverTime => (1.0, 0.0, "g/s"),
            MassPerCylinder => (1.0, 0.0, "mg"),
            Gear | Raw => (1.0, 0.0, ""),
        }
    }

    /// Convert a raw CSV value to display units
    pub fn convert_value(&self, raw: f64) -> f64 {
        let (divisor, offset, _) = self.scaling();
        raw / divisor + offset
    }

    pub fn unit(&self) -> &'static str {
        self.scaling().2
    }
}

/// A channel declared in the Haltech header block
#[derive(Clone, Debug, Default)]
struct ChannelDef {
    name: String,
    kind: ChannelType,
}

/// Haltech log file parser
pub struct Haltech;

impl Haltech {
    fn is_data_row(line: &str) -> bool {
        DATA_ROW_REGEX.is_match(line)
    }
}

impl Parseable for Haltech {
    fn parse(&self, contents: &str) -> Result<LogRecord> {
        let mut builder = RecordBuilder::new(LogFormat::Haltech);
        let mut defs: Vec<ChannelDef> = Vec::new();
        let mut pending: Option<ChannelDef> = None;
        let mut in_data = false;
        let mut clock = ClockAxis::default();
        let mut skipped = 0usize;

        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.eq_ignore_ascii_case("%DataLog%") {
                continue;
            }

            if Self::is_data_row(line) {
                if !in_data {
                    defs.extend(pending.take());
                    if defs.is_empty() {
                        return Err(Error::HeaderNotFound {
                            format: LogFormat::Haltech,
                            searched: line_no + 1,
                        });
                    }
                    for def in &defs {
                        builder.add_channel(&def.name, Some(def.kind.unit()));
                    }
                    in_data = true;
                }

                let fields = split_fields(line, ',');
                if fields.len() != defs.len() + 1 {
                    skipped += 1;
                    continue;
                }
                let Some(seconds) = parse_clock(&fields[0]) else {
                    skipped += 1;
                    continue;
                };
                let time = clock.relative(seconds);

                let values = fields[1..].iter().zip(&defs).map(|(field, def)| {
                    parse_value(field, false).map(|raw| def.kind.convert_value(raw))
                });
                if !builder.push_row(time, values) {
                    skipped += 1;
                }
                continue;
            }

            if in_data {
                continue;
            }
            let Some(caps) = KEY_VALUE_REGEX.captures(line) else {
                continue;
            };
            let name = caps["name"].trim();
            let value = caps["value"].trim();

            match name {
                // A new channel definition closes the previous one
                "Channel" => {
                    defs.extend(pending.take());
                    pending = Some(ChannelDef {
                        name: value.to_string(),
                        kind: ChannelType::Raw,
                    });
                }
                "Type" => {
                    if let Some(def) = pending.as_mut() {
                        def.kind = ChannelType::from_str(value).unwrap_or_else(|_| {
                            tracing::warn!("Unknown Haltech channel type: {}", value);
                            ChannelType::Raw
                        });
                    }
                }
                "ID" | "DisplayMaxMin" => {}
                _ => builder.set_property(name, value),
            }
        }

        // Header with channels but no data rows
        if !in_data {
            defs.extend(pending.take());
            for def in &defs {
                builder.add_channel(&def.name, Some(def.kind.unit()));
            }
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} malformed Haltech rows", skipped);
        }

        let log = builder.finish();
        tracing::info!(
            "Parsed Haltech log: {} channels, {} data points",
            log.channel_names().len(),
            log.len()
        );
        Ok(log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"%DataLog%
DataLogVersion : 1.1
Software : Haltech NSP
SoftwareVersion : 999.999.999.999
DownloadDateTime : 20250718 04:09:48
Channel : RPM
ID : 384
Type : EngineSpeed
DisplayMaxMin : 20000,0
Channel : Manifold Pressure
ID : 224
Type : Pressure
DisplayMaxMin : 4013,13
Log Source : 20
Log Number : 1118
Log : 20250718 02:15:46
14:15:46.000,5000,1013
14:15:46.020,5100,1020
14:15:46.040,5200
14:15:46.060,5300,oops
"#;

    #[test]
    fn test_parse_haltech_log() {
        let log = Haltech.parse(SAMPLE).unwrap();

        assert_eq!(log.format(), LogFormat::Haltech);
        assert_eq!(
            log.channel_names(),
            &["RPM".to_string(), "Manifold Pressure".to_string()]
        );
        // The short row is skipped, the bad cell is missing
        assert_eq!(log.len(), 3);
        assert_eq!(log.time()[0], 0.0);
        assert!((log.time()[1] - 0.02).abs() < 1e-9);
        assert!((log.time()[2] - 0.06).abs() < 1e-9);

        assert_eq!(log.value_at("RPM", 0), Some(5000.0));
        let pressure = log.value_at("Manifold Pressure", 0).unwrap();
        assert!(pressure.abs() < 0.01, "Expected ~0.0, got {}", pressure);
        assert_eq!(log.value_at("Manifold Pressure", 2), None);

        assert_eq!(log.unit("RPM"), Some("RPM"));
        assert_eq!(log.unit("Manifold Pressure"), Some("kPa"));
        assert_eq!(log.meta().properties["Software"], "Haltech NSP");
        assert_eq!(log.meta().properties["Log Number"], "1118");
    }

    #[test]
    fn test_rows_across_midnight_are_kept() {
        let log = Haltech
            .parse(
                "%DataLog%\nChannel : RPM\nType : EngineSpeed\n\
                 23:59:59.000,900\n23:59:59.500,910\n00:00:00.000,920\n00:00:00.500,930\n",
            )
            .unwrap();
        assert_eq!(log.time(), &[0.0, 0.5, 1.0, 1.5]);
        assert_eq!(log.value_at("RPM", 3), Some(930.0));
    }

    #[test]
    fn test_data_before_channels_is_header_error() {
        let err = Haltech
            .parse("%DataLog%\n14:15:46.000,5000,1013\n")
            .unwrap_err();
        assert!(matches!(
            err,
            Error::HeaderNotFound {
                format: LogFormat::Haltech,
                ..
            }
        ));
    }

    #[test]
    fn test_unknown_type_is_raw() {
        let log = Haltech
            .parse("Channel : Mystery\nType : Flux\n00:00:01.000,42\n")
            .unwrap();
        assert_eq!(log.value_at("Mystery", 0), Some(42.0));
        assert_eq!(log.unit("Mystery"), None);
    }

    #[test]
    fn test_channel_type_conversions() {
        assert_eq!(ChannelType::EngineSpeed.convert_value(5000.0), 5000.0);
        assert_eq!(ChannelType::AbsPressure.convert_value(1013.0), 101.3);
        assert!((ChannelType::Pressure.convert_value(2013.0) - 100.0).abs() < 0.01);
        assert_eq!(ChannelType::Percentage.convert_value(500.0), 50.0);
        assert_eq!(ChannelType::Angle.convert_value(-300.0), -30.0);
        assert_eq!(ChannelType::BatteryVoltage.convert_value(14000.0), 14.0);
        assert_eq!(ChannelType::Temperature.convert_value(2931.0), 293.1);
        assert_eq!(ChannelType::AFR.convert_value(850.0), 0.85);
        assert_eq!(ChannelType::Decibel.convert_value(2500.0), 25.0);
        assert_eq!(ChannelType::TimeMicroseconds.convert_value(5000.0), 5.0);
    }

    #[test]
    fn test_channel_type_from_str() {
        assert_eq!(ChannelType::from_str("Time_us").unwrap(), ChannelType::TimeMicroseconds);
        assert_eq!(ChannelType::from_str("FuelEcomony").unwrap(), ChannelType::FuelEconomy);
        assert!(ChannelType::from_str("Flux").is_err());
    }

    #[test]
    fn test_is_data_row() {
        assert!(Haltech::is_data_row("14:15:46.000,5000,1013"));
        assert!(Haltech::is_data_row("0:00:00.000,100,200"));
        assert!(!Haltech::is_data_row("Channel : RPM"));
        assert!(!Haltech::is_data_row("%DataLog%"));
    }
}
