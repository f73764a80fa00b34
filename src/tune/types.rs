use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use strum::{AsRefStr, Display, EnumIter, IntoEnumIterator};

/// Recognised ECU tune file encodings, keyed by extension
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
pub enum TuneFormat {
    #[strum(serialize = "HP Tuners")]
    Hpt,
    #[strum(serialize = "EFILive")]
    EfiLive,
    #[strum(serialize = "COBB Accessport")]
    Cobb,
    #[strum(serialize = "WinOLS")]
    WinOls,
    #[strum(serialize = "raw binary")]
    RawBinary,
    #[strum(serialize = "CSV")]
    Csv,
    #[default]
    Unknown,
}

impl TuneFormat {
    /// File extensions belonging to this format, lower case
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            TuneFormat::Hpt => &["hpt"],
            TuneFormat::EfiLive => &["ctz", "coz"],
            TuneFormat::Cobb => &["ptm"],
            TuneFormat::WinOls => &["ols"],
            TuneFormat::RawBinary => &["bin", "ori"],
            TuneFormat::Csv => &["csv"],
            TuneFormat::Unknown => &[],
        }
    }

    /// Case-insensitive extension lookup
    pub fn from_path(path: &Path) -> Self {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return TuneFormat::Unknown;
        };
        let ext = ext.to_ascii_lowercase();
        TuneFormat::iter()
            .find(|format| format.extensions().contains(&ext.as_str()))
            .unwrap_or_default()
    }

    /// Binary vendor containers only yield header metadata
    pub fn is_binary(&self) -> bool {
        !matches!(self, TuneFormat::Csv | TuneFormat::Unknown)
    }
}

/// A tune parameter: numeric when the source value parses as a number
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TuneValue {
    Number(f64),
    Text(String),
}

impl TuneValue {
    /// Coerce raw text, preferring a finite number
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => TuneValue::Number(v),
            _ => TuneValue::Text(raw.to_string()),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TuneValue::Number(v) => Some(*v),
            TuneValue::Text(_) => None,
        }
    }
}

impl fmt::Display for TuneValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TuneValue::Number(v) => write!(f, "{}", v),
            TuneValue::Text(s) => f.write_str(s),
        }
    }
}

/// The four named parameter maps of a tune, plus everything else
#[derive(AsRefStr, Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq)]
pub enum ParameterMap {
    InjectionTiming,
    InjectionPressure,
    FuelQuantity,
    Boost,
    Other,
}

impl ParameterMap {
    /// Row-key prefix used by the tabular interchange format
    pub fn prefix(&self) -> String {
        format!("{}_", self.as_ref())
    }

    /// Split `Boost_k` into `(Boost, "k")`
    pub fn split_key(key: &str) -> Option<(Self, &str)> {
        ParameterMap::iter().find_map(|map| {
            key.strip_prefix(&map.prefix())
                .filter(|rest| !rest.is_empty())
                .map(|rest| (map, rest))
        })
    }
}

pub type ParameterTable = BTreeMap<String, TuneValue>;

/// Vehicle identification and calibration parameters recovered from a tune
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TuneRecord {
    pub source_format: TuneFormat,
    pub make: String,
    pub model: String,
    pub year: String,
    pub vin: Option<String>,
    pub injection_timing: ParameterTable,
    pub injection_pressure: ParameterTable,
    pub fuel_quantity: ParameterTable,
    pub boost: ParameterTable,
    /// Rows that belong to none of the named maps
    pub other: ParameterTable,
}

/// Placeholder for identification fields that could not be recovered
pub const UNKNOWN: &str = "Unknown";

impl TuneRecord {
    pub fn new(source_format: TuneFormat) -> Self {
        Self {
            source_format,
            make: UNKNOWN.to_string(),
            model: UNKNOWN.to_string(),
            year: UNKNOWN.to_string(),
            vin: None,
            injection_timing: ParameterTable::new(),
            injection_pressure: ParameterTable::new(),
            fuel_quantity: ParameterTable::new(),
            boost: ParameterTable::new(),
            other: ParameterTable::new(),
        }
    }

    pub fn map(&self, map: ParameterMap) -> &ParameterTable {
        match map {
            ParameterMap::InjectionTiming => &self.injection_timing,
            ParameterMap::InjectionPressure => &self.injection_pressure,
            ParameterMap::FuelQuantity => &self.fuel_quantity,
            ParameterMap::Boost => &self.boost,
            ParameterMap::Other => &self.other,
        }
    }

    pub fn map_mut(&mut self, map: ParameterMap) -> &mut ParameterTable {
        match map {
            ParameterMap::InjectionTiming => &mut self.injection_timing,
            ParameterMap::InjectionPressure => &mut self.injection_pressure,
            ParameterMap::FuelQuantity => &mut self.fuel_quantity,
            ParameterMap::Boost => &mut self.boost,
            ParameterMap::Other => &mut self.other,
        }
    }

    /// Total parameters across every map
    pub fn parameter_count(&self) -> usize {
        ParameterMap::iter().map(|m| self.map(m).len()).sum()
    }
}
