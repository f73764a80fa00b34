//! Two-column `parameter,value` interchange format.

use std::io::{self, Write};
use strum::IntoEnumIterator;

use crate::parsers::delimited::{quote_field, split_quoted_fields};

use super::types::{ParameterMap, TuneFormat, TuneRecord, TuneValue};

const HEADER: [&str; 2] = ["parameter", "value"];

/// Read tabular tune text. Rows are routed by key prefix; unprefixed
/// identification rows fill the record's metadata.
pub(crate) fn import(text: &str) -> TuneRecord {
    let mut record = TuneRecord::new(TuneFormat::Csv);
    let mut skipped = 0usize;

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_quoted_fields(line, ',');
        let [(key, _), (value, value_quoted)] = fields.as_slice() else {
            skipped += 1;
            continue;
        };
        if line_no == 0 && key.eq_ignore_ascii_case(HEADER[0]) {
            continue;
        }
        if key.is_empty() {
            skipped += 1;
            continue;
        }

        match key.to_ascii_lowercase().as_str() {
            "make" => record.make = value.clone(),
            "model" => record.model = value.clone(),
            "year" => record.year = value.clone(),
            "vin" => record.vin = Some(value.clone()).filter(|v| !v.is_empty()),
            _ => {
                let value = if *value_quoted {
                    TuneValue::Text(value.clone())
                } else {
                    TuneValue::parse(value)
                };
                match ParameterMap::split_key(key) {
                    Some((map, name)) => {
                        record.map_mut(map).insert(name.to_string(), value);
                    }
                    None => {
                        record.other.insert(key.clone(), value);
                    }
                }
            }
        }
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} tune rows without exactly two fields", skipped);
    }
    record
}

/// Write the parameter rows of `record`, header first, maps in fixed order.
///
/// Entries with an empty key cannot be read back and are left out.
pub(crate) fn export(record: &TuneRecord, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{}", HEADER.join(","))?;
    let mut dropped = 0usize;
    for map in ParameterMap::iter() {
        let prefix = map.prefix();
        for (key, value) in record.map(map) {
            if key.is_empty() {
                dropped += 1;
                continue;
            }
            writeln!(
                out,
                "{},{}",
                text_field(&format!("{}{}", prefix, key)),
                value_field(value)
            )?;
        }
    }
    if dropped > 0 {
        tracing::warn!("Left out {} tune entries with an empty key", dropped);
    }
    Ok(())
}

/// Quote text that would otherwise be trimmed on import
fn text_field(text: &str) -> String {
    if text.trim() != text {
        force_quote(text)
    } else {
        quote_field(text, ',')
    }
}

/// Text values that would read back as numbers are quoted to stay text
fn value_field(value: &TuneValue) -> String {
    match value {
        TuneValue::Text(text) if TuneValue::parse(text).as_f64().is_some() => force_quote(text),
        TuneValue::Text(text) => text_field(text),
        TuneValue::Number(_) => value.to_string(),
    }
}

fn force_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tune::types::UNKNOWN;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "parameter,value\n\
        Make,Ford\n\
        Year,2019\n\
        InjectionTiming_idle,-2.5\n\
        Boost_3000,18\n\
        Boost_4000,22.5\n\
        FuelQuantity_wot,\"high, rich\"\n\
        Calibration,AB12\n\
        garbage row without comma\n";

    #[test]
    fn test_import_routes_rows() {
        let record = import(SAMPLE);
        assert_eq!(record.source_format, TuneFormat::Csv);
        assert_eq!(record.make, "Ford");
        assert_eq!(record.model, UNKNOWN);
        assert_eq!(record.year, "2019");
        assert_eq!(record.injection_timing["idle"], TuneValue::Number(-2.5));
        assert_eq!(record.boost.len(), 2);
        assert_eq!(
            record.fuel_quantity["wot"],
            TuneValue::Text("high, rich".into())
        );
        assert_eq!(record.other["Calibration"], TuneValue::Text("AB12".into()));
    }

    #[test]
    fn test_export_order_and_quoting() {
        let mut out = Vec::new();
        export(&import(SAMPLE), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "parameter,value\n\
             InjectionTiming_idle,-2.5\n\
             FuelQuantity_wot,\"high, rich\"\n\
             Boost_3000,18\n\
             Boost_4000,22.5\n\
             Other_Calibration,AB12\n"
        );
    }

    #[test]
    fn test_reexport_is_stable() {
        let mut first = Vec::new();
        export(&import(SAMPLE), &mut first).unwrap();
        let mut second = Vec::new();
        export(&import(&String::from_utf8(first.clone()).unwrap()), &mut second).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_text_values_survive_reexport() {
        let mut record = TuneRecord::new(TuneFormat::Csv);
        record.boost.insert("label".into(), TuneValue::Text("1.50".into()));
        record.boost.insert("pad".into(), TuneValue::Text(" x".into()));
        record.boost.insert("".into(), TuneValue::Number(3.0));

        let mut first = Vec::new();
        export(&record, &mut first).unwrap();
        let first = String::from_utf8(first).unwrap();
        assert_eq!(
            first,
            "parameter,value\n\
             Boost_label,\"1.50\"\n\
             Boost_pad,\" x\"\n"
        );

        let reimported = import(&first);
        assert_eq!(reimported.boost["label"], TuneValue::Text("1.50".into()));
        assert_eq!(reimported.boost["pad"], TuneValue::Text(" x".into()));
        assert!(reimported.other.is_empty());

        let mut second = Vec::new();
        export(&reimported, &mut second).unwrap();
        assert_eq!(first, String::from_utf8(second).unwrap());
    }

    #[test]
    fn test_quoted_number_imports_as_text() {
        let record = import("Boost_a,\"7\"\nBoost_b,7\n");
        assert_eq!(record.boost["a"], TuneValue::Text("7".into()));
        assert_eq!(record.boost["b"], TuneValue::Number(7.0));
    }

    #[test]
    fn test_headerless_import() {
        let record = import("Boost_1,1\n");
        assert_eq!(record.boost["1"], TuneValue::Number(1.0));
    }
}
