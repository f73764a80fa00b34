//! Tests for tune file detection, import, export and conversion

#[cfg(test)]
mod tests {
    use logbench::config::TuneOptions;
    use logbench::tune::{
        convert_tune, convert_tune_with, detect_tune_format, export_tune, import_tune,
        TuneFormat, TuneRecord, TuneValue,
    };
    use logbench::Error;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_detect_by_extension_only() {
        assert_eq!(detect_tune_format("stock.HPT"), TuneFormat::Hpt);
        assert_eq!(detect_tune_format("tune.ptm"), TuneFormat::Cobb);
        assert_eq!(detect_tune_format("dump.ori"), TuneFormat::RawBinary);
        assert_eq!(detect_tune_format("notes.txt"), TuneFormat::Unknown);
    }

    #[test]
    fn test_binary_header_metadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("truck.hpt");
        let mut bytes = vec![0x00, 0x13, 0x37, 0xFE];
        bytes.extend_from_slice(b"CAL 1GC4K0C89GF123456 MY 2016 ");
        bytes.extend(std::iter::repeat(0xAA).take(4096));
        fs::write(&path, &bytes).unwrap();

        let record = import_tune(&path).unwrap();
        assert_eq!(record.source_format, TuneFormat::Hpt);
        assert_eq!(record.vin.as_deref(), Some("1GC4K0C89GF123456"));
        assert_eq!(record.year, "2016");
        assert_eq!(record.make, "Unknown");
        assert_eq!(record.model, "Unknown");
        assert_eq!(record.parameter_count(), 0);
    }

    #[test]
    fn test_binary_without_tokens_keeps_sentinels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("blank.bin");
        fs::write(&path, vec![0u8; 2048]).unwrap();

        let record = import_tune(&path).unwrap();
        assert_eq!(record.vin, None);
        assert_eq!(record.year, "Unknown");
    }

    #[test]
    fn test_tabular_round_trip_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let mut record = TuneRecord::new(TuneFormat::Csv);
        record.boost.insert("k".into(), TuneValue::Number(21.5));
        record.boost.insert("idle".into(), TuneValue::Number(0.0));
        record
            .injection_timing
            .insert("1500rpm".into(), TuneValue::Number(-4.25));
        record
            .injection_pressure
            .insert("rail".into(), TuneValue::Number(1800.0));
        record
            .fuel_quantity
            .insert("limit, smoke".into(), TuneValue::Text("map \"A\"".into()));

        let first = dir.path().join("first.csv");
        export_tune(&record, &first, TuneFormat::Csv).unwrap();
        let second = dir.path().join("second.csv");
        convert_tune(&first, &second, TuneFormat::Csv).unwrap();

        let first_text = fs::read_to_string(&first).unwrap();
        assert_eq!(first_text, fs::read_to_string(&second).unwrap());
        assert_eq!(
            first_text,
            "parameter,value\n\
             InjectionTiming_1500rpm,-4.25\n\
             InjectionPressure_rail,1800\n\
             \"FuelQuantity_limit, smoke\",\"map \"\"A\"\"\"\n\
             Boost_idle,0\n\
             Boost_k,21.5\n"
        );

        let reimported = import_tune(&second).unwrap();
        assert_eq!(reimported.boost, record.boost);
        assert_eq!(reimported.fuel_quantity, record.fuel_quantity);
    }

    #[test]
    fn test_text_values_keep_their_type_through_files() {
        let dir = TempDir::new().unwrap();
        let mut record = TuneRecord::new(TuneFormat::Csv);
        record
            .boost
            .insert("label".into(), TuneValue::Text("1.50".into()));
        record.boost.insert("pad".into(), TuneValue::Text(" x".into()));
        record.boost.insert("".into(), TuneValue::Number(3.0));

        let first = dir.path().join("first.csv");
        export_tune(&record, &first, TuneFormat::Csv).unwrap();
        let reimported = import_tune(&first).unwrap();
        assert_eq!(reimported.boost["label"], TuneValue::Text("1.50".into()));
        assert_eq!(reimported.boost["pad"], TuneValue::Text(" x".into()));
        assert_eq!(reimported.boost.len(), 2);
        assert!(reimported.other.is_empty());

        let second = dir.path().join("second.csv");
        export_tune(&reimported, &second, TuneFormat::Csv).unwrap();
        assert_eq!(
            fs::read_to_string(&first).unwrap(),
            fs::read_to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_unsupported_export_target() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.csv");
        fs::write(&input, "parameter,value\nBoost_1,2\n").unwrap();
        let output = dir.path().join("out.hpt");

        let err = convert_tune(&input, &output, TuneFormat::Hpt).unwrap_err();
        assert!(matches!(err, Error::UnsupportedExportTarget(TuneFormat::Hpt)));
        assert_eq!(err.to_string(), "exporting tunes as HP Tuners is not supported");
        assert!(!output.exists());
    }

    #[test]
    fn test_convert_binary_to_tabular() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("tune.ctz");
        fs::write(&input, b"\x01\x02 2008 LMM ").unwrap();
        let output = dir.path().join("tune.csv");

        convert_tune(&input, &output, TuneFormat::Csv).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "parameter,value\n");
    }

    #[test]
    fn test_scan_window_from_options() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("late.ols");
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"1999 ");
        fs::write(&input, &bytes).unwrap();

        let options = TuneOptions {
            header_scan_bytes: 50,
        };
        let output = dir.path().join("late.csv");
        convert_tune_with(&input, &output, TuneFormat::Csv, &options).unwrap();
        assert!(output.exists());

        let record = logbench::tune::import_tune_with(&input, &options).unwrap();
        assert_eq!(record.year, "Unknown");
        assert_eq!(import_tune(&input).unwrap().year, "1999");
    }
}
