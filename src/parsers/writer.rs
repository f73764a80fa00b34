//! CSV re-export of a parsed record.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

use super::delimited::quote_field;
use super::types::LogRecord;

/// Write `record` as comma-delimited text with every timestamp shifted by
/// `offset` seconds. Missing samples are written as empty cells, so the
/// output parses back with the generic CSV routine.
pub fn write_csv(record: &LogRecord, path: &Path, offset: f64) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    write_to(record, &mut writer, offset).map_err(|e| Error::io(path, e))?;
    writer.flush().map_err(|e| Error::io(path, e))?;

    tracing::info!(
        "Exported {} samples of {} channels to {}",
        record.len(),
        record.channel_names().len(),
        path.display()
    );
    Ok(())
}

fn write_to(record: &LogRecord, out: &mut impl Write, offset: f64) -> std::io::Result<()> {
    let names = record.channel_names();

    let mut header = vec!["Time".to_string()];
    header.extend(names.iter().map(|name| match record.unit(name) {
        Some(unit) => quote_field(&format!("{} ({})", name, unit), ','),
        None => quote_field(name, ','),
    }));
    writeln!(out, "{}", header.join(","))?;

    let columns: Vec<&[Option<f64>]> = names
        .iter()
        .map(|name| record.channel(name).unwrap_or_default())
        .collect();

    for (row, t) in record.time().iter().enumerate() {
        write!(out, "{}", t + offset)?;
        for column in &columns {
            match column.get(row).copied().flatten() {
                Some(v) => write!(out, ",{}", v)?,
                None => write!(out, ",")?,
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::types::LogFormat;

    #[test]
    fn test_write_with_offset_and_gaps() {
        let record = LogRecord::from_columns(
            LogFormat::Csv,
            vec![0.0, 0.5],
            vec![
                ("RPM".into(), vec![Some(800.0), None]),
                ("a,b".into(), vec![Some(1.5), Some(2.0)]),
            ],
        )
        .unwrap();

        let mut out = Vec::new();
        write_to(&record, &mut out, 10.0).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "Time,RPM,\"a,b\"\n10,800,1.5\n10.5,,2\n");
    }
}
