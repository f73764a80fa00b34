//! Tune file codec.
//!
//! Format detection is by extension only. Binary vendor containers yield
//! header metadata; the tabular format carries full parameter maps and is
//! the only export target.

pub mod binary;
pub mod tabular;
pub mod types;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

pub use types::{ParameterMap, ParameterTable, TuneFormat, TuneRecord, TuneValue};

use crate::config::TuneOptions;
use crate::error::{Error, Result};
use crate::source;

pub fn detect_tune_format(path: impl AsRef<Path>) -> TuneFormat {
    TuneFormat::from_path(path.as_ref())
}

/// Import a tune with default options
pub fn import_tune(path: impl AsRef<Path>) -> Result<TuneRecord> {
    import_tune_with(path.as_ref(), &TuneOptions::default())
}

pub fn import_tune_with(path: &Path, options: &TuneOptions) -> Result<TuneRecord> {
    let format = TuneFormat::from_path(path);

    let record = match format {
        TuneFormat::Csv => {
            let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
            tabular::import(&source::decode_text(&bytes))
        }
        // Only the header window of a binary container is ever scanned
        format if format.is_binary() => {
            let head = source::read_head(path, options.header_scan_bytes as u64)?;
            binary::scan_header(&head, format, options.header_scan_bytes)
        }
        _ => {
            fs::metadata(path).map_err(|e| Error::io(path, e))?;
            return Err(Error::FormatUndetermined(path.to_path_buf()));
        }
    };

    tracing::info!(
        "Imported {} tune {}: {} parameters",
        format,
        path.display(),
        record.parameter_count()
    );
    Ok(record)
}

/// Write `record` to `path` as `target`. Only [`TuneFormat::Csv`] can be
/// written; every other target fails before the file is touched.
pub fn export_tune(record: &TuneRecord, path: impl AsRef<Path>, target: TuneFormat) -> Result<()> {
    let path = path.as_ref();
    if target != TuneFormat::Csv {
        return Err(Error::UnsupportedExportTarget(target));
    }

    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    let mut writer = BufWriter::new(file);
    tabular::export(record, &mut writer).map_err(|e| Error::io(path, e))?;
    writer.flush().map_err(|e| Error::io(path, e))?;

    tracing::info!(
        "Exported {} tune parameters to {}",
        record.parameter_count(),
        path.display()
    );
    Ok(())
}

/// Import then export. A failed import leaves `output` untouched.
pub fn convert_tune(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    target: TuneFormat,
) -> Result<()> {
    convert_tune_with(input.as_ref(), output.as_ref(), target, &TuneOptions::default())
}

pub fn convert_tune_with(
    input: &Path,
    output: &Path,
    target: TuneFormat,
    options: &TuneOptions,
) -> Result<()> {
    if target != TuneFormat::Csv {
        return Err(Error::UnsupportedExportTarget(target));
    }
    let record = import_tune_with(input, options)?;
    export_tune(&record, output, target)
}
