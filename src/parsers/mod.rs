pub mod delimited;
pub mod detect;
pub mod haltech;
pub mod json;
pub mod types;
pub mod vendors;
pub mod writer;

use std::path::Path;

pub use haltech::Haltech;
pub use json::JsonLog;
pub use types::{LogFormat, LogMetadata, LogRecord, Parseable, VehicleInfo};
pub use writer::write_csv;

use crate::config::ParseOptions;
use crate::error::{Error, Result};
use crate::source;

use delimited::DelimitedParser;
use vendors::Dialect;

/// Format detector and parser.
///
/// One instance is built by the caller and reused for every file; it holds
/// no state beyond its options.
#[derive(Clone, Debug, Default)]
pub struct LogParser {
    options: ParseOptions,
}

impl LogParser {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    /// Determine the format of the file at `path`.
    ///
    /// Returns [`LogFormat::Unknown`] rather than an error when no heuristic
    /// matches; only I/O failures are errors.
    pub fn detect(&self, path: &Path) -> Result<LogFormat> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        if let Some(format) = detect::from_extension(path) {
            tracing::debug!("Detected {} log by extension: {}", format, path.display());
            return Ok(format);
        }

        let head = source::read_head(path, source::SNIFF_BYTES)?;
        let text = source::decode_text(&head);
        Ok(detect::detect_content(&text, self.options.sniff_lines))
    }

    /// Parse the file at `path`, detecting its format when `format` is `None`
    pub fn parse(&self, path: &Path, format: Option<LogFormat>) -> Result<LogRecord> {
        let format = match format {
            Some(format) => format,
            None => self.detect(path)?,
        };
        if format == LogFormat::Unknown {
            return Err(Error::FormatUndetermined(path.to_path_buf()));
        }

        let contents = source::read_text(path, self.options.mmap_threshold)?;
        tracing::info!("Parsing {} as {}", path.display(), format);
        self.parse_with(&contents, format)
    }

    /// Parse text already in memory. Without an explicit format the text is
    /// sniffed the same way file content is.
    pub fn parse_str(&self, contents: &str, format: Option<LogFormat>) -> Result<LogRecord> {
        let format = format
            .unwrap_or_else(|| detect::detect_content(contents, self.options.sniff_lines));
        if format == LogFormat::Unknown {
            return Err(Error::FormatUndetermined("<memory>".into()));
        }
        self.parse_with(contents, format)
    }

    fn parse_with(&self, contents: &str, format: LogFormat) -> Result<LogRecord> {
        match format {
            LogFormat::Haltech => Haltech.parse(contents),
            LogFormat::Json => JsonLog.parse(contents),
            _ => match Dialect::for_format(format) {
                Some(dialect) => {
                    DelimitedParser::new(dialect, self.options.header_search_lines).parse(contents)
                }
                None => Err(Error::FormatUndetermined("<memory>".into())),
            },
        }
    }
}

/// Detect a log format with default options
pub fn detect_log_format(path: impl AsRef<Path>) -> Result<LogFormat> {
    LogParser::default().detect(path.as_ref())
}

/// Parse a log with default options
pub fn parse_log(path: impl AsRef<Path>, format: Option<LogFormat>) -> Result<LogRecord> {
    LogParser::default().parse(path.as_ref(), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_str_sniffs_format() {
        let parser = LogParser::default();
        let log = parser.parse_str("Time,RPM,TPS\n0,1000,10\n1,1500,20\n", None).unwrap();
        assert_eq!(log.format(), LogFormat::Csv);
        assert_eq!(log.len(), 2);

        let log = parser.parse_str("Time\tRPM\n0\t1000\n", None).unwrap();
        assert_eq!(log.format(), LogFormat::Tsv);
    }

    #[test]
    fn test_parse_str_undetermined() {
        let err = LogParser::default().parse_str("hello", None).unwrap_err();
        assert!(matches!(err, Error::FormatUndetermined(_)));

        let err = LogParser::default()
            .parse_str("Time,RPM\n0,1\n", Some(LogFormat::Unknown))
            .unwrap_err();
        assert!(matches!(err, Error::FormatUndetermined(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_log("/definitely/not/here.csv", None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        let err = detect_log_format("/definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn test_header_search_limit_from_options() {
        let parser = LogParser::new(ParseOptions {
            header_search_lines: 2,
            ..ParseOptions::default()
        });
        let text = "HP Tuners\nnotes\nmore notes\nTime,RPM\n0,1\n";
        let err = parser.parse_str(text, None).unwrap_err();
        assert!(matches!(
            err,
            Error::HeaderNotFound { format: LogFormat::HpTuners, searched: 2 }
        ));

        let log = LogParser::default().parse_str(text, None).unwrap();
        assert_eq!(log.channel("RPM").unwrap(), &[Some(1.0)]);
    }
}
