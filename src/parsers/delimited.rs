//! Generic delimited-text parser shared by CSV, TSV and the vendor dialects.
//!
//! The routine locates a header row, maps every non-time column to a channel
//! and appends one time value per data row. Rows whose field count differs
//! from the header are skipped rather than aborting the parse.

use crate::error::{Error, Result};
use crate::units;

use super::types::{LogRecord, Parseable, RecordBuilder};
use super::vendors::{scan_preamble, Dialect, HeaderRule};

/// Parser for delimited text following one [`Dialect`]'s rules
pub(crate) struct DelimitedParser {
    dialect: Dialect,
    header_search_lines: usize,
}

/// Header row location and layout
struct Header {
    line: usize,
    delimiter: char,
    fields: Vec<String>,
    time_column: Option<usize>,
}

impl DelimitedParser {
    pub(crate) fn new(dialect: Dialect, header_search_lines: usize) -> Self {
        Self {
            dialect,
            header_search_lines,
        }
    }

    fn find_header(&self, lines: &[&str]) -> Result<Option<Header>> {
        match self.dialect.header {
            HeaderRule::FirstLine => {
                let Some(line) = lines.iter().position(|l| !l.trim().is_empty()) else {
                    return Ok(None);
                };
                Ok(Some(self.header_at(lines, line)))
            }
            HeaderRule::Search => {
                let searched = lines.len().min(self.header_search_lines);
                (0..searched)
                    .map(|line| self.header_at(lines, line))
                    .find(|h| h.time_column.is_some() && h.fields.len() >= 2)
                    .map(Some)
                    .ok_or(Error::HeaderNotFound {
                        format: self.dialect.format,
                        searched,
                    })
            }
        }
    }

    fn header_at(&self, lines: &[&str], line: usize) -> Header {
        let delimiter = self
            .dialect
            .delimiter
            .unwrap_or_else(|| sniff_delimiter(lines[line]));
        let mut fields = split_fields(lines[line], delimiter);
        if fields.last().is_some_and(|f| f.is_empty()) {
            fields.pop();
        }
        let time_column = fields.iter().position(|f| self.is_time_column(f));
        Header {
            line,
            delimiter,
            fields,
            time_column,
        }
    }

    fn is_time_column(&self, name: &str) -> bool {
        if units::is_time_column(name) {
            return true;
        }
        let (base, _) = units::split_name_unit(name);
        let base = base.to_ascii_lowercase();
        self.dialect.time_aliases.iter().any(|alias| *alias == base)
    }

    /// Channel name and unit for a header field
    fn channel_for(&self, field: &str) -> (String, String) {
        let (name, unit) = units::split_name_unit(field);
        let unit = unit.unwrap_or_else(|| units::infer_unit(&name).to_string());
        let name = if self.dialect.path_columns {
            name.rsplit('/').next().unwrap_or(&name).trim().to_string()
        } else {
            name
        };
        (name, unit)
    }
}

impl Parseable for DelimitedParser {
    fn parse(&self, contents: &str) -> Result<LogRecord> {
        let format = self.dialect.format;
        let lines: Vec<&str> = contents.lines().collect();
        let mut builder = RecordBuilder::new(format);

        let Some(header) = self.find_header(&lines)? else {
            tracing::info!("Parsed empty {} log", format);
            return Ok(builder.finish());
        };

        scan_preamble(&lines[..header.line], header.delimiter, &mut builder);

        // Column index in the file -> column index in the builder
        let mut column_map: Vec<Option<usize>> = Vec::with_capacity(header.fields.len());
        for (idx, field) in header.fields.iter().enumerate() {
            if Some(idx) == header.time_column {
                column_map.push(None);
                continue;
            }
            let (name, unit) = self.channel_for(field);
            builder.add_channel(&name, Some(&unit));
            column_map.push(Some(builder.channel_count() - 1));
        }
        builder.reserve(lines.len().saturating_sub(header.line + 1));

        let width = header.fields.len();
        let decimal_comma = header.delimiter == ';';
        let mut clock = ClockAxis::default();
        let mut synthetic_time = 0.0;
        let mut skipped = 0usize;
        let mut units_row_pending = self.dialect.units_row;

        for line in &lines[header.line + 1..] {
            if line.trim().is_empty() {
                continue;
            }

            let mut fields = split_fields(line, header.delimiter);
            if fields.len() == width + 1 && fields.last().is_some_and(|f| f.is_empty()) {
                fields.pop();
            }
            if fields.len() != width {
                skipped += 1;
                continue;
            }

            if units_row_pending {
                units_row_pending = false;
                if is_units_row(&fields) {
                    for (field, column) in fields.iter().zip(&column_map) {
                        if let Some(column) = column {
                            builder.set_unit(*column, field);
                        }
                    }
                    continue;
                }
            }

            let time = match header.time_column {
                Some(col) => match parse_time(&fields[col], &mut clock, decimal_comma) {
                    Some(t) => t,
                    None => {
                        skipped += 1;
                        continue;
                    }
                },
                None => {
                    let t = synthetic_time;
                    synthetic_time += 1.0;
                    t
                }
            };

            let mut values = vec![None; builder.channel_count()];
            for (field, column) in fields.iter().zip(&column_map) {
                if let Some(column) = column {
                    values[*column] = parse_value(field, decimal_comma);
                }
            }

            if !builder.push_row(time, values) {
                tracing::warn!(
                    "Skipping {} row with out-of-order time {} (previous {:?})",
                    format,
                    time,
                    builder.last_time()
                );
                skipped += 1;
            }
        }

        if skipped > 0 {
            tracing::debug!("Skipped {} malformed {} rows", skipped, format);
        }
        if header.time_column.is_none() {
            tracing::debug!("No time column in {} log, using row index as time", format);
        }

        let log = builder.finish();
        tracing::info!(
            "Parsed {} log: {} channels, {} data points",
            format,
            log.channel_names().len(),
            log.len()
        );
        Ok(log)
    }
}

/// Pick the delimiter with the most occurrences; ties prefer tab, then
/// semicolon, then comma.
pub(crate) fn sniff_delimiter(line: &str) -> char {
    ['\t', ';', ',']
        .into_iter()
        .map(|d| (d, line.matches(d).count()))
        .fold(('\t', 0), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0
}

/// Split one line into fields, honouring double-quoted fields and
/// `""` escapes inside them. Whitespace outside quotes is trimmed.
pub(crate) fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    split_quoted_fields(line, delimiter)
        .into_iter()
        .map(|(field, _)| field)
        .collect()
}

/// Split a line like [`split_fields`], also reporting whether each field was
/// quoted. Whitespace inside quotes is kept.
pub(crate) fn split_quoted_fields(line: &str, delimiter: char) -> Vec<(String, bool)> {
    let mut fields = Vec::new();
    let mut field = String::new();
    // unquoted whitespace, kept only when more text follows it
    let mut gap = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => {
                if !in_quotes && !field.is_empty() {
                    field.push_str(&gap);
                }
                gap.clear();
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if in_quotes => field.push(c),
            c if c == delimiter => {
                fields.push((std::mem::take(&mut field), quoted));
                gap.clear();
                quoted = false;
            }
            c if c.is_whitespace() => {
                if !field.is_empty() || quoted {
                    gap.push(c);
                }
            }
            c => {
                field.push_str(&gap);
                gap.clear();
                field.push(c);
            }
        }
    }
    fields.push((field, quoted));
    fields
}

/// Quote a field for writing if it contains the delimiter or a quote
pub(crate) fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Parse a numeric cell. Empty, non-numeric and non-finite cells are missing.
pub(crate) fn parse_value(field: &str, decimal_comma: bool) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    let parsed = if decimal_comma && field.contains(',') && !field.contains('.') {
        field.replace(',', ".").parse::<f64>()
    } else {
        field.parse::<f64>()
    };
    parsed.ok().filter(|v| v.is_finite())
}

/// Parse a time cell as decimal seconds or as clock time.
///
/// Clock times (`HH:MM:SS.fff` or `MM:SS.fff`) are placed on `clock`.
pub(crate) fn parse_time(field: &str, clock: &mut ClockAxis, decimal_comma: bool) -> Option<f64> {
    if let Some(seconds) = parse_value(field, decimal_comma) {
        return Some(seconds);
    }
    parse_clock(field).map(|seconds| clock.relative(seconds))
}

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Relative time axis built from wall-clock readings.
///
/// A reading more than half a day earlier than the latest one has crossed
/// midnight; it and every later reading are shifted by a day.
#[derive(Debug, Default)]
pub(crate) struct ClockAxis {
    origin: Option<f64>,
    latest: Option<f64>,
    day_offset: f64,
}

impl ClockAxis {
    /// Seconds since the first reading
    pub(crate) fn relative(&mut self, seconds_of_day: f64) -> f64 {
        let mut absolute = seconds_of_day + self.day_offset;
        if let Some(latest) = self.latest {
            if latest - absolute > SECONDS_PER_DAY / 2.0 {
                self.day_offset += SECONDS_PER_DAY;
                absolute += SECONDS_PER_DAY;
            }
        }
        self.latest = Some(self.latest.map_or(absolute, |latest| latest.max(absolute)));
        absolute - *self.origin.get_or_insert(absolute)
    }
}

/// Seconds since midnight for `HH:MM:SS(.fff)` or `MM:SS(.fff)`
pub(crate) fn parse_clock(field: &str) -> Option<f64> {
    let parts: Vec<&str> = field.trim().split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// A units row has no numeric fields and at least one non-empty one
fn is_units_row(fields: &[String]) -> bool {
    fields.iter().any(|f| !f.is_empty()) && fields.iter().all(|f| parse_value(f, false).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::types::LogFormat;
    use pretty_assertions::assert_eq;

    fn parser(format: LogFormat) -> DelimitedParser {
        DelimitedParser::new(Dialect::for_format(format).unwrap(), 64)
    }

    #[test]
    fn test_parse_generic_csv() {
        let log = parser(LogFormat::Csv)
            .parse("Time,RPM,TPS\n0,1000,10\n1,1500,20\n2,2000,15\n")
            .unwrap();

        assert_eq!(log.time(), &[0.0, 1.0, 2.0]);
        assert_eq!(
            log.channel("RPM").unwrap(),
            &[Some(1000.0), Some(1500.0), Some(2000.0)]
        );
        assert_eq!(log.channel("TPS").unwrap(), &[Some(10.0), Some(20.0), Some(15.0)]);
        assert_eq!(log.channel_names(), &["RPM".to_string(), "TPS".to_string()]);
        assert_eq!(log.meta().sample_rate, Some(1.0));
        assert!(!log.has_channel("Time"));
    }

    #[test]
    fn test_bad_cells_are_missing_and_ragged_rows_skipped() {
        let log = parser(LogFormat::Csv)
            .parse("time,RPM,TPS\n0,1000,abc\n1,1500\n2,,15\n3,2500,30,99\n")
            .unwrap();

        assert_eq!(log.time(), &[0.0, 2.0]);
        assert_eq!(log.channel("RPM").unwrap(), &[Some(1000.0), None]);
        assert_eq!(log.channel("TPS").unwrap(), &[None, Some(15.0)]);
    }

    #[test]
    fn test_units_from_headers() {
        let log = parser(LogFormat::Tsv)
            .parse(
                "Timestamp (s)\tEngine Speed (rpm)\tBoost [psi]\tCoolant Temp\n\
                 0.0\t800\t-10\t85\n",
            )
            .unwrap();

        assert_eq!(log.unit("Engine Speed"), Some("rpm"));
        assert_eq!(log.unit("Boost"), Some("psi"));
        assert_eq!(log.unit("Coolant Temp"), Some("°C"));
        assert_eq!(log.time(), &[0.0]);
    }

    #[test]
    fn test_no_time_column_uses_row_index() {
        let log = parser(LogFormat::Csv).parse("RPM,TPS\n900,1\n950,2\n").unwrap();
        assert_eq!(log.time(), &[0.0, 1.0]);
        assert_eq!(log.channel("RPM").unwrap(), &[Some(900.0), Some(950.0)]);
    }

    #[test]
    fn test_out_of_order_rows_are_dropped() {
        let log = parser(LogFormat::Csv)
            .parse("t,X\n0,1\n2,2\n1,3\n3,4\n")
            .unwrap();
        assert_eq!(log.time(), &[0.0, 2.0, 3.0]);
        assert_eq!(log.channel("X").unwrap(), &[Some(1.0), Some(2.0), Some(4.0)]);
    }

    #[test]
    fn test_empty_file_is_empty_record() {
        let log = parser(LogFormat::Csv).parse("").unwrap();
        assert!(log.is_empty());
        assert!(log.channel_names().is_empty());

        let header_only = parser(LogFormat::Csv).parse("Time,RPM\n").unwrap();
        assert!(header_only.is_empty());
        assert_eq!(header_only.channel("RPM").unwrap().len(), 0);
    }

    #[test]
    fn test_ecumaster_dialect() {
        let sample = "TIME;engine/rpm;sensors/tps1;ignition/angle\n\
                      0.000;1000;10,5;15.0\n\
                      0.020;1050;;15.5\n\
                      0.040;1100;12.0;\n";
        let log = parser(LogFormat::EcuMaster).parse(sample).unwrap();

        assert_eq!(
            log.channel_names(),
            &["rpm".to_string(), "tps1".to_string(), "angle".to_string()]
        );
        assert_eq!(log.time(), &[0.0, 0.02, 0.04]);
        assert_eq!(log.channel("tps1").unwrap(), &[Some(10.5), None, Some(12.0)]);
        assert_eq!(log.channel("angle").unwrap(), &[Some(15.0), Some(15.5), None]);
        assert_eq!(log.unit("rpm"), Some("RPM"));
        assert_eq!(log.unit("tps1"), Some("%"));
        assert_eq!(log.unit("angle"), Some("°"));
    }

    #[test]
    fn test_hp_tuners_header_search() {
        let sample = "HP Tuners VCM Scanner\n\
                      Vehicle: 2017 Chevrolet Silverado 2500HD\n\
                      \n\
                      Offset,Engine RPM (rpm),Rail Pressure (MPa)\n\
                      0.00,700,35.2\n\
                      0.10,720,35.9\n";
        let log = parser(LogFormat::HpTuners).parse(sample).unwrap();

        assert_eq!(log.time(), &[0.0, 0.1]);
        assert_eq!(log.channel("Rail Pressure").unwrap(), &[Some(35.2), Some(35.9)]);
        assert_eq!(log.unit("Rail Pressure"), Some("MPa"));
        let vehicle = log.meta().vehicle.clone().unwrap();
        assert_eq!(vehicle.year, Some(2017));
        assert_eq!(vehicle.make.as_deref(), Some("Chevrolet"));
    }

    #[test]
    fn test_header_not_found() {
        let sample = "EFILive V8 Scan\nno header here\n1,2,3\n";
        let err = parser(LogFormat::EfiLive).parse(sample).unwrap_err();
        assert!(matches!(
            err,
            Error::HeaderNotFound {
                format: LogFormat::EfiLive,
                searched: 3
            }
        ));
    }

    #[test]
    fn test_megalogviewer_units_row() {
        let sample = "\"MS3 Format 0435.08P\"\n\
                      \"Capture Date: Sat Mar 02 10:11:12 2024\"\n\
                      Time\tRPM\tMAP\n\
                      s\trpm\tkPa\n\
                      0.000\t850\t35.1\n\
                      0.050\t860\t35.4\n";
        let log = parser(LogFormat::MegaLogViewer).parse(sample).unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log.unit("RPM"), Some("rpm"));
        assert_eq!(log.unit("MAP"), Some("kPa"));
        assert_eq!(
            log.meta().properties.get("Capture Date").map(String::as_str),
            Some("Sat Mar 02 10:11:12 2024")
        );
    }

    #[test]
    fn test_clock_times_are_relative() {
        let log = parser(LogFormat::CobbAccessport)
            .parse("COBB Tuning Accessport\nTime,Boost (psi)\n14:15:46.000,1.5\n14:15:46.500,2.5\n")
            .unwrap();
        assert_eq!(log.time(), &[0.0, 0.5]);
    }

    #[test]
    fn test_clock_times_cross_midnight() {
        let log = parser(LogFormat::Csv)
            .parse("Time,RPM\n23:59:59.5,800\n00:00:00.0,810\n00:00:00.5,820\n")
            .unwrap();
        assert_eq!(log.time(), &[0.0, 0.5, 1.0]);
        assert_eq!(log.value_at("RPM", 2), Some(820.0));
    }

    #[test]
    fn test_clock_axis_rollover_is_sticky() {
        let mut clock = ClockAxis::default();
        assert_eq!(clock.relative(86_399.0), 0.0);
        assert_eq!(clock.relative(1.0), 2.0);
        assert_eq!(clock.relative(2.0), 3.0);
        // a short step back is out of order, not a new day
        assert_eq!(clock.relative(1.5), 2.5);
        assert_eq!(clock.relative(3.0), 4.0);
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(split_fields("a, b ,c", ','), vec!["a", "b", "c"]);
        assert_eq!(
            split_fields("\"Boost, target\",\"say \"\"hi\"\"\",3", ','),
            vec!["Boost, target", "say \"hi\"", "3"]
        );
        assert_eq!(split_fields("a;b", ','), vec!["a;b"]);
    }

    #[test]
    fn test_split_quoted_fields_keeps_inner_whitespace() {
        assert_eq!(
            split_quoted_fields(" \" x \" , 1.50,\"1.50\",", ','),
            vec![
                (" x ".to_string(), true),
                ("1.50".to_string(), false),
                ("1.50".to_string(), true),
                (String::new(), false),
            ]
        );
        assert_eq!(split_fields("a  b ,\tc", ','), vec!["a  b", "c"]);
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter("Time\tRPM\tTPS"), '\t');
        assert_eq!(sniff_delimiter("TIME;rpm;tps"), ';');
        assert_eq!(sniff_delimiter("Time,RPM"), ',');
        assert_eq!(sniff_delimiter("Time"), '\t');
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(" 12.5 ", false), Some(12.5));
        assert_eq!(parse_value("12,5", true), Some(12.5));
        assert_eq!(parse_value("12,5", false), None);
        assert_eq!(parse_value("NaN", false), None);
        assert_eq!(parse_value("", false), None);
        assert_eq!(parse_value("0", false), Some(0.0));
    }

    #[test]
    fn test_quote_field() {
        assert_eq!(quote_field("plain", ','), "plain");
        assert_eq!(quote_field("a,b", ','), "\"a,b\"");
        assert_eq!(quote_field("say \"hi\"", ','), "\"say \"\"hi\"\"\"");
    }
}
