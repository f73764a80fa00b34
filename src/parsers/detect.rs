//! Log format detection.
//!
//! Detection is a pure function of the file name and its first bytes:
//! extension first, then vendor markers, then delimiter sniffing.

use std::path::Path;

use super::types::LogFormat;
use super::vendors::{Marker, VENDOR_MARKERS};

/// Formats identified by extension alone
pub(crate) fn from_extension(path: &Path) -> Option<LogFormat> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "json" => Some(LogFormat::Json),
        "msl" => Some(LogFormat::MegaLogViewer),
        _ => None,
    }
}

/// Classify decoded text by scanning its first `sniff_lines` lines
pub(crate) fn detect_content(text: &str, sniff_lines: usize) -> LogFormat {
    let lines: Vec<String> = text
        .lines()
        .take(sniff_lines)
        .map(str::to_lowercase)
        .collect();
    let Some(first) = lines.iter().find(|l| !l.trim().is_empty()) else {
        return LogFormat::Unknown;
    };

    for (format, markers) in VENDOR_MARKERS {
        let hit = markers.iter().any(|marker| match marker {
            Marker::Contains(needle) => lines.iter().any(|l| l.contains(needle)),
            Marker::FirstLinePrefix(prefix) => first.trim_start().starts_with(prefix),
        });
        if hit {
            tracing::debug!("Detected {} log by content marker", format);
            return *format;
        }
    }

    let head = first.trim_start();
    if head.starts_with('{') || head.starts_with('[') {
        return LogFormat::Json;
    }

    if first.contains('\t') {
        LogFormat::Tsv
    } else if first.contains(',') {
        LogFormat::Csv
    } else {
        LogFormat::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_wins() {
        assert_eq!(from_extension(Path::new("a/b/log.JSON")), Some(LogFormat::Json));
        assert_eq!(from_extension(Path::new("run.msl")), Some(LogFormat::MegaLogViewer));
        assert_eq!(from_extension(Path::new("run.csv")), None);
        assert_eq!(from_extension(Path::new("noext")), None);
    }

    #[test]
    fn test_vendor_markers() {
        let haltech = "%DataLog%\nDataLogVersion : 1.1\nChannel : RPM\n";
        assert_eq!(detect_content(haltech, 10), LogFormat::Haltech);

        let ecumaster = "TIME;engine/rpm;sensors/clt\n0.0;800;80\n";
        assert_eq!(detect_content(ecumaster, 10), LogFormat::EcuMaster);

        let hpt = "HP Tuners VCM Scanner\nTime,RPM\n0,800\n";
        assert_eq!(detect_content(hpt, 10), LogFormat::HpTuners);

        let efilive = "EFILive V8 Scan\nTime,RPM\n";
        assert_eq!(detect_content(efilive, 10), LogFormat::EfiLive);

        let cobb = "Time (sec),RPM,Accessport Version\n";
        assert_eq!(detect_content(cobb, 10), LogFormat::CobbAccessport);

        let mlv = "\"MS3 Format 0435.03\"\nTime\tRPM\n";
        assert_eq!(detect_content(mlv, 10), LogFormat::MegaLogViewer);
    }

    #[test]
    fn test_marker_priority() {
        // Haltech outranks every later vendor
        let text = "Haltech export via HP Tuners\nTime,RPM\n";
        assert_eq!(detect_content(text, 10), LogFormat::Haltech);
    }

    #[test]
    fn test_markers_beyond_sniff_window_are_ignored() {
        let mut text = "Time,RPM\n".to_string();
        for i in 0..20 {
            text.push_str(&format!("{},{}\n", i, 800 + i));
        }
        text.push_str("# exported by EFILive\n");
        assert_eq!(detect_content(&text, 10), LogFormat::Csv);
    }

    #[test]
    fn test_delimiter_sniffing() {
        assert_eq!(detect_content("Time\tRPM,x\n0\t1\n", 10), LogFormat::Tsv);
        assert_eq!(detect_content("Time,RPM\n0,1\n", 10), LogFormat::Csv);
        assert_eq!(detect_content("just some words\n", 10), LogFormat::Unknown);
        assert_eq!(detect_content("", 10), LogFormat::Unknown);
        assert_eq!(detect_content("\n\n", 10), LogFormat::Unknown);
    }

    #[test]
    fn test_json_content() {
        assert_eq!(detect_content("{\"time\": [0]}", 10), LogFormat::Json);
        assert_eq!(detect_content("  [ {\"t\": 0} ]", 10), LogFormat::Json);
    }

    #[test]
    fn test_deterministic() {
        let text = "EMU PRO export\nTIME;RPM\n";
        let first = detect_content(text, 10);
        for _ in 0..5 {
            assert_eq!(detect_content(text, 10), first);
        }
    }
}
