//! Channel name and unit utilities.
//!
//! Vendor exports carry units in three ways: as a suffix on the column name
//! (`MAP (kPa)`, `Boost [psi]`), as a separate units row, or not at all. This
//! module handles the first and the last case; units rows are handled by the
//! dialect parsers.

use regex::Regex;
use std::sync::LazyLock;

static NAME_UNIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<name>.*?\S)\s*(?:\((?<paren>[^()]*)\)|\[(?<bracket>[^\[\]]*)\])$")
        .expect("name/unit regex is valid")
});

/// Split a header such as `Engine Speed (rpm)` into name and unit.
///
/// Headers without a trailing parenthesised or bracketed group are returned
/// unchanged with no unit.
pub fn split_name_unit(header: &str) -> (String, Option<String>) {
    let header = header.trim();
    match NAME_UNIT_REGEX.captures(header) {
        Some(caps) => {
            let unit = caps
                .name("paren")
                .or_else(|| caps.name("bracket"))
                .map(|m| m.as_str().trim().to_string())
                .filter(|u| !u.is_empty());
            (caps["name"].to_string(), unit)
        }
        None => (header.to_string(), None),
    }
}

/// Whether a column name denotes the time axis (`time`, `timestamp` or `t`)
pub fn is_time_column(name: &str) -> bool {
    let (base, _) = split_name_unit(name);
    matches!(
        base.to_ascii_lowercase().as_str(),
        "time" | "timestamp" | "t"
    )
}

/// Infer a display unit from a channel name or hierarchical path
/// (`engine/rpm`). Returns an empty string when nothing matches.
pub fn infer_unit(path: &str) -> &'static str {
    let path_lower = path.to_lowercase();
    let name_lower = path_lower
        .rsplit('/')
        .next()
        .unwrap_or(&path_lower)
        .to_string();

    if path_lower.contains("temp") {
        return "°C";
    }

    if path_lower.contains("pressure")
        || name_lower == "map"
        || path_lower.contains("/map")
        || path_lower.contains("baro")
        || path_lower.contains("boost")
    {
        return "kPa";
    }

    // Checked before the generic speed rule so "engine speed" stays RPM
    if name_lower == "rpm" || name_lower.ends_with("rpm") || name_lower.contains("engine speed")
    {
        return "RPM";
    }

    if name_lower.contains("tps")
        || name_lower.contains("throttle")
        || name_lower.contains("duty")
        || name_lower.contains("percent")
        || name_lower.contains("correction")
    {
        return "%";
    }

    if name_lower == "angle"
        || name_lower.contains("timing")
        || ((path_lower.contains("ignition")
            || path_lower.contains("vvt")
            || path_lower.contains("cam"))
            && (name_lower.contains("angle") || name_lower.contains("position")))
    {
        return "°";
    }

    if name_lower.contains("volt") || name_lower == "battery" || name_lower.contains("vbat") {
        return "V";
    }

    if name_lower.contains("lambda") {
        return "λ";
    }

    if name_lower.contains("afr") {
        return "AFR";
    }

    if name_lower.contains("speed") {
        return "km/h";
    }

    if name_lower.contains("torque") {
        return if path_lower.contains("reduction") {
            "%"
        } else {
            "Nm"
        };
    }

    if name_lower.contains("timer") {
        return "s";
    }

    if name_lower.contains("flow") {
        return "cc/min";
    }

    ""
}
