// * Numeric parsing for the on-page power figures.
// *
// * The dashboard renders values like "3.42 kW", "812 W" or "−0,8 kW
// * (importing)" depending on locale and flow direction. Everything here is
// * pure: raw display text in, watts out, explicit failure otherwise.

use lazy_static::lazy_static;
use regex::Regex;

use crate::extract::FailureReason;

lazy_static! {
    // * Optional sign (ASCII or U+2212), decimal point or comma, optional unit.
    // * A missing unit is treated as watts, matching the dashboard's behavior
    // * for small values.
    static ref POWER_RE: Regex =
        Regex::new(r"(?i)([-−])?\s*(\d+(?:[.,]\d+)?)\s*(kW|W)?").expect("power regex");
}

// * Side-band direction labels as displayed next to the grid figure.
const EXPORT_LABELS: &[&str] = &["feeding in", "fed into", "einspeis", "export"];
const IMPORT_LABELS: &[&str] = &["importing", "consuming", "bezug", "bezogen", "import"];

// * Which way power is flowing at the grid connection point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Export,
    Import,
}

// * Parses a displayed power figure into watts (unsigned magnitude plus the
// * sign carried by the text itself).
pub fn parse_watts(text: &str) -> Result<f64, FailureReason> {
    let cleaned = text.replace('\u{a0}', " ");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return Err(FailureReason::EmptyText);
    }

    let caps = POWER_RE
        .captures(trimmed)
        .ok_or_else(|| FailureReason::Unparseable(trimmed.to_string()))?;

    let number = caps
        .get(2)
        .ok_or_else(|| FailureReason::Unparseable(trimmed.to_string()))?
        .as_str()
        .replace(',', ".");
    let value: f64 = number
        .parse()
        .map_err(|_| FailureReason::Unparseable(trimmed.to_string()))?;

    let scaled = match caps.get(3).map(|u| u.as_str().to_lowercase()) {
        Some(unit) if unit == "kw" => value * 1000.0,
        _ => value,
    };

    let signed = if caps.get(1).is_some() { -scaled } else { scaled };
    Ok(signed.round())
}

// * Parses a grid-flow figure, resolving the sign contract:
// * positive = export, negative = import. A displayed minus or an
// * import-side label each force the negative sign; both together stay
// * negative (no double negation). The label may arrive separately from the
// * figure or be embedded in its text.
pub fn parse_signed_watts(text: &str, side_label: Option<&str>) -> Result<f64, FailureReason> {
    let magnitude = parse_watts(text)?;

    let direction = side_label
        .and_then(direction_of)
        .or_else(|| direction_of(text));

    let value = match direction {
        Some(FlowDirection::Import) => -magnitude.abs(),
        Some(FlowDirection::Export) => magnitude.abs(),
        // * No label anywhere: trust the displayed sign.
        None => magnitude,
    };
    Ok(value)
}

// * Maps a side-band label to a flow direction, EN and DE phrasings.
pub fn direction_of(label: &str) -> Option<FlowDirection> {
    let lower = label.to_lowercase();
    if IMPORT_LABELS.iter().any(|l| lower.contains(l)) {
        return Some(FlowDirection::Import);
    }
    if EXPORT_LABELS.iter().any(|l| lower.contains(l)) {
        return Some(FlowDirection::Export);
    }
    None
}
