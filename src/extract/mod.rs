// * Extraction: turn the rendered dashboard page into typed power readings.
// * The page is read through one injected script that returns raw display
// * text; all numeric interpretation happens on this side so a bad parse is
// * an explicit failure, never a defaulted value.

pub mod extractor;
pub mod parse;

pub use extractor::{ExtractError, Extractor};
pub use parse::parse_signed_watts;

use std::fmt;
use std::time::SystemTime;

use crate::config::constants::MAX_PLAUSIBLE_POWER_W;

// * The three tracked metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    PvProduction,
    HouseConsumption,
    GridFlow,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::PvProduction,
        MetricKind::HouseConsumption,
        MetricKind::GridFlow,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            MetricKind::PvProduction => "pv_production",
            MetricKind::HouseConsumption => "house_consumption",
            MetricKind::GridFlow => "grid_flow",
        }
    }

    // * Physical plausibility bounds in watts. Production and consumption
    // * cannot be negative; grid flow is signed (positive = export).
    pub fn plausible(&self, watts: f64) -> bool {
        match self {
            MetricKind::PvProduction | MetricKind::HouseConsumption => {
                (0.0..=MAX_PLAUSIBLE_POWER_W).contains(&watts)
            }
            MetricKind::GridFlow => {
                (-MAX_PLAUSIBLE_POWER_W..=MAX_PLAUSIBLE_POWER_W).contains(&watts)
            }
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

// * A single extraction result. Immutable; consumed once by the publisher.
// * Only constructed from a fully parsed, plausible value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReading {
    pub metric: MetricKind,
    pub value_w: f64,
    pub unit: &'static str,
    pub captured_at: SystemTime,
}

impl MetricReading {
    pub fn new(metric: MetricKind, value_w: f64) -> Result<Self, FailureReason> {
        if !metric.plausible(value_w) {
            return Err(FailureReason::Implausible(value_w));
        }
        Ok(Self {
            metric,
            value_w,
            unit: "W",
            captured_at: SystemTime::now(),
        })
    }
}

// * Why a single metric could not be read this cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    ElementAbsent,
    EmptyText,
    Unparseable(String),
    Implausible(f64),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::ElementAbsent => write!(f, "element absent"),
            FailureReason::EmptyText => write!(f, "element text empty"),
            FailureReason::Unparseable(raw) => write!(f, "text `{raw}` did not parse"),
            FailureReason::Implausible(w) => write!(f, "value {w} W outside plausible range"),
        }
    }
}

// * Per-metric extraction failure. One metric failing never blocks the rest.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionFailure {
    pub metric: MetricKind,
    pub reason: FailureReason,
}

// * Result of one extraction pass: the parsed subset plus explicit failures
// * for the remainder. `readings` and `failures` always cover all three
// * metrics between them.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub readings: Vec<MetricReading>,
    pub failures: Vec<ExtractionFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_ids() {
        assert_eq!(MetricKind::PvProduction.id(), "pv_production");
        assert_eq!(MetricKind::HouseConsumption.id(), "house_consumption");
        assert_eq!(MetricKind::GridFlow.id(), "grid_flow");
    }

    #[test]
    fn test_plausibility_bounds() {
        assert!(MetricKind::PvProduction.plausible(0.0));
        assert!(MetricKind::PvProduction.plausible(3420.0));
        assert!(!MetricKind::PvProduction.plausible(-1.0));
        assert!(!MetricKind::PvProduction.plausible(250_000.0));
        assert!(MetricKind::GridFlow.plausible(-800.0));
        assert!(!MetricKind::GridFlow.plausible(-250_000.0));
    }

    #[test]
    fn test_reading_rejects_implausible_value() {
        let err = MetricReading::new(MetricKind::PvProduction, -50.0).unwrap_err();
        assert_eq!(err, FailureReason::Implausible(-50.0));
    }

    #[test]
    fn test_reading_is_normalized_to_watts() {
        let reading = MetricReading::new(MetricKind::GridFlow, -800.0).unwrap();
        assert_eq!(reading.unit, "W");
        assert_eq!(reading.value_w, -800.0);
    }
}
