// * Reads the three power figures from the loaded dashboard page.
// *
// * One injected script does all page-side work: it matches EN/DE phrasings
// * in the page text first, then falls back to the configured XPaths. It
// * returns raw display text only; interpretation stays on this side. The
// * pass is idempotent and has no side effect beyond reading page state.

use chromiumoxide::page::Page;
use serde::Deserialize;
use thiserror::Error;

use crate::config::SelectorConfig;
use crate::extract::parse::{parse_signed_watts, parse_watts};
use crate::extract::{
    ExtractionFailure, ExtractionOutcome, FailureReason, MetricKind, MetricReading,
};

// * Page-side extraction routine. A null per metric means the element was
// * absent everywhere; an empty string means it rendered without text yet.
const EXTRACT_JS: &str = r#"
(() => {
  const XPATHS = {
    production: "__XP_PROD__",
    consumption: "__XP_CONS__",
    grid: "__XP_GRID__"
  };
  const result = { production: null, consumption: null, grid: null, grid_label: null };
  const body = document.body ? document.body.innerText : "";
  const text = (body || "").normalize("NFKD");

  const prod = /(\d+(?:[.,]\d+)?\s*(?:kW|W))\s*(?:of solar energy is produced|produced|production|erzeugt|produktion)/i.exec(text);
  if (prod) result.production = prod[1];

  const cons = /(?:consumption|hausverbrauch|verbrauch)[^0-9]*?(\d+(?:[.,]\d+)?\s*(?:kW|W))/i.exec(text);
  if (cons) result.consumption = cons[1];

  const feed = /(\d+(?:[.,]\d+)?\s*(?:kW|W))\s*(?:are being fed into the grid|fed into the grid|einspeisung|eingespeist)/i.exec(text);
  const draw = /(\d+(?:[.,]\d+)?\s*(?:kW|W))\s*(?:are being drawn from the grid|drawn from the grid|obtained from the grid|netzbezug|bezogen)/i.exec(text);
  if (feed) { result.grid = feed[1]; result.grid_label = "feeding in"; }
  else if (draw) { result.grid = draw[1]; result.grid_label = "importing"; }

  const byXPath = (xp) => {
    try {
      const node = document.evaluate(
        xp, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null
      ).singleNodeValue;
      if (!node) return null;
      return (node.textContent || "").trim();
    } catch (e) {
      return null;
    }
  };

  if (result.production === null) result.production = byXPath(XPATHS.production);
  if (result.consumption === null) result.consumption = byXPath(XPATHS.consumption);
  if (result.grid === null) result.grid = byXPath(XPATHS.grid);

  return JSON.stringify(result);
})()
"#;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("page evaluation failed: {0}")]
    PageUnavailable(String),

    #[error("extraction payload malformed: {0}")]
    Payload(String),
}

// * Raw page-side result, straight out of the injected script.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RawExtraction {
    pub production: Option<String>,
    pub consumption: Option<String>,
    pub grid: Option<String>,
    pub grid_label: Option<String>,
}

pub struct Extractor {
    script: String,
}

impl Extractor {
    pub fn new(selectors: &SelectorConfig) -> Self {
        // * XPaths are spliced in JSON-encoded so arbitrary override strings
        // * cannot break out of the script literal.
        let script = EXTRACT_JS
            .replace("\"__XP_PROD__\"", &json_literal(&selectors.xpath_production))
            .replace("\"__XP_CONS__\"", &json_literal(&selectors.xpath_consumption))
            .replace("\"__XP_GRID__\"", &json_literal(&selectors.xpath_grid));
        Self { script }
    }

    // * Runs one extraction pass against the currently loaded page.
    // * Errors only when the page itself cannot be evaluated; a metric that
    // * is merely missing or unreadable becomes an ExtractionFailure entry.
    pub async fn extract(&self, page: &Page) -> Result<ExtractionOutcome, ExtractError> {
        let evaluated = page
            .evaluate(self.script.as_str())
            .await
            .map_err(|e| ExtractError::PageUnavailable(e.to_string()))?;

        let payload: String = evaluated
            .into_value()
            .map_err(|e| ExtractError::Payload(e.to_string()))?;

        let raw: RawExtraction =
            serde_json::from_str(&payload).map_err(|e| ExtractError::Payload(e.to_string()))?;

        Ok(self.interpret(raw))
    }

    // * Turns raw display text into readings, one verdict per metric.
    pub(crate) fn interpret(&self, raw: RawExtraction) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        let unsigned = [
            (MetricKind::PvProduction, raw.production),
            (MetricKind::HouseConsumption, raw.consumption),
        ];
        for (metric, text) in unsigned {
            match text.as_deref().map(parse_watts) {
                None => outcome.failures.push(ExtractionFailure {
                    metric,
                    reason: FailureReason::ElementAbsent,
                }),
                Some(Err(reason)) => outcome.failures.push(ExtractionFailure { metric, reason }),
                Some(Ok(watts)) => record(&mut outcome, metric, watts),
            }
        }

        match raw.grid.as_deref() {
            None => outcome.failures.push(ExtractionFailure {
                metric: MetricKind::GridFlow,
                reason: FailureReason::ElementAbsent,
            }),
            Some(text) => match parse_signed_watts(text, raw.grid_label.as_deref()) {
                Err(reason) => outcome.failures.push(ExtractionFailure {
                    metric: MetricKind::GridFlow,
                    reason,
                }),
                Ok(watts) => record(&mut outcome, MetricKind::GridFlow, watts),
            },
        }

        outcome
    }
}

fn record(outcome: &mut ExtractionOutcome, metric: MetricKind, watts: f64) {
    match MetricReading::new(metric, watts) {
        Ok(reading) => outcome.readings.push(reading),
        Err(reason) => outcome.failures.push(ExtractionFailure { metric, reason }),
    }
}

fn json_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SelectorConfig;

    fn extractor() -> Extractor {
        Extractor::new(&SelectorConfig::default())
    }

    fn raw(
        production: Option<&str>,
        consumption: Option<&str>,
        grid: Option<&str>,
        grid_label: Option<&str>,
    ) -> RawExtraction {
        RawExtraction {
            production: production.map(String::from),
            consumption: consumption.map(String::from),
            grid: grid.map(String::from),
            grid_label: grid_label.map(String::from),
        }
    }

    #[test]
    fn test_full_page_yields_three_readings() {
        let outcome = extractor().interpret(raw(
            Some("3.42 kW"),
            Some("812 W"),
            Some("2.1 kW"),
            Some("feeding in"),
        ));

        assert_eq!(outcome.readings.len(), 3);
        assert!(outcome.failures.is_empty());

        let production = &outcome.readings[0];
        assert_eq!(production.metric, MetricKind::PvProduction);
        assert_eq!(production.value_w, 3420.0);
        assert_eq!(production.unit, "W");
    }

    #[test]
    fn test_missing_metric_fails_alone() {
        let outcome = extractor().interpret(raw(
            Some("3.42 kW"),
            None,
            Some("0.5 kW"),
            Some("feeding in"),
        ));

        assert_eq!(outcome.readings.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].metric, MetricKind::HouseConsumption);
        assert_eq!(outcome.failures[0].reason, FailureReason::ElementAbsent);
    }

    #[test]
    fn test_importing_grid_flow_is_negative() {
        let outcome = extractor().interpret(raw(
            None,
            None,
            Some("−0.8 kW (importing)"),
            None,
        ));

        let grid = outcome
            .readings
            .iter()
            .find(|r| r.metric == MetricKind::GridFlow)
            .unwrap();
        assert_eq!(grid.value_w, -800.0);
    }

    #[test]
    fn test_empty_text_never_defaults_to_zero() {
        let outcome = extractor().interpret(raw(Some(""), Some("  "), None, None));

        assert!(outcome.readings.is_empty());
        assert_eq!(outcome.failures.len(), 3);
        assert!(outcome
            .failures
            .iter()
            .all(|f| matches!(f.reason, FailureReason::EmptyText | FailureReason::ElementAbsent)));
    }

    #[test]
    fn test_implausible_value_is_flagged_not_published() {
        let outcome = extractor().interpret(raw(Some("999999 kW"), None, None, None));

        assert!(outcome.readings.is_empty());
        assert!(matches!(
            outcome.failures[0].reason,
            FailureReason::Implausible(_)
        ));
    }

    #[test]
    fn test_interpretation_is_idempotent() {
        let ex = extractor();
        let a = ex.interpret(raw(Some("3.42 kW"), Some("812 W"), Some("1 kW"), None));
        let b = ex.interpret(raw(Some("3.42 kW"), Some("812 W"), Some("1 kW"), None));
        assert_eq!(
            a.readings.iter().map(|r| r.value_w).collect::<Vec<_>>(),
            b.readings.iter().map(|r| r.value_w).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_xpath_overrides_are_spliced_escaped() {
        let selectors = SelectorConfig {
            xpath_production: "//*[@id=\"power\"]".to_string(),
            ..SelectorConfig::default()
        };
        let ex = Extractor::new(&selectors);
        assert!(ex.script.contains(r#""//*[@id=\"power\"]""#));
        assert!(!ex.script.contains("__XP_PROD__"));
    }
}
