//! @ai:module:intent Count static-analysis alerts from Semgrep or SonarQube JSON
//! @ai:module:layer application
//! @ai:module:public_api JsonAlertsParser
//! @ai:module:stateless true

use crate::error::ParseError;
use crate::metrics::Severity;
use crate::normalize::{OutputParser, ParseInput, ParseOutcome};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Semgrep `results[]` or SonarQube `issues[]`, one AlertCount per (module, severity)
pub struct JsonAlertsParser;

#[derive(Debug, Deserialize)]
struct AlertDocument {
    #[serde(default)]
    results: Option<Vec<Value>>,
    #[serde(default)]
    issues: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct SemgrepResult {
    path: String,
    #[serde(default)]
    extra: SemgrepExtra,
}

#[derive(Debug, Default, Deserialize)]
struct SemgrepExtra {
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SonarIssue {
    component: String,
    #[serde(default)]
    severity: Option<String>,
}

impl SonarIssue {
    /// `project:src/auth.py` names module `src/auth.py`
    fn module(&self) -> &str {
        self.component
            .split_once(':')
            .map(|(_, path)| path)
            .unwrap_or(&self.component)
    }
}

/// @ai:intent Absent or blank severity is unspecified; an unrecognised label is malformed
/// @ai:effects pure
fn map_severity(
    label: Option<&str>,
    mapping: fn(&str) -> Option<Severity>,
) -> Result<Option<Severity>, String> {
    match label.map(str::trim) {
        None | Some("") => Ok(None),
        Some(label) => mapping(label)
            .map(Some)
            .ok_or_else(|| format!("unknown severity '{label}'")),
    }
}

impl OutputParser for JsonAlertsParser {
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();

        if input.raw.trim().is_empty() {
            return outcome;
        }

        let document: AlertDocument = match serde_json::from_str(input.raw) {
            Ok(doc) => doc,
            Err(e) => {
                outcome.skip(ParseError::new(e.line(), format!("invalid alert JSON: {e}")));
                return outcome;
            }
        };

        let mut counts: BTreeMap<(String, Option<Severity>), usize> = BTreeMap::new();

        match (document.results, document.issues) {
            (Some(results), _) => {
                for (idx, entry) in results.into_iter().enumerate() {
                    match serde_json::from_value::<SemgrepResult>(entry) {
                        Ok(result) => {
                            match map_severity(result.extra.severity.as_deref(), Severity::from_semgrep) {
                                Ok(severity) => *counts.entry((result.path, severity)).or_default() += 1,
                                Err(reason) => {
                                    outcome.skip(ParseError::new(idx + 1, format!("results[{idx}]: {reason}")))
                                }
                            }
                        }
                        Err(e) => outcome.skip(ParseError::new(idx + 1, format!("results[{idx}]: {e}"))),
                    }
                }
            }
            (None, Some(issues)) => {
                for (idx, entry) in issues.into_iter().enumerate() {
                    match serde_json::from_value::<SonarIssue>(entry) {
                        Ok(issue) => match map_severity(issue.severity.as_deref(), Severity::from_sonar) {
                            Ok(severity) => {
                                *counts.entry((issue.module().to_string(), severity)).or_default() += 1
                            }
                            Err(reason) => {
                                outcome.skip(ParseError::new(idx + 1, format!("issues[{idx}]: {reason}")))
                            }
                        },
                        Err(e) => outcome.skip(ParseError::new(idx + 1, format!("issues[{idx}]: {e}"))),
                    }
                }
            }
            (None, None) => {
                outcome.skip(ParseError::new(1, "document has neither results[] nor issues[]"));
            }
        }

        outcome.records = counts
            .into_iter()
            .map(|((module, severity), count)| {
                input
                    .record(module, "AlertCount", count as f64)
                    .with_severity(severity)
            })
            .collect();

        outcome
    }

    fn format(&self) -> &'static str {
        "json_alerts"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summarize(outcome: &ParseOutcome) -> Vec<(String, Option<Severity>, f64)> {
        outcome
            .records
            .iter()
            .map(|r| (r.target.clone(), r.severity, r.value))
            .collect()
    }

    #[test]
    fn test_semgrep_results() {
        let raw = r#"{
            "results": [
                {"path": "app/auth.py", "extra": {"severity": "ERROR"}},
                {"path": "app/auth.py", "extra": {"severity": "ERROR"}},
                {"path": "app/auth.py", "extra": {"severity": "WARNING"}},
                {"path": "app/db.py", "extra": {}},
                {"check_id": "no-path"}
            ],
            "errors": []
        }"#;

        let outcome = JsonAlertsParser.parse(&ParseInput::new("semgrep", "t1", raw));

        assert_eq!(
            summarize(&outcome),
            vec![
                ("app/auth.py".to_string(), Some(Severity::Medium), 1.0),
                ("app/auth.py".to_string(), Some(Severity::High), 2.0),
                ("app/db.py".to_string(), None, 1.0),
            ]
        );
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.records.iter().all(|r| r.metric_name == "AlertCount"));
    }

    #[test]
    fn test_sonar_issues() {
        let raw = r#"{"issues": [
            {"component": "proj:src/login.js", "severity": "BLOCKER"},
            {"component": "proj:src/login.js", "severity": "MINOR"}
        ]}"#;

        let outcome = JsonAlertsParser.parse(&ParseInput::new("sonar", "t1", raw));

        assert_eq!(
            summarize(&outcome),
            vec![
                ("src/login.js".to_string(), Some(Severity::Low), 1.0),
                ("src/login.js".to_string(), Some(Severity::Critical), 1.0),
            ]
        );
    }

    #[test]
    fn test_unknown_severity_label_is_skipped() {
        let raw = r#"{"issues": [
            {"component": "proj:src/a.js", "severity": "SEVERE"},
            {"component": "proj:src/a.js", "severity": "MAJOR"},
            {"component": "proj:src/a.js"}
        ]}"#;

        let outcome = JsonAlertsParser.parse(&ParseInput::new("sonar", "t1", raw));

        assert_eq!(
            summarize(&outcome),
            vec![
                ("src/a.js".to_string(), None, 1.0),
                ("src/a.js".to_string(), Some(Severity::Medium), 1.0),
            ]
        );
        assert_eq!(outcome.skipped, 1);
        assert!(outcome.errors[0].reason.contains("unknown severity 'SEVERE'"));

        let raw = r#"{"results": [{"path": "x.py", "extra": {"severity": "FATAL"}}]}"#;
        let outcome = JsonAlertsParser.parse(&ParseInput::new("semgrep", "t1", raw));
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_invalid_json_is_counted_not_raised() {
        let outcome = JsonAlertsParser.parse(&ParseInput::new("semgrep", "t1", "{ nope"));
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped, 1);

        let outcome = JsonAlertsParser.parse(&ParseInput::new("semgrep", "t1", "{\"other\": 1}"));
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_no_alerts_no_records() {
        let outcome = JsonAlertsParser.parse(&ParseInput::new("semgrep", "t1", "{\"results\": []}"));
        assert_eq!(outcome, ParseOutcome::default());
    }
}
