//! @ai:module:intent Normalize request-timing logs from denial-of-service replays
//! @ai:module:layer application
//! @ai:module:public_api DosLogParser
//! @ai:module:stateless true

use crate::error::ParseError;
use crate::normalize::{parse_value, OutputParser, ParseInput, ParseOutcome};
use regex::Regex;
use std::collections::HashMap;

/// `key=value` lines; `duration_ms` required, `status` and `target` optional.
/// Values may be double-quoted to carry spaces.
pub struct DosLogParser {
    field_regex: Regex,
}

impl DosLogParser {
    /// @ai:intent Create a parser with its field pattern compiled once
    /// @ai:effects pure
    pub fn new() -> Self {
        Self {
            field_regex: Regex::new(r#"(\w+)=(?:"([^"]*)"|(\S+))"#).expect("static field pattern"),
        }
    }

    /// @ai:effects pure
    fn fields<'a>(&self, line: &'a str) -> HashMap<&'a str, &'a str> {
        self.field_regex
            .captures_iter(line)
            .filter_map(|cap| {
                let key = cap.get(1)?.as_str();
                let value = cap.get(2).or_else(|| cap.get(3))?.as_str();
                Some((key, value))
            })
            .collect()
    }
}

impl Default for DosLogParser {
    fn default() -> Self {
        Self::new()
    }
}

/// @ai:intent Whether a status value means the request timed out
/// @ai:effects pure
fn is_timeout(status: &str) -> bool {
    status.eq_ignore_ascii_case("timeout") || status == "408" || status == "504"
}

impl OutputParser for DosLogParser {
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut requests = 0usize;
        let mut timeouts = 0usize;

        for (idx, line) in input.raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields = self.fields(line);

            let Some(raw_duration) = fields.get("duration_ms") else {
                outcome.skip(ParseError::new(idx + 1, "missing duration_ms"));
                continue;
            };

            let duration = match parse_value(raw_duration) {
                Some(d) if d >= 0.0 => d,
                _ => {
                    outcome.skip(ParseError::new(
                        idx + 1,
                        format!("invalid duration_ms '{raw_duration}'"),
                    ));
                    continue;
                }
            };

            let target = fields
                .get("target")
                .or_else(|| fields.get("endpoint"))
                .copied()
                .unwrap_or(input.artifact_id);

            requests += 1;
            if fields.get("status").is_some_and(|s| is_timeout(s)) {
                timeouts += 1;
            }

            outcome.records.push(input.record(target, "DurationMs", duration));
        }

        if requests > 0 {
            outcome
                .records
                .push(input.record(input.artifact_id, "Requests", requests as f64));
            outcome
                .records
                .push(input.record(input.artifact_id, "Timeouts", timeouts as f64));
        }

        outcome
    }

    fn format(&self) -> &'static str {
        "dos_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_lines() {
        let raw = "\
# replay of t1
request=1 duration_ms=120 status=200
request=2 duration_ms=5000 status=timeout target=/login
request=3 status=200
request=4 duration_ms=fast
request=5 duration_ms=80 status=504
";

        let outcome = DosLogParser::new().parse(&ParseInput::new("dos", "t1", raw));

        let durations: Vec<(&str, f64)> = outcome
            .records
            .iter()
            .filter(|r| r.metric_name == "DurationMs")
            .map(|r| (r.target.as_str(), r.value))
            .collect();
        assert_eq!(durations, vec![("t1", 120.0), ("/login", 5000.0), ("t1", 80.0)]);

        let timeouts = outcome.records.iter().find(|r| r.metric_name == "Timeouts");
        assert_eq!(timeouts.map(|r| r.value), Some(2.0));
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.errors[0].line, 4);
    }

    #[test]
    fn test_non_finite_durations_are_skipped() {
        let raw = "duration_ms=inf\nduration_ms=NaN\nduration_ms=12\n";
        let outcome = DosLogParser::new().parse(&ParseInput::new("dos", "t1", raw));

        assert_eq!(outcome.skipped, 2);
        assert!(outcome.records.iter().all(|r| r.value.is_finite()));
        let requests = outcome.records.iter().find(|r| r.metric_name == "Requests");
        assert_eq!(requests.map(|r| r.value), Some(1.0));
    }

    #[test]
    fn test_quoted_target_keeps_spaces() {
        let raw = r#"duration_ms=42 target="/search?q=a b" status=200"#;
        let outcome = DosLogParser::new().parse(&ParseInput::new("dos", "t3", raw));

        assert_eq!(outcome.records[0].target, "/search?q=a b");
        assert_eq!(outcome.records[0].value, 42.0);
    }

    #[test]
    fn test_empty_log_has_no_records() {
        let outcome = DosLogParser::new().parse(&ParseInput::new("dos", "t1", "\n\n"));
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped, 0);
    }
}
