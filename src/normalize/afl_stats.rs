//! @ai:module:intent Normalize AFL `fuzzer_stats` files
//! @ai:module:layer application
//! @ai:module:public_api AflStatsParser
//! @ai:module:stateless true

use crate::error::ParseError;
use crate::normalize::{
    crashes_per_100, parse_value, ExecutionCountSource, OutputParser, ParseInput, ParseOutcome,
};
use std::collections::HashMap;

/// `key : value` lines as written by afl-fuzz
pub struct AflStatsParser {
    executions: ExecutionCountSource,
}

impl AflStatsParser {
    pub fn new(executions: ExecutionCountSource) -> Self {
        Self { executions }
    }
}

/// @ai:intent First numeric value among several key spellings (AFL++ renamed unique_* to saved_*)
/// @ai:effects pure
fn lookup(stats: &HashMap<&str, (usize, &str)>, keys: &[&str]) -> Option<Result<f64, ParseError>> {
    keys.iter().find_map(|key| {
        stats.get(key).map(|(line, raw)| {
            parse_value(raw)
                .ok_or_else(|| ParseError::new(*line, format!("{key} is not a finite number: '{raw}'")))
        })
    })
}

impl OutputParser for AflStatsParser {
    fn parse(&self, input: &ParseInput<'_>) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let mut stats: HashMap<&str, (usize, &str)> = HashMap::new();

        for (idx, line) in input.raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match line.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    stats.insert(key.trim(), (idx + 1, value.trim()));
                }
                _ => outcome.skip(ParseError::new(idx + 1, "expected 'key : value'")),
            }
        }

        let metric = |name: &str, keys: &[&str], outcome: &mut ParseOutcome| -> Option<f64> {
            match lookup(&stats, keys)? {
                Ok(value) => {
                    outcome.records.push(input.record(input.artifact_id, name, value));
                    Some(value)
                }
                Err(e) => {
                    outcome.skip(e);
                    None
                }
            }
        };

        let reported = metric("Executions", &["execs_done"], &mut outcome);
        let crashes = metric("Crashes", &["saved_crashes", "unique_crashes"], &mut outcome);
        metric("Hangs", &["saved_hangs", "unique_hangs"], &mut outcome);
        metric("ExecRate", &["execs_per_sec"], &mut outcome);

        let executions = match self.executions {
            ExecutionCountSource::Reported => reported,
            ExecutionCountSource::Fixed(n) => Some(n as f64),
        };

        if let Some(rate) = crashes
            .zip(executions)
            .and_then(|(c, e)| crashes_per_100(c, e))
        {
            outcome
                .records
                .push(input.record(input.artifact_id, "CrashesPer100", rate));
        }

        outcome
    }

    fn format(&self) -> &'static str {
        "afl_stats"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "\
start_time        : 1700000000
execs_done        : 2000
execs_per_sec     : 33.50
saved_crashes     : 3
saved_hangs       : 1
afl_banner        : target_harness
";

    fn value(outcome: &ParseOutcome, metric: &str) -> Option<f64> {
        outcome
            .records
            .iter()
            .find(|r| r.metric_name == metric)
            .map(|r| r.value)
    }

    #[test]
    fn test_reported_execution_count() {
        let outcome = AflStatsParser::new(ExecutionCountSource::Reported)
            .parse(&ParseInput::new("afl", "t1", STATS));

        assert_eq!(value(&outcome, "Executions"), Some(2000.0));
        assert_eq!(value(&outcome, "Crashes"), Some(3.0));
        assert_eq!(value(&outcome, "Hangs"), Some(1.0));
        assert_eq!(value(&outcome, "CrashesPer100"), Some(0.15));
        assert!(outcome.records.iter().all(|r| r.target == "t1"));
        assert_eq!(outcome.skipped, 0);
    }

    #[test]
    fn test_fixed_execution_count() {
        let outcome = AflStatsParser::new(ExecutionCountSource::Fixed(300))
            .parse(&ParseInput::new("afl", "t1", STATS));

        assert_eq!(value(&outcome, "CrashesPer100"), Some(1.0));
    }

    #[test]
    fn test_legacy_keys_and_zero_executions() {
        let raw = "execs_done : 0\nunique_crashes : 4\ngarbage line\n";
        let outcome = AflStatsParser::new(ExecutionCountSource::Reported)
            .parse(&ParseInput::new("afl", "t1", raw));

        assert_eq!(value(&outcome, "Crashes"), Some(4.0));
        assert_eq!(value(&outcome, "CrashesPer100"), None);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_infinite_execution_count_is_skipped() {
        let raw = "execs_done : inf\nsaved_crashes : 2\nsaved_hangs : NaN\n";
        let outcome = AflStatsParser::new(ExecutionCountSource::Reported)
            .parse(&ParseInput::new("afl", "t1", raw));

        assert_eq!(value(&outcome, "Executions"), None);
        assert_eq!(value(&outcome, "Hangs"), None);
        assert_eq!(value(&outcome, "CrashesPer100"), None);
        assert_eq!(value(&outcome, "Crashes"), Some(2.0));
        assert_eq!(outcome.skipped, 2);
        assert!(outcome.records.iter().all(|r| r.value.is_finite()));
    }
}
