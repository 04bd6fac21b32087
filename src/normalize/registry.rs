//! @ai:module:intent Route each invocation to its tool's parser
//! @ai:module:layer application
//! @ai:module:public_api ParserRegistry, NormalizeStats
//! @ai:module:stateless true

use crate::error::ParseError;
use crate::normalize::{OutputParser, ParseInput, ParseOutcome};
use crate::tools::{ToolInvocation, ToolSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// @ai:intent tool name -> parser
#[derive(Default)]
pub struct ParserRegistry {
    parsers: HashMap<String, Box<dyn OutputParser>>,
}

/// @ai:intent Per-tool parse counters for the run summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub invocations: usize,
    pub records: usize,
    pub skipped: usize,
    /// Invocations not parsed because the tool run failed
    pub failed_invocations: usize,
}

impl ParserRegistry {
    /// @ai:intent Registry built from each configured tool's parser kind
    /// @ai:effects pure
    pub fn from_tools(tools: &[ToolSpec]) -> Self {
        let mut registry = Self::default();
        for tool in tools {
            registry.register(&tool.name, tool.parser.build());
        }
        registry
    }

    pub fn register(&mut self, tool_name: &str, parser: Box<dyn OutputParser>) {
        self.parsers.insert(tool_name.to_string(), parser);
    }

    pub fn get(&self, tool_name: &str) -> Option<&dyn OutputParser> {
        self.parsers.get(tool_name).map(|p| p.as_ref())
    }

    /// @ai:intent Parse raw output for a tool
    /// @ai:post an unregistered tool yields no records and one skipped entry
    /// @ai:effects pure
    pub fn normalize(&self, input: &ParseInput<'_>) -> ParseOutcome {
        match self.get(input.tool_name) {
            Some(parser) => parser.parse(input),
            None => {
                let mut outcome = ParseOutcome::default();
                outcome.skip(ParseError::new(
                    0,
                    format!("no parser registered for tool '{}'", input.tool_name),
                ));
                outcome
            }
        }
    }

    /// @ai:intent Parse a recorded invocation; failed runs produce no records
    /// @ai:effects pure
    pub fn normalize_invocation(&self, invocation: &ToolInvocation) -> ParseOutcome {
        if !invocation.is_success() {
            return ParseOutcome::default();
        }

        self.normalize(&ParseInput {
            tool_name: &invocation.tool_name,
            artifact_id: &invocation.target_artifact_id,
            raw: &invocation.raw_output,
            outcome: invocation.outcome,
        })
    }

    /// @ai:intent Normalize a batch, logging per-tool skip counts
    /// @ai:post records keep invocation order
    /// @ai:effects pure
    pub fn normalize_all(
        &self,
        invocations: &[ToolInvocation],
    ) -> (ParseOutcome, BTreeMap<String, NormalizeStats>) {
        let mut combined = ParseOutcome::default();
        let mut stats: BTreeMap<String, NormalizeStats> = BTreeMap::new();

        for invocation in invocations {
            let entry = stats.entry(invocation.tool_name.clone()).or_default();
            entry.invocations += 1;

            if !invocation.is_success() {
                entry.failed_invocations += 1;
                continue;
            }

            let outcome = self.normalize_invocation(invocation);
            entry.records += outcome.records.len();
            entry.skipped += outcome.skipped;

            if outcome.skipped > 0 {
                tracing::warn!(
                    "{} on {}: skipped {} malformed records (first: {})",
                    invocation.tool_name,
                    invocation.target_artifact_id,
                    outcome.skipped,
                    outcome
                        .errors
                        .first()
                        .map(ToString::to_string)
                        .unwrap_or_default()
                );
            }

            combined.extend(outcome);
        }

        (combined, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolExecutionError;
    use crate::normalize::ParserKind;
    use crate::tools::InvocationOutcome;
    use chrono::Utc;

    fn invocation(tool: &str, id: &str, raw: &str, outcome: InvocationOutcome) -> ToolInvocation {
        ToolInvocation {
            tool_name: tool.to_string(),
            target_artifact_id: id.to_string(),
            raw_output: raw.to_string(),
            stderr: String::new(),
            exit_status: 0,
            outcome,
            duration_ms: 1,
            error: None,
            recorded_at: Utc::now(),
        }
    }

    fn registry() -> ParserRegistry {
        ParserRegistry::from_tools(&[
            ToolSpec {
                parser: ParserKind::JsonAlerts,
                ..ToolSpec::new("semgrep", "semgrep")
            },
            ToolSpec::new("fallback", "true"),
        ])
    }

    #[test]
    fn test_routes_by_tool_name() {
        let registry = registry();
        assert_eq!(registry.get("semgrep").map(|p| p.format()), Some("json_alerts"));
        assert_eq!(registry.get("fallback").map(|p| p.format()), Some("exit_status"));
    }

    #[test]
    fn test_failed_invocations_yield_no_records() {
        let registry = registry();
        let crashed = ToolInvocation {
            error: Some(ToolExecutionError::NonZeroExit(2)),
            ..invocation("fallback", "t1", "", InvocationOutcome::Crash)
        };

        assert!(registry.normalize_invocation(&crashed).records.is_empty());
    }

    #[test]
    fn test_unknown_tool_is_skipped() {
        let outcome = registry().normalize(&ParseInput::new("nmap", "t1", "anything"));
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_normalize_all_counts_per_tool() {
        let invocations = vec![
            invocation(
                "semgrep",
                "t1",
                r#"{"results":[{"path":"a.py"},{"bad":1}]}"#,
                InvocationOutcome::SuccessWithFindings,
            ),
            invocation("semgrep", "t2", "", InvocationOutcome::Timeout),
            invocation("fallback", "t1", "", InvocationOutcome::SuccessNoFindings),
        ];

        let (outcome, stats) = registry().normalize_all(&invocations);

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].tool_name, "semgrep");
        assert_eq!(
            stats["semgrep"],
            NormalizeStats {
                invocations: 2,
                records: 1,
                skipped: 1,
                failed_invocations: 1,
            }
        );
        assert_eq!(stats["fallback"].records, 1);
    }
}
