//! @ai:module:intent Declarative description of one external analysis tool
//! @ai:module:layer domain
//! @ai:module:public_api ToolSpec, InvocationContext
//! @ai:module:stateless true

use crate::error::ConfigurationError;
use crate::normalize::ParserKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const PLACEHOLDERS: [&str; 4] = ["{input}", "{input_dir}", "{id}", "{output}"];

/// @ai:intent How to invoke a tool against one artifact and how to read its output
/// @ai:effects pure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Registry key; also names the invocation directory
    pub name: String,
    pub program: String,
    /// Argument template; see `InvocationContext` for placeholders
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Feed the artifact content on stdin
    #[serde(default)]
    pub stdin: bool,
    /// Read raw output from this file (templated) instead of stdout
    #[serde(default)]
    pub report_file: Option<String>,
    /// Exit codes that mean "ran fine and found something"
    #[serde(default)]
    pub findings_exit_codes: Vec<i32>,
    #[serde(default)]
    pub parser: ParserKind,
}

fn default_timeout_secs() -> u64 {
    60
}

/// @ai:intent Values substituted into a tool's argument template
///            {input} artifact path, {input_dir} seed dir holding only this artifact,
///            {id} test-case id, {output} per-invocation scratch dir
#[derive(Debug, Clone)]
pub struct InvocationContext<'a> {
    pub id: &'a str,
    pub input: &'a Path,
    pub input_dir: &'a Path,
    pub output: &'a Path,
}

impl ToolSpec {
    /// @ai:intent Minimal spec with defaults for everything but name and program
    /// @ai:effects pure
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            timeout_secs: default_timeout_secs(),
            stdin: false,
            report_file: None,
            findings_exit_codes: Vec::new(),
            parser: ParserKind::default(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// @ai:intent Whether the template asks for a per-artifact seed directory
    /// @ai:effects pure
    pub fn needs_input_dir(&self) -> bool {
        self.args.iter().any(|a| a.contains("{input_dir}"))
    }

    /// @ai:intent Substitute placeholders into every argument
    /// @ai:effects pure
    pub fn render_args(&self, ctx: &InvocationContext<'_>) -> Vec<String> {
        self.args.iter().map(|arg| render(arg, ctx)).collect()
    }

    /// @ai:intent Resolve the report file path for an invocation, if any
    /// @ai:effects pure
    pub fn render_report_file(&self, ctx: &InvocationContext<'_>) -> Option<PathBuf> {
        self.report_file.as_deref().map(|t| PathBuf::from(render(t, ctx)))
    }

    /// @ai:intent Reject specs that could never produce a valid invocation
    /// @ai:effects pure
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let invalid = |reason: &str| ConfigurationError::InvalidTool {
            tool: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }

        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(invalid("name must be usable as a directory name"));
        }

        if self.program.trim().is_empty() {
            return Err(invalid("program must not be empty"));
        }

        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be at least 1"));
        }

        if let Some(unknown) = self
            .args
            .iter()
            .chain(self.report_file.iter())
            .find_map(|a| unknown_placeholder(a))
        {
            return Err(invalid(&format!("unknown placeholder {unknown}")));
        }

        Ok(())
    }
}

/// @ai:effects pure
fn render(template: &str, ctx: &InvocationContext<'_>) -> String {
    // {input_dir} must be replaced before {input}, which is its prefix
    template
        .replace("{input_dir}", &ctx.input_dir.to_string_lossy())
        .replace("{input}", &ctx.input.to_string_lossy())
        .replace("{id}", ctx.id)
        .replace("{output}", &ctx.output.to_string_lossy())
}

/// @ai:intent Find a `{word}` token that is not a known placeholder
/// @ai:effects pure
fn unknown_placeholder(template: &str) -> Option<String> {
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        let after = &rest[start..];
        let Some(end) = after.find('}') else {
            return None;
        };

        let token = &after[..=end];
        let is_word = token[1..token.len() - 1]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

        if is_word && !PLACEHOLDERS.contains(&token) {
            return Some(token.to_string());
        }

        rest = &after[end + 1..];
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(input: &'a Path, input_dir: &'a Path, output: &'a Path) -> InvocationContext<'a> {
        InvocationContext {
            id: "t1",
            input,
            input_dir,
            output,
        }
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let spec = ToolSpec {
            args: vec![
                "-i".to_string(),
                "{input_dir}".to_string(),
                "--file={input}".to_string(),
                "{output}/{id}.json".to_string(),
            ],
            ..ToolSpec::new("t", "tool")
        };

        let input = Path::new("/run/artifacts/t1.txt");
        let seeds = Path::new("/run/work/t/t1/seeds");
        let output = Path::new("/run/work/t/t1");
        let args = spec.render_args(&ctx(input, seeds, output));

        assert_eq!(
            args,
            vec![
                "-i",
                "/run/work/t/t1/seeds",
                "--file=/run/artifacts/t1.txt",
                "/run/work/t/t1/t1.json"
            ]
        );
        assert!(spec.needs_input_dir());
    }

    #[test]
    fn test_validate_rejects_unknown_placeholder() {
        let spec = ToolSpec {
            args: vec!["{inptu}".to_string()],
            ..ToolSpec::new("t", "tool")
        };
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_allows_literal_braces() {
        let spec = ToolSpec {
            args: vec!["--format={\"a\": 1}".to_string(), "{input}".to_string()],
            ..ToolSpec::new("t", "tool")
        };
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let spec = ToolSpec {
            timeout_secs: 0,
            ..ToolSpec::new("t", "tool")
        };
        assert!(spec.validate().is_err());
    }
}
