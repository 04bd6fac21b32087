//! @ai:module:intent Check that configured tool executables are installed
//! @ai:module:layer infrastructure
//! @ai:module:public_api ToolchainValidator, ToolchainStatus, MissingTool
//! @ai:module:stateless true

use crate::tools::spec::ToolSpec;
use std::collections::BTreeSet;
use std::path::Path;

/// @ai:intent Result of probing every configured tool
#[derive(Debug, Default)]
pub struct ToolchainStatus {
    pub available: BTreeSet<String>,
    pub missing: Vec<MissingTool>,
}

impl ToolchainStatus {
    pub fn all_available(&self) -> bool {
        self.missing.is_empty()
    }
}

/// @ai:intent A configured tool whose program could not be found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTool {
    pub tool_name: String,
    pub program: String,
    pub install_hint: &'static str,
}

/// Probes PATH without running the tools, since fuzzers rarely support `--version`
pub struct ToolchainValidator;

impl ToolchainValidator {
    /// @ai:intent Install hint for well-known analysis programs
    /// @ai:effects pure
    fn install_hint(program: &str) -> &'static str {
        let base = Path::new(program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match base.as_str() {
            "afl-fuzz" => "Install AFL++: apt install afl++ or https://aflplus.plus/",
            "semgrep" => "Install Semgrep: pip install semgrep",
            "sonar-scanner" => "Install SonarScanner: https://docs.sonarsource.com/sonarqube/latest/analyzing-source-code/scanners/sonarscanner/",
            "valgrind" => "Install Valgrind: apt install valgrind",
            _ => "Check tool documentation for installation instructions",
        }
    }

    /// @ai:intent Whether a program resolves to an executable file
    /// @ai:effects fs:read, env
    pub fn is_program_available(program: &str) -> bool {
        let path = Path::new(program);
        if path.components().count() > 1 {
            return is_executable(path);
        }

        std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program))))
            .unwrap_or(false)
    }

    /// @ai:intent Probe every tool and return status
    /// @ai:effects fs:read, env
    pub fn validate(tools: &[ToolSpec]) -> ToolchainStatus {
        let mut status = ToolchainStatus::default();

        for tool in tools {
            if Self::is_program_available(&tool.program) {
                status.available.insert(tool.name.clone());
            } else {
                status.missing.push(MissingTool {
                    tool_name: tool.name.clone(),
                    program: tool.program.clone(),
                    install_hint: Self::install_hint(&tool.program),
                });
            }
        }

        status
    }

    /// @ai:intent Log warnings for missing tools
    /// @ai:effects io
    pub fn log_warnings(status: &ToolchainStatus) {
        for missing in &status.missing {
            tracing::warn!(
                "Program '{}' for tool '{}' not found - its invocations will be recorded as malformed. {}",
                missing.program,
                missing.tool_name,
                missing.install_hint
            );
        }
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
