//! Adapter del verificador externo de contratos de imports (lint-imports).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::adapters::{external_violation, run_tool, LinterAdapter, RawLogSink};
use crate::errors::ExcelsiorError;
use crate::rules::Violation;

pub struct ImportLinterAdapter {
    timeout: Duration,
    raw_log: RawLogSink,
}

impl ImportLinterAdapter {
    pub fn new(timeout_secs: u64, raw_log: RawLogSink) -> Self {
        Self { timeout: Duration::from_secs(timeout_secs), raw_log }
    }

    fn parse_output(&self, stdout: &str) -> Vec<Violation> {
        let mut violations = Vec::new();
        let mut current_contract = String::new();
        for line in stdout.lines() {
            let trimmed = line.trim();
            if trimmed.ends_with("BROKEN") {
                current_contract = trimmed.trim_end_matches("BROKEN").trim().to_string();
                violations.push(external_violation(
                    "contract-broken",
                    &format!("Layer contract broken: {current_contract}"),
                    "import-linter",
                    0,
                    0,
                ));
            } else if trimmed.starts_with('-') && trimmed.contains("->") {
                // Detalle de import ilegal dentro del contrato roto
                violations.push(external_violation(
                    "illegal-import",
                    &format!("{current_contract}: {}", trimmed.trim_start_matches('-').trim()),
                    "import-linter",
                    0,
                    0,
                ));
            }
        }
        violations
    }
}

impl LinterAdapter for ImportLinterAdapter {
    fn name(&self) -> &'static str {
        "import_linter"
    }

    fn gather_results(&self, target: &Path) -> Result<Vec<Violation>, ExcelsiorError> {
        let mut cmd = Command::new("lint-imports");
        if target.is_dir() {
            cmd.current_dir(target);
        }
        let out = run_tool(cmd, self.name(), self.timeout, &self.raw_log)?;
        match out.exit_code {
            0 => Ok(vec![]),
            1 => {
                let findings = self.parse_output(&out.stdout);
                if findings.is_empty() {
                    // Exit 1 sin reporte de contratos = error real
                    return Err(ExcelsiorError::ExternalTool {
                        tool: self.name().to_string(),
                        reason: out.stderr.trim().to_string(),
                    });
                }
                Ok(findings)
            }
            code => Err(ExcelsiorError::ExternalTool {
                tool: self.name().to_string(),
                reason: format!("exit {code}: {}", out.stderr.trim()),
            }),
        }
    }

    fn apply_fixes(&self, _target: &Path) -> Result<bool, ExcelsiorError> {
        Ok(false)
    }

    fn supports_autofix(&self) -> bool {
        false
    }

    fn get_fixable_rules(&self) -> Vec<String> {
        vec![]
    }

    fn get_manual_fix_instructions(&self, _code: &str) -> String {
        "Restructure the import so it respects the declared layer contracts; move the shared code inward or invert the dependency with a Protocol.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broken_contract_output() {
        let adapter = ImportLinterAdapter::new(10, RawLogSink::default());
        let out = "\
=============
Import Linter
=============

Layered architecture BROKEN

- app.domain.order -> app.infrastructure.db (l.4)
";
        let violations = adapter.parse_output(out);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].code, "contract-broken");
        assert!(violations[1].message.contains("app.domain.order"));
    }

    #[test]
    fn test_clean_output_has_no_findings() {
        let adapter = ImportLinterAdapter::new(10, RawLogSink::default());
        assert!(adapter.parse_output("Contracts: 1 kept, 0 broken.").is_empty());
    }
}
