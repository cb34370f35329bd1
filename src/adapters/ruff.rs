//! Adapter de Ruff (quick-lint). Dos instancias en el pipeline: imports &
//! typing (I, UP, B) y calidad de código (E, F, W, C90).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::adapters::{external_violation, run_tool, LinterAdapter, RawLogSink};
use crate::errors::ExcelsiorError;
use crate::rules::Violation;

pub const RUFF_IMPORT_TYPING_SELECT: &[&str] = &["I", "UP", "B"];
pub const RUFF_CODE_QUALITY_SELECT: &[&str] = &["E", "F", "W", "C90"];

/// Códigos que ruff marca fixable pero cuya corrección automática no es
/// segura en este pipeline.
const UNSAFE_FIX_CODES: &[&str] = &["B905", "E711", "E712"];

pub struct RuffAdapter {
    name: &'static str,
    select: &'static [&'static str],
    timeout: Duration,
    raw_log: RawLogSink,
}

impl RuffAdapter {
    pub fn import_typing(timeout_secs: u64, raw_log: RawLogSink) -> Self {
        Self {
            name: "ruff_import_typing",
            select: RUFF_IMPORT_TYPING_SELECT,
            timeout: Duration::from_secs(timeout_secs),
            raw_log,
        }
    }

    pub fn code_quality(timeout_secs: u64, raw_log: RawLogSink) -> Self {
        Self {
            name: "ruff_code_quality",
            select: RUFF_CODE_QUALITY_SELECT,
            timeout: Duration::from_secs(timeout_secs),
            raw_log,
        }
    }

    fn base_command(&self, target: &Path) -> Command {
        let mut cmd = Command::new("ruff");
        cmd.arg("check")
            .arg(target)
            .arg("--select")
            .arg(self.select.join(","))
            .arg("--output-format=json");
        cmd
    }

    fn parse_output(&self, stdout: &str) -> Vec<Violation> {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) else {
            return vec![];
        };
        let Some(items) = value.as_array() else { return vec![] };
        items
            .iter()
            .filter_map(|item| {
                let code = item.get("code")?.as_str()?;
                let message = item.get("message")?.as_str()?;
                let filename = item.get("filename")?.as_str()?;
                let row = item
                    .pointer("/location/row")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                let column = item
                    .pointer("/location/column")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as u32;
                Some(external_violation(code, message, filename, row, column))
            })
            .collect()
    }
}

impl LinterAdapter for RuffAdapter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn gather_results(&self, target: &Path) -> Result<Vec<Violation>, ExcelsiorError> {
        let out = run_tool(self.base_command(target), self.name, self.timeout, &self.raw_log)?;
        match out.exit_code {
            // 0 = limpio, 1 = hallazgos
            0 | 1 => Ok(self.parse_output(&out.stdout)),
            code => Err(ExcelsiorError::ExternalTool {
                tool: self.name.to_string(),
                reason: format!("exit {code}: {}", out.stderr.trim()),
            }),
        }
    }

    fn apply_fixes(&self, target: &Path) -> Result<bool, ExcelsiorError> {
        let mut cmd = Command::new("ruff");
        cmd.arg("check")
            .arg(target)
            .arg("--select")
            .arg(self.select.join(","))
            .arg("--fix")
            .arg("--exit-zero");
        let out = run_tool(cmd, self.name, self.timeout, &self.raw_log)?;
        if out.exit_code != 0 {
            return Err(ExcelsiorError::ExternalTool {
                tool: self.name.to_string(),
                reason: format!("exit {}: {}", out.exit_code, out.stderr.trim()),
            });
        }
        Ok(out.stdout.contains("Fixed") || out.stdout.contains("fixed"))
    }

    fn supports_autofix(&self) -> bool {
        true
    }

    fn get_fixable_rules(&self) -> Vec<String> {
        // Ruff matchea por prefijo de categoría
        self.select.iter().map(|s| s.to_string()).collect()
    }

    fn get_manual_fix_instructions(&self, code: &str) -> String {
        if UNSAFE_FIX_CODES.contains(&code) {
            return format!("Rule {code}: apply the fix by hand; the automatic rewrite is unsafe here.");
        }
        format!("Run `ruff check --select {code} --fix` or fix the finding manually.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> RuffAdapter {
        RuffAdapter::import_typing(10, RawLogSink::default())
    }

    #[test]
    fn test_parse_ruff_json_output() {
        let stdout = r#"[
            {"code": "I001", "message": "Import block is un-sorted", "filename": "src/app.py",
             "location": {"row": 3, "column": 1}},
            {"code": "UP006", "message": "Use `list` instead of `List`", "filename": "src/app.py",
             "location": {"row": 9, "column": 10}}
        ]"#;
        let violations = adapter().parse_output(stdout);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].code, "I001");
        assert_eq!(violations[0].line, 3);
        assert_eq!(violations[1].code, "UP006");
    }

    #[test]
    fn test_parse_garbage_output_is_empty() {
        assert!(adapter().parse_output("no json").is_empty());
    }

    #[test]
    fn test_fixable_rules_follow_selection() {
        let fixable = adapter().get_fixable_rules();
        assert_eq!(fixable, vec!["I", "UP", "B"]);
    }
}
