//! Adapter del type-checker externo (mypy).

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::adapters::{external_violation, run_tool, LinterAdapter, RawLogSink};
use crate::errors::ExcelsiorError;
use crate::rules::Violation;

// path:line: error: message  [code]
static MYPY_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<path>[^:]+):(?P<line>\d+):(?:(?P<col>\d+):)?\s*error:\s*(?P<msg>.*?)(?:\s+\[(?P<code>[\w-]+)\])?$")
        .unwrap()
});

pub struct MypyAdapter {
    timeout: Duration,
    raw_log: RawLogSink,
}

impl MypyAdapter {
    pub fn new(timeout_secs: u64, raw_log: RawLogSink) -> Self {
        Self { timeout: Duration::from_secs(timeout_secs), raw_log }
    }

    fn parse_output(&self, stdout: &str) -> Vec<Violation> {
        stdout
            .lines()
            .filter_map(|line| {
                let caps = MYPY_LINE_RE.captures(line.trim())?;
                let path = caps.name("path")?.as_str();
                let lineno: u32 = caps.name("line")?.as_str().parse().ok()?;
                let col: u32 = caps
                    .name("col")
                    .and_then(|c| c.as_str().parse().ok())
                    .unwrap_or(0);
                let code = caps.name("code").map(|c| c.as_str()).unwrap_or("mypy-error");
                let msg = caps.name("msg")?.as_str();
                Some(external_violation(code, msg, path, lineno, col))
            })
            .collect()
    }
}

impl LinterAdapter for MypyAdapter {
    fn name(&self) -> &'static str {
        "mypy"
    }

    fn gather_results(&self, target: &Path) -> Result<Vec<Violation>, ExcelsiorError> {
        let mut cmd = Command::new("mypy");
        cmd.arg(target)
            .arg("--no-error-summary")
            .arg("--no-pretty")
            .arg("--show-column-numbers");
        let out = run_tool(cmd, self.name(), self.timeout, &self.raw_log)?;
        match out.exit_code {
            0 => Ok(vec![]),
            1 => Ok(self.parse_output(&out.stdout)),
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

    fn get_manual_fix_instructions(&self, code: &str) -> String {
        match code {
            "no-untyped-def" => {
                "Add type hints to every parameter and the return value. Example: def f(x: int) -> str: ...".to_string()
            }
            "assignment" => {
                "The assigned value does not match the declared type; fix the type or the value.".to_string()
            }
            _ => format!("See mypy documentation for [{code}] and make the types explicit."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mypy_lines() {
        let adapter = MypyAdapter::new(10, RawLogSink::default());
        let out = "\
src/app.py:12:5: error: Function is missing a return type annotation  [no-untyped-def]
src/app.py:30: error: Incompatible types in assignment  [assignment]
Found 2 errors in 1 file (checked 3 source files)
";
        let violations = adapter.parse_output(out);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].code, "no-untyped-def");
        assert_eq!(violations[0].line, 12);
        assert_eq!(violations[0].column, 5);
        assert_eq!(violations[1].code, "assignment");
        assert_eq!(violations[1].column, 0);
    }
}
