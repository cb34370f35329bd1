//! Puerto LinterAdapter + runner de subprocesos con timeout y logs crudos.
//!
//! Todas las herramientas externas pasan por este puerto: cambiar de
//! herramienta es escribir otro adapter, no tocar el pipeline.

pub mod import_linter;
pub mod mypy;
pub mod ruff;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::errors::ExcelsiorError;
use crate::rules::Violation;

/// Contrato de integración con linters externos.
pub trait LinterAdapter {
    fn name(&self) -> &'static str;
    /// Ejecuta la herramienta y devuelve hallazgos normalizados.
    fn gather_results(&self, target: &Path) -> Result<Vec<Violation>, ExcelsiorError>;
    /// Aplica los fixes automáticos de la herramienta. true si modificó algo.
    fn apply_fixes(&self, target: &Path) -> Result<bool, ExcelsiorError>;
    fn supports_autofix(&self) -> bool;
    fn get_fixable_rules(&self) -> Vec<String>;
    fn get_manual_fix_instructions(&self, code: &str) -> String;
}

pub struct ToolOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Destino de logs crudos por herramienta (`.excelsior/logs/raw_*.log`).
#[derive(Clone, Default)]
pub struct RawLogSink {
    dir: Option<PathBuf>,
}

impl RawLogSink {
    pub fn new(excelsior_dir: Option<&Path>) -> Self {
        Self { dir: excelsior_dir.map(|d| d.join("logs")) }
    }

    pub fn write(&self, tool: &str, content: &str) {
        let Some(dir) = &self.dir else { return };
        if std::fs::create_dir_all(dir).is_err() {
            return;
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("raw_{tool}_{stamp}.log"));
        let _ = std::fs::write(path, content);
    }
}

/// Ejecuta un comando con timeout. En timeout mata el proceso y devuelve
/// ExternalToolTimeout (que el pase reporta como error bloqueante).
pub fn run_tool(
    mut cmd: Command,
    tool: &str,
    timeout: Duration,
    raw_log: &RawLogSink,
) -> Result<ToolOutput, ExcelsiorError> {
    let rendered = format!("{cmd:?}");
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ExcelsiorError::ExternalTool {
            tool: tool.to_string(),
            reason: format!("spawn failed: {e}"),
        })?;

    // Lectores en hilos propios para no bloquear el pipe
    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let out_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });
    let err_handle = std::thread::spawn(move || {
        let mut buf = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut buf);
        }
        buf
    });

    let started = Instant::now();
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if started.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    raw_log.write(tool, &format!("$ {rendered}\n<TIMEOUT>\n"));
                    return Err(ExcelsiorError::ExternalToolTimeout {
                        tool: tool.to_string(),
                        seconds: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(e) => {
                return Err(ExcelsiorError::ExternalTool {
                    tool: tool.to_string(),
                    reason: e.to_string(),
                })
            }
        }
    };

    let stdout = out_handle.join().unwrap_or_default();
    let stderr = err_handle.join().unwrap_or_default();
    raw_log.write(
        tool,
        &format!("$ {rendered}\n--- stdout ---\n{stdout}\n--- stderr ---\n{stderr}\n"),
    );
    Ok(ToolOutput { exit_code: status.code().unwrap_or(-1), stdout, stderr })
}

/// Violación sintetizada desde un hallazgo externo.
pub fn external_violation(code: &str, message: &str, path: &str, line: u32, column: u32) -> Violation {
    Violation {
        code: code.to_string(),
        message: message.to_string(),
        location: format!("{path}:{line}:{column}"),
        path: path.to_string(),
        line,
        column,
        symbol: None,
        node: None,
        fixable: false,
        fix_failure_reason: None,
        is_comment_only: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_tool_captures_output() {
        let mut cmd = Command::new("echo");
        cmd.arg("hola");
        let out = run_tool(cmd, "echo", Duration::from_secs(5), &RawLogSink::default())
            .unwrap();
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("hola"));
    }

    #[test]
    fn test_run_tool_timeout_kills_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_tool(cmd, "sleep", Duration::from_millis(200), &RawLogSink::default());
        assert!(matches!(err, Err(ExcelsiorError::ExternalToolTimeout { .. })));
    }

    #[test]
    fn test_missing_binary_is_tool_error() {
        let cmd = Command::new("herramienta-que-no-existe-xyz");
        let err = run_tool(
            cmd,
            "fantasma",
            Duration::from_secs(1),
            &RawLogSink::default(),
        );
        assert!(matches!(err, Err(ExcelsiorError::ExternalTool { .. })));
    }
}
