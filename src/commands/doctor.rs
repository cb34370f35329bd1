//! Comando `doctor`: diagnóstico del entorno con salida coloreada.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use colored::Colorize;

use crate::adapters::{run_tool, RawLogSink};
use crate::config::CleanArchConfig;

/// Verifica que la configuración del proyecto cargue correctamente.
pub fn check_config(project_root: &Path) -> anyhow::Result<CleanArchConfig> {
    CleanArchConfig::load(project_root).map_err(|e| anyhow::anyhow!("{e}"))
}

/// ¿El binario externo responde a --version?
pub fn check_binary(name: &str) -> bool {
    let mut cmd = Command::new(name);
    cmd.arg("--version");
    run_tool(cmd, name, Duration::from_secs(10), &RawLogSink::default())
        .map(|out| out.exit_code == 0)
        .unwrap_or(false)
}

/// Sanidad del parser embebido.
pub fn check_parser() -> bool {
    crate::ast::lower::parse_module("x = 1\n", Path::new("probe.py"), "probe")
        .map(|m| !m.has_syntax_errors)
        .unwrap_or(false)
}

pub fn handle_doctor() {
    let cwd = std::env::current_dir().unwrap_or_else(|_| ".".into());
    let project_root =
        CleanArchConfig::find_project_root(&cwd).unwrap_or_else(|| cwd.clone());

    println!("\n{}", "🏥 Excelsior Doctor".bold().cyan());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut issues = 0;

    print!("   ");
    match check_config(&project_root) {
        Ok(config) => {
            println!("{} Configuración", "✅".green());
            println!("      └─ project_type: {}", config.project_type.cyan());
        }
        Err(e) => {
            println!("{} Configuración", "❌".red());
            println!("      └─ Error: {}", e.to_string().red());
            issues += 1;
        }
    }

    print!("   ");
    if check_parser() {
        println!("{} Parser Python embebido", "✅".green());
    } else {
        println!("{} Parser Python embebido", "❌".red());
        issues += 1;
    }

    let config = CleanArchConfig::load(&project_root).unwrap_or_default();
    for (binary, enabled, hint) in [
        ("ruff", config.ruff_enabled, "pip install ruff"),
        ("mypy", config.mypy_enabled, "pip install mypy"),
        ("lint-imports", config.import_linter_enabled, "pip install import-linter"),
    ] {
        print!("   ");
        if !enabled {
            println!("{} {} (deshabilitado en config)", "➖".dimmed(), binary);
            continue;
        }
        if check_binary(binary) {
            println!("{} {}", "✅".green(), binary);
        } else {
            println!("{} {}", "⚠️ ".yellow(), binary);
            println!("      └─ {}", format!("No disponible. Instala con: {hint}").yellow());
            issues += 1;
        }
    }

    print!("   ");
    let stubs = project_root.join("stubs");
    if stubs.is_dir() {
        println!("{} Directorio stubs/", "✅".green());
    } else {
        println!("{} Directorio stubs/ (opcional, mejora la inferencia W9019)", "ℹ️ ".yellow());
    }

    println!();
    if issues == 0 {
        println!("{}", "✅ Todos los checks críticos pasaron.".green().bold());
    } else {
        println!("{}", format!("⚠️  {issues} problema(s) encontrados").yellow().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_config_ok_with_defaults() {
        let tmp = TempDir::new().unwrap();
        assert!(check_config(tmp.path()).is_ok());
    }

    #[test]
    fn test_check_config_fails_on_malformed() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("pyproject.toml"),
            "[tool.clean-arch]\nmock_limit = \"muchos\"\n",
        )
        .unwrap();
        assert!(check_config(tmp.path()).is_err());
    }

    #[test]
    fn test_parser_probe_healthy() {
        assert!(check_parser());
    }

    #[test]
    fn test_missing_binary_detected() {
        assert!(!check_binary("binario-inexistente-xyz"));
    }
}
