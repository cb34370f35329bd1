//! Módulo de interfaz de usuario
//!
//! Funciones relacionadas con la salida en terminal: banner, spinner y
//! render de resultados de auditoría.

use colored::Colorize;

use crate::audit::{AuditOutcome, AuditStage};

/// Ancho de tabla: respeta TERMINAL_WIDTH si está definido.
pub fn terminal_width() -> usize {
    std::env::var("TERMINAL_WIDTH")
        .ok()
        .and_then(|w| w.parse().ok())
        .unwrap_or(100)
}

/// Muestra el banner ASCII art al inicio del programa
pub fn mostrar_banner() {
    let art = r"
    _______  ________________   _____ ________  ____
   / ____/ |/ / ____/ ____/ /  / ___//  _/ __ \/ __ \
  / __/  |   / /   / __/ / /   \__ \ / // / / / /_/ /
 / /___ /   / /___/ /___/ /______/ // // /_/ / _, _/
/_____//_/|_\____/_____/_____/____/___/\____/_/ |_|
";
    println!("{}", art.red().bold());
    println!(
        "{}",
        "        🏛️  Gobernanza arquitectónica para Python  🏛️".bright_white().bold()
    );
    println!();
}

/// Spinner genérico para pases largos
pub fn crear_progreso(mensaje: &str) -> indicatif::ProgressBar {
    let pb = indicatif::ProgressBar::new_spinner();
    pb.set_style(
        indicatif::ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_spinner()),
    );
    pb.set_message(mensaje.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn stage_label(stage: AuditStage) -> &'static str {
    match stage {
        AuditStage::ImportLinter => "Pase 1 — Contratos de capas (import-linter)",
        AuditStage::RuffImportTyping => "Pase 2 — Imports & typing (ruff I, UP, B)",
        AuditStage::Mypy => "Pase 3 — Tipos estáticos (mypy)",
        AuditStage::Excelsior => "Pase 4 — Arquitectura (excelsior)",
        AuditStage::RuffCodeQuality => "Pase 5 — Calidad de código (ruff E, F, W, C90)",
    }
}

/// Render del resultado de auditoría en terminal.
pub fn render_audit(outcome: &AuditOutcome, quiet: bool) {
    for pass in &outcome.passes {
        if pass.skipped_blocked {
            println!(
                "   {} {}",
                "⏭️ ".dimmed(),
                format!("{} — no ejecutado (bloqueado antes)", stage_label(pass.stage)).dimmed()
            );
            continue;
        }
        if pass.skipped_disabled {
            if !quiet {
                println!(
                    "   {} {}",
                    "➖".dimmed(),
                    format!("{} — deshabilitado", stage_label(pass.stage)).dimmed()
                );
            }
            continue;
        }
        if let Some(error) = &pass.error {
            println!("   {} {}", "💥".red(), stage_label(pass.stage).red().bold());
            println!("      └─ {}", error.red());
            continue;
        }
        if pass.violations.is_empty() {
            println!("   {} {}", "✅".green(), stage_label(pass.stage));
            continue;
        }
        println!(
            "   {} {} — {} hallazgo(s)",
            "🚩".red(),
            stage_label(pass.stage).bold(),
            pass.violations.len().to_string().red().bold()
        );
        if quiet {
            continue;
        }
        let width = terminal_width();
        let mut current_file = String::new();
        for v in &pass.violations {
            if v.path != current_file {
                current_file = v.path.clone();
                println!("\n      📄 {}", current_file.bold().cyan());
            }
            let mut message = v.message.clone();
            let max_msg = width.saturating_sub(24);
            if message.chars().count() > max_msg {
                message = message.chars().take(max_msg.saturating_sub(1)).collect();
                message.push('…');
            }
            let mut marks = String::new();
            if v.fixable {
                marks.push_str(" 🔧");
            }
            if v.is_comment_only {
                marks.push_str(" 💬");
            }
            println!(
                "         {}:{} [{}]{} {}",
                v.line,
                v.column,
                v.code.yellow(),
                marks,
                message
            );
            if let Some(reason) = &v.fix_failure_reason {
                println!("            └─ {}", reason.dimmed());
            }
        }
        println!();
    }

    println!();
    if outcome.is_blocked() {
        println!(
            "{} Auditoría bloqueada por: {}",
            "⛔".red(),
            outcome.blocked_by_str().red().bold()
        );
    } else {
        println!("{}", "✅ Auditoría limpia: ningún pase bloqueado.".green().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_width_env_override() {
        std::env::set_var("TERMINAL_WIDTH", "72");
        assert_eq!(terminal_width(), 72);
        std::env::remove_var("TERMINAL_WIDTH");
        assert_eq!(terminal_width(), 100);
    }
}
