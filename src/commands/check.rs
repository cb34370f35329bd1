//! Comando `check`: auditoría completa con compuertas + artefactos.

use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::artifacts::{build_audit_trail, ArtifactStore};
use crate::ast::ModuleCache;
use crate::audit::AuditPipeline;
use crate::config::CleanArchConfig;
use crate::rules::registry::RuleRegistry;

/// Resuelve (raíz del proyecto, path objetivo) desde el argumento.
pub fn resolve_target(path_arg: Option<&str>) -> (PathBuf, PathBuf) {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let project_root = CleanArchConfig::find_project_root(&cwd).unwrap_or_else(|| cwd.clone());
    let target = match path_arg {
        Some(p) => {
            let candidate = PathBuf::from(p);
            if candidate.is_absolute() {
                candidate
            } else {
                project_root.join(candidate)
            }
        }
        None => {
            let src = project_root.join("src");
            if src.is_dir() {
                src
            } else {
                project_root.clone()
            }
        }
    };
    (project_root, target)
}

/// Restringe los pases habilitados según --linter.
fn apply_linter_filter(config: &mut CleanArchConfig, linter: &str) -> bool {
    match linter {
        "all" => true,
        "import_linter" => {
            config.ruff_enabled = false;
            config.mypy_enabled = false;
            true
        }
        "ruff" => {
            config.import_linter_enabled = false;
            config.mypy_enabled = false;
            true
        }
        "mypy" => {
            config.import_linter_enabled = false;
            config.ruff_enabled = false;
            true
        }
        "excelsior" => {
            config.import_linter_enabled = false;
            config.ruff_enabled = false;
            config.mypy_enabled = false;
            true
        }
        _ => false,
    }
}

pub fn handle_check(
    path: Option<String>,
    linter: String,
    no_health: bool,
    format: String,
    quiet: bool,
) {
    let json_mode = format == "json";
    let (project_root, target) = resolve_target(path.as_deref());

    if !target.exists() {
        eprintln!("{} El destino '{}' no existe.", "❌".red(), target.display());
        std::process::exit(2);
    }

    let mut config = match CleanArchConfig::load(&project_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} Configuración inválida: {e}", "❌".red());
            std::process::exit(2);
        }
    };
    if !apply_linter_filter(&mut config, &linter) {
        eprintln!(
            "{} Linter desconocido '{linter}'. Opciones: all, import_linter, ruff, mypy, excelsior.",
            "❌".red()
        );
        std::process::exit(2);
    }

    let registry = match RuleRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Catálogo de reglas inválido: {e}", "❌".red());
            std::process::exit(2);
        }
    };

    if !quiet && !json_mode {
        crate::ui::mostrar_banner();
        println!(
            "🔍 Auditando {} (proyecto: {})\n",
            target.display().to_string().cyan(),
            project_root.display()
        );
    }

    let pipeline = AuditPipeline::new(&config, &registry, &project_root);
    let mut cache = ModuleCache::new();
    let spinner = if !quiet && !json_mode {
        Some(crate::ui::crear_progreso("Corriendo pases de auditoría..."))
    } else {
        None
    };
    let outcome = pipeline.run(&target, &mut cache);
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    if json_mode {
        let trail = build_audit_trail(&outcome, &registry);
        println!("{}", serde_json::to_string_pretty(&trail).unwrap_or_default());
    } else {
        crate::ui::render_audit(&outcome, quiet);
    }

    persist_artifacts(&project_root, &pipeline, &outcome, no_health, quiet || json_mode);

    // Exit 0 sólo con auditoría desbloqueada
    if outcome.is_blocked() {
        std::process::exit(1);
    }
}

fn persist_artifacts(
    project_root: &Path,
    pipeline: &AuditPipeline<'_>,
    outcome: &crate::audit::AuditOutcome,
    no_health: bool,
    silent: bool,
) {
    let store = ArtifactStore::new(project_root);
    let registry = pipeline.registry();
    let mut saved = vec![];
    if let Ok(p) = store.save_audit_trail(outcome, registry, "check") {
        saved.push(p);
    }
    if let Ok(p) = store.save_handover(outcome, registry, &[], "check") {
        saved.push(p);
    }
    if !no_health {
        let _ = store.save_audit_trail(outcome, registry, "health");
        let _ = store.save_handover(outcome, registry, &[], "health");
    }
    if !silent {
        for p in saved {
            println!("   💾 {}", p.display().to_string().dimmed());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linter_filter_excelsior_disables_external() {
        let mut config = CleanArchConfig::default();
        assert!(apply_linter_filter(&mut config, "excelsior"));
        assert!(!config.ruff_enabled);
        assert!(!config.mypy_enabled);
        assert!(!config.import_linter_enabled);
    }

    #[test]
    fn test_linter_filter_rejects_unknown() {
        let mut config = CleanArchConfig::default();
        assert!(!apply_linter_filter(&mut config, "eslint"));
    }
}
