//! Comando `verify`: compara el estado del audit contra un baseline.

use colored::Colorize;
use serde_json::json;

use crate::ast::ModuleCache;
use crate::audit::AuditPipeline;
use crate::commands::check::resolve_target;
use crate::config::CleanArchConfig;
use crate::rules::registry::RuleRegistry;

const BASELINE_KEY: &str = "verify/baseline.json";

pub fn handle_verify(baseline: bool) {
    let (project_root, target) = resolve_target(None);
    let config = match CleanArchConfig::load(&project_root) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} Configuración inválida: {e}", "❌".red());
            std::process::exit(2);
        }
    };
    let registry = match RuleRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Catálogo de reglas inválido: {e}", "❌".red());
            std::process::exit(2);
        }
    };

    let pipeline = AuditPipeline::new(&config, &registry, &project_root);
    let mut cache = ModuleCache::new();
    let outcome = pipeline.run(&target, &mut cache);

    let store = crate::artifacts::ArtifactStore::new(&project_root);
    let current = json!({
        "blocked_by": outcome.blocked_by_str(),
        "total_violations": outcome.total_violations(),
    });

    if baseline {
        match store.write(BASELINE_KEY, &serde_json::to_string_pretty(&current).unwrap_or_default()) {
            Ok(path) => println!("📌 Baseline guardado en {}", path.display().to_string().cyan()),
            Err(e) => {
                eprintln!("{} No se pudo guardar el baseline: {e}", "❌".red());
                std::process::exit(2);
            }
        }
        if outcome.is_blocked() {
            std::process::exit(1);
        }
        return;
    }

    let baseline_path = project_root.join(".excelsior").join(BASELINE_KEY);
    let saved: Option<serde_json::Value> = std::fs::read_to_string(&baseline_path)
        .ok()
        .and_then(|c| serde_json::from_str(&c).ok());
    match saved {
        Some(prev) => {
            let prev_total = prev["total_violations"].as_u64().unwrap_or(0);
            let now_total = outcome.total_violations() as u64;
            if now_total > prev_total {
                println!(
                    "{} Regresión: {} violaciones (baseline: {prev_total})",
                    "⛔".red(),
                    now_total.to_string().red().bold()
                );
                std::process::exit(1);
            }
            println!(
                "✅ Sin regresiones: {} violaciones (baseline: {prev_total})",
                now_total
            );
        }
        None => {
            println!(
                "{} Sin baseline; corre `excelsior verify --baseline` primero.",
                "ℹ️ ".yellow()
            );
        }
    }
    if outcome.is_blocked() {
        std::process::exit(1);
    }
}
