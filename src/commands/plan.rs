//! Comando `plan`: plan de fix en markdown para una regla del catálogo.

use colored::Colorize;

use crate::artifacts::ArtifactStore;
use crate::ast::ModuleCache;
use crate::audit::AuditPipeline;
use crate::commands::check::resolve_target;
use crate::config::CleanArchConfig;
use crate::rules::registry::RuleRegistry;

pub fn handle_plan(topic: Option<String>) {
    let registry = match RuleRegistry::load() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{} Catálogo de reglas inválido: {e}", "❌".red());
            std::process::exit(2);
        }
    };

    let Some(topic) = topic else {
        println!("{}", "Temas disponibles:".bold());
        for (code, def) in registry.definitions() {
            println!("  {}  {}  {}", code.yellow(), def.symbol.dimmed(), def.display_name);
        }
        return;
    };

    let Some(def) = registry.get(&topic) else {
        eprintln!("{} Regla desconocida: '{topic}'", "❌".red());
        std::process::exit(2);
    };
    // Normaliza a código (acepta símbolo)
    let code = registry
        .definitions()
        .find(|(_, d)| d.symbol == def.symbol)
        .map(|(c, _)| c.clone())
        .unwrap_or(topic);

    let (project_root, target) = resolve_target(None);
    let config = CleanArchConfig::load(&project_root).unwrap_or_default();
    let pipeline = AuditPipeline::new(&config, &registry, &project_root);
    let mut cache = ModuleCache::new();
    let pass = pipeline.run_architectural(&target, &mut cache);
    let occurrences: Vec<_> = pass
        .violations
        .into_iter()
        .filter(|v| v.code == code)
        .collect();

    let store = ArtifactStore::new(&project_root);
    match store.save_fix_plan(&code, &registry, &occurrences) {
        Ok(path) => {
            println!(
                "📋 Plan para {} ({} ocurrencias) → {}",
                code.yellow().bold(),
                occurrences.len(),
                path.display().to_string().cyan()
            );
        }
        Err(e) => {
            eprintln!("{} No se pudo escribir el plan: {e}", "❌".red());
            std::process::exit(2);
        }
    }
}
